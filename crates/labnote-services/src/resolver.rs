//! Turns an export selection into entity references
//!
//! Explicit ids are taken as given, in order and with duplicates; category and owner
//! selections are listed through the repositories. Exporting somebody else's entries
//! needs admin rights over them and a shared team.

use labnote_core::models::{EntityReference, EntitySelector, EntityType, Requester};
use labnote_core::AppError;
use labnote_db::{EntityRepository, TeamRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct EntityResolver {
    entities: Arc<dyn EntityRepository>,
    teams: Arc<dyn TeamRepository>,
}

impl EntityResolver {
    pub fn new(entities: Arc<dyn EntityRepository>, teams: Arc<dyn TeamRepository>) -> Self {
        Self { entities, teams }
    }

    /// Resolve the selection; no type or no selector gives an empty set
    #[tracing::instrument(skip(self, requester), fields(operation = "resolve", user_id = requester.user_id))]
    pub async fn resolve(
        &self,
        requester: &Requester,
        entity_type: Option<EntityType>,
        selector: &EntitySelector,
    ) -> Result<Vec<EntityReference>, AppError> {
        let Some(entity_type) = entity_type else {
            return Ok(Vec::new());
        };

        let ids = match selector {
            EntitySelector::None => Vec::new(),
            EntitySelector::Ids(ids) => ids.clone(),
            EntitySelector::Category(category) => {
                self.entities
                    .list_ids_by_category(requester, entity_type, *category)
                    .await?
            }
            EntitySelector::Owner(owner) => {
                self.check_owner_access(requester, *owner).await?;
                self.entities
                    .list_ids_by_owner(requester, entity_type, *owner)
                    .await?
            }
        };

        Ok(ids
            .into_iter()
            .map(|id| EntityReference::new(entity_type, id))
            .collect())
    }

    async fn check_owner_access(&self, requester: &Requester, owner: i64) -> Result<(), AppError> {
        if owner != requester.user_id && !self.teams.is_admin_of(requester.user_id, owner).await? {
            return Err(AppError::IllegalAction(format!(
                "User {} is not an admin of user {}",
                requester.user_id, owner
            )));
        }
        if !self.teams.has_common_team(owner, requester.team_id).await? {
            return Err(AppError::IllegalAction(format!(
                "User {} is not in team {}",
                owner, requester.team_id
            )));
        }
        Ok(())
    }
}
