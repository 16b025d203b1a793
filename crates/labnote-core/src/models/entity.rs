use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Kind of exportable record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Experiments,
    Items,
    ExperimentsTemplates,
    ItemsTypes,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Experiments,
        EntityType::Items,
        EntityType::ExperimentsTemplates,
        EntityType::ItemsTypes,
    ];

    /// Wire value used in query strings, slugs and database rows
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Experiments => "experiments",
            EntityType::Items => "items",
            EntityType::ExperimentsTemplates => "experiments_templates",
            EntityType::ItemsTypes => "items_types",
        }
    }

    /// Page used to build links back to the entity
    pub fn page(&self) -> &'static str {
        match self {
            EntityType::Experiments => "experiments.php",
            EntityType::Items => "database.php",
            EntityType::ExperimentsTemplates => "templates.php",
            EntityType::ItemsTypes => "resources-templates.php",
        }
    }

    /// Schema.org type used in RO-Crate manifests
    pub fn genre(&self) -> &'static str {
        match self {
            EntityType::Experiments => "experiment",
            EntityType::Items => "resource",
            EntityType::ExperimentsTemplates => "experiment template",
            EntityType::ItemsTypes => "resource template",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

/// Typed pointer to one exportable record, serialized as `<type>:<id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityReference {
    pub entity_type: EntityType,
    pub id: i64,
}

impl EntityReference {
    pub fn new(entity_type: EntityType, id: i64) -> Self {
        Self { entity_type, id }
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

impl FromStr for EntityReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid entity reference: {}", s))?;
        let entity_type = kind.parse::<EntityType>()?;
        let id = id
            .parse::<i64>()
            .map_err(|_| format!("Invalid entity id in reference: {}", s))?;
        Ok(Self { entity_type, id })
    }
}

impl Serialize for EntityReference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityReference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub body: String,
    pub finished: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Attachment metadata; the bytes live in storage under `storage_key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub real_name: String,
    pub storage_key: String,
    pub filesize: i64,
    pub hash: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub created_at: DateTime<Utc>,
    pub fullname: String,
    pub target: String,
    pub content: String,
}

/// Everything a maker needs to render one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityExport {
    pub id: i64,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub elabid: String,
    pub title: String,
    pub date: NaiveDate,
    pub body: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub rating: i16,
    pub userid: i64,
    pub fullname: String,
    pub team: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
    pub uploads: Vec<Upload>,
    pub changelog: Vec<ChangelogEntry>,
}

impl EntityExport {
    pub fn reference(&self) -> EntityReference {
        EntityReference::new(self.entity_type, self.id)
    }

    /// Absolute link to the entity page
    pub fn url(&self, public_url: &str) -> String {
        format!(
            "{}/{}?mode=view&id={}",
            public_url.trim_end_matches('/'),
            self.entity_type.page(),
            self.id
        )
    }

    /// First segment of the elabid, used to keep archive folder names unique
    pub fn short_elabid(&self) -> &str {
        self.elabid.split('-').next().unwrap_or(&self.elabid)
    }
}
