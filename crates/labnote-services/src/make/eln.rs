//! ELN archive: a zip with one folder per entity and an RO-Crate manifest
//!
//! Layout:
//! ```text
//! 2024-01-01-120000-export/
//!   Buffer prep - 20240101/
//!     export-elabftw.json
//!     <attachments>
//!   ro-crate-metadata.json
//! ```
//! The manifest is written last so it can describe every file that actually made it
//! into the archive (attachments missing from storage are left out).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labnote_core::models::{EntityExport, EntityReference};
use labnote_core::AppError;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

use super::archive::{sanitize_archive_filename, zip_stream, EntryDigest, UniqueNames};
use super::{safe_file_name, ExportContext, StreamSink, StreamingMaker, CONTENT_TYPE_ELN};

const MANIFEST: &str = "ro-crate-metadata.json";
const ENTITY_JSON: &str = "export-elabftw.json";
const RO_CRATE_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";
const RO_CRATE_PROFILE: &str = "https://w3id.org/ro/crate/1.1";

/// Media type reported in the manifest for a file name
fn encoding_format(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

fn file_node(id: &str, name: &str, digest: &EntryDigest) -> Value {
    json!({
        "@id": id,
        "@type": "File",
        "name": name,
        "contentSize": digest.size,
        "sha256": digest.sha256,
        "encodingFormat": encoding_format(name),
    })
}

fn person_id(userid: i64) -> String {
    format!("#person-{}", userid)
}

/// Streaming maker for `.eln` archives
pub struct ElnMaker {
    context: ExportContext,
    references: Vec<EntityReference>,
    created_at: DateTime<Utc>,
}

impl ElnMaker {
    pub fn new(context: ExportContext, references: Vec<EntityReference>) -> Self {
        Self {
            context,
            references,
            created_at: Utc::now(),
        }
    }

    fn stamp(&self) -> String {
        self.created_at.format("%Y-%m-%d-%H%M%S").to_string()
    }

    fn dataset_node(&self, entity: &EntityExport, id: &str, parts: &[Value]) -> Value {
        let has_part: Vec<Value> = parts.iter().map(|p| json!({ "@id": p["@id"] })).collect();
        json!({
            "@id": id,
            "@type": "Dataset",
            "name": entity.title,
            "genre": entity.entity_type.genre(),
            "identifier": entity.elabid,
            "dateCreated": entity.created_at.to_rfc3339(),
            "dateModified": entity.modified_at.to_rfc3339(),
            "author": { "@id": person_id(entity.userid) },
            "keywords": entity.tags.join(","),
            "url": entity.url(&self.context.public_url),
            "hasPart": has_part,
        })
    }

    fn manifest(&self, datasets: Vec<Value>, files: Vec<Value>, people: BTreeMap<i64, String>) -> Value {
        let root_parts: Vec<Value> = datasets.iter().map(|d| json!({ "@id": d["@id"] })).collect();
        let mut graph = vec![
            json!({
                "@id": MANIFEST,
                "@type": "CreativeWork",
                "about": { "@id": "./" },
                "conformsTo": { "@id": RO_CRATE_PROFILE },
                "dateCreated": self.created_at.to_rfc3339(),
                "sdPublisher": { "@id": self.context.public_url },
            }),
            json!({
                "@id": "./",
                "@type": "Dataset",
                "name": format!("{}-export", self.stamp()),
                "description": "Export of laboratory notebook entries",
                "datePublished": self.created_at.to_rfc3339(),
                "hasPart": root_parts,
            }),
        ];
        graph.extend(datasets);
        graph.extend(files);
        graph.extend(people.into_iter().map(|(userid, fullname)| {
            json!({ "@id": person_id(userid), "@type": "Person", "name": fullname })
        }));
        json!({ "@context": RO_CRATE_CONTEXT, "@graph": graph })
    }
}

#[async_trait]
impl StreamingMaker for ElnMaker {
    fn name(&self) -> &'static str {
        "eln"
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_ELN
    }

    fn file_name(&self) -> String {
        format!("{}-export.eln", self.stamp())
    }

    async fn write_stream(&mut self, sink: &mut StreamSink) -> Result<(), AppError> {
        let entities = self.context.load(&self.references).await?;
        let root = format!("{}-export", self.stamp());
        let mut zip = zip_stream(sink);
        let mut folders = UniqueNames::new();
        let mut datasets = Vec::with_capacity(entities.len());
        let mut files = Vec::new();
        let mut people = BTreeMap::new();

        for entity in &entities {
            let folder = folders.reserve(&format!(
                "{} - {}",
                safe_file_name(&entity.title),
                entity.short_elabid()
            ));
            let dataset_id = format!("./{}/", folder);
            let mut names = UniqueNames::new();
            let mut parts = Vec::new();

            let json_name = names.reserve(ENTITY_JSON);
            let digest = zip
                .add_file(
                    &format!("{}/{}/{}", root, folder, json_name),
                    &serde_json::to_vec_pretty(entity)?,
                )
                .await?;
            parts.push(file_node(&format!("{}{}", dataset_id, json_name), &json_name, &digest));

            for upload in &entity.uploads {
                let fallback = format!("upload-{}", upload.id);
                let name = names.reserve(&sanitize_archive_filename(&upload.real_name, &fallback));
                let entry = format!("{}/{}/{}", root, folder, name);
                if let Some(digest) = zip
                    .add_stored_file(&entry, &self.context.storage, &upload.storage_key)
                    .await?
                {
                    parts.push(file_node(&format!("{}{}", dataset_id, name), &name, &digest));
                }
            }

            datasets.push(self.dataset_node(entity, &dataset_id, &parts));
            files.extend(parts);
            people.insert(entity.userid, entity.fullname.clone());
        }

        let manifest = self.manifest(datasets, files, people);
        zip.add_file(
            &format!("{}/{}", root, MANIFEST),
            &serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;
        zip.finish().await?;
        tracing::debug!(entities = entities.len(), "ELN archive written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make::test_support::{collect_stream, context, entity};
    use labnote_core::models::{EntityType, Upload};
    use std::io::{Cursor, Read};

    fn upload(id: i64, name: &str, key: &str) -> Upload {
        Upload {
            id,
            real_name: name.to_string(),
            storage_key: key.to_string(),
            filesize: 0,
            hash: None,
            comment: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_encoding_format() {
        assert_eq!(encoding_format("scan.PDF"), "application/pdf");
        assert_eq!(encoding_format("raw"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_eln_archive_layout_and_manifest() {
        let mut first = entity(EntityType::Experiments, 1, "Buffer prep");
        first.uploads = vec![
            upload(10, "../../secret/data.csv", "exp/1/data.csv"),
            upload(11, "gone.txt", "exp/1/gone.txt"),
        ];
        let second = entity(EntityType::Items, 2, "Buffer prep");
        let (context, _store, _dir) = context(vec![first, second]).await;
        context
            .storage
            .upload("exp/1/data.csv", b"a,b\n1,2\n".to_vec())
            .await
            .unwrap();

        let mut maker = ElnMaker::new(
            context,
            vec![
                EntityReference::new(EntityType::Experiments, 1),
                EntityReference::new(EntityType::Items, 2),
            ],
        );
        let root = format!("{}-export", maker.stamp());
        assert_eq!(maker.file_name(), format!("{}.eln", root));
        let bytes = collect_stream(&mut maker).await;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&format!("{}/Buffer prep - 20240101/export-elabftw.json", root)));
        assert!(names.contains(&format!("{}/Buffer prep - 20240101/data.csv", root)));
        assert!(names.contains(&format!("{}/Buffer prep - 20240101 (2)/export-elabftw.json", root)));
        assert!(!names.iter().any(|n| n.ends_with("gone.txt")));
        assert_eq!(names.last().unwrap(), &format!("{}/ro-crate-metadata.json", root));

        let mut manifest = String::new();
        archive
            .by_name(&format!("{}/ro-crate-metadata.json", root))
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        let manifest: Value = serde_json::from_str(&manifest).unwrap();
        let graph = manifest["@graph"].as_array().unwrap();
        let find = |id: &str| graph.iter().find(|n| n["@id"] == id).unwrap();

        assert_eq!(find("./")["hasPart"].as_array().unwrap().len(), 2);
        let dataset = find("./Buffer prep - 20240101/");
        assert_eq!(dataset["genre"], "experiment");
        assert_eq!(dataset["hasPart"].as_array().unwrap().len(), 2);
        let csv = find("./Buffer prep - 20240101/data.csv");
        assert_eq!(csv["contentSize"], 8);
        assert_eq!(csv["encodingFormat"], "text/csv");
        assert_eq!(csv["sha256"].as_str().unwrap().len(), 64);
        assert_eq!(find("#person-1")["name"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_eln_without_entities_is_valid() {
        let (context, _store, _dir) = context(Vec::new()).await;
        let mut maker = ElnMaker::new(context, Vec::new());
        let bytes = collect_stream(&mut maker).await;
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
    }
}
