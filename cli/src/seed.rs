use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use bson::DateTime as BsonDateTime;
use docman::db::catalog_repository::{CatalogRecord, CatalogRepository, MongoCatalogRepository};
use docman::db::models::{Category, ExternalContactType, Team};
use serde::Deserialize;

const BUNDLED: &str = include_str!("../seed/reference.yaml");

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceData {
    #[serde(default)]
    pub categories: Vec<NamedEntry>,
    #[serde(default)]
    pub contact_types: Vec<NamedEntry>,
    #[serde(default)]
    pub teams: Vec<NamedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ReferenceData {
    pub fn bundled() -> Result<Self> {
        serde_yaml::from_str(BUNDLED).context("Bundled reference data is invalid")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid reference data in {}", path.display()))
    }
}

/// Entries whose name is not taken yet, compared case-insensitively.
/// Duplicates within `entries` are dropped too.
pub fn missing_entries<'a>(
    entries: &'a [NamedEntry],
    existing: impl IntoIterator<Item = &'a str>,
) -> Vec<&'a NamedEntry> {
    let mut taken: HashSet<String> = existing
        .into_iter()
        .map(|n| n.trim().to_lowercase())
        .collect();
    entries
        .iter()
        .filter(|e| !e.name.trim().is_empty())
        .filter(|e| taken.insert(e.name.trim().to_lowercase()))
        .collect()
}

/// Something seedable from a [`NamedEntry`].
pub trait Seedable: CatalogRecord {
    fn name(&self) -> &str;
    fn from_entry(entry: &NamedEntry, now: BsonDateTime) -> Self;
}

impl Seedable for Category {
    fn name(&self) -> &str {
        &self.name
    }

    fn from_entry(entry: &NamedEntry, now: BsonDateTime) -> Self {
        Category {
            id: None,
            name: entry.name.trim().to_string(),
            description: entry.description.clone(),
            created_at: now,
        }
    }
}

impl Seedable for ExternalContactType {
    fn name(&self) -> &str {
        &self.name
    }

    fn from_entry(entry: &NamedEntry, now: BsonDateTime) -> Self {
        ExternalContactType {
            id: None,
            name: entry.name.trim().to_string(),
            created_at: now,
        }
    }
}

impl Seedable for Team {
    fn name(&self) -> &str {
        &self.name
    }

    fn from_entry(entry: &NamedEntry, now: BsonDateTime) -> Self {
        Team {
            id: None,
            name: entry.name.trim().to_string(),
            description: entry.description.clone(),
            members: vec![],
            created_at: now,
        }
    }
}

/// Insert the entries not present yet. Returns how many were added.
pub async fn seed<T: Seedable>(db: &mongodb::Database, entries: &[NamedEntry]) -> Result<usize> {
    let repo = MongoCatalogRepository::<T>::new(db);
    repo.ensure_indexes().await?;

    let existing = repo.list().await?;
    let missing = missing_entries(entries, existing.iter().map(Seedable::name));

    let now = BsonDateTime::now();
    for entry in &missing {
        repo.insert(T::from_entry(entry, now)).await?;
        tracing::debug!(collection = T::COLLECTION, name = %entry.name, "Seeded");
    }
    Ok(missing.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> NamedEntry {
        NamedEntry {
            name: name.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_bundled_data_parses() {
        let data = ReferenceData::bundled().unwrap();
        assert!(!data.categories.is_empty());
        assert!(!data.contact_types.is_empty());
        assert!(!data.teams.is_empty());
    }

    #[test]
    fn test_missing_entries_skips_existing_and_duplicates() {
        let entries = vec![entry("Policy"), entry("Form"), entry("form "), entry("  "), entry("Record")];
        let missing = missing_entries(&entries, ["policy"]);
        let names: Vec<&str> = missing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Form", "Record"]);
    }

    #[test]
    fn test_reference_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "categories:\n  - name: Audit\n    description: Audit reports").unwrap();

        let data = ReferenceData::from_file(file.path()).unwrap();
        assert_eq!(data.categories.len(), 1);
        assert_eq!(data.categories[0].description, "Audit reports");
        assert!(data.teams.is_empty());
    }
}
