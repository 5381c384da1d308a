//! JSON file collaborators for running against exported data.

use async_trait::async_trait;
use dashmap::DashMap;
use listing_core::{
    BuildingRegistry, EngineError, Listing, ListingSource, Pagination, RegistryRecord,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Registry read from a JSON array of `{address, jurisdictionCode}` records
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BuildingRegistry for JsonFileRegistry {
    async fn lookup(&self) -> Result<Vec<RegistryRecord>, EngineError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::RegistryUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let records: Vec<RegistryRecord> = serde_json::from_str(&raw).map_err(|e| {
            EngineError::RegistryUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        tracing::info!(
            "Loaded {} registry records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}

/// Listings read from `<dir>/<neighborhood>.json`, one JSON array per
/// neighborhood. The file is re-read whenever page 0 is requested and the
/// parsed snapshot is served from memory for later pages.
pub struct JsonDirListingSource {
    dir: PathBuf,
    snapshots: DashMap<String, Arc<Vec<Listing>>>,
}

impl JsonDirListingSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            snapshots: DashMap::new(),
        }
    }

    async fn load(&self, neighborhood: &str) -> Result<Arc<Vec<Listing>>, EngineError> {
        let path = self.dir.join(format!("{}.json", neighborhood));
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
        let listings: Vec<Listing> = serde_json::from_str(&raw)
            .map_err(|e| EngineError::InvalidData(format!("{}: {}", path.display(), e)))?;

        let snapshot = Arc::new(listings);
        self.snapshots
            .insert(neighborhood.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

#[async_trait]
impl ListingSource for JsonDirListingSource {
    async fn fetch_active(
        &self,
        neighborhood: &str,
        pagination: Pagination,
    ) -> Result<Vec<Listing>, EngineError> {
        let cached = self.snapshots.get(neighborhood).map(|s| Arc::clone(s.value()));
        let snapshot = match cached {
            Some(snapshot) if pagination.page > 0 => snapshot,
            _ => self.load(neighborhood).await?,
        };

        Ok(snapshot
            .iter()
            .skip(pagination.offset())
            .take(pagination.page_size as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_core::PropertyKind;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("valuation-files-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn listing(id: &str) -> Listing {
        Listing {
            id: id.to_string(),
            address: "1 Bleecker St".to_string(),
            price: 2900.0,
            bedrooms: 1,
            bathrooms: 1.0,
            sqft: None,
            built_year: None,
            neighborhood: "noho".to_string(),
            amenities: Default::default(),
            description: String::new(),
            property_kind: PropertyKind::Rental,
        }
    }

    #[tokio::test]
    async fn test_registry_reads_camel_case_records() {
        let dir = scratch_dir("registry");
        let path = dir.join("registry.json");
        std::fs::write(
            &path,
            r#"[{"address": "140 Ludlow St", "jurisdictionCode": "MN"}]"#,
        )
        .unwrap();

        let records = JsonFileRegistry::new(&path).lookup().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].jurisdiction_code, "MN");

        let missing = JsonFileRegistry::new(dir.join("absent.json")).lookup().await;
        assert!(matches!(missing, Err(EngineError::RegistryUnavailable(_))));
    }

    #[tokio::test]
    async fn test_listing_source_paginates() {
        let dir = scratch_dir("listings");
        let listings: Vec<Listing> = (0..5).map(|i| listing(&format!("L{i}"))).collect();
        std::fs::write(dir.join("noho.json"), serde_json::to_string(&listings).unwrap()).unwrap();

        let source = JsonDirListingSource::new(&dir);
        let first = source.fetch_active("noho", Pagination::first(2)).await.unwrap();
        let third = source
            .fetch_active("noho", Pagination::first(2).next().next())
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].id, "L4");

        let missing = source.fetch_active("tribeca", Pagination::first(2)).await;
        assert!(matches!(missing, Err(EngineError::SourceUnavailable(_))));
    }
}
