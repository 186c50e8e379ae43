//! Local service-catalog loader.
//!
//! The bookable catalog ships as a JSON file rather than an API call. Path
//! resolution is container friendly: an environment override first, then the
//! working directory, the project root, and finally the conventional
//! container mount point.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;

use crate::services::types::{HealthService, Sector};

/// Conventional mount point when running containerized.
const CONTAINER_DATA_PATH: &str = "/app/data/all_services.json";

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    services: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    uuid: String,
    name: String,
    code: String,
    #[serde(default)]
    synonyms: Vec<String>,
}

/// Loads and caches the health-service catalog.
pub struct ServiceCatalog {
    data_file: PathBuf,
    cache: RwLock<Option<Vec<HealthService>>>,
}

impl ServiceCatalog {
    /// Creates a catalog, resolving the data file location.
    ///
    /// `override_path` usually comes from `DATA_FILE_PATH`.
    pub fn new(override_path: Option<&str>) -> Self {
        let data_file = Self::resolve_data_file(override_path);
        log::info!("[Catalog] Using data file: {}", data_file.display());
        Self {
            data_file,
            cache: RwLock::new(None),
        }
    }

    /// Creates a catalog over a known file path, bypassing resolution.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            data_file: path.into(),
            cache: RwLock::new(None),
        }
    }

    fn resolve_data_file(override_path: Option<&str>) -> PathBuf {
        if let Some(path) = override_path {
            let path = Path::new(path);
            if path.exists() {
                return path.to_path_buf();
            }
            log::warn!(
                "[Catalog] Configured data file {} does not exist, falling back",
                path.display()
            );
        }

        let cwd_path = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data")
            .join("all_services.json");
        if cwd_path.exists() {
            return cwd_path;
        }

        let project_path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("data")
            .join("all_services.json");
        if project_path.exists() {
            return project_path;
        }

        let container_path = PathBuf::from(CONTAINER_DATA_PATH);
        if container_path.exists() {
            return container_path;
        }

        log::warn!(
            "[Catalog] Data file not found, using fallback: {}",
            project_path.display()
        );
        project_path
    }

    fn load_from_file(&self) -> Vec<HealthService> {
        log::info!("[Catalog] Loading services from {}", self.data_file.display());

        let content = match std::fs::read_to_string(&self.data_file) {
            Ok(content) => content,
            Err(e) => {
                log::error!(
                    "[Catalog] Cannot read data file {}: {}",
                    self.data_file.display(),
                    e
                );
                return Vec::new();
            }
        };

        let parsed: CatalogFile = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::error!("[Catalog] Invalid JSON in data file: {}", e);
                return Vec::new();
            }
        };

        let services: Vec<HealthService> = parsed
            .services
            .into_iter()
            .map(|entry| HealthService {
                uuid: entry.uuid,
                name: entry.name,
                code: entry.code,
                synonyms: entry.synonyms,
                // Primary catalog entries always sit in the base sector.
                sector: Sector::HealthServices,
            })
            .collect();

        log::info!("[Catalog] Loaded {} services", services.len());
        services
    }

    /// Returns the cached catalog, loading it on first use.
    pub fn health_services(&self) -> Vec<HealthService> {
        if let Some(cached) = self.cache.read().as_ref() {
            return cached.clone();
        }

        let services = self.load_from_file();
        *self.cache.write() = Some(services.clone());
        services
    }

    /// Number of services in the catalog.
    pub fn service_count(&self) -> usize {
        self.health_services().len()
    }

    /// Builds a catalog over an in-memory service list.
    pub fn with_services(services: Vec<HealthService>) -> Self {
        let catalog = Self::from_path("in-memory");
        *catalog.cache.write() = Some(services);
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_services_from_file() {
        let file = write_catalog(
            r#"{"services":[
                {"uuid":"u1","name":"RX Caviglia Destra","code":"RRAD0019","synonyms":["Radiografia Caviglia Destra"]},
                {"uuid":"u2","name":"Visita Cardiologica","code":"PCAR0001"}
            ]}"#,
        );
        let catalog = ServiceCatalog::from_path(file.path());

        let services = catalog.health_services();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].code, "RRAD0019");
        assert_eq!(services[0].sector, Sector::HealthServices);
        assert_eq!(services[1].synonyms.len(), 0);
    }

    #[test]
    fn caches_after_first_load() {
        let file = write_catalog(r#"{"services":[{"uuid":"u1","name":"A","code":"C1"}]}"#);
        let catalog = ServiceCatalog::from_path(file.path().to_path_buf());
        assert_eq!(catalog.service_count(), 1);

        // Deleting the file does not invalidate the cache.
        drop(file);
        assert_eq!(catalog.service_count(), 1);
    }

    #[test]
    fn missing_file_yields_empty_catalog() {
        let catalog = ServiceCatalog::from_path("/nonexistent/services.json");
        assert!(catalog.health_services().is_empty());
    }

    #[test]
    fn malformed_json_yields_empty_catalog() {
        let file = write_catalog("not json");
        let catalog = ServiceCatalog::from_path(file.path());
        assert!(catalog.health_services().is_empty());
    }
}
