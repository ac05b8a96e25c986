use crate::catalog::ProductSpec;
use serde::{Deserialize, Serialize};

/// Retry and locking policy for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attempts to obtain a reservation when the database is busy or a
    /// randomly picked number was taken by a concurrent checkout.
    #[serde(default = "default_reserve_attempts")]
    pub max_reserve_attempts:   u32,
    /// Attempts to commit a batch after losing a counter race.
    #[serde(default = "default_selection_attempts")]
    pub max_selection_attempts: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms:        u64,
}

fn default_reserve_attempts() -> u32 {
    3
}

fn default_selection_attempts() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    crate::store::DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_reserve_attempts:   default_reserve_attempts(),
            max_selection_attempts: default_selection_attempts(),
            busy_timeout_ms:        default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProductCatalogFile {
    products: Vec<ProductSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct EngineConfigFile {
    engine: EngineConfig,
}

/// Everything the runner loads from the data/ directory.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub products: Vec<ProductSpec>,
    pub engine:   EngineConfig,
}

impl CatalogConfig {
    /// Load from the data/ directory.
    /// `engine.json` is optional; defaults apply when it is missing.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/catalog/products.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: ProductCatalogFile = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;

        let engine_path = format!("{data_dir}/engine.json");
        let engine = match std::fs::read_to_string(&engine_path) {
            Ok(content) => {
                let f: EngineConfigFile = serde_json::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Cannot parse {engine_path}: {e}"))?;
                f.engine
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
            Err(e) => return Err(anyhow::anyhow!("Cannot read {engine_path}: {e}")),
        };

        Ok(Self {
            products: file.products,
            engine,
        })
    }
}
