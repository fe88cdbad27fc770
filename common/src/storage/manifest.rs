use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{error::AppError, utils::hashing::sha256_hex};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Splitter settings captured in the manifest. Field order is the canonical
/// serialization order used for the config fingerprint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitterConfig {
    pub sent_window_overlap: usize,
    pub sent_window_size: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            sent_window_overlap: 2,
            sent_window_size: 10,
        }
    }
}

impl SplitterConfig {
    /// SHA-256 over the canonical JSON form; a fingerprint change forces a
    /// full re-chunk of every source file.
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{{\"sent_window_overlap\":{},\"sent_window_size\":{}}}",
            self.sent_window_overlap, self.sent_window_size
        );
        sha256_hex(canonical.as_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ManifestConfig {
    #[serde(default)]
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub config_fingerprint: String,
}

/// Per-file ingestion record keyed by the workspace-relative source path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestFileEntry {
    pub doc_id: String,
    pub content_hash: String,
    pub chunks_count: usize,
    pub updated_at: String,
}

/// Idempotency manifest driving incremental rebuilds: a file is re-chunked
/// iff its content hash or the splitter fingerprint changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionManifest {
    pub schema_version: u32,
    #[serde(default)]
    pub config: ManifestConfig,
    #[serde(default)]
    pub files: BTreeMap<String, ManifestFileEntry>,
}

impl Default for IngestionManifest {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            config: ManifestConfig::default(),
            files: BTreeMap::new(),
        }
    }
}

impl IngestionManifest {
    /// Loads the manifest, falling back to an empty structure when the file
    /// is missing or malformed so all sources are treated as new.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self {
                config: ManifestConfig {
                    splitter: SplitterConfig {
                        sent_window_overlap: 0,
                        sent_window_size: 0,
                    },
                    config_fingerprint: String::new(),
                },
                ..Self::default()
            };
        }
        match fs::read_to_string(path).map_err(AppError::from).and_then(|raw| {
            serde_json::from_str::<Self>(&raw).map_err(AppError::from)
        }) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to load manifest; starting fresh");
                Self {
                    config: ManifestConfig {
                        splitter: SplitterConfig {
                            sent_window_overlap: 0,
                            sent_window_size: 0,
                        },
                        config_fingerprint: String::new(),
                    },
                    ..Self::default()
                }
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), files = self.files.len(), "Updated manifest");
        Ok(())
    }
}

/// Vector index sidecar manifest; checked at load time against a probe
/// embedding so dimension drift fails fast before any query is served.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub model: String,
    pub dimension: usize,
    pub splitter: SplitterConfig,
    pub seeded_at: String,
}

impl IndexManifest {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|_| {
            AppError::NotFound(format!(
                "index manifest not found at {}; seed the index first",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
