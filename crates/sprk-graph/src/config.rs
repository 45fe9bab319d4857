use std::path::Path;

use serde::{Deserialize, Serialize};
use sprk_types::ReferenceMode;

use crate::error::{GraphError, GraphResult};
use crate::external::MissingResolverPolicy;

/// Configuration for a graph writer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Requested routing of shared/external edges. Without a handler the
    /// effective mode is always all-shared.
    pub reference_mode: ReferenceMode,
    /// Compress shared + primary blocks into one zstd run.
    pub compression: bool,
    /// zstd level used when `compression` is set.
    pub compression_level: i32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            reference_mode: ReferenceMode::Mixed,
            compression: false,
            compression_level: 3,
        }
    }
}

impl WriterConfig {
    /// Default configuration with compression enabled.
    pub fn compressed() -> Self {
        Self {
            compression: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> GraphResult<()> {
        let levels = zstd::compression_level_range();
        if self.compression && !levels.contains(&self.compression_level) {
            return Err(GraphError::Config(format!(
                "compression level {} outside {}..={}",
                self.compression_level,
                levels.start(),
                levels.end()
            )));
        }
        Ok(())
    }
}

/// Configuration for a graph reader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Behavior for external edges when no resolver is configured.
    pub missing_resolver: MissingResolverPolicy,
    /// Upper bound on the declared shared-object count.
    pub max_shared_objects: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            missing_resolver: MissingResolverPolicy::Lenient,
            max_shared_objects: 1 << 24,
        }
    }
}

impl ReaderConfig {
    /// Default configuration that fails on unresolvable external edges.
    pub fn strict() -> Self {
        Self {
            missing_resolver: MissingResolverPolicy::Strict,
            ..Default::default()
        }
    }
}

/// Writer and reader settings loaded together from one TOML document.
///
/// ```toml
/// [writer]
/// reference_mode = "all-shared"
/// compression = true
/// compression_level = 9
///
/// [reader]
/// missing_resolver = "strict"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub writer: WriterConfig,
    pub reader: ReaderConfig,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> GraphResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| GraphError::Config(e.to_string()))?;
        config.writer.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> GraphResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> GraphResult<String> {
        toml::to_string(self).map_err(|e| GraphError::Config(e.to_string()))
    }
}
