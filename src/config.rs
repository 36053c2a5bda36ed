//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! [grounding]
//! max_passes = 10
//!
//! [compiler]
//! hard_constraint_weight = 1000.0
//!
//! [solver]
//! penalty = 1.0
//! max_iterations = 1000
//! selection = { kind = "uniform", samples = 64 }
//!
//! [solver.convergence]
//! point_change = 1e-6
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::admm::AdmmConfig;
use crate::compile::CompilerConfig;
use crate::error::EngineError;
use crate::ground::GroundingConfig;

/// Configuration for every stage of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grounding: GroundingConfig,
    pub compiler: CompilerConfig,
    pub solver: AdmmConfig,
}

impl EngineConfig {
    /// Load from a TOML file. Missing sections and fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| EngineError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let content = self.to_toml().map_err(|message| EngineError::ConfigParse {
            path: path.display().to_string(),
            message,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::ConfigWrite {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| EngineError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Pretty TOML rendering.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.grounding.max_passes == 0 {
            return Err(EngineError::InvalidConfig {
                message: "grounding.max_passes must be > 0".into(),
            });
        }
        let hard = self.compiler.hard_constraint_weight;
        if !(hard.is_finite() && hard >= 0.0) {
            return Err(EngineError::InvalidConfig {
                message: "compiler.hard_constraint_weight must be finite and non-negative".into(),
            });
        }
        self.solver.validate()
    }
}
