//! Engine configuration, persisted as TOML.
//!
//! ```toml
//! [grounding]
//! eliminate_negative_weights = true
//!
//! [inference]
//! method = "ilp"
//!
//! [inference.ilp]
//! rounding = "round_up"
//! ```
//!
//! Every field has a default, so a partial file (or none) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ground::GroundingOptions;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub grounding: GroundingConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// Split negative-weight clauses into positive-weight units.
    #[serde(default)]
    pub eliminate_negative_weights: bool,
    /// Rewrite `w !a` as `-w a`.
    #[serde(default)]
    pub eliminate_negated_unit: bool,
    /// Clique register partitions; 0 uses the rayon thread count.
    #[serde(default)]
    pub partitions: usize,
    /// Bound on atoms-of-interest expansion rounds.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

fn default_max_rounds() -> usize {
    crate::ground::DEFAULT_MAX_ROUNDS
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            eliminate_negative_weights: false,
            eliminate_negated_unit: false,
            partitions: 0,
            max_rounds: default_max_rounds(),
        }
    }
}

impl GroundingConfig {
    pub fn options(&self) -> GroundingOptions {
        GroundingOptions {
            eliminate_negative_weights: self.eliminate_negative_weights,
            eliminate_negated_unit: self.eliminate_negated_unit,
        }
    }

    pub fn partition_count(&self) -> usize {
        if self.partitions == 0 {
            rayon::current_num_threads()
        } else {
            self.partitions
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceMethod {
    #[default]
    #[serde(rename = "maxwalksat")]
    MaxWalkSat,
    #[serde(rename = "ilp")]
    Ilp,
}

impl std::fmt::Display for InferenceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceMethod::MaxWalkSat => write!(f, "maxwalksat"),
            InferenceMethod::Ilp => write!(f, "ilp"),
        }
    }
}

impl std::str::FromStr for InferenceMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maxwalksat" | "mws" => Ok(InferenceMethod::MaxWalkSat),
            "ilp" | "lp" => Ok(InferenceMethod::Ilp),
            other => Err(format!("unknown inference method \"{other}\"")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub method: InferenceMethod,
    #[serde(default)]
    pub maxwalksat: MaxWalkSatConfig,
    #[serde(default)]
    pub ilp: IlpConfig,
}

/// Starting assignment of free atoms in each try.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialState {
    #[default]
    AllFalse,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxWalkSatConfig {
    #[serde(default = "default_max_flips")]
    pub max_flips: u64,
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    /// Stop a try once cost reaches this value.
    #[serde(default)]
    pub target_cost: f64,
    /// Probability of a random-walk move.
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Flips during which a just-flipped atom may not flip back (0 disables).
    #[serde(default = "default_tabu_length")]
    pub tabu_length: u64,
    /// Independent chains run in parallel.
    #[serde(default = "default_chains")]
    pub chains: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub init: InitialState,
}

fn default_max_flips() -> u64 {
    100_000
}
fn default_max_tries() -> u32 {
    1
}
fn default_noise() -> f64 {
    0.5
}
fn default_tabu_length() -> u64 {
    5
}
fn default_chains() -> usize {
    1
}
fn default_seed() -> u64 {
    0x5eed
}

impl Default for MaxWalkSatConfig {
    fn default() -> Self {
        Self {
            max_flips: default_max_flips(),
            max_tries: default_max_tries(),
            target_cost: 0.0,
            noise: default_noise(),
            tabu_length: default_tabu_length(),
            chains: default_chains(),
            seed: default_seed(),
            init: InitialState::default(),
        }
    }
}

/// How fractional LP values become truth values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    #[default]
    RoundUp,
    LocalSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlpConfig {
    #[serde(default)]
    pub rounding: Rounding,
    /// Values above `1 - tol` count as 1, below `tol` as 0.
    #[serde(default = "default_integrality_tolerance")]
    pub integrality_tolerance: f64,
    /// Add Hamming loss against the annotation to the objective.
    #[serde(default)]
    pub loss_augmented: bool,
    #[serde(default = "default_max_pivots")]
    pub max_pivots: usize,
}

fn default_integrality_tolerance() -> f64 {
    0.01
}
fn default_max_pivots() -> usize {
    crate::lp::simplex::DEFAULT_MAX_PIVOTS
}

impl Default for IlpConfig {
    fn default() -> Self {
        Self {
            rounding: Rounding::default(),
            integrality_tolerance: default_integrality_tolerance(),
            loss_augmented: false,
            max_pivots: default_max_pivots(),
        }
    }
}

impl EngineConfig {
    /// Reject values no inference run can use.
    pub fn validate(&self) -> ConfigResult<()> {
        let mws = &self.inference.maxwalksat;
        if !(0.0..=1.0).contains(&mws.noise) {
            return Err(ConfigError::Invalid {
                message: format!("maxwalksat.noise must be in [0, 1], got {}", mws.noise),
            });
        }
        if mws.chains == 0 || mws.max_tries == 0 {
            return Err(ConfigError::Invalid {
                message: "maxwalksat.chains and maxwalksat.max_tries must be at least 1".into(),
            });
        }
        let tol = self.inference.ilp.integrality_tolerance;
        if !(tol > 0.0 && tol < 0.5) {
            return Err(ConfigError::Invalid {
                message: format!("ilp.integrality_tolerance must be in (0, 0.5), got {tol}"),
            });
        }
        if self.grounding.max_rounds == 0 {
            return Err(ConfigError::Invalid {
                message: "grounding.max_rounds must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Load and validate from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml().map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }
}
