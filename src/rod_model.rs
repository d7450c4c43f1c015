use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Classifies particle types of a simulation into rod beads and everything else.
pub trait RodModel {
    /// `adjusted_type` is the dumped particle type minus the run's type offset.
    fn is_rod_body_type(&self, adjusted_type: i64) -> bool;
}

fn default_num_states() -> usize {
    1
}

/// Rod model description, loaded from a TOML file.
///
/// ```toml
/// name = "two-state rods"
/// num_states = 2
/// body_bead_types = [1, 2]
/// patch_bead_types = [3, 4]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RodModelConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_num_states")]
    pub num_states: usize,
    pub body_bead_types: Vec<i64>,
    #[serde(default)]
    pub patch_bead_types: Vec<i64>,
}

impl RodModelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        content.parse()
    }

    fn validate(self) -> Result<Self> {
        if self.num_states == 0 {
            return Err(Error::ModelConfig("num_states must be at least 1".into()));
        }
        if self.body_bead_types.is_empty() {
            return Err(Error::ModelConfig("body_bead_types must not be empty".into()));
        }
        if let Some(t) = self
            .patch_bead_types
            .iter()
            .find(|t| self.body_bead_types.contains(*t))
        {
            return Err(Error::ModelConfig(format!(
                "type {t} is both a body and a patch bead type"
            )));
        }
        Ok(self)
    }
}

impl std::str::FromStr for RodModelConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str::<Self>(s)
            .map_err(|e| Error::ModelConfig(e.to_string()))?
            .validate()
    }
}

impl RodModel for RodModelConfig {
    fn is_rod_body_type(&self, adjusted_type: i64) -> bool {
        self.body_bead_types.contains(&adjusted_type)
    }
}
