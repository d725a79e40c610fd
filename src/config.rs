//! Aggregate engine configuration, loadable from a JSON file.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::eligibility::EligibilityConfig;
use crate::odds::OddsConfig;
use crate::rating::RatingConfig;
use crate::settle::ScoringConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rating: RatingConfig,
    pub eligibility: EligibilityConfig,
    pub odds: OddsConfig,
    pub scoring: ScoringConfig,
}
impl EngineConfig {
    pub fn read_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        let config: EngineConfig = serde_json::from_reader(file)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.rating.validate().context("rating config")?;
        self.eligibility.validate().context("eligibility config")?;
        self.odds.validate().context("odds config")?;
        self.scoring.validate().context("scoring config")?;
        Ok(())
    }
}
