//! Engine configuration loaded from YAML.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use dhsbpp_packing::{BinParams, Packer, PackingPolicy, SeparationPolicy};
use dhsbpp_rebalance::RetieMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_capacity: f64,
    /// Percent of `max_capacity` usable by packing.
    pub allocation_factor: f64,
    /// Hysteresis band around the allocation factor, in percent.
    pub reallocation_delta: f64,
    /// Epochs used for initial sizing and as the sliding window width.
    pub initial_window: usize,
    pub separation_policy: SeparationPolicy,
    pub packing_policy: PackingPolicy,
    pub retie_mode: RetieMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000.0,
            allocation_factor: 60.0,
            reallocation_delta: 20.0,
            initial_window: 30,
            separation_policy: SeparationPolicy::Root,
            packing_policy: PackingPolicy::FirstFitDecreasing,
            retie_mode: RetieMode::Exact,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: EngineConfig =
            serde_yaml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bin_params()?;
        if self.initial_window == 0 {
            bail!("initial_window must be at least 1");
        }
        Ok(())
    }

    pub fn bin_params(&self) -> Result<BinParams> {
        Ok(BinParams::new(self.max_capacity, self.allocation_factor, self.reallocation_delta)?)
    }

    pub fn packer(&self) -> Packer {
        Packer::new(self.packing_policy, self.separation_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_capacity: 500\nseparation_policy: max_child\nretie_mode: recompute").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_capacity, 500.0);
        assert_eq!(config.separation_policy, SeparationPolicy::MaxChild);
        assert_eq!(config.retie_mode, RetieMode::Recompute);
        assert_eq!(config.allocation_factor, 60.0);
        assert_eq!(config.bin_params().unwrap().volume(), 300.0);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_capacty: 5").unwrap();
        assert!(EngineConfig::load(file.path()).is_err());

        let config = EngineConfig { reallocation_delta: 70.0, ..Default::default() };
        assert!(config.validate().is_err());
        let config = EngineConfig { initial_window: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
