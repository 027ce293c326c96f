use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{PedigreeError, Result};
use crate::types::{BreedingPolicy, PolicyUpdate};

/// Runtime knobs for repository access and traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Per-lookup timeout; 0 disables it
    pub lookup_timeout_ms: u64,
    /// Wall-clock budget for one ancestry traversal; 0 disables it
    pub traversal_deadline_ms: u64,
    /// Lookup worker threads (0 = auto-detect)
    pub lookup_threads: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 500,
            traversal_deadline_ms: 5_000,
            lookup_threads: 0,
        }
    }
}

impl EngineSettings {
    pub fn lookup_timeout(&self) -> Option<Duration> {
        (self.lookup_timeout_ms > 0).then(|| Duration::from_millis(self.lookup_timeout_ms))
    }

    pub fn traversal_deadline(&self) -> Option<Duration> {
        (self.traversal_deadline_ms > 0).then(|| Duration::from_millis(self.traversal_deadline_ms))
    }
}

/// Contents of the TOML configuration file.
///
/// ```toml
/// [engine]
/// lookup_timeout_ms = 250
///
/// [policy]
/// inbreeding_limit = 6.25
/// max_generations = 6
///
/// [policy.dysplasia_matrix.A]
/// A = true
/// B = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PedigreeConfig {
    pub engine: EngineSettings,
    /// Overrides applied on top of the default policy at startup
    #[serde(skip_serializing_if = "PolicyUpdate::is_empty")]
    pub policy: PolicyUpdate,
}

impl PedigreeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            PedigreeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: PedigreeConfig = toml::from_str(&raw).map_err(|e| {
            PedigreeError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.initial_policy()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path` when given and present, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| PedigreeError::Config(format!("Failed to render config: {}", e)))?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// The policy the store starts with: defaults plus the `[policy]` overrides
    pub fn initial_policy(&self) -> Result<BreedingPolicy> {
        BreedingPolicy::default().apply(&self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DysplasiaGrade;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() -> Result<()> {
        let config = PedigreeConfig::load_or_default(None)?;
        assert_eq!(config.engine, EngineSettings::default());
        assert_eq!(config.initial_policy()?, BreedingPolicy::default());
        Ok(())
    }

    #[test]
    fn test_load_partial_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("pedigree.toml");
        let mut file = fs::File::create(&path)?;
        writeln!(file, "[engine]")?;
        writeln!(file, "lookup_timeout_ms = 0")?;
        writeln!(file, "[policy]")?;
        writeln!(file, "inbreeding_limit = 6.25")?;
        writeln!(file, "[policy.dysplasia_matrix.A]")?;
        writeln!(file, "A = true")?;
        writeln!(file, "C = true")?;

        let config = PedigreeConfig::load(&path)?;
        assert_eq!(config.engine.lookup_timeout(), None);
        assert_eq!(config.engine.traversal_deadline_ms, 5_000);

        let policy = config.initial_policy()?;
        assert_eq!(policy.inbreeding_limit, 6.25);
        assert_eq!(policy.max_generations, 5);
        assert!(policy.dysplasia_matrix.get(DysplasiaGrade::A, DysplasiaGrade::C));
        assert!(!policy.dysplasia_matrix.get(DysplasiaGrade::C, DysplasiaGrade::A));
        assert!(!policy.dysplasia_matrix.get(DysplasiaGrade::B, DysplasiaGrade::B));
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range_policy() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("pedigree.toml");
        fs::write(&path, "[policy]\nmax_generations = 42\n")?;

        assert!(matches!(
            PedigreeConfig::load(&path),
            Err(PedigreeError::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn test_save_then_load_keeps_policy() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("pedigree.toml");

        let mut policy = BreedingPolicy::default();
        policy.max_generations = 7;
        policy
            .dysplasia_matrix
            .set_symmetric(DysplasiaGrade::B, DysplasiaGrade::C, true);
        let config = PedigreeConfig {
            engine: EngineSettings::default(),
            policy: PolicyUpdate::from(&policy),
        };
        config.save(&path)?;

        let reloaded = PedigreeConfig::load(&path)?;
        assert_eq!(reloaded.initial_policy()?, policy);
        Ok(())
    }
}
