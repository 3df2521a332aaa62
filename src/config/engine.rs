use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Whether unification checks that a variable does not occur in the term it
/// is bound to.
///
/// Off by default, as in classical WAM designs. With the check off, rules
/// such as `p(X, f(X))` matched against `p(Y, Y)` build cyclic terms.
/// Unification treats those as rational trees and always terminates. A
/// cyclic head argument is reported as a fault when the derived fact is
/// read back; a cyclic binding is left out of the answer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccursCheck {
    On,
    #[default]
    Off,
}

impl OccursCheck {
    pub fn is_on(self) -> bool {
        matches!(self, OccursCheck::On)
    }
}

impl From<bool> for OccursCheck {
    fn from(enabled: bool) -> Self {
        if enabled {
            OccursCheck::On
        } else {
            OccursCheck::Off
        }
    }
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Occurs-check policy for every unification the machine performs
    pub occurs_check: OccursCheck,
    /// Size of the register bank (argument registers plus temporaries)
    pub registers: usize,
    /// Instruction budget per derivation attempt (0 = unlimited)
    pub max_steps: u64,
    /// Rounds of saturation before giving up on reaching a fixpoint
    pub max_rounds: usize,
    /// Run independent derivation attempts on the rayon pool
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            occurs_check: OccursCheck::Off,
            registers: 256,
            max_steps: 1_000_000,
            max_rounds: 32,
            parallel: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registers == 0 {
            return Err(ConfigError::Invalid(
                "registers must be at least 1".to_string(),
            ));
        }
        if self.registers > u16::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "registers must not exceed {}",
                u16::MAX
            )));
        }
        Ok(())
    }

    pub fn with_occurs_check(mut self, occurs_check: OccursCheck) -> Self {
        self.occurs_check = occurs_check;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineConfig, OccursCheck};

    #[test]
    fn defaults_follow_classical_wam() {
        let config = EngineConfig::default();
        assert_eq!(config.occurs_check, OccursCheck::Off);
        assert_eq!(config.registers, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml() {
        let config = EngineConfig::from_toml_str(
            "occurs_check = \"on\"\nmax_steps = 500\n",
        )
        .expect("valid config");
        assert!(config.occurs_check.is_on());
        assert_eq!(config.max_steps, 500);
        assert_eq!(config.max_rounds, EngineConfig::default().max_rounds);
    }

    #[test]
    fn reject_unknown_and_invalid_fields() {
        assert!(EngineConfig::from_toml_str("bogus = 1").is_err());
        assert!(EngineConfig::from_toml_str("registers = 0").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "parallel = false\n").expect("write");
        let config = EngineConfig::load(&path).expect("load");
        assert!(!config.parallel);
        assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
