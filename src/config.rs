use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};


#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period of the backstop deadline sweep.
    pub sweep_interval_secs: u64,
    /// Displaced status records kept per node.
    pub max_history_per_node: usize,
    pub bind: String,
    pub port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 5,
            max_history_per_node: 16,
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|err| {
            Error::ValidationFailed(format!("reading {}: {}", path.display(), err))
        })?;
        Self::from_yaml(&body)
    }

    pub fn from_yaml(body: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(body)
            .map_err(|err| Error::ValidationFailed(format!("engine config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::ValidationFailed(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml("max_history_per_node: 3\nport: 8080\n").unwrap();
        assert_eq!(config.max_history_per_node, 3);
        assert_eq!(config.port, 8080);
        assert_eq!(config.sweep_interval_secs, 5);
        assert_eq!(config.bind, "0.0.0.0");
    }

    #[test]
    fn zero_sweep_is_rejected() {
        let err = EngineConfig::from_yaml("sweep_interval_secs: 0").unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sweep_interval_secs: 30").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.sweep_interval_secs, 30);

        assert!(EngineConfig::load("/nonexistent/engine.yaml").is_err());
    }
}
