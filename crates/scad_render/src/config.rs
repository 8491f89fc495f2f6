use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Which backend the hybrid selector should prefer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredBackend {
    #[default]
    Auto,
    Local,
    Wasm,
}

/// Engine-wide configuration: cache budget, timeouts, backend preference,
/// fallback policy, and asset locations. Constructed via [`EngineConfig::builder`]
/// or loaded from a TOML file with [`EngineConfig::from_toml_str`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub cache_budget_bytes: u64,
    #[serde(with = "humantime_millis")]
    pub local_timeout: Duration,
    #[serde(with = "humantime_millis")]
    pub wasm_timeout: Duration,
    pub preferred_backend: PreferredBackend,
    pub fallback_enabled: bool,
    pub asset_root: Option<PathBuf>,
    pub max_concurrent_local_renders: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: 256 * 1024 * 1024,
            local_timeout: Duration::from_secs(30),
            wasm_timeout: Duration::from_secs(10),
            preferred_backend: PreferredBackend::Auto,
            fallback_enabled: true,
            asset_root: None,
            max_concurrent_local_renders: 2,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parses a TOML document, e.g. loaded from a host's project config.
    pub fn from_toml_str(toml_text: &str) -> Result<Self, RenderError> {
        toml::from_str(toml_text).map_err(|e| RenderError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<(), RenderError> {
        if self.cache_budget_bytes == 0 {
            return Err(RenderError::Config(
                "cache_budget_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_local_renders == 0 {
            return Err(RenderError::Config(
                "max_concurrent_local_renders must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Clone, Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn cache_budget_bytes(mut self, bytes: u64) -> Self {
        self.config.cache_budget_bytes = bytes;
        self
    }

    pub fn local_timeout(mut self, timeout: Duration) -> Self {
        self.config.local_timeout = timeout;
        self
    }

    pub fn wasm_timeout(mut self, timeout: Duration) -> Self {
        self.config.wasm_timeout = timeout;
        self
    }

    pub fn preferred_backend(mut self, preferred: PreferredBackend) -> Self {
        self.config.preferred_backend = preferred;
        self
    }

    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.config.fallback_enabled = enabled;
        self
    }

    pub fn asset_root(mut self, root: impl AsRef<Path>) -> Self {
        self.config.asset_root = Some(root.as_ref().to_path_buf());
        self
    }

    pub fn max_concurrent_local_renders(mut self, n: usize) -> Self {
        self.config.max_concurrent_local_renders = n;
        self
    }

    pub fn build(self) -> Result<EngineConfig, RenderError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod humantime_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_budgets() {
        let config = EngineConfig::default();
        assert!(config.fallback_enabled);
        assert_eq!(config.preferred_backend, PreferredBackend::Auto);
    }

    #[test]
    fn builder_rejects_zero_cache_budget() {
        let result = EngineConfig::builder().cache_budget_bytes(0).build();
        assert!(matches!(result, Err(RenderError::Config(_))));
    }

    #[test]
    fn builder_applies_overrides() {
        let config = EngineConfig::builder()
            .preferred_backend(PreferredBackend::Local)
            .fallback_enabled(false)
            .max_concurrent_local_renders(4)
            .build()
            .unwrap();
        assert_eq!(config.preferred_backend, PreferredBackend::Local);
        assert!(!config.fallback_enabled);
        assert_eq!(config.max_concurrent_local_renders, 4);
    }

    #[test]
    fn parses_from_toml() {
        let toml_text = r#"
            cache_budget_bytes = 1048576
            local_timeout = 5000
            wasm_timeout = 2000
            preferred_backend = "wasm"
            fallback_enabled = false
            max_concurrent_local_renders = 1
        "#;
        let config = EngineConfig::from_toml_str(toml_text).unwrap();
        assert_eq!(config.preferred_backend, PreferredBackend::Wasm);
        assert_eq!(config.local_timeout, Duration::from_secs(5));
    }
}
