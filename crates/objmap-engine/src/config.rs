//! Mapper configuration

use serde::Deserialize;

/// What to do when automatic descent would re-enter a (target, source)
/// pair that is already being mapped further up the stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Leave the property as it is and carry on
    #[default]
    Skip,

    /// Fail the mapping call with `Error::CyclicDescent`
    Fail,
}

/// Configuration for a [`Mapper`](crate::Mapper)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Resolve nested source properties that can supply a nested target
    /// property (default: true)
    pub flattening: bool,

    /// How many property levels of the source are searched for flattening
    /// candidates (default: 2)
    pub max_flatten_depth: usize,

    /// Maximum nesting of recursive mapping calls (default: 64)
    pub max_depth: usize,

    /// Cycle handling during automatic descent (default: skip)
    pub cycle_policy: CyclePolicy,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            flattening: true,
            max_flatten_depth: 2,
            max_depth: 64,
            cycle_policy: CyclePolicy::default(),
        }
    }
}

impl MapperConfig {
    /// Parse a configuration from YAML.
    ///
    /// Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on malformed YAML or invalid limits.
    pub fn from_yaml_str(yaml: &str) -> crate::Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()
    }

    /// Check the limits.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a limit is zero.
    pub fn validate(self) -> crate::Result<Self> {
        if self.max_depth == 0 {
            return Err(crate::Error::Config("max_depth must be at least 1".to_string()));
        }
        if self.flattening && self.max_flatten_depth == 0 {
            return Err(crate::Error::Config(
                "max_flatten_depth must be at least 1 when flattening is enabled".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn with_flattening(mut self, enabled: bool) -> Self {
        self.flattening = enabled;
        self
    }

    pub fn with_max_flatten_depth(mut self, depth: usize) -> Self {
        self.max_flatten_depth = depth;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapperConfig::default();
        assert!(config.flattening);
        assert_eq!(config.max_flatten_depth, 2);
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.cycle_policy, CyclePolicy::Skip);
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = MapperConfig::from_yaml_str(
            r#"
cycle_policy: fail
max_depth: 8
"#,
        )
        .unwrap();
        assert_eq!(config.cycle_policy, CyclePolicy::Fail);
        assert_eq!(config.max_depth, 8);
        assert!(config.flattening);
    }

    #[test]
    fn test_from_yaml_rejects_zero_depth() {
        let err = MapperConfig::from_yaml_str("max_depth: 0").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_from_yaml_rejects_unknown_policy() {
        let err = MapperConfig::from_yaml_str("cycle_policy: explode").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_from_json() {
        let config: MapperConfig =
            serde_json::from_str(r#"{"flattening": false, "max_flatten_depth": 0}"#).unwrap();
        let config = config.validate().unwrap();
        assert!(!config.flattening);
    }

    #[test]
    fn test_builders() {
        let config = MapperConfig::default()
            .with_flattening(false)
            .with_max_depth(3)
            .with_cycle_policy(CyclePolicy::Fail);
        assert!(!config.flattening);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.cycle_policy, CyclePolicy::Fail);
    }
}
