//! Engine configuration.

use std::env;

/// Default cap on simultaneously open builder and query handles.
pub const DEFAULT_MAX_HANDLES: usize = 1024;

/// Diagnostic logging switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DebugFlags(u32);

impl DebugFlags {
    pub const NONE: DebugFlags = DebugFlags(0);
    /// Log every compiled plan and every execution.
    pub const LOG_QUERIES: DebugFlags = DebugFlags(1);
    /// Log parameter values on rebinding.
    pub const LOG_QUERY_PARAMETERS: DebugFlags = DebugFlags(2);

    pub fn from_bits(bits: u32) -> Self {
        DebugFlags(bits & 0b11)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: DebugFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse `queries,parameters` style lists or a numeric mask.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::NONE);
        }
        if let Ok(bits) = raw.parse::<u32>() {
            return Ok(Self::from_bits(bits));
        }
        raw.split(',')
            .map(str::trim)
            .try_fold(Self::NONE, |acc, name| match name {
                "queries" => Ok(acc | Self::LOG_QUERIES),
                "parameters" => Ok(acc | Self::LOG_QUERY_PARAMETERS),
                other => Err(ConfigError::InvalidDebugFlag(other.to_string())),
            })
    }
}

impl std::ops::BitOr for DebugFlags {
    type Output = DebugFlags;

    fn bitor(self, rhs: DebugFlags) -> DebugFlags {
        DebugFlags(self.0 | rhs.0)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of open builder and query handles
    pub max_handles: usize,
    /// Diagnostic logging
    pub debug_flags: DebugFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            debug_flags: DebugFlags::NONE,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `QUARRY_MAX_HANDLES` and `QUARRY_DEBUG_FLAGS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_handles = match lookup("QUARRY_MAX_HANDLES") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) | Err(_) => return Err(ConfigError::InvalidMaxHandles(raw)),
                Ok(n) => n,
            },
            None => DEFAULT_MAX_HANDLES,
        };

        let debug_flags = match lookup("QUARRY_DEBUG_FLAGS") {
            Some(raw) => DebugFlags::parse(&raw)?,
            None => DebugFlags::NONE,
        };

        Ok(Self {
            max_handles,
            debug_flags,
        })
    }

    pub fn with_max_handles(mut self, max_handles: usize) -> Self {
        self.max_handles = max_handles;
        self
    }

    pub fn with_debug_flags(mut self, debug_flags: DebugFlags) -> Self {
        self.debug_flags = debug_flags;
        self
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid QUARRY_MAX_HANDLES value: {0:?}")]
    InvalidMaxHandles(String),

    #[error("unknown debug flag: {0:?}")]
    InvalidDebugFlag(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn reads_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("QUARRY_MAX_HANDLES", "8"),
            ("QUARRY_DEBUG_FLAGS", "queries, parameters"),
        ]))
        .unwrap();
        assert_eq!(config.max_handles, 8);
        assert!(config.debug_flags.contains(DebugFlags::LOG_QUERIES));
        assert!(config
            .debug_flags
            .contains(DebugFlags::LOG_QUERY_PARAMETERS));
    }

    #[test]
    fn numeric_debug_mask() {
        assert_eq!(DebugFlags::parse("1").unwrap(), DebugFlags::LOG_QUERIES);
        assert_eq!(DebugFlags::parse("").unwrap(), DebugFlags::NONE);
    }

    #[test]
    fn rejects_bad_values() {
        let err = EngineConfig::from_lookup(lookup(&[("QUARRY_MAX_HANDLES", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidMaxHandles("0".into()));

        let err =
            EngineConfig::from_lookup(lookup(&[("QUARRY_DEBUG_FLAGS", "verbose")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidDebugFlag("verbose".into()));
    }
}
