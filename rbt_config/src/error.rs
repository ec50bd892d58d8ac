use std::fmt;

/// Failures while loading or saving an `rbt.toml`
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read or written
    Io(std::io::Error),
    /// The text is outside the TOML subset `TomlParser` reads; the message
    /// names the offending line
    Toml(String),
    /// A value has the wrong type or range, or `[tree]`/`[log]` holds a key
    /// no setting reads
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config file I/O failed: {}", e),
            ConfigError::Toml(msg) => write!(f, "invalid config syntax: {}", msg),
            ConfigError::Validation(msg) => write!(f, "invalid config value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::Io(error)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
