use thiserror::Error;

/// Boxed error type accepted from service factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("No service registered under name '{0}'")]
    UnknownService(String),
    #[error("A service is already registered under name '{0}'")]
    DuplicateName(String),
    #[error("Circular resolution detected: {0}")]
    CircularResolution(String),
    #[error("Construction of service '{name}' failed: {source}")]
    Construction {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("Service '{name}' is not of the requested type '{expected}'")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
}
