pub mod config;
pub mod errors;
pub mod manager;

// Re-export commonly used items for convenience
pub use config::{Config, ConfigSource};
pub use errors::{BoxError, ConfigError, ManagerError};
pub use manager::{Instance, ManagerStats, Resolver, ServiceManager};
