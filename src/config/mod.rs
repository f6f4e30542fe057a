//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HostConfig (validated, immutable)
//!     → handed to the orchestrator builder
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; TLS material is the only thing
//!   re-read at runtime, and that is owned by the keypair reloader
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AuthzConfig;
pub use schema::HostConfig;
pub use schema::HttpServerConfig;
pub use schema::ObservabilityConfig;
pub use schema::TlsInfoConfig;
