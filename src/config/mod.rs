//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → ListenerConfig handed to Listener::bind_with_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; capacity and deadline are fixed for the
//!   lifetime of a listener
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_or_default, parse_config, ConfigError};
pub use schema::{
    GateConfig, IdentityConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_HANDSHAKES,
};
pub use validation::{validate_config, ValidationError};
