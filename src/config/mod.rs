//! Plane configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or host-supplied struct
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → PlaneConfig (validated, immutable)
//!     → stored in the plane's swap slot, released at shutdown
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so a minimal config works
//! - Bounds live as constants in schema.rs, the single source of truth
//! - Token values never appear in logs or validation messages

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::PlaneConfig;
pub use validation::{validate_config, ValidationError};
