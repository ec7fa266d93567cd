//! Gateway Common Library
//!
//! Shared error type, layered configuration loading, logging setup and
//! time sources used by the gateway services.

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

// Re-exports for convenience
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use time::{current_timestamp_micros, FixedTimeProvider, SystemTimeProvider, TimeProvider};

/// Common prelude for gateway services
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::time::{current_timestamp_micros, TimeProvider};
    pub use tracing::{debug, error, info, trace, warn};
}
