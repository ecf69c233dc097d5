//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     validate config → store config → start health loop → mark initialized
//!
//! Shutdown (shutdown.rs):
//!     restore delegation → stop health loop → stop watchers (fast, local)
//!     → close backend under timeout → force-close breaker → release memory
//!
//! Cancellation (cancel.rs):
//!     watcher Stop / plane teardown → cancel signal
//!     → retry loops and delivery tasks wake immediately
//! ```
//!
//! # Design Decisions
//! - Watcher teardown is synchronous and never subject to the timeout
//! - Backend teardown is at-most-once: on timeout we warn and proceed
//! - Cancellation observes a signal raised before the observer subscribed

pub mod cancel;
pub mod shutdown;

pub use cancel::{CancelHandle, Cancellation};
pub use shutdown::ShutdownOrchestrator;
