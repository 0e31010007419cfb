//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs + startup.rs):
//!     Load config → Connect counter stores → Build server → Start background tasks → Listen
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Stop accepting → Drain → Close counter stores
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then stores, then listeners
//! - Every long-running task subscribes to the same shutdown broadcast

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::spawn_cleanup_task;
