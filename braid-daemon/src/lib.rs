//! braid-daemon library
//!
//! The per-project control plane: claims pending tasks from the store,
//! executes their handlers, and keeps orchestrator processes alive.

pub mod dispatch;
pub mod feedback;
pub mod supervisor;
