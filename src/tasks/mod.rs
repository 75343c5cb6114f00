//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod session_clock;

// Re-export main functions
pub use session_clock::session_clock_task;
