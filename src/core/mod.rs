//! Core infrastructure
//!
//! Logging macros and the context-agnostic traits (shared state, time) the
//! link layer is built on.

pub mod logging;
pub mod traits;
