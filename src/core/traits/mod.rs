//! Core traits for context-agnostic GCS link functionality.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  GcsLink tick / inbound handlers / background worker     │
//! │                         │                                │
//! │                         ▼                                │
//! │  ┌──────────────┐  ┌──────────────────────────────────┐ │
//! │  │ TimeSource   │  │ SharedState<T>                   │ │
//! │  │ + now_ms()   │  │ + with(f: FnOnce(&T) -> R)       │ │
//! │  │ + now_us()   │  │ + with_mut(f: FnOnce(&mut T))    │ │
//! │  └──────┬───────┘  └────────────────┬─────────────────┘ │
//! │         ▼                           ▼                   │
//! │  StdTime, MockTime          EmbassyState<T>              │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod sync;
pub mod time;

pub use sync::{EmbassyState, SharedState};
pub use time::{MockTime, StdTime, TimeSource};
