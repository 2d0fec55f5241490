//! Parameter store interface
//!
//! The link layer never owns parameters. It talks to whatever store the
//! autopilot provides through [`ParameterStore`], and only from the
//! background worker: a lookup may be slow (flash, large tables) and must
//! never run inside the scheduler tick.
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  PARAM_REQUEST_READ / PARAM_SET        │
//! │  (inbound, any link)                   │
//! └──────────────┬─────────────────────────┘
//!                │ ParamQueue requests
//!                ▼
//! ┌────────────────────────────────────────┐
//! │  Background worker                     │
//! │  ParameterStore::find / set            │
//! └──────────────┬─────────────────────────┘
//!                │ ParamQueue replies
//!                ▼
//! ┌────────────────────────────────────────┐
//! │  Link tick: PARAM_VALUE, gated         │
//! └────────────────────────────────────────┘
//! ```

pub mod registry;

pub use registry::{ParamMetadata, ParamType, ParamValue, ParameterRegistry};

use crate::error::ParamStoreError;

/// MAVLink parameter id length
pub const PARAM_NAME_LEN: usize = 16;

/// Parameter name as carried in PARAM_* messages
pub type ParamName = heapless::String<PARAM_NAME_LEN>;

/// A parameter as reported back to a GCS
#[derive(Debug, Clone, PartialEq)]
pub struct StoredParam {
    pub index: u16,
    pub name: ParamName,
    pub value: ParamValue,
}

/// Backing store for parameters
pub trait ParameterStore: Send {
    fn count(&self) -> u16;

    fn get_by_index(&self, index: u16) -> Option<StoredParam>;

    fn find(&self, name: &str) -> Option<StoredParam>;

    /// Write a new value, converting from the MAVLink float carrier
    ///
    /// # Returns
    ///
    /// The parameter as stored after the write.
    fn set(&mut self, name: &str, value: f32) -> Result<StoredParam, ParamStoreError>;
}

/// Decode a NUL-padded MAVLink parameter id
pub fn decode_param_id(raw: &[u8; PARAM_NAME_LEN]) -> Option<ParamName> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(PARAM_NAME_LEN);
    let name = core::str::from_utf8(&raw[..end]).ok()?;
    if name.is_empty() {
        return None;
    }
    ParamName::try_from(name).ok()
}

/// Encode a parameter name as a NUL-padded MAVLink parameter id
pub fn encode_param_id(name: &str) -> [u8; PARAM_NAME_LEN] {
    let mut param_id = [0u8; PARAM_NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(PARAM_NAME_LEN);
    param_id[..len].copy_from_slice(&bytes[..len]);
    param_id
}
