//! MAVLink sub-protocol handlers
//!
//! Both handlers split work the same way: the link decodes and queues
//! inbound requests, a background worker resolves them, and the link drains
//! replies for its own channel under its bandwidth gate.
//!
//! - **Parameter queue**: PARAM_REQUEST_READ, PARAM_SET, list streaming
//! - **FTP**: FILE_TRANSFER_PROTOCOL sessions, burst reads, CRC32

pub mod ftp;
pub mod param;

pub use ftp::{FtpService, FtpWorker};
pub use param::{ParamQueue, ParamReply, ParamRequest};
