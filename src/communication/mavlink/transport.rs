//! Link transport abstraction
//!
//! The scheduler tick must never block, so the transport seen by a link is a
//! synchronous, non-blocking sink: it reports how many bytes it can accept
//! right now and takes fully formed messages. Framing, sequence numbers and
//! signing belong to the transport.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ GcsLink::update_send         │
//! │  BandwidthGate (tx_space)    │
//! └──────────┬───────────────────┘
//!            │ send(&MavMessage)
//!            ▼
//! ┌──────────────────────────────┐
//! │ LinkTransport                │
//! │  UART / UDP / USB / Mock     │
//! └──────────────────────────────┘
//! ```

use core::fmt;

use mavlink::common::MavMessage;

use super::bandwidth::ProtocolVersion;

/// Non-blocking outbound side of one MAVLink channel
pub trait LinkTransport: Send {
    /// Bytes the transport can accept without blocking
    fn tx_space(&self) -> usize;

    /// Wire protocol version in use, `None` if the transport has not
    /// detected one yet
    fn protocol_version(&self) -> Option<ProtocolVersion> {
        None
    }

    /// Whether outgoing packets are signed
    fn signing_active(&self) -> bool {
        false
    }

    /// Frame and queue one message for transmission
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Message queued
    /// - `Err(TransportError)` - Message was not queued
    fn send(&mut self, message: &MavMessage) -> Result<(), TransportError>;
}

/// Transport error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Generic I/O error
    IoError,
    /// Transport disconnected
    Disconnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::IoError => write!(f, "I/O error"),
            TransportError::Disconnected => write!(f, "Transport disconnected"),
        }
    }
}

pub mod mock {
    //! Mock transport for testing
    //!
    //! Clones share state, so a test can hand one clone to a link and keep
    //! another to inspect what was sent.

    use std::sync::Arc;
    use std::vec::Vec;

    use mavlink::common::MavMessage;

    use super::{LinkTransport, TransportError};
    use crate::communication::mavlink::bandwidth::ProtocolVersion;
    use crate::core::traits::{EmbassyState, SharedState};

    struct Inner {
        tx_space: usize,
        protocol: Option<ProtocolVersion>,
        signing: bool,
        send_error: Option<TransportError>,
        sent: Vec<MavMessage>,
    }

    /// Recording transport with configurable free space
    #[derive(Clone)]
    pub struct MockTransport {
        inner: Arc<EmbassyState<Inner>>,
    }

    impl MockTransport {
        /// Create an unsigned transport reporting `tx_space` free bytes and
        /// no detected protocol
        pub fn new(tx_space: usize) -> Self {
            Self {
                inner: Arc::new(EmbassyState::new(Inner {
                    tx_space,
                    protocol: None,
                    signing: false,
                    send_error: None,
                    sent: Vec::new(),
                })),
            }
        }

        pub fn set_tx_space(&self, tx_space: usize) {
            self.inner.with_mut(|i| i.tx_space = tx_space);
        }

        pub fn set_protocol(&self, protocol: ProtocolVersion) {
            self.inner.with_mut(|i| i.protocol = Some(protocol));
        }

        pub fn set_signing(&self, signing: bool) {
            self.inner.with_mut(|i| i.signing = signing);
        }

        pub fn set_send_error(&self, error: Option<TransportError>) {
            self.inner.with_mut(|i| i.send_error = error);
        }

        /// Messages sent so far, oldest first
        pub fn sent(&self) -> Vec<MavMessage> {
            self.inner.with(|i| i.sent.clone())
        }

        /// Remove and return everything sent so far
        pub fn take_sent(&self) -> Vec<MavMessage> {
            self.inner.with_mut(|i| core::mem::take(&mut i.sent))
        }

        pub fn sent_count(&self) -> usize {
            self.inner.with(|i| i.sent.len())
        }
    }

    impl LinkTransport for MockTransport {
        fn tx_space(&self) -> usize {
            self.inner.with(|i| i.tx_space)
        }

        fn protocol_version(&self) -> Option<ProtocolVersion> {
            self.inner.with(|i| i.protocol)
        }

        fn signing_active(&self) -> bool {
            self.inner.with(|i| i.signing)
        }

        fn send(&mut self, message: &MavMessage) -> Result<(), TransportError> {
            self.inner.with_mut(|i| {
                if let Some(error) = i.send_error {
                    return Err(error);
                }
                i.sent.push(message.clone());
                Ok(())
            })
        }
    }
}
