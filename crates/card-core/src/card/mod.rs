//! Smart card command/response layer.
//!
//! This module frames commands as extended-length APDUs, exchanges them over
//! a [`Transport`], and turns status words into success or error outcomes.
//!
//! # Architecture
//!
//! - [`apdu`]: command, frame, status word and response types
//! - [`channel`]: the [`ApduChannel`] exchange loop and its [`RetryPolicy`]
//!
//! # Transport Abstraction
//!
//! The [`Transport`] trait abstracts over the physical link (PC/SC reader,
//! emulator socket, test double). Implementations only move bytes; they
//! never interpret status words.
//!
//! # Example
//!
//! ```
//! use card_protocol_core::card::{ApduChannel, ApduResponse, Command, Transport};
//! use card_protocol_core::Result;
//!
//! struct Echo;
//!
//! impl Transport for Echo {
//!     fn transmit(&mut self, frame: &[u8]) -> Result<ApduResponse> {
//!         Ok(ApduResponse::from_parts(frame.to_vec(), 0x90, 0x00))
//!     }
//!
//!     fn reconnect(&mut self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let channel = ApduChannel::new();
//! let response = channel.send(&mut Echo, &Command::new(0xCA, 0x00, 0x6E)).unwrap();
//! assert_eq!(response, vec![0x00, 0xCA, 0x00, 0x6E, 0x00, 0x00]);
//! ```

pub mod apdu;
pub mod channel;

#[cfg(feature = "pcsc")]
pub mod pcsc_transport;

pub use apdu::{ApduFrame, ApduResponse, Command, Instruction, StatusWord};
pub use channel::{ApduChannel, RetryPolicy};

#[cfg(feature = "pcsc")]
pub use pcsc_transport::PcscTransport;

use crate::error::Result;

/// A byte-level link to a smart card.
///
/// One exchange is in flight at a time; the channel borrows the transport
/// mutably for the duration of a call and keeps no reference afterwards.
pub trait Transport {
    /// Sends a serialized APDU and receives the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`](crate::Error::ConnectionLost) if the
    /// link was dropped or reset, or another transport error if
    /// communication fails otherwise.
    fn transmit(&mut self, frame: &[u8]) -> Result<ApduResponse>;

    /// Re-establishes the underlying connection.
    ///
    /// Must be idempotent and blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be restored.
    fn reconnect(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit(&mut self, frame: &[u8]) -> Result<ApduResponse> {
        (**self).transmit(frame)
    }

    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, frame: &[u8]) -> Result<ApduResponse> {
        (**self).transmit(frame)
    }

    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }
}
