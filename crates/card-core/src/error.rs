//! Error types for the card protocol library.
//!
//! This module provides a single error type [`enum@Error`] covering every
//! failure mode of an APDU exchange and of ES256K key verification.
//!
//! # Error Categories
//!
//! - **Transport errors**: the reader dropped the connection or failed outright
//! - **Protocol errors**: the card answered with a non-success status word
//! - **Cryptographic errors**: unsupported curve, bad key, bad signature
//! - **Encoding errors**: malformed COSE key records or configuration
//!
//! # Example
//!
//! ```
//! use card_protocol_core::Error;
//!
//! let err = Error::Protocol(0x6A, 0x82);
//! let sw = err.status_word().unwrap();
//! assert_eq!(sw.sw1(), 0x6A);
//! assert_eq!(sw.sw2(), 0x82);
//! ```

use core::fmt::Display;
use core::result::Result as CoreResult;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::card::StatusWord;

/// The main error type for the card protocol library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The connection to the card was dropped or reset.
    ///
    /// This is the only fault [`ApduChannel`](crate::card::ApduChannel)
    /// recovers from by default, with a single reconnect and retransmit.
    #[error("connection to card lost: {0}")]
    ConnectionLost(String),

    /// The transport failed for a reason other than a lost connection.
    #[error("transport failure: {0}")]
    TransportFailed(String),

    /// No matching smart card reader was found.
    #[error("no smart card reader found")]
    ReaderNotFound,

    // =========================================================================
    // APDU Errors
    // =========================================================================
    /// The command cannot be framed (for example, an empty instruction prefix).
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The command data does not fit the 16-bit extended Lc field.
    #[error("command data too long: {0} bytes (maximum is 65535)")]
    CommandTooLong(usize),

    /// The response from the card was malformed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The card rejected the command or could not complete it.
    ///
    /// Carries the exact `(SW1, SW2)` pair; no interpretation is attempted.
    #[error("card returned status word SW1={0:#04x}, SW2={1:#04x}")]
    Protocol(u8, u8),

    // =========================================================================
    // Cryptographic Errors
    // =========================================================================
    /// The key record names a curve this verifier does not implement.
    #[error("unsupported elliptic curve identifier: {0}")]
    UnsupportedCurve(i64),

    /// The signature did not verify against the message and public key.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The public key is invalid or malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// A COSE key record could not be encoded or decoded.
    #[error("COSE key encoding error: {0}")]
    KeyEncoding(String),

    /// The channel configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` if this is a lost-connection transport fault.
    ///
    /// This is the default retry predicate used by
    /// [`RetryPolicy::once`](crate::card::RetryPolicy::once).
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// Returns `true` for any transport-level fault.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::TransportFailed(_) | Self::ReaderNotFound
        )
    }

    /// Returns the status word carried by a [`Error::Protocol`] error.
    #[must_use]
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Protocol(sw1, sw2) => Some(StatusWord::new(*sw1, *sw2)),
            _ => None,
        }
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<minicbor::decode::Error> for Error {
    fn from(err: minicbor::decode::Error) -> Self {
        Error::KeyEncoding(err.to_string())
    }
}

impl<E: Display> From<minicbor::encode::Error<E>> for Error {
    fn from(err: minicbor::encode::Error<E>) -> Self {
        Error::KeyEncoding(err.to_string())
    }
}

/// A specialized [`Result`] type for card protocol operations.
pub type Result<T> = CoreResult<T, Error>;
