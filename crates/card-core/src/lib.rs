//! Card Protocol Core Library
//!
//! This crate provides the two primitives a FIDO2 smart-card client needs
//! below the ceremony layer:
//!
//! - **APDU Channel**: extended-length command framing, transmission over a
//!   pluggable transport with one reconnect-and-retry, and status word decoding
//! - **ES256K Verification**: COSE EC2 key records on secp256k1 and ECDSA
//!   signature checks against them
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Caller                                │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │          card                │            cose              │
//! │  ┌─────────┐  ┌───────────┐  │  ┌──────────┐  ┌───────────┐ │
//! │  │  APDU   │  │  Channel  │  │  │ CoseKey  │  │  Es256k   │ │
//! │  │ Encode  │  │  + Retry  │  │  │  (CBOR)  │  │  Verify   │ │
//! │  └─────────┘  └───────────┘  │  └──────────┘  └───────────┘ │
//! ├──────────────────────────────┤                              │
//! │     Transport (PC/SC, mock)  │                              │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Sending a Command
//!
//! ```
//! use card_protocol_core::card::{ApduChannel, ApduResponse, Command, Transport};
//! use card_protocol_core::{Error, Result};
//!
//! // A card that rejects everything with "file not found"
//! struct NotFound;
//!
//! impl Transport for NotFound {
//!     fn transmit(&mut self, _frame: &[u8]) -> Result<ApduResponse> {
//!         Ok(ApduResponse::from_parts(Vec::new(), 0x6A, 0x82))
//!     }
//!
//!     fn reconnect(&mut self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let channel = ApduChannel::new();
//! let err = channel
//!     .send(&mut NotFound, &Command::new(0xA4, 0x04, 0x00))
//!     .unwrap_err();
//! assert!(matches!(err, Error::Protocol(0x6A, 0x82)));
//! ```
//!
//! ## Verifying an ES256K Signature
//!
//! ```
//! use card_protocol_core::cose::{CoseKey, DigestAlgorithm, Es256k};
//! use k256::ecdsa::{Signature, SigningKey, signature::Signer};
//!
//! let signing_key = SigningKey::from_slice(&[0x07; 32]).unwrap();
//! let record = CoseKey::from_public_key(&signing_key.verifying_key().into());
//!
//! // Key records travel as CBOR
//! let decoded = CoseKey::from_cbor(&record.to_cbor().unwrap()).unwrap();
//!
//! let signature: Signature = signing_key.sign(b"challenge");
//! Es256k::verify_with(&decoded, DigestAlgorithm::Sha256, b"challenge", signature.to_der().as_bytes())
//!     .unwrap();
//! ```
//!
//! # Feature Flags
//!
//! - `pcsc`: enables [`card::PcscTransport`], a [`card::Transport`] over the
//!   system PC/SC service.
//!
//! # Logging
//!
//! Events are emitted through [`tracing`]; install a subscriber to see them.
//! Frames and rejected status words are logged at `DEBUG`, reconnects at `WARN`.

// Modules
pub mod card;
pub mod config;
pub mod cose;
pub mod error;

// Re-exports for convenience
pub use card::{ApduChannel, Command, RetryPolicy, StatusWord, Transport};
pub use config::ChannelConfig;
pub use cose::{CoseKey, DigestAlgorithm, Es256k};
pub use error::{Error, Result};

// Dev-dependency used by integration tests only
#[cfg(test)]
use rand_core as _;
