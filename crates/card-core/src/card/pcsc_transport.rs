//! PC/SC transport for native smart card communication.
//!
//! This module provides a [`Transport`] implementation using the PC/SC
//! (Personal Computer/Smart Card) interface, which works on macOS, Linux,
//! and Windows.
//!
//! # Example
//!
//! ```ignore
//! use card_protocol_core::card::{ApduChannel, Command, PcscTransport};
//!
//! // Connect to the first reader whose name contains "Pico"
//! let mut transport = PcscTransport::connect(Some("Pico"))?;
//!
//! let channel = ApduChannel::new();
//! let info = channel.send(&mut transport, &Command::prefixed([0x80, 0x10], 0x00, 0x00))?;
//! ```

use std::ffi::{CStr, CString};

use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode};
use tracing::{debug, info};

use super::Transport;
use super::apdu::ApduResponse;
use crate::error::{Error, Result};

/// A PC/SC transport bound to one reader.
pub struct PcscTransport {
    /// The PC/SC context that owns the card handle.
    ctx: Context,

    /// The reader the card was found in.
    reader: CString,

    /// The PC/SC card handle.
    card: Card,
}

impl std::fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

impl PcscTransport {
    /// Connects to the first matching reader that holds a card.
    ///
    /// Readers whose name does not contain `filter` are ignored, as are
    /// readers reporting no card.
    ///
    /// # Errors
    ///
    /// - [`Error::ReaderNotFound`] if no reader matches or every matching
    ///   reader is empty
    /// - [`Error::TransportFailed`] if the PC/SC context or connection fails
    pub fn connect(filter: Option<&str>) -> Result<Self> {
        let ctx = establish()?;

        let mut readers_buf = vec![0u8; 2048];
        let readers = ctx
            .list_readers(&mut readers_buf)
            .map_err(|e| Error::TransportFailed(format!("failed to list readers: {e}")))?
            .filter(|reader| matches_filter(reader, filter));

        let (reader, card) = first_with_card(readers, |reader| {
            ctx.connect(reader, ShareMode::Shared, Protocols::ANY)
        })?;
        let reader = reader.to_owned();

        info!(reader = %reader.to_string_lossy(), "connected to card");
        Ok(Self { ctx, reader, card })
    }

    /// Lists all reader names, optionally filtered by substring.
    ///
    /// # Errors
    ///
    /// Returns an error if the PC/SC context cannot be established.
    pub fn list_readers(filter: Option<&str>) -> Result<Vec<String>> {
        let ctx = establish()?;

        let mut readers_buf = vec![0u8; 2048];
        let readers = ctx
            .list_readers(&mut readers_buf)
            .map_err(|e| Error::TransportFailed(format!("failed to list readers: {e}")))?;

        Ok(readers
            .filter(|r| matches_filter(r, filter))
            .map(|r| r.to_string_lossy().into_owned())
            .collect())
    }

    /// Returns the name of the connected reader.
    #[must_use]
    pub fn reader(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }
}

impl Transport for PcscTransport {
    fn transmit(&mut self, frame: &[u8]) -> Result<ApduResponse> {
        let mut response_buf = vec![0u8; pcsc::MAX_BUFFER_SIZE_EXTENDED];

        let response = self
            .card
            .transmit(frame, &mut response_buf)
            .map_err(map_pcsc_error)?;

        ApduResponse::from_bytes(response.to_vec())
    }

    fn reconnect(&mut self) -> Result<()> {
        match self
            .card
            .reconnect(ShareMode::Shared, Protocols::ANY, Disposition::ResetCard)
        {
            Ok(()) => Ok(()),
            Err(e) => {
                // The handle is stale (card pulled and reinserted); open a new one.
                debug!(error = %e, "card reconnect failed, opening new handle");
                self.card = self
                    .ctx
                    .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
                    .map_err(map_pcsc_error)?;
                Ok(())
            }
        }
    }
}

fn establish() -> Result<Context> {
    Context::establish(Scope::User)
        .map_err(|e| Error::TransportFailed(format!("failed to establish PC/SC context: {e}")))
}

/// Connects to each reader in turn, skipping readers without a card.
fn first_with_card<'a, C>(
    readers: impl IntoIterator<Item = &'a CStr>,
    mut connect: impl FnMut(&CStr) -> core::result::Result<C, pcsc::Error>,
) -> Result<(&'a CStr, C)> {
    for reader in readers {
        match connect(reader) {
            Ok(card) => return Ok((reader, card)),
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                debug!(reader = %reader.to_string_lossy(), "no card in reader, skipping");
            }
            Err(e) => return Err(map_pcsc_error(e)),
        }
    }
    Err(Error::ReaderNotFound)
}

fn matches_filter(reader: &CStr, filter: Option<&str>) -> bool {
    filter.is_none_or(|f| reader.to_string_lossy().contains(f))
}

/// Splits PC/SC errors into lost-connection faults and everything else.
fn map_pcsc_error(err: pcsc::Error) -> Error {
    match err {
        pcsc::Error::ResetCard
        | pcsc::Error::RemovedCard
        | pcsc::Error::NoSmartcard
        | pcsc::Error::NotTransacted
        | pcsc::Error::ReaderUnavailable
        | pcsc::Error::UnpoweredCard
        | pcsc::Error::UnresponsiveCard => Error::ConnectionLost(err.to_string()),
        pcsc::Error::UnknownReader => Error::ReaderNotFound,
        _ => Error::TransportFailed(err.to_string()),
    }
}
