//! APDU (Application Protocol Data Unit) command and response types.
//!
//! This module provides types for constructing ISO 7816-4 APDU commands and
//! decoding card responses. Commands are always serialized in the
//! extended-length form, whatever the payload size.
//!
//! # APDU Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | 00 | Lc  | Data | Le  |
//! |-----|-----|----|----|----|-----|------|-----|
//! | 1B  | 1B  | 1B | 1B | 1B | 2B  | Var  | 2B  |
//! ```
//!
//! - **CLA**: Class byte (`0x00` unless a multi-byte prefix is given)
//! - **INS**: Instruction byte
//! - **P1, P2**: Parameter bytes
//! - **00 Lc Data**: Present only when the command carries data
//! - **Le**: Expected response length, `0x0000` meaning "maximum"
//!
//! # APDU Response Structure
//!
//! ```text
//! | Data | SW1 | SW2 |
//! |------|-----|-----|
//! | Var  | 1B  | 1B  |
//! ```
//!
//! A response is successful if and only if `SW1 == 0x90`.
//!
//! # Example
//!
//! ```
//! use card_protocol_core::card::Command;
//!
//! // SELECT the FIDO applet
//! let command = Command::new(0xA4, 0x04, 0x00)
//!     .with_data(vec![0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01]);
//!
//! let frame = command.to_frame().unwrap();
//! assert_eq!(&frame.as_bytes()[..7], &[0x00, 0xA4, 0x04, 0x00, 0x00, 0x00, 0x08]);
//! assert_eq!(frame.le(), 0x0000);
//! ```

use core::fmt;

use crate::error::{Error, Result};

/// The instruction part of a command header.
///
/// Either a bare instruction byte, which is sent after the channel's class
/// byte, or a full prefix (typically `CLA INS`) sent verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// A single instruction byte.
    Single(u8),

    /// A class + instruction prefix sequence.
    Prefixed(Vec<u8>),
}

impl Instruction {
    /// Builds the header prefix, using `cla` for single-byte instructions.
    fn header(&self, cla: u8) -> Result<Vec<u8>> {
        match self {
            Self::Single(ins) => Ok(vec![cla, *ins]),
            Self::Prefixed(prefix) if prefix.is_empty() => Err(Error::InvalidCommand(
                "instruction prefix is empty".to_string(),
            )),
            Self::Prefixed(prefix) if prefix.len() == 1 => Ok(vec![cla, prefix[0]]),
            Self::Prefixed(prefix) => Ok(prefix.clone()),
        }
    }
}

impl From<u8> for Instruction {
    fn from(ins: u8) -> Self {
        Self::Single(ins)
    }
}

impl From<&[u8]> for Instruction {
    fn from(prefix: &[u8]) -> Self {
        match prefix {
            [ins] => Self::Single(*ins),
            _ => Self::Prefixed(prefix.to_vec()),
        }
    }
}

impl From<Vec<u8>> for Instruction {
    fn from(prefix: Vec<u8>) -> Self {
        Self::from(prefix.as_slice())
    }
}

/// An APDU command.
///
/// A value object describing one exchange; serialize it with
/// [`to_frame`](Self::to_frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    instruction: Instruction,
    p1: u8,
    p2: u8,
    data: Option<Vec<u8>>,
    expected_len: Option<u16>,
}

impl Command {
    /// Maximum command data length in extended form.
    pub const MAX_DATA_LEN: usize = u16::MAX as usize;

    /// Creates a command from a single instruction byte.
    ///
    /// The command has no data and no expected length.
    #[must_use]
    pub fn new(ins: u8, p1: u8, p2: u8) -> Self {
        Self::with_instruction(Instruction::Single(ins), p1, p2)
    }

    /// Creates a command from a class + instruction prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use card_protocol_core::card::Command;
    ///
    /// // Vendor class 0x80, instruction 0x10
    /// let command = Command::prefixed([0x80, 0x10], 0x00, 0x00);
    /// let frame = command.to_frame().unwrap();
    /// assert_eq!(frame.as_bytes(), &[0x80, 0x10, 0x00, 0x00, 0x00, 0x00]);
    /// ```
    #[must_use]
    pub fn prefixed(prefix: impl Into<Vec<u8>>, p1: u8, p2: u8) -> Self {
        Self::with_instruction(Instruction::from(prefix.into()), p1, p2)
    }

    /// Creates a command from an [`Instruction`].
    #[must_use]
    pub const fn with_instruction(instruction: Instruction, p1: u8, p2: u8) -> Self {
        Self {
            instruction,
            p1,
            p2,
            data: None,
            expected_len: None,
        }
    }

    /// Attaches command data.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Sets the expected response length (Le).
    ///
    /// `0` has the same encoding as leaving Le unspecified ("maximum").
    #[must_use]
    pub fn with_le(mut self, le: u16) -> Self {
        self.expected_len = Some(le);
        self
    }

    /// Returns the instruction.
    #[must_use]
    pub const fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Returns the command data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Returns the expected response length, if set.
    #[must_use]
    pub const fn expected_len(&self) -> Option<u16> {
        self.expected_len
    }

    /// Serializes the command with class byte `0x00`.
    ///
    /// # Errors
    ///
    /// See [`to_frame_with_class`](Self::to_frame_with_class).
    pub fn to_frame(&self) -> Result<ApduFrame> {
        self.to_frame_with_class(0x00)
    }

    /// Serializes the command in extended-length form.
    ///
    /// `cla` is used only for single-byte instructions; prefixed instructions
    /// carry their own class byte(s).
    ///
    /// # Errors
    ///
    /// - [`Error::CommandTooLong`] if the data exceeds 65535 bytes
    /// - [`Error::InvalidCommand`] if the instruction prefix is empty
    pub fn to_frame_with_class(&self, cla: u8) -> Result<ApduFrame> {
        let header = self.instruction.header(cla)?;
        let data = self.data.as_deref().unwrap_or_default();
        let lc = u16::try_from(data.len()).map_err(|_| Error::CommandTooLong(data.len()))?;

        let mut bytes = Vec::with_capacity(header.len() + 2 + 3 + data.len() + 2);
        bytes.extend_from_slice(&header);
        bytes.push(self.p1);
        bytes.push(self.p2);

        if !data.is_empty() {
            bytes.push(0x00);
            bytes.extend_from_slice(&lc.to_be_bytes());
            bytes.extend_from_slice(data);
        }

        bytes.extend_from_slice(&self.expected_len.unwrap_or(0).to_be_bytes());

        Ok(ApduFrame {
            bytes,
            header_len: header.len() + 2,
        })
    }
}

/// A serialized extended-length APDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduFrame {
    bytes: Vec<u8>,

    /// Length of `CLA.. INS P1 P2`.
    header_len: usize,
}

impl ApduFrame {
    /// Returns the frame bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the frame and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the frame length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`: a frame holds at least a header and Le.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the header (`CLA.. INS P1 P2`).
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.bytes[..self.header_len]
    }

    /// Returns the encoded data length, or `None` if no data block is present.
    #[must_use]
    pub fn lc(&self) -> Option<u16> {
        if self.bytes.len() > self.header_len + 2 {
            let at = self.header_len + 1;
            Some(u16::from_be_bytes([self.bytes[at], self.bytes[at + 1]]))
        } else {
            None
        }
    }

    /// Returns the command data block (empty if none).
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match self.lc() {
            Some(len) => {
                let start = self.header_len + 3;
                &self.bytes[start..start + usize::from(len)]
            }
            None => &[],
        }
    }

    /// Returns the encoded expected response length.
    #[must_use]
    pub fn le(&self) -> u16 {
        let n = self.bytes.len();
        u16::from_be_bytes([self.bytes[n - 2], self.bytes[n - 1]])
    }
}

impl AsRef<[u8]> for ApduFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// A two-byte status word terminating every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    sw1: u8,
    sw2: u8,
}

impl StatusWord {
    /// The SW1 value denoting success.
    pub const SUCCESS_SW1: u8 = 0x90;

    /// The canonical success status word (`0x9000`).
    pub const SUCCESS: Self = Self::new(0x90, 0x00);

    /// Creates a status word.
    #[must_use]
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Returns status word 1.
    #[must_use]
    pub const fn sw1(self) -> u8 {
        self.sw1
    }

    /// Returns status word 2.
    #[must_use]
    pub const fn sw2(self) -> u8 {
        self.sw2
    }

    /// Returns the status word as a [`u16`].
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    /// Checks for success. Only SW1 is inspected.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.sw1 == Self::SUCCESS_SW1
    }
}

impl From<u16> for StatusWord {
    fn from(sw: u16) -> Self {
        let [sw1, sw2] = sw.to_be_bytes();
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SW:{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// An APDU response from a smart card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    data: Vec<u8>,
    status: StatusWord,
}

impl ApduResponse {
    /// Creates a response from its parts.
    #[must_use]
    pub const fn from_parts(data: Vec<u8>, sw1: u8, sw2: u8) -> Self {
        Self {
            data,
            status: StatusWord::new(sw1, sw2),
        }
    }

    /// Splits raw response bytes (`data || SW1 || SW2`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if fewer than 2 bytes are given.
    ///
    /// # Example
    ///
    /// ```
    /// use card_protocol_core::card::ApduResponse;
    ///
    /// let response = ApduResponse::from_bytes(vec![0x01, 0x02, 0x90, 0x00]).unwrap();
    /// assert!(response.is_success());
    /// assert_eq!(response.data(), &[0x01, 0x02]);
    /// ```
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::MalformedResponse(format!(
                "response too short: {} bytes",
                bytes.len()
            )));
        }

        let trailer = bytes.split_off(bytes.len() - 2);
        Ok(Self::from_parts(bytes, trailer[0], trailer[1]))
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data, regardless of status.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns status word 1.
    #[must_use]
    pub const fn sw1(&self) -> u8 {
        self.status.sw1
    }

    /// Returns status word 2.
    #[must_use]
    pub const fn sw2(&self) -> u8 {
        self.status.sw2
    }

    /// Returns the status word.
    #[must_use]
    pub const fn status_word(&self) -> StatusWord {
        self.status
    }

    /// Checks if the response indicates success (`SW1 = 0x90`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the payload on success; otherwise discards it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] with the exact status word pair if
    /// `SW1 != 0x90`.
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(Error::Protocol(self.status.sw1, self.status.sw2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_instruction_uses_class() {
        let frame = Command::new(0xA4, 0x04, 0x00)
            .to_frame_with_class(0x80)
            .unwrap();

        assert_eq!(frame.header(), &[0x80, 0xA4, 0x04, 0x00]);
    }

    #[test]
    fn prefixed_instruction_is_verbatim() {
        let frame = Command::prefixed([0x80, 0x10], 0x01, 0x02)
            .to_frame_with_class(0x00)
            .unwrap();

        assert_eq!(frame.header(), &[0x80, 0x10, 0x01, 0x02]);
    }

    #[test]
    fn one_byte_prefix_is_single() {
        assert_eq!(Instruction::from(vec![0xCB]), Instruction::Single(0xCB));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let command = Command::with_instruction(Instruction::Prefixed(Vec::new()), 0x00, 0x00);
        assert!(matches!(
            command.to_frame(),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn frame_without_data() {
        let frame = Command::new(0xCA, 0x00, 0x6E).to_frame().unwrap();

        assert_eq!(frame.as_bytes(), &[0x00, 0xCA, 0x00, 0x6E, 0x00, 0x00]);
        assert_eq!(frame.lc(), None);
        assert!(frame.data().is_empty());
        assert_eq!(frame.le(), 0);
    }

    #[test]
    fn frame_with_data_and_le() {
        let frame = Command::new(0x10, 0x00, 0x00)
            .with_data(vec![0x04])
            .with_le(0x0100)
            .to_frame()
            .unwrap();

        assert_eq!(
            frame.as_bytes(),
            &[0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x01, 0x04, 0x01, 0x00]
        );
        assert_eq!(frame.lc(), Some(1));
        assert_eq!(frame.data(), &[0x04]);
        assert_eq!(frame.le(), 0x0100);
    }

    #[test]
    fn empty_data_emits_no_lc() {
        let frame = Command::new(0x01, 0x00, 0x00)
            .with_data(Vec::new())
            .to_frame()
            .unwrap();

        assert_eq!(frame.as_bytes(), &[0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(frame.lc(), None);
    }

    #[test]
    fn data_longer_than_short_form() {
        let data = vec![0xAB; 300];
        let frame = Command::new(0x01, 0x00, 0x00)
            .with_data(data.clone())
            .to_frame()
            .unwrap();

        assert_eq!(frame.lc(), Some(300));
        assert_eq!(frame.data(), data.as_slice());
        assert_eq!(frame.len(), 4 + 3 + 300 + 2);
    }

    #[test]
    fn max_data_len_fits() {
        let data = vec![0u8; Command::MAX_DATA_LEN];
        let frame = Command::new(0x01, 0x00, 0x00)
            .with_data(data)
            .to_frame()
            .unwrap();

        assert_eq!(frame.lc(), Some(0xFFFF));
    }

    #[test]
    fn data_too_long() {
        let data = vec![0u8; Command::MAX_DATA_LEN + 1];
        let result = Command::new(0x01, 0x00, 0x00).with_data(data).to_frame();

        assert!(matches!(result, Err(Error::CommandTooLong(65536))));
    }

    #[test]
    fn status_word_success_ignores_sw2() {
        assert!(StatusWord::new(0x90, 0x00).is_success());
        assert!(StatusWord::new(0x90, 0x01).is_success());
        assert!(!StatusWord::new(0x61, 0x10).is_success());
        assert!(!StatusWord::new(0x6A, 0x82).is_success());
    }

    #[test]
    fn status_word_display() {
        assert_eq!(StatusWord::new(0x6A, 0x82).to_string(), "SW:6A82");
        assert_eq!(StatusWord::from(0x9000).to_u16(), 0x9000);
    }

    #[test]
    fn response_from_bytes() {
        let response = ApduResponse::from_bytes(vec![0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();

        assert_eq!(response.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(response.sw1(), 0x90);
        assert_eq!(response.sw2(), 0x00);
        assert!(response.is_success());
    }

    #[test]
    fn response_too_short() {
        assert!(matches!(
            ApduResponse::from_bytes(vec![0x90]),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn response_into_result_discards_data_on_error() {
        let response = ApduResponse::from_parts(vec![0xDE, 0xAD], 0x6A, 0x82);
        let err = response.into_result().unwrap_err();

        assert!(matches!(err, Error::Protocol(0x6A, 0x82)));
    }

    #[test]
    fn response_into_result_empty_success() {
        let response = ApduResponse::from_parts(Vec::new(), 0x90, 0x00);
        assert_eq!(response.into_result().unwrap(), Vec::<u8>::new());
    }
}
