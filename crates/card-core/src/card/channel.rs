//! APDU exchange with bounded reconnect-and-retry.
//!
//! [`ApduChannel::send`] serializes a [`Command`], transmits it, and decodes
//! the status word. If the transport reports a lost connection, the channel
//! reconnects and replays the identical frame once; a second failure is
//! returned to the caller.
//!
//! ```text
//! Idle --send--> Sending --SW1=90--> Idle (Ok(data))
//!                   |  \--SW1!=90--> Idle (Err(Protocol))
//!                   |
//!            connection lost (once)
//!                   v
//!              Reconnecting --> Sending
//! ```

use tracing::{debug, warn};

use super::Transport;
use super::apdu::{ApduFrame, ApduResponse, Command};
use crate::config::ChannelConfig;
use crate::error::{Error, Result};

/// Decides whether a transport fault is remediated by reconnecting.
///
/// At most one reconnect is ever attempted per exchange.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    reconnect: bool,
    is_retriable: fn(&Error) -> bool,
}

impl RetryPolicy {
    /// Reconnect once on [`Error::ConnectionLost`].
    #[must_use]
    pub const fn once() -> Self {
        Self {
            reconnect: true,
            is_retriable: Error::is_connection_lost,
        }
    }

    /// Never reconnect; every transport fault is returned as-is.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            reconnect: false,
            is_retriable: Error::is_connection_lost,
        }
    }

    /// Replaces the predicate identifying retriable faults.
    #[must_use]
    pub const fn with_predicate(mut self, is_retriable: fn(&Error) -> bool) -> Self {
        self.is_retriable = is_retriable;
        self
    }

    /// Returns the maximum number of reconnects per exchange (`0` or `1`).
    #[must_use]
    pub fn max_reconnects(&self) -> u8 {
        u8::from(self.reconnect)
    }

    /// Checks whether `err` should trigger a reconnect and retransmit.
    #[must_use]
    pub fn should_retry(&self, err: &Error) -> bool {
        self.reconnect && (self.is_retriable)(err)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// Sends commands to a card over a borrowed [`Transport`].
///
/// The channel holds no connection state of its own, so one channel can be
/// shared by any number of transports. Callers must serialize exchanges on
/// the same transport.
#[derive(Debug, Clone, Copy)]
pub struct ApduChannel {
    policy: RetryPolicy,
    class: u8,
}

impl ApduChannel {
    /// Creates a channel with class byte `0x00` and [`RetryPolicy::once`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            policy: RetryPolicy::once(),
            class: 0x00,
        }
    }

    /// Creates a channel from a [`ChannelConfig`].
    #[must_use]
    pub const fn with_config(config: &ChannelConfig) -> Self {
        let policy = if config.reconnect_on_connection_lost {
            RetryPolicy::once()
        } else {
            RetryPolicy::never()
        };

        Self {
            policy,
            class: config.default_class,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the class byte used for single-byte instructions.
    #[must_use]
    pub const fn with_class(mut self, class: u8) -> Self {
        self.class = class;
        self
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the class byte used for single-byte instructions.
    #[must_use]
    pub const fn class(&self) -> u8 {
        self.class
    }

    /// Executes `command` and returns the response payload.
    ///
    /// On success (`SW1 = 0x90`) the payload is returned unchanged, even if
    /// empty.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandTooLong`] or [`Error::InvalidCommand`] if the command
    ///   cannot be framed
    /// - [`Error::Protocol`] with the exact status word if `SW1 != 0x90`
    /// - the transport's error if transmission fails, including a second
    ///   [`Error::ConnectionLost`] after the one permitted reconnect
    pub fn send<T>(&self, transport: &mut T, command: &Command) -> Result<Vec<u8>>
    where
        T: Transport + ?Sized,
    {
        let frame = command.to_frame_with_class(self.class)?;
        let response = self.exchange(transport, &frame)?;

        let status = response.status_word();
        response.into_result().inspect_err(|_| {
            debug!(%status, "card rejected command");
        })
    }

    /// Transmits a prepared frame, reconnecting once if the policy allows.
    ///
    /// The status word is not interpreted.
    ///
    /// # Errors
    ///
    /// Returns the transport's error, or the error from
    /// [`Transport::reconnect`] if reconnecting fails.
    pub fn exchange<T>(&self, transport: &mut T, frame: &ApduFrame) -> Result<ApduResponse>
    where
        T: Transport + ?Sized,
    {
        let bytes = frame.as_bytes();
        debug!(frame = %hex::encode(bytes), "transmitting APDU");

        match transport.transmit(bytes) {
            Err(err) if self.policy.should_retry(&err) => {
                warn!(error = %err, "card connection lost, reconnecting");
                transport.reconnect()?;
                debug!(frame = %hex::encode(bytes), "retransmitting APDU");
                transport.transmit(bytes)
            }
            result => result,
        }
    }
}

impl Default for ApduChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A transport replaying scripted outcomes and recording every frame.
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: VecDeque<Result<ApduResponse>>,
        frames: Vec<Vec<u8>>,
        reconnects: usize,
        fail_reconnect: bool,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<ApduResponse>>) -> Self {
            Self {
                outcomes: outcomes.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn transmit(&mut self, frame: &[u8]) -> Result<ApduResponse> {
            self.frames.push(frame.to_vec());
            self.outcomes
                .pop_front()
                .unwrap_or_else(|| Err(Error::TransportFailed("script exhausted".to_string())))
        }

        fn reconnect(&mut self) -> Result<()> {
            self.reconnects += 1;
            if self.fail_reconnect {
                Err(Error::ReaderNotFound)
            } else {
                Ok(())
            }
        }
    }

    fn ok(data: &[u8]) -> Result<ApduResponse> {
        Ok(ApduResponse::from_parts(data.to_vec(), 0x90, 0x00))
    }

    fn lost() -> Result<ApduResponse> {
        Err(Error::ConnectionLost("card reset".to_string()))
    }

    #[test]
    fn success_returns_payload() {
        let mut transport = ScriptedTransport::new(vec![ok(&[0x01, 0x02])]);
        let command = Command::new(0x10, 0x00, 0x00).with_data(vec![0x04]);

        let data = ApduChannel::new().send(&mut transport, &command).unwrap();

        assert_eq!(data, vec![0x01, 0x02]);
        assert_eq!(transport.frames.len(), 1);
        assert_eq!(transport.reconnects, 0);
    }

    #[test]
    fn status_word_failure_is_protocol_error() {
        let response = ApduResponse::from_parts(vec![0xAA, 0xBB], 0x6A, 0x82);
        let mut transport = ScriptedTransport::new(vec![Ok(response)]);

        let err = ApduChannel::new()
            .send(&mut transport, &Command::new(0xA4, 0x04, 0x00))
            .unwrap_err();

        assert!(matches!(err, Error::Protocol(0x6A, 0x82)));
        assert_eq!(transport.frames.len(), 1);
    }

    #[test]
    fn reconnects_once_and_replays_frame() {
        let mut transport = ScriptedTransport::new(vec![lost(), ok(&[0x42])]);
        let command = Command::new(0x01, 0x02, 0x03).with_data(vec![0xAA; 4]);

        let data = ApduChannel::new().send(&mut transport, &command).unwrap();

        assert_eq!(data, vec![0x42]);
        assert_eq!(transport.reconnects, 1);
        assert_eq!(transport.frames.len(), 2);
        assert_eq!(transport.frames[0], transport.frames[1]);
    }

    #[test]
    fn second_connection_loss_propagates() {
        let mut transport = ScriptedTransport::new(vec![lost(), lost(), ok(&[])]);

        let err = ApduChannel::new()
            .send(&mut transport, &Command::new(0x01, 0x00, 0x00))
            .unwrap_err();

        assert!(err.is_connection_lost());
        assert_eq!(transport.frames.len(), 2);
        assert_eq!(transport.reconnects, 1);
    }

    #[test]
    fn non_retriable_fault_is_not_retried() {
        let mut transport = ScriptedTransport::new(vec![
            Err(Error::TransportFailed("sharing violation".to_string())),
            ok(&[]),
        ]);

        let err = ApduChannel::new()
            .send(&mut transport, &Command::new(0x01, 0x00, 0x00))
            .unwrap_err();

        assert!(matches!(err, Error::TransportFailed(_)));
        assert_eq!(transport.frames.len(), 1);
        assert_eq!(transport.reconnects, 0);
    }

    #[test]
    fn never_policy_does_not_reconnect() {
        let mut transport = ScriptedTransport::new(vec![lost(), ok(&[])]);
        let channel = ApduChannel::new().with_policy(RetryPolicy::never());

        let err = channel
            .send(&mut transport, &Command::new(0x01, 0x00, 0x00))
            .unwrap_err();

        assert!(err.is_connection_lost());
        assert_eq!(transport.reconnects, 0);
    }

    #[test]
    fn custom_predicate() {
        let mut transport = ScriptedTransport::new(vec![
            Err(Error::TransportFailed("timeout".to_string())),
            ok(&[0x01]),
        ]);
        let policy = RetryPolicy::once().with_predicate(Error::is_transport);

        let data = ApduChannel::new()
            .with_policy(policy)
            .send(&mut transport, &Command::new(0x01, 0x00, 0x00))
            .unwrap();

        assert_eq!(data, vec![0x01]);
        assert_eq!(transport.reconnects, 1);
    }

    #[test]
    fn failed_reconnect_propagates() {
        let mut transport = ScriptedTransport::new(vec![lost(), ok(&[])]);
        transport.fail_reconnect = true;

        let err = ApduChannel::new()
            .send(&mut transport, &Command::new(0x01, 0x00, 0x00))
            .unwrap_err();

        assert!(matches!(err, Error::ReaderNotFound));
        assert_eq!(transport.frames.len(), 1);
    }

    #[test]
    fn framing_error_skips_transport() {
        let mut transport = ScriptedTransport::new(vec![ok(&[])]);
        let command = Command::new(0x01, 0x00, 0x00).with_data(vec![0u8; 70_000]);

        let err = ApduChannel::new().send(&mut transport, &command).unwrap_err();

        assert!(matches!(err, Error::CommandTooLong(70_000)));
        assert!(transport.frames.is_empty());
    }

    #[test]
    fn class_byte_applies_to_single_instructions() {
        let mut transport = ScriptedTransport::new(vec![ok(&[])]);
        let channel = ApduChannel::new().with_class(0x80);

        channel
            .send(&mut transport, &Command::new(0x10, 0x00, 0x00))
            .unwrap();

        assert_eq!(transport.frames[0], vec![0x80, 0x10, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn channel_from_config() {
        let config = ChannelConfig {
            reconnect_on_connection_lost: false,
            default_class: 0x80,
        };
        let channel = ApduChannel::with_config(&config);

        assert_eq!(channel.class(), 0x80);
        assert_eq!(channel.policy().max_reconnects(), 0);
        assert_eq!(ApduChannel::default().policy().max_reconnects(), 1);
    }

    /// Collects the level of every event carrying a `frame` field.
    #[derive(Clone, Default)]
    struct FrameLevels(std::sync::Arc<std::sync::Mutex<Vec<tracing::Level>>>);

    impl tracing::Subscriber for FrameLevels {
        fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _span: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }

        fn record(&self, _span: &tracing::span::Id, _values: &tracing::span::Record<'_>) {}

        fn record_follows_from(&self, _span: &tracing::span::Id, _follows: &tracing::span::Id) {}

        fn event(&self, event: &tracing::Event<'_>) {
            let metadata = event.metadata();
            if metadata.fields().field("frame").is_some() {
                self.0.lock().unwrap().push(*metadata.level());
            }
        }

        fn enter(&self, _span: &tracing::span::Id) {}

        fn exit(&self, _span: &tracing::span::Id) {}
    }

    #[test]
    fn frames_are_logged_at_debug() {
        let levels = FrameLevels::default();
        let mut transport = ScriptedTransport::new(vec![lost(), ok(&[])]);

        tracing::subscriber::with_default(levels.clone(), || {
            ApduChannel::new()
                .send(&mut transport, &Command::new(0x10, 0x00, 0x00))
                .unwrap();
        });

        let levels = levels.0.lock().unwrap();
        assert_eq!(*levels, vec![tracing::Level::DEBUG, tracing::Level::DEBUG]);
    }
}
