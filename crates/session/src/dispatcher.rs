//! Control channel dispatcher
//!
//! Serializes outgoing control messages and classifies incoming ones.
//! A configuration message sent before the channel is open is held and
//! flushed on open; only the latest one is kept.

use parking_lot::Mutex;
use std::sync::Arc;

use receptionist_core::{
    ControlChannel, ControlMessage, InboundEnvelope, InboundEvent, LifecycleKind, Result,
    SessionError,
};

use crate::bus::EventBus;

/// What happened to a message handed to [`ControlDispatcher::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Held until the channel opens
    Queued,
    /// Channel not open and the message is not worth holding
    Dropped,
}

/// Per-connection dispatcher bound to one control channel
pub struct ControlDispatcher {
    channel: Arc<dyn ControlChannel>,
    bus: EventBus,
    pending: Mutex<Option<ControlMessage>>,
}

impl ControlDispatcher {
    pub fn new(channel: Arc<dyn ControlChannel>, bus: EventBus) -> Self {
        Self {
            channel,
            bus,
            pending: Mutex::new(None),
        }
    }

    pub fn channel(&self) -> &Arc<dyn ControlChannel> {
        &self.channel
    }

    pub async fn send(&self, message: ControlMessage) -> Result<SendOutcome> {
        if self.channel.is_open() {
            self.transmit(&message).await?;
            return Ok(SendOutcome::Sent);
        }

        if !message.is_configuration() {
            tracing::warn!(kind = message.kind(), "Control channel not open, dropping message");
            return Ok(SendOutcome::Dropped);
        }

        tracing::warn!(
            kind = message.kind(),
            "Control channel not open, holding configuration until it opens"
        );
        *self.pending.lock() = Some(message);

        // The channel may have opened between the check and the enqueue.
        if self.channel.is_open() {
            self.flush().await?;
            return Ok(SendOutcome::Sent);
        }

        Ok(SendOutcome::Queued)
    }

    /// Flush the held configuration after the channel opened
    pub async fn on_open(&self) -> Result<()> {
        tracing::debug!(label = self.channel.label(), "Control channel open");
        self.flush().await
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    async fn flush(&self) -> Result<()> {
        let pending = self.pending.lock().take();
        if let Some(message) = pending {
            self.transmit(&message).await?;
        }
        Ok(())
    }

    async fn transmit(&self, message: &ControlMessage) -> Result<()> {
        let text = serde_json::to_string(message)
            .map_err(|e| SessionError::TransportFailure(e.to_string()))?;
        self.channel.send_text(text).await?;
        tracing::debug!(kind = message.kind(), "Sent control message");
        Ok(())
    }

    /// Classify a raw inbound message and publish it.
    ///
    /// Malformed input yields exactly one `Error` event and never tears
    /// the connection down.
    pub fn on_raw_message(&self, raw: &str) {
        match Self::classify(raw) {
            Ok(event) => self.bus.publish(event),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed control message");
                self.bus.publish(InboundEvent::Error(e.to_string()));
            },
        }
    }

    pub fn classify(raw: &str) -> Result<InboundEvent> {
        let envelope: InboundEnvelope =
            serde_json::from_str(raw).map_err(|e| SessionError::MessageParse(e.to_string()))?;

        let event = match envelope.kind.as_str() {
            "transcript" => InboundEvent::Transcript(envelope.data_text()),
            "response" => InboundEvent::Response(envelope.data_text()),
            "error" => InboundEvent::Error(envelope.data_text()),
            other => InboundEvent::LifecycleSignal(LifecycleKind::from_provider_type(other)),
        };
        Ok(event)
    }
}
