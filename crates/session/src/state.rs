//! Negotiation state machine
//!
//! Every connection attempt gets a generation number. Async results carry
//! the generation they were started under and are rejected once a teardown
//! has bumped it, so a late answer can never revive a dead session.

use parking_lot::Mutex;
use tokio::sync::watch;

use receptionist_core::{ConnectionPhase, Result, SessionError, SessionSnapshot};

/// Internal state guarded by the machine's lock
#[derive(Debug, Clone, Default)]
pub struct NegotiationState {
    pub phase: ConnectionPhase,
    pub control_channel_ready: bool,
    pub active_voice: String,
    pub last_error: Option<SessionError>,
    pub generation: u64,
}

impl NegotiationState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            is_connected: self.phase.is_connected(),
            is_listening: self.phase == ConnectionPhase::Listening,
            is_data_channel_ready: self.control_channel_ready,
            active_voice: self.active_voice.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Transitions applied within one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    OfferCreated,
    OfferSent,
    AnswerApplied,
    ChannelOpened,
    ChannelClosed,
    ListeningStarted,
    ListeningStopped,
}

/// Where a teardown leaves the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Idle,
    Closed,
    Failed(SessionError),
}

pub struct StateMachine {
    state: Mutex<NegotiationState>,
    tx: watch::Sender<SessionSnapshot>,
}

impl StateMachine {
    pub fn new(active_voice: impl Into<String>) -> Self {
        let state = NegotiationState {
            active_voice: active_voice.into(),
            ..Default::default()
        };
        let (tx, _rx) = watch::channel(state.snapshot());
        Self {
            state: Mutex::new(state),
            tx,
        }
    }

    /// Start a new attempt.
    ///
    /// # Returns
    /// The generation of the new attempt
    pub fn begin(&self) -> Result<u64> {
        let mut state = self.state.lock();
        match state.phase {
            ConnectionPhase::Idle | ConnectionPhase::Closed | ConnectionPhase::Failed => {},
            _ => return Err(SessionError::AlreadyConnecting),
        }

        state.generation += 1;
        state.phase = ConnectionPhase::CredentialPending;
        state.control_channel_ready = false;
        state.last_error = None;
        let generation = state.generation;
        self.publish(&state);
        Ok(generation)
    }

    /// Apply `transition` if `generation` is still current.
    ///
    /// # Returns
    /// `true` if the observable state changed
    pub fn apply(&self, generation: u64, transition: Transition) -> Result<bool> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return Err(SessionError::StaleConnection);
        }

        let before = (state.phase, state.control_channel_ready);
        match transition {
            Transition::OfferCreated => state.phase = ConnectionPhase::OfferCreated,
            Transition::OfferSent => state.phase = ConnectionPhase::AwaitingRemoteAnswer,
            Transition::AnswerApplied => state.phase = ConnectionPhase::Connected,
            Transition::ChannelOpened => state.control_channel_ready = true,
            Transition::ChannelClosed => {
                state.control_channel_ready = false;
                if state.phase == ConnectionPhase::Listening {
                    state.phase = ConnectionPhase::Connected;
                }
            },
            Transition::ListeningStarted => {
                if !state.phase.is_connected() {
                    return Err(SessionError::NotConnected);
                }
                if !state.control_channel_ready {
                    return Err(SessionError::ChannelNotReady);
                }
                state.phase = ConnectionPhase::Listening;
            },
            Transition::ListeningStopped => {
                if state.phase == ConnectionPhase::Listening {
                    state.phase = ConnectionPhase::Connected;
                }
            },
        }

        let changed = before != (state.phase, state.control_channel_ready);
        if changed {
            tracing::debug!(
                generation,
                ?transition,
                phase = %state.phase,
                channel_ready = state.control_channel_ready,
                "State transition"
            );
            self.publish(&state);
        }
        Ok(changed)
    }

    /// Bump the generation unconditionally
    pub fn invalidate(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.generation
    }

    /// Bump the generation only if `generation` is still current
    pub fn invalidate_if(&self, generation: u64) -> Option<u64> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        state.generation += 1;
        Some(state.generation)
    }

    /// Reset to the initial state, keeping the active voice
    pub fn finish(&self, generation: u64, terminal: Terminal) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }

        state.control_channel_ready = false;
        match terminal {
            Terminal::Idle => {
                state.phase = ConnectionPhase::Idle;
                state.last_error = None;
            },
            Terminal::Closed => {
                state.phase = ConnectionPhase::Closed;
                state.last_error = None;
            },
            Terminal::Failed(err) => {
                state.phase = ConnectionPhase::Failed;
                state.last_error = Some(err);
            },
        }
        self.publish(&state);
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.lock().phase
    }

    pub fn state(&self) -> NegotiationState {
        self.state.lock().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn active_voice(&self) -> String {
        self.state.lock().active_voice.clone()
    }

    pub fn set_active_voice(&self, voice: impl Into<String>) {
        let mut state = self.state.lock();
        state.active_voice = voice.into();
        self.publish(&state);
    }

    fn publish(&self, state: &NegotiationState) {
        self.tx.send_replace(state.snapshot());
    }
}
