//! Realtime voice session negotiation
//!
//! Brings up one bidirectional audio session with a speech provider:
//!
//! ```text
//! connect():
//!   CredentialBroker ──▶ PeerConnector ──▶ offer ──▶ SignalingClient ──▶ answer
//!                          │
//!                          └─ control channel ──▶ ControlDispatcher ──▶ EventBus
//!
//! start_listening():
//!   MediaSourceManager ──▶ capture track ──▶ outgoing transceiver
//!
//! disconnect() / failure:
//!   LifecycleCoordinator: capture → channel → peer → sink
//! ```

pub mod broker;
pub mod bus;
pub mod dispatcher;
pub mod lifecycle;
pub mod media;
pub mod negotiator;
pub mod signaling;
pub mod state;

pub use broker::{CredentialBroker, HttpCredentialBroker};
pub use bus::{EventBus, Subscription};
pub use dispatcher::{ControlDispatcher, SendOutcome};
pub use lifecycle::{LifecycleCoordinator, ResourceSet};
pub use media::MediaSourceManager;
pub use negotiator::{SessionDeps, SessionOptions, VoiceSession};
pub use signaling::{HttpSignalingClient, SignalingClient};
pub use state::{NegotiationState, StateMachine, Terminal, Transition};
