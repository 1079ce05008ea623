//! Voice session probe
//!
//! Brings up one native voice session against the configured backend,
//! prints every inbound event and disconnects on Ctrl+C or when the
//! capture file has been played out.
//!
//! ```text
//! voice-probe <profile.yaml> [capture.wav]
//! ```

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use receptionist_config::{load_agent_profile, load_settings, Settings};
use receptionist_core::{CaptureDevice, Channels, InboundEvent, SampleRate};
use receptionist_session::{
    HttpCredentialBroker, HttpSignalingClient, SessionDeps, SessionOptions, VoiceSession,
};
use receptionist_transport::{ChannelCaptureDevice, WavCaptureDevice, WebRtcConfig, WebRtcConnector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(profile_path) = args.next().map(PathBuf::from) else {
        bail!("usage: voice-probe <profile.yaml> [capture.wav]");
    };
    let wav_path = args.next().map(PathBuf::from);

    let env = std::env::var("RECEPTIONIST_ENV").ok();
    let settings = load_settings(env.as_deref()).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("receptionist={}", settings.observability.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let profile = load_agent_profile(&profile_path)
        .with_context(|| format!("loading profile {}", profile_path.display()))?;

    let (capture, play_for): (Arc<dyn CaptureDevice>, Option<Duration>) = match &wav_path {
        Some(path) => (Arc::new(WavCaptureDevice::new(path)), Some(wav_duration(path)?)),
        None => (
            Arc::new(ChannelCaptureDevice::new(SampleRate::Hz48000, Channels::Mono)),
            None,
        ),
    };

    let (playback_tx, mut playback_rx) = mpsc::channel(64);
    let connector = WebRtcConnector::new(WebRtcConfig::from_settings(&settings.session))
        .with_playback(playback_tx);

    let session = VoiceSession::new(
        profile,
        SessionOptions::from_settings(&settings.session),
        SessionDeps {
            broker: Arc::new(HttpCredentialBroker::from_settings(&settings.session)?),
            signaling: Arc::new(HttpSignalingClient::from_settings(&settings.session)?),
            connector: Arc::new(connector),
            capture,
        },
    );

    let _events = session.subscribe(|event| match event {
        InboundEvent::Transcript(text) => println!("you:   {}", text),
        InboundEvent::Response(text) => println!("agent: {}", text),
        InboundEvent::Error(message) => eprintln!("error: {}", message),
        InboundEvent::LifecycleSignal(kind) => println!("--     {:?}", kind),
    });

    tokio::spawn(async move {
        let mut frames = 0u64;
        while playback_rx.recv().await.is_some() {
            frames += 1;
            if frames % 250 == 0 {
                tracing::debug!(frames, "Remote audio received");
            }
        }
    });

    session.connect().await?;

    let mut state = session.watch();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !state.borrow_and_update().is_data_channel_ready {
            if state.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .context("control channel did not open")?;

    session.start_listening().await?;

    match play_for {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration + Duration::from_millis(500)) => {
                    tracing::info!("Capture file finished");
                }
                _ = tokio::signal::ctrl_c() => {}
            }
        },
        None => {
            tokio::signal::ctrl_c().await?;
        },
    }

    session.disconnect().await;
    Ok(())
}

fn wav_duration(path: &PathBuf) -> anyhow::Result<Duration> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let secs = reader.duration() as f64 / spec.sample_rate as f64;
    Ok(Duration::from_secs_f64(secs))
}
