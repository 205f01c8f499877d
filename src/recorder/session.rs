//! Capture session
//!
//! Owns the granted devices, the segment sink and the recording state machine.
//! Explicit stops, device revocation and restarts all run the same stop path,
//! and every path releases the devices before the state returns to `Idle`.

use super::state::{CaptureOptions, SessionEvent, SessionState, SessionStatus, StopReason};
use crate::artifact::Artifact;
use crate::capture::{
    CaptureConstraints, CaptureDevice, CaptureError, CaptureResult, DeviceProvider, SegmentSink,
};
use crate::config::CoreConfig;
use crate::relay::RelayChannel;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Duration of each emitted segment
    pub slice_interval: Duration,
    /// Declaration used when the device does not report one
    pub declared_type: String,
}

impl From<&CoreConfig> for SessionSettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            slice_interval: config.slice_interval(),
            declared_type: config.declared_type.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&CoreConfig::default())
    }
}

/// Everything held while a device is granted
struct ActiveCapture {
    session_id: Uuid,
    display: Box<dyn CaptureDevice>,
    microphone: Option<Box<dyn CaptureDevice>>,
    declared_type: String,
    sink: Arc<Mutex<SegmentSink>>,
    collector: JoinHandle<()>,
    /// Tells the collector to drain what is queued and exit
    drain: CancellationToken,
    /// Ends the revocation watcher
    done: CancellationToken,
}

struct Shared {
    provider: Arc<dyn DeviceProvider>,
    settings: SessionSettings,
    relay: Option<RelayChannel>,
    state: RwLock<SessionState>,
    started_at: RwLock<Option<Instant>>,
    /// Serializes every transition
    active: tokio::sync::Mutex<Option<ActiveCapture>>,
    /// Outcome of a revocation-driven stop, reported by the next `stop()`
    parked: Mutex<Option<CaptureResult<Artifact>>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Handle to the process-wide capture session
#[derive(Clone)]
pub struct CaptureSession {
    shared: Arc<Shared>,
}

impl CaptureSession {
    /// Create an idle session
    pub fn new(provider: Arc<dyn DeviceProvider>, settings: SessionSettings) -> Self {
        Self::build(provider, settings, None)
    }

    /// Create an idle session that hands every assembled artifact to `relay`
    pub fn with_relay(provider: Arc<dyn DeviceProvider>, settings: SessionSettings, relay: RelayChannel) -> Self {
        Self::build(provider, settings, Some(relay))
    }

    fn build(provider: Arc<dyn DeviceProvider>, settings: SessionSettings, relay: Option<RelayChannel>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            shared: Arc::new(Shared {
                provider,
                settings,
                relay,
                state: RwLock::new(SessionState::Idle),
                started_at: RwLock::new(None),
                active: tokio::sync::Mutex::new(None),
                parked: Mutex::new(None),
                event_tx,
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Whether segments are flowing, and for how many whole seconds
    pub fn status(&self) -> SessionStatus {
        let active = self.state() == SessionState::Active;
        let started_at = *self.shared.started_at.read();
        let elapsed_seconds = match started_at {
            Some(t) if active => t.elapsed().as_secs(),
            _ => 0,
        };

        SessionStatus {
            active,
            elapsed_seconds,
        }
    }

    /// Start capturing.
    ///
    /// A session that is still running is stopped to completion first.
    pub async fn start(&self, options: CaptureOptions) -> CaptureResult<()> {
        let shared = Arc::clone(&self.shared);
        run_transition(async move { shared.start(options).await }).await
    }

    /// Stop capturing and return the assembled recording.
    ///
    /// Resolves to `None` when nothing is running. If the device was revoked
    /// since the last call, the outcome of that stop is returned once.
    pub async fn stop(&self) -> CaptureResult<Option<Artifact>> {
        let shared = Arc::clone(&self.shared);
        run_transition(async move { shared.stop().await }).await
    }
}

/// Run a transition on its own task. Dropping the caller does not interrupt it.
async fn run_transition<T, F>(transition: F) -> CaptureResult<T>
where
    T: Send + 'static,
    F: Future<Output = CaptureResult<T>> + Send + 'static,
{
    tokio::spawn(transition)
        .await
        .map_err(|e| CaptureError::Device(format!("session task failed: {}", e)))?
}

impl Shared {
    /// Start path. Runs on its own task.
    async fn start(self: &Arc<Self>, options: CaptureOptions) -> CaptureResult<()> {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            tracing::info!("Finishing session {} before starting a new one", previous.session_id);
            match self.finish(previous, StopReason::Restart).await {
                Ok(artifact) => tracing::info!("Previous session produced {} bytes", artifact.len()),
                Err(e) => tracing::warn!("Previous session ended without a recording: {}", e),
            }
        }

        if self.parked.lock().take().is_some() {
            tracing::debug!("Discarding unreported outcome of a revoked session");
        }

        let session_id = Uuid::new_v4();
        self.set_state(SessionState::Requesting);
        tracing::info!(%session_id, "Requesting capture device (pointer: {})", options.show_pointer);

        let mut display = match self
            .provider
            .acquire(&CaptureConstraints::display(options.show_pointer))
            .await
        {
            Ok(device) => device,
            Err(e) => {
                let err = match e {
                    CaptureError::AcquisitionFailed(_) => e,
                    other => CaptureError::AcquisitionFailed(other.to_string()),
                };
                self.set_state(SessionState::Idle);
                tracing::error!(%session_id, "Failed to acquire capture device: {}", err);
                self.emit(SessionEvent::Error {
                    session_id: Some(session_id),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        let microphone = if options.include_microphone {
            self.attach_microphone(display.as_mut(), session_id).await
        } else {
            None
        };

        let declared_type = display
            .declared_type()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.settings.declared_type.clone());

        let sink = Arc::new(Mutex::new(SegmentSink::new()));
        let drain = CancellationToken::new();
        let (segment_tx, segment_rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect_segments(segment_rx, Arc::clone(&sink), drain.clone()));

        if let Err(e) = display.start_emitting(self.settings.slice_interval, segment_tx).await {
            tracing::error!(%session_id, "Capture device failed to start: {}", e);
            collector.abort();
            display.release().await;
            if let Some(mut mic) = microphone {
                mic.release().await;
            }
            self.set_state(SessionState::Idle);
            self.emit(SessionEvent::Error {
                session_id: Some(session_id),
                message: e.to_string(),
            });
            return Err(e);
        }

        let done = CancellationToken::new();
        tokio::spawn(watch_revocation(
            Arc::downgrade(self),
            display.on_revoked(),
            session_id,
            done.clone(),
        ));

        *active = Some(ActiveCapture {
            session_id,
            display,
            microphone,
            declared_type,
            sink,
            collector,
            drain,
            done,
        });
        *self.started_at.write() = Some(Instant::now());
        self.set_state(SessionState::Active);
        self.emit(SessionEvent::Started { session_id });

        tracing::info!(%session_id, "Recording started");
        Ok(())
    }

    /// Stop path for an explicit request. Runs on its own task.
    async fn stop(&self) -> CaptureResult<Option<Artifact>> {
        let mut active = self.active.lock().await;

        if let Some(capture) = active.take() {
            return self.finish(capture, StopReason::Requested).await.map(Some);
        }

        let parked = self.parked.lock().take();
        match parked {
            Some(outcome) => outcome.map(Some),
            None => {
                tracing::debug!("Stop requested while idle");
                Ok(None)
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!("Session state {:?} -> {:?}", previous, state);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Acquire a microphone and mix it in. Failures leave the session video-only.
    async fn attach_microphone(
        &self,
        display: &mut dyn CaptureDevice,
        session_id: Uuid,
    ) -> Option<Box<dyn CaptureDevice>> {
        let mut mic = match self.provider.acquire(&CaptureConstraints::microphone()).await {
            Ok(mic) => mic,
            Err(e) => {
                tracing::warn!(%session_id, "Microphone unavailable, recording video only: {}", e);
                return None;
            }
        };

        match display.attach_tracks(mic.tracks()).await {
            Ok(()) => {
                tracing::info!(%session_id, "Microphone {} attached", mic.id());
                Some(mic)
            }
            Err(e) => {
                tracing::warn!(%session_id, "Could not mix microphone, recording video only: {}", e);
                mic.release().await;
                None
            }
        }
    }

    /// The stop path. Callers hold the `active` lock.
    async fn finish(&self, capture: ActiveCapture, reason: StopReason) -> CaptureResult<Artifact> {
        let ActiveCapture {
            session_id,
            mut display,
            microphone,
            declared_type,
            sink,
            collector,
            drain,
            done,
        } = capture;

        self.set_state(SessionState::Stopping);
        tracing::info!(%session_id, "Stopping recording ({:?})", reason);

        let flushed = display.stop_emitting().await;

        drain.cancel();
        if let Err(e) = collector.await {
            tracing::warn!(%session_id, "Segment collector ended abnormally: {}", e);
        }
        done.cancel();

        display.release().await;
        if let Some(mut mic) = microphone {
            mic.release().await;
        }
        *self.started_at.write() = None;

        let assembled = {
            let mut sink = sink.lock();
            let segment_count = sink.len();
            let result = match flushed {
                Ok(()) => sink.assemble(&declared_type),
                Err(e) => {
                    sink.clear();
                    Err(e)
                }
            };
            tracing::debug!(%session_id, "Sink held {} segments", segment_count);
            result
        };

        self.set_state(SessionState::Idle);

        let artifact = match assembled {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!(%session_id, "Recording failed: {}", e);
                self.emit(SessionEvent::Error {
                    session_id: Some(session_id),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        tracing::info!(%session_id, "Final recording size: {} bytes", artifact.len());

        if let Some(relay) = &self.relay {
            let ack = relay.send(artifact.clone()).await.map_err(|e| {
                tracing::error!(%session_id, "Failed to store recording: {}", e);
                self.emit(SessionEvent::Error {
                    session_id: Some(session_id),
                    message: e.to_string(),
                });
                CaptureError::from(e)
            })?;
            tracing::debug!(%session_id, "Relay acknowledged {} bytes", ack.byte_length);
        }

        self.emit(SessionEvent::Stopped {
            session_id,
            byte_length: artifact.len(),
        });
        Ok(artifact)
    }

    /// Stop path entered from a revocation notice
    async fn stop_revoked(&self, session_id: Uuid) {
        let mut active = self.active.lock().await;

        let current = active.as_ref().map(|c| c.session_id);
        if current != Some(session_id) {
            tracing::debug!(%session_id, "Revocation arrived after the session ended");
            return;
        }

        let Some(capture) = active.take() else {
            return;
        };

        tracing::info!(%session_id, "Capture device revoked by the user");
        self.emit(SessionEvent::Revoked { session_id });

        let outcome = self.finish(capture, StopReason::Revoked).await;
        *self.parked.lock() = Some(outcome);
    }
}

/// Move emitted segments into the sink until told to drain
async fn collect_segments(
    mut segments: mpsc::UnboundedReceiver<Vec<u8>>,
    sink: Arc<Mutex<SegmentSink>>,
    drain: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            received = segments.recv() => match received {
                Some(bytes) => {
                    sink.lock().push(bytes);
                }
                None => break,
            },
            _ = drain.cancelled() => {
                while let Ok(bytes) = segments.try_recv() {
                    sink.lock().push(bytes);
                }
                break;
            }
        }
    }
}

/// Drive the stop path when the device reports revocation
async fn watch_revocation(
    session: Weak<Shared>,
    mut revoked: watch::Receiver<bool>,
    session_id: Uuid,
    done: CancellationToken,
) {
    let fired = tokio::select! {
        _ = done.cancelled() => false,
        result = revoked.wait_for(|r| *r) => result.is_ok(),
    };

    if !fired {
        return;
    }

    if let Some(shared) = session.upgrade() {
        shared.stop_revoked(session_id).await;
    }
}
