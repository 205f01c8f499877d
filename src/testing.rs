//! Scripted collaborators for unit tests

use crate::artifact::Artifact;
use crate::capture::{
    CaptureConstraints, CaptureDevice, CaptureError, CaptureResult, DeviceKind, DeviceProvider,
    TrackInfo, TrackKind,
};
use crate::export::{Downloader, ExportResult, UploadReceipt, Uploader};
use crate::playback::{DecodeSignal, DecodeSink, PlaybackResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

// =============================================================================
// Capture devices
// =============================================================================

struct ControlInner {
    constraints: CaptureConstraints,
    segments: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    pending: Mutex<Vec<u8>>,
    timeslice: Mutex<Option<Duration>>,
    attached: Mutex<Vec<TrackInfo>>,
    released: AtomicBool,
    revoked: watch::Sender<bool>,
}

/// Test-side handle onto a scripted device
#[derive(Clone)]
pub struct DeviceControl {
    inner: Arc<ControlInner>,
}

impl DeviceControl {
    fn new(constraints: CaptureConstraints) -> Self {
        let (revoked, _) = watch::channel(false);
        Self {
            inner: Arc::new(ControlInner {
                constraints,
                segments: Mutex::new(None),
                pending: Mutex::new(Vec::new()),
                timeslice: Mutex::new(None),
                attached: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
                revoked,
            }),
        }
    }

    /// Deliver one completed slice
    pub fn emit(&self, bytes: &[u8]) {
        if let Some(tx) = self.inner.segments.lock().as_ref() {
            let _ = tx.send(bytes.to_vec());
        }
    }

    /// Hold data back as a partial slice until the encoder stops
    pub fn buffer(&self, bytes: &[u8]) {
        self.inner.pending.lock().extend_from_slice(bytes);
    }

    /// Simulate the user ending the share
    pub fn revoke(&self) {
        self.inner.revoked.send_replace(true);
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn timeslice(&self) -> Option<Duration> {
        *self.inner.timeslice.lock()
    }

    pub fn attached(&self) -> Vec<TrackInfo> {
        self.inner.attached.lock().clone()
    }

    pub fn constraints(&self) -> CaptureConstraints {
        self.inner.constraints.clone()
    }
}

struct ScriptedDevice {
    id: String,
    declared_type: Option<String>,
    fail_start: bool,
    fail_stop: bool,
    control: DeviceControl,
}

#[async_trait]
impl CaptureDevice for ScriptedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        let constraints = &self.control.inner.constraints;
        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(TrackInfo {
                id: format!("{}-video", self.id),
                kind: TrackKind::Video,
                label: "Screen 1".to_string(),
            });
        }
        if constraints.audio {
            let label = match constraints.kind {
                DeviceKind::Display => "System Audio",
                DeviceKind::Microphone => "Built-in Microphone",
            };
            tracks.push(TrackInfo {
                id: format!("{}-audio", self.id),
                kind: TrackKind::Audio,
                label: label.to_string(),
            });
        }
        tracks
    }

    fn declared_type(&self) -> Option<String> {
        self.declared_type.clone()
    }

    fn on_revoked(&self) -> watch::Receiver<bool> {
        self.control.inner.revoked.subscribe()
    }

    async fn attach_tracks(&mut self, tracks: Vec<TrackInfo>) -> CaptureResult<()> {
        // Only the audio side of the microphone is mixed in
        self.control
            .inner
            .attached
            .lock()
            .extend(tracks.into_iter().filter(|t| t.kind == TrackKind::Audio));
        Ok(())
    }

    async fn start_emitting(
        &mut self,
        timeslice: Duration,
        segments: mpsc::UnboundedSender<Vec<u8>>,
    ) -> CaptureResult<()> {
        if self.fail_start {
            return Err(CaptureError::Device("encoder unavailable".to_string()));
        }
        *self.control.inner.timeslice.lock() = Some(timeslice);
        *self.control.inner.segments.lock() = Some(segments);
        Ok(())
    }

    async fn stop_emitting(&mut self) -> CaptureResult<()> {
        if self.fail_stop {
            self.control.inner.segments.lock().take();
            return Err(CaptureError::Device("encoder did not finalize".to_string()));
        }
        let pending = std::mem::take(&mut *self.control.inner.pending.lock());
        if let Some(tx) = self.control.inner.segments.lock().take() {
            if !pending.is_empty() {
                let _ = tx.send(pending);
            }
        }
        Ok(())
    }

    async fn release(&mut self) {
        self.control.inner.segments.lock().take();
        self.control.inner.released.store(true, Ordering::SeqCst);
    }
}

/// Device provider that grants scripted devices
#[derive(Default)]
pub struct ScriptedProvider {
    deny_display: AtomicBool,
    deny_microphone: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    declared_type: Option<String>,
    granted: AtomicUsize,
    /// Most displays held unreleased at the same time
    peak_live_displays: AtomicUsize,
    displays: Mutex<Vec<DeviceControl>>,
    microphones: Mutex<Vec<DeviceControl>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Devices report `declared_type` for their output
    pub fn with_declared_type(declared_type: &str) -> Arc<Self> {
        Arc::new(Self {
            declared_type: Some(declared_type.to_string()),
            ..Self::default()
        })
    }

    pub fn deny_display(&self, deny: bool) {
        self.deny_display.store(deny, Ordering::SeqCst);
    }

    pub fn deny_microphone(&self, deny: bool) {
        self.deny_microphone.store(deny, Ordering::SeqCst);
    }

    /// Granted devices refuse to start their encoder
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Granted devices fail to finalize their encoder
    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn displays(&self) -> Vec<DeviceControl> {
        self.displays.lock().clone()
    }

    pub fn peak_live_displays(&self) -> usize {
        self.peak_live_displays.load(Ordering::SeqCst)
    }

    pub fn microphones(&self) -> Vec<DeviceControl> {
        self.microphones.lock().clone()
    }

    /// Most recently granted display
    pub fn last_display(&self) -> DeviceControl {
        self.displays
            .lock()
            .last()
            .cloned()
            .expect("no display has been granted")
    }
}

#[async_trait]
impl DeviceProvider for ScriptedProvider {
    async fn acquire(&self, constraints: &CaptureConstraints) -> CaptureResult<Box<dyn CaptureDevice>> {
        let (denied, registry) = match constraints.kind {
            DeviceKind::Display => (&self.deny_display, &self.displays),
            DeviceKind::Microphone => (&self.deny_microphone, &self.microphones),
        };

        if denied.load(Ordering::SeqCst) {
            return Err(CaptureError::AcquisitionFailed("Permission denied".to_string()));
        }

        let n = self.granted.fetch_add(1, Ordering::SeqCst);
        let control = DeviceControl::new(constraints.clone());
        let live = {
            let mut registry = registry.lock();
            registry.push(control.clone());
            registry.iter().filter(|c| !c.is_released()).count()
        };
        if constraints.kind == DeviceKind::Display {
            self.peak_live_displays.fetch_max(live, Ordering::SeqCst);
        }

        Ok(Box::new(ScriptedDevice {
            id: format!("device-{}", n),
            declared_type: self.declared_type.clone(),
            fail_start: self.fail_start.load(Ordering::SeqCst),
            fail_stop: self.fail_stop.load(Ordering::SeqCst),
            control,
        }))
    }
}

// =============================================================================
// Decode sinks
// =============================================================================

/// Decode sink with per-declaration behavior.
///
/// Declarations not scripted report progress and then an error.
#[derive(Default)]
pub struct ScriptedDecoder {
    playable: HashSet<String>,
    silent: HashSet<String>,
    stalling: HashSet<String>,
    probed: Mutex<Vec<String>>,
    /// Keeps channels of silent and stalling probes open
    held: Mutex<Vec<mpsc::UnboundedSender<DecodeSignal>>>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a first frame
    pub fn playable(mut self, declared_type: &str) -> Self {
        self.playable.insert(declared_type.to_string());
        self
    }

    /// Never reports anything
    pub fn silent(mut self, declared_type: &str) -> Self {
        self.silent.insert(declared_type.to_string());
        self
    }

    /// Reports progress once, then nothing
    pub fn stalling(mut self, declared_type: &str) -> Self {
        self.stalling.insert(declared_type.to_string());
        self
    }

    /// Declarations loaded so far, in order
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl DecodeSink for ScriptedDecoder {
    async fn load(
        &self,
        artifact: Artifact,
        signals: mpsc::UnboundedSender<DecodeSignal>,
    ) -> PlaybackResult<()> {
        let declared = artifact.declared_type().to_string();
        self.probed.lock().push(declared.clone());

        if self.playable.contains(&declared) {
            let _ = signals.send(DecodeSignal::Progress);
            let _ = signals.send(DecodeSignal::FirstFrame);
        } else if self.silent.contains(&declared) {
            self.held.lock().push(signals);
        } else if self.stalling.contains(&declared) {
            let _ = signals.send(DecodeSignal::Progress);
            self.held.lock().push(signals);
        } else {
            let _ = signals.send(DecodeSignal::Progress);
            let _ = signals.send(DecodeSignal::Error(format!("unsupported: {}", declared)));
        }

        Ok(())
    }
}

// =============================================================================
// Export targets
// =============================================================================

/// Uploader that records what it was handed
pub struct RecordingUploader {
    location_url: Option<String>,
    calls: Mutex<Vec<(String, usize, String)>>,
}

impl RecordingUploader {
    pub fn succeeding(location_url: &str) -> Self {
        Self {
            location_url: Some(location_url.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns an unsuccessful receipt
    pub fn rejecting() -> Self {
        Self {
            location_url: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (filename, byte length, declared type) per call
    pub fn calls(&self) -> Vec<(String, usize, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, artifact: &Artifact, filename: &str) -> ExportResult<UploadReceipt> {
        self.calls.lock().push((
            filename.to_string(),
            artifact.len(),
            artifact.declared_type().to_string(),
        ));

        Ok(UploadReceipt {
            success: self.location_url.is_some(),
            location_url: self.location_url.clone(),
        })
    }
}

/// Downloader that records what it saved
#[derive(Default)]
pub struct RecordingDownloader {
    saved: Mutex<Vec<(String, usize)>>,
    types: Mutex<Vec<String>>,
}

impl RecordingDownloader {
    /// (filename, byte length) per save
    pub fn saved(&self) -> Vec<(String, usize)> {
        self.saved.lock().clone()
    }

    /// Declared type of each saved artifact
    pub fn declared_types(&self) -> Vec<String> {
        self.types.lock().clone()
    }
}

#[async_trait]
impl Downloader for RecordingDownloader {
    async fn save(&self, artifact: Artifact, filename: String) -> ExportResult<()> {
        self.saved.lock().push((filename, artifact.len()));
        self.types.lock().push(artifact.declared_type().to_string());
        Ok(())
    }
}
