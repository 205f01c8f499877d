//! FFprobe-backed decode sink
//!
//! Writes the artifact to a temporary file, asks `ffprobe` for its container,
//! streams and first frame, and checks them against the declared media type.

use super::probe::{DecodeSignal, DecodeSink};
use super::PlaybackResult;
use crate::artifact::{Artifact, MediaType};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Decode sink that shells out to `ffprobe`
#[derive(Debug, Clone)]
pub struct FfprobeDecodeSink {
    program: PathBuf,
}

impl FfprobeDecodeSink {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeDecodeSink {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl DecodeSink for FfprobeDecodeSink {
    async fn load(
        &self,
        artifact: Artifact,
        signals: mpsc::UnboundedSender<DecodeSignal>,
    ) -> PlaybackResult<()> {
        let program = self.program.clone();
        let media = artifact.media_type();
        let suffix = format!(".{}", media.extension());

        tokio::spawn(async move {
            let written = tokio::task::spawn_blocking(move || -> std::io::Result<tempfile::NamedTempFile> {
                let mut file = tempfile::Builder::new()
                    .prefix("screen-relay-probe-")
                    .suffix(&suffix)
                    .tempfile()?;
                file.write_all(artifact.bytes())?;
                file.flush()?;
                Ok(file)
            })
            .await;

            let file = match written {
                Ok(Ok(file)) => file,
                Ok(Err(e)) => {
                    let _ = signals.send(DecodeSignal::Error(format!("Failed to stage probe input: {}", e)));
                    return;
                }
                Err(e) => {
                    let _ = signals.send(DecodeSignal::Error(format!("Probe staging task failed: {}", e)));
                    return;
                }
            };
            let _ = signals.send(DecodeSignal::Progress);

            let mut command = tokio::process::Command::new(&program);
            command
                .args([
                    "-v", "error",
                    "-print_format", "json",
                    "-show_streams",
                    "-show_format",
                    "-show_frames",
                    "-read_intervals", "%+#32",
                ])
                .arg(file.path())
                .kill_on_drop(true);

            let output = tokio::select! {
                output = command.output() => output,
                _ = signals.closed() => {
                    tracing::debug!("Probe abandoned for {}", media);
                    return;
                }
            };

            let signal = match output {
                Err(e) => DecodeSignal::Error(format!("Failed to run ffprobe: {}", e)),
                Ok(output) if !output.status.success() => DecodeSignal::Error(format!(
                    "ffprobe failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )),
                Ok(output) => {
                    let _ = signals.send(DecodeSignal::Progress);
                    match parse_report(&output.stdout).and_then(|report| check_report(&media, &report)) {
                        Ok(()) => DecodeSignal::FirstFrame,
                        Err(reason) => DecodeSignal::Error(reason),
                    }
                }
            };

            let _ = signals.send(signal);
        });

        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<StreamEntry>,
    #[serde(default)]
    frames: Vec<FrameEntry>,
    #[serde(default)]
    format: Option<FormatEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameEntry {
    #[serde(default)]
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FormatEntry {
    #[serde(default)]
    format_name: String,
}

fn parse_report(stdout: &[u8]) -> Result<ProbeReport, String> {
    serde_json::from_slice(stdout).map_err(|e| format!("Failed to parse ffprobe output: {}", e))
}

/// Demuxer names ffprobe reports for a container subtype
fn container_names(subtype: &str) -> &'static [&'static str] {
    match subtype {
        "webm" => &["webm", "matroska"],
        "x-matroska" => &["matroska"],
        "mp4" => &["mp4", "mov"],
        "ogg" => &["ogg"],
        _ => &[],
    }
}

/// Map a `codecs` entry to ffprobe's codec name
fn normalize_codec(codec: &str) -> &str {
    let family = codec.split('.').next().unwrap_or(codec);
    match family {
        "avc1" | "avc3" | "h264" => "h264",
        "hvc1" | "hev1" | "h265" | "hevc" => "hevc",
        "vp08" | "vp8" => "vp8",
        "vp09" | "vp9" => "vp9",
        "av01" | "av1" => "av1",
        "mp4a" | "aac" => "aac",
        other => other,
    }
}

fn check_report(declared: &MediaType, report: &ProbeReport) -> Result<(), String> {
    let format_name = report
        .format
        .as_ref()
        .map(|f| f.format_name.as_str())
        .unwrap_or_default();

    let accepted = container_names(declared.subtype());
    if !format_name
        .split(',')
        .any(|name| accepted.contains(&name.trim()))
    {
        return Err(format!(
            "container '{}' does not match {}",
            format_name, declared.essence
        ));
    }

    for codec in &declared.codecs {
        let wanted = normalize_codec(codec);
        let present = report
            .streams
            .iter()
            .filter_map(|s| s.codec_name.as_deref())
            .any(|name| name == wanted);
        if !present {
            return Err(format!("no {} stream for declared codec {}", wanted, codec));
        }
    }

    let wants_video = declared.essence.starts_with("video/");
    let has_video = report
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("video"));
    if wants_video && !has_video {
        return Err("no video stream".to_string());
    }

    let decoded = report.frames.iter().any(|frame| {
        !wants_video || frame.media_type.as_deref() == Some("video")
    });
    if !decoded {
        return Err("no frame could be decoded".to_string());
    }

    Ok(())
}
