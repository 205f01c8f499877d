//! Recorded artifacts and media type declarations
//!
//! An [`Artifact`] is the assembled recording: an immutable byte payload plus
//! the media type it is declared under. Re-declaring an artifact never touches
//! the bytes, it only swaps the declaration.

use std::fmt;
use std::sync::Arc;

/// Assembled binary recording with its declared media type
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Arc<[u8]>,
    declared_type: String,
}

impl Artifact {
    /// Create an artifact from a payload and a media type declaration
    pub fn new(bytes: impl Into<Arc<[u8]>>, declared_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            declared_type: declared_type.into(),
        }
    }

    /// Raw payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the payload, used for zero-copy transfers
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Declared media type, e.g. `video/webm;codecs=vp8,opus`
    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    /// Parsed form of the declared media type
    pub fn media_type(&self) -> MediaType {
        MediaType::parse(&self.declared_type)
    }

    /// Same bytes under a different declaration
    pub fn redeclare(&self, declared_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::clone(&self.bytes),
            declared_type: declared_type.into(),
        }
    }

    /// File extension matching the declared container
    pub fn extension(&self) -> &'static str {
        self.media_type().extension()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("len", &self.bytes.len())
            .field("declared_type", &self.declared_type)
            .finish()
    }
}

/// A media type split into its essence and `codecs` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// `type/subtype`, lowercased
    pub essence: String,
    /// Codec names from the `codecs` parameter, lowercased, in order
    pub codecs: Vec<String>,
}

impl MediaType {
    /// Parse a declaration such as `video/webm; codecs="vp9,opus"`
    pub fn parse(declaration: &str) -> Self {
        let mut parts = declaration.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

        let codecs = parts
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                if name.trim().eq_ignore_ascii_case("codecs") {
                    Some(value.trim().trim_matches('"').to_string())
                } else {
                    None
                }
            })
            .flat_map(|value| {
                value
                    .split(',')
                    .map(|codec| codec.trim().to_ascii_lowercase())
                    .filter(|codec| !codec.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();

        Self { essence, codecs }
    }

    /// Container subtype (`webm`, `mp4`, ...)
    pub fn subtype(&self) -> &str {
        self.essence
            .split_once('/')
            .map(|(_, sub)| sub)
            .unwrap_or(self.essence.as_str())
    }

    pub fn extension(&self) -> &'static str {
        match self.subtype() {
            "webm" => "webm",
            "mp4" => "mp4",
            "x-matroska" => "mkv",
            "ogg" => "ogg",
            _ => "bin",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.codecs.is_empty() {
            write!(f, "{}", self.essence)
        } else {
            write!(f, "{};codecs={}", self.essence, self.codecs.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codecs_parameter() {
        let media = MediaType::parse("video/webm; codecs=\"VP9, opus\"");
        assert_eq!(media.essence, "video/webm");
        assert_eq!(media.codecs, vec!["vp9", "opus"]);
        assert_eq!(media.to_string(), "video/webm;codecs=vp9,opus");
    }

    #[test]
    fn test_parse_bare_essence() {
        let media = MediaType::parse("video/mp4");
        assert!(media.codecs.is_empty());
        assert_eq!(media.subtype(), "mp4");
        assert_eq!(media.extension(), "mp4");
    }

    #[test]
    fn test_redeclare_shares_bytes() {
        let original = Artifact::new(vec![1u8, 2, 3], "video/webm");
        let specific = original.redeclare("video/webm;codecs=vp8");

        assert_eq!(specific.bytes(), original.bytes());
        assert!(Arc::ptr_eq(&specific.shared_bytes(), &original.shared_bytes()));
        assert_eq!(specific.declared_type(), "video/webm;codecs=vp8");
        assert_eq!(original.declared_type(), "video/webm");
    }

    #[test]
    fn test_debug_omits_payload() {
        let artifact = Artifact::new(vec![0u8; 4096], "video/webm");
        let rendered = format!("{:?}", artifact);
        assert!(rendered.contains("len: 4096"));
        assert!(!rendered.contains("0, 0, 0"));
    }
}
