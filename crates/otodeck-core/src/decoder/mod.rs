//! Source opening and decoding
//!
//! Decks never parse container or codec bytes. They ask a [`SourceOpener`]
//! for a [`DecodedAudio`], which holds the whole stream as stereo frames at
//! the source's native rate. Opening runs on the control side (or the
//! background loader), never on the render thread.

mod file;

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::DecodeError;
use crate::types::{Sample, StereoBuffer, StereoSample};

pub use file::SymphoniaOpener;

/// File extensions the file opener accepts
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["wav", "mp3", "aif", "aiff", "flac", "ogg"];

/// Opaque identifier of an audio resource
///
/// Either a filesystem path or a `file://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve to a filesystem path
    ///
    /// `file://` URLs must carry an absolute local path
    /// (`file:///music/a.wav`); percent escapes are decoded.
    pub fn to_path(&self) -> Result<PathBuf, DecodeError> {
        let raw = self.0.trim();
        let invalid = || DecodeError::InvalidSourceId(self.0.clone());
        if raw.is_empty() {
            return Err(invalid());
        }
        if raw.starts_with("file://") {
            let url = Url::parse(raw).map_err(|_| invalid())?;
            return url.to_file_path().map_err(|_| invalid());
        }
        if raw.contains("://") {
            return Err(invalid());
        }
        Ok(PathBuf::from(raw))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&Path> for SourceId {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for SourceId {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

/// Check a path's extension against [`SUPPORTED_EXTENSIONS`] (case-insensitive)
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// A fully decoded source
///
/// Frames are stereo at the source's native sample rate. The channel count
/// of the original stream is kept for reporting only.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    frames: StereoBuffer,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    pub fn new(frames: StereoBuffer, sample_rate: u32, channels: u16) -> Result<Self, DecodeError> {
        if sample_rate == 0 {
            return Err(DecodeError::UnknownSampleRate);
        }
        if frames.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Self {
            frames,
            sample_rate,
            channels,
        })
    }

    /// Fold interleaved samples of any width into stereo frames
    ///
    /// Mono is duplicated to both sides; streams wider than two channels keep
    /// their first pair.
    pub fn from_interleaved(
        samples: &[Sample],
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, DecodeError> {
        if channels == 0 {
            return Err(DecodeError::UnsupportedFormat("zero channels".into()));
        }
        let width = channels as usize;
        let frames: Vec<StereoSample> = samples
            .chunks_exact(width)
            .map(|frame| match frame {
                [mono] => StereoSample::mono(*mono),
                [left, right, ..] => StereoSample::new(*left, *right),
                [] => StereoSample::silence(),
            })
            .collect();
        Self::new(StereoBuffer::from_vec(frames), sample_rate, channels)
    }

    pub fn frames(&self) -> &[StereoSample] {
        self.frames.as_slice()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the stream before folding to stereo
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }
}

/// Opens an audio resource and decodes it completely
///
/// Shared between decks, so implementations must be thread-safe.
pub trait SourceOpener: Send + Sync {
    fn open(&self, id: &SourceId) -> Result<DecodedAudio, DecodeError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_plain_path() {
        let id = SourceId::from("/music/set/track.wav");
        assert_eq!(id.to_path().unwrap(), PathBuf::from("/music/set/track.wav"));
    }

    #[test]
    fn test_source_id_file_url() {
        let id = SourceId::new("file:///music/my%20track.mp3");
        assert_eq!(id.to_path().unwrap(), PathBuf::from("/music/my track.mp3"));

        let id = SourceId::new("file://localhost/music/a.wav");
        assert_eq!(id.to_path().unwrap(), PathBuf::from("/music/a.wav"));
    }

    #[test]
    fn test_source_id_file_url_decodes_every_escape() {
        let id = SourceId::new("file:///music/caf%C3%A9%23mix.wav");
        assert_eq!(id.to_path().unwrap(), PathBuf::from("/music/café#mix.wav"));

        let id = SourceId::new("file:///music/100%25%20live%5B1%5D.flac");
        assert_eq!(id.to_path().unwrap(), PathBuf::from("/music/100% live[1].flac"));
    }

    #[test]
    fn test_source_id_rejects_other_schemes() {
        assert!(SourceId::new("http://example.com/a.mp3").to_path().is_err());
        assert!(SourceId::new("file://relative/a.wav").to_path().is_err());
        assert!(SourceId::new("  ").to_path().is_err());
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension(Path::new("a.wav")));
        assert!(is_supported_extension(Path::new("b.MP3")));
        assert!(is_supported_extension(Path::new("c.flac")));
        assert!(is_supported_extension(Path::new("e.aiff")));
        assert!(!is_supported_extension(Path::new("d.txt")));
        assert!(!is_supported_extension(Path::new("noext")));
    }

    #[test]
    fn test_fold_mono_to_stereo() {
        let audio = DecodedAudio::from_interleaved(&[0.1, 0.2, 0.3], 1, 44100).unwrap();
        assert_eq!(audio.frame_count(), 3);
        assert_eq!(audio.frames()[1], StereoSample::mono(0.2));
        assert_eq!(audio.channels(), 1);
    }

    #[test]
    fn test_fold_surround_keeps_first_pair() {
        let samples = [0.1, 0.2, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9];
        let audio = DecodedAudio::from_interleaved(&samples, 4, 48000).unwrap();
        assert_eq!(audio.frame_count(), 2);
        assert_eq!(audio.frames()[0], StereoSample::new(0.1, 0.2));
        assert_eq!(audio.frames()[1], StereoSample::new(0.3, 0.4));
    }

    #[test]
    fn test_empty_and_rateless_sources_rejected() {
        assert!(matches!(
            DecodedAudio::from_interleaved(&[], 2, 48000),
            Err(DecodeError::Empty)
        ));
        assert!(matches!(
            DecodedAudio::new(StereoBuffer::silence(4), 0, 2),
            Err(DecodeError::UnknownSampleRate)
        ));
    }

    #[test]
    fn test_duration() {
        let audio = testing::constant(0.5, 2.0, 44100);
        assert_eq!(audio.frame_count(), 88200);
        assert!((audio.duration_seconds() - 2.0).abs() < 1e-12);
    }
}
