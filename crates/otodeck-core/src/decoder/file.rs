//! File decoding with Symphonia

use std::fs::File;

use ::symphonia::core::audio::SampleBuffer;
use ::symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use ::symphonia::core::errors::Error as SymphoniaError;
use ::symphonia::core::formats::FormatOptions;
use ::symphonia::core::io::MediaSourceStream;
use ::symphonia::core::meta::MetadataOptions;
use ::symphonia::core::probe::Hint;

use super::{DecodedAudio, SourceId, SourceOpener};
use crate::error::DecodeError;

/// Opens files (or `file://` URLs) and decodes them fully with Symphonia
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaOpener;

impl SymphoniaOpener {
    pub fn new() -> Self {
        Self
    }
}

impl SourceOpener for SymphoniaOpener {
    fn open(&self, id: &SourceId) -> Result<DecodedAudio, DecodeError> {
        let path = id.to_path()?;
        let file = File::open(&path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = ::symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(DecodeError::UnknownSampleRate)?;
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let mut decoder = ::symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    log::warn!("{}: error reading packet: {}", id, e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("{}: skipping corrupt packet: {}", id, e);
                    continue;
                }
                Err(e) => return Err(DecodeError::UnsupportedFormat(e.to_string())),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        log::debug!(
            "{}: decoded {} samples ({} ch @ {} Hz)",
            id,
            samples.len(),
            channels,
            sample_rate
        );

        DecodedAudio::from_interleaved(&samples, channels, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn write_wav(path: &std::path::Path, channels: u16, sample_rate: u32, frames: &[Vec<f32>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let frames: Vec<Vec<f32>> = (0..4410).map(|_| vec![0.25, -0.5]).collect();
        write_wav(&path, 2, 44100, &frames);

        let audio = SymphoniaOpener.open(&SourceId::from(path.as_path())).unwrap();
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frame_count(), 4410);
        assert!((audio.duration_seconds() - 0.1).abs() < 1e-9);
        assert_eq!(audio.frames()[100], StereoSample::new(0.25, -0.5));
    }

    #[test]
    fn test_decode_mono_wav_duplicates_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let frames: Vec<Vec<f32>> = (0..480).map(|_| vec![0.75]).collect();
        write_wav(&path, 1, 48000, &frames);

        let audio = SymphoniaOpener.open(&SourceId::from(path.as_path())).unwrap();
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.frames()[0], StereoSample::mono(0.75));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SymphoniaOpener
            .open(&SourceId::new("/definitely/not/here.wav"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }

    #[test]
    fn test_garbage_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"this is not a riff file at all").unwrap();
        let err = SymphoniaOpener.open(&SourceId::from(path.as_path())).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    }
}
