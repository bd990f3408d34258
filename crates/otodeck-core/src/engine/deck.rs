//! Deck - one independently controllable playback channel
//!
//! A deck is split in two halves around a shared [`Transport`]:
//!
//! - [`Deck`] is the render node. It is owned by whatever pulls audio (a
//!   [`MixBus`](super::MixBus) or a driver) and implements [`AudioSource`].
//! - [`DeckController`] is the control surface. It is cheap to clone, can be
//!   used from any thread, and never touches render-side buffers.
//!
//! Control calls validate first and mutate second, so a rejected call leaves
//! the render path exactly as it was.

use std::sync::Arc;

use super::resampler::{source_step, InterpolationMethod, Resampler};
use super::source::AudioSource;
use super::transport::Transport;
use crate::decoder::{SourceId, SourceOpener};
use crate::error::{DeckError, DeckResult};
use crate::types::{DeckId, StereoBuffer, StreamFormat, TransportState, MAX_BLOCK_SIZE};

/// Read/write position contract for a polling observer (waveform display)
///
/// Safe to call from any thread, including while a render is in flight.
pub trait PositionSync: Send + Sync {
    /// Position over duration in `[0, 1]`, 0 when nothing is loaded
    fn position_fraction(&self) -> f64;

    /// Seek to `fraction × duration`; rejects values outside `[0, 1]`
    fn set_position_fraction(&self, fraction: f64) -> DeckResult<()>;
}

/// Render half of a deck
pub struct Deck {
    id: DeckId,
    transport: Arc<Transport>,
    opener: Arc<dyn SourceOpener>,
    resampler: Resampler,
    format: Option<StreamFormat>,
    block_size: usize,
}

impl Deck {
    /// Create an empty deck that opens sources through `opener`
    pub fn new(id: DeckId, opener: Arc<dyn SourceOpener>) -> Self {
        Self {
            id,
            transport: Arc::new(Transport::new()),
            opener,
            resampler: Resampler::default(),
            format: None,
            block_size: 0,
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    /// Control handle sharing this deck's transport
    pub fn controller(&self) -> DeckController {
        DeckController {
            id: self.id,
            transport: Arc::clone(&self.transport),
            opener: Arc::clone(&self.opener),
        }
    }

    pub fn interpolation(&self) -> InterpolationMethod {
        self.resampler.method()
    }

    pub fn set_interpolation(&mut self, method: InterpolationMethod) {
        self.resampler.set_method(method);
    }
}

impl AudioSource for Deck {
    fn configure(&mut self, block_size: usize, sample_rate: u32) {
        assert!(
            block_size > 0 && block_size <= MAX_BLOCK_SIZE,
            "block size must be in 1..={}, got {}",
            MAX_BLOCK_SIZE,
            block_size
        );
        assert!(sample_rate > 0, "sample rate must be positive");
        self.block_size = block_size;
        self.format = Some(StreamFormat::stereo(sample_rate));
        log::debug!(
            "{}: configured for {} frames @ {} Hz ({:?} interpolation)",
            self.id,
            block_size,
            sample_rate,
            self.resampler.method()
        );
    }

    fn render(&mut self, output: &mut StereoBuffer) {
        let Some(format) = self.format else {
            panic!("{}: render called before configure", self.id);
        };
        assert!(
            output.len() <= self.block_size,
            "{}: block of {} frames exceeds configured {}",
            self.id,
            output.len(),
            self.block_size
        );

        // One snapshot per pull: a concurrent load cannot change the source
        // under us mid-block
        let slot = self.transport.snapshot();
        let Some(audio) = slot.audio() else {
            output.fill_silence();
            return;
        };
        if !slot.is_playing() {
            output.fill_silence();
            return;
        }

        let start = slot.position_frames();
        let step = source_step(self.transport.speed(), audio.sample_rate(), format.sample_rate);
        let end = self
            .resampler
            .render(audio.frames(), start, step, output.as_mut_slice());

        let gain = self.transport.gain() as f32;
        if gain != 1.0 {
            output.scale(gain);
        }

        slot.commit_advance(start, end, audio.frame_count());
    }

    fn release(&mut self) {
        if self.format.take().is_some() {
            log::debug!("{}: released", self.id);
        }
        self.block_size = 0;
    }

    fn output_format(&self) -> Option<StreamFormat> {
        self.format
    }
}

/// Control half of a deck
///
/// Every call is safe from a non-render thread at any time. `load` decodes on
/// the calling thread, so keep it off the render thread (see
/// [`DeckLoader`](crate::loader::DeckLoader)).
#[derive(Clone)]
pub struct DeckController {
    id: DeckId,
    transport: Arc<Transport>,
    opener: Arc<dyn SourceOpener>,
}

impl DeckController {
    pub fn id(&self) -> DeckId {
        self.id
    }

    /// Open and decode `source`, then swap it in stopped at position 0
    ///
    /// On failure the deck keeps its previous source, position and play state.
    pub fn load(&self, source: impl Into<SourceId>) -> DeckResult<()> {
        let source = source.into();
        match self.opener.open(&source) {
            Ok(audio) => {
                log::info!(
                    "{}: loaded {} ({:.2}s, {} Hz, {} ch)",
                    self.id,
                    source,
                    audio.duration_seconds(),
                    audio.sample_rate(),
                    audio.channels()
                );
                self.transport.install(audio, source);
                Ok(())
            }
            Err(reason) => {
                log::warn!("{}: failed to load {}: {}", self.id, source, reason);
                Err(DeckError::LoadFailure {
                    source_id: source.to_string(),
                    reason,
                })
            }
        }
    }

    /// Unload the source; the deck goes silent and `Empty`
    pub fn eject(&self) {
        if self.transport.state().is_loaded() {
            log::info!("{}: ejected", self.id);
        }
        self.transport.eject();
    }

    /// Begin advancing; no-op when empty or already playing
    pub fn start(&self) {
        self.transport.start();
    }

    /// Halt at the current position; no-op when already stopped
    pub fn stop(&self) {
        self.transport.stop();
    }

    /// Output gain in `[0, 1]`
    pub fn set_gain(&self, gain: f64) -> DeckResult<()> {
        self.report(self.transport.set_gain(gain))
    }

    /// Playback ratio in `(0, 100]`; 1.0 is the source's own tempo
    pub fn set_speed(&self, speed: f64) -> DeckResult<()> {
        self.report(self.transport.set_speed(speed))
    }

    /// Seek to an absolute time in `[0, duration]`
    pub fn seek(&self, seconds: f64) -> DeckResult<()> {
        self.report(self.transport.seek_seconds(seconds))
    }

    /// Seek to `fraction × duration`, fraction in `[0, 1]`
    pub fn seek_fraction(&self, fraction: f64) -> DeckResult<()> {
        self.report(self.transport.seek_fraction(fraction))
    }

    pub fn gain(&self) -> f64 {
        self.transport.gain()
    }

    pub fn speed(&self) -> f64 {
        self.transport.speed()
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    pub fn source_id(&self) -> Option<SourceId> {
        self.transport.source_id()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.transport.duration_seconds()
    }

    pub fn position_seconds(&self) -> f64 {
        self.transport.position_seconds()
    }

    pub fn position_fraction(&self) -> f64 {
        self.transport.position_fraction()
    }

    /// Register a callback for user-initiated seeks
    ///
    /// Called synchronously on the seeking thread with the new position
    /// fraction. Playback advance does not trigger it. Replaces any previous
    /// observer.
    pub fn set_position_observer<F>(&self, observer: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.transport.set_observer(Some(Arc::new(observer)));
    }

    pub fn clear_position_observer(&self) {
        self.transport.set_observer(None);
    }

    fn report(&self, result: DeckResult<()>) -> DeckResult<()> {
        if let Err(e) = &result {
            log::warn!("{}: {}", self.id, e);
        }
        result
    }
}

impl PositionSync for DeckController {
    fn position_fraction(&self) -> f64 {
        self.transport.position_fraction()
    }

    fn set_position_fraction(&self, fraction: f64) -> DeckResult<()> {
        self.seek_fraction(fraction)
    }
}

impl std::fmt::Debug for DeckController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeckController")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
