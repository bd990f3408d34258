//! Deck transport state shared by the control and render sides
//!
//! Gain and speed are plain atomics that persist across loads. Everything
//! that a load resets (the decoded source, the position, the playing flag)
//! lives together in one [`DeckSlot`]. A load builds a fresh slot and swaps it
//! in through a `basedrop::SharedCell`, so a render pull that takes one
//! snapshot of the cell sees either the old slot or the new one, never a new
//! source with an old position.
//!
//! All state reads from the control side are lock-free, following the same
//! rule as the deck atomics polled by a UI.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use basedrop::{Shared, SharedCell};

use super::gc::gc_handle;
use crate::decoder::{DecodedAudio, SourceId};
use crate::error::{DeckError, DeckResult, Parameter};
use crate::types::TransportState;

/// Highest accepted speed ratio
pub const MAX_SPEED: f64 = 100.0;

/// Callback receiving the new position fraction after a user seek
pub type PositionObserver = Arc<dyn Fn(f64) + Send + Sync>;

/// `f64` stored as raw bits in an `AtomicU64`
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    #[inline]
    pub(crate) fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }
}

const PLAYING_BIT: u64 = 1 << 63;

/// Read head (source frames, fractional) and playing flag in one word
///
/// Positions are never negative, so the sign bit of the `f64` carries the
/// flag. Seeks, start/stop and the render advance each change the word in a
/// single atomic step and never overwrite each other's half.
pub(crate) struct PlayHead(AtomicU64);

impl PlayHead {
    fn new() -> Self {
        Self(AtomicU64::new(Self::pack(0.0, false)))
    }

    #[inline]
    fn pack(position: f64, playing: bool) -> u64 {
        let bits = position.to_bits() & !PLAYING_BIT;
        if playing {
            bits | PLAYING_BIT
        } else {
            bits
        }
    }

    #[inline]
    fn unpack(word: u64) -> (f64, bool) {
        (f64::from_bits(word & !PLAYING_BIT), word & PLAYING_BIT != 0)
    }

    #[inline]
    fn position(&self) -> f64 {
        Self::unpack(self.0.load(Ordering::Acquire)).0
    }

    #[inline]
    fn playing(&self) -> bool {
        self.0.load(Ordering::Acquire) & PLAYING_BIT != 0
    }

    fn set_playing(&self, playing: bool) {
        if playing {
            self.0.fetch_or(PLAYING_BIT, Ordering::AcqRel);
        } else {
            self.0.fetch_and(!PLAYING_BIT, Ordering::AcqRel);
        }
    }

    /// Move the head, keeping the playing flag
    fn seek(&self, position: f64) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some(Self::pack(position, word & PLAYING_BIT != 0))
            });
    }

    /// Move from `from` to `to` unless a seek moved the head first
    ///
    /// A start or stop that lands meanwhile is kept. Reaching `end` parks the
    /// head there and clears the flag.
    fn advance(&self, from: f64, to: f64, end: f64) {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let (position, playing) = Self::unpack(current);
            if position.to_bits() != from.to_bits() {
                return;
            }
            let next = if to >= end {
                Self::pack(end, false)
            } else {
                Self::pack(to, playing)
            };
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Everything a load replaces, swapped as one unit
pub(crate) struct DeckSlot {
    audio: Option<DecodedAudio>,
    source_id: Option<SourceId>,
    head: PlayHead,
}

impl DeckSlot {
    fn empty() -> Self {
        Self {
            audio: None,
            source_id: None,
            head: PlayHead::new(),
        }
    }

    fn loaded(audio: DecodedAudio, source_id: SourceId) -> Self {
        Self {
            audio: Some(audio),
            source_id: Some(source_id),
            head: PlayHead::new(),
        }
    }

    #[inline]
    pub(crate) fn audio(&self) -> Option<&DecodedAudio> {
        self.audio.as_ref()
    }

    #[inline]
    pub(crate) fn position_frames(&self) -> f64 {
        self.head.position()
    }

    #[inline]
    pub(crate) fn is_playing(&self) -> bool {
        self.audio.is_some() && self.head.playing()
    }

    /// Commit a render advance unless a seek landed in the meantime
    ///
    /// Reaching the end parks the head on the last frame boundary and stops.
    #[inline]
    pub(crate) fn commit_advance(&self, from: f64, to: f64, frame_count: usize) {
        self.head.advance(from, to, frame_count as f64);
    }

    fn state(&self) -> TransportState {
        match self.audio {
            None => TransportState::Empty,
            Some(_) if self.head.playing() => TransportState::Playing,
            Some(_) => TransportState::Stopped,
        }
    }
}

/// Shared state of one deck
pub struct Transport {
    slot: SharedCell<DeckSlot>,
    gain: AtomicF64,
    speed: AtomicF64,
    observer: RwLock<Option<PositionObserver>>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            slot: SharedCell::new(Shared::new(&gc_handle(), DeckSlot::empty())),
            gain: AtomicF64::new(1.0),
            speed: AtomicF64::new(1.0),
            observer: RwLock::new(None),
        }
    }

    /// Current slot; hold it for at most one render pull
    #[inline]
    pub(crate) fn snapshot(&self) -> Shared<DeckSlot> {
        self.slot.get()
    }

    /// Replace the source, resetting position to 0 and stopping
    pub(crate) fn install(&self, audio: DecodedAudio, source_id: SourceId) {
        self.slot
            .set(Shared::new(&gc_handle(), DeckSlot::loaded(audio, source_id)));
    }

    /// Drop the source and return to `Empty`
    pub(crate) fn eject(&self) {
        self.slot.set(Shared::new(&gc_handle(), DeckSlot::empty()));
    }

    pub fn state(&self) -> TransportState {
        self.snapshot().state()
    }

    pub fn source_id(&self) -> Option<SourceId> {
        self.snapshot().source_id.clone()
    }

    /// No-op on an empty deck
    pub(crate) fn start(&self) {
        let slot = self.snapshot();
        if slot.audio.is_some() {
            slot.head.set_playing(true);
        }
    }

    pub(crate) fn stop(&self) {
        self.snapshot().head.set_playing(false);
    }

    #[inline]
    pub fn gain(&self) -> f64 {
        self.gain.load(Ordering::Relaxed)
    }

    pub(crate) fn set_gain(&self, gain: f64) -> DeckResult<()> {
        if !(0.0..=1.0).contains(&gain) {
            return Err(DeckError::invalid(Parameter::Gain, gain, "0.0..=1.0"));
        }
        self.gain.store(gain, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed.load(Ordering::Relaxed)
    }

    pub(crate) fn set_speed(&self, speed: f64) -> DeckResult<()> {
        if !(speed > 0.0 && speed <= MAX_SPEED) {
            return Err(DeckError::invalid(Parameter::Speed, speed, "0.0 < speed <= 100.0"));
        }
        self.speed.store(speed, Ordering::Relaxed);
        Ok(())
    }

    /// Total length of the loaded source, 0 when empty
    pub fn duration_seconds(&self) -> f64 {
        self.snapshot()
            .audio
            .as_ref()
            .map_or(0.0, DecodedAudio::duration_seconds)
    }

    pub fn position_seconds(&self) -> f64 {
        let slot = self.snapshot();
        match slot.audio.as_ref() {
            Some(audio) => slot.head.position() / audio.sample_rate() as f64,
            None => 0.0,
        }
    }

    /// Position over duration, clamped to `[0, 1]`; 0 when nothing is loaded
    pub fn position_fraction(&self) -> f64 {
        let slot = self.snapshot();
        match slot.audio.as_ref() {
            Some(audio) if audio.frame_count() > 0 => {
                let fraction = slot.head.position() / audio.frame_count() as f64;
                fraction.clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Move the read head to `seconds`
    ///
    /// Must lie in `[0, duration]`. On an empty deck any finite non-negative
    /// value is accepted and ignored.
    pub(crate) fn seek_seconds(&self, seconds: f64) -> DeckResult<()> {
        if !(seconds.is_finite() && seconds >= 0.0) {
            return Err(DeckError::invalid(
                Parameter::PositionSeconds,
                seconds,
                "0.0..=duration",
            ));
        }
        let slot = self.snapshot();
        let Some(audio) = slot.audio.as_ref() else {
            return Ok(());
        };
        if seconds > audio.duration_seconds() {
            return Err(DeckError::invalid(
                Parameter::PositionSeconds,
                seconds,
                "0.0..=duration",
            ));
        }
        let frames = (seconds * audio.sample_rate() as f64).min(audio.frame_count() as f64);
        slot.head.seek(frames);
        drop(slot);
        self.notify_seek();
        Ok(())
    }

    /// Move the read head to `fraction × duration`
    pub(crate) fn seek_fraction(&self, fraction: f64) -> DeckResult<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(DeckError::invalid(
                Parameter::PositionFraction,
                fraction,
                "0.0..=1.0",
            ));
        }
        let slot = self.snapshot();
        let Some(audio) = slot.audio.as_ref() else {
            return Ok(());
        };
        slot.head.seek(fraction * audio.frame_count() as f64);
        drop(slot);
        self.notify_seek();
        Ok(())
    }

    pub(crate) fn set_observer(&self, observer: Option<PositionObserver>) {
        match self.observer.write() {
            Ok(mut guard) => *guard = observer,
            Err(poisoned) => *poisoned.into_inner() = observer,
        }
    }

    /// Call the observer outside the lock so it may re-enter the transport
    fn notify_seek(&self) {
        let observer = match self.observer.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(observer) = observer {
            observer(self.position_fraction());
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testing::constant;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn loaded(seconds: f64) -> Transport {
        let transport = Transport::new();
        transport.install(constant(0.5, seconds, 1000), SourceId::new("const:0.5"));
        transport
    }

    #[test]
    fn test_play_head_packs_flag_and_position() {
        let head = PlayHead::new();
        head.seek(1234.5);
        head.set_playing(true);
        assert_eq!(head.position(), 1234.5);
        assert!(head.playing());
        head.seek(-0.0);
        assert_eq!(head.position().to_bits(), 0.0f64.to_bits());
        assert!(head.playing());
        head.set_playing(false);
        assert!(!head.playing());
        assert_eq!(head.position(), 0.0);
    }

    #[test]
    fn test_new_transport_is_empty() {
        let transport = Transport::new();
        assert_eq!(transport.state(), TransportState::Empty);
        assert_eq!(transport.position_fraction(), 0.0);
        assert_eq!(transport.duration_seconds(), 0.0);
        assert_eq!(transport.gain(), 1.0);
        assert_eq!(transport.speed(), 1.0);
    }

    #[test]
    fn test_empty_transport_accepts_noops() {
        let transport = Transport::new();
        transport.start();
        assert_eq!(transport.state(), TransportState::Empty);
        transport.stop();
        assert!(transport.seek_seconds(3.0).is_ok());
        assert!(transport.seek_fraction(0.5).is_ok());
        assert_eq!(transport.position_fraction(), 0.0);
        assert!(transport.seek_fraction(1.5).is_err());
        assert!(transport.seek_seconds(-1.0).is_err());
    }

    #[test]
    fn test_gain_and_speed_ranges() {
        let transport = Transport::new();
        for gain in [0.0, 0.25, 1.0] {
            assert!(transport.set_gain(gain).is_ok());
            assert_eq!(transport.gain(), gain);
        }
        for gain in [-0.01, 1.01, f64::NAN, f64::INFINITY] {
            assert!(transport.set_gain(gain).is_err());
        }
        assert_eq!(transport.gain(), 1.0);

        for speed in [0.001, 1.0, 100.0] {
            assert!(transport.set_speed(speed).is_ok());
            assert_eq!(transport.speed(), speed);
        }
        for speed in [0.0, -1.0, 100.5, f64::NAN] {
            assert!(transport.set_speed(speed).is_err());
        }
        assert_eq!(transport.speed(), 100.0);
    }

    #[test]
    fn test_seek_seconds_range() {
        let transport = loaded(10.0);
        assert!(transport.seek_seconds(2.5).is_ok());
        assert!((transport.position_seconds() - 2.5).abs() < 1e-9);
        assert!((transport.position_fraction() - 0.25).abs() < 1e-9);

        assert!(transport.seek_seconds(10.5).is_err());
        assert!(transport.seek_seconds(f64::NAN).is_err());
        assert!((transport.position_seconds() - 2.5).abs() < 1e-9);

        assert!(transport.seek_seconds(10.0).is_ok());
        assert_eq!(transport.position_fraction(), 1.0);
    }

    #[test]
    fn test_seek_fraction_sets_exact_position() {
        let transport = loaded(4.0);
        assert!(transport.seek_fraction(0.7).is_ok());
        assert!((transport.position_seconds() - 2.8).abs() < 1e-9);
        assert!((transport.position_fraction() - 0.7).abs() < 1e-9);

        assert!(transport.seek_fraction(-0.1).is_err());
        assert!(transport.seek_fraction(1.1).is_err());
        assert!((transport.position_fraction() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_install_resets_position_and_stops() {
        let transport = loaded(4.0);
        transport.seek_fraction(0.7).unwrap();
        transport.start();
        assert_eq!(transport.state(), TransportState::Playing);

        transport.install(constant(0.25, 2.0, 1000), SourceId::new("const:0.25"));
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.position_fraction(), 0.0);
        assert!((transport.duration_seconds() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_install_keeps_gain_and_speed() {
        let transport = Transport::new();
        transport.set_gain(0.5).unwrap();
        transport.set_speed(2.0).unwrap();
        transport.install(constant(0.25, 1.0, 1000), SourceId::new("a"));
        assert_eq!(transport.gain(), 0.5);
        assert_eq!(transport.speed(), 2.0);
    }

    #[test]
    fn test_eject_returns_to_empty() {
        let transport = loaded(1.0);
        transport.start();
        transport.eject();
        assert_eq!(transport.state(), TransportState::Empty);
        assert_eq!(transport.source_id(), None);
    }

    #[test]
    fn test_commit_advance_loses_to_concurrent_seek() {
        let transport = loaded(10.0);
        let slot = transport.snapshot();
        let from = slot.position_frames();

        transport.seek_fraction(0.5).unwrap();
        slot.commit_advance(from, from + 512.0, 10_000);

        assert!((transport.position_fraction() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_commit_advance_stops_at_end() {
        let transport = loaded(1.0);
        transport.start();
        let slot = transport.snapshot();
        slot.commit_advance(0.0, 1200.0, 1000);
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.position_fraction(), 1.0);
    }

    #[test]
    fn test_restart_during_pull_survives_end_of_track() {
        let transport = loaded(1.0);
        transport.seek_fraction(0.9).unwrap();
        transport.start();
        let slot = transport.snapshot();
        let from = slot.position_frames();

        transport.seek_fraction(0.0).unwrap();
        transport.stop();
        transport.start();
        slot.commit_advance(from, from + 200.0, 1000);

        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(transport.position_fraction(), 0.0);
    }

    #[test]
    fn test_stop_during_pull_is_kept() {
        let transport = loaded(1.0);
        transport.start();
        let slot = transport.snapshot();
        let from = slot.position_frames();

        transport.stop();
        slot.commit_advance(from, from + 100.0, 1000);

        assert_eq!(transport.state(), TransportState::Stopped);
        assert!((transport.position_fraction() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_observer_may_reenter_transport() {
        let transport = Arc::new(loaded(10.0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let inner = Arc::clone(&transport);
            let seen = Arc::clone(&seen);
            transport.set_observer(Some(Arc::new(move |fraction: f64| {
                seen.lock().unwrap().push(fraction);
                inner.set_observer(None);
                inner.seek_fraction(0.75).unwrap();
            })));
        }

        let worker = {
            let transport = Arc::clone(&transport);
            std::thread::spawn(move || transport.seek_fraction(0.5))
        };
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(3);
        while !worker.is_finished() {
            assert!(std::time::Instant::now() < deadline, "seek blocked on the observer");
            std::thread::yield_now();
        }
        assert!(worker.join().unwrap().is_ok());

        assert_eq!(*seen.lock().unwrap(), vec![0.5]);
        assert!((transport.position_fraction() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_observer_sees_user_seeks_only() {
        let transport = loaded(10.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(None));
        {
            let calls = calls.clone();
            let last = last.clone();
            transport.set_observer(Some(Arc::new(move |fraction: f64| {
                calls.fetch_add(1, Ordering::SeqCst);
                *last.lock().unwrap() = Some(fraction);
            })));
        }

        transport.seek_fraction(0.3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!((last.lock().unwrap().unwrap() - 0.3).abs() < 1e-9);

        assert!(transport.seek_fraction(2.0).is_err());
        let slot = transport.snapshot();
        let from = slot.position_frames();
        slot.commit_advance(from, from + 10.0, 10_000);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        transport.set_observer(None);
        transport.seek_seconds(1.0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
