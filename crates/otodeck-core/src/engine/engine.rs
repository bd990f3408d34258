//! Two decks on one bus, wired from a [`MixerConfig`]

use std::sync::Arc;

use super::{AudioSource, Deck, DeckController, MixBus};
use crate::config::MixerConfig;
use crate::decoder::SourceOpener;
use crate::error::{DeckResult, MixResult};
use crate::types::{DeckId, StereoBuffer, StreamFormat, NUM_DECKS};

/// The player's mixing pipeline
///
/// Owns the bus (and through it the render halves of both decks). Hand
/// [`controllers`](DualDeckMixer::controllers) to whatever drives the decks
/// and call [`render`](DualDeckMixer::render) from the audio callback.
pub struct DualDeckMixer {
    bus: MixBus,
    controllers: [DeckController; NUM_DECKS],
    block_size: usize,
}

impl DualDeckMixer {
    /// Build deck A and deck B, register them in that order, configure the bus
    /// and apply the per-deck presets
    pub fn new(opener: Arc<dyn SourceOpener>, config: &MixerConfig) -> MixResult<Self> {
        let config = config.clone().sanitized();
        let decks: [Deck; NUM_DECKS] = std::array::from_fn(|index| {
            let mut deck = Deck::new(DeckId::new(index), Arc::clone(&opener));
            deck.set_interpolation(config.interpolation);
            deck
        });
        let controllers = std::array::from_fn(|index| decks[index].controller());

        let mut bus = MixBus::new();
        for deck in decks {
            bus.add_input(Box::new(deck))?;
        }
        bus.configure(config.block_size, config.sample_rate);

        let mixer = Self {
            bus,
            controllers,
            block_size: config.block_size,
        };
        mixer.apply_presets(&config);

        log::info!(
            "Dual-deck mixer ready: {} frames @ {} Hz, {} interpolation",
            config.block_size,
            config.sample_rate,
            config.interpolation.display_name()
        );
        Ok(mixer)
    }

    fn apply_presets(&self, config: &MixerConfig) {
        for (controller, preset) in self.controllers.iter().zip(config.decks.iter()) {
            let applied: DeckResult<()> = controller
                .set_gain(preset.gain)
                .and_then(|_| controller.set_speed(preset.speed));
            if applied.is_err() {
                log::warn!("{}: preset not applied", controller.id());
            }
        }
    }

    pub fn controller(&self, deck: DeckId) -> &DeckController {
        &self.controllers[deck.0]
    }

    pub fn controllers(&self) -> &[DeckController; NUM_DECKS] {
        &self.controllers
    }

    /// Configured block size (the largest block `render` accepts)
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn output_format(&self) -> Option<StreamFormat> {
        self.bus.output_format()
    }

    /// Pull one block of the mix
    pub fn render(&mut self, output: &mut StereoBuffer) {
        self.bus.render(output);
    }

    /// Re-run configuration, e.g. after the output device changed
    pub fn reconfigure(&mut self, block_size: usize, sample_rate: u32) {
        self.bus.configure(block_size, sample_rate);
        self.block_size = block_size;
    }

    pub fn release(&mut self) {
        self.bus.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeckPreset;
    use crate::decoder::testing::ConstantOpener;
    use crate::decoder::SourceId;
    use crate::engine::InterpolationMethod;
    use crate::types::TransportState;
    use std::thread;
    use std::time::{Duration, Instant};

    const RATE: u32 = 48000;

    fn mixer(config: &MixerConfig) -> DualDeckMixer {
        let opener: Arc<dyn SourceOpener> = Arc::new(ConstantOpener::new(config.sample_rate));
        DualDeckMixer::new(opener, config).unwrap()
    }

    fn config() -> MixerConfig {
        MixerConfig {
            block_size: 256,
            sample_rate: RATE,
            interpolation: InterpolationMethod::Cubic,
            ..MixerConfig::default()
        }
    }

    #[test]
    fn test_decks_registered_a_then_b() {
        let mixer = mixer(&config());
        assert_eq!(mixer.controller(DeckId::A).id(), DeckId::A);
        assert_eq!(mixer.controller(DeckId::B).id(), DeckId::B);
        assert_eq!(mixer.output_format(), Some(StreamFormat::stereo(RATE)));
    }

    #[test]
    fn test_presets_applied() {
        let mut cfg = config();
        cfg.decks[1] = DeckPreset { gain: 0.5, speed: 1.25 };
        let mixer = mixer(&cfg);
        assert_eq!(mixer.controller(DeckId::A).gain(), 1.0);
        assert_eq!(mixer.controller(DeckId::B).gain(), 0.5);
        assert_eq!(mixer.controller(DeckId::B).speed(), 1.25);
    }

    #[test]
    fn test_empty_and_playing_deck_mix_to_signal() {
        let mut mixer = mixer(&config());
        let b = mixer.controller(DeckId::B).clone();
        b.load("const:0.3:1").unwrap();
        b.start();

        let mut block = StereoBuffer::silence(mixer.block_size());
        mixer.render(&mut block);
        assert!(block.iter().all(|s| (s.left - 0.3).abs() < 1e-6));
        assert_eq!(mixer.controller(DeckId::A).state(), TransportState::Empty);
    }

    /// Source values present in a block, ignoring silence
    fn sources_in(block: &StereoBuffer, a: f32, b: f32) -> Vec<char> {
        let mut found = Vec::new();
        for s in block.iter().flat_map(|s| [s.left, s.right]) {
            let kind = if s.abs() < 1e-4 {
                continue;
            } else if (s - a).abs() < 1e-4 {
                'a'
            } else if (s - b).abs() < 1e-4 {
                'b'
            } else {
                '?'
            };
            if !found.contains(&kind) {
                found.push(kind);
            }
        }
        found
    }

    #[test]
    fn test_concurrent_loads_never_mix_sources_in_one_block() {
        let mut mixer = mixer(&config());
        let deck = mixer.controller(DeckId::A).clone();
        let block_size = mixer.block_size();

        let control = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_millis(400);
            let mut loads = 0usize;
            while Instant::now() < deadline {
                let id = if loads % 2 == 0 { "const:0.25:10" } else { "const:0.75:10" };
                deck.load(SourceId::new(id)).unwrap();
                deck.start();
                loads += 1;
            }
            loads
        });

        let mut block = StereoBuffer::silence(block_size);
        let mut pulls = 0usize;
        while !control.is_finished() {
            mixer.render(&mut block);
            let found = sources_in(&block, 0.25, 0.75);
            assert!(
                found.len() <= 1 && !found.contains(&'?'),
                "block {} mixes sources: {:?}",
                pulls,
                found
            );
            pulls += 1;
        }
        let loads = control.join().unwrap();
        assert!(loads > 1);
        assert!(pulls > 0);
    }

    #[test]
    fn test_concurrent_seeks_and_params_keep_render_running() {
        let mut mixer = mixer(&config());
        let a = mixer.controller(DeckId::A).clone();
        a.load("const:0.5:2").unwrap();
        a.start();

        let control = thread::spawn(move || {
            for i in 0..2000 {
                let f = (i % 100) as f64 / 100.0;
                a.seek_fraction(f).unwrap();
                a.set_gain(1.0 - f).unwrap();
                a.set_speed(0.5 + f).unwrap();
                assert!((0.0..=1.0).contains(&a.position_fraction()));
            }
        });

        let mut block = StereoBuffer::silence(mixer.block_size());
        while !control.is_finished() {
            mixer.render(&mut block);
            assert!(block.iter().all(|s| s.left.is_finite() && s.left.abs() <= 0.5 + 1e-4));
        }
        control.join().unwrap();
    }

    #[test]
    fn test_reconfigure_after_release() {
        let mut mixer = mixer(&config());
        mixer.release();
        assert_eq!(mixer.output_format(), None);
        mixer.reconfigure(128, 44100);
        assert_eq!(mixer.output_format(), Some(StreamFormat::stereo(44100)));
        let mut block = StereoBuffer::silence(128);
        mixer.render(&mut block);
        assert_eq!(block.peak(), 0.0);
    }
}
