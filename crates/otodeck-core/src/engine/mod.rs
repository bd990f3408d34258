//! Audio engine - decks, resampling, mix bus
//!
//! - [`AudioSource`]: the pull contract every stage implements
//! - [`Deck`] / [`DeckController`]: render and control halves of a deck
//! - [`MixBus`]: deterministic summation of any number of sources
//! - [`DualDeckMixer`]: two decks on one bus, built from a config

mod deck;
mod engine;
pub mod gc;
mod mixer;
mod resampler;
mod source;
mod transport;

pub use deck::{Deck, DeckController, PositionSync};
pub use engine::DualDeckMixer;
pub use mixer::MixBus;
pub use resampler::{read_interpolated, source_step, InterpolationMethod, Resampler};
pub use source::AudioSource;
pub use transport::{PositionObserver, Transport, MAX_SPEED};
