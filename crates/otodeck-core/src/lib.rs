//! OtoDecks Core - dual-deck playback and mixing
//!
//! Decks decode a source up front, play it back at a variable speed through
//! an interpolating resampler, and feed a summing [`MixBus`](engine::MixBus)
//! that an audio driver pulls blocks from. Control calls (load, start, stop,
//! seek, gain, speed) are safe from any thread while rendering is in flight.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod loader;
pub mod types;

pub use error::{DeckError, DeckResult, DecodeError, MixError, MixResult};
pub use types::*;
