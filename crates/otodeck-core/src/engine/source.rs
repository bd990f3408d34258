//! Pull contract shared by every pipeline stage

use crate::types::{StereoBuffer, StreamFormat};

/// A stage that fills blocks of stereo frames on demand
///
/// Decks and mix buses both implement this, so a bus can take another bus
/// as an input. The driver calls [`configure`](AudioSource::configure) once,
/// then [`render`](AudioSource::render) at the playback cadence, then
/// [`release`](AudioSource::release) at shutdown.
pub trait AudioSource: Send {
    /// Set the maximum block size and output sample rate
    ///
    /// May allocate. Not to be called while a render is in flight.
    fn configure(&mut self, block_size: usize, sample_rate: u32);

    /// Fill all of `output` (its current length is the block size)
    ///
    /// Never blocks, never allocates. Panics if the stage was not configured
    /// or the block is longer than the configured maximum.
    fn render(&mut self, output: &mut StereoBuffer);

    /// Drop the configuration; `render` needs a new `configure` afterwards
    fn release(&mut self);

    /// Format this stage renders at, `None` until configured
    fn output_format(&self) -> Option<StreamFormat>;

    fn is_configured(&self) -> bool {
        self.output_format().is_some()
    }
}
