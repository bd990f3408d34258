//! MixBus - sums any number of sources into one block
//!
//! Inputs are rendered in parallel (one pre-allocated buffer each) and then
//! summed sequentially in registration order, so floating-point rounding is
//! identical from run to run regardless of thread scheduling. The sum is not
//! normalized; headroom is left to per-deck gain.

use rayon::prelude::*;

use super::source::AudioSource;
use crate::error::{MixError, MixResult};
use crate::types::{StereoBuffer, StreamFormat, MAX_BLOCK_SIZE};

struct MixInput {
    source: Box<dyn AudioSource>,
    /// Render target for this input, sized at configure time
    buffer: StereoBuffer,
}

/// Summation stage over a fixed set of inputs
///
/// Owns the render halves of its inputs. Transport state and decoded sources
/// stay shared with the controllers, so the bus never decides a deck's
/// lifetime from the control side.
#[derive(Default)]
pub struct MixBus {
    inputs: Vec<MixInput>,
    format: Option<StreamFormat>,
    block_size: usize,
    started: bool,
}

impl MixBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an input; returns its index (registration order)
    ///
    /// Rejected once the first block has been rendered, or when both the bus
    /// and the input already have a format and they differ. An input added to
    /// a configured bus is configured to match.
    pub fn add_input(&mut self, mut source: Box<dyn AudioSource>) -> MixResult<usize> {
        if self.started {
            log::warn!("MixBus: input rejected, rendering already started");
            return Err(MixError::PipelineStarted);
        }
        if let (Some(expected), Some(found)) = (self.format, source.output_format()) {
            if expected != found {
                log::warn!("MixBus: input rejected, bus is {} but input is {}", expected, found);
                return Err(MixError::ConfigurationMismatch { expected, found });
            }
        }

        if let Some(format) = self.format {
            source.configure(self.block_size, format.sample_rate);
        }

        self.inputs.push(MixInput {
            source,
            buffer: StereoBuffer::with_capacity(self.block_size),
        });
        let index = self.inputs.len() - 1;
        log::debug!("MixBus: registered input {}", index);
        Ok(index)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Whether a block has been rendered since the last configure
    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl AudioSource for MixBus {
    fn configure(&mut self, block_size: usize, sample_rate: u32) {
        assert!(
            block_size > 0 && block_size <= MAX_BLOCK_SIZE,
            "block size must be in 1..={}, got {}",
            MAX_BLOCK_SIZE,
            block_size
        );
        assert!(sample_rate > 0, "sample rate must be positive");

        for input in &mut self.inputs {
            input.source.configure(block_size, sample_rate);
            input.buffer = StereoBuffer::with_capacity(block_size);
        }
        self.block_size = block_size;
        self.format = Some(StreamFormat::stereo(sample_rate));
        self.started = false;

        log::info!(
            "MixBus: configured {} inputs for {} frames @ {} Hz",
            self.inputs.len(),
            block_size,
            sample_rate
        );
    }

    fn render(&mut self, output: &mut StereoBuffer) {
        assert!(self.format.is_some(), "MixBus: render called before configure");
        let buffer_len = output.len();
        assert!(
            buffer_len <= self.block_size,
            "MixBus: block of {} frames exceeds configured {}",
            buffer_len,
            self.block_size
        );
        self.started = true;

        // Parallel render into each input's own buffer
        self.inputs.par_iter_mut().for_each(|input| {
            input.buffer.set_len_from_capacity(buffer_len);
            input.source.render(&mut input.buffer);
        });

        // Deterministic sum in registration order
        output.fill_silence();
        for input in &self.inputs {
            output.add_buffer(&input.buffer);
        }
    }

    fn release(&mut self) {
        for input in &mut self.inputs {
            input.source.release();
        }
        self.format = None;
        self.block_size = 0;
        self.started = false;
        log::info!("MixBus: released {} inputs", self.inputs.len());
    }

    fn output_format(&self) -> Option<StreamFormat> {
        self.format
    }
}
