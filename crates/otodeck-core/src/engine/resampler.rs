//! Variable-ratio reading of decoded frames
//!
//! A deck plays its source at `speed × source_rate / output_rate` source
//! frames per output frame. The step is rarely an integer, so frames are read
//! at fractional positions with either linear or Catmull-Rom interpolation.
//!
//! Neighbor indices are clamped to the source, not zero-padded: a constant
//! source stays constant right up to its last frame. Positions at or past the
//! end read as silence.

use serde::{Deserialize, Serialize};

use crate::types::StereoSample;

/// Interpolation method for variable-speed playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// 2-point linear
    Linear,
    /// 4-point Catmull-Rom
    #[default]
    Cubic,
}

impl InterpolationMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Linear => "Linear (Fast)",
            Self::Cubic => "Cubic (Good)",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::Linear, Self::Cubic]
    }
}

/// Source frames consumed per output frame
#[inline]
pub fn source_step(speed: f64, source_rate: u32, output_rate: u32) -> f64 {
    speed * source_rate as f64 / output_rate as f64
}

#[inline]
fn lerp_sample(s0: StereoSample, s1: StereoSample, t: f32) -> StereoSample {
    StereoSample {
        left: s0.left + (s1.left - s0.left) * t,
        right: s0.right + (s1.right - s0.right) * t,
    }
}

/// Catmull-Rom spline through s1..s2 (tension 0.5)
#[inline]
fn cubic_interpolate(
    s0: StereoSample,
    s1: StereoSample,
    s2: StereoSample,
    s3: StereoSample,
    t: f32,
) -> StereoSample {
    let t2 = t * t;
    let t3 = t2 * t;

    let c0 = -0.5 * t3 + t2 - 0.5 * t;
    let c1 = 1.5 * t3 - 2.5 * t2 + 1.0;
    let c2 = -1.5 * t3 + 2.0 * t2 + 0.5 * t;
    let c3 = 0.5 * t3 - 0.5 * t2;

    StereoSample {
        left: s0.left * c0 + s1.left * c1 + s2.left * c2 + s3.left * c3,
        right: s0.right * c0 + s1.right * c1 + s2.right * c2 + s3.right * c3,
    }
}

#[inline]
fn clamped(data: &[StereoSample], index: i64) -> StereoSample {
    let last = data.len() as i64 - 1;
    data[index.clamp(0, last) as usize]
}

/// Read one frame at a fractional position
///
/// Returns silence for an empty source or a position outside `0..len`.
pub fn read_interpolated(
    data: &[StereoSample],
    position: f64,
    method: InterpolationMethod,
) -> StereoSample {
    if data.is_empty() || !(0.0..data.len() as f64).contains(&position) {
        return StereoSample::silence();
    }

    let index = position.floor() as i64;
    let frac = (position - position.floor()) as f32;

    match method {
        InterpolationMethod::Linear => {
            let s0 = clamped(data, index);
            let s1 = clamped(data, index + 1);
            lerp_sample(s0, s1, frac)
        }
        InterpolationMethod::Cubic => {
            let s0 = clamped(data, index - 1);
            let s1 = clamped(data, index);
            let s2 = clamped(data, index + 1);
            let s3 = clamped(data, index + 2);
            cubic_interpolate(s0, s1, s2, s3, frac)
        }
    }
}

/// Interpolating reader used by a deck's render path
#[derive(Debug, Clone, Copy, Default)]
pub struct Resampler {
    method: InterpolationMethod,
}

impl Resampler {
    pub fn new(method: InterpolationMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> InterpolationMethod {
        self.method
    }

    pub fn set_method(&mut self, method: InterpolationMethod) {
        self.method = method;
    }

    /// Fill `output` reading `source` from `start`, advancing `step` per frame
    ///
    /// Returns the position after the last output frame. Never allocates.
    pub fn render(
        &self,
        source: &[StereoSample],
        start: f64,
        step: f64,
        output: &mut [StereoSample],
    ) -> f64 {
        let mut pos = start;
        for frame in output.iter_mut() {
            *frame = read_interpolated(source, pos, self.method);
            pos += step;
        }
        pos
    }
}
