//! Linear-interpolation resampler
//!
//! Changes playback rate (and with it, pitch) by resampling at an arbitrary
//! ratio. The fractional read position is carried across calls, so the
//! long-run ratio stays exact no matter how the stream is chunked.

use crate::fifo::{SampleFifo, CHANNELS};
use crate::pipe::Pipe;
use crate::pipes::RATIO_RANGE;

/// Fractional-ratio resampler
///
/// `rate` is the number of input frames advanced per output frame: 2.0
/// halves the frame count (plays back twice as fast), 0.5 doubles it.
#[derive(Clone, Debug)]
pub struct RateTransposer {
    rate: f64,
    /// Fractional read position between `prev` and the next input frame
    slope_count: f64,
    /// Last consumed input frame, interpolated against the next call's first frame
    prev_sample_l: f32,
    prev_sample_r: f32,
}

impl Default for RateTransposer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RateTransposer {
    pub fn new(rate: f64) -> Self {
        let mut transposer = Self {
            rate: 1.0,
            slope_count: 0.0,
            prev_sample_l: 0.0,
            prev_sample_r: 0.0,
        };
        transposer.set_rate(rate);
        transposer
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Set the transposition ratio. Values outside [`RATIO_RANGE`] are ignored
    pub fn set_rate(&mut self, rate: f64) {
        if RATIO_RANGE.contains(&rate) {
            self.rate = rate;
        }
    }

    /// Upper bound on output frames for `num_frames` input frames
    fn max_output(&self, num_frames: usize) -> usize {
        let frames = (num_frames.saturating_add(2) as f64 / self.rate).ceil();
        (frames as usize).saturating_add(2)
    }

    /// Resample every frame in `src` into `dest`, returning frames written
    fn transpose(&mut self, src: &[f32], dest: &mut [f32]) -> usize {
        let num_frames = src.len() / CHANNELS;
        if num_frames == 0 {
            return 0;
        }

        let mut used = 0;
        let mut i = 0;

        // leftover phase from the previous call, between prev and src[0]
        while self.slope_count < 1.0 {
            let t = self.slope_count as f32;
            dest[2 * i] = (1.0 - t) * self.prev_sample_l + t * src[0];
            dest[2 * i + 1] = (1.0 - t) * self.prev_sample_r + t * src[1];
            i += 1;
            self.slope_count += self.rate;
        }

        self.slope_count -= 1.0;

        if num_frames != 1 {
            'out: loop {
                while self.slope_count > 1.0 {
                    self.slope_count -= 1.0;
                    used += 1;
                    if used >= num_frames - 1 {
                        break 'out;
                    }
                }

                let t = self.slope_count as f32;
                let src_index = 2 * used;
                dest[2 * i] = (1.0 - t) * src[src_index] + t * src[src_index + 2];
                dest[2 * i + 1] = (1.0 - t) * src[src_index + 1] + t * src[src_index + 3];
                i += 1;
                self.slope_count += self.rate;
            }
        }

        self.prev_sample_l = src[2 * num_frames - 2];
        self.prev_sample_r = src[2 * num_frames - 1];

        i
    }

    /// Unity rate: copy through, leaving the carry state as if the frames had
    /// been interpolated, so a later rate change continues without a jump.
    fn pass_through(&mut self, input: &mut SampleFifo, output: &mut SampleFifo) {
        if let [.., l, r] = input.frames() {
            self.prev_sample_l = *l;
            self.prev_sample_r = *r;
            self.slope_count = 1.0;
        }
        output.put_buffer(input, 0, None);
        input.receive(None);
    }
}

impl Pipe for RateTransposer {
    fn process(&mut self, input: &mut SampleFifo, output: &mut SampleFifo) {
        if self.rate == 1.0 {
            self.pass_through(input, output);
            return;
        }

        let num_frames = input.frame_count();
        let dest = output.reserve(self.max_output(num_frames));
        let written = self.transpose(input.frames(), dest);
        input.receive(None);
        output.put(written);
    }

    fn reset(&mut self) {
        self.slope_count = 0.0;
        self.prev_sample_l = 0.0;
        self.prev_sample_r = 0.0;
    }
}
