//! Time-domain overlap-add tempo changer
//!
//! The input is chopped into sequences of `seek_window_length` frames. Each
//! sequence is crossfaded onto the tail of the previous one at the offset
//! (within `seek_length` frames) where the two match best, then the input
//! read position advances by `tempo` times the non-overlapping part of a
//! sequence. Faster tempo skips more input per sequence, slower tempo less,
//! and pitch is left alone.

use crate::fifo::{SampleFifo, CHANNELS};
use crate::pipe::Pipe;
use crate::pipes::RATIO_RANGE;

/// Default overlap between consecutive sequences, in milliseconds
pub const DEFAULT_OVERLAP_MS: f64 = 8.0;

/// Default sample rate the stretcher is configured for
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Tempo values closer than this to 1.0 count as unity
const UNITY_EPSILON: f64 = 1e-10;

/// Position steps for the four passes of the quick seek, coarse to fine.
/// Zero terminates a row.
const SCAN_OFFSETS: [[i32; 24]; 4] = [
    [
        124, 186, 248, 310, 372, 434, 496, 558, 620, 682, 744, 806, 868, 930, 992, 1054, 1116,
        1178, 1240, 1302, 1364, 1426, 1488, 0,
    ],
    [
        -100, -75, -50, -25, 25, 50, 75, 100, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    [
        -20, -15, -10, -5, 5, 10, 15, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    [
        -4, -3, -2, -1, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
];

// Automatic sequence and seek window lengths are linear in tempo between
// these two tempo values, and held constant outside of them.
const AUTOSEQ_TEMPO_LOW: f64 = 0.5;
const AUTOSEQ_TEMPO_TOP: f64 = 2.0;

const AUTOSEQ_AT_MIN: f64 = 125.0;
const AUTOSEQ_AT_MAX: f64 = 50.0;
const AUTOSEQ_K: f64 = (AUTOSEQ_AT_MAX - AUTOSEQ_AT_MIN) / (AUTOSEQ_TEMPO_TOP - AUTOSEQ_TEMPO_LOW);
const AUTOSEQ_C: f64 = AUTOSEQ_AT_MIN - AUTOSEQ_K * AUTOSEQ_TEMPO_LOW;

const AUTOSEEK_AT_MIN: f64 = 25.0;
const AUTOSEEK_AT_MAX: f64 = 15.0;
const AUTOSEEK_K: f64 = (AUTOSEEK_AT_MAX - AUTOSEEK_AT_MIN) / (AUTOSEQ_TEMPO_TOP - AUTOSEQ_TEMPO_LOW);
const AUTOSEEK_C: f64 = AUTOSEEK_AT_MIN - AUTOSEEK_K * AUTOSEQ_TEMPO_LOW;

/// Timing parameters for [`Stretch`]
///
/// ```
/// use pitchshift::StretchSettings;
///
/// let settings = StretchSettings::default()
///     .with_sample_rate(48000)
///     .with_sequence_ms(80.0)
///     .with_quick_seek(false);
/// assert_eq!(settings.seek_window_ms, None); // still automatic
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StretchSettings {
    /// Sample rate of the processed stream in Hz
    pub sample_rate: u32,
    /// Length of one processing sequence; `None` derives it from tempo
    pub sequence_ms: Option<f64>,
    /// Width of the best-overlap search; `None` derives it from tempo
    pub seek_window_ms: Option<f64>,
    /// Crossfade length between sequences
    pub overlap_ms: f64,
    /// Use the hierarchical search instead of scanning every offset
    pub quick_seek: bool,
    /// Pass input straight through while tempo is 1.0
    pub unity_bypass: bool,
}

impl Default for StretchSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            sequence_ms: None,
            seek_window_ms: None,
            overlap_ms: DEFAULT_OVERLAP_MS,
            quick_seek: true,
            unity_bypass: true,
        }
    }
}

impl StretchSettings {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Fix the sequence length. Non-positive values select automatic mode
    pub fn with_sequence_ms(mut self, ms: f64) -> Self {
        self.sequence_ms = Some(ms).filter(|ms| *ms > 0.0);
        self
    }

    pub fn with_auto_sequence(mut self) -> Self {
        self.sequence_ms = None;
        self
    }

    /// Fix the seek window length. Non-positive values select automatic mode
    pub fn with_seek_window_ms(mut self, ms: f64) -> Self {
        self.seek_window_ms = Some(ms).filter(|ms| *ms > 0.0);
        self
    }

    pub fn with_auto_seek_window(mut self) -> Self {
        self.seek_window_ms = None;
        self
    }

    pub fn with_overlap_ms(mut self, ms: f64) -> Self {
        self.overlap_ms = ms;
        self
    }

    pub fn with_quick_seek(mut self, enable: bool) -> Self {
        self.quick_seek = enable;
        self
    }

    pub fn with_unity_bypass(mut self, enable: bool) -> Self {
        self.unity_bypass = enable;
        self
    }
}

/// Overlap-add tempo changer with correlation-based seek
#[derive(Clone, Debug)]
pub struct Stretch {
    tempo: f64,
    settings: StretchSettings,

    /// Sequence and seek window lengths in effect, in milliseconds
    sequence_ms: f64,
    seek_window_ms: f64,

    overlap_length: usize,
    seek_window_length: usize,
    seek_length: usize,

    /// Ideal input advance per sequence, and the fraction not yet applied
    nominal_skip: f64,
    skip_fract: f64,
    /// Input frames needed to process one sequence
    sample_req: usize,

    /// Tail of the previous sequence, mixed into the head of the next one
    mid_buffer: Vec<f32>,
    /// `mid_buffer` sloped by `i * (overlap_length - i)`
    ref_mid_buffer: Vec<f32>,
    mid_buffer_primed: bool,

    /// Input frames (from the current front) up to the end of the content
    /// held in `mid_buffer`
    carry: isize,
    /// Input frames still to be dropped before passing through
    pending_skip: usize,
}

impl Default for Stretch {
    fn default() -> Self {
        Self::with_settings(StretchSettings::default())
    }
}

impl Stretch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: StretchSettings) -> Self {
        let mut stretch = Self {
            tempo: 1.0,
            settings: StretchSettings::default(),
            sequence_ms: 0.0,
            seek_window_ms: 0.0,
            overlap_length: 0,
            seek_window_length: 0,
            seek_length: 0,
            nominal_skip: 0.0,
            skip_fract: 0.0,
            sample_req: 0,
            mid_buffer: Vec::new(),
            ref_mid_buffer: Vec::new(),
            mid_buffer_primed: false,
            carry: 0,
            pending_skip: 0,
        };
        stretch.apply_settings(settings);
        stretch
    }

    /// Apply new timing parameters and recompute everything derived from them
    ///
    /// A zero sample rate or a non-positive overlap keeps the previous value.
    pub fn apply_settings(&mut self, settings: StretchSettings) {
        let previous = self.settings;
        self.settings = StretchSettings {
            sample_rate: if settings.sample_rate > 0 {
                settings.sample_rate
            } else {
                previous.sample_rate
            },
            overlap_ms: if settings.overlap_ms > 0.0 && settings.overlap_ms.is_finite() {
                settings.overlap_ms
            } else {
                previous.overlap_ms
            },
            sequence_ms: settings.sequence_ms.filter(|ms| *ms > 0.0 && ms.is_finite()),
            seek_window_ms: settings.seek_window_ms.filter(|ms| *ms > 0.0 && ms.is_finite()),
            ..settings
        };

        self.calculate_overlap_length();
        // recomputes the sequence parameters and `sample_req`
        self.update_tempo(self.tempo);
    }

    /// Set the timing parameters in one go, in the classic argument order
    ///
    /// Non-positive `sequence_ms` or `seek_window_ms` select automatic mode
    /// for that parameter; a zero `sample_rate` or non-positive `overlap_ms`
    /// keeps the previous value.
    pub fn set_parameters(&mut self, sample_rate: u32, sequence_ms: f64, seek_window_ms: f64, overlap_ms: f64) {
        let settings = self
            .settings
            .with_sample_rate(sample_rate)
            .with_sequence_ms(sequence_ms)
            .with_seek_window_ms(seek_window_ms)
            .with_overlap_ms(overlap_ms);
        self.apply_settings(settings);
    }

    #[inline]
    pub fn settings(&self) -> &StretchSettings {
        &self.settings
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Set the tempo ratio. Values outside [`RATIO_RANGE`] are ignored
    pub fn set_tempo(&mut self, tempo: f64) {
        if RATIO_RANGE.contains(&tempo) {
            self.update_tempo(tempo);
        }
    }

    pub fn set_quick_seek(&mut self, enable: bool) {
        self.settings.quick_seek = enable;
    }

    #[inline]
    pub fn is_quick_seek(&self) -> bool {
        self.settings.quick_seek
    }

    pub fn set_unity_bypass(&mut self, enable: bool) {
        self.settings.unity_bypass = enable;
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.settings.sample_rate
    }

    #[inline]
    pub fn sequence_ms(&self) -> f64 {
        self.sequence_ms
    }

    #[inline]
    pub fn seek_window_ms(&self) -> f64 {
        self.seek_window_ms
    }

    #[inline]
    pub fn overlap_length(&self) -> usize {
        self.overlap_length
    }

    #[inline]
    pub fn seek_window_length(&self) -> usize {
        self.seek_window_length
    }

    #[inline]
    pub fn seek_length(&self) -> usize {
        self.seek_length
    }

    #[inline]
    pub fn nominal_skip(&self) -> f64 {
        self.nominal_skip
    }

    /// Input frames required before another sequence can be processed
    #[inline]
    pub fn input_chunk_size(&self) -> usize {
        self.sample_req
    }

    /// Output frames produced per processed sequence
    #[inline]
    pub fn output_chunk_size(&self) -> usize {
        self.overlap_length + self.seek_window_length.saturating_sub(2 * self.overlap_length)
    }

    fn is_unity(&self) -> bool {
        (self.tempo - 1.0).abs() < UNITY_EPSILON
    }

    fn update_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        self.calc_seq_parameters();

        self.nominal_skip = self.tempo * (self.seek_window_length - self.overlap_length) as f64;
        self.skip_fract = 0.0;
        let int_skip = (self.nominal_skip + 0.5).floor() as usize;

        self.sample_req = (int_skip + self.overlap_length).max(self.seek_window_length) + self.seek_length;
    }

    fn calc_seq_parameters(&mut self) {
        self.sequence_ms = match self.settings.sequence_ms {
            Some(ms) => ms,
            None => {
                let seq = (AUTOSEQ_C + AUTOSEQ_K * self.tempo).clamp(AUTOSEQ_AT_MAX, AUTOSEQ_AT_MIN);
                (seq + 0.5).floor()
            }
        };
        self.seek_window_ms = match self.settings.seek_window_ms {
            Some(ms) => ms,
            None => {
                let seek = (AUTOSEEK_C + AUTOSEEK_K * self.tempo).clamp(AUTOSEEK_AT_MAX, AUTOSEEK_AT_MIN);
                (seek + 0.5).floor()
            }
        };

        let sample_rate = self.settings.sample_rate as f64;
        // a sequence always spans at least the two crossfades at its ends
        self.seek_window_length =
            ((sample_rate * self.sequence_ms / 1000.0).floor() as usize).max(2 * self.overlap_length);
        self.seek_length = (sample_rate * self.seek_window_ms / 1000.0).floor() as usize;
    }

    fn calculate_overlap_length(&mut self) {
        let frames = (self.settings.sample_rate as f64 * self.settings.overlap_ms / 1000.0) as usize;
        // multiple of 8, at least 16
        let overlap_length = frames.max(16) / 8 * 8;

        if overlap_length != self.overlap_length {
            self.overlap_length = overlap_length;
            self.mid_buffer = vec![0.0; overlap_length * CHANNELS];
            self.ref_mid_buffer = vec![0.0; overlap_length * CHANNELS];
            self.mid_buffer_primed = false;
            self.carry = 0;
        }
    }

    /// Slope the mid-buffer so that each candidate only costs one
    /// multiply-add per sample.
    fn precalc_corr_reference(&mut self) {
        let overlap = self.overlap_length;
        let frames = self.mid_buffer.chunks_exact(CHANNELS);
        for (i, (reference, mid)) in self.ref_mid_buffer.chunks_exact_mut(CHANNELS).zip(frames).enumerate() {
            let weight = (i * (overlap - i)) as f32;
            reference[0] = mid[0] * weight;
            reference[1] = mid[1] * weight;
        }
    }

    /// Correlation of the sloped mid-buffer against `mixing`, which starts at
    /// the candidate offset.
    #[inline]
    fn cross_corr(&self, mixing: &[f32]) -> f64 {
        mixing
            .iter()
            .zip(&self.ref_mid_buffer)
            .map(|(&m, &r)| m as f64 * r as f64)
            .sum()
    }

    fn seek_best_overlap_position(&mut self, input: &[f32]) -> usize {
        self.precalc_corr_reference();
        if self.settings.quick_seek {
            self.seek_quick(input)
        } else {
            self.seek_exhaustive(input)
        }
    }

    /// Try every offset in `[0, seek_length)`. Ties keep the lowest offset
    fn seek_exhaustive(&self, input: &[f32]) -> usize {
        let mut best_corr = f64::NEG_INFINITY;
        let mut best_offs = 0;

        for offset in 0..self.seek_length {
            let corr = self.cross_corr(&input[offset * CHANNELS..]);
            if corr > best_corr {
                best_corr = corr;
                best_offs = offset;
            }
        }

        best_offs
    }

    /// Four-pass hierarchical search: each pass rescans the neighbourhood of
    /// the best offset so far with a finer step.
    fn seek_quick(&self, input: &[f32]) -> usize {
        let mut best_corr = f64::NEG_INFINITY;
        let mut best_offs = 0;
        let mut corr_offset = 0i64;

        for row in SCAN_OFFSETS.iter() {
            for &step in row.iter().take_while(|step| **step != 0) {
                let offset = corr_offset + step as i64;
                if offset >= self.seek_length as i64 {
                    break;
                }
                if offset < 0 {
                    continue;
                }

                let offset = offset as usize;
                let corr = self.cross_corr(&input[offset * CHANNELS..]);
                if corr > best_corr {
                    best_corr = corr;
                    best_offs = offset;
                }
            }
            corr_offset = best_offs as i64;
        }

        best_offs
    }

    /// Crossfade the mid-buffer into `input` (starting at the chosen offset),
    /// writing `overlap_length` frames to `output`.
    fn overlap(&self, output: &mut [f32], input: &[f32]) {
        let scale = 1.0 / self.overlap_length as f32;
        let frames = output
            .chunks_exact_mut(CHANNELS)
            .zip(input.chunks_exact(CHANNELS))
            .zip(self.mid_buffer.chunks_exact(CHANNELS));

        for (i, ((out, inp), mid)) in frames.enumerate() {
            let fade_in = i as f32 * scale;
            let fade_out = (self.overlap_length - i) as f32 * scale;
            out[0] = inp[0] * fade_in + mid[0] * fade_out;
            out[1] = inp[1] * fade_in + mid[1] * fade_out;
        }
    }

    /// Unity tempo: flush the mid-buffer (its content follows what has
    /// already been emitted), skip the input it covers, copy the rest.
    fn pass_through(&mut self, input: &mut SampleFifo, output: &mut SampleFifo) {
        if self.mid_buffer_primed {
            output.put_samples(&self.mid_buffer, 0, None);
            self.mid_buffer_primed = false;
            self.skip_fract = 0.0;
            self.pending_skip = self.carry.max(0) as usize;
            self.carry = 0;
            if !self.drop_pending(input) {
                return;
            }
        }

        output.put_buffer(input, 0, None);
        input.receive(None);
    }

    /// Returns false while part of the skip is still outstanding
    fn drop_pending(&mut self, input: &mut SampleFifo) -> bool {
        if self.pending_skip > 0 {
            self.pending_skip -= input.receive(Some(self.pending_skip));
        }
        self.pending_skip == 0
    }

    /// Process one sequence at the front of `input`, which must hold at
    /// least `sample_req` frames.
    fn process_sequence(&mut self, input: &mut SampleFifo, output: &mut SampleFifo) {
        let overlap = self.overlap_length;
        let offset = self.seek_best_overlap_position(input.frames());

        // crossfade with the end of the previous sequence
        let start = offset * CHANNELS;
        self.overlap(output.reserve(overlap), &input.frames()[start..start + overlap * CHANNELS]);
        output.put(overlap);

        // then the body of the sequence as-is
        let body = self.seek_window_length as isize - 2 * overlap as isize;
        if body > 0 {
            output.put_buffer(input, offset + overlap, Some(body as usize));
        }

        // keep the end of this sequence for the next crossfade
        let tail = (offset + self.seek_window_length - overlap) * CHANNELS;
        self.mid_buffer.copy_from_slice(&input.frames()[tail..tail + overlap * CHANNELS]);

        // advance by the integer part of the accumulated skip so the
        // fraction never gets lost
        self.skip_fract += self.nominal_skip;
        let int_skip = self.skip_fract.floor();
        self.skip_fract -= int_skip;
        let int_skip = input.receive(Some(int_skip as usize));

        self.carry = (offset + self.seek_window_length) as isize - int_skip as isize;
    }
}

impl Pipe for Stretch {
    fn process(&mut self, input: &mut SampleFifo, output: &mut SampleFifo) {
        if !self.drop_pending(input) {
            return;
        }

        if self.settings.unity_bypass && self.is_unity() {
            self.pass_through(input, output);
            return;
        }

        if !self.mid_buffer_primed {
            // wait until a whole overlap is available to seed the mid-buffer
            if input.frame_count() < self.overlap_length {
                return;
            }
            input.receive_samples(&mut self.mid_buffer, self.overlap_length);
            self.mid_buffer_primed = true;
            self.carry = 0;
        }

        while input.frame_count() >= self.sample_req {
            self.process_sequence(input, output);
        }
    }

    fn reset(&mut self) {
        self.mid_buffer_primed = false;
        self.skip_fract = 0.0;
        self.carry = 0;
        self.pending_skip = 0;
    }
}
