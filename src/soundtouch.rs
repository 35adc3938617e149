//! Pitch, rate and tempo control over a resampler and a tempo changer
//!
//! Pitch, rate and tempo are set independently and folded into the two
//! values the stages actually apply:
//!
//! - effective tempo = tempo / pitch
//! - effective rate = rate * pitch
//!
//! Raising pitch by resampling also speeds the sound up, so the tempo
//! changer slows it back down by the same factor.

use crate::fifo::SampleFifo;
use crate::pipe::{BufferedPipe, Pipe};
use crate::pipes::{RateTransposer, Stretch, StretchSettings, RATIO_RANGE};

/// Changes smaller than this are not pushed down to the stages
const PARAMETER_EPSILON: f64 = 1e-10;

/// Virtual pitch, rate and tempo ratios. 1.0 leaves a property unchanged
///
/// ```
/// use pitchshift::Controls;
///
/// let controls = Controls::default()
///     .with_pitch_semitones(12.0)
///     .with_tempo_change(-25.0);
/// assert!((controls.pitch - 2.0).abs() < 1e-9);
/// assert!((controls.tempo - 0.75).abs() < 1e-9);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Controls {
    pub pitch: f64,
    pub rate: f64,
    pub tempo: f64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            rate: 1.0,
            tempo: 1.0,
        }
    }
}

impl Controls {
    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = pitch;
        self
    }

    /// Pitch in octaves (+1.0 doubles the frequency)
    pub fn with_pitch_octaves(self, octaves: f64) -> Self {
        self.with_pitch(octaves.exp2())
    }

    /// Pitch in semitones
    pub fn with_pitch_semitones(self, semitones: f64) -> Self {
        self.with_pitch_octaves(semitones / 12.0)
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Rate as a percentage change (+50.0 is 1.5x)
    pub fn with_rate_change(self, percent: f64) -> Self {
        self.with_rate(1.0 + 0.01 * percent)
    }

    pub fn with_tempo(mut self, tempo: f64) -> Self {
        self.tempo = tempo;
        self
    }

    /// Tempo as a percentage change (-25.0 is 0.75x)
    pub fn with_tempo_change(self, percent: f64) -> Self {
        self.with_tempo(1.0 + 0.01 * percent)
    }

    pub fn effective_tempo(&self) -> f64 {
        self.tempo / self.pitch
    }

    pub fn effective_rate(&self) -> f64 {
        self.rate * self.pitch
    }

    /// Replace every invalid field with the one from `fallback`. If the
    /// effective rate or tempo still falls outside [`RATIO_RANGE`], `fallback`
    /// is kept as a whole.
    fn or(self, fallback: Controls) -> Controls {
        let valid = |v: f64| RATIO_RANGE.contains(&v);
        let controls = Controls {
            pitch: if valid(self.pitch) { self.pitch } else { fallback.pitch },
            rate: if valid(self.rate) { self.rate } else { fallback.rate },
            tempo: if valid(self.tempo) { self.tempo } else { fallback.tempo },
        };
        if valid(controls.effective_rate()) && valid(controls.effective_tempo()) {
            controls
        } else {
            tracing::warn!(?controls, "effective rate or tempo out of range, ignored");
            fallback
        }
    }
}

/// Which stage reads the shared input buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// input -> RateTransposer -> intermediate -> Stretch -> output
    TransposeFirst,
    /// input -> Stretch -> intermediate -> RateTransposer -> output
    StretchFirst,
}

impl Route {
    /// Downsampling (rate > 1) shrinks the stream, so stretch before it;
    /// otherwise resample first.
    fn for_rate(rate: f64) -> Self {
        if rate > 1.0 {
            Route::StretchFirst
        } else {
            Route::TransposeFirst
        }
    }
}

/// The full pitch/rate/tempo pipeline
///
/// Write interleaved stereo frames into [`input_buffer_mut`](BufferedPipe::input_buffer_mut),
/// call [`process`](BufferedPipe::process), read results from
/// [`output_buffer`](BufferedPipe::output_buffer).
///
/// ```
/// use pitchshift::{BufferedPipe, Controls, SoundTouch};
///
/// let mut st = SoundTouch::new();
/// st.reconfigure(Controls::default().with_rate(0.5));
///
/// let silence = vec![0.0; 2 * 1000];
/// st.input_buffer_mut().put_samples(&silence, 0, None);
/// st.process();
/// assert!(st.input_buffer().is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct SoundTouch {
    rate_transposer: RateTransposer,
    stretch: Stretch,

    input: SampleFifo,
    intermediate: SampleFifo,
    output: SampleFifo,

    controls: Controls,
    effective_rate: f64,
    effective_tempo: f64,
    route: Route,
}

impl Default for SoundTouch {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundTouch {
    pub fn new() -> Self {
        Self::with_settings(StretchSettings::default())
    }

    pub fn with_settings(settings: StretchSettings) -> Self {
        let controls = Controls::default();
        Self {
            rate_transposer: RateTransposer::new(controls.effective_rate()),
            stretch: Stretch::with_settings(settings),
            input: SampleFifo::new(),
            intermediate: SampleFifo::new(),
            output: SampleFifo::new(),
            controls,
            effective_rate: controls.effective_rate(),
            effective_tempo: controls.effective_tempo(),
            route: Route::for_rate(controls.effective_rate()),
        }
    }

    /// Apply new pitch, rate and tempo in one step
    ///
    /// Fields outside [`RATIO_RANGE`] keep their previous value.
    /// Stages only see a new parameter when it actually changed, and the
    /// buffers are only re-routed when the effective rate crosses 1.0.
    pub fn reconfigure(&mut self, controls: Controls) {
        self.controls = controls.or(self.controls);

        let tempo = self.controls.effective_tempo();
        let rate = self.controls.effective_rate();

        if differs(tempo, self.effective_tempo) {
            self.stretch.set_tempo(tempo);
        }
        if differs(rate, self.effective_rate) {
            self.rate_transposer.set_rate(rate);
        }
        self.effective_tempo = tempo;
        self.effective_rate = rate;

        // in-flight frames in the intermediate buffer stay where they are
        self.route = Route::for_rate(rate);
    }

    /// Change the stream sample rate. Zero is ignored
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let settings = self.stretch.settings().with_sample_rate(sample_rate);
        self.stretch.apply_settings(settings);
    }

    /// Replace the tempo changer's timing parameters
    pub fn set_stretch_settings(&mut self, settings: StretchSettings) {
        self.stretch.apply_settings(settings);
    }

    #[inline]
    pub fn controls(&self) -> Controls {
        self.controls
    }

    #[inline]
    pub fn pitch(&self) -> f64 {
        self.controls.pitch
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.reconfigure(self.controls.with_pitch(pitch));
    }

    pub fn set_pitch_octaves(&mut self, octaves: f64) {
        self.reconfigure(self.controls.with_pitch_octaves(octaves));
    }

    pub fn set_pitch_semitones(&mut self, semitones: f64) {
        self.reconfigure(self.controls.with_pitch_semitones(semitones));
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.controls.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.reconfigure(self.controls.with_rate(rate));
    }

    pub fn set_rate_change(&mut self, percent: f64) {
        self.reconfigure(self.controls.with_rate_change(percent));
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.controls.tempo
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        self.reconfigure(self.controls.with_tempo(tempo));
    }

    pub fn set_tempo_change(&mut self, percent: f64) {
        self.reconfigure(self.controls.with_tempo_change(percent));
    }

    /// Rate applied by the resampler
    #[inline]
    pub fn effective_rate(&self) -> f64 {
        self.effective_rate
    }

    /// Tempo applied by the tempo changer
    #[inline]
    pub fn effective_tempo(&self) -> f64 {
        self.effective_tempo
    }

    #[inline]
    pub fn route(&self) -> Route {
        self.route
    }

    #[inline]
    pub fn rate_transposer(&self) -> &RateTransposer {
        &self.rate_transposer
    }

    #[inline]
    pub fn stretch(&self) -> &Stretch {
        &self.stretch
    }

    /// Frames sitting between the two stages
    #[inline]
    pub fn intermediate_buffer(&self) -> &SampleFifo {
        &self.intermediate
    }
}

impl BufferedPipe for SoundTouch {
    fn input_buffer(&self) -> &SampleFifo {
        &self.input
    }

    fn input_buffer_mut(&mut self) -> &mut SampleFifo {
        &mut self.input
    }

    fn output_buffer(&self) -> &SampleFifo {
        &self.output
    }

    fn output_buffer_mut(&mut self) -> &mut SampleFifo {
        &mut self.output
    }

    fn process(&mut self) {
        match self.route {
            Route::StretchFirst => {
                self.stretch.process(&mut self.input, &mut self.intermediate);
                self.rate_transposer.process(&mut self.intermediate, &mut self.output);
            }
            Route::TransposeFirst => {
                self.rate_transposer.process(&mut self.input, &mut self.intermediate);
                self.stretch.process(&mut self.intermediate, &mut self.output);
            }
        }
    }

    fn clear(&mut self) {
        self.input.clear();
        self.intermediate.clear();
        self.output.clear();
        self.rate_transposer.reset();
        self.stretch.reset();
    }
}

#[inline]
fn differs(a: f64, b: f64) -> bool {
    (a - b).abs() > PARAMETER_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn feed(st: &mut SoundTouch, frames: usize) {
        let samples: Vec<f32> = (0..frames * 2).map(|i| ((i / 2) as f32 * 0.01).sin()).collect();
        st.input_buffer_mut().put_samples(&samples, 0, None);
        st.process();
    }

    #[test]
    fn effective_values_combine_pitch_rate_and_tempo() {
        let mut st = SoundTouch::new();
        st.reconfigure(Controls { pitch: 2.0, rate: 0.75, tempo: 1.5 });

        assert_abs_diff_eq!(st.effective_tempo(), 0.75);
        assert_abs_diff_eq!(st.effective_rate(), 1.5);
        assert_abs_diff_eq!(st.stretch().tempo(), 0.75);
        assert_abs_diff_eq!(st.rate_transposer().rate(), 1.5);
    }

    #[test]
    fn convenience_setters() {
        let mut st = SoundTouch::new();

        st.set_pitch_octaves(-1.0);
        assert_abs_diff_eq!(st.pitch(), 0.5, epsilon = 1e-12);
        st.set_pitch_semitones(7.0);
        assert_abs_diff_eq!(st.pitch(), 2f64.powf(7.0 / 12.0), epsilon = 1e-12);

        st.set_rate_change(50.0);
        assert_abs_diff_eq!(st.rate(), 1.5);
        st.set_tempo_change(-20.0);
        assert_abs_diff_eq!(st.tempo(), 0.8, epsilon = 1e-12);

        st.set_pitch(1.0);
        assert_abs_diff_eq!(st.effective_tempo(), 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(st.effective_rate(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn invalid_controls_keep_last_good_value() {
        let mut st = SoundTouch::new();
        st.set_tempo(1.2);
        st.set_tempo(0.0);
        st.set_tempo(f64::NAN);
        st.set_rate(-3.0);
        assert_abs_diff_eq!(st.tempo(), 1.2);
        assert_abs_diff_eq!(st.rate(), 1.0);

        st.reconfigure(Controls { pitch: -1.0, rate: 2.0, tempo: 0.9 });
        assert_abs_diff_eq!(st.pitch(), 1.0);
        assert_abs_diff_eq!(st.rate(), 2.0);
        assert_abs_diff_eq!(st.tempo(), 0.9);
    }

    #[test]
    fn extreme_ratios_are_ignored() {
        let mut st = SoundTouch::new();
        st.set_rate(1e-300);
        st.set_tempo(1e300);
        assert_abs_diff_eq!(st.rate(), 1.0);
        assert_abs_diff_eq!(st.tempo(), 1.0);

        // each field is fine on its own, the product is not
        st.reconfigure(Controls { pitch: 0.01, rate: 0.01, tempo: 1.0 });
        assert_eq!(st.controls(), Controls::default());
        assert_abs_diff_eq!(st.rate_transposer().rate(), 1.0);

        st.set_rate(0.5);
        feed(&mut st, 10);
        assert!(st.input_buffer().is_empty());
        assert!(st.output_buffer().frame_count() <= 30);
    }

    #[test]
    fn route_follows_effective_rate() {
        let mut st = SoundTouch::new();
        assert_eq!(st.route(), Route::TransposeFirst);

        st.set_rate(2.0);
        assert_eq!(st.route(), Route::StretchFirst);

        st.set_rate(0.5);
        assert_eq!(st.route(), Route::TransposeFirst);

        // pitch counts towards the effective rate
        st.set_pitch(4.0);
        assert_eq!(st.route(), Route::StretchFirst);
    }

    #[test]
    fn rerouting_on_the_same_side_keeps_in_flight_frames() {
        let mut st = SoundTouch::new();
        st.set_rate(2.0);
        st.set_tempo(0.7);
        feed(&mut st, 1000);

        // stretch sits first and is waiting for more input
        let pending = st.input_buffer().frame_count();
        assert!(pending > 0);

        st.set_rate(1.5);
        st.set_rate(3.0);
        assert_eq!(st.route(), Route::StretchFirst);
        assert_eq!(st.input_buffer().frame_count(), pending);
    }

    #[test]
    fn stretch_first_when_downsampling() {
        let mut st = SoundTouch::new();
        st.set_rate(2.0);
        st.set_tempo(0.9);
        feed(&mut st, 20_000);

        // the stretcher consumed from input; resampler drained the intermediate buffer
        assert!(st.input_buffer().frame_count() < st.stretch().input_chunk_size());
        assert!(st.intermediate_buffer().is_empty());
        assert!(st.output_buffer().frame_count() > 0);
    }

    #[test]
    fn transpose_first_when_upsampling() {
        let mut st = SoundTouch::new();
        st.set_rate(0.5);
        st.set_tempo(0.9);
        feed(&mut st, 20_000);

        // the resampler drained the input; the stretcher holds back a partial sequence
        assert!(st.input_buffer().is_empty());
        assert!(st.intermediate_buffer().frame_count() < st.stretch().input_chunk_size());
        assert!(st.output_buffer().frame_count() > 0);
    }

    #[test]
    fn unity_settings_pass_audio_through() {
        let mut st = SoundTouch::new();
        let samples: Vec<f32> = (0..4000).map(|i| i as f32).collect();
        st.input_buffer_mut().put_samples(&samples, 0, None);
        st.process();
        assert_eq!(st.output_buffer().frames(), &samples[..]);
    }

    #[test]
    fn clear_empties_every_buffer() {
        let mut st = SoundTouch::new();
        st.set_tempo(1.3);
        feed(&mut st, 30_000);
        st.clear();

        assert!(st.input_buffer().is_empty());
        assert!(st.intermediate_buffer().is_empty());
        assert!(st.output_buffer().is_empty());
    }
}
