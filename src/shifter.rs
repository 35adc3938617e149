//! Block-based playback with message-passing control.
//!
//! A [`PitchShifter`] lives wherever audio is rendered (usually the output
//! callback). Other threads change pitch, rate and tempo by sending
//! [`ShifterMessage`]s through a [`ShifterHandle`]; pending messages are
//! applied at the start of each block.

use delegate::delegate;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::Result;
use crate::fifo::CHANNELS;
use crate::filter::StreamFilter;
use crate::pipes::StretchSettings;
use crate::soundtouch::{Controls, SoundTouch};
use crate::source::SampleSource;

/// Default capacity of the control message queue
pub const DEFAULT_QUEUE_SIZE: usize = 64;

/// Parameter changes for a [`PitchShifter`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShifterMessage {
    SetPitch(f64),
    SetPitchOctaves(f64),
    SetPitchSemitones(f64),
    SetRate(f64),
    /// Percentage change, +50.0 is 1.5x
    SetRateChange(f64),
    SetTempo(f64),
    /// Percentage change, -25.0 is 0.75x
    SetTempoChange(f64),
    /// Replace pitch, rate and tempo at once
    Reconfigure(Controls),
}

/// Sends messages to a [`PitchShifter`] from another thread
pub struct ShifterHandle {
    sender: Producer<ShifterMessage>,
}

impl ShifterHandle {
    /// Queue a message. Gives the message back if the queue is full
    pub fn send(&mut self, msg: ShifterMessage) -> std::result::Result<(), ShifterMessage> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    /// Free slots in the message queue
    #[inline]
    pub fn slots(&self) -> usize {
        self.sender.slots()
    }
}

/// Outcome of rendering one block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    /// This many frames were rendered; the rest of the block is silence
    Continue(usize),
    /// The source is exhausted. The block is silent and the driver should
    /// stop pulling.
    Pause,
}

/// Pitch, rate and tempo shifting over a [`SampleSource`], one block at a time
///
/// ```
/// use pitchshift::{BufferSource, PitchShifter, Pull, ShifterMessage};
///
/// let source = BufferSource::from_mono(&vec![0.25; 48_000]);
/// let (mut shifter, mut handle) = PitchShifter::new(source, 48_000);
///
/// handle.send(ShifterMessage::SetTempo(1.25)).unwrap();
///
/// let mut block = vec![0.0; 2 * 512];
/// assert_eq!(shifter.fill(&mut block), Pull::Continue(512));
/// assert_eq!(shifter.tempo(), 1.25);
/// ```
pub struct PitchShifter<S> {
    filter: StreamFilter<SoundTouch, S>,
    receiver: Consumer<ShifterMessage>,
}

impl<S: SampleSource> PitchShifter<S> {
    /// A shifter for a source recorded at `sample_rate`
    pub fn new(source: S, sample_rate: u32) -> (Self, ShifterHandle) {
        Self::with_settings(source, StretchSettings::default().with_sample_rate(sample_rate))
    }

    pub fn with_settings(source: S, settings: StretchSettings) -> (Self, ShifterHandle) {
        Self::with_filter(StreamFilter::new(source, SoundTouch::with_settings(settings)))
    }

    /// Wrap a pre-configured filter, e.g. one with a custom history size
    pub fn with_filter(filter: StreamFilter<SoundTouch, S>) -> (Self, ShifterHandle) {
        let (sender, receiver) = RingBuffer::new(DEFAULT_QUEUE_SIZE);
        (Self { filter, receiver }, ShifterHandle { sender })
    }

    delegate! {
        to self.filter.pipe() {
            pub fn pitch(&self) -> f64;
            pub fn rate(&self) -> f64;
            pub fn tempo(&self) -> f64;
            pub fn controls(&self) -> Controls;
            pub fn effective_rate(&self) -> f64;
            pub fn effective_tempo(&self) -> f64;
        }

        to self.filter.pipe_mut() {
            pub fn set_pitch(&mut self, pitch: f64);
            pub fn set_pitch_octaves(&mut self, octaves: f64);
            pub fn set_pitch_semitones(&mut self, semitones: f64);
            pub fn set_rate(&mut self, rate: f64);
            pub fn set_rate_change(&mut self, percent: f64);
            pub fn set_tempo(&mut self, tempo: f64);
            pub fn set_tempo_change(&mut self, percent: f64);
            pub fn reconfigure(&mut self, controls: Controls);
        }

        to self.filter {
            pub fn position(&self) -> u64;
            pub fn set_position(&mut self, position: u64) -> Result<()>;
            pub fn source_position(&self) -> u64;
            pub fn set_source_position(&mut self, position: u64);
        }
    }

    #[inline]
    pub fn filter(&self) -> &StreamFilter<SoundTouch, S> {
        &self.filter
    }

    #[inline]
    pub fn filter_mut(&mut self) -> &mut StreamFilter<SoundTouch, S> {
        &mut self.filter
    }

    /// Render one block of interleaved stereo frames into `block`
    ///
    /// A block too short to hold a frame renders nothing but does not pause.
    pub fn fill(&mut self, block: &mut [f32]) -> Pull {
        while let Ok(msg) = self.receiver.pop() {
            self.apply(msg);
        }

        let num_frames = block.len() / CHANNELS;
        let rendered = self.filter.extract(block, num_frames);
        block[rendered * CHANNELS..].fill(0.0);

        if rendered == 0 && num_frames > 0 {
            tracing::debug!(position = self.filter.position(), "nothing left to play, pausing");
            Pull::Pause
        } else {
            Pull::Continue(rendered)
        }
    }

    fn apply(&mut self, msg: ShifterMessage) {
        match msg {
            ShifterMessage::SetPitch(v) => self.set_pitch(v),
            ShifterMessage::SetPitchOctaves(v) => self.set_pitch_octaves(v),
            ShifterMessage::SetPitchSemitones(v) => self.set_pitch_semitones(v),
            ShifterMessage::SetRate(v) => self.set_rate(v),
            ShifterMessage::SetRateChange(v) => self.set_rate_change(v),
            ShifterMessage::SetTempo(v) => self.set_tempo(v),
            ShifterMessage::SetTempoChange(v) => self.set_tempo_change(v),
            ShifterMessage::Reconfigure(controls) => self.reconfigure(controls),
        }
    }
}

#[cfg(feature = "cpal_sink")]
impl<S: SampleSource + Send + 'static> PitchShifter<S> {
    /// Start playing on `device`. Playback stops when the returned output is
    /// disconnected or dropped.
    pub fn connect(self, device: &crate::device::CpalDevice) -> Result<crate::device::CpalOutput> {
        device.connect(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferSource;
    use approx::assert_abs_diff_eq;

    fn shifter(frames: usize) -> (PitchShifter<BufferSource>, ShifterHandle) {
        let samples: Vec<f32> = (0..frames).map(|i| (i as f32 * 0.05).sin()).collect();
        PitchShifter::new(BufferSource::from_mono(&samples), 44100)
    }

    #[test]
    fn messages_apply_before_the_next_block() {
        let (mut shifter, mut handle) = shifter(10_000);
        handle.send(ShifterMessage::SetPitchSemitones(12.0)).unwrap();
        handle.send(ShifterMessage::SetTempoChange(50.0)).unwrap();
        assert_abs_diff_eq!(shifter.pitch(), 1.0);

        let mut block = vec![0.0; 256];
        shifter.fill(&mut block);
        assert_abs_diff_eq!(shifter.pitch(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(shifter.tempo(), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(shifter.effective_tempo(), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(shifter.effective_rate(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn full_queue_returns_the_message() {
        let (_shifter, mut handle) = shifter(100);
        for _ in 0..DEFAULT_QUEUE_SIZE {
            handle.send(ShifterMessage::SetRate(1.1)).unwrap();
        }
        assert_eq!(handle.slots(), 0);
        assert_eq!(handle.send(ShifterMessage::SetRate(0.9)), Err(ShifterMessage::SetRate(0.9)));
    }

    #[test]
    fn pauses_once_the_source_runs_out() {
        let (mut shifter, _handle) = shifter(1000);
        let mut block = vec![1.0; 2 * 600];

        assert_eq!(shifter.fill(&mut block), Pull::Continue(600));
        assert_eq!(shifter.fill(&mut block), Pull::Continue(400));
        assert!(block[800..].iter().all(|&s| s == 0.0));

        assert_eq!(shifter.fill(&mut block), Pull::Pause);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn empty_block_does_not_pause() {
        let (mut shifter, _handle) = shifter(1000);
        assert_eq!(shifter.fill(&mut [0.0f32; 0]), Pull::Continue(0));
        assert_eq!(shifter.fill(&mut [0.5f32]), Pull::Continue(0));

        let mut block = vec![0.0; 64];
        assert_eq!(shifter.fill(&mut block), Pull::Continue(32));
    }

    #[test]
    fn hard_seek_resumes_after_pause() {
        let (mut shifter, _handle) = shifter(1000);
        let mut block = vec![0.0; 2 * 1000];
        shifter.fill(&mut block);
        assert_eq!(shifter.fill(&mut block), Pull::Pause);

        shifter.set_source_position(500);
        assert_eq!(shifter.fill(&mut block), Pull::Continue(500));
        assert_eq!(shifter.source_position(), 1000);
    }
}
