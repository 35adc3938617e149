//! pitchshift - streaming time-stretch and pitch-shift for stereo audio
//!
//! Pitch, playback rate and tempo can be changed independently while audio
//! is playing. Two stages do the work:
//! - [`RateTransposer`] resamples (changes rate and pitch together)
//! - [`Stretch`] changes tempo by overlap-adding sequences of the input
//!
//! [`SoundTouch`] combines them, [`StreamFilter`] drives them from a
//! [`SampleSource`] one block at a time, and [`PitchShifter`] adds
//! message-passing control for use from an audio callback.
//!
//! # Example
//!
//! ```
//! use pitchshift::{BufferSource, PitchShifter, Pull, ShifterMessage};
//!
//! let tone: Vec<f32> = (0..44_100).map(|i| (i as f32 * 0.06).sin() * 0.5).collect();
//! let (mut shifter, mut handle) = PitchShifter::new(BufferSource::from_mono(&tone), 44_100);
//!
//! // a fifth up, same speed
//! handle.send(ShifterMessage::SetPitchSemitones(7.0)).unwrap();
//!
//! let mut block = vec![0.0; 2 * 1024];
//! while let Pull::Continue(frames) = shifter.fill(&mut block) {
//!     // hand `block[..2 * frames]` to the output
//! #   let _ = frames;
//! }
//! ```
//!
//! Design principles:
//! - All audio is interleaved stereo `f32`
//! - Stages never block: without enough input they simply produce nothing
//! - Invalid parameter values are ignored, the previous value is kept
//! - The audio thread is controlled via message ring buffers, not shared state

mod error;
mod fifo;
mod filter;
mod pipe;
pub mod pipes;
mod shifter;
mod soundtouch;
mod source;

#[cfg(feature = "cpal_sink")]
mod device;

pub use error::{Error, Result};
pub use fifo::{SampleFifo, CHANNELS};
pub use filter::{StreamFilter, DEFAULT_CHUNK_FRAMES, DEFAULT_HISTORY_FRAMES};
pub use pipe::{Buffered, BufferedPipe, Pipe};
pub use pipes::{RateTransposer, Stretch, StretchSettings};
pub use shifter::{PitchShifter, Pull, ShifterHandle, ShifterMessage, DEFAULT_QUEUE_SIZE};
pub use soundtouch::{Controls, Route, SoundTouch};
pub use source::{BufferSource, SampleSource};

#[cfg(feature = "vorbis_src")]
pub use source::OggSource;

#[cfg(feature = "cpal_sink")]
pub use device::{CpalDevice, CpalOutput};
