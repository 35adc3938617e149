//! Error types.
//!
//! Running out of input is not an error anywhere in this crate: pipes return
//! without producing output and [`StreamFilter::extract`](crate::StreamFilter::extract)
//! reports fewer (eventually zero) frames. Invalid parameter values are
//! ignored and the previous value is kept.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Positions can only move backward
    #[error("cannot seek forward to frame {requested} (current position is {current})")]
    SeekForward { requested: u64, current: u64 },

    /// The requested frame has already been dropped from the history buffer
    #[error("frame {requested} falls outside of the history buffer (oldest retained frame is {oldest})")]
    SeekOutsideHistory { requested: u64, oldest: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "vorbis_src")]
    #[error("vorbis decoding failed: {0}")]
    Vorbis(#[from] lewton::VorbisError),

    #[cfg(feature = "cpal_sink")]
    #[error("no audio output device available")]
    NoOutputDevice,

    #[cfg(feature = "cpal_sink")]
    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[cfg(feature = "cpal_sink")]
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal_sink")]
    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal_sink")]
    #[error("failed to query output device: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal_sink")]
    #[error("audio stream thread exited before the stream started")]
    StreamThread,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_errors_display_positions() {
        let err = Error::SeekForward { requested: 10, current: 4 };
        assert_eq!(err.to_string(), "cannot seek forward to frame 10 (current position is 4)");

        let err = Error::SeekOutsideHistory { requested: 3, oldest: 7 };
        assert!(err.to_string().contains("oldest retained frame is 7"));
    }
}
