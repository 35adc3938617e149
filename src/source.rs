//! Where raw frames come from.
//!
//! A [`SampleSource`] is random-access by frame position, so that a
//! [`StreamFilter`](crate::StreamFilter) can hard-seek it.

use std::sync::Arc;

use itertools::Itertools;

use crate::fifo::CHANNELS;

/// Supplies interleaved stereo frames on demand
pub trait SampleSource {
    /// Write up to `num_frames` frames, starting at frame `position` of the
    /// source, into `target`. Returns how many frames were written: fewer
    /// than requested at the end of the stream, never more.
    fn extract(&mut self, target: &mut [f32], num_frames: usize, position: u64) -> usize;
}

impl<F> SampleSource for F
where
    F: FnMut(&mut [f32], usize, u64) -> usize,
{
    #[inline]
    fn extract(&mut self, target: &mut [f32], num_frames: usize, position: u64) -> usize {
        self(target, num_frames, position)
    }
}

/// An in-memory source. Cloning is cheap, the samples are shared
#[derive(Clone, Debug, Default)]
pub struct BufferSource {
    samples: Arc<[f32]>,
}

impl BufferSource {
    /// Frames already interleaved as left, right, left, right, ...
    ///
    /// A trailing half frame is dropped.
    pub fn from_interleaved(samples: impl Into<Vec<f32>>) -> Self {
        let mut samples = samples.into();
        samples.truncate(samples.len() / CHANNELS * CHANNELS);
        Self {
            samples: samples.into(),
        }
    }

    /// Separate left and right channels. The longer channel is cut to the
    /// length of the shorter one.
    pub fn from_planar(left: &[f32], right: &[f32]) -> Self {
        let len = left.len().min(right.len());
        let samples: Vec<f32> = left[..len].iter().interleave(&right[..len]).copied().collect();
        Self {
            samples: samples.into(),
        }
    }

    /// A single channel played on both sides
    pub fn from_mono(samples: &[f32]) -> Self {
        let samples: Vec<f32> = samples.iter().flat_map(|&s| [s, s]).collect();
        Self {
            samples: samples.into(),
        }
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl SampleSource for BufferSource {
    fn extract(&mut self, target: &mut [f32], num_frames: usize, position: u64) -> usize {
        let start = usize::try_from(position).unwrap_or(usize::MAX).min(self.frame_count());
        let num_frames = num_frames
            .min(self.frame_count() - start)
            .min(target.len() / CHANNELS);

        let from = start * CHANNELS;
        let to = from + num_frames * CHANNELS;
        target[..num_frames * CHANNELS].copy_from_slice(&self.samples[from..to]);
        num_frames
    }
}

#[cfg(feature = "vorbis_src")]
pub use ogg::OggSource;

#[cfg(feature = "vorbis_src")]
mod ogg {
    use std::fs::File;
    use std::path::Path;

    use lewton::inside_ogg::OggStreamReader;

    use super::{BufferSource, SampleSource};
    use crate::error::Result;

    /// An Ogg/Vorbis file, decoded to memory up front
    ///
    /// Mono files play on both channels; files with more than two channels
    /// keep the first two.
    #[derive(Clone, Debug)]
    pub struct OggSource {
        buffer: BufferSource,
        sample_rate: u32,
    }

    impl OggSource {
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let f = File::open(path.as_ref())?;
            let mut srr = OggStreamReader::new(f)?;

            let channels = srr.ident_hdr.audio_channels.max(1) as usize;
            let sample_rate = srr.ident_hdr.audio_sample_rate;

            let mut data = Vec::new();
            while let Some(pck_samples) = srr.read_dec_packet_itl()? {
                for frame in pck_samples.chunks_exact(channels) {
                    let l = frame[0] as f32 / 32768.0;
                    let r = frame.get(1).map_or(l, |&s| s as f32 / 32768.0);
                    data.push(l);
                    data.push(r);
                }
            }

            let buffer = BufferSource::from_interleaved(data);
            tracing::debug!(
                path = %path.as_ref().display(),
                frames = buffer.frame_count(),
                sample_rate,
                channels,
                "decoded ogg file"
            );

            Ok(Self { buffer, sample_rate })
        }

        /// Sample rate the file was encoded at
        #[inline]
        pub fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        #[inline]
        pub fn frame_count(&self) -> usize {
            self.buffer.frame_count()
        }
    }

    impl SampleSource for OggSource {
        #[inline]
        fn extract(&mut self, target: &mut [f32], num_frames: usize, position: u64) -> usize {
            self.buffer.extract(target, num_frames, position)
        }
    }
}
