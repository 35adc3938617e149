//! Pull-driven streaming over a [`BufferedPipe`].
//!
//! [`StreamFilter::extract`] is what an audio callback calls: it pulls raw
//! frames from a [`SampleSource`] in fixed-size chunks, runs the pipe until
//! enough output exists, and copies out one block. A bounded tail of
//! already-delivered output is kept so the play position can be moved back
//! a little without reprocessing.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fifo::CHANNELS;
use crate::pipe::BufferedPipe;
use crate::source::SampleSource;

/// Delivered frames kept for backward seeks
pub const DEFAULT_HISTORY_FRAMES: usize = 22050;

/// Frames the input buffer is topped up to before each `process()`
pub const DEFAULT_CHUNK_FRAMES: usize = 16384;

pub struct StreamFilter<P, S> {
    pipe: P,
    source: S,

    history_frames: usize,
    chunk_frames: usize,

    /// Frames read from the source so far
    source_position: u64,
    /// Offset of the next frame to deliver within the pipe's output buffer;
    /// everything before it is history
    output_buffer_position: usize,
    /// Frames delivered so far
    position: u64,

    exhausted: bool,
}

impl<P: BufferedPipe, S: SampleSource> StreamFilter<P, S> {
    pub fn new(source: S, pipe: P) -> Self {
        Self {
            pipe,
            source,
            history_frames: DEFAULT_HISTORY_FRAMES,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            source_position: 0,
            output_buffer_position: 0,
            position: 0,
            exhausted: false,
        }
    }

    pub fn with_history_frames(mut self, frames: usize) -> Self {
        self.history_frames = frames;
        self
    }

    /// Zero is treated as one
    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }

    #[inline]
    pub fn pipe(&self) -> &P {
        &self.pipe
    }

    #[inline]
    pub fn pipe_mut(&mut self) -> &mut P {
        &mut self.pipe
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    pub fn history_frames(&self) -> usize {
        self.history_frames
    }

    #[inline]
    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// Delivered frames that are still retained
    #[inline]
    pub fn buffered_history(&self) -> usize {
        self.output_buffer_position
    }

    /// Frames delivered so far
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the play position back to `position`, replaying retained output
    ///
    /// Fails without changing anything if `position` is ahead of the current
    /// position or older than the retained history.
    pub fn set_position(&mut self, position: u64) -> Result<()> {
        if position > self.position {
            warn!(requested = position, current = self.position, "rejected forward seek");
            return Err(Error::SeekForward {
                requested: position,
                current: self.position,
            });
        }

        let back = self.position - position;
        let oldest = self.position - self.output_buffer_position as u64;
        if back > self.output_buffer_position as u64 {
            warn!(requested = position, oldest, "rejected seek outside of history");
            return Err(Error::SeekOutsideHistory {
                requested: position,
                oldest,
            });
        }

        self.output_buffer_position -= back as usize;
        self.position = position;
        debug!(position, "seeked back within history");
        Ok(())
    }

    /// Frames read from the source so far
    #[inline]
    pub fn source_position(&self) -> u64 {
        self.source_position
    }

    /// Hard seek: drop everything buffered and continue reading the source
    /// at `position`. The delivered-frame counter is left alone.
    pub fn set_source_position(&mut self, position: u64) {
        self.clear();
        self.source_position = position;
        debug!(position, "hard seek on source");
    }

    /// Drop all buffered audio, history and pipe carry state
    pub fn clear(&mut self) {
        self.pipe.clear();
        self.output_buffer_position = 0;
        self.exhausted = false;
    }

    /// Copy up to `num_frames` frames into `target`
    ///
    /// Returns the number of frames written. Less than `num_frames` means the
    /// source is running dry; 0 means it is exhausted.
    pub fn extract(&mut self, target: &mut [f32], num_frames: usize) -> usize {
        let num_frames = num_frames.min(target.len() / CHANNELS);
        self.fill_output_buffer(self.output_buffer_position + num_frames);

        let output = self.pipe.output_buffer();
        let num_frames = num_frames.min(output.frame_count().saturating_sub(self.output_buffer_position));
        output.extract(target, self.output_buffer_position, num_frames);

        let current = self.output_buffer_position + num_frames;
        self.output_buffer_position = current.min(self.history_frames);
        self.pipe
            .output_buffer_mut()
            .receive(Some(current.saturating_sub(self.history_frames)));

        self.position += num_frames as u64;
        num_frames
    }

    fn fill_output_buffer(&mut self, num_frames: usize) {
        while self.pipe.output_buffer().frame_count() < num_frames {
            // top up to a whole chunk; if a whole chunk is already waiting the
            // pipe needs more than that, so pull another one
            let wanted = match self.chunk_frames.saturating_sub(self.pipe.input_buffer().frame_count()) {
                0 => self.chunk_frames,
                n => n,
            };

            let got = self.fill_input_buffer(wanted);
            self.pipe.process();

            if got < wanted {
                if !self.exhausted {
                    debug!(source_position = self.source_position, "source exhausted");
                    self.exhausted = true;
                }
                break;
            }
        }
    }

    fn fill_input_buffer(&mut self, num_frames: usize) -> usize {
        let region = self.pipe.input_buffer_mut().reserve(num_frames);
        let got = self
            .source
            .extract(region, num_frames, self.source_position)
            .min(num_frames);
        self.pipe.input_buffer_mut().put(got);
        self.source_position += got as u64;
        got
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Buffered;
    use crate::pipes::RateTransposer;
    use crate::source::BufferSource;
    use crate::soundtouch::SoundTouch;

    fn ramp_source(frames: usize) -> BufferSource {
        BufferSource::from_interleaved((0..frames * 2).map(|i| i as f32).collect::<Vec<_>>())
    }

    fn drain<P: BufferedPipe, S: SampleSource>(filter: &mut StreamFilter<P, S>, block: usize) -> Vec<f32> {
        let mut out = Vec::new();
        let mut target = vec![0.0; block * 2];
        loop {
            let n = filter.extract(&mut target, block);
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&target[..n * 2]);
        }
    }

    #[test]
    fn unity_pipe_delivers_the_source_unchanged() {
        let source = ramp_source(50_000);
        let expected = source.samples().to_vec();
        let mut filter = StreamFilter::new(source, SoundTouch::new());

        assert_eq!(drain(&mut filter, 1024), expected);
        assert_eq!(filter.position(), 50_000);
        assert_eq!(filter.source_position(), 50_000);
    }

    #[test]
    fn exhaustion_shrinks_then_stops() {
        let mut filter = StreamFilter::new(ramp_source(2500), SoundTouch::new()).with_chunk_frames(1000);
        let mut target = vec![0.0; 2048];

        assert_eq!(filter.extract(&mut target, 1024), 1024);
        assert_eq!(filter.extract(&mut target, 1024), 1024);
        assert_eq!(filter.extract(&mut target, 1024), 452);
        assert_eq!(filter.extract(&mut target, 1024), 0);
        assert_eq!(filter.extract(&mut target, 1024), 0);
    }

    #[test]
    fn seek_back_replays_history() {
        let mut filter = StreamFilter::new(ramp_source(10_000), SoundTouch::new());
        let mut first = vec![0.0; 512];
        filter.extract(&mut first, 256);
        filter.extract(&mut vec![0.0; 512], 256);

        filter.set_position(0).unwrap();
        assert_eq!(filter.position(), 0);

        let mut replay = vec![0.0; 512];
        assert_eq!(filter.extract(&mut replay, 256), 256);
        assert_eq!(replay, first);
    }

    #[test]
    fn invalid_seeks_leave_state_alone() {
        let mut filter = StreamFilter::new(ramp_source(10_000), SoundTouch::new()).with_history_frames(100);
        let mut target = vec![0.0; 1000];
        filter.extract(&mut target, 500);
        assert_eq!(filter.buffered_history(), 100);

        assert!(matches!(
            filter.set_position(501),
            Err(Error::SeekForward { requested: 501, current: 500 })
        ));
        assert!(matches!(
            filter.set_position(399),
            Err(Error::SeekOutsideHistory { requested: 399, oldest: 400 })
        ));
        assert_eq!(filter.position(), 500);
        assert_eq!(filter.buffered_history(), 100);

        filter.set_position(400).unwrap();
        assert_eq!(filter.extract(&mut target, 1), 1);
        assert_eq!(&target[..2], &[800.0, 801.0]);
    }

    #[test]
    fn history_is_bounded() {
        let mut filter = StreamFilter::new(ramp_source(100_000), SoundTouch::new()).with_history_frames(1000);
        drain(&mut filter, 4096);
        assert_eq!(filter.buffered_history(), 1000);
        assert!(filter.pipe().output_buffer().frame_count() <= 1000);
    }

    #[test]
    fn hard_seek_restarts_from_the_source() {
        let mut filter = StreamFilter::new(ramp_source(10_000), SoundTouch::new());
        let mut target = vec![0.0; 200];
        filter.extract(&mut target, 100);

        filter.set_source_position(7000);
        assert_eq!(filter.buffered_history(), 0);
        assert_eq!(filter.extract(&mut target, 100), 100);
        assert_eq!(&target[..2], &[14_000.0, 14_001.0]);
        assert_eq!(filter.position(), 200);
    }

    #[test]
    fn small_chunks_still_feed_a_hungry_pipe() {
        let mut st = SoundTouch::new();
        st.set_tempo(0.8);
        let mut filter = StreamFilter::new(ramp_source(40_000), st).with_chunk_frames(256);

        let mut target = vec![0.0; 2048];
        assert_eq!(filter.extract(&mut target, 1024), 1024);
    }

    #[test]
    fn drives_a_single_buffered_pipe() {
        let pipe = Buffered::new(RateTransposer::new(2.0));
        let mut filter = StreamFilter::new(ramp_source(20_000), pipe).with_chunk_frames(4096);

        let produced = drain(&mut filter, 1000).len() / 2;
        assert!((produced as i64 - 10_000).abs() <= 2, "{}", produced);
    }
}
