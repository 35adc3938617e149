//! Growable FIFO of interleaved stereo frames.
//!
//! The backing storage is exposed directly so that pipes can read and write
//! in place: reserve a region with [`SampleFifo::reserve`], write into it,
//! then commit with [`SampleFifo::put`]. Consumers read through
//! [`SampleFifo::frames`] and discard with [`SampleFifo::receive`].

/// Samples per frame (left, right)
pub const CHANNELS: usize = 2;

/// A queue of interleaved stereo frames with a logical read/write window
///
/// The valid window starts at [`position`](Self::position) and holds
/// [`frame_count`](Self::frame_count) frames. Storage only grows when the
/// live window would not fit; otherwise the window is compacted to offset 0,
/// so the storage size tracks the peak live window rather than the stream
/// length.
#[derive(Clone, Debug, Default)]
pub struct SampleFifo {
    vector: Vec<f32>,
    position: usize,
    frame_count: usize,
}

impl SampleFifo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a FIFO with room for `frames` frames
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            vector: vec![0.0; frames * CHANNELS],
            position: 0,
            frame_count: 0,
        }
    }

    /// The whole backing storage, including the parts outside the valid window
    #[inline]
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    /// Index of the first valid frame, in frames
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of valid frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    /// Storage size in frames
    #[inline]
    pub fn capacity(&self) -> usize {
        self.vector.len() / CHANNELS
    }

    /// Offset of the first valid sample in [`vector`](Self::vector)
    #[inline]
    pub fn start_index(&self) -> usize {
        self.position * CHANNELS
    }

    /// Offset one past the last valid sample in [`vector`](Self::vector)
    #[inline]
    pub fn end_index(&self) -> usize {
        (self.position + self.frame_count) * CHANNELS
    }

    /// The valid frames, interleaved
    #[inline]
    pub fn frames(&self) -> &[f32] {
        &self.vector[self.start_index()..self.end_index()]
    }

    /// Make room for `num_frames` frames past the end of the valid window and
    /// return that region for in-place writing.
    ///
    /// Nothing becomes visible until the written frames are committed with
    /// [`put`](Self::put).
    pub fn reserve(&mut self, num_frames: usize) -> &mut [f32] {
        self.ensure_additional_capacity(num_frames);
        let end = self.end_index();
        &mut self.vector[end..end + num_frames * CHANNELS]
    }

    /// Commit `num_frames` frames that were written past the end of the valid window
    pub fn put(&mut self, num_frames: usize) {
        debug_assert!(
            (self.position + self.frame_count + num_frames) * CHANNELS <= self.vector.len(),
            "committed frames past the end of storage"
        );
        let room = self.capacity() - self.position - self.frame_count;
        self.frame_count += num_frames.min(room);
    }

    /// Append frames copied from `samples`, starting `position` frames into it
    ///
    /// `None` copies everything from `position` to the end of `samples`.
    pub fn put_samples(&mut self, samples: &[f32], position: usize, num_frames: Option<usize>) {
        let source_offset = (position * CHANNELS).min(samples.len());
        let available = (samples.len() - source_offset) / CHANNELS;
        let num_frames = num_frames.map_or(available, |n| n.min(available));
        let num_samples = num_frames * CHANNELS;

        self.reserve(num_frames)
            .copy_from_slice(&samples[source_offset..source_offset + num_samples]);
        self.frame_count += num_frames;
    }

    /// Append frames from another FIFO's valid window, starting `position`
    /// frames past its logical start. The other FIFO is left untouched.
    pub fn put_buffer(&mut self, other: &SampleFifo, position: usize, num_frames: Option<usize>) {
        let available = other.frame_count.saturating_sub(position);
        let num_frames = num_frames.map_or(available, |n| n.min(available));
        self.put_samples(&other.vector, other.position + position, Some(num_frames));
    }

    /// Discard frames from the front. `None`, or a count beyond what is
    /// available, discards everything. Returns the number of frames dropped.
    pub fn receive(&mut self, num_frames: Option<usize>) -> usize {
        let num_frames = num_frames.map_or(self.frame_count, |n| n.min(self.frame_count));
        self.frame_count -= num_frames;
        self.position += num_frames;
        num_frames
    }

    /// Copy up to `num_frames` frames from the front into `output`, then
    /// discard them. Returns the number of frames moved.
    pub fn receive_samples(&mut self, output: &mut [f32], num_frames: usize) -> usize {
        let num_frames = self.extract(output, 0, num_frames);
        self.receive(Some(num_frames))
    }

    /// Copy up to `num_frames` frames starting `position` frames past the
    /// logical start into `output` without discarding anything.
    /// Returns the number of frames copied.
    pub fn extract(&self, output: &mut [f32], position: usize, num_frames: usize) -> usize {
        let num_frames = num_frames
            .min(self.frame_count.saturating_sub(position))
            .min(output.len() / CHANNELS);
        let source_offset = self.start_index() + position * CHANNELS;
        let num_samples = num_frames * CHANNELS;
        output[..num_samples].copy_from_slice(&self.vector[source_offset..source_offset + num_samples]);
        num_frames
    }

    /// Make sure the storage can hold `num_frames` frames starting at offset 0
    ///
    /// Grows (moving the valid window to offset 0) when it can't, otherwise
    /// compacts in place.
    pub fn ensure_capacity(&mut self, num_frames: usize) {
        let min_length = num_frames * CHANNELS;
        if self.vector.len() < min_length {
            let mut vector = vec![0.0; min_length];
            let live = self.frame_count * CHANNELS;
            vector[..live].copy_from_slice(self.frames());
            self.vector = vector;
            self.position = 0;
        } else {
            self.rewind();
        }
    }

    /// Make sure `num_frames` more frames fit after the current valid window
    pub fn ensure_additional_capacity(&mut self, num_frames: usize) {
        self.ensure_capacity(self.frame_count + num_frames);
    }

    /// Move the valid window down to offset 0 without reallocating
    pub fn rewind(&mut self) {
        if self.position > 0 {
            let range = self.start_index()..self.end_index();
            self.vector.copy_within(range, 0);
            self.position = 0;
        }
    }

    /// Drop all content. Storage is kept
    pub fn clear(&mut self) {
        self.frame_count = 0;
        self.position = 0;
    }
}
