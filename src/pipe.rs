//! Streaming pipe contracts.

use crate::fifo::SampleFifo;

/// A streaming transform stage
///
/// A stage does not own its buffers: whoever drives it decides which FIFO it
/// reads and which it writes, so the same stage can sit first or second in a
/// chain. Everything a stage keeps between calls (phase, overlap tails) is
/// internal carry state.
pub trait Pipe {
    /// Consume what is available in `input`, append results to `output`
    ///
    /// A stage that needs more input than is available returns without
    /// producing anything; the input is left for the next call.
    fn process(&mut self, input: &mut SampleFifo, output: &mut SampleFifo);

    /// Forget all carry state
    fn reset(&mut self);
}

/// Something with an input FIFO, an output FIFO and a `process()` step
/// between them. This is what [`StreamFilter`](crate::StreamFilter) drives.
pub trait BufferedPipe {
    fn input_buffer(&self) -> &SampleFifo;

    fn input_buffer_mut(&mut self) -> &mut SampleFifo;

    fn output_buffer(&self) -> &SampleFifo;

    fn output_buffer_mut(&mut self) -> &mut SampleFifo;

    fn process(&mut self);

    /// Clear both buffers and any carry state
    fn clear(&mut self);
}

/// A single [`Pipe`] with its own input and output buffers
#[derive(Clone, Debug, Default)]
pub struct Buffered<P> {
    pipe: P,
    input: SampleFifo,
    output: SampleFifo,
}

impl<P: Pipe> Buffered<P> {
    pub fn new(pipe: P) -> Self {
        Self {
            pipe,
            input: SampleFifo::new(),
            output: SampleFifo::new(),
        }
    }

    #[inline]
    pub fn pipe(&self) -> &P {
        &self.pipe
    }

    #[inline]
    pub fn pipe_mut(&mut self) -> &mut P {
        &mut self.pipe
    }

    pub fn into_inner(self) -> P {
        self.pipe
    }
}

impl<P: Pipe> BufferedPipe for Buffered<P> {
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
        self.pipe.process(&mut self.input, &mut self.output);
    }

    fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
        self.pipe.reset();
    }
}
