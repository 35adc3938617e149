//! CPAL output devices.
//!
//! # Example: pick a device and play
//!
//! ```no_run
//! use pitchshift::{BufferSource, CpalDevice, PitchShifter};
//!
//! for (i, device) in CpalDevice::list_outputs().iter().enumerate() {
//!     println!("[{}] {} ({} Hz, {} ch)", i, device.name(), device.sample_rate(), device.channels());
//! }
//!
//! let device = CpalDevice::default_output().expect("no output device");
//! let source = BufferSource::from_mono(&vec![0.0; 48_000]);
//! let (shifter, _handle) = PitchShifter::new(source, device.sample_rate());
//! let output = shifter.connect(&device)?;
//! // ...
//! output.disconnect();
//! # Ok::<(), pitchshift::Error>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig, SupportedStreamConfig};

use crate::error::{Error, Result};
use crate::fifo::CHANNELS;
use crate::shifter::{PitchShifter, Pull};
use crate::source::SampleSource;

/// A discovered audio output device
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,

    name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalDevice {
    /// The system's default output device, if there is one
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        Self::from_device(device).ok()
    }

    /// Every output device that reports a usable default configuration
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(|device| Self::from_device(device).ok()).collect())
            .unwrap_or_default()
    }

    fn from_device(device: cpal::Device) -> Result<Self> {
        let config = device.default_output_config()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Ok(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            name,
            device,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Start an output stream that renders `shifter`
    ///
    /// The stream lives on its own thread until the returned [`CpalOutput`]
    /// is disconnected or dropped.
    pub fn connect<S>(&self, shifter: PitchShifter<S>) -> Result<CpalOutput>
    where
        S: SampleSource + Send + 'static,
    {
        let device = self.device.clone();
        let sample_format = self.config.sample_format();
        let stream_config = self.config.config();

        let paused = Arc::new(AtomicBool::new(false));
        let paused_clone = paused.clone();

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::spawn(move || {
            let stream = match build_stream(&device, sample_format, &stream_config, shifter, paused_clone)
                .and_then(|stream| {
                    stream.play()?;
                    Ok(stream)
                }) {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            // the stream plays until the output is disconnected or dropped
            let _ = stop_rx.recv();
            drop(stream);
        });

        ready_rx.recv().map_err(|_| Error::StreamThread)??;
        tracing::debug!(device = %self.name, sample_rate = self.sample_rate, "connected");

        Ok(CpalOutput {
            stop: stop_tx,
            paused,
            thread: Some(thread),
        })
    }
}

/// A running output stream. Dropping it stops playback
pub struct CpalOutput {
    stop: mpsc::Sender<()>,
    paused: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Whether the source has run out. A paused output plays silence
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Stop playback and wait for the stream to close
    pub fn disconnect(self) {
        drop(self);
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_stream<S>(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &StreamConfig,
    shifter: PitchShifter<S>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    S: SampleSource + Send + 'static,
{
    match sample_format {
        SampleFormat::F32 => build_typed(device, stream_config, shifter, paused, 0.0f32, |s| s),
        SampleFormat::I16 => build_typed(device, stream_config, shifter, paused, 0i16, |s| {
            (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
        }),
        SampleFormat::U16 => build_typed(device, stream_config, shifter, paused, u16::MAX / 2 + 1, |s| {
            ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16
        }),
        other => Err(Error::UnsupportedSampleFormat(format!("{:?}", other))),
    }
}

fn build_typed<S, T>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    mut shifter: PitchShifter<S>,
    paused: Arc<AtomicBool>,
    silence: T,
    convert: fn(f32) -> T,
) -> Result<cpal::Stream>
where
    S: SampleSource + Send + 'static,
    T: SizedSample + Send + 'static,
{
    let channels = stream_config.channels.max(1) as usize;
    // sized for a typical callback; grows if the host asks for more
    let mut block = vec![0.0f32; 4096 * CHANNELS];

    let stream = device.build_output_stream(
        stream_config,
        move |data: &mut [T], _| {
            if paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            let frames = data.len() / channels;
            if block.len() < frames * CHANNELS {
                block.resize(frames * CHANNELS, 0.0);
            }
            let block = &mut block[..frames * CHANNELS];

            if shifter.fill(block) == Pull::Pause {
                paused.store(true, Ordering::Relaxed);
            }

            for (out, frame) in data.chunks_mut(channels).zip(block.chunks_exact(CHANNELS)) {
                if channels == 1 {
                    out[0] = convert(0.5 * (frame[0] + frame[1]));
                    continue;
                }
                for (ch, sample) in out.iter_mut().enumerate() {
                    *sample = convert(frame[ch.min(CHANNELS - 1)]);
                }
            }
        },
        |err| tracing::error!(%err, "output stream error"),
        None,
    )?;

    Ok(stream)
}
