//! Play an Ogg/Vorbis file while sweeping its pitch.
//!
//! Run with: cargo run --example play_ogg --features cpal_sink,vorbis_src -- <file.ogg>

use std::thread::sleep;
use std::time::{Duration, Instant};

use pitchshift::{CpalDevice, OggSource, PitchShifter, ShifterMessage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let path = std::env::args().nth(1).ok_or("usage: play_ogg <file.ogg>")?;
    let source = OggSource::open(&path)?;
    let source_rate = source.sample_rate();

    let device = CpalDevice::default_output().ok_or("No audio device")?;
    println!("Playing {} on {} @ {}Hz", path, device.name(), device.sample_rate());

    let (mut shifter, mut handle) = PitchShifter::new(source, source_rate);
    // resampling to the device rate is just another rate change
    shifter.set_rate(source_rate as f64 / device.sample_rate() as f64);

    let output = shifter.connect(&device)?;

    let start = Instant::now();
    while !output.is_paused() {
        let elapsed = start.elapsed().as_secs_f64();

        // up to three semitones either way, tempo untouched
        let semitones = 3.0 * (elapsed * 0.25 * std::f64::consts::PI).sin();
        let _ = handle.send(ShifterMessage::SetPitchSemitones(semitones));

        sleep(Duration::from_millis(20));
    }

    println!("Done after {:.1}s", start.elapsed().as_secs_f64());
    output.disconnect();
    Ok(())
}
