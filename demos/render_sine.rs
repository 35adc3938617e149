//! Offline render: push a sine through a few pitch/tempo settings and report
//! what comes out.
//!
//! Run with: cargo run --example render_sine

use dasp_signal::Signal;
use tracing::info;

use pitchshift::{BufferSource, Controls, PitchShifter, Pull, ShifterMessage};

const SAMPLE_RATE: u32 = 44100;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let tone: Vec<f32> = dasp_signal::rate(SAMPLE_RATE as f64)
        .const_hz(440.0)
        .sine()
        .take(SAMPLE_RATE as usize * 2)
        .map(|s| s as f32 * 0.5)
        .collect();
    let source = BufferSource::from_mono(&tone);

    let settings = [
        ("unchanged", Controls::default()),
        ("octave up", Controls::default().with_pitch_octaves(1.0)),
        ("half speed", Controls::default().with_tempo(0.5)),
        ("tape 1.5x", Controls::default().with_rate(1.5)),
        ("fifth down, 20% faster", Controls::default().with_pitch_semitones(-7.0).with_tempo_change(20.0)),
    ];

    for (name, controls) in settings {
        let (mut shifter, mut handle) = PitchShifter::new(source.clone(), SAMPLE_RATE);
        handle
            .send(ShifterMessage::Reconfigure(controls))
            .map_err(|_| "control queue full")?;

        let mut block = vec![0.0; 2 * 1024];
        let mut frames = 0;
        let mut crossings = 0;
        let mut last = 0.0f32;

        while let Pull::Continue(n) = shifter.fill(&mut block) {
            for &s in block[..2 * n].iter().step_by(2) {
                if last < 0.0 && s >= 0.0 {
                    crossings += 1;
                }
                last = s;
            }
            frames += n;
        }

        let seconds = frames as f64 / SAMPLE_RATE as f64;
        info!(
            "{:>24}: {:.2}s, ~{:.0} Hz (effective rate {:.3}, effective tempo {:.3})",
            name,
            seconds,
            crossings as f64 / seconds,
            shifter.effective_rate(),
            shifter.effective_tempo(),
        );
    }

    Ok(())
}
