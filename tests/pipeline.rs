use approx::assert_relative_eq;
use dasp_signal::Signal;

use pitchshift::{
    BufferSource, Controls, Error, PitchShifter, Pull, SoundTouch, StreamFilter, StretchSettings,
};

const SAMPLE_RATE: f64 = 44100.0;

/// `seconds` of a sine at `hz`, quieter on the right.
fn sine(hz: f64, seconds: f64) -> BufferSource {
    let frames = (SAMPLE_RATE * seconds) as usize;
    let samples: Vec<f32> = dasp_signal::rate(SAMPLE_RATE)
        .const_hz(hz)
        .sine()
        .take(frames)
        .flat_map(|s| [s as f32 * 0.8, s as f32 * 0.4])
        .collect();
    BufferSource::from_interleaved(samples)
}

fn render(controls: Controls, source: BufferSource, block: usize) -> Vec<f32> {
    let mut st = SoundTouch::new();
    st.reconfigure(controls);
    let mut filter = StreamFilter::new(source, st);

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

/// Rising zero crossings of the left channel per second.
fn frequency(samples: &[f32]) -> f64 {
    let left: Vec<f32> = samples.iter().step_by(2).copied().collect();
    let rising = left.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
    rising as f64 * SAMPLE_RATE / left.len() as f64
}

#[test]
/// A 1 kHz sine at unity settings comes out bit-identical, whatever the block sizes.
fn unity_sine_is_untouched_in_any_chunking() {
    let source = sine(1000.0, 3.0);
    let expected = source.samples().to_vec();
    let mut filter = StreamFilter::new(source, SoundTouch::new());

    let blocks = [1, 7, 64, 333, 1024, 4096, 17];
    let mut out = Vec::with_capacity(expected.len());
    let mut target = vec![0.0; 4096 * 2];

    for block in blocks.iter().cycle() {
        let n = filter.extract(&mut target, *block);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&target[..n * 2]);
    }

    assert_eq!(out.len(), expected.len());
    assert_eq!(out, expected);
}

#[test]
/// Past the end of the source, blocks shrink and then stay at zero.
fn extraction_past_the_end_winds_down() {
    let mut st = SoundTouch::new();
    st.set_tempo(1.3);
    let mut filter = StreamFilter::new(sine(440.0, 1.0), st);

    let mut target = vec![0.0; 2000];
    let counts: Vec<usize> = (0..200).map(|_| filter.extract(&mut target, 1000)).collect();

    let first_short = counts.iter().position(|&n| n < 1000).unwrap();
    assert!(first_short > 0);
    for pair in counts[first_short..].windows(2) {
        assert!(pair[1] <= pair[0]);
    }
    assert_eq!(*counts.last().unwrap(), 0);
}

#[test]
fn tempo_changes_length_not_pitch() {
    let input_frames = SAMPLE_RATE * 4.0;

    for tempo in [0.5, 0.8, 1.25, 2.0] {
        let out = render(Controls::default().with_tempo(tempo), sine(500.0, 4.0), 1024);
        let frames = (out.len() / 2) as f64;

        assert_relative_eq!(frames, input_frames / tempo, max_relative = 0.05);
        assert_relative_eq!(frequency(&out), 500.0, max_relative = 0.03);
    }
}

#[test]
fn rate_changes_length_and_pitch() {
    let input_frames = SAMPLE_RATE * 4.0;

    for rate in [0.5, 2.0] {
        let out = render(Controls::default().with_rate(rate), sine(500.0, 4.0), 512);
        let frames = (out.len() / 2) as f64;

        assert!((frames - input_frames / rate).abs() <= 3.0, "rate {}: {} frames", rate, frames);
        assert_relative_eq!(frequency(&out), 500.0 * rate, max_relative = 0.03);
    }
}

#[test]
fn pitch_changes_pitch_not_length() {
    let input_frames = SAMPLE_RATE * 4.0;

    for semitones in [-12.0, 7.0, 12.0] {
        let controls = Controls::default().with_pitch_semitones(semitones);
        let ratio = controls.pitch;
        let out = render(controls, sine(500.0, 4.0), 1024);
        let frames = (out.len() / 2) as f64;

        assert_relative_eq!(frames, input_frames, max_relative = 0.05);
        assert_relative_eq!(frequency(&out), 500.0 * ratio, max_relative = 0.03);
    }
}

#[test]
/// Both seek strategies give the same tempo behaviour.
fn exhaustive_seek_matches_quick_seek_lengths() {
    let quick = SoundTouch::new();
    let exhaustive = SoundTouch::with_settings(StretchSettings::default().with_quick_seek(false));

    let mut lengths = Vec::new();
    for mut st in [quick, exhaustive] {
        st.set_tempo(0.75);
        let mut filter = StreamFilter::new(sine(300.0, 2.0), st);
        let mut target = vec![0.0; 2048];
        let mut total = 0;
        loop {
            let n = filter.extract(&mut target, 1024);
            if n == 0 {
                break;
            }
            total += n;
        }
        lengths.push(total);
    }

    let diff = (lengths[0] as i64 - lengths[1] as i64).abs();
    assert!(diff <= 1, "{:?}", lengths);
}

#[test]
fn parameters_can_change_mid_stream() {
    let (mut shifter, mut handle) = PitchShifter::new(sine(440.0, 3.0), SAMPLE_RATE as u32);
    let mut block = vec![0.0; 2 * 512];
    let mut produced = 0;

    let schedule = [
        Controls::default().with_rate(0.5),
        Controls::default().with_rate(2.0).with_tempo(0.9),
        Controls::default().with_pitch_octaves(-1.0),
        Controls::default(),
    ];

    for controls in schedule {
        handle.send(pitchshift::ShifterMessage::Reconfigure(controls)).unwrap();
        for _ in 0..40 {
            match shifter.fill(&mut block) {
                Pull::Continue(n) => produced += n,
                Pull::Pause => break,
            }
            assert!(block.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        }
    }

    assert!(produced > 0);
    assert_eq!(shifter.controls(), Controls::default());
}

#[test]
fn seeking_through_the_shifter() {
    let (mut shifter, _handle) = PitchShifter::new(sine(440.0, 1.0), SAMPLE_RATE as u32);
    let mut block = vec![0.0; 2 * 1000];
    shifter.fill(&mut block);
    let first = block.clone();
    shifter.fill(&mut block);

    assert!(matches!(shifter.set_position(5000), Err(Error::SeekForward { .. })));

    shifter.set_position(0).unwrap();
    shifter.fill(&mut block);
    assert_eq!(block, first);
    assert_eq!(shifter.position(), 1000);
}
