//! Procedural sound bank: every clip is rendered to 16-bit mono WAV bytes at
//! startup so the game ships without audio files.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::f32::consts::TAU;

pub const SAMPLE_RATE: u32 = 22_050;

/// Pitch the engine loop is rendered at; playback speed is relative to it.
pub const ENGINE_LOOP_BASE_HZ: f32 = 80.0;
/// Whole seconds, so the base tone and vibrato both close their cycles.
const ENGINE_LOOP_SECONDS: u32 = 1;
const ENGINE_VIBRATO_HZ: f32 = 8.0;
const ENGINE_VIBRATO_DEPTH_HZ: f32 = 15.0;
const ENGINE_DRIVE: f32 = 50.0;
const ENGINE_LOWPASS_HZ: f32 = 300.0;

const COIN_SECONDS: f32 = 0.3;
const COIN_SWEEP_SECONDS: f32 = 0.1;
const COIN_START_HZ: f32 = 880.0;
const COIN_END_HZ: f32 = 1_760.0;

const FUEL_SECONDS: f32 = 0.4;
const FUEL_STEP_SECONDS: f32 = 0.15;
const FUEL_NOTES_HZ: [f32; 3] = [440.0, 660.0, 880.0];

const CRASH_SECONDS: f32 = 0.5;
const CRASH_NOISE_DECAY: f32 = 0.1;
const CRASH_LOWPASS_HZ: f32 = 500.0;
const CRASH_NOISE_SEED: u64 = 0x51A7_C0DE_0BAD_F00D;

/// Gain the one-shot envelopes decay to by the end of each clip.
const ENVELOPE_FLOOR: f32 = 0.001;

/// Sawtooth through a soft-clip and a low-pass, with a baked-in vibrato.
/// Loops seamlessly.
pub fn engine_loop_samples(sample_rate: u32) -> Vec<f32> {
    let count = (sample_rate * ENGINE_LOOP_SECONDS) as usize;
    let rate = sample_rate as f32;
    let mut phase = 0.0_f32;
    let mut filter = OnePoleLowPass::new(ENGINE_LOWPASS_HZ, rate);
    let mut samples = Vec::with_capacity(count);

    for index in 0..count {
        let t = index as f32 / rate;
        let saw = phase * 2.0 - 1.0;
        samples.push(filter.apply(engine_drive_curve(saw)));

        let frequency =
            ENGINE_LOOP_BASE_HZ + ENGINE_VIBRATO_DEPTH_HZ * (TAU * ENGINE_VIBRATO_HZ * t).sin();
        phase = (phase + frequency / rate).fract();
    }
    samples
}

/// Rising sine chirp.
pub fn coin_samples(sample_rate: u32) -> Vec<f32> {
    render_tone(sample_rate, COIN_SECONDS, |t, phase| {
        let sweep = (t / COIN_SWEEP_SECONDS).min(1.0);
        let frequency = COIN_START_HZ + (COIN_END_HZ - COIN_START_HZ) * sweep;
        let sample = (TAU * phase).sin();
        (frequency, sample)
    })
}

/// Three-step square arpeggio.
pub fn fuel_samples(sample_rate: u32) -> Vec<f32> {
    render_tone(sample_rate, FUEL_SECONDS, |t, phase| {
        let step = ((t / FUEL_STEP_SECONDS) as usize).min(FUEL_NOTES_HZ.len() - 1);
        let sample = if phase < 0.5 { 1.0 } else { -1.0 };
        (FUEL_NOTES_HZ[step], sample)
    })
}

/// Low-passed noise burst.
pub fn crash_samples(sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let count = (rate * CRASH_SECONDS) as usize;
    let mut rng = Pcg32::seed_from_u64(CRASH_NOISE_SEED);
    let mut filter = OnePoleLowPass::new(CRASH_LOWPASS_HZ, rate);

    (0..count)
        .map(|index| {
            let noise = rng.random_range(-1.0_f32..1.0);
            let burst = (-(index as f32) / (count as f32 * CRASH_NOISE_DECAY)).exp();
            filter.apply(noise * burst) * decay_envelope(index as f32 / rate, CRASH_SECONDS)
        })
        .collect()
}

/// Wave-shaper used on the engine: gentle near zero, flattening towards the
/// peaks.
pub fn engine_drive_curve(x: f32) -> f32 {
    let degrees_20 = 20.0_f32.to_radians();
    ((3.0 + ENGINE_DRIVE) * x * degrees_20) / (std::f32::consts::PI + ENGINE_DRIVE * x.abs())
}

/// Exponential fade from 1 to `ENVELOPE_FLOOR` across `length_s`.
fn decay_envelope(t: f32, length_s: f32) -> f32 {
    ENVELOPE_FLOOR.powf((t / length_s).clamp(0.0, 1.0))
}

/// Runs a phase-accumulating oscillator. `voice` maps time and phase (in
/// cycles) to the next frequency and the current sample.
fn render_tone(
    sample_rate: u32,
    length_s: f32,
    mut voice: impl FnMut(f32, f32) -> (f32, f32),
) -> Vec<f32> {
    let rate = sample_rate as f32;
    let count = (rate * length_s) as usize;
    let mut phase = 0.0_f32;

    (0..count)
        .map(|index| {
            let t = index as f32 / rate;
            let (frequency, sample) = voice(t, phase);
            phase = (phase + frequency / rate).fract();
            sample * decay_envelope(t, length_s)
        })
        .collect()
}

struct OnePoleLowPass {
    alpha: f32,
    state: f32,
}

impl OnePoleLowPass {
    fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self {
            alpha: 1.0 - (-TAU * cutoff_hz / sample_rate).exp(),
            state: 0.0,
        }
    }

    fn apply(&mut self, input: f32) -> f32 {
        self.state += self.alpha * (input - self.state);
        self.state
    }
}

/// Wraps mono samples in a canonical 44-byte-header PCM WAV.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = (samples.len() * usize::from(block_align)).min(u32::MAX as usize - 36) as u32;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes());
    bytes.extend_from_slice(&CHANNELS.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn wav_header_describes_mono_pcm16() {
        let bytes = encode_wav_pcm16(&[0.0, 0.5, -0.5], SAMPLE_RATE);

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(read_u16(&bytes, 20), 1);
        assert_eq!(read_u16(&bytes, 22), 1);
        assert_eq!(read_u32(&bytes, 24), SAMPLE_RATE);
        assert_eq!(read_u32(&bytes, 28), SAMPLE_RATE * 2);
        assert_eq!(read_u16(&bytes, 32), 2);
        assert_eq!(read_u16(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(read_u32(&bytes, 40), 6);
        assert_eq!(read_u32(&bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(bytes.len(), 44 + 6);
    }

    #[test]
    fn out_of_range_samples_are_clipped() {
        let bytes = encode_wav_pcm16(&[4.0, -4.0], SAMPLE_RATE);
        assert_eq!(i16::from_le_bytes([bytes[44], bytes[45]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[46], bytes[47]]), -i16::MAX);
    }

    #[test]
    fn clips_have_their_rendered_lengths_and_stay_in_range() {
        let rate = SAMPLE_RATE as f32;
        for (samples, seconds) in [
            (engine_loop_samples(SAMPLE_RATE), ENGINE_LOOP_SECONDS as f32),
            (coin_samples(SAMPLE_RATE), COIN_SECONDS),
            (fuel_samples(SAMPLE_RATE), FUEL_SECONDS),
            (crash_samples(SAMPLE_RATE), CRASH_SECONDS),
        ] {
            assert_eq!(samples.len(), (rate * seconds) as usize);
            assert!(samples.iter().all(|sample| sample.is_finite() && sample.abs() <= 1.0));
            assert!(samples.iter().any(|sample| sample.abs() > 0.01));
        }
    }

    #[test]
    fn one_shots_fade_out() {
        for samples in [coin_samples(SAMPLE_RATE), fuel_samples(SAMPLE_RATE)] {
            let tail = &samples[samples.len() - 50..];
            assert!(tail.iter().all(|sample| sample.abs() < 0.01));
        }
    }

    #[test]
    fn crash_noise_is_reproducible() {
        assert_eq!(crash_samples(SAMPLE_RATE), crash_samples(SAMPLE_RATE));
    }

    #[test]
    fn drive_curve_is_odd_and_bounded() {
        assert_eq!(engine_drive_curve(0.0), 0.0);
        assert!((engine_drive_curve(0.7) + engine_drive_curve(-0.7)).abs() < 1e-6);
        assert!(engine_drive_curve(1.0) > engine_drive_curve(0.5));
        assert!(engine_drive_curve(1.0) < 0.4);
    }
}
