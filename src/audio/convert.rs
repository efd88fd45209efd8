//! Normalization of raw backend frames to canonical PCM
//! (16 kHz, mono, 16-bit signed).

use crate::error::CaptureError;

use super::backend::{AudioFrame, RawAudioFrame, SampleData};

/// Canonical sample rate expected by the recognizer.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Convert a raw frame to canonical PCM.
///
/// Float samples are clamped to [-1, 1] and scaled to i16 full scale.
/// Stereo is summed to mono with clipping; higher channel counts and
/// sample rates that are not an integer multiple of 16 kHz are rejected.
pub fn normalize(frame: RawAudioFrame) -> Result<AudioFrame, CaptureError> {
    let samples: Vec<i16> = match frame.samples {
        SampleData::I16(v) => v,
        SampleData::F32(v) => v
            .into_iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect(),
    };

    let mono = match frame.channels {
        1 => samples,
        2 => stereo_to_mono(&samples),
        other => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "unsupported channel count: {}",
                other
            )))
        }
    };

    let pcm = if frame.sample_rate == TARGET_SAMPLE_RATE {
        mono
    } else if frame.sample_rate % TARGET_SAMPLE_RATE == 0 {
        decimate(&mono, (frame.sample_rate / TARGET_SAMPLE_RATE) as usize)
    } else {
        return Err(CaptureError::UnsupportedFormat(format!(
            "sample rate {} Hz is not a multiple of {} Hz",
            frame.sample_rate, TARGET_SAMPLE_RATE
        )));
    };

    Ok(AudioFrame {
        source: frame.source,
        pcm,
        timestamp_ms: frame.timestamp_ms,
    })
}

/// Sum left and right channels with clipping.
fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    let mut mono = Vec::with_capacity(samples.len() / 2);
    for chunk in samples.chunks_exact(2) {
        let sum = chunk[0] as i32 + chunk[1] as i32;
        mono.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }
    mono
}

/// Downsample by decimation: take every Nth sample.
fn decimate(samples: &[i16], ratio: usize) -> Vec<i16> {
    samples.iter().step_by(ratio).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StreamSource;

    fn raw(samples: SampleData, sample_rate: u32, channels: u16) -> RawAudioFrame {
        RawAudioFrame {
            source: StreamSource::Microphone,
            samples,
            sample_rate,
            channels,
            timestamp_ms: 42,
        }
    }

    #[test]
    fn float_samples_are_clamped_and_scaled() {
        let frame = raw(SampleData::F32(vec![0.0, 1.0, -1.0, 1.5, -2.0]), 16000, 1);
        let out = normalize(frame).unwrap();
        assert_eq!(out.pcm[0], 0);
        assert_eq!(out.pcm[1], i16::MAX);
        assert_eq!(out.pcm[2], -i16::MAX);
        // Out-of-range floats clamp to full scale instead of wrapping
        assert_eq!(out.pcm[3], i16::MAX);
        assert_eq!(out.pcm[4], -i16::MAX);
        assert_eq!(out.timestamp_ms, 42);
    }

    #[test]
    fn stereo_is_summed_with_clipping() {
        let frame = raw(
            SampleData::I16(vec![100, 50, i16::MAX - 10, 200]),
            16000,
            2,
        );
        let out = normalize(frame).unwrap();
        assert_eq!(out.pcm, vec![150, i16::MAX]);
    }

    #[test]
    fn forty_eight_khz_is_decimated_by_three() {
        let samples: Vec<i16> = (0..48).collect();
        let frame = raw(SampleData::I16(samples), 48000, 1);
        let out = normalize(frame).unwrap();
        assert_eq!(out.pcm.len(), 16);
        assert_eq!(out.pcm[0], 0);
        assert_eq!(out.pcm[1], 3);
    }

    #[test]
    fn non_integer_ratio_is_rejected() {
        let frame = raw(SampleData::I16(vec![0; 100]), 44100, 1);
        assert!(matches!(
            normalize(frame),
            Err(CaptureError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn surround_layouts_are_rejected() {
        let frame = raw(SampleData::I16(vec![0; 6]), 16000, 6);
        assert!(matches!(
            normalize(frame),
            Err(CaptureError::UnsupportedFormat(_))
        ));
    }
}
