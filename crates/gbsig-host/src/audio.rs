use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use gbsig_core::audio_stream::AudioConsumer;

use crate::error::HostError;

/// Default output device and the format it asked for.
pub struct AudioOutput {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

#[inline]
fn apply_gain(sample: i16, gain: f32) -> i16 {
    (sample as f32 * gain) as i16
}

impl AudioOutput {
    pub fn open_default() -> Result<Self, HostError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(HostError::NoAudioDevice)?;
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        log::info!(
            "audio output: {} Hz, {} channels, {:?}",
            config.sample_rate.0,
            config.channels,
            sample_format
        );
        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Starts playback pulling frames from `consumer`. The returned stream
    /// stops when dropped.
    pub fn play(&self, mut consumer: AudioConsumer, volume: f32) -> Result<cpal::Stream, HostError> {
        let channels = self.config.channels as usize;
        let err_fn = |err| log::error!("cpal stream error: {err}");

        let stream = match self.sample_format {
            cpal::SampleFormat::I16 => self.device.build_output_stream(
                &self.config,
                move |data: &mut [i16], _| {
                    for frame in data.chunks_mut(channels) {
                        let (left, right) = consumer.pop_stereo();
                        frame[0] = apply_gain(left, volume);
                        if channels > 1 {
                            frame[1] = apply_gain(right, volume);
                        }
                    }
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::U16 => self.device.build_output_stream(
                &self.config,
                move |data: &mut [u16], _| {
                    for frame in data.chunks_mut(channels) {
                        let (left, right) = consumer.pop_stereo();
                        frame[0] = (apply_gain(left, volume) as i32 + 32768) as u16;
                        if channels > 1 {
                            frame[1] = (apply_gain(right, volume) as i32 + 32768) as u16;
                        }
                    }
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::F32 => self.device.build_output_stream(
                &self.config,
                move |data: &mut [f32], _| {
                    for frame in data.chunks_mut(channels) {
                        let (left, right) = consumer.pop_stereo();
                        frame[0] = left as f32 / 32768.0 * volume;
                        if channels > 1 {
                            frame[1] = right as f32 / 32768.0 * volume;
                        }
                    }
                },
                err_fn,
                None,
            )?,
            other => return Err(HostError::UnsupportedFormat(other)),
        };

        stream.play()?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_scales_toward_zero() {
        assert_eq!(apply_gain(1000, 0.5), 500);
        assert_eq!(apply_gain(-1000, 0.5), -500);
        assert_eq!(apply_gain(i16::MAX, 1.0), i16::MAX);
        assert_eq!(apply_gain(1234, 0.0), 0);
    }
}
