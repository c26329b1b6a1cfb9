// Audio output devices with a monotonic output clock
//
// The scheduler does its start-time arithmetic against `current_time()`,
// so every output exposes a clock in seconds that never runs backwards,
// plus a way to place a buffer at an absolute position on that clock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::audio::codec::AudioBuffer;
use crate::audio::microphone::SendableStream;
use crate::audio::resample::LinearResampler;
use crate::error::{Result, VoiceError};

/// Identifier of one scheduled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId(pub u64);

/// Audio output with scheduled playback
pub trait AudioOutput: Send {
    /// Output clock in seconds
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `start_time` on the output clock
    fn schedule(&mut self, buffer: AudioBuffer, start_time: f64) -> Result<UnitId>;

    /// Silence a scheduled or playing unit
    fn stop_unit(&mut self, unit: UnitId);

    /// Units that finished playing since the last call
    fn take_ended(&mut self) -> Vec<UnitId>;

    /// Release the device
    fn close(&mut self) -> Result<()>;
}

struct Voice {
    id: UnitId,
    start_frame: u64,
    channels: Vec<Vec<f32>>,
}

impl Voice {
    /// Resample `buffer` onto the device timeline at `start_time`
    ///
    /// Both ends are rounded from absolute times, so a unit starting where
    /// the previous one ends shares its boundary frame exactly.
    fn resampled(id: UnitId, buffer: AudioBuffer, start_time: f64, device_rate: u32) -> Self {
        let from_rate = buffer.sample_rate();
        let start_time = start_time.max(0.0);
        let end_time = start_time + buffer.duration();
        let start_frame = (start_time * device_rate as f64).round() as u64;
        let end_frame = (end_time * device_rate as f64).round() as u64;
        let frames = end_frame.saturating_sub(start_frame) as usize;

        let channels = buffer
            .into_channels()
            .into_iter()
            .map(|ch| LinearResampler::resample_exact(&ch, from_rate, device_rate, frames))
            .collect();
        Self {
            id,
            start_frame,
            channels,
        }
    }

    fn len(&self) -> u64 {
        self.channels.first().map_or(0, Vec::len) as u64
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.len()
    }
}

/// Sample-clock mixer shared between the owner and the device callback
///
/// The clock is the number of frames rendered so far. Voices overlapping a
/// frame are summed and clipped.
pub(crate) struct Mixer {
    sample_rate: u32,
    frames_rendered: u64,
    voices: Vec<Voice>,
    ended: Vec<UnitId>,
}

impl Mixer {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            voices: Vec::new(),
            ended: Vec::new(),
        }
    }

    pub(crate) fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate.max(1) as f64
    }

    fn push(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    pub(crate) fn remove(&mut self, id: UnitId) {
        self.voices.retain(|v| v.id != id);
    }

    pub(crate) fn clear(&mut self) {
        self.voices.clear();
    }

    pub(crate) fn take_ended(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut self.ended)
    }

    /// Fill an interleaved output block and advance the clock
    pub(crate) fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let clock = self.frames_rendered + i as u64;
            for (c, sample) in frame.iter_mut().enumerate() {
                let mut sum = 0.0f32;
                for voice in &self.voices {
                    if clock < voice.start_frame || clock >= voice.end_frame() {
                        continue;
                    }
                    let source = &voice.channels[c.min(voice.channels.len() - 1)];
                    sum += source[(clock - voice.start_frame) as usize];
                }
                *sample = sum.clamp(-1.0, 1.0);
            }
        }

        self.frames_rendered += (out.len() / channels) as u64;
        let now = self.frames_rendered;
        let ended = &mut self.ended;
        self.voices.retain(|voice| {
            let done = voice.end_frame() <= now;
            if done {
                ended.push(voice.id);
            }
            !done
        });
    }
}

fn lock_mixer(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    // A panic in the audio callback must not take playback control down with it
    mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Speaker output through cpal
pub struct DeviceOutput {
    stream: Option<SendableStream>,
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    next_id: u64,
}

impl DeviceOutput {
    /// Open the default output device
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VoiceError::DeviceUnavailable("No output device available".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("Output config unavailable: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        info!(
            "Opening output {} ({}Hz, {} channels, {:?})",
            device.name().unwrap_or_default(),
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0)));
        let stream = match sample_format {
            SampleFormat::F32 => build_output_stream(&device, &config, &mixer, |s| s)?,
            SampleFormat::I16 => build_output_stream(&device, &config, &mixer, |s| {
                (s * 32767.0) as i16
            })?,
            other => {
                return Err(VoiceError::DeviceUnavailable(format!(
                    "Unsupported output sample format: {:?}",
                    other
                )))
            }
        };
        stream
            .play()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("Failed to start output: {}", e)))?;

        Ok(Self {
            stream: Some(SendableStream(stream)),
            mixer,
            sample_rate: config.sample_rate.0,
            next_id: 0,
        })
    }
}

fn build_output_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: &Arc<Mutex<Mixer>>,
    convert: F,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    F: Fn(f32) -> T + Send + 'static,
{
    let mixer = Arc::clone(mixer);
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                lock_mixer(&mixer).render(&mut scratch, channels);
                for (out, &sample) in data.iter_mut().zip(&scratch) {
                    *out = convert(sample);
                }
            },
            |err| error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| VoiceError::DeviceUnavailable(format!("Failed to open output stream: {}", e)))
}

impl AudioOutput for DeviceOutput {
    fn current_time(&self) -> f64 {
        lock_mixer(&self.mixer).current_time()
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_time: f64) -> Result<UnitId> {
        if self.stream.is_none() {
            return Err(VoiceError::DeviceUnavailable("output is closed".to_string()));
        }
        self.next_id += 1;
        let id = UnitId(self.next_id);
        // Resampling happens before taking the lock the device callback needs
        let voice = Voice::resampled(id, buffer, start_time, self.sample_rate);
        lock_mixer(&self.mixer).push(voice);
        Ok(id)
    }

    fn stop_unit(&mut self, unit: UnitId) {
        lock_mixer(&self.mixer).remove(unit);
    }

    fn take_ended(&mut self) -> Vec<UnitId> {
        lock_mixer(&self.mixer).take_ended()
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            lock_mixer(&self.mixer).clear();
            info!("Audio output closed");
        }
        Ok(())
    }
}

/// Output that keeps time without making sound
///
/// Used when playback is disabled; units "play" on the wall clock.
pub struct SilentOutput {
    origin: Instant,
    units: Vec<(UnitId, f64)>,
    next_id: u64,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            units: Vec::new(),
            next_id: 0,
        }
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for SilentOutput {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_time: f64) -> Result<UnitId> {
        self.next_id += 1;
        let id = UnitId(self.next_id);
        self.units.push((id, start_time + buffer.duration()));
        Ok(id)
    }

    fn stop_unit(&mut self, unit: UnitId) {
        self.units.retain(|(id, _)| *id != unit);
    }

    fn take_ended(&mut self) -> Vec<UnitId> {
        let now = self.current_time();
        let (ended, pending): (Vec<_>, Vec<_>) =
            self.units.drain(..).partition(|(_, end)| *end <= now);
        self.units = pending;
        ended.into_iter().map(|(id, _)| id).collect()
    }

    fn close(&mut self) -> Result<()> {
        debug!("Silent output closed with {} units pending", self.units.len());
        self.units.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(sample_rate: u32, samples: Vec<f32>) -> AudioBuffer {
        AudioBuffer::new(sample_rate, vec![samples])
    }

    fn add(mixer: &mut Mixer, id: u64, buffer: AudioBuffer, start_time: f64) {
        let voice = Voice::resampled(UnitId(id), buffer, start_time, mixer.sample_rate);
        mixer.push(voice);
    }

    /// Schedule two 100 ms units back to back the way the scheduler does and
    /// return the frames rendered over their combined span
    fn render_abutting_units(device_rate: u32) -> Vec<f32> {
        let mut mixer = Mixer::new(device_rate);
        let first = mono(24000, vec![0.5; 2400]);
        let second = mono(24000, vec![0.5; 2400]);
        let boundary = first.duration();
        let end = boundary + second.duration();
        add(&mut mixer, 1, first, 0.0);
        add(&mut mixer, 2, second, boundary);

        let span = (end * device_rate as f64).round() as usize;
        let mut out = vec![0.0; span + 10];
        mixer.render(&mut out, 1);
        assert!(out[span..].iter().all(|&s| s == 0.0), "units overran their span");
        out.truncate(span);
        out
    }

    #[test]
    fn test_mixer_clock_advances_with_rendered_frames() {
        let mut mixer = Mixer::new(100);
        let mut block = vec![0.0; 50 * 2];
        mixer.render(&mut block, 2);
        assert!((mixer.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_mixer_places_back_to_back_units_without_gap() {
        let mut mixer = Mixer::new(10);
        add(&mut mixer, 1, mono(10, vec![0.1; 5]), 0.2);
        add(&mut mixer, 2, mono(10, vec![0.2; 5]), 0.7);

        let mut out = vec![0.0; 15];
        mixer.render(&mut out, 1);

        assert_eq!(&out[..2], &[0.0, 0.0]);
        assert!(out[2..7].iter().all(|&s| s == 0.1));
        assert!(out[7..12].iter().all(|&s| s == 0.2));
        assert!(out[12..].iter().all(|&s| s == 0.0));
        assert_eq!(mixer.take_ended(), vec![UnitId(1), UnitId(2)]);
    }

    #[test]
    fn test_mixer_duplicates_mono_to_all_channels_and_clips() {
        let mut mixer = Mixer::new(10);
        add(&mut mixer, 1, mono(10, vec![0.8; 2]), 0.0);
        add(&mut mixer, 2, mono(10, vec![0.8; 2]), 0.0);

        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mixer_resamples_to_device_rate() {
        let mut mixer = Mixer::new(20);
        add(&mut mixer, 1, mono(10, vec![0.5; 10]), 0.0);

        let mut out = vec![0.0; 30];
        mixer.render(&mut out, 1);
        let audible = out.iter().filter(|&&s| s > 0.0).count();
        assert_eq!(audible, 20);
        assert!(out[..20].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_abutting_units_leave_no_gap_at_48k() {
        let out = render_abutting_units(48000);
        assert_eq!(out.len(), 9600);
        let silent: Vec<usize> = (0..out.len()).filter(|&i| out[i] == 0.0).collect();
        assert!(silent.is_empty(), "silent frames at {:?}", silent);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6), "units overlapped");
    }

    #[test]
    fn test_abutting_units_leave_no_gap_at_44k1() {
        let out = render_abutting_units(44100);
        assert_eq!(out.len(), 8820);
        let silent: Vec<usize> = (0..out.len()).filter(|&i| out[i] == 0.0).collect();
        assert!(silent.is_empty(), "silent frames at {:?}", silent);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6), "units overlapped");
    }

    #[test]
    fn test_mixer_remove_silences_unit() {
        let mut mixer = Mixer::new(10);
        add(&mut mixer, 7, mono(10, vec![0.5; 10]), 0.0);
        mixer.remove(UnitId(7));

        let mut out = vec![0.0; 10];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(mixer.take_ended().is_empty());
    }

    #[test]
    fn test_silent_output_reports_ended_units() {
        let mut output = SilentOutput::new();
        let now = output.current_time();
        let past = output.schedule(mono(10, vec![0.0; 1]), now - 10.0).unwrap();
        let future = output.schedule(mono(10, vec![0.0; 10]), now + 60.0).unwrap();

        assert_eq!(output.take_ended(), vec![past]);
        output.stop_unit(future);
        assert!(output.take_ended().is_empty());
        assert!(output.close().is_ok());
    }
}
