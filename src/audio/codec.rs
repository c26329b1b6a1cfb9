//! PCM codec
//!
//! Converts between normalized f32 samples, 16-bit little-endian PCM bytes
//! and the base64 text the live channel carries.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};

/// Scale between normalized samples and 16-bit integers.
pub const PCM_SCALE: f32 = 32768.0;

/// Base64 text of a binary audio buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedPayload(String);

impl EncodedPayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.0)
            .map_err(|e| VoiceError::MalformedPayload(format!("invalid base64: {}", e)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EncodedPayload {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Decoded audio, one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }
}

/// Encode normalized samples as base64 16-bit LE PCM.
///
/// Samples are scaled by 32768 and cast to `i16`; the cast truncates toward
/// zero and saturates, so 1.0 lands on `i16::MAX` and NaN on zero.
pub fn encode_frame(samples: &[f32]) -> EncodedPayload {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&((sample * PCM_SCALE) as i16).to_le_bytes());
    }
    EncodedPayload::from_bytes(&bytes)
}

/// Decode base64 16-bit LE PCM into a per-channel buffer.
pub fn decode_frame(payload: &EncodedPayload, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    if channels == 0 {
        return Err(VoiceError::MalformedPayload(
            "channel count must be at least 1".to_string(),
        ));
    }
    if sample_rate == 0 {
        return Err(VoiceError::MalformedPayload(
            "sample rate must be positive".to_string(),
        ));
    }

    let bytes = payload.to_bytes()?;
    let channels = channels as usize;
    let stride = 2 * channels;
    if bytes.len() % stride != 0 {
        return Err(VoiceError::MalformedPayload(format!(
            "{} bytes is not a multiple of {}",
            bytes.len(),
            stride
        )));
    }

    let frame_count = bytes.len() / stride;
    let mut data = vec![Vec::with_capacity(frame_count); channels];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        data[i % channels].push(f32::from(sample) / PCM_SCALE);
    }

    Ok(AudioBuffer::new(sample_rate, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(samples: &[i16]) -> EncodedPayload {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        EncodedPayload::from_bytes(&bytes)
    }

    #[test]
    fn test_encode_scales_and_packs_little_endian() {
        let payload = encode_frame(&[0.0, 0.5, -0.5, -1.0]);
        let bytes = payload.to_bytes().unwrap();
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![0, 16384, -16384, -32768]);
    }

    #[test]
    fn test_encode_truncates_toward_zero() {
        // 0.00004 * 32768 = 1.31 -> 1, -0.00004 * 32768 = -1.31 -> -1
        let bytes = encode_frame(&[0.00004, -0.00004]).to_bytes().unwrap();
        assert_eq!(bytes, vec![1, 0, 0xff, 0xff]);
    }

    #[test]
    fn test_encode_out_of_range_saturates() {
        let bytes = encode_frame(&[1.0, 2.5, -3.0, f32::NAN]).to_bytes().unwrap();
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![i16::MAX, i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn test_encode_empty_frame() {
        assert_eq!(encode_frame(&[]).as_str(), "");
    }

    #[test]
    fn test_decode_deinterleaves_stereo() {
        let buffer = decode_frame(&raw(&[100, -100, 200, -200, 300, -300]), 24000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frame_count(), 3);
        assert_eq!(
            buffer.channel(0).unwrap(),
            &[100.0 / PCM_SCALE, 200.0 / PCM_SCALE, 300.0 / PCM_SCALE]
        );
        assert_eq!(
            buffer.channel(1).unwrap(),
            &[-100.0 / PCM_SCALE, -200.0 / PCM_SCALE, -300.0 / PCM_SCALE]
        );
    }

    #[test]
    fn test_decode_duration() {
        let buffer = decode_frame(&raw(&[0; 24000]), 24000, 1).unwrap();
        assert!((buffer.duration() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decode_rejects_odd_byte_count() {
        let payload = EncodedPayload::from_bytes(&[1, 2, 3]);
        assert!(matches!(
            decode_frame(&payload, 24000, 1),
            Err(VoiceError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_partial_stereo_frame() {
        // 6 bytes = 3 samples, not a whole number of stereo frames
        let payload = raw(&[1, 2, 3]);
        assert!(matches!(
            decode_frame(&payload, 24000, 2),
            Err(VoiceError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let payload = EncodedPayload::from("not base64!!".to_string());
        assert!(matches!(
            decode_frame(&payload, 24000, 1),
            Err(VoiceError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_zero_channels() {
        assert!(decode_frame(&raw(&[1, 2]), 24000, 0).is_err());
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let samples: Vec<f32> = (0..=200).map(|i| -1.0 + i as f32 / 100.0).collect();
        let decoded = decode_frame(&encode_frame(&samples), 16000, 1).unwrap();
        for (original, restored) in samples.iter().zip(decoded.channel(0).unwrap()) {
            assert!(
                (original - restored).abs() <= 1.0 / PCM_SCALE,
                "{} decoded as {}",
                original,
                restored
            );
        }
    }
}
