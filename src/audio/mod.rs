pub mod backend;
pub mod capture;
pub mod codec;
pub mod file;
pub mod microphone;
pub mod resample;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use capture::{CaptureHandle, CapturePipeline, CaptureSettings};
pub use codec::{decode_frame, encode_frame, AudioBuffer, EncodedPayload, PCM_SCALE};
pub use file::{AudioFile, WavFileBackend};
pub use microphone::{list_input_devices, MicrophoneBackend};
pub use resample::{downmix_to_mono, Framer, LinearResampler};
