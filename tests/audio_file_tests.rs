// Integration tests for WAV input
//
// These tests write WAV fixtures into a temp dir, read them back, and stream
// them through the capture pipeline the way `talk --wav` does.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use meld_voice::audio::{
    decode_frame, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioSource,
    CapturePipeline, CaptureSettings,
};
use tempfile::TempDir;

fn write_fixture(dir: &TempDir, name: &str, sample_rate: u32, channels: u16, frames: usize) -> PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames * channels as usize {
        let sample = if i % 2 == 0 { 8192i16 } else { -8192 };
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
    path
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_audio_file_metadata() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_fixture(&dir, "stereo.wav", 48000, 2, 24000);

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 48000);
    assert!((audio.duration_seconds - 0.5).abs() < 1e-9);
    assert!(audio.path.contains("stereo.wav"));
    assert_eq!(&audio.samples[..2], &[0.25, -0.25]);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[tokio::test]
async fn test_wav_source_streams_through_capture_pipeline() -> Result<()> {
    let dir = TempDir::new()?;
    // 0.3 s of 16 kHz mono -> 4800 samples -> one 4096-sample frame
    let path = write_fixture(&dir, "speech.wav", 16000, 1, 4800);
    assert!(path_str(&path).ends_with("speech.wav"));

    let backend = AudioBackendFactory::create(
        &AudioSource::File(path),
        AudioBackendConfig {
            block_duration_ms: 10,
            queue_depth: 64,
            ..AudioBackendConfig::default()
        },
    );
    assert_eq!(backend.name(), "wav file");

    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    let mut capture = CapturePipeline::start(backend, CaptureSettings::default(), move |payload| {
        sink.lock().unwrap().push(payload)
    })
    .await?;

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(3);
    while frames.lock().unwrap().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    capture.stop()?;

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    let buffer = decode_frame(&frames[0], 16000, 1)?;
    assert_eq!(buffer.frame_count(), 4096);
    assert_eq!(buffer.channel(0).unwrap()[0], 0.25);

    Ok(())
}
