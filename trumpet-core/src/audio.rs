//! # Audio Capture Module
//!
//! Opens the default input device with CPAL and streams fixed-size mono
//! frames to the analysis thread.
//!
//! ## Features
//! - Default input device and its default configuration
//! - f32, i16 and u16 sample formats
//! - Multi-channel input downmixed to mono
//! - Non-blocking hand-off: frames are dropped rather than stalling the callback

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::Sender;
use thiserror::Error;

/// Number of mono samples per frame sent to the analysis thread.
///
/// Kept below the estimator window so analyses overlap by a hop.
pub const FRAME_SIZE: usize = 1024;

/// Why live capture could not start.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("could not read the input configuration: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported input sample format {0}")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error("could not open the microphone: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("could not start the microphone: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("could not spawn the capture thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("capture thread exited before the stream started")]
    WorkerExited,
}

/// Starts audio capture from the default input device.
///
/// The stream must stay on the calling thread; dropping it stops capture.
///
/// # Arguments
/// * `sender` - Channel sender for mono frames of [`FRAME_SIZE`] samples
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Running stream handle and its sample rate
/// * `Err(e)` - No device, unsupported format, or the stream failed to start
pub fn start_audio_capture(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;

    match device.name() {
        Ok(name) => log::info!("Using audio input device: {name}"),
        Err(e) => log::warn!("Using unnamed audio input device: {e}"),
    }

    let supported = device.default_input_config()?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    log::info!("Input config: {sample_rate} Hz, {channels} channel(s), {format}");

    let stream = match format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, sender)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, sender)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, sender)?,
        other => return Err(CaptureError::UnsupportedFormat(other)),
    };

    stream.play()?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sender: Sender<Vec<f32>>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_fn = |err| log::error!("An error occurred on the audio stream: {err}");

    // Accumulates mono samples across callbacks until a full frame is ready.
    let mut pending = Vec::with_capacity(FRAME_SIZE * 2);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            downmix_into(data, channels, &mut pending);
            while pending.len() >= FRAME_SIZE {
                let frame: Vec<f32> = pending.drain(..FRAME_SIZE).collect();
                // A full channel means the analysis thread is behind; drop the frame.
                let _ = sender.try_send(frame);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Averages interleaved frames of `channels` samples into `out`.
pub fn downmix_into<T>(data: &[T], channels: usize, out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    if channels == 1 {
        out.extend(data.iter().map(|s| s.to_sample::<f32>()));
        return;
    }
    out.extend(data.chunks_exact(channels).map(|frame| {
        frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
    }));
}
