//! # Sound Effects Module
//!
//! Short synthesized cues for game events, played on the default output
//! device from a dedicated thread.
//!
//! ## Features
//! - Cues pre-rendered once per output sample rate
//! - Allocation-free mixing in the output callback
//! - Fire-and-forget triggering: a busy player drops cues instead of blocking

use crate::game::GameEvent;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use std::f32::consts::PI;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Cues that can sound at the same time; extra triggers are dropped.
const MAX_VOICES: usize = 8;

#[derive(Debug, Error)]
pub enum SfxError {
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("could not read the output configuration: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error("could not open the output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("could not start the output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("could not spawn the sound thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("sound thread exited before the stream started")]
    WorkerExited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Hit,
    Miss,
    LevelUp,
}

impl Cue {
    const ALL: [Cue; 3] = [Cue::Hit, Cue::Miss, Cue::LevelUp];

    pub fn for_event(event: &GameEvent) -> Option<Cue> {
        match event {
            GameEvent::Hit { .. } => Some(Cue::Hit),
            GameEvent::Missed { .. } => Some(Cue::Miss),
            GameEvent::LevelUp { .. } => Some(Cue::LevelUp),
            GameEvent::Spawned { .. } => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Cue::Hit => 0,
            Cue::Miss => 1,
            Cue::LevelUp => 2,
        }
    }
}

/// Sine tone with a fast exponential decay.
fn generate_click(sample_rate: f32, duration_ms: f32, frequency: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = ((duration_ms / 1000.0) * sample_rate) as usize;
    let phase_increment = 2.0 * PI * frequency / sample_rate;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / num_samples as f32;
            let envelope = (-t * 6.0).exp();
            (i as f32 * phase_increment).sin() * envelope * amplitude
        })
        .collect()
}

/// Renders `cue` at `sample_rate`.
pub fn synthesize(cue: Cue, sample_rate: f32) -> Vec<f32> {
    match cue {
        Cue::Hit => generate_click(sample_rate, 60.0, 1320.0, 0.35),
        Cue::Miss => generate_click(sample_rate, 140.0, 196.0, 0.3),
        Cue::LevelUp => [1046.5, 1318.5, 1568.0]
            .iter()
            .flat_map(|&f| generate_click(sample_rate, 80.0, f, 0.3))
            .collect(),
    }
}

/// Mixes triggered cues into a mono signal.
pub struct Mixer {
    bank: [Vec<f32>; 3],
    /// (cue index, playback position)
    voices: Vec<(usize, usize)>,
}

impl Mixer {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            bank: Cue::ALL.map(|cue| synthesize(cue, sample_rate)),
            voices: Vec::with_capacity(MAX_VOICES),
        }
    }

    pub fn trigger(&mut self, cue: Cue) {
        if self.voices.len() < MAX_VOICES {
            self.voices.push((cue.index(), 0));
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn next_sample(&mut self) -> f32 {
        let mut mixed = 0.0;
        for (cue, pos) in &mut self.voices {
            if let Some(s) = self.bank[*cue].get(*pos) {
                mixed += s;
            }
            *pos += 1;
        }
        let bank = &self.bank;
        self.voices.retain(|(cue, pos)| *pos < bank[*cue].len());
        mixed.clamp(-1.0, 1.0)
    }
}

/// Plays cues on the default output device.
#[derive(Debug)]
pub struct SfxPlayer {
    cue_tx: Sender<Cue>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SfxPlayer {
    /// Opens the default output device. Blocks until the stream runs or fails.
    pub fn start() -> Result<Self, SfxError> {
        let (cue_tx, cue_rx) = crossbeam_channel::bounded::<Cue>(16);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), SfxError>>(1);

        let thread_handle = thread::Builder::new()
            .name("sfx-output".into())
            .spawn(move || {
                let stream = match open_output(cue_rx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until asked to stop; the stream lives on this thread.
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    log::warn!("Error pausing output stream: {e}");
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                cue_tx,
                shutdown_tx,
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(SfxError::WorkerExited)
            }
        }
    }

    pub fn play(&self, cue: Cue) {
        if self.cue_tx.try_send(cue).is_err() {
            log::trace!("Dropped sound cue {cue:?}");
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.shutdown_tx.try_send(());
            if handle.join().is_err() {
                log::error!("Sound thread panicked");
            }
        }
    }
}

impl Drop for SfxPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_output(cue_rx: Receiver<Cue>) -> Result<cpal::Stream, SfxError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(SfxError::NoOutputDevice)?;
    let supported = device.default_output_config()?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    log::info!("Sound output: {sample_rate} Hz, {channels} channel(s), {format}");

    let mixer = Mixer::new(sample_rate as f32);
    let stream = match format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, mixer, cue_rx)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, mixer, cue_rx)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, mixer, cue_rx)?,
        other => return Err(SfxError::UnsupportedFormat(other)),
    };
    stream.play()?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut mixer: Mixer,
    cue_rx: Receiver<Cue>,
) -> Result<cpal::Stream, SfxError>
where
    T: SizedSample + FromSample<f32>,
{
    let err_fn = |err| log::error!("An error occurred on the output stream: {err}");
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            while let Ok(cue) = cue_rx.try_recv() {
                mixer.trigger(cue);
            }
            for frame in data.chunks_mut(channels.max(1)) {
                let value = T::from_sample(mixer.next_sample());
                frame.fill(value);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
