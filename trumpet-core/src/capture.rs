//! # Capture Session Module
//!
//! Owns the microphone for as long as the tuner or game screen is open.
//!
//! ## Architecture
//! - **Capture thread**: opens the CPAL stream, runs the [`PitchEstimator`]
//!   on every frame and publishes the result
//! - **Communication**: raw frames over a bounded crossbeam channel, results
//!   through a single most-recent-value [`PitchSlot`]
//! - **Startup**: [`CaptureSession::spawn`] returns at once; the caller polls
//!   the [`PendingCapture`] until the device has opened or failed
//! - **Shutdown**: [`CaptureSession::stop`] (or dropping the session) signals
//!   the thread and joins it, so the device is released before it returns

use crate::audio::{self, CaptureError};
use crate::pitch::{Analysis, EstimatorConfig, PitchEstimator, PitchSample};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, RecvError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Samples older than this read as "no pitch".
pub const STALE_AFTER: Duration = Duration::from_millis(250);

/// Raw frames buffered between the audio callback and the analysis loop.
const FRAME_QUEUE: usize = 8;

/// One published estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotReading {
    /// `None` when the last analysis found no confident pitch.
    pub sample: Option<PitchSample>,
    /// Increases by one per publish.
    pub seq: u64,
    pub published_at: Instant,
}

/// Single-slot holder for the freshest pitch estimate.
///
/// The producer overwrites; consumers copy. Neither side ever waits on the
/// other for longer than a copy.
#[derive(Debug, Clone, Default)]
pub struct PitchSlot {
    inner: Arc<Mutex<Option<SlotReading>>>,
}

impl PitchSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, sample: Option<PitchSample>) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let seq = guard.as_ref().map_or(0, |r| r.seq + 1);
        *guard = Some(SlotReading {
            sample,
            seq,
            published_at: Instant::now(),
        });
    }

    /// The last published reading, however old.
    pub fn latest(&self) -> Option<SlotReading> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The freshest sample if it was published within [`STALE_AFTER`] of `now`.
    pub fn current(&self, now: Instant) -> Option<PitchSample> {
        self.latest()
            .filter(|r| now.saturating_duration_since(r.published_at) <= STALE_AFTER)
            .and_then(|r| r.sample)
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Why the analysis loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    /// The frame sender went away (stream dropped).
    Disconnected,
}

/// Feeds frames into `estimator` and publishes every analysis tick to `slot`
/// until shutdown is signalled or the frame channel closes.
pub fn run_analysis_loop(
    frames: &Receiver<Vec<f32>>,
    shutdown: &Receiver<()>,
    estimator: &mut PitchEstimator,
    slot: &PitchSlot,
) -> LoopExit {
    loop {
        crossbeam_channel::select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => match estimator.push_samples(&frame) {
                    Analysis::Waiting => {}
                    Analysis::NoPitch => slot.publish(None),
                    Analysis::Detected(sample) => slot.publish(Some(sample)),
                },
                Err(_) => {
                    log::warn!("Audio frame channel closed");
                    return LoopExit::Disconnected;
                }
            },
            recv(shutdown) -> _ => {
                log::debug!("Capture thread received shutdown signal");
                return LoopExit::Shutdown;
            },
        }
    }
}

/// Live microphone capture feeding a [`PitchSlot`].
#[derive(Debug)]
pub struct CaptureSession {
    slot: PitchSlot,
    sample_rate: u32,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

/// A capture thread that is still opening its device.
///
/// Poll it from the UI tick; opening can wait on a permission prompt.
/// Dropping it before it is ready tells the thread to shut down as soon as
/// the device opens, without waiting for it.
#[derive(Debug)]
pub struct PendingCapture {
    slot: PitchSlot,
    shutdown_tx: Sender<()>,
    ready_rx: Receiver<Result<u32, CaptureError>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PendingCapture {
    /// Returns the outcome once the device has opened or failed; `None`
    /// while it is still opening.
    pub fn poll(&mut self) -> Option<Result<CaptureSession, CaptureError>> {
        match self.ready_rx.try_recv() {
            Ok(outcome) => Some(self.finish(Ok(outcome))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.finish(Err(RecvError))),
        }
    }

    fn finish(
        &mut self,
        outcome: Result<Result<u32, CaptureError>, RecvError>,
    ) -> Result<CaptureSession, CaptureError> {
        let handle = self.thread_handle.take();
        match outcome {
            Ok(Ok(sample_rate)) => {
                log::info!("Capture started at {sample_rate} Hz");
                Ok(CaptureSession {
                    slot: self.slot.clone(),
                    sample_rate,
                    shutdown_tx: self.shutdown_tx.clone(),
                    thread_handle: handle,
                })
            }
            Ok(Err(e)) => {
                log::error!("Capture failed to start: {e}");
                if let Some(handle) = handle {
                    let _ = handle.join();
                }
                Err(e)
            }
            Err(RecvError) => {
                if let Some(handle) = handle {
                    let _ = handle.join();
                }
                Err(CaptureError::WorkerExited)
            }
        }
    }
}

impl Drop for PendingCapture {
    fn drop(&mut self) {
        if self.thread_handle.take().is_some() {
            log::debug!("Abandoning capture start");
            let _ = self.shutdown_tx.try_send(());
        }
    }
}

/// Spawns the capture thread around whatever `open` starts.
///
/// `open` runs on the capture thread, so the stream never crosses threads.
fn spawn_worker<S, F>(config: EstimatorConfig, open: F) -> Result<PendingCapture, CaptureError>
where
    S: StreamTrait + 'static,
    F: FnOnce(Sender<Vec<f32>>) -> Result<(S, u32), CaptureError> + Send + 'static,
{
    let slot = PitchSlot::new();
    let worker_slot = slot.clone();
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32, CaptureError>>(1);

    let thread_handle = thread::Builder::new()
        .name("pitch-capture".into())
        .spawn(move || {
            log::debug!("Capture thread starting");
            let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Vec<f32>>(FRAME_QUEUE);
            let (stream, sample_rate) = match open(frame_tx) {
                Ok(started) => started,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(sample_rate));

            let mut estimator = PitchEstimator::new(EstimatorConfig {
                sample_rate,
                ..config
            });
            let exit = run_analysis_loop(&frame_rx, &shutdown_rx, &mut estimator, &worker_slot);
            log::debug!("Analysis loop finished: {exit:?}");

            if let Err(e) = stream.pause() {
                log::warn!("Error pausing stream: {e}");
            }
            drop(stream);
            worker_slot.clear();
            log::debug!("Capture thread finished");
        })?;

    Ok(PendingCapture {
        slot,
        shutdown_tx,
        ready_rx,
        thread_handle: Some(thread_handle),
    })
}

impl CaptureSession {
    /// Opens the default input device on a new capture thread and returns
    /// without waiting for it. The configured sample rate is replaced by the
    /// device's.
    ///
    /// # Returns
    /// * `Ok(pending)` - The thread is running; poll it for the device
    /// * `Err(e)` - The thread could not be spawned
    pub fn spawn(config: EstimatorConfig) -> Result<PendingCapture, CaptureError> {
        spawn_worker(config, audio::start_audio_capture)
    }

    /// Handle for reading the latest estimate; clones share the same slot.
    pub fn slot(&self) -> &PitchSlot {
        &self.slot
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Stops capture and releases the device. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        let _ = self.shutdown_tx.try_send(());
        if handle.join().is_err() {
            log::error!("Capture thread panicked");
        }
        log::info!("Capture stopped");
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
