use crate::calibration::calibrate;
use crate::capture::{append, CapturedSample, MeasurementColumns};
use crate::store::SessionStore;
use anyhow::{anyhow, Result};
use pendulum_config::{AppConfig, ControlConfig, MeasurementConfig};
use pendulum_control::{command_value, encode_command, Clock, PidController};
use pendulum_imu::types::OrientationSample;
use pendulum_imu::SampleSource;
use pendulum_link::ActuatorLink;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Attempts made for each persistence write while finalizing a session.
const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Calibrating,
    Running,
    Stopped,
}

/// Observable state of the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub session_id: Option<i64>,
    /// Mean pitch of the calibration window, once it has closed.
    pub zero_offset: Option<f32>,
}

/// Collaborators shared by the controller and its session task.
#[derive(Clone)]
struct Shared {
    source: Arc<dyn SampleSource>,
    store: Arc<dyn SessionStore>,
    link: Arc<dyn ActuatorLink>,
    clock: Arc<dyn Clock>,
    pid: Arc<Mutex<PidController>>,
    status: Arc<watch::Sender<SessionStatus>>,
    captured: Arc<watch::Sender<Vec<CapturedSample>>>,
}

struct ActiveSession {
    session_id: i64,
    cancel_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<Result<()>>,
}

/// Drives measurement sessions: calibration, capture, periodic actuation and
/// the final hand-off to the store.
///
/// `Idle -> Calibrating -> Running -> Stopped`. Each session runs as one task
/// owning both the capture loop and the send loop, so stopping it tears both
/// down together.
pub struct SessionController {
    shared: Shared,
    control: ControlConfig,
    calibration_window: Duration,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(
        source: Arc<dyn SampleSource>,
        store: Arc<dyn SessionStore>,
        link: Arc<dyn ActuatorLink>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        let pid = PidController::from_config(&config.control, clock.clone());
        let (status, _) = watch::channel(SessionStatus {
            phase: SessionPhase::Idle,
            session_id: None,
            zero_offset: None,
        });
        let (captured, _) = watch::channel(Vec::new());

        Self {
            shared: Shared {
                source,
                store,
                link,
                clock,
                pid: Arc::new(Mutex::new(pid)),
                status: Arc::new(status),
                captured: Arc::new(captured),
            },
            control: config.control.clone(),
            calibration_window: config.session.calibration_window(),
            active: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    pub fn phase(&self) -> SessionPhase {
        self.status().phase
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Live view of the captured samples of the current session.
    pub fn subscribe_captured(&self) -> watch::Receiver<Vec<CapturedSample>> {
        self.shared.captured.subscribe()
    }

    /// Snapshot of the samples captured so far in the current session.
    pub fn captured(&self) -> Vec<CapturedSample> {
        self.shared.captured.borrow().clone()
    }

    /// Latest fused sample published by the source.
    pub fn latest_sample(&self) -> Option<OrientationSample> {
        *self.shared.source.subscribe().borrow()
    }

    /// The controller used by the send loop. Set point and terms may be
    /// changed while a session runs; changes apply on the next period.
    pub fn pid(&self) -> Arc<Mutex<PidController>> {
        self.shared.pid.clone()
    }

    /// Start a session, stopping the current one first if there is one.
    /// Returns the new session id.
    pub async fn start(&mut self, config: MeasurementConfig, experiment_id: i64) -> Result<i64> {
        if self.active.is_some() {
            info!("Stopping running session before starting a new one");
            if let Err(e) = self.stop().await {
                warn!(?e, "Previous session did not finalize cleanly");
            }
        }

        let session_id = self
            .shared
            .store
            .create_session(experiment_id, self.shared.clock.now_ms())?;

        self.shared.captured.send_replace(Vec::new());
        lock_pid(&self.shared.pid).reset();
        self.shared.status.send_replace(SessionStatus {
            phase: SessionPhase::Calibrating,
            session_id: Some(session_id),
            zero_offset: None,
        });

        self.shared.source.enable();
        let samples = self.shared.source.subscribe();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(
            self.shared.clone(),
            session_id,
            config.clone(),
            self.control.clone(),
            self.calibration_window,
            samples,
            cancel_rx,
        ));

        info!(
            session_id,
            experiment_id,
            offset = config.offset,
            measurement_type = ?config.measurement_type,
            duration_ms = ?config.duration_ms,
            "Measurement session started"
        );

        self.active = Some(ActiveSession {
            session_id,
            cancel_tx,
            task,
        });
        Ok(session_id)
    }

    /// Stop the current session and wait until its data is persisted.
    ///
    /// A no-op when no session is active. Persistence errors are returned
    /// after the controller has reached `Stopped`. If the session task died,
    /// its end time and captured samples are flushed from here instead.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            debug!("Stop requested with no active session");
            return Ok(());
        };

        let _ = active.cancel_tx.send(true);
        match active.task.await {
            Ok(result) => result,
            Err(e) => {
                let session_id = active.session_id;
                error!(session_id, ?e, "Session task failed, finalizing from the controller");
                let failure = format!("Session {session_id} task failed: {e}");
                match finalize(&self.shared, session_id).await {
                    Ok(()) => Err(anyhow!(failure)),
                    Err(flush) => Err(flush.context(failure)),
                }
            }
        }
    }
}

fn lock_pid(pid: &Mutex<PidController>) -> std::sync::MutexGuard<'_, PidController> {
    pid.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender counts as cancellation too.
    let _ = cancel.wait_for(|&stop| stop).await;
}

/// One session from calibration to the final flush.
async fn run_session(
    shared: Shared,
    session_id: i64,
    config: MeasurementConfig,
    control: ControlConfig,
    calibration_window: Duration,
    mut samples: watch::Receiver<Option<OrientationSample>>,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    let zero_offset = tokio::select! {
        zero = calibrate(&mut samples, calibration_window) => Some(zero),
        _ = cancelled(&mut cancel) => None,
    };

    match zero_offset {
        Some(zero_offset) => {
            info!(session_id, zero_offset, "Calibration complete");
            shared.status.send_modify(|status| {
                status.phase = SessionPhase::Running;
                status.zero_offset = Some(zero_offset);
            });

            let capture = capture_loop(samples, zero_offset, config.offset, &shared.captured);
            let send = send_loop(
                shared.captured.subscribe(),
                shared.link.clone(),
                shared.pid.clone(),
                &control,
            );
            let deadline = async {
                match config.auto_stop_after() {
                    Some(duration) => tokio::time::sleep(duration).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = capture => warn!(session_id, "Sample source closed"),
                _ = send => {}
                _ = deadline => info!(session_id, "Measurement duration elapsed"),
                _ = cancelled(&mut cancel) => debug!(session_id, "Session stop requested"),
            }
        }
        None => info!(session_id, "Session stopped during calibration"),
    }

    finalize(&shared, session_id).await
}

/// Apply offsets to every new sample and append it to the captured sequence.
async fn capture_loop(
    mut samples: watch::Receiver<Option<OrientationSample>>,
    zero_offset: f32,
    offset: f32,
    captured: &watch::Sender<Vec<CapturedSample>>,
) {
    while samples.changed().await.is_ok() {
        let latest = *samples.borrow_and_update();
        let Some(sample) = latest else {
            continue;
        };
        let angle = sample.pitch_degrees - zero_offset - offset;
        captured.send_modify(|list| {
            let entry = append(list, angle, sample.sampling_interval_ms, sample.timestamp_ms);
            trace!(index = entry.discrete_index, angle, "Sample captured");
        });
    }
}

/// Every period, turn the latest captured angle into a command and send it.
async fn send_loop(
    captured: watch::Receiver<Vec<CapturedSample>>,
    link: Arc<dyn ActuatorLink>,
    pid: Arc<Mutex<PidController>>,
    control: &ControlConfig,
) {
    let mut ticker = tokio::time::interval(control.send_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let angle = captured.borrow().last().map(|s| s.angle);
        let value = command_value(control.source, control.gain, angle, &mut lock_pid(&pid));
        if let Some(value) = value {
            link.send(&encode_command(value));
        }
    }
}

/// Disable the source, record the end time and flush what was captured.
async fn finalize(shared: &Shared, session_id: i64) -> Result<()> {
    shared.source.disable();

    let end_time_ms = shared.clock.now_ms();
    let columns = MeasurementColumns::from_samples(&shared.captured.borrow());

    let mut result = persist("update session end time", session_id, || {
        shared.store.update_session_end_time(session_id, end_time_ms)
    })
    .await;

    if columns.is_empty() {
        debug!(session_id, "Nothing captured, no measurement saved");
    } else {
        let saved = persist("save measurement", session_id, || {
            shared.store.save_measurement(session_id, &columns)
        })
        .await;
        if saved.is_ok() {
            shared.captured.send_replace(Vec::new());
        }
        result = result.and(saved);
    }

    shared
        .status
        .send_modify(|status| status.phase = SessionPhase::Stopped);
    info!(session_id, samples = columns.len(), "Measurement session stopped");
    result
}

async fn persist(what: &str, session_id: i64, mut write: impl FnMut() -> Result<()>) -> Result<()> {
    let mut attempt = 1;
    loop {
        match write() {
            Ok(()) => return Ok(()),
            Err(e) if attempt < PERSIST_ATTEMPTS => {
                warn!(session_id, attempt, ?e, "Failed to {what}, retrying");
                attempt += 1;
                tokio::time::sleep(PERSIST_RETRY_DELAY).await;
            }
            Err(e) => {
                error!(session_id, ?e, "Failed to {what}");
                return Err(e.context(format!("Failed to {what} for session {session_id}")));
            }
        }
    }
}
