//! # Measurement Manager Module
//!
//! Runs measurements off the caller's thread.
//!
//! ## Key Components
//! - `MeasurementManager`: command loop on a dedicated thread with its own Tokio runtime
//! - `MeasurementCommand`: Start/Stop/Abort requests from the UI (or CLI) thread
//! - One stop flag per session; at most one session runs at a time
//!
//! `Stop` finalises the session with what it has collected. `Abort` cancels the
//! session task outright: the camera is released, no outcome is produced.
//! Each session ends with exactly one of `Finished`, `Error` or `Aborted`.
//!
//! ## Why
//! The capture loop is async and paced by a timer. Keeping it on its own
//! runtime leaves the caller's event loop free to render progress.

use crate::camera::{run_measurement, FrameSource, MeasurementUpdate};
use crate::clock::TokioClock;
use crate::config::MeasurementConfig;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

pub enum MeasurementCommand {
    Start(Box<dyn FrameSource>),
    Stop,
    Abort,
}

impl fmt::Debug for MeasurementCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementCommand::Start(_) => write!(f, "Start(..)"),
            MeasurementCommand::Stop => write!(f, "Stop"),
            MeasurementCommand::Abort => write!(f, "Abort"),
        }
    }
}

pub struct MeasurementManager {
    config: MeasurementConfig,
    command_receiver: Receiver<MeasurementCommand>,
    update_sender: Sender<MeasurementUpdate>,
}

/// Handles the manager keeps for the session in flight
struct ActiveSession {
    should_stop: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Moved into each session task. Clears `running` and sends exactly one
/// terminal update however the task ends: outcome, error, cancellation or panic.
struct SessionTask {
    running: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    updates: Sender<MeasurementUpdate>,
    reported: bool,
}

impl SessionTask {
    fn report(mut self, update: MeasurementUpdate) {
        // Cleared first so a Start sent in reaction to the update is accepted
        self.running.store(false, Ordering::SeqCst);
        let _ = self.updates.send(update);
        self.reported = true;
    }
}

impl Drop for SessionTask {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if self.reported {
            return;
        }
        let update = if self.cancelled.load(Ordering::SeqCst) {
            log::info!("Measurement manager: session aborted");
            MeasurementUpdate::Aborted
        } else {
            log::error!("Measurement manager: session task ended without an outcome");
            MeasurementUpdate::Error("measurement task ended without an outcome".into())
        };
        let _ = self.updates.send(update);
    }
}

impl MeasurementManager {
    /// Returns the manager and a sender for issuing commands.
    pub fn new(
        config: MeasurementConfig,
        update_sender: Sender<MeasurementUpdate>,
    ) -> (Self, Sender<MeasurementCommand>) {
        let (command_sender, command_receiver) = unbounded();

        let manager = MeasurementManager {
            config,
            command_receiver,
            update_sender,
        };

        (manager, command_sender)
    }

    /// Process commands until the command channel closes.
    ///
    /// Call from a spawned thread; blocks. A session still running when the
    /// channel closes is cancelled and its camera released.
    pub fn run(self) {
        let rt = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Measurement manager: failed to create runtime: {}", e);
                let _ = self
                    .update_sender
                    .send(MeasurementUpdate::Error(format!("runtime unavailable: {}", e)));
                return;
            }
        };

        let running = Arc::new(AtomicBool::new(false));
        let mut active: Option<ActiveSession> = None;

        while let Ok(command) = self.command_receiver.recv() {
            match command {
                MeasurementCommand::Start(mut source) => {
                    if running.load(Ordering::SeqCst) {
                        log::warn!("Measurement manager: session already running, ignoring Start");
                        continue;
                    }
                    log::info!("Measurement manager: starting session");
                    running.store(true, Ordering::SeqCst);

                    let should_stop = Arc::new(AtomicBool::new(false));
                    let cancelled = Arc::new(AtomicBool::new(false));
                    let guard = SessionTask {
                        running: running.clone(),
                        cancelled: cancelled.clone(),
                        updates: self.update_sender.clone(),
                        reported: false,
                    };

                    let config = self.config.clone();
                    let stop = should_stop.clone();
                    let task = rt.spawn(async move {
                        let clock = TokioClock::new();
                        let result =
                            run_measurement(source.as_mut(), &config, &clock, &stop, &guard.updates)
                                .await;
                        match result {
                            Ok(outcome) => guard.report(MeasurementUpdate::Finished(outcome)),
                            Err(e) => {
                                log::error!("Measurement manager: {}", e);
                                guard.report(MeasurementUpdate::Error(e.to_string()));
                            }
                        }
                    });

                    active = Some(ActiveSession { should_stop, cancelled, task });
                }
                MeasurementCommand::Stop => {
                    log::info!("Measurement manager: stop requested");
                    match &active {
                        Some(session) => session.should_stop.store(true, Ordering::Relaxed),
                        None => log::debug!("Measurement manager: no session to stop"),
                    }
                }
                MeasurementCommand::Abort => match active.take() {
                    Some(session) if !session.task.is_finished() => {
                        log::info!("Measurement manager: aborting session");
                        session.cancelled.store(true, Ordering::SeqCst);
                        // Dropping the task's future drops its CameraGuard and
                        // its SessionTask, which sends Aborted unless an outcome
                        // was already reported.
                        session.task.abort();
                    }
                    _ => log::debug!("Measurement manager: no session to abort"),
                },
            }
        }

        log::info!("Measurement manager: command channel closed, shutting down");
        if let Some(session) = active {
            session.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::sampler::Frame;
    use crate::session::{FailureReason, SessionOutcome};
    use crate::synthetic::{SyntheticFingertip, SyntheticOptions};
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    type Spawned = (
        Sender<MeasurementCommand>,
        Receiver<MeasurementUpdate>,
        thread::JoinHandle<()>,
    );

    fn spawn_manager() -> Spawned {
        spawn_manager_with(MeasurementConfig::default())
    }

    fn spawn_manager_with(config: MeasurementConfig) -> Spawned {
        let (update_sender, update_receiver) = unbounded();
        let (manager, command_sender) = MeasurementManager::new(config, update_sender);
        let handle = thread::spawn(move || manager.run());
        (command_sender, update_receiver, handle)
    }

    fn denied_source() -> SyntheticFingertip {
        SyntheticFingertip::new(SyntheticOptions {
            fail_acquire: Some(SourceError::PermissionDenied),
            ..Default::default()
        })
    }

    /// Acquires fine, then panics on the first frame request
    struct PanickingSource {
        released: Arc<AtomicBool>,
    }

    impl FrameSource for PanickingSource {
        fn acquire(&mut self) -> Result<(), SourceError> {
            Ok(())
        }

        fn current_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            panic!("driver fault");
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn wait_for_outcome(updates: &Receiver<MeasurementUpdate>) -> SessionOutcome {
        loop {
            match updates.recv_timeout(WAIT) {
                Ok(MeasurementUpdate::Finished(outcome)) => return outcome,
                Ok(_) => continue,
                Err(e) => panic!("no outcome: {}", e),
            }
        }
    }

    fn wait_for_release(released: &AtomicBool) {
        let deadline = std::time::Instant::now() + WAIT;
        while !released.load(Ordering::SeqCst) {
            assert!(std::time::Instant::now() < deadline, "camera was not released");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_measurement_manager_creation() {
        let (update_sender, _update_receiver) = unbounded();
        let (_manager, command_sender) =
            MeasurementManager::new(MeasurementConfig::default(), update_sender);

        assert!(command_sender.send(MeasurementCommand::Stop).is_ok());
    }

    #[test]
    fn test_command_debug() {
        let source = SyntheticFingertip::new(SyntheticOptions::default());
        assert_eq!(format!("{:?}", MeasurementCommand::Start(Box::new(source))), "Start(..)");
        assert_eq!(format!("{:?}", MeasurementCommand::Stop), "Stop");
        assert_eq!(format!("{:?}", MeasurementCommand::Abort), "Abort");
    }

    #[test]
    fn test_permission_denied_reported() {
        let (commands, updates, handle) = spawn_manager();
        let source = SyntheticFingertip::new(SyntheticOptions {
            fail_acquire: Some(SourceError::PermissionDenied),
            ..Default::default()
        });

        commands.send(MeasurementCommand::Start(Box::new(source))).unwrap();
        let outcome = wait_for_outcome(&updates);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::PermissionDenied));

        drop(commands);
        handle.join().unwrap();
    }

    #[test]
    fn test_stop_finalises_and_releases() {
        let (commands, updates, handle) = spawn_manager();
        let source = SyntheticFingertip::new(SyntheticOptions::default());
        let released = source.release_flag();

        commands.send(MeasurementCommand::Start(Box::new(source))).unwrap();
        assert_eq!(updates.recv_timeout(WAIT).unwrap(), MeasurementUpdate::Started);
        commands.send(MeasurementCommand::Stop).unwrap();

        let outcome = wait_for_outcome(&updates);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::InsufficientBeats));
        assert!(released.load(Ordering::SeqCst));

        drop(commands);
        handle.join().unwrap();
    }

    #[test]
    fn test_abort_releases_without_outcome() {
        let (commands, updates, handle) = spawn_manager();
        let source = SyntheticFingertip::new(SyntheticOptions::default());
        let released = source.release_flag();

        commands.send(MeasurementCommand::Start(Box::new(source))).unwrap();
        assert_eq!(updates.recv_timeout(WAIT).unwrap(), MeasurementUpdate::Started);
        commands.send(MeasurementCommand::Abort).unwrap();

        loop {
            match updates.recv_timeout(WAIT) {
                Ok(MeasurementUpdate::Aborted) => break,
                Ok(MeasurementUpdate::Finished(outcome)) => panic!("unexpected outcome {:?}", outcome),
                Ok(_) => continue,
                Err(e) => panic!("no abort acknowledgement: {}", e),
            }
        }

        wait_for_release(&released);

        // A fresh session is accepted afterwards
        commands.send(MeasurementCommand::Start(Box::new(denied_source()))).unwrap();
        let outcome = wait_for_outcome(&updates);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::PermissionDenied));

        drop(commands);
        handle.join().unwrap();
    }

    #[test]
    fn test_second_start_is_ignored() {
        let (commands, updates, handle) = spawn_manager();
        let first = SyntheticFingertip::new(SyntheticOptions::default());
        let second = denied_source();

        commands.send(MeasurementCommand::Start(Box::new(first))).unwrap();
        commands.send(MeasurementCommand::Start(Box::new(second))).unwrap();
        commands.send(MeasurementCommand::Stop).unwrap();

        let outcome = wait_for_outcome(&updates);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::InsufficientBeats));
        assert!(!updates
            .recv_timeout(Duration::from_millis(300))
            .map(|u| matches!(u, MeasurementUpdate::Finished(_)))
            .unwrap_or(false));

        drop(commands);
        handle.join().unwrap();
    }

    #[test]
    fn test_invalid_config_reported_and_manager_stays_usable() {
        let (commands, updates, handle) = spawn_manager_with(MeasurementConfig {
            sample_rate_hz: 0.0,
            ..Default::default()
        });

        for _ in 0..2 {
            let source = SyntheticFingertip::new(SyntheticOptions::default());
            let released = source.release_flag();
            commands.send(MeasurementCommand::Start(Box::new(source))).unwrap();

            match updates.recv_timeout(WAIT) {
                Ok(MeasurementUpdate::Error(message)) => {
                    assert!(message.contains("sample_rate_hz"), "{}", message)
                }
                other => panic!("expected a config error, got {:?}", other),
            }
            assert!(!released.load(Ordering::SeqCst));
        }

        drop(commands);
        handle.join().unwrap();
    }

    #[test]
    fn test_panicking_source_reports_error_and_frees_manager() {
        let (commands, updates, handle) = spawn_manager();
        let released = Arc::new(AtomicBool::new(false));
        let source = PanickingSource { released: released.clone() };

        commands.send(MeasurementCommand::Start(Box::new(source))).unwrap();
        loop {
            match updates.recv_timeout(WAIT) {
                Ok(MeasurementUpdate::Error(_)) => break,
                Ok(MeasurementUpdate::Started) => continue,
                other => panic!("expected an error, got {:?}", other),
            }
        }
        wait_for_release(&released);

        commands.send(MeasurementCommand::Start(Box::new(denied_source()))).unwrap();
        let outcome = wait_for_outcome(&updates);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::PermissionDenied));

        drop(commands);
        handle.join().unwrap();
    }

    #[test]
    fn test_abort_after_finish_sends_nothing_more() {
        let (commands, updates, handle) = spawn_manager();

        commands.send(MeasurementCommand::Start(Box::new(denied_source()))).unwrap();
        let outcome = wait_for_outcome(&updates);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::PermissionDenied));

        commands.send(MeasurementCommand::Abort).unwrap();
        assert!(updates.recv_timeout(Duration::from_millis(300)).is_err());

        drop(commands);
        handle.join().unwrap();
    }
}
