//! Task lifecycle control: at most one active scan per manager process.
//!
//! The coordinator owns the process-wide scan slot. `start` and the resume
//! verbs hand execution to a [`ScanRunner`] worker and return
//! [`RunOutcome::Spawned`]; everything the worker later reports arrives
//! through [`TaskCoordinator::poll_completion`], which the host loop calls
//! between reads. No outcome is ever smuggled through the parser's error
//! channel.

use std::sync::mpsc::{Receiver, TryRecvError};

use thiserror::Error;
use tracing::{error, info};

use scanmgr_types::{ResourceKind, TaskStatus};

use crate::backend::{BackendError, ManagementBackend, ResourceHandle};

/// Tracing target for task control operations.
pub(crate) const TASKCTL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::taskctl");

/// Cooperative signals delivered to a running scan worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSignal {
    Pause,
    Resume,
    Stop,
}

/// Final report produced by a scan worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// The scan ran to completion.
    Finished,
    /// The scan honoured a stop request.
    Stopped,
    /// The worker failed or disappeared.
    Failed(String),
}

/// Control side of a live scan worker.
pub trait ScanControl: Send {
    /// Delivers a cooperative signal; the worker acts on it asynchronously.
    fn signal(&mut self, signal: ScanSignal) -> Result<(), ScanWorkerError>;
}

/// Live handle to a scan worker: a completion receiver plus its control
/// channel.
pub struct ScanHandle {
    pub completion: Receiver<ScanResult>,
    pub control: Box<dyn ScanControl>,
}

/// Launches scan workers. Production wraps the external scanner process;
/// tests drive a channel-backed fake.
pub trait ScanRunner: Send + Sync {
    /// Starts a worker for `task_id` writing into `report_id`.
    fn launch(&self, task_id: &str, report_id: &str) -> Result<ScanHandle, ScanWorkerError>;
}

/// Failure reported by a scan worker or its launcher.
#[derive(Debug, Error)]
#[error("scan worker error: {0}")]
pub struct ScanWorkerError(pub String);

/// Failures of the lifecycle verbs, mapped onto response statuses by the
/// dispatcher.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Another scan already occupies this process's scan slot.
    #[error("a scan is already active in this process")]
    ScanSlotBusy,
    /// The task itself is already active.
    #[error("task is already active")]
    TaskActive,
    /// The task is not in a state the verb accepts.
    #[error("task is {status}")]
    WrongState { status: TaskStatus },
    /// The reserved bookkeeping task may not be deleted.
    #[error("task is reserved")]
    ReservedTask,
    /// The backend refused the transition.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The worker could not be launched or signalled.
    #[error("{0}")]
    Worker(String),
}

/// Explicit result of a lifecycle verb.
///
/// The dispatcher branches on this directly instead of recovering a forked
/// child's status from an unrelated error path.
#[derive(Debug)]
pub enum RunOutcome {
    /// The verb finished synchronously.
    Completed(Result<(), ControlError>),
    /// A scan worker now runs detached; its report id is returned to the
    /// client and completion arrives via [`TaskCoordinator::poll_completion`].
    Spawned { report_id: String },
}

/// How a delete request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The task was idle and is gone.
    Deleted,
    /// The task is active; deletion happens when the run finishes.
    Scheduled,
}

/// Completion notice surfaced to the host loop.
#[derive(Debug, PartialEq, Eq)]
pub struct ScanCompletion {
    pub task_id: String,
    pub result: ScanResult,
}

struct ActiveScan {
    task_id: String,
    handle: ScanHandle,
    delete_pending: bool,
}

/// Owner of the process-wide scan slot and the five lifecycle verbs.
pub struct TaskCoordinator {
    runner: Box<dyn ScanRunner>,
    active: Option<ActiveScan>,
}

impl TaskCoordinator {
    /// Creates a coordinator draining into the given runner.
    #[must_use]
    pub fn new(runner: Box<dyn ScanRunner>) -> Self {
        Self {
            runner,
            active: None,
        }
    }

    /// Whether a scan worker is currently outstanding.
    #[must_use]
    pub fn has_active_scan(&self) -> bool {
        self.active.is_some()
    }

    /// Starts a fresh run of an idle task.
    pub fn start(&mut self, backend: &dyn ManagementBackend, task: &ResourceHandle) -> RunOutcome {
        self.launch_run(backend, task, Launch::Fresh)
    }

    /// Requests a pause of the running scan.
    pub fn pause(&mut self, backend: &dyn ManagementBackend, task: &ResourceHandle) -> RunOutcome {
        RunOutcome::Completed(self.signal_active(
            backend,
            task,
            ScanSignal::Pause,
            &[TaskStatus::Running, TaskStatus::RequestedStart],
            TaskStatus::RequestedPause,
        ))
    }

    /// Requests a stop of the running or paused scan.
    pub fn stop(&mut self, backend: &dyn ManagementBackend, task: &ResourceHandle) -> RunOutcome {
        RunOutcome::Completed(self.signal_active(
            backend,
            task,
            ScanSignal::Stop,
            &[
                TaskStatus::Running,
                TaskStatus::RequestedStart,
                TaskStatus::RequestedPause,
                TaskStatus::Paused,
            ],
            TaskStatus::RequestedStop,
        ))
    }

    /// Resumes a paused scan in place.
    pub fn resume_paused(
        &mut self,
        backend: &dyn ManagementBackend,
        task: &ResourceHandle,
    ) -> RunOutcome {
        RunOutcome::Completed(self.signal_active(
            backend,
            task,
            ScanSignal::Resume,
            &[TaskStatus::Paused, TaskStatus::RequestedPause],
            TaskStatus::Running,
        ))
    }

    /// Relaunches a stopped task, continuing its last report.
    pub fn resume_stopped(
        &mut self,
        backend: &dyn ManagementBackend,
        task: &ResourceHandle,
    ) -> RunOutcome {
        match self.task_status(backend, task) {
            Ok(TaskStatus::Stopped) => self.launch_run(backend, task, Launch::Continuation),
            Ok(status) => RunOutcome::Completed(Err(ControlError::WrongState { status })),
            Err(error) => RunOutcome::Completed(Err(error)),
        }
    }

    /// Resumes a paused or stopped task, or starts it fresh.
    pub fn resume_or_start(
        &mut self,
        backend: &dyn ManagementBackend,
        task: &ResourceHandle,
    ) -> RunOutcome {
        match self.task_status(backend, task) {
            Ok(TaskStatus::Paused | TaskStatus::RequestedPause) => {
                self.resume_paused(backend, task)
            }
            Ok(TaskStatus::Stopped) => self.launch_run(backend, task, Launch::Continuation),
            Ok(TaskStatus::New | TaskStatus::Done) => self.launch_run(backend, task, Launch::Fresh),
            Ok(status) => RunOutcome::Completed(Err(ControlError::WrongState { status })),
            Err(error) => RunOutcome::Completed(Err(error)),
        }
    }

    /// Two-phase delete: idle tasks go immediately, active tasks are
    /// flagged and removed once the run finishes.
    pub fn request_delete(
        &mut self,
        backend: &dyn ManagementBackend,
        task: &ResourceHandle,
    ) -> Result<DeleteOutcome, ControlError> {
        if backend.reserved_task_id().as_deref() == Some(task.id.as_str()) {
            return Err(ControlError::ReservedTask);
        }
        let status = self.task_status(backend, task)?;
        if status.is_active() {
            backend.request_delete_task(task)?;
            backend.set_task_status(task, TaskStatus::RequestedDelete)?;
            if let Some(active) = self.active.as_mut().filter(|scan| scan.task_id == task.id) {
                active.delete_pending = true;
            }
            info!(
                target: TASKCTL_TARGET,
                task = %task.id,
                "delete deferred until the active run finishes"
            );
            Ok(DeleteOutcome::Scheduled)
        } else {
            backend.delete(task)?;
            info!(target: TASKCTL_TARGET, task = %task.id, "task deleted");
            Ok(DeleteOutcome::Deleted)
        }
    }

    /// Non-blocking check of the outstanding scan worker.
    ///
    /// On completion the final status is recorded through the backend and a
    /// pending delete is performed.
    pub fn poll_completion(
        &mut self,
        backend: &dyn ManagementBackend,
    ) -> Result<Option<ScanCompletion>, BackendError> {
        let result = match self.active.as_ref() {
            None => return Ok(None),
            Some(active) => match active.handle.completion.try_recv() {
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    ScanResult::Failed("scan worker disconnected".to_string())
                }
                Ok(result) => result,
            },
        };

        // The slot frees regardless of how the run ended.
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        let task = ResourceHandle::new(ResourceKind::Task, active.task_id.clone());
        let final_status = match &result {
            ScanResult::Finished => TaskStatus::Done,
            ScanResult::Stopped => TaskStatus::Stopped,
            ScanResult::Failed(message) => {
                error!(
                    target: TASKCTL_TARGET,
                    task = %task.id,
                    error = %message,
                    "scan worker failed"
                );
                TaskStatus::Stopped
            }
        };
        if active.delete_pending {
            backend.delete(&task)?;
            info!(target: TASKCTL_TARGET, task = %task.id, "deferred delete performed");
        } else {
            backend.set_task_status(&task, final_status)?;
            info!(
                target: TASKCTL_TARGET,
                task = %task.id,
                status = %final_status,
                "scan finished"
            );
        }
        Ok(Some(ScanCompletion {
            task_id: active.task_id,
            result,
        }))
    }

    fn task_status(
        &self,
        backend: &dyn ManagementBackend,
        task: &ResourceHandle,
    ) -> Result<TaskStatus, ControlError> {
        Ok(backend.task_status(task)?)
    }

    fn launch_run(
        &mut self,
        backend: &dyn ManagementBackend,
        task: &ResourceHandle,
        launch: Launch,
    ) -> RunOutcome {
        if self.active.is_some() {
            return RunOutcome::Completed(Err(ControlError::ScanSlotBusy));
        }
        let status = match self.task_status(backend, task) {
            Ok(status) => status,
            Err(error) => return RunOutcome::Completed(Err(error)),
        };
        match launch {
            Launch::Fresh if !status.may_start() => {
                return RunOutcome::Completed(Err(ControlError::TaskActive));
            }
            Launch::Continuation if status != TaskStatus::Stopped => {
                return RunOutcome::Completed(Err(ControlError::WrongState { status }));
            }
            Launch::Fresh | Launch::Continuation => {}
        }

        let prepared = match launch {
            Launch::Fresh => backend.start_task(task),
            Launch::Continuation => backend.resume_task(task),
        };
        let report_id = match prepared {
            Ok(report_id) => report_id,
            Err(error) => return RunOutcome::Completed(Err(error.into())),
        };
        if let Err(error) = backend.set_task_status(task, TaskStatus::RequestedStart) {
            return RunOutcome::Completed(Err(error.into()));
        }
        match self.runner.launch(&task.id, &report_id) {
            Ok(handle) => {
                if let Err(error) = backend.set_task_status(task, TaskStatus::Running) {
                    return RunOutcome::Completed(Err(error.into()));
                }
                info!(
                    target: TASKCTL_TARGET,
                    task = %task.id,
                    report = %report_id,
                    "scan worker launched"
                );
                self.active = Some(ActiveScan {
                    task_id: task.id.clone(),
                    handle,
                    delete_pending: false,
                });
                RunOutcome::Spawned { report_id }
            }
            Err(error) => {
                // The run never began; put the task back where it was.
                let fallback = backend.set_task_status(task, status);
                if let Err(status_error) = fallback {
                    error!(
                        target: TASKCTL_TARGET,
                        task = %task.id,
                        error = %status_error,
                        "failed to restore task status after launch failure"
                    );
                }
                RunOutcome::Completed(Err(ControlError::Worker(error.to_string())))
            }
        }
    }

    fn signal_active(
        &mut self,
        backend: &dyn ManagementBackend,
        task: &ResourceHandle,
        signal: ScanSignal,
        accepted: &[TaskStatus],
        requested: TaskStatus,
    ) -> Result<(), ControlError> {
        let status = self.task_status(backend, task)?;
        if !accepted.contains(&status) {
            return Err(ControlError::WrongState { status });
        }
        let Some(active) = self.active.as_mut().filter(|scan| scan.task_id == task.id) else {
            // The backend thinks the task is active but this process owns
            // no worker for it; another manager process does.
            return Err(ControlError::TaskActive);
        };
        active
            .handle
            .control
            .signal(signal)
            .map_err(|error| ControlError::Worker(error.to_string()))?;
        backend.set_task_status(task, requested)?;
        info!(
            target: TASKCTL_TARGET,
            task = %task.id,
            signal = ?signal,
            status = %requested,
            "scan signal delivered"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Launch {
    Fresh,
    Continuation,
}
