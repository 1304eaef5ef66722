//! Task lifecycle verbs plus the escalator and verification commands.

use tracing::info;

use scanmgr_types::{ResourceKind, StatusKind};

use crate::backend::ManagementBackend;
use crate::taskctl::{DeleteOutcome, RunOutcome};

use super::super::OMP_TARGET;
use super::super::errors::OmpError;
use super::super::grammar::CommandKind;
use super::super::respond::{Response, element};
use super::super::staging::Staging;
use super::{DispatchContext, classify, find_resource};

/// Routes the five lifecycle verbs through the coordinator and maps the
/// explicit outcome onto a response. A spawned run answers 202 with the
/// report id the scan writes into; a synchronous success answers 202 bare.
pub(super) fn lifecycle(
    kind: CommandKind,
    staging: &Staging,
    ctx: &mut DispatchContext<'_>,
) -> Result<Response, OmpError> {
    let task = find_resource(
        ctx.backend,
        ResourceKind::Task,
        staging.root_attr("task_id"),
    )?;

    use CommandKind as C;
    let outcome = match kind {
        C::StartTask => ctx.coordinator.start(ctx.backend, &task),
        C::PauseTask => ctx.coordinator.pause(ctx.backend, &task),
        C::StopTask => ctx.coordinator.stop(ctx.backend, &task),
        C::ResumePausedTask => ctx.coordinator.resume_paused(ctx.backend, &task),
        C::ResumeStoppedTask => ctx.coordinator.resume_stopped(ctx.backend, &task),
        C::ResumeOrStartTask => ctx.coordinator.resume_or_start(ctx.backend, &task),
        other => {
            return Err(OmpError::internal(format!(
                "{} routed to the lifecycle handler",
                other.name()
            )));
        }
    };

    match outcome {
        RunOutcome::Spawned { report_id } => {
            info!(
                target: OMP_TARGET,
                command = kind.name(),
                task = %task.id,
                report = %report_id,
                "scan run spawned"
            );
            Ok(Response::ok(kind.name(), StatusKind::Requested)
                .with_body(element("report_id", &report_id)))
        }
        RunOutcome::Completed(Ok(())) => Ok(Response::ok(kind.name(), StatusKind::Requested)),
        RunOutcome::Completed(Err(error)) => Err(error.into()),
    }
}

/// `DELETE_TASK` goes through the coordinator so an active run is only
/// flagged: 200 when the task is gone, 202 when deletion waits for the
/// run to finish.
pub(super) fn delete(
    staging: &Staging,
    ctx: &mut DispatchContext<'_>,
) -> Result<Response, OmpError> {
    let task = find_resource(
        ctx.backend,
        ResourceKind::Task,
        staging.root_attr("task_id"),
    )?;
    match ctx.coordinator.request_delete(ctx.backend, &task)? {
        DeleteOutcome::Deleted => Ok(Response::ok("delete_task", StatusKind::Ok)),
        DeleteOutcome::Scheduled => Ok(Response::ok("delete_task", StatusKind::Requested)),
    }
}

pub(super) fn test_escalator(
    staging: &Staging,
    backend: &dyn ManagementBackend,
) -> Result<Response, OmpError> {
    let escalator = find_resource(
        backend,
        ResourceKind::Escalator,
        staging.root_attr("escalator_id"),
    )?;
    backend.escalate(&escalator).map_err(classify)?;
    info!(
        target: OMP_TARGET,
        escalator = %escalator.id,
        "escalator fired for testing"
    );
    Ok(Response::ok("test_escalator", StatusKind::Ok))
}

/// `VERIFY_*`: a completed check that fails is the client's problem, not
/// the server's, so it answers 400 rather than 500.
pub(super) fn verify(
    kind: CommandKind,
    staging: &Staging,
    backend: &dyn ManagementBackend,
) -> Result<Response, OmpError> {
    let resource = kind.resource().ok_or_else(|| {
        OmpError::internal(format!("{} addresses no resource kind", kind.name()))
    })?;
    let handle = find_resource(backend, resource, staging.root_attr(&resource.id_attribute()))?;
    let verified = backend.verify(resource, &handle).map_err(classify)?;
    if verified {
        Ok(Response::ok(kind.name(), StatusKind::Ok))
    } else {
        Ok(Response::ok(kind.name(), StatusKind::Syntax).with_text("Verification failed"))
    }
}
