//! Command dispatch: one completed, staged command in, one response out.

mod create;
mod misc;
mod resources;
mod task;

use tracing::error;

use scanmgr_types::ResourceKind;

use crate::backend::{BackendError, ManagementBackend, ResourceHandle};
use crate::taskctl::TaskCoordinator;

use super::OMP_TARGET;
use super::errors::OmpError;
use super::grammar::CommandKind;
use super::machine::AuthView;
use super::respond::Response;
use super::staging::Staging;

/// Shared services a command executes against.
pub struct DispatchContext<'a> {
    pub backend: &'a dyn ManagementBackend,
    pub coordinator: &'a mut TaskCoordinator,
}

/// Executes one completed command against the backend and coordinator.
///
/// `failed` carries a failure decided while the body was still being
/// parsed; the command is then answered without touching the backend.
pub fn execute(
    kind: CommandKind,
    staging: &Staging,
    failed: Option<OmpError>,
    auth: AuthView<'_>,
    ctx: &mut DispatchContext<'_>,
) -> Response {
    if let Some(error) = failed {
        return Response::error(kind.name(), &error);
    }

    use CommandKind as C;
    let result = match kind {
        C::Authenticate => return misc::authenticate(staging, auth, ctx.backend),
        C::GetVersion => return misc::get_version(),
        C::Help => return misc::help(),
        C::CreateAgent
        | C::CreateConfig
        | C::CreateEscalator
        | C::CreateLscCredential
        | C::CreateNote
        | C::CreateOverride
        | C::CreateReportFormat
        | C::CreateSchedule
        | C::CreateSlave
        | C::CreateTarget
        | C::CreateTask => create::execute(kind, staging, ctx.backend),
        C::DeleteAgent
        | C::DeleteConfig
        | C::DeleteEscalator
        | C::DeleteLscCredential
        | C::DeleteNote
        | C::DeleteOverride
        | C::DeleteReportFormat
        | C::DeleteSchedule
        | C::DeleteSlave
        | C::DeleteTarget => resources::delete(kind, staging, ctx.backend),
        C::GetAgents
        | C::GetConfigs
        | C::GetEscalators
        | C::GetLscCredentials
        | C::GetNotes
        | C::GetOverrides
        | C::GetReportFormats
        | C::GetSchedules
        | C::GetSlaves
        | C::GetTargets
        | C::GetTasks => resources::get(kind, staging, ctx.backend),
        C::ModifyNote | C::ModifyOverride | C::ModifyReportFormat | C::ModifyTask => {
            resources::modify(kind, staging, ctx.backend)
        }
        C::StartTask
        | C::PauseTask
        | C::StopTask
        | C::ResumeOrStartTask
        | C::ResumePausedTask
        | C::ResumeStoppedTask => task::lifecycle(kind, staging, ctx),
        C::DeleteTask => task::delete(staging, ctx),
        C::TestEscalator => task::test_escalator(staging, ctx.backend),
        C::VerifyAgent | C::VerifyReportFormat => task::verify(kind, staging, ctx.backend),
    };

    match result {
        Ok(response) => response,
        Err(error) => Response::error(kind.name(), &error),
    }
}

/// Resolves the resource a command addresses, with the three failure modes
/// kept apart: a missing or empty id is the client's syntax mistake, a
/// backend failure is internal, and an unknown id is Not Found with the
/// client's id echoed verbatim.
pub(super) fn find_resource(
    backend: &dyn ManagementBackend,
    kind: ResourceKind,
    id: Option<&str>,
) -> Result<ResourceHandle, OmpError> {
    let id = id.unwrap_or("");
    if id.is_empty() {
        return Err(OmpError::syntax(format!(
            "A {} attribute is required",
            kind.id_attribute()
        )));
    }
    match backend.find(kind, id) {
        Ok(Some(handle)) => Ok(handle),
        Ok(None) => Err(OmpError::NotFound {
            kind,
            id: id.to_owned(),
        }),
        Err(error) => Err(classify(error)),
    }
}

/// Converts a backend failure, logging storage failures before the detail
/// is replaced by the stock Internal text.
pub(super) fn classify(error: BackendError) -> OmpError {
    if let BackendError::Storage(detail) = &error {
        error!(target: OMP_TARGET, error = %detail, "backend storage failure");
    }
    OmpError::from(error)
}
