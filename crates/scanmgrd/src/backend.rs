//! Management backend consumed by the command dispatcher.
//!
//! Persistence and scanner wiring live behind [`ManagementBackend`]; the
//! protocol engine only ever addresses resources by id and receives opaque
//! handles back. Backend failures are classified so the dispatcher can map
//! them onto response statuses without inspecting messages.

use scanmgr_types::{ResourceKind, ResourceRow, TaskStatus};
use thiserror::Error;

/// Opaque reference to a backend-owned resource, produced by a successful
/// lookup and consumed by the operations that act on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceHandle {
    /// Builds a handle for a known resource.
    #[must_use]
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Errors surfaced by backend operations.
///
/// The dispatcher maps these onto response statuses: `Storage` becomes
/// Internal(500), `Conflict` Busy(409), `Invalid` Syntax(400) and
/// `Unavailable` ServiceDown(503).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The storage layer failed.
    #[error("storage failure: {0}")]
    Storage(String),
    /// The operation conflicts with existing state, e.g. a name in use.
    #[error("{0}")]
    Conflict(String),
    /// The request content was rejected by the backend.
    #[error("{0}")]
    Invalid(String),
    /// An upstream service (scanner, feed) is unavailable.
    #[error("{0}")]
    Unavailable(String),
}

/// Row selection for `GET_*` queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSelector {
    /// Restrict the listing to one resource.
    pub id: Option<String>,
    /// Include detail fields in the rows.
    pub details: bool,
}

/// Source material for a new scan config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Copy an existing config by id.
    Copy(String),
    /// Import an uploaded RC file.
    Rcfile(String),
}

/// One condition/event/method section of an escalator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalatorPart {
    /// Section discriminator, e.g. `Always` or `Task run status changed`.
    pub kind: String,
    /// Frozen name/value data pairs.
    pub data: Vec<(String, String)>,
}

/// Named file attached to a report format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub name: String,
    pub content: String,
}

/// First-run moment of a schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleTime {
    pub minute: u32,
    pub hour: u32,
    pub day_of_month: u32,
    pub month: u32,
    pub year: u32,
}

/// Value/unit pair used for schedule durations and periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpan {
    pub value: u64,
    pub unit: String,
}

/// Typed payload of a `CREATE_*` command, frozen out of the staging store
/// at command-root close.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateRequest {
    Agent {
        name: String,
        comment: String,
        installer: Option<String>,
        howto_install: Option<String>,
        howto_use: Option<String>,
    },
    Config {
        name: String,
        comment: String,
        source: ConfigSource,
    },
    Escalator {
        name: String,
        comment: String,
        condition: EscalatorPart,
        event: EscalatorPart,
        method: EscalatorPart,
    },
    LscCredential {
        name: String,
        comment: String,
        login: String,
        password: Option<String>,
    },
    Note {
        nvt_oid: String,
        text: String,
        hosts: String,
        port: String,
        threat: String,
        task_id: Option<String>,
        result_id: Option<String>,
    },
    Override {
        nvt_oid: String,
        text: String,
        hosts: String,
        port: String,
        threat: String,
        new_threat: String,
        task_id: Option<String>,
        result_id: Option<String>,
    },
    ReportFormat {
        name: String,
        summary: String,
        description: String,
        extension: String,
        content_type: String,
        files: Vec<FileAttachment>,
    },
    Schedule {
        name: String,
        comment: String,
        first_time: ScheduleTime,
        duration: Option<TimeSpan>,
        period: Option<TimeSpan>,
    },
    Slave {
        name: String,
        comment: String,
        host: String,
        port: u16,
        login: String,
        password: String,
    },
    Target {
        name: String,
        hosts: String,
        comment: String,
    },
    Task {
        name: String,
        comment: String,
        config_id: String,
        target_id: String,
        schedule_id: Option<String>,
        slave_id: Option<String>,
    },
}

impl CreateRequest {
    /// Kind of resource this request creates.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Agent { .. } => ResourceKind::Agent,
            Self::Config { .. } => ResourceKind::Config,
            Self::Escalator { .. } => ResourceKind::Escalator,
            Self::LscCredential { .. } => ResourceKind::LscCredential,
            Self::Note { .. } => ResourceKind::Note,
            Self::Override { .. } => ResourceKind::Override,
            Self::ReportFormat { .. } => ResourceKind::ReportFormat,
            Self::Schedule { .. } => ResourceKind::Schedule,
            Self::Slave { .. } => ResourceKind::Slave,
            Self::Target { .. } => ResourceKind::Target,
            Self::Task { .. } => ResourceKind::Task,
        }
    }
}

/// Typed payload of a `MODIFY_*` command.
#[derive(Debug, Clone, PartialEq)]
pub enum ModifyRequest {
    Note {
        text: String,
        hosts: String,
        port: String,
        threat: String,
    },
    Override {
        text: String,
        hosts: String,
        port: String,
        threat: String,
        new_threat: String,
    },
    ReportFormat {
        name: Option<String>,
        summary: Option<String>,
        active: Option<bool>,
        params: Vec<(String, String)>,
    },
    Task {
        name: Option<String>,
        comment: Option<String>,
        rcfile: Option<String>,
    },
}

/// Operations the protocol engine asks of the management layer.
///
/// All calls are synchronous; the engine never holds a call open across
/// parser events.
#[cfg_attr(test, mockall::automock)]
pub trait ManagementBackend: Send + Sync {
    /// Checks credentials, returning whether they were accepted.
    fn authenticate(&self, username: &str, password: &str) -> Result<bool, BackendError>;

    /// Loads persisted task state after a successful authentication.
    fn load_tasks(&self) -> Result<(), BackendError>;

    /// Flushes cached task state before re-authentication.
    fn release_tasks(&self) -> Result<(), BackendError>;

    /// Looks a resource up by id.
    fn find(&self, kind: ResourceKind, id: &str) -> Result<Option<ResourceHandle>, BackendError>;

    /// Creates a resource, returning its new id.
    fn create(&self, request: CreateRequest) -> Result<String, BackendError>;

    /// Applies a modification to an existing resource.
    fn modify(&self, handle: &ResourceHandle, request: ModifyRequest)
    -> Result<(), BackendError>;

    /// Removes an existing resource.
    fn delete(&self, handle: &ResourceHandle) -> Result<(), BackendError>;

    /// Lists rows for a `GET_*` response.
    fn rows(
        &self,
        kind: ResourceKind,
        selector: &RowSelector,
    ) -> Result<Vec<ResourceRow>, BackendError>;

    /// Current lifecycle status of a task.
    fn task_status(&self, handle: &ResourceHandle) -> Result<TaskStatus, BackendError>;

    /// Records a lifecycle status transition.
    fn set_task_status(
        &self,
        handle: &ResourceHandle,
        status: TaskStatus,
    ) -> Result<(), BackendError>;

    /// Prepares a fresh run of a task, returning the new report id.
    fn start_task(&self, handle: &ResourceHandle) -> Result<String, BackendError>;

    /// Prepares the continuation of a stopped task, returning the id of the
    /// report the run continues.
    fn resume_task(&self, handle: &ResourceHandle) -> Result<String, BackendError>;

    /// Flags a task for deletion once its current run finishes.
    fn request_delete_task(&self, handle: &ResourceHandle) -> Result<(), BackendError>;

    /// Id of the reserved bookkeeping task excluded from deletion, if any.
    fn reserved_task_id(&self) -> Option<String>;

    /// Fires an escalator for testing.
    fn escalate(&self, handle: &ResourceHandle) -> Result<(), BackendError>;

    /// Verifies an installed agent or report format.
    fn verify(&self, kind: ResourceKind, handle: &ResourceHandle) -> Result<bool, BackendError>;
}
