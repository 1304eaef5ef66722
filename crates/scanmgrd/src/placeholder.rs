//! Placeholder management backend used until the persistence and scanner
//! layers are wired in.

use scanmgr_types::{ResourceKind, ResourceRow, TaskStatus};

use crate::backend::{
    BackendError, CreateRequest, ManagementBackend, ModifyRequest, ResourceHandle, RowSelector,
};
use crate::taskctl::{ScanHandle, ScanRunner, ScanWorkerError};

const BACKEND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::backend::noop");

/// Backend that records requests without any storage behind it. Every
/// operation answers Service Down so clients see an honest 503 rather
/// than fabricated state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderBackend;

impl PlaceholderBackend {
    fn unavailable<T>(&self, operation: &'static str) -> Result<T, BackendError> {
        tracing::warn!(
            target: BACKEND_TARGET,
            operation,
            "backend operation requested but not yet implemented"
        );
        Err(BackendError::Unavailable(
            "management backend not wired".to_string(),
        ))
    }
}

impl ManagementBackend for PlaceholderBackend {
    fn authenticate(&self, _username: &str, _password: &str) -> Result<bool, BackendError> {
        self.unavailable("authenticate")
    }

    fn load_tasks(&self) -> Result<(), BackendError> {
        self.unavailable("load_tasks")
    }

    fn release_tasks(&self) -> Result<(), BackendError> {
        self.unavailable("release_tasks")
    }

    fn find(&self, _kind: ResourceKind, _id: &str) -> Result<Option<ResourceHandle>, BackendError> {
        self.unavailable("find")
    }

    fn create(&self, _request: CreateRequest) -> Result<String, BackendError> {
        self.unavailable("create")
    }

    fn modify(
        &self,
        _handle: &ResourceHandle,
        _request: ModifyRequest,
    ) -> Result<(), BackendError> {
        self.unavailable("modify")
    }

    fn delete(&self, _handle: &ResourceHandle) -> Result<(), BackendError> {
        self.unavailable("delete")
    }

    fn rows(
        &self,
        _kind: ResourceKind,
        _selector: &RowSelector,
    ) -> Result<Vec<ResourceRow>, BackendError> {
        self.unavailable("rows")
    }

    fn task_status(&self, _handle: &ResourceHandle) -> Result<TaskStatus, BackendError> {
        self.unavailable("task_status")
    }

    fn set_task_status(
        &self,
        _handle: &ResourceHandle,
        _status: TaskStatus,
    ) -> Result<(), BackendError> {
        self.unavailable("set_task_status")
    }

    fn start_task(&self, _handle: &ResourceHandle) -> Result<String, BackendError> {
        self.unavailable("start_task")
    }

    fn resume_task(&self, _handle: &ResourceHandle) -> Result<String, BackendError> {
        self.unavailable("resume_task")
    }

    fn request_delete_task(&self, _handle: &ResourceHandle) -> Result<(), BackendError> {
        self.unavailable("request_delete_task")
    }

    fn reserved_task_id(&self) -> Option<String> {
        None
    }

    fn escalate(&self, _handle: &ResourceHandle) -> Result<(), BackendError> {
        self.unavailable("escalate")
    }

    fn verify(
        &self,
        _kind: ResourceKind,
        _handle: &ResourceHandle,
    ) -> Result<bool, BackendError> {
        self.unavailable("verify")
    }
}

/// Runner that refuses to launch scans until a scanner is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRunner;

impl ScanRunner for PlaceholderRunner {
    fn launch(&self, _task_id: &str, _report_id: &str) -> Result<ScanHandle, ScanWorkerError> {
        Err(ScanWorkerError("no scanner configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_is_service_down() {
        let backend = PlaceholderBackend;
        assert!(matches!(
            backend.authenticate("om", "pw"),
            Err(BackendError::Unavailable(_))
        ));
        assert!(matches!(
            backend.find(ResourceKind::Task, "t-1"),
            Err(BackendError::Unavailable(_))
        ));
        assert!(backend.reserved_task_id().is_none());
    }
}
