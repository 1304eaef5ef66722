//! In-memory fakes shared by the integration tests: a hash-map backend,
//! a channel-driven scan runner, and a capturing sink.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use scanmgr_types::{ResourceKind, ResourceRow, TaskStatus};
use scanmgrd::backend::{
    BackendError, CreateRequest, ManagementBackend, ModifyRequest, ResourceHandle, RowSelector,
};
use scanmgrd::outbuf::{ResponseSink, SinkError};
use scanmgrd::taskctl::{
    ScanControl, ScanHandle, ScanResult, ScanRunner, ScanSignal, ScanWorkerError, TaskCoordinator,
};
use scanmgrd::session::Session;

#[derive(Default)]
struct State {
    rows: HashMap<(ResourceKind, String), ResourceRow>,
    task_status: HashMap<String, TaskStatus>,
    users: HashMap<String, String>,
    reserved_task: Option<String>,
}

/// Hash-map backed management backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn with_user(username: &str, password: &str) -> Self {
        let backend = Self::default();
        backend
            .lock()
            .users
            .insert(username.to_string(), password.to_string());
        backend
    }

    pub fn reserve_task(&self, id: &str) {
        self.lock().reserved_task = Some(id.to_string());
    }

    pub fn task_status_of(&self, id: &str) -> Option<TaskStatus> {
        self.lock().task_status.get(id).copied()
    }

    pub fn has_resource(&self, kind: ResourceKind, id: &str) -> bool {
        self.lock().rows.contains_key(&(kind, id.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("backend state lock")
    }
}

fn request_name(request: &CreateRequest) -> String {
    match request {
        CreateRequest::Agent { name, .. }
        | CreateRequest::Config { name, .. }
        | CreateRequest::Escalator { name, .. }
        | CreateRequest::LscCredential { name, .. }
        | CreateRequest::ReportFormat { name, .. }
        | CreateRequest::Schedule { name, .. }
        | CreateRequest::Slave { name, .. }
        | CreateRequest::Target { name, .. }
        | CreateRequest::Task { name, .. } => name.clone(),
        CreateRequest::Note { text, .. } | CreateRequest::Override { text, .. } => text.clone(),
    }
}

impl ManagementBackend for MemoryBackend {
    fn authenticate(&self, username: &str, password: &str) -> Result<bool, BackendError> {
        Ok(self.lock().users.get(username).map(String::as_str) == Some(password))
    }

    fn load_tasks(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn release_tasks(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn find(&self, kind: ResourceKind, id: &str) -> Result<Option<ResourceHandle>, BackendError> {
        Ok(self
            .lock()
            .rows
            .contains_key(&(kind, id.to_string()))
            .then(|| ResourceHandle::new(kind, id)))
    }

    fn create(&self, request: CreateRequest) -> Result<String, BackendError> {
        let kind = request.kind();
        let id = Uuid::new_v4().to_string();
        let mut state = self.lock();
        state.rows.insert(
            (kind, id.clone()),
            ResourceRow::new(id.clone(), request_name(&request), ""),
        );
        if kind == ResourceKind::Task {
            state.task_status.insert(id.clone(), TaskStatus::New);
        }
        Ok(id)
    }

    fn modify(
        &self,
        handle: &ResourceHandle,
        request: ModifyRequest,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        let row = state
            .rows
            .get_mut(&(handle.kind, handle.id.clone()))
            .ok_or_else(|| BackendError::Storage("row vanished".to_string()))?;
        if let ModifyRequest::Task {
            name: Some(name), ..
        }
        | ModifyRequest::ReportFormat {
            name: Some(name), ..
        } = request
        {
            row.name = name;
        }
        Ok(())
    }

    fn delete(&self, handle: &ResourceHandle) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.rows.remove(&(handle.kind, handle.id.clone()));
        state.task_status.remove(&handle.id);
        Ok(())
    }

    fn rows(
        &self,
        kind: ResourceKind,
        selector: &RowSelector,
    ) -> Result<Vec<ResourceRow>, BackendError> {
        let state = self.lock();
        let mut rows: Vec<ResourceRow> = state
            .rows
            .iter()
            .filter(|((row_kind, id), _)| {
                *row_kind == kind
                    && selector.id.as_ref().is_none_or(|wanted| wanted == id)
            })
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn task_status(&self, handle: &ResourceHandle) -> Result<TaskStatus, BackendError> {
        self.lock()
            .task_status
            .get(&handle.id)
            .copied()
            .ok_or_else(|| BackendError::Storage("unknown task".to_string()))
    }

    fn set_task_status(
        &self,
        handle: &ResourceHandle,
        status: TaskStatus,
    ) -> Result<(), BackendError> {
        self.lock().task_status.insert(handle.id.clone(), status);
        Ok(())
    }

    fn start_task(&self, _handle: &ResourceHandle) -> Result<String, BackendError> {
        Ok(format!("report-{}", Uuid::new_v4()))
    }

    fn resume_task(&self, handle: &ResourceHandle) -> Result<String, BackendError> {
        Ok(format!("report-{}-continued", handle.id))
    }

    fn request_delete_task(&self, _handle: &ResourceHandle) -> Result<(), BackendError> {
        Ok(())
    }

    fn reserved_task_id(&self) -> Option<String> {
        self.lock().reserved_task.clone()
    }

    fn escalate(&self, _handle: &ResourceHandle) -> Result<(), BackendError> {
        Ok(())
    }

    fn verify(&self, _kind: ResourceKind, _handle: &ResourceHandle) -> Result<bool, BackendError> {
        Ok(true)
    }
}

struct ChannelControl {
    signals: Arc<Mutex<Vec<ScanSignal>>>,
}

impl ScanControl for ChannelControl {
    fn signal(&mut self, signal: ScanSignal) -> Result<(), ScanWorkerError> {
        self.signals
            .lock()
            .map_err(|_| ScanWorkerError("signal log poisoned".to_string()))?
            .push(signal);
        Ok(())
    }
}

/// Runner whose workers never act on their own; tests finish them by
/// sending a result through [`ChannelRunner::finish`].
#[derive(Default)]
pub struct ChannelRunner {
    finisher: Mutex<Option<Sender<ScanResult>>>,
    signals: Arc<Mutex<Vec<ScanSignal>>>,
}

impl ChannelRunner {
    pub fn finish(&self, result: ScanResult) {
        self.finisher
            .lock()
            .expect("finisher lock")
            .as_ref()
            .expect("a worker was launched")
            .send(result)
            .expect("worker channel open");
    }

    pub fn signals(&self) -> Vec<ScanSignal> {
        self.signals.lock().expect("signal log").clone()
    }
}

impl ScanRunner for ChannelRunner {
    fn launch(&self, _task_id: &str, _report_id: &str) -> Result<ScanHandle, ScanWorkerError> {
        let (sender, receiver): (Sender<ScanResult>, Receiver<ScanResult>) = mpsc::channel();
        *self
            .finisher
            .lock()
            .map_err(|_| ScanWorkerError("finisher lock poisoned".to_string()))? = Some(sender);
        Ok(ScanHandle {
            completion: receiver,
            control: Box::new(ChannelControl {
                signals: Arc::clone(&self.signals),
            }),
        })
    }
}

/// Shareable runner front so both a coordinator and the test can hold it.
pub struct SharedRunner(pub Arc<ChannelRunner>);

impl ScanRunner for SharedRunner {
    fn launch(&self, task_id: &str, report_id: &str) -> Result<ScanHandle, ScanWorkerError> {
        self.0.launch(task_id, report_id)
    }
}

/// Sink that records every drained byte for later assertions.
#[derive(Clone, Default)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn take(&self) -> String {
        let mut data = self.data.lock().expect("sink lock");
        String::from_utf8(std::mem::take(&mut *data)).expect("utf-8 responses")
    }
}

impl ResponseSink for MemorySink {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, SinkError> {
        self.data
            .lock()
            .map_err(|_| SinkError::new("sink lock poisoned"))?
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }
}

/// An assembled session plus the handles the tests poke at.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub coordinator: Arc<Mutex<TaskCoordinator>>,
    pub runner: Arc<ChannelRunner>,
    pub sink: MemorySink,
    pub session: Session<MemorySink>,
}

impl Harness {
    pub fn with_user(username: &str, password: &str) -> Self {
        let backend = Arc::new(MemoryBackend::with_user(username, password));
        let runner = Arc::new(ChannelRunner::default());
        let coordinator = Arc::new(Mutex::new(TaskCoordinator::new(Box::new(SharedRunner(
            Arc::clone(&runner),
        )))));
        let sink = MemorySink::default();
        let session = Session::new(
            Arc::clone(&backend) as Arc<dyn ManagementBackend>,
            Arc::clone(&coordinator),
            sink.clone(),
            8 * 1024,
        );
        Self {
            backend,
            coordinator,
            runner,
            sink,
            session,
        }
    }

    /// Feeds one command and returns everything flushed for it.
    pub fn roundtrip(&mut self, command: &str) -> String {
        let outcome = self.session.feed(command.as_bytes());
        assert_ne!(outcome, scanmgrd::session::FeedOutcome::Fatal);
        assert_eq!(self.session.flush(), scanmgrd::session::FeedOutcome::Ok);
        self.sink.take()
    }

    /// Authenticates the session, asserting success.
    pub fn login(&mut self, username: &str, password: &str) {
        let wire = self.roundtrip(&format!(
            "<authenticate><credentials><username>{username}</username>\
             <password>{password}</password></credentials></authenticate>"
        ));
        assert!(
            wire.starts_with("<authenticate_response status=\"200\""),
            "login failed: {wire}"
        );
    }

    /// Creates a resource and returns the id from the 201 response.
    pub fn create(&mut self, command: &str) -> String {
        let wire = self.roundtrip(command);
        assert!(wire.contains("status=\"201\""), "create failed: {wire}");
        extract_attr(&wire, "id")
    }

    /// Drives one completion poll, as the host loop would between reads.
    pub fn poll_scans(&self) {
        let mut coordinator = self.coordinator.lock().expect("coordinator lock");
        coordinator
            .poll_completion(self.backend.as_ref())
            .expect("completion poll");
    }
}

/// Pulls `name="value"` out of a serialised response.
pub fn extract_attr(wire: &str, name: &str) -> String {
    let marker = format!("{name}=\"");
    let start = wire.find(&marker).map(|index| index + marker.len());
    let start = start.unwrap_or_else(|| panic!("attribute {name} missing in {wire}"));
    let rest = &wire[start..];
    let end = rest.find('"').unwrap_or_else(|| panic!("unterminated {name} in {wire}"));
    rest[..end].to_string()
}

/// Pulls the text of `<name>...</name>` out of a serialised response.
pub fn extract_element(wire: &str, name: &str) -> String {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = wire
        .find(&open)
        .map(|index| index + open.len())
        .unwrap_or_else(|| panic!("element {name} missing in {wire}"));
    let end = wire[start..]
        .find(&close)
        .unwrap_or_else(|| panic!("unterminated {name} in {wire}"));
    wire[start..start + end].to_string()
}
