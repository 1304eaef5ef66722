//! Per-session protocol state machine.
//!
//! One machine instance lives inside each client session and consumes
//! the lowercased events produced by [`super::xml::EventPump`]. Legal
//! nesting comes from the command's grammar table; everything staged for
//! the command is dispatched in one piece when the command root closes.

use tracing::debug;

use super::OMP_TARGET;
use super::dispatch::{self, DispatchContext};
use super::errors::OmpError;
use super::grammar::{self, CommandKind};
use super::respond::Response;
use super::staging::Staging;
use super::xml::XmlEvent;

/// Authentication state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Top,
    Authentic,
}

/// Result of feeding one event to the machine.
#[derive(Debug)]
pub enum StepOutcome {
    /// The event was absorbed; nothing to send yet.
    Quiet,
    /// A command completed and produced a response.
    Respond(Response),
    /// The event violated the protocol. The response should be sent and
    /// the session poisoned until the host resets it.
    Reject(Response),
}

/// The command currently being received.
#[derive(Debug)]
struct Frame {
    kind: CommandKind,
    /// Grammar path of the innermost open element, `""` at the root.
    path: &'static str,
    /// Nesting depth of ignored children while `failed` is set.
    lenient_depth: usize,
    /// Set when the command is already doomed (e.g. sent before
    /// authentication) but its body must still be consumed.
    failed: Option<OmpError>,
}

#[derive(Debug, Default)]
pub struct Machine {
    client: ClientState,
    username: Option<String>,
    wrapper_open: bool,
    current: Option<Frame>,
    staging: Staging,
}

impl Machine {
    #[must_use]
    pub fn client(&self) -> ClientState {
        self.client
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Abandons any half-received command. Authentication survives.
    pub fn abort_command(&mut self) {
        self.current = None;
        self.wrapper_open = false;
        self.staging.clear();
    }

    /// Applies one event against the current command state.
    pub fn handle(&mut self, event: XmlEvent, ctx: &mut DispatchContext<'_>) -> StepOutcome {
        match event {
            XmlEvent::Open { name, attrs, empty } => {
                let outcome = self.open_element(&name, attrs);
                if empty {
                    match outcome {
                        StepOutcome::Quiet => self.close_element(&name, ctx),
                        rejected => rejected,
                    }
                } else {
                    outcome
                }
            }
            XmlEvent::Text(text) => {
                if let Some(frame) = &self.current {
                    if frame.failed.is_none() {
                        self.staging.append_text(frame.path, &text);
                    }
                }
                StepOutcome::Quiet
            }
            XmlEvent::Close { name } => self.close_element(&name, ctx),
        }
    }

    fn open_element(&mut self, name: &str, attrs: Vec<(String, String)>) -> StepOutcome {
        if let Some(frame) = &mut self.current {
            if frame.failed.is_some() {
                frame.lenient_depth = frame.lenient_depth.saturating_add(1);
                return StepOutcome::Quiet;
            }
            let Some(rule) = grammar::child_rule(frame.kind.grammar(), frame.path, name) else {
                debug!(
                    target: OMP_TARGET,
                    command = frame.kind.name(),
                    element = name,
                    "bogus element in command body"
                );
                return StepOutcome::Reject(Response::error(
                    frame.kind.name(),
                    &OmpError::syntax(format!("Bogus element: {name}")),
                ));
            };
            if rule.repeats {
                self.staging.open_group(rule.path);
            }
            for (attr, value) in attrs {
                self.staging.stage_attr(rule.path, &attr, value);
            }
            frame.path = rule.path;
            return StepOutcome::Quiet;
        }

        if name == "commands" {
            if self.wrapper_open {
                return StepOutcome::Reject(Response::error(
                    "commands",
                    &OmpError::syntax("Bogus element: commands"),
                ));
            }
            self.wrapper_open = true;
            return StepOutcome::Quiet;
        }

        let Some(kind) = CommandKind::from_name(name) else {
            debug!(target: OMP_TARGET, element = name, "unrecognised command element");
            return StepOutcome::Reject(Response::error(
                "omp",
                &OmpError::syntax("Bogus command name"),
            ));
        };
        let failed = if self.client == ClientState::Top && !kind.allowed_pre_auth() {
            Some(OmpError::Unauthenticated)
        } else {
            None
        };
        if failed.is_none() {
            for (attr, value) in attrs {
                self.staging.stage_attr("", &attr, value);
            }
        }
        self.current = Some(Frame {
            kind,
            path: "",
            lenient_depth: 0,
            failed,
        });
        StepOutcome::Quiet
    }

    fn close_element(&mut self, name: &str, ctx: &mut DispatchContext<'_>) -> StepOutcome {
        let Some(frame) = &mut self.current else {
            if self.wrapper_open && name == "commands" {
                self.wrapper_open = false;
                return StepOutcome::Quiet;
            }
            return StepOutcome::Reject(Response::error(
                "omp",
                &OmpError::syntax(format!("Unexpected element close: {name}")),
            ));
        };

        if frame.failed.is_some() {
            if frame.lenient_depth > 0 {
                frame.lenient_depth -= 1;
                return StepOutcome::Quiet;
            }
            return self.finish_command(ctx);
        }

        if frame.path.is_empty() {
            if name != frame.kind.name() {
                let command = frame.kind.name();
                return StepOutcome::Reject(Response::error(
                    command,
                    &OmpError::syntax(format!("Mismatched element close: {name}")),
                ));
            }
            return self.finish_command(ctx);
        }

        if name != leaf(frame.path) {
            let command = frame.kind.name();
            return StepOutcome::Reject(Response::error(
                command,
                &OmpError::syntax(format!("Mismatched element close: {name}")),
            ));
        }
        let closing = frame.path;
        if grammar::child_rule(frame.kind.grammar(), grammar::parent_path(closing), name)
            .is_some_and(|rule| rule.repeats)
        {
            self.staging.close_group(closing);
        }
        frame.path = grammar::parent_path(closing);
        StepOutcome::Quiet
    }

    fn finish_command(&mut self, ctx: &mut DispatchContext<'_>) -> StepOutcome {
        let Some(frame) = self.current.take() else {
            return StepOutcome::Quiet;
        };
        let response = dispatch::execute(
            frame.kind,
            &self.staging,
            frame.failed,
            AuthView {
                client: &mut self.client,
                username: &mut self.username,
            },
            ctx,
        );
        self.staging.clear();
        StepOutcome::Respond(response)
    }
}

/// Mutable view of the session's authentication state, handed to the
/// AUTHENTICATE handler.
pub struct AuthView<'a> {
    pub client: &'a mut ClientState,
    pub username: &'a mut Option<String>,
}

fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use scanmgr_types::StatusKind;

    use super::super::xml::EventPump;
    use super::*;
    use crate::backend::MockManagementBackend;
    use crate::taskctl::{ScanHandle, ScanRunner, ScanWorkerError, TaskCoordinator};

    struct NoRunner;

    impl ScanRunner for NoRunner {
        fn launch(&self, _task_id: &str, _report_id: &str) -> Result<ScanHandle, ScanWorkerError> {
            Err(ScanWorkerError("no runner in this test".to_string()))
        }
    }

    fn feed(machine: &mut Machine, backend: &MockManagementBackend, input: &str) -> Vec<StepOutcome> {
        let mut coordinator = TaskCoordinator::new(Box::new(NoRunner));
        let mut ctx = DispatchContext {
            backend,
            coordinator: &mut coordinator,
        };
        let mut pump = EventPump::default();
        pump.push(input.as_bytes());
        pump.drain()
            .expect("well formed input")
            .into_iter()
            .map(|event| machine.handle(event, &mut ctx))
            .collect()
    }

    fn single_response(outcomes: Vec<StepOutcome>) -> Response {
        let mut responses: Vec<Response> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                StepOutcome::Respond(response) => Some(response),
                StepOutcome::Quiet => None,
                StepOutcome::Reject(response) => panic!("unexpected reject: {response:?}"),
            })
            .collect();
        assert_eq!(responses.len(), 1);
        responses.remove(0)
    }

    #[test]
    fn get_version_answers_before_authentication() {
        let backend = MockManagementBackend::new();
        let mut machine = Machine::default();
        let response = single_response(feed(&mut machine, &backend, "<get_version/>"));
        assert_eq!(response.status(), StatusKind::Ok);
        assert_eq!(response.command(), "get_version");
    }

    #[test]
    fn commands_sent_before_authentication_get_401() {
        let backend = MockManagementBackend::new();
        let mut machine = Machine::default();
        let response = single_response(feed(
            &mut machine,
            &backend,
            "<create_target><name>x</name></create_target>",
        ));
        assert_eq!(response.status(), StatusKind::Unauthenticated);
        assert_eq!(machine.client(), ClientState::Top);
    }

    #[test]
    fn unknown_elements_are_rejected() {
        let backend = MockManagementBackend::new();
        let mut machine = Machine::default();
        let outcomes = feed(&mut machine, &backend, "<omp_exploit/>");
        assert!(matches!(
            outcomes.as_slice(),
            [StepOutcome::Reject(response)] if response.status() == StatusKind::Syntax
        ));
    }

    #[test]
    fn bogus_children_are_rejected_with_the_command_name() {
        let backend = MockManagementBackend::new();
        let mut machine = Machine::default();
        machine.client = ClientState::Authentic;
        let outcomes = feed(
            &mut machine,
            &backend,
            "<create_target><surprise/></create_target>",
        );
        let reject = outcomes
            .iter()
            .find_map(|outcome| match outcome {
                StepOutcome::Reject(response) => Some(response),
                StepOutcome::Quiet | StepOutcome::Respond(_) => None,
            })
            .unwrap_or_else(|| panic!("expected a reject in {outcomes:?}"));
        assert_eq!(reject.command(), "create_target");
        assert_eq!(reject.status(), StatusKind::Syntax);
    }

    #[test]
    fn the_commands_wrapper_is_transparent() {
        let backend = MockManagementBackend::new();
        let mut machine = Machine::default();
        let outcomes = feed(
            &mut machine,
            &backend,
            "<commands><get_version/><get_version/></commands>",
        );
        let responses = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, StepOutcome::Respond(_)))
            .count();
        assert_eq!(responses, 2);
        assert!(!machine.wrapper_open);
    }

    #[test]
    fn nested_wrappers_are_rejected() {
        let backend = MockManagementBackend::new();
        let mut machine = Machine::default();
        let outcomes = feed(&mut machine, &backend, "<commands><commands>");
        assert!(matches!(
            outcomes.as_slice(),
            [StepOutcome::Quiet, StepOutcome::Reject(_)]
        ));
    }

    #[test]
    fn abort_command_keeps_authentication() {
        let backend = MockManagementBackend::new();
        let mut machine = Machine::default();
        machine.client = ClientState::Authentic;
        feed(&mut machine, &backend, "<create_target><name>half");
        machine.abort_command();
        assert!(machine.current.is_none());
        assert_eq!(machine.client(), ClientState::Authentic);
    }
}
