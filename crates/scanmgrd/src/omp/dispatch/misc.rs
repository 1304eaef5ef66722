//! AUTHENTICATE, GET_VERSION and HELP.

use tracing::info;

use scanmgr_types::StatusKind;

use crate::backend::ManagementBackend;

use super::super::OMP_TARGET;
use super::super::errors::OmpError;
use super::super::grammar::COMMAND_NAMES;
use super::super::machine::{AuthView, ClientState};
use super::super::respond::Response;
use super::super::staging::Staging;
use super::classify;

/// Checks the staged credentials against the backend.
///
/// Re-authentication of an already authentic session first releases the
/// task state loaded for the old identity; a failed attempt always leaves
/// the session logged out.
pub(super) fn authenticate(
    staging: &Staging,
    auth: AuthView<'_>,
    backend: &dyn ManagementBackend,
) -> Response {
    let command = "authenticate";
    if *auth.client == ClientState::Authentic {
        *auth.client = ClientState::Top;
        *auth.username = None;
        if let Err(error) = backend.release_tasks() {
            return Response::error(command, &classify(error));
        }
    }

    let username = staging.text("credentials/username").unwrap_or("");
    let password = staging.text("credentials/password").unwrap_or("");
    if username.is_empty() {
        return Response::error(
            command,
            &OmpError::syntax("AUTHENTICATE requires a username"),
        );
    }

    match backend.authenticate(username, password) {
        Ok(true) => {
            if let Err(error) = backend.load_tasks() {
                return Response::error(command, &classify(error));
            }
            *auth.client = ClientState::Authentic;
            *auth.username = Some(username.to_owned());
            info!(target: OMP_TARGET, username, "session authenticated");
            Response::ok(command, StatusKind::Ok)
        }
        Ok(false) => {
            info!(target: OMP_TARGET, username, "authentication refused");
            Response::ok(command, StatusKind::Syntax).with_text("Authentication failed")
        }
        Err(error) => Response::error(command, &classify(error)),
    }
}

pub(super) fn get_version() -> Response {
    Response::ok("get_version", StatusKind::Ok)
        .with_body("<version preferred=\"1\">1.0</version>")
}

/// Lists every command the processor understands, one per line.
pub(super) fn help() -> Response {
    let mut listing = String::from("\n");
    for name in COMMAND_NAMES {
        listing.push_str(&name.to_ascii_uppercase());
        listing.push('\n');
    }
    Response::ok("help", StatusKind::Ok).with_body(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, MockManagementBackend};

    fn credentials(username: &str, password: &str) -> Staging {
        let mut staging = Staging::default();
        staging.append_text("credentials/username", username);
        staging.append_text("credentials/password", password);
        staging
    }

    fn view<'a>(
        client: &'a mut ClientState,
        username: &'a mut Option<String>,
    ) -> AuthView<'a> {
        AuthView { client, username }
    }

    #[test]
    fn accepted_credentials_authenticate_the_session() {
        let mut backend = MockManagementBackend::new();
        backend
            .expect_authenticate()
            .withf(|username, password| username == "om" && password == "secret")
            .returning(|_, _| Ok(true));
        backend.expect_load_tasks().times(1).returning(|| Ok(()));
        let mut client = ClientState::Top;
        let mut username = None;
        let response = authenticate(
            &credentials("om", "secret"),
            view(&mut client, &mut username),
            &backend,
        );
        assert_eq!(response.status(), StatusKind::Ok);
        assert_eq!(client, ClientState::Authentic);
        assert_eq!(username.as_deref(), Some("om"));
    }

    #[test]
    fn refused_credentials_answer_400_and_stay_logged_out() {
        let mut backend = MockManagementBackend::new();
        backend.expect_authenticate().returning(|_, _| Ok(false));
        let mut client = ClientState::Top;
        let mut username = None;
        let response = authenticate(
            &credentials("om", "wrong"),
            view(&mut client, &mut username),
            &backend,
        );
        assert_eq!(response.status(), StatusKind::Syntax);
        let wire = String::from_utf8(response.render()).expect("utf-8");
        assert!(wire.contains("Authentication failed"));
        assert_eq!(client, ClientState::Top);
        assert!(username.is_none());
    }

    #[test]
    fn reauthentication_releases_the_previous_identity_first() {
        let mut backend = MockManagementBackend::new();
        backend.expect_release_tasks().times(1).returning(|| Ok(()));
        backend.expect_authenticate().returning(|_, _| Ok(false));
        let mut client = ClientState::Authentic;
        let mut username = Some("old".to_string());
        let response = authenticate(
            &credentials("new", "pw"),
            view(&mut client, &mut username),
            &backend,
        );
        assert_eq!(response.status(), StatusKind::Syntax);
        assert_eq!(client, ClientState::Top);
        assert!(username.is_none());
    }

    #[test]
    fn backend_failure_during_authentication_is_internal() {
        let mut backend = MockManagementBackend::new();
        backend
            .expect_authenticate()
            .returning(|_, _| Err(BackendError::Storage("db".into())));
        let mut client = ClientState::Top;
        let mut username = None;
        let response = authenticate(
            &credentials("om", "pw"),
            view(&mut client, &mut username),
            &backend,
        );
        assert_eq!(response.status(), StatusKind::Internal);
    }

    #[test]
    fn get_version_names_the_preferred_protocol() {
        let wire = String::from_utf8(get_version().render()).expect("utf-8");
        assert!(wire.contains("<version preferred=\"1\">1.0</version>"));
    }

    #[test]
    fn help_lists_every_command() {
        let wire = String::from_utf8(help().render()).expect("utf-8");
        assert!(wire.contains("HELP\n"));
        assert!(wire.contains("RESUME_OR_START_TASK\n"));
        assert!(wire.contains("VERIFY_REPORT_FORMAT\n"));
    }
}
