//! Generic resource handlers shared by the `GET_*`, `DELETE_*` and
//! `MODIFY_*` families.

use tracing::info;

use scanmgr_types::{ResourceKind, StatusKind};

use crate::backend::{ManagementBackend, ModifyRequest, RowSelector};

use super::super::OMP_TARGET;
use super::super::errors::OmpError;
use super::super::grammar::CommandKind;
use super::super::respond::{Response, render_rows};
use super::super::staging::Staging;
use super::{classify, find_resource};

fn addressed_kind(kind: CommandKind) -> Result<ResourceKind, OmpError> {
    kind.resource().ok_or_else(|| {
        OmpError::internal(format!("{} addresses no resource kind", kind.name()))
    })
}

/// `GET_*`: list every row, or just the one the id attribute names.
pub(super) fn get(
    kind: CommandKind,
    staging: &Staging,
    backend: &dyn ManagementBackend,
) -> Result<Response, OmpError> {
    let resource = addressed_kind(kind)?;
    let id = staging.root_attr(&resource.id_attribute());
    // A named resource must exist before it can be listed.
    if let Some(id) = id {
        find_resource(backend, resource, Some(id))?;
    }
    let selector = RowSelector {
        id: id.map(str::to_owned),
        details: staging.root_attr("details") == Some("1"),
    };
    let rows = backend.rows(resource, &selector).map_err(classify)?;
    Ok(Response::ok(kind.name(), StatusKind::Ok).with_body(render_rows(resource, &rows)))
}

/// `DELETE_*` for everything but tasks, which go through the coordinator.
pub(super) fn delete(
    kind: CommandKind,
    staging: &Staging,
    backend: &dyn ManagementBackend,
) -> Result<Response, OmpError> {
    let resource = addressed_kind(kind)?;
    let handle = find_resource(backend, resource, staging.root_attr(&resource.id_attribute()))?;
    backend.delete(&handle).map_err(classify)?;
    info!(
        target: OMP_TARGET,
        command = kind.name(),
        resource = %resource,
        id = %handle.id,
        "resource deleted"
    );
    Ok(Response::ok(kind.name(), StatusKind::Ok))
}

/// `MODIFY_*`: resolve the resource, then apply the staged fields.
pub(super) fn modify(
    kind: CommandKind,
    staging: &Staging,
    backend: &dyn ManagementBackend,
) -> Result<Response, OmpError> {
    let resource = addressed_kind(kind)?;
    let handle = find_resource(backend, resource, staging.root_attr(&resource.id_attribute()))?;
    let request = modification(kind, staging)?;
    backend.modify(&handle, request).map_err(classify)?;
    info!(
        target: OMP_TARGET,
        command = kind.name(),
        resource = %resource,
        id = %handle.id,
        "resource modified"
    );
    Ok(Response::ok(kind.name(), StatusKind::Ok))
}

fn modification(kind: CommandKind, staging: &Staging) -> Result<ModifyRequest, OmpError> {
    use CommandKind as C;
    match kind {
        C::ModifyNote => Ok(ModifyRequest::Note {
            text: require_text(staging, kind, "text")?,
            hosts: text(staging, "hosts"),
            port: text(staging, "port"),
            threat: text(staging, "threat"),
        }),
        C::ModifyOverride => Ok(ModifyRequest::Override {
            text: require_text(staging, kind, "text")?,
            hosts: text(staging, "hosts"),
            port: text(staging, "port"),
            threat: text(staging, "threat"),
            new_threat: text(staging, "new_threat"),
        }),
        C::ModifyReportFormat => Ok(ModifyRequest::ReportFormat {
            name: optional(staging, "name"),
            summary: optional(staging, "summary"),
            active: active_flag(staging)?,
            params: params(staging)?,
        }),
        C::ModifyTask => Ok(ModifyRequest::Task {
            name: optional(staging, "name"),
            comment: optional(staging, "comment"),
            rcfile: optional(staging, "rcfile"),
        }),
        other => Err(OmpError::internal(format!(
            "{} routed to the modify handler",
            other.name()
        ))),
    }
}

fn active_flag(staging: &Staging) -> Result<Option<bool>, OmpError> {
    match staging.text("active") {
        None | Some("") => Ok(None),
        Some("0") => Ok(Some(false)),
        Some("1") => Ok(Some(true)),
        Some(_) => Err(OmpError::syntax("Failed to parse active")),
    }
}

fn params(staging: &Staging) -> Result<Vec<(String, String)>, OmpError> {
    staging
        .groups("param")
        .iter()
        .map(|group| {
            let name = group
                .fields
                .get("name")
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    OmpError::syntax("Every param element requires a name element")
                })?;
            let value = group.fields.get("value").cloned().unwrap_or_default();
            Ok((name.clone(), value))
        })
        .collect()
}

fn text(staging: &Staging, path: &str) -> String {
    staging.text(path).unwrap_or_default().to_owned()
}

fn optional(staging: &Staging, path: &str) -> Option<String> {
    staging
        .text(path)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn require_text(staging: &Staging, kind: CommandKind, path: &str) -> Result<String, OmpError> {
    optional(staging, path).ok_or_else(|| {
        OmpError::syntax(format!(
            "{} requires a {path} element",
            kind.name().to_ascii_uppercase()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockManagementBackend, ResourceHandle};
    use scanmgr_types::ResourceRow;

    #[test]
    fn get_without_an_id_lists_every_row() {
        let mut backend = MockManagementBackend::new();
        backend
            .expect_rows()
            .withf(|kind, selector| {
                *kind == ResourceKind::Target && selector.id.is_none() && !selector.details
            })
            .returning(|_, _| {
                Ok(vec![ResourceRow::new("tgt-1", "Local", "loopback")])
            });
        let response = get(CommandKind::GetTargets, &Staging::default(), &backend)
            .expect("listing succeeds");
        let wire = String::from_utf8(response.render()).expect("utf-8");
        assert!(wire.starts_with("<get_targets_response status=\"200\""));
        assert!(wire.contains("<target id=\"tgt-1\">"));
    }

    #[test]
    fn get_with_an_unknown_id_is_not_found_before_listing() {
        let mut backend = MockManagementBackend::new();
        backend.expect_find().returning(|_, _| Ok(None));
        let mut staging = Staging::default();
        staging.stage_attr("", "task_id", "not-a-real-id".into());
        let error =
            get(CommandKind::GetTasks, &staging, &backend).expect_err("unknown id refused");
        assert_eq!(error.status(), StatusKind::NotFound);
    }

    #[test]
    fn get_forwards_the_details_flag() {
        let mut backend = MockManagementBackend::new();
        backend
            .expect_find()
            .returning(|kind, id| Ok(Some(ResourceHandle::new(kind, id))));
        backend
            .expect_rows()
            .withf(|_, selector| selector.details && selector.id.as_deref() == Some("t-1"))
            .returning(|_, _| Ok(vec![]));
        let mut staging = Staging::default();
        staging.stage_attr("", "task_id", "t-1".into());
        staging.stage_attr("", "details", "1".into());
        get(CommandKind::GetTasks, &staging, &backend).expect("listing succeeds");
    }

    #[test]
    fn delete_resolves_then_deletes() {
        let mut backend = MockManagementBackend::new();
        backend
            .expect_find()
            .returning(|kind, id| Ok(Some(ResourceHandle::new(kind, id))));
        backend
            .expect_delete()
            .withf(|handle| handle.kind == ResourceKind::Agent && handle.id == "a-1")
            .times(1)
            .returning(|_| Ok(()));
        let mut staging = Staging::default();
        staging.stage_attr("", "agent_id", "a-1".into());
        let response =
            delete(CommandKind::DeleteAgent, &staging, &backend).expect("delete succeeds");
        assert_eq!(response.status(), StatusKind::Ok);
    }

    #[test]
    fn modify_task_sends_only_the_staged_fields() {
        let mut backend = MockManagementBackend::new();
        backend
            .expect_find()
            .returning(|kind, id| Ok(Some(ResourceHandle::new(kind, id))));
        backend
            .expect_modify()
            .withf(|_, request| {
                matches!(
                    request,
                    ModifyRequest::Task { name, comment, rcfile }
                        if name.as_deref() == Some("Renamed")
                            && comment.is_none()
                            && rcfile.is_none()
                )
            })
            .returning(|_, _| Ok(()));
        let mut staging = Staging::default();
        staging.stage_attr("", "task_id", "t-1".into());
        staging.append_text("name", "Renamed");
        let response =
            modify(CommandKind::ModifyTask, &staging, &backend).expect("modify succeeds");
        assert_eq!(response.status(), StatusKind::Ok);
    }

    #[test]
    fn modify_report_format_rejects_a_bad_active_flag() {
        let mut backend = MockManagementBackend::new();
        backend
            .expect_find()
            .returning(|kind, id| Ok(Some(ResourceHandle::new(kind, id))));
        let mut staging = Staging::default();
        staging.stage_attr("", "report_format_id", "rf-1".into());
        staging.append_text("active", "maybe");
        let error = modify(CommandKind::ModifyReportFormat, &staging, &backend)
            .expect_err("bad flag refused");
        assert_eq!(error.status(), StatusKind::Syntax);
    }
}
