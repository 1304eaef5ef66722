//! `CREATE_*` handlers: materialise a typed request from the staging
//! store, hand it to the backend, and answer 201 with the new id.

use tracing::info;

use scanmgr_types::StatusKind;

use crate::backend::{
    ConfigSource, CreateRequest, EscalatorPart, FileAttachment, ManagementBackend, ScheduleTime,
    TimeSpan,
};

use super::super::OMP_TARGET;
use super::super::errors::OmpError;
use super::super::grammar::CommandKind;
use super::super::respond::Response;
use super::super::staging::Staging;
use super::classify;

pub(super) fn execute(
    kind: CommandKind,
    staging: &Staging,
    backend: &dyn ManagementBackend,
) -> Result<Response, OmpError> {
    let request = materialise(kind, staging)?;
    let resource = request.kind();
    let id = backend.create(request).map_err(classify)?;
    info!(
        target: OMP_TARGET,
        command = kind.name(),
        resource = %resource,
        id = %id,
        "resource created"
    );
    Ok(Response::ok(kind.name(), StatusKind::Created).with_id(id))
}

fn materialise(kind: CommandKind, staging: &Staging) -> Result<CreateRequest, OmpError> {
    use CommandKind as C;
    match kind {
        C::CreateAgent => Ok(CreateRequest::Agent {
            name: require(staging, kind, "name")?,
            comment: text(staging, "comment"),
            installer: optional(staging, "installer"),
            howto_install: optional(staging, "howto_install"),
            howto_use: optional(staging, "howto_use"),
        }),
        C::CreateConfig => config(staging),
        C::CreateEscalator => Ok(CreateRequest::Escalator {
            name: require(staging, kind, "name")?,
            comment: text(staging, "comment"),
            condition: part(staging, kind, "condition")?,
            event: part(staging, kind, "event")?,
            method: part(staging, kind, "method")?,
        }),
        C::CreateLscCredential => Ok(CreateRequest::LscCredential {
            name: require(staging, kind, "name")?,
            comment: text(staging, "comment"),
            login: require(staging, kind, "login")?,
            password: optional(staging, "password"),
        }),
        C::CreateNote => Ok(CreateRequest::Note {
            nvt_oid: require_attr(staging, kind, "nvt", "oid")?,
            text: require(staging, kind, "text")?,
            hosts: text(staging, "hosts"),
            port: text(staging, "port"),
            threat: text(staging, "threat"),
            task_id: staging.attr("task", "id").map(str::to_owned),
            result_id: staging.attr("result", "id").map(str::to_owned),
        }),
        C::CreateOverride => Ok(CreateRequest::Override {
            nvt_oid: require_attr(staging, kind, "nvt", "oid")?,
            text: require(staging, kind, "text")?,
            hosts: text(staging, "hosts"),
            port: text(staging, "port"),
            threat: text(staging, "threat"),
            new_threat: require(staging, kind, "new_threat")?,
            task_id: staging.attr("task", "id").map(str::to_owned),
            result_id: staging.attr("result", "id").map(str::to_owned),
        }),
        C::CreateReportFormat => Ok(CreateRequest::ReportFormat {
            name: require(staging, kind, "name")?,
            summary: text(staging, "summary"),
            description: text(staging, "description"),
            extension: text(staging, "extension"),
            content_type: text(staging, "content_type"),
            files: files(staging)?,
        }),
        C::CreateSchedule => Ok(CreateRequest::Schedule {
            name: require(staging, kind, "name")?,
            comment: text(staging, "comment"),
            first_time: first_time(staging)?,
            duration: time_span(staging, "duration")?,
            period: time_span(staging, "period")?,
        }),
        C::CreateSlave => Ok(CreateRequest::Slave {
            name: require(staging, kind, "name")?,
            comment: text(staging, "comment"),
            host: require(staging, kind, "host")?,
            port: port(staging, kind)?,
            login: require(staging, kind, "login")?,
            password: text(staging, "password"),
        }),
        C::CreateTarget => Ok(CreateRequest::Target {
            name: require(staging, kind, "name")?,
            hosts: require(staging, kind, "hosts")?,
            comment: text(staging, "comment"),
        }),
        C::CreateTask => Ok(CreateRequest::Task {
            name: require(staging, kind, "name")?,
            comment: text(staging, "comment"),
            config_id: require_attr(staging, kind, "config", "id")?,
            target_id: require_attr(staging, kind, "target", "id")?,
            schedule_id: staging.attr("schedule", "id").map(str::to_owned),
            slave_id: staging.attr("slave", "id").map(str::to_owned),
        }),
        other => Err(OmpError::internal(format!(
            "{} routed to the create handler",
            other.name()
        ))),
    }
}

/// A config comes from exactly one source; naming both, or neither, are
/// distinct client mistakes.
fn config(staging: &Staging) -> Result<CreateRequest, OmpError> {
    let name = require(staging, CommandKind::CreateConfig, "name")?;
    let comment = text(staging, "comment");
    let source = match (optional(staging, "copy"), optional(staging, "rcfile")) {
        (Some(_), Some(_)) => {
            return Err(OmpError::syntax(
                "CREATE_CONFIG requires either a copy or an rcfile element, not both",
            ));
        }
        (Some(copy), None) => ConfigSource::Copy(copy),
        (None, Some(rcfile)) => ConfigSource::Rcfile(rcfile),
        (None, None) => {
            return Err(OmpError::syntax(
                "CREATE_CONFIG requires a copy or rcfile element",
            ));
        }
    };
    Ok(CreateRequest::Config {
        name,
        comment,
        source,
    })
}

fn part(staging: &Staging, kind: CommandKind, path: &'static str) -> Result<EscalatorPart, OmpError> {
    let discriminator = require(staging, kind, path)?;
    let mut data = Vec::new();
    for group in staging.groups(&format!("{path}/data")) {
        let name = group
            .fields
            .get("name")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                OmpError::syntax(format!(
                    "Every {path} data element requires a name element"
                ))
            })?;
        data.push((name.clone(), group.text.clone()));
    }
    Ok(EscalatorPart {
        kind: discriminator,
        data,
    })
}

fn files(staging: &Staging) -> Result<Vec<FileAttachment>, OmpError> {
    staging
        .groups("file")
        .iter()
        .map(|group| {
            let name = group
                .attrs
                .get("name")
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    OmpError::syntax("Every file element requires a name attribute")
                })?;
            Ok(FileAttachment {
                name: name.clone(),
                content: group.text.clone(),
            })
        })
        .collect()
}

fn first_time(staging: &Staging) -> Result<ScheduleTime, OmpError> {
    Ok(ScheduleTime {
        minute: number(staging, "first_time/minute")?,
        hour: number(staging, "first_time/hour")?,
        day_of_month: number(staging, "first_time/day_of_month")?,
        month: number(staging, "first_time/month")?,
        year: number(staging, "first_time/year")?,
    })
}

fn time_span(staging: &Staging, path: &str) -> Result<Option<TimeSpan>, OmpError> {
    let Some(value) = staging.text(path).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let value = value
        .parse::<u64>()
        .map_err(|_| OmpError::syntax(format!("Failed to parse {path}")))?;
    let unit = staging
        .text(&format!("{path}/unit"))
        .filter(|unit| !unit.is_empty())
        .unwrap_or("second")
        .to_owned();
    Ok(Some(TimeSpan { value, unit }))
}

fn number(staging: &Staging, path: &str) -> Result<u32, OmpError> {
    match staging.text(path) {
        None => Ok(0),
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| OmpError::syntax(format!("Failed to parse {path}"))),
    }
}

fn port(staging: &Staging, kind: CommandKind) -> Result<u16, OmpError> {
    require(staging, kind, "port")?
        .parse::<u16>()
        .map_err(|_| OmpError::syntax("Failed to parse port"))
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

fn require(staging: &Staging, kind: CommandKind, path: &str) -> Result<String, OmpError> {
    optional(staging, path).ok_or_else(|| missing(kind, path))
}

fn require_attr(
    staging: &Staging,
    kind: CommandKind,
    path: &str,
    attr: &str,
) -> Result<String, OmpError> {
    staging
        .attr(path, attr)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            OmpError::syntax(format!(
                "{} requires a {path} element with an {attr} attribute",
                kind.name().to_ascii_uppercase()
            ))
        })
}

fn missing(kind: CommandKind, path: &str) -> OmpError {
    OmpError::syntax(format!(
        "{} requires a {path} element",
        kind.name().to_ascii_uppercase()
    ))
}
