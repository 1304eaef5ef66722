//! Managed resource kinds and the generic rows returned for listing.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kinds of managed resources addressable by id.
///
/// The `Display` form is the wire spelling used in response element names
/// and "Failed to find ..." status texts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResourceKind {
    Agent,
    Config,
    Escalator,
    LscCredential,
    Note,
    Override,
    ReportFormat,
    Schedule,
    Slave,
    Target,
    Task,
}

impl ResourceKind {
    /// Name of the id attribute addressing this kind, e.g. `task_id`.
    #[must_use]
    pub fn id_attribute(self) -> String {
        format!("{self}_id")
    }
}

/// One backend row rendered inside a `GET_*` response.
///
/// `extra` holds kind-specific child elements in rendering order, so the
/// engine never needs per-kind row structs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRow {
    pub id: String,
    pub name: String,
    pub comment: String,
    pub extra: Vec<(String, String)>,
}

impl ResourceRow {
    /// Builds a row with the always-present fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            comment: comment.into(),
            extra: Vec::new(),
        }
    }

    /// Appends a kind-specific child element.
    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }
}
