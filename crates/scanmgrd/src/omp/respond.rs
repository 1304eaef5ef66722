//! Response construction and serialisation.

use std::borrow::Cow;

use scanmgr_types::{ResourceRow, StatusKind};

use super::errors::OmpError;

/// Escapes the characters XML never allows raw. Apostrophes stay literal:
/// attribute values are always double-quoted on this wire, and clients
/// expect ids echoed back exactly as sent.
fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// One `<command>_response` document headed for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    command: &'static str,
    status: StatusKind,
    text: String,
    id: Option<String>,
    body: String,
}

impl Response {
    /// A success response carrying the status kind's stock text.
    #[must_use]
    pub fn ok(command: &'static str, status: StatusKind) -> Self {
        Self {
            command,
            status,
            text: status.default_text().to_owned(),
            id: None,
            body: String::new(),
        }
    }

    /// A response for a failed command.
    #[must_use]
    pub fn error(command: &'static str, error: &OmpError) -> Self {
        let status = error.status();
        Self {
            command,
            status,
            text: error.status_text(),
            id: None,
            body: String::new(),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Adds the `id` attribute reported for freshly created resources.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Appends pre-serialised child elements to the response body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body.push_str(&body.into());
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusKind {
        self.status
    }

    #[must_use]
    pub fn command(&self) -> &'static str {
        self.command
    }

    /// Serialises the response to wire bytes.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push('<');
        out.push_str(self.command);
        out.push_str("_response status=\"");
        out.push_str(&self.status.code().to_string());
        out.push_str("\" status_text=\"");
        out.push_str(&escape(self.text.as_str()));
        out.push('"');
        if let Some(id) = &self.id {
            out.push_str(" id=\"");
            out.push_str(&escape(id.as_str()));
            out.push('"');
        }
        if self.body.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            out.push_str(&self.body);
            out.push_str("</");
            out.push_str(self.command);
            out.push_str("_response>");
        }
        out.into_bytes()
    }
}

/// Serialises one child element with escaped text content.
#[must_use]
pub fn element(name: &str, text: &str) -> String {
    if text.is_empty() {
        format!("<{name}/>")
    } else {
        format!("<{name}>{}</{name}>", escape(text))
    }
}

/// Serialises backend rows as the body of a listing response. The element
/// name is the singular resource kind, with the row id carried as an
/// attribute and name, comment, and any extra columns as children.
#[must_use]
pub fn render_rows(kind: scanmgr_types::ResourceKind, rows: &[ResourceRow]) -> String {
    let mut body = String::new();
    for row in rows {
        body.push('<');
        body.push_str(&kind.to_string());
        body.push_str(" id=\"");
        body.push_str(&escape(row.id.as_str()));
        body.push_str("\">");
        body.push_str(&element("name", &row.name));
        body.push_str(&element("comment", &row.comment));
        for (field, value) in &row.extra {
            body.push_str(&element(field, value));
        }
        body.push_str("</");
        body.push_str(&kind.to_string());
        body.push('>');
    }
    body
}
