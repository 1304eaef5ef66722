//! Per-command staging of attributes, texts, and repeated groups.
//!
//! While a command body is open, everything the parser sees lands here
//! keyed by element path. Typed requests are materialised from the store
//! only when the command root closes, so a half-received command never
//! reaches the backend.

use std::collections::BTreeMap;

/// One frozen occurrence of a repeating element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub fields: BTreeMap<String, String>,
}

/// Accumulates the body of the command currently being parsed.
#[derive(Debug, Default)]
pub struct Staging {
    attrs: BTreeMap<String, String>,
    texts: BTreeMap<String, String>,
    groups: BTreeMap<&'static str, Vec<Group>>,
    open: Vec<(&'static str, Group)>,
}

impl Staging {
    /// Drops everything staged for the current command.
    pub fn clear(&mut self) {
        self.attrs.clear();
        self.texts.clear();
        self.groups.clear();
        self.open.clear();
    }

    /// Records an attribute of the element at `path` (`""` for the command
    /// root itself).
    pub fn stage_attr(&mut self, path: &str, name: &str, value: String) {
        if let Some((group_path, group)) = self.innermost_open(path) {
            let key = relative_key(group_path, path);
            if key.is_empty() {
                group.attrs.insert(name.to_owned(), value);
            } else {
                group.attrs.insert(format!("{key}@{name}"), value);
            }
            return;
        }
        self.attrs.insert(format!("{path}@{name}"), value);
    }

    /// Appends character data to the element at `path`.
    pub fn append_text(&mut self, path: &str, text: &str) {
        if let Some((group_path, group)) = self.innermost_open(path) {
            let key = relative_key(group_path, path);
            if key.is_empty() {
                group.text.push_str(text);
            } else {
                group
                    .fields
                    .entry(key.to_owned())
                    .or_default()
                    .push_str(text);
            }
            return;
        }
        self.texts.entry(path.to_owned()).or_default().push_str(text);
    }

    /// Opens a new occurrence of the repeating element at `path`.
    pub fn open_group(&mut self, path: &'static str) {
        self.open.push((path, Group::default()));
    }

    /// Freezes the innermost open occurrence of `path` into the group list.
    pub fn close_group(&mut self, path: &'static str) {
        if let Some(position) = self.open.iter().rposition(|(open, _)| *open == path) {
            let (_, group) = self.open.remove(position);
            self.groups.entry(path).or_default().push(group);
        }
    }

    /// Attribute of the element at `path`, if staged.
    #[must_use]
    pub fn attr(&self, path: &str, name: &str) -> Option<&str> {
        self.attrs.get(&format!("{path}@{name}")).map(String::as_str)
    }

    /// Attribute of the command root element.
    #[must_use]
    pub fn root_attr(&self, name: &str) -> Option<&str> {
        self.attr("", name)
    }

    /// Accumulated text of the element at `path`, if any was staged.
    #[must_use]
    pub fn text(&self, path: &str) -> Option<&str> {
        self.texts.get(path).map(String::as_str)
    }

    /// All frozen occurrences of the repeating element at `path`.
    #[must_use]
    pub fn groups(&self, path: &str) -> &[Group] {
        self.groups.get(path).map_or(&[], Vec::as_slice)
    }

    fn innermost_open(&mut self, path: &str) -> Option<(&'static str, &mut Group)> {
        let (group_path, group) = self.open.last_mut()?;
        let group_path = *group_path;
        if path == group_path
            || (path.starts_with(group_path)
                && path.as_bytes().get(group_path.len()) == Some(&b'/'))
        {
            Some((group_path, group))
        } else {
            None
        }
    }
}

fn relative_key<'a>(group_path: &str, path: &'a str) -> &'a str {
    if path.len() > group_path.len() {
        path.get(group_path.len() + 1..).unwrap_or("")
    } else {
        ""
    }
}
