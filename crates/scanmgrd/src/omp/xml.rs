//! Incremental XML tokenisation over an accumulating byte buffer.
//!
//! Client reads arrive in arbitrary chunks, so the pump re-parses the
//! whole retained buffer on every drain and yields only the events it has
//! not yielded before. Bytes are discarded once the parse returns to the
//! top level, where the remaining tail is a well-formed document on its
//! own; inside an open element everything is retained so that a close tag
//! arriving chunks later still finds its open. A trailing text node is
//! held back, raw, until the event after it arrives, because more
//! character data (or the rest of a split entity) may still be in flight.

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Upper bound on bytes retained while waiting for an element to finish.
const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// One structural event lifted from the client stream. Element names are
/// lowercased at this boundary so the rest of the engine matches
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        empty: bool,
    },
    Text(String),
    Close {
        name: String,
    },
}

/// Input that can never become well-formed XML, however much more of it
/// arrives.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct XmlSyntaxError {
    message: String,
}

impl XmlSyntaxError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A text node read from the buffer but not yet proven complete.
enum HeldText {
    /// Character data still carrying entity references.
    Escaped(String),
    /// CDATA content, delivered verbatim.
    Verbatim(String),
}

impl HeldText {
    fn into_event(self) -> Result<XmlEvent, XmlSyntaxError> {
        match self {
            Self::Escaped(raw) => {
                let unescaped = quick_xml::escape::unescape(&raw).map_err(|err| {
                    XmlSyntaxError::new(format!("bad character data: {err}"))
                })?;
                Ok(XmlEvent::Text(unescaped.into_owned()))
            }
            Self::Verbatim(text) => Ok(XmlEvent::Text(text)),
        }
    }
}

/// Accumulates raw bytes and yields the complete events they contain.
#[derive(Debug, Default)]
pub struct EventPump {
    buf: Vec<u8>,
    /// Events already yielded from the retained bytes, skipped on re-parse.
    yielded: usize,
}

impl EventPump {
    /// Appends a freshly read chunk of client bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Discards any partial input, e.g. after a protocol error.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.yielded = 0;
    }

    /// Bytes currently held back waiting for more input.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Lifts every complete event out of the buffer. Incomplete trailing
    /// input is retained for the next push; an empty vector just means no
    /// event has finished yet.
    pub fn drain(&mut self) -> Result<Vec<XmlEvent>, XmlSyntaxError> {
        let mut reader = Reader::from_reader(self.buf.as_slice());
        reader.config_mut().trim_text(true);
        // End-tag names are checked against the grammar path upstream.
        reader.config_mut().check_end_names = false;

        let mut events = Vec::new();
        let mut depth = 0usize;
        let mut held: Option<HeldText> = None;
        // Byte offset and event count at the last top-level boundary; the
        // tail after that offset parses as a document of its own.
        let mut trim_bytes = 0usize;
        let mut trim_events = 0usize;

        loop {
            let event = match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(event) => event,
                Err(err) => {
                    // The reader stops at the point of failure. Failure at
                    // the end of the buffer means the input was cut short
                    // mid-construct and may still complete.
                    if buffer_position(&reader) >= self.buf.len() {
                        break;
                    }
                    return Err(XmlSyntaxError::new(format!("malformed XML: {err}")));
                }
            };
            if let Some(held) = held.take() {
                events.push(held.into_event()?);
            }
            match event {
                Event::Start(start) => {
                    events.push(open_event(&start, false)?);
                    depth += 1;
                }
                Event::Empty(start) => {
                    events.push(open_event(&start, true)?);
                }
                Event::End(end) => {
                    events.push(XmlEvent::Close {
                        name: lowercase_name(end.local_name().as_ref()),
                    });
                    depth = depth.saturating_sub(1);
                }
                Event::Text(text) => {
                    let raw = String::from_utf8_lossy(text.as_ref()).into_owned();
                    held = Some(HeldText::Escaped(raw));
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(data.as_ref()).into_owned();
                    held = Some(HeldText::Verbatim(text));
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) | Event::Eof => {}
            }
            if depth == 0 && held.is_none() {
                trim_bytes = buffer_position(&reader);
                trim_events = events.len();
            }
        }

        // Everything parsed this time includes everything yielded before,
        // because the retained bytes have not changed under the parser.
        let fresh = events.split_off(self.yielded.min(events.len()));
        self.yielded = events.len() + fresh.len();

        self.buf.drain(..trim_bytes.min(self.buf.len()));
        self.yielded = self.yielded.saturating_sub(trim_events);
        if self.buf.len() > MAX_PENDING_BYTES {
            return Err(XmlSyntaxError::new("client message too long"));
        }
        Ok(fresh)
    }
}

fn buffer_position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn open_event(
    start: &quick_xml::events::BytesStart<'_>,
    empty: bool,
) -> Result<XmlEvent, XmlSyntaxError> {
    let mut attrs = Vec::new();
    for attribute in start.attributes() {
        let attribute =
            attribute.map_err(|err| XmlSyntaxError::new(format!("bad attribute: {err}")))?;
        let value = attribute
            .unescape_value()
            .map_err(|err| XmlSyntaxError::new(format!("bad attribute value: {err}")))?;
        attrs.push((
            lowercase_name(attribute.key.local_name().as_ref()),
            value.into_owned(),
        ));
    }
    Ok(XmlEvent::Open {
        name: lowercase_name(start.local_name().as_ref()),
        attrs,
        empty,
    })
}

fn lowercase_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}
