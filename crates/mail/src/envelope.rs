//! Envelope parsing and preview gist extraction
//!
//! A raw submission is decoded with `mail-parser` and reduced to the subject
//! header and a tree of [`BodyPart`]s. The preview gist is the first
//! readable text in that tree, scanning parts in declared order.

use log::debug;
use mail_parser::{Message as ParsedMessage, MessagePart, MessageParser, MimeHeaders, PartType};

/// Content type reported for parts that do not declare one
const DEFAULT_BINARY_TYPE: &str = "application/octet-stream";

/// Raw bytes that cannot be read as mail at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("message is empty")]
    Empty,
    #[error("message has no readable header block")]
    NoHeaders,
}

/// A body part the gist extraction does not know how to read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("don't know how to handle content type {content_type}")]
pub struct UnsupportedContentError {
    pub content_type: String,
}

/// One node of a message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPart {
    /// Decoded textual content (text/plain, text/html, other text/*)
    Text(String),
    /// Container whose children appear in declared order
    Multipart(Vec<BodyPart>),
    /// Anything else: binary attachments, embedded messages
    Unsupported(String),
}

impl BodyPart {
    /// Extract the first readable text from this part.
    ///
    /// Empty text is skipped, as is a nested container that holds no text.
    /// Reaching an unsupported part before any text is found is an error.
    pub fn gist(&self) -> Result<Option<String>, UnsupportedContentError> {
        match self {
            BodyPart::Text(text) => {
                let text = text.trim_end_matches(['\r', '\n']);
                Ok((!text.is_empty()).then(|| text.to_string()))
            }
            BodyPart::Multipart(children) => {
                for child in children {
                    if let Some(gist) = child.gist()? {
                        return Ok(Some(gist));
                    }
                }
                Ok(None)
            }
            BodyPart::Unsupported(content_type) => Err(UnsupportedContentError {
                content_type: content_type.clone(),
            }),
        }
    }
}

/// The parts of a submission the store cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Decoded Subject header, if present
    pub subject: Option<String>,
    pub body: BodyPart,
}

impl Envelope {
    /// Decode a raw submission.
    ///
    /// Fails only when the bytes are not recognizable as mail: empty input
    /// or no header block in front of the body.
    pub fn parse(raw: &[u8]) -> Result<Self, EnvelopeError> {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(EnvelopeError::Empty);
        }
        if !starts_with_header_field(raw) {
            return Err(EnvelopeError::NoHeaders);
        }

        let parsed = MessageParser::default()
            .parse(raw)
            .ok_or(EnvelopeError::NoHeaders)?;
        if parsed.root_part().headers.is_empty() {
            return Err(EnvelopeError::NoHeaders);
        }

        let subject = parsed.subject().map(str::to_string);
        let body = convert_part(&parsed, parsed.root_part());
        debug!("Parsed envelope: subject={:?} body={}", subject, body_shape(&body));

        Ok(Self { subject, body })
    }

    /// First readable body text (see [`BodyPart::gist`])
    pub fn preview_gist(&self) -> Result<Option<String>, UnsupportedContentError> {
        self.body.gist()
    }
}

/// Decode a raw submission (see [`Envelope::parse`])
pub fn parse_envelope(raw: &[u8]) -> Result<Envelope, EnvelopeError> {
    Envelope::parse(raw)
}

/// Check that the first line is a header field: a name of printable ASCII
/// without a colon, followed by a colon.
fn starts_with_header_field(raw: &[u8]) -> bool {
    let first_line = raw.split(|&b| b == b'\n').next().unwrap_or_default();
    match first_line.iter().position(|&b| b == b':') {
        Some(0) | None => false,
        Some(colon) => first_line[..colon].iter().all(|b| b.is_ascii_graphic()),
    }
}

fn convert_part(message: &ParsedMessage<'_>, part: &MessagePart<'_>) -> BodyPart {
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => BodyPart::Text(text.to_string()),
        PartType::Multipart(ids) => BodyPart::Multipart(
            ids.iter()
                .filter_map(|id| message.part(*id))
                .map(|child| convert_part(message, child))
                .collect(),
        ),
        PartType::Binary(_) | PartType::InlineBinary(_) | PartType::Message(_) => {
            BodyPart::Unsupported(content_type_of(part))
        }
    }
}

fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| DEFAULT_BINARY_TYPE.to_string())
}

/// Compact description of a body tree for debug logs
fn body_shape(part: &BodyPart) -> String {
    match part {
        BodyPart::Text(text) => format!("text({})", text.len()),
        BodyPart::Multipart(children) => {
            let inner: Vec<String> = children.iter().map(body_shape).collect();
            format!("multipart[{}]", inner.join(","))
        }
        BodyPart::Unsupported(content_type) => content_type.clone(),
    }
}
