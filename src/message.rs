use crate::errors::DKIMError;
use std::borrow::Cow;

/// One RFC 5322 header field with its folding preserved.
///
/// `raw_name` and `raw_value` hold the field exactly as it appeared on the
/// wire (after line-ending normalization): the original line is
/// `raw_name + ":" + raw_value` and `raw_value` ends with the CRLF that
/// terminated the last folded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    raw_name: Vec<u8>,
    lower_name: String,
    raw_value: Vec<u8>,
}

impl Header {
    pub(crate) fn new(raw_name: Vec<u8>, raw_value: Vec<u8>) -> Self {
        let lower_name = String::from_utf8_lossy(&raw_name)
            .trim()
            .to_ascii_lowercase();
        Header {
            raw_name,
            lower_name,
            raw_value,
        }
    }

    pub fn raw_name(&self) -> &[u8] {
        &self.raw_name
    }

    /// ASCII-lowercased field name, trimmed of surrounding whitespace.
    pub fn lower_name(&self) -> &str {
        &self.lower_name
    }

    pub fn raw_value(&self) -> &[u8] {
        &self.raw_value
    }

    /// Lossy UTF-8 view of the value, for tag-list parsing.
    pub fn value_string(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_value)
    }
}

/// A parsed message: ordered header list plus body, with all line endings
/// normalized to CRLF.
#[derive(Debug, Clone)]
pub struct Message {
    raw: Vec<u8>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl Message {
    pub fn parse(input: &[u8]) -> Result<Self, DKIMError> {
        if input.is_empty() {
            return Err(DKIMError::InvalidMessage("empty input".to_owned()));
        }

        let raw = normalize_line_endings(input);

        // The header block keeps the CRLF that terminated the last header;
        // the body starts after the blank separator line.
        let (header_block, body) = match raw.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(idx) => (&raw[..idx + 2], raw[idx + 4..].to_vec()),
            None => (&raw[..], Vec::new()),
        };

        let headers = parse_header_block(header_block)?;

        Ok(Message { raw, headers, body })
    }

    /// Input bytes after line-ending normalization.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// All headers with the given name (case-insensitive), in order of
    /// appearance.
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Header> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.lower_name.eq_ignore_ascii_case(name))
    }
}

/// Rewrite bare CR and bare LF to CRLF in a single pass, leaving existing
/// CRLF pairs untouched. Idempotent.
pub(crate) fn normalize_line_endings(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + 16);
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if input.get(i + 1) == Some(&b'\n') {
                    i += 2;
                } else {
                    i += 1;
                }
            }
            b'\n' => {
                out.extend_from_slice(b"\r\n");
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

// Folded-header rule: a header starts on a line with no leading whitespace
// and continues over every following line that starts with SP or HTAB.
fn parse_header_block(block: &[u8]) -> Result<Vec<Header>, DKIMError> {
    if !block.ends_with(b"\r\n") {
        return Err(DKIMError::InvalidMessage(
            "header block lacks terminating CRLF".to_owned(),
        ));
    }

    let mut fields: Vec<(usize, usize)> = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut pos = 0;
    while pos < block.len() {
        let eol = block[pos..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|rel| pos + rel + 2)
            // unreachable after normalization, but stay defensive
            .unwrap_or(block.len());

        if block[pos] == b' ' || block[pos] == b'\t' {
            if current_start.is_none() {
                return Err(DKIMError::InvalidMessage(
                    "continuation line before any header".to_owned(),
                ));
            }
        } else {
            if let Some(start) = current_start.take() {
                fields.push((start, pos));
            }
            current_start = Some(pos);
        }
        pos = eol;
    }
    if let Some(start) = current_start {
        fields.push((start, block.len()));
    }

    let mut headers = Vec::with_capacity(fields.len());
    for (start, end) in fields {
        let field = &block[start..end];
        // The name/value split is on the first colon of the first line.
        let first_line_end = field
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(field.len());
        let colon = field[..first_line_end]
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| DKIMError::InvalidMessage("header without colon".to_owned()))?;
        headers.push(Header::new(
            field[..colon].to_vec(),
            field[colon + 1..].to_vec(),
        ));
    }

    Ok(headers)
}
