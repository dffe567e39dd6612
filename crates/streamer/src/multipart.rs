//! The multipart/mixed wire format produced for collections.
//!
//! ```text
//! \r\n--{boundary}\r\n
//! Content-Type: application/octet-stream\r\n
//! Content-Disposition: attachment;\r\n
//! X-Part-Name: "{name}"\r\n
//! \r\n
//! {raw bytes}
//! ... repeated per part ...
//! \r\n--{boundary}--\r\n
//! ```

use thiserror::Error;

/// Header carrying the item name, on single responses and on every part.
pub const PART_NAME_HEADER: &str = "X-Part-Name";

/// Largest header block the decoder will buffer for one part.
const MAX_HEADER_BLOCK: usize = 8 * 1024;

/// Inclusive, byte-lexicographic bounds on item names. An absent bound is
/// unbounded on that side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl NameRange {
    pub fn new(from: Option<String>, to: Option<String>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, name: &str) -> bool {
        if let Some(from) = &self.from {
            if name < from.as_str() {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if name > to.as_str() {
                return false;
            }
        }
        true
    }
}

pub fn content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={boundary}")
}

/// Delimiter line plus the three part headers and the blank line.
pub fn part_header(boundary: &str, name: &str) -> String {
    format!(
        "\r\n--{boundary}\r\n\
         Content-Type: application/octet-stream\r\n\
         Content-Disposition: attachment;\r\n\
         {PART_NAME_HEADER}: \"{name}\"\r\n\r\n"
    )
}

pub fn closing_delimiter(boundary: &str) -> String {
    format!("\r\n--{boundary}--\r\n")
}

/// Pull the boundary out of a `multipart/mixed; boundary=...` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    let mut params = content_type.split(';');
    let essence = params.next()?.trim();
    if !essence.eq_ignore_ascii_case("multipart/mixed") {
        return None;
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("part headers carry no X-Part-Name")]
    MissingPartName,

    #[error("part header block too large")]
    HeaderTooLarge,

    #[error("malformed delimiter")]
    MalformedDelimiter,

    #[error("body ended before the closing delimiter")]
    Truncated,
}

/// Output of [`MultipartDecoder::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PartStart { name: String },
    Data(Vec<u8>),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    AfterDelimiter,
    Headers,
    Body,
    Done,
}

/// Incremental decoder for the collection wire format.
///
/// Memory is bounded by the input fed at once plus a delimiter-sized tail;
/// part bodies are never accumulated.
#[derive(Debug)]
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    state: State,
    buf: Vec<u8>,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("\r\n--{boundary}").into_bytes(),
            state: State::Preamble,
            buf: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Event>, DecodeError> {
        self.buf.extend_from_slice(data);
        let mut events = Vec::new();

        loop {
            match self.state {
                State::Preamble => match find(&self.buf, &self.delimiter) {
                    Some(pos) => {
                        self.buf.drain(..pos + self.delimiter.len());
                        self.state = State::AfterDelimiter;
                    }
                    None => {
                        self.keep_tail();
                        break;
                    }
                },
                State::AfterDelimiter => {
                    if self.buf.len() < 2 {
                        break;
                    }
                    if self.buf.starts_with(b"\r\n") {
                        self.state = State::Headers;
                    } else if self.buf.starts_with(b"--") {
                        self.state = State::Done;
                        events.push(Event::End);
                    } else {
                        return Err(DecodeError::MalformedDelimiter);
                    }
                    self.buf.drain(..2);
                }
                State::Headers => match find(&self.buf, b"\r\n\r\n") {
                    Some(pos) => {
                        let name = part_name(&self.buf[..pos]).ok_or(DecodeError::MissingPartName)?;
                        self.buf.drain(..pos + 4);
                        self.state = State::Body;
                        events.push(Event::PartStart { name });
                    }
                    None if self.buf.len() > MAX_HEADER_BLOCK => {
                        return Err(DecodeError::HeaderTooLarge);
                    }
                    None => break,
                },
                State::Body => match find(&self.buf, &self.delimiter) {
                    Some(pos) => {
                        if pos > 0 {
                            events.push(Event::Data(self.buf[..pos].to_vec()));
                        }
                        self.buf.drain(..pos + self.delimiter.len());
                        self.state = State::AfterDelimiter;
                    }
                    None => {
                        let keep = self.delimiter.len() - 1;
                        if self.buf.len() > keep {
                            let n = self.buf.len() - keep;
                            events.push(Event::Data(self.buf.drain(..n).collect()));
                        }
                        break;
                    }
                },
                State::Done => {
                    self.buf.clear();
                    break;
                }
            }
        }

        Ok(events)
    }

    /// Check that the closing delimiter was seen.
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(DecodeError::Truncated)
        }
    }

    /// Drop preamble bytes that can no longer start a delimiter.
    fn keep_tail(&mut self) {
        let keep = self.delimiter.len() - 1;
        if self.buf.len() > keep {
            let n = self.buf.len() - keep;
            self.buf.drain(..n);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn part_name(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    text.split("\r\n").find_map(|line| {
        let (field, value) = line.split_once(':')?;
        if !field.trim().eq_ignore_ascii_case(PART_NAME_HEADER) {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(value.to_string())
    })
}
