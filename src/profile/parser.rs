use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::io::AsyncBufRead;
use tracing::trace;

use super::PowerProfile;
use crate::error::{Error, Result};

const HEADER: &[u8] = b"header";
const STARTTS: &[u8] = b"startts";
const VALUE: &[u8] = b"v";

/// Position of a [`ProfileParser`] within the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Nothing but prolog seen so far
    Idle,
    /// Inside the root element, outside any interpreted element
    InDocument,
    /// Inside `<header>`
    InHeader,
    /// Inside a `<v>` sample outside the header
    InValue,
    /// The document ended cleanly and the profile was handed out
    Done,
    /// The document was rejected; nothing accumulated survives
    Failed,
}

/// Incremental state machine that turns XML events into a [`PowerProfile`]
///
/// Only three elements are interpreted: `header`, `startts` inside the header, and `v`
/// outside the header. Every other element is walked over. Non-numeric `<v>` content
/// is skipped, matching what meters occasionally emit for missing readings.
///
/// Parsing is all-or-nothing: after any error the parser moves to
/// [`ParserState::Failed`], drops what it accumulated and only ever reports failure.
#[derive(Debug)]
pub struct ProfileParser {
    state: ParserState,
    depth: usize,
    root_closed: bool,
    text: String,
    startts: Option<String>,
    wattages: Vec<i64>,
}

impl Default for ProfileParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            depth: 0,
            root_closed: false,
            text: String::new(),
            startts: None,
            wattages: Vec::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Feeds one reader event into the state machine
    ///
    /// `Event::Eof` is ignored here; call [`finish`](Self::finish) once the reader
    /// reports the end of input.
    pub fn handle_event(&mut self, event: &Event<'_>) -> Result<()> {
        match self.state {
            ParserState::Failed => return Err(Error::parse("parser already failed")),
            ParserState::Done => return Err(Error::parse("parser already finished")),
            _ => {},
        }

        let outcome = match event {
            Event::Start(start) => self.open(start.name().as_ref()),
            Event::Empty(empty) => {
                let name = empty.name();
                self.open(name.as_ref()).and_then(|()| self.close(name.as_ref()))
            },
            Event::End(end) => self.close(end.name().as_ref()),
            Event::Text(text) => match text.unescape() {
                Ok(text) => self.characters(&text),
                Err(e) => Err(Error::parse(format!("bad character data: {e}"))),
            },
            Event::CData(data) => self.characters(&String::from_utf8_lossy(data)),
            _ => Ok(()),
        };

        if outcome.is_err() {
            self.fail();
        }
        outcome
    }

    /// Abandons the document, discarding everything accumulated so far
    pub fn fail(&mut self) {
        self.state = ParserState::Failed;
        self.text.clear();
        self.startts = None;
        self.wattages.clear();
    }

    /// Ends the document and hands out the profile
    ///
    /// # Returns
    ///
    /// * `Ok(PowerProfile)` - The complete profile, possibly without samples
    /// * `Err(Error::Parse)` - If the document failed earlier, was empty, or was cut off
    pub fn finish(&mut self) -> Result<PowerProfile> {
        let verdict = match self.state {
            ParserState::Failed => Err(Error::parse("document was rejected")),
            ParserState::Done => Err(Error::parse("parser already finished")),
            ParserState::Idle => Err(Error::parse("document has no root element")),
            _ if self.depth > 0 => {
                Err(Error::parse(format!("document ended with {} unclosed element(s)", self.depth)))
            },
            _ => Ok(()),
        };

        match verdict {
            Ok(()) => {
                self.state = ParserState::Done;
                Ok(PowerProfile::new(self.startts.take(), std::mem::take(&mut self.wattages)))
            },
            Err(e) => {
                self.fail();
                Err(e)
            },
        }
    }

    fn open(&mut self, name: &[u8]) -> Result<()> {
        if self.root_closed {
            return Err(Error::parse("element after the end of the root element"));
        }
        if self.state == ParserState::Idle {
            self.state = ParserState::InDocument;
        }
        self.depth += 1;
        self.text.clear();

        match name {
            HEADER if self.state == ParserState::InDocument => self.state = ParserState::InHeader,
            VALUE if self.state == ParserState::InDocument => self.state = ParserState::InValue,
            _ => {},
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::parse(format!("unexpected closing tag </{}>", String::from_utf8_lossy(name))));
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.root_closed = true;
        }

        match (self.state, name) {
            (ParserState::InHeader, HEADER) => self.state = ParserState::InDocument,
            (ParserState::InHeader, STARTTS) => self.startts = Some(self.text.trim().to_string()),
            (ParserState::InValue, VALUE) => {
                if let Some(watts) = parse_wattage(&self.text) {
                    self.wattages.push(watts);
                } else {
                    trace!(value = %self.text, "skipping non-numeric sample");
                }
                self.state = ParserState::InDocument;
            },
            _ => {},
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.depth == 0 {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(Error::parse("character data outside the root element"));
        }
        self.text.push_str(text);
        Ok(())
    }
}

/// Integers are taken as-is; decimal readings are truncated toward zero.
fn parse_wattage(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>().ok().filter(|v| v.is_finite() && v.abs() < i64::MAX as f64).map(|v| v.trunc() as i64)
    })
}

fn reader_error(err: quick_xml::Error, position: impl std::fmt::Display) -> Error {
    match Error::from(err) {
        Error::Parse(msg) => Error::Parse(format!("{msg} (at byte {position})")),
        other => other,
    }
}

/// Parses a complete in-memory document
pub fn parse_profile(document: &[u8]) -> Result<PowerProfile> {
    let mut reader = Reader::from_reader(document);
    reader.config_mut().trim_text(true);

    let mut parser = ProfileParser::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                parser.fail();
                return Err(reader_error(e, reader.buffer_position()));
            },
            Ok(Event::Eof) => break,
            Ok(event) => parser.handle_event(&event)?,
        }
        buf.clear();
    }
    parser.finish()
}

/// Parses a document as it arrives from an async byte source
///
/// Events are handed to the state machine as soon as the reader can produce them, so a
/// slow device never forces the whole body to be buffered first. I/O failures from the
/// source are reported as network errors.
pub async fn parse_profile_async<R>(source: R) -> Result<PowerProfile>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut parser = ProfileParser::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into_async(&mut buf).await {
            Err(e) => {
                parser.fail();
                return Err(reader_error(e, reader.buffer_position()));
            },
            Ok(Event::Eof) => break,
            Ok(event) => parser.handle_event(&event)?,
        }
        buf.clear();
    }
    parser.finish()
}
