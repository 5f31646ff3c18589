//! Stream Driver
//!
//! Pulls one token at a time from a [`TokenSource`] and applies it to the
//! buffer at the cursor. Every open tag and text token is first shown to a
//! decision [`Oracle`], which either materializes the node (with the roles
//! scheduled for it) or skips it. Skipped open tags still get a frame so
//! that their close tag is consumed without touching the buffer, and
//! anything under them lands on the nearest materialized ancestor.

use crate::buffer::Buffer;
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::roles::RoleId;
use crate::source::{is_blank, Token, TokenSource};
use crate::tags::{TagDictionary, TagId};
use tracing::{debug, trace};

/// Token kind presented to the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Open(TagId),
    Text,
}

/// What to do with the node a token describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Append the node and attach these roles (duplicates allowed)
    Materialize(Vec<RoleId>),
    /// Advance the oracle without buffering anything
    Skip,
}

/// Decision function of a compiled projection automaton.
///
/// Must be deterministic: the same state and step always give the same
/// answer. The state returned for an open tag is the state its children
/// are decided in.
pub trait Oracle {
    type State: Clone;

    fn initial(&self) -> Self::State;

    fn step(&self, state: &Self::State, step: Step) -> (Self::State, Decision);
}

/// Oracle that buffers every node without roles
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterializeAll;

impl Oracle for MaterializeAll {
    type State = ();

    fn initial(&self) {}

    fn step(&self, _state: &(), _step: Step) -> ((), Decision) {
        ((), Decision::Materialize(Vec::new()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Running,
    /// Input fully consumed and the root closed
    Exhausted,
    /// A fatal error was reported; every further call fails
    Failed,
}

/// Token counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub tokens: u64,
    pub materialized: u64,
    pub skipped: u64,
}

struct Frame<St> {
    state: St,
    materialized: bool,
    tag: TagId,
}

/// Token with owned text, detached from the source's borrow
enum Event {
    Open(TagId),
    Text(Box<str>),
    Close(Option<Vec<u8>>),
}

pub struct Driver<S, O: Oracle> {
    source: S,
    oracle: O,
    tags: TagDictionary,
    root_state: O::State,
    frames: Vec<Frame<O::State>>,
    state: DriverState,
    config: StreamConfig,
    stats: DriverStats,
}

impl<S: TokenSource, O: Oracle> Driver<S, O> {
    pub fn new(source: S, oracle: O, tags: TagDictionary, config: StreamConfig) -> Self {
        let root_state = oracle.initial();
        Driver {
            source,
            oracle,
            tags,
            root_state,
            frames: Vec::with_capacity(32),
            state: DriverState::Running,
            config,
            stats: DriverStats::default(),
        }
    }

    pub fn tags(&self) -> &TagDictionary {
        &self.tags
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == DriverState::Exhausted
    }

    /// Open elements, skipped ones included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Apply exactly one token to `buffer`.
    ///
    /// Returns `Ok(false)` once the input is exhausted; later calls keep
    /// returning `Ok(false)` without touching the buffer. After an error the
    /// driver is poisoned and returns [`Error::Aborted`].
    pub fn read_next(&mut self, buffer: &mut Buffer) -> Result<bool> {
        match self.state {
            DriverState::Exhausted => return Ok(false),
            DriverState::Failed => return Err(Error::Aborted),
            DriverState::Running => {}
        }
        let result = self.step(buffer);
        if result.is_err() {
            self.state = DriverState::Failed;
        }
        result
    }

    fn step(&mut self, buffer: &mut Buffer) -> Result<bool> {
        let event = match self.source.next_token()? {
            None => None,
            Some(Token::Open(name)) => {
                if std::str::from_utf8(name).is_err() {
                    return Err(Error::stream("element name is not valid UTF-8"));
                }
                Some(Event::Open(self.tags.intern(name)))
            }
            Some(Token::Text(bytes)) => {
                if self.config.drop_whitespace_text && is_blank(&bytes) {
                    self.stats.tokens += 1;
                    self.stats.skipped += 1;
                    return Ok(true);
                }
                let text = String::from_utf8(bytes.into_owned()).map_err(|e| {
                    Error::stream(format!(
                        "text is not valid UTF-8 after {} bytes",
                        e.utf8_error().valid_up_to()
                    ))
                })?;
                Some(Event::Text(text.into_boxed_str()))
            }
            Some(Token::Close(name)) => Some(Event::Close(
                name.filter(|_| self.config.verify_close_names).map(<[u8]>::to_vec),
            )),
        };

        let Some(event) = event else {
            self.finish(buffer)?;
            return Ok(false);
        };
        self.stats.tokens += 1;

        match event {
            Event::Open(tag) => self.open(buffer, tag)?,
            Event::Text(content) => self.text(buffer, content)?,
            Event::Close(name) => self.close(buffer, name)?,
        }
        Ok(true)
    }

    fn current_state(&self) -> &O::State {
        self.frames.last().map_or(&self.root_state, |f| &f.state)
    }

    fn open(&mut self, buffer: &mut Buffer, tag: TagId) -> Result<()> {
        let (state, decision) = self.oracle.step(self.current_state(), Step::Open(tag));
        let materialized = match decision {
            Decision::Materialize(roles) => {
                let node = buffer.append_tag(tag, &roles)?;
                trace!(tag = tag.0, node = node.index(), roles = roles.len(), "open");
                self.stats.materialized += 1;
                true
            }
            Decision::Skip => {
                trace!(tag = tag.0, "open skipped");
                self.stats.skipped += 1;
                false
            }
        };
        self.frames.push(Frame {
            state,
            materialized,
            tag,
        });
        Ok(())
    }

    fn text(&mut self, buffer: &mut Buffer, content: Box<str>) -> Result<()> {
        let (_, decision) = self.oracle.step(self.current_state(), Step::Text);
        match decision {
            Decision::Materialize(roles) => {
                let node = buffer.append_text(content, &roles)?;
                trace!(node = node.index(), roles = roles.len(), "text");
                self.stats.materialized += 1;
            }
            Decision::Skip => self.stats.skipped += 1,
        }
        Ok(())
    }

    fn close(&mut self, buffer: &mut Buffer, name: Option<Vec<u8>>) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::stream("close tag without an open element"))?;
        if let Some(name) = name {
            if self.tags.get(&name) != Some(frame.tag) {
                return Err(Error::stream(format!(
                    "mismatched close tag: expected </{}>, found </{}>",
                    self.tags.name(frame.tag).unwrap_or("?"),
                    String::from_utf8_lossy(&name)
                )));
            }
        }
        if frame.materialized {
            let node = buffer.close_current()?;
            trace!(tag = frame.tag.0, node = node.index(), "close");
        }
        Ok(())
    }

    fn finish(&mut self, buffer: &mut Buffer) -> Result<()> {
        if let Some(frame) = self.frames.last() {
            return Err(Error::stream(format!(
                "input ended with {} open element(s), innermost <{}>",
                self.frames.len(),
                self.tags.name(frame.tag).unwrap_or("?")
            )));
        }
        buffer.close_root()?;
        self.state = DriverState::Exhausted;
        debug!(
            tokens = self.stats.tokens,
            skipped = self.stats.skipped,
            live = buffer.stats().live,
            "input exhausted"
        );
        Ok(())
    }
}
