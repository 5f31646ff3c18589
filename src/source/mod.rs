//! Token Sources
//!
//! The stream driver pulls one [`Token`] at a time from a [`TokenSource`]:
//! - [`SliceSource`]: whole input in memory, tokens borrow from it
//! - [`ReaderSource`]: any `io::Read`, refilling its window on demand
//! - [`ScriptSource`]: a prepared token list, for driving the core directly

pub(crate) mod entities;
mod reader;
mod scanner;
mod script;
mod slice;
mod tokenizer;

pub(crate) use scanner::is_blank;
pub use reader::ReaderSource;
pub use script::{ScriptSource, ScriptToken};
pub use slice::SliceSource;

use crate::error::Result;
use std::borrow::Cow;

/// One structural event of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Start of an element, carrying its name
    Open(&'a [u8]),
    /// Character content with entities decoded
    Text(Cow<'a, [u8]>),
    /// End of the innermost element; `None` for the end of an empty tag
    Close(Option<&'a [u8]>),
}

/// Pull interface over a finite token sequence
pub trait TokenSource {
    /// Next token, or `None` once the input is exhausted. Calling again
    /// after exhaustion keeps returning `None`.
    fn next_token(&mut self) -> Result<Option<Token<'_>>>;
}

impl<T: TokenSource + ?Sized> TokenSource for Box<T> {
    fn next_token(&mut self) -> Result<Option<Token<'_>>> {
        (**self).next_token()
    }
}
