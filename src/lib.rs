//! gcxml - Streaming XML buffer with role-driven garbage collection
//!
//! Input is tokenized incrementally and only the parts a query can still
//! reach are materialized. Every kept node carries the roles (obligations)
//! the query placed on it; signing a role off lets the collector reclaim the
//! node and any ancestors left empty, so memory follows what is pending
//! rather than document size.
//!
//! Layers, bottom up:
//! - [`tags`], [`roles`]: shared lookup tables built at setup
//! - [`buffer`] and `gc`: the node arena and the collector
//! - [`source`], [`driver`]: token sources and the projection-driven loader
//! - [`stream`], [`axis`]: shared handle, node locks, lazy axis iterators
//! - [`query`]: location paths, projection and nested evaluation
//! - [`memory`]: allocator selection and allocation accounting

use rustler::{Binary, Encoder, Env, NifResult, ResourceArc, Term};

pub mod axis;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod error;
mod gc;
pub mod memory;
pub mod query;
mod resource;
pub mod roles;
pub mod source;
pub mod stream;
pub mod tags;
mod term;

pub use axis::{Axis, AxisIter, ChildAxis, DescendantAxis, NodeTest};
pub use buffer::{Buffer, BufferStats, NodeKind, NodeRef};
pub use config::StreamConfig;
pub use driver::{Decision, Driver, DriverState, DriverStats, MaterializeAll, Oracle, Step};
pub use error::{Error, Result};
pub use query::{PathQuery, Selection};
pub use roles::{RoleId, RoleKind, RoleRegistry};
pub use source::{ReaderSource, ScriptSource, ScriptToken, SliceSource, Token, TokenSource};
pub use stream::{NodeLock, Stream};
pub use tags::{TagDictionary, TagId};

use query::Output;
use resource::{QueryRef, QueryResource};
use term::{error_to_term, selection_to_term, selection_with_stats_to_term, str_to_binary};

// ============================================================================
// Memory Tracking NIFs
// ============================================================================

#[rustler::nif]
fn get_rust_memory() -> usize {
    memory::usage().current
}

#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    memory::usage().peak
}

/// Restart peak tracking; returns `{current, previous_peak}`
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    let before = memory::reset_peak();
    (before.current, before.peak)
}

// ============================================================================
// Path Selection
// ============================================================================

fn run_path(input: &[u8], path: &str, output: Output) -> Result<Selection> {
    let query = query::compile(path)?;
    query::select_source(SliceSource::new(input), &query, StreamConfig::default(), output)
}

/// Matches of `path` as serialized XML binaries
#[rustler::nif(schedule = "DirtyCpu")]
fn select<'a>(env: Env<'a>, input: Binary<'a>, path: &str) -> NifResult<Term<'a>> {
    Ok(selection_to_term(env, run_path(input.as_slice(), path, Output::Xml)))
}

/// Character content of each match of `path`
#[rustler::nif(schedule = "DirtyCpu")]
fn select_text<'a>(env: Env<'a>, input: Binary<'a>, path: &str) -> NifResult<Term<'a>> {
    Ok(selection_to_term(env, run_path(input.as_slice(), path, Output::Text)))
}

/// Like `select`, plus buffer and driver counters as a keyword list
#[rustler::nif(schedule = "DirtyCpu")]
fn select_with_stats<'a>(env: Env<'a>, input: Binary<'a>, path: &str) -> NifResult<Term<'a>> {
    Ok(selection_with_stats_to_term(env, run_path(input.as_slice(), path, Output::Xml)))
}

/// Evaluate several paths over one input in parallel
#[rustler::nif(schedule = "DirtyCpu")]
fn select_parallel<'a>(env: Env<'a>, input: Binary<'a>, paths: Vec<&str>) -> NifResult<Term<'a>> {
    let results = query::select_parallel(input.as_slice(), &paths, StreamConfig::default(), Output::Xml);

    let mut list = Term::list_new_empty(env);
    for result in results.into_iter().rev() {
        list = list.list_prepend(selection_to_term(env, result));
    }
    Ok(list)
}

// ============================================================================
// Compiled Queries
// ============================================================================

/// Parse `path` once and keep it as a resource
#[rustler::nif]
fn compile<'a>(env: Env<'a>, path: &str) -> NifResult<Term<'a>> {
    match query::compile(path) {
        Ok(q) => Ok((term::ok(), ResourceArc::new(QueryResource::new(q))).encode(env)),
        Err(e) => Ok(error_to_term(env, &e)),
    }
}

/// Run a compiled path over `input`
#[rustler::nif(schedule = "DirtyCpu")]
fn run<'a>(env: Env<'a>, compiled: QueryRef, input: Binary<'a>) -> NifResult<Term<'a>> {
    let result = query::select(input.as_slice(), &compiled.query, StreamConfig::default());
    Ok(selection_to_term(env, result))
}

/// Role dump of the buffer the projection for `path` keeps
#[rustler::nif(schedule = "DirtyCpu")]
fn dump<'a>(env: Env<'a>, input: Binary<'a>, path: &str) -> NifResult<Term<'a>> {
    let result = query::compile(path)
        .and_then(|q| query::projection_dump(input.as_slice(), &q, StreamConfig::default()));
    match result {
        Ok(text) => Ok((term::ok(), str_to_binary(env, &text)).encode(env)),
        Err(e) => Ok(error_to_term(env, &e)),
    }
}

// ============================================================================
// NIF Initialization
// ============================================================================

rustler::init!("Elixir.GcXml.Native");
