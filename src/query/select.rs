//! Path evaluation over a stream
//!
//! Evaluates a bound path with nested `for` semantics: every match of step
//! `i` becomes the context of step `i + 1`, one context at a time. Each
//! visited node is locked while it is in use and its role instance is signed
//! off once the nested steps below it are done, so the buffer only ever
//! holds what some pending step can still reach.
//!
//! Results come out in evaluation order. A node reached along several match
//! paths (`//a//b` under nested `a`) is produced once per path.

use super::path::{BoundQuery, PathQuery};
use super::projection::PathProjection;
use crate::buffer::{BufferStats, NodeKind, NodeRef};
use crate::config::StreamConfig;
use crate::driver::DriverStats;
use crate::error::Result;
use crate::source::{ReaderSource, SliceSource, TokenSource};
use crate::stream::Stream;
use crate::tags::TagDictionary;
use std::io::Read;
use tracing::debug;

/// How result nodes are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// Serialized XML for elements, character content for text nodes
    #[default]
    Xml,
    /// Character content only
    Text,
}

/// Memory and token counters of one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectStats {
    pub buffer: BufferStats,
    pub driver: DriverStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub matches: Vec<String>,
    pub stats: SelectStats,
}

type PathStream<S> = Stream<S, PathProjection>;

/// Bind `query` and set up a projected stream over `source`
pub fn projected_stream<S: TokenSource>(
    source: S,
    query: &PathQuery,
    config: StreamConfig,
) -> (PathStream<S>, BoundQuery) {
    let mut tags = TagDictionary::new();
    let bound = query.bind(&mut tags);
    let stream = Stream::new(
        source,
        PathProjection::new(bound.clone()),
        tags,
        bound.registry.clone(),
        config,
    );
    (stream, bound)
}

/// Evaluate `query` from the document root, handing each result to `emit`
/// as soon as it is complete, then drain the input
pub fn evaluate<S: TokenSource>(
    stream: &PathStream<S>,
    query: &BoundQuery,
    output: Output,
    emit: &mut dyn FnMut(String),
) -> Result<()> {
    evaluate_step(stream, query, stream.root(), 0, output, emit)?;
    stream.read_to_end()
}

fn evaluate_step<S: TokenSource>(
    stream: &PathStream<S>,
    query: &BoundQuery,
    context: NodeRef,
    index: usize,
    output: Output,
    emit: &mut dyn FnMut(String),
) -> Result<()> {
    let step = query.steps[index];
    let role = query.role_for(index);

    for node in stream.axis(step.axis, context, step.test) {
        let node = node?;
        let guard = stream.lock(node)?;
        if query.is_last(index) {
            emit(render(stream, node, output)?);
        } else {
            evaluate_step(stream, query, node, index + 1, output, emit)?;
        }
        stream.remove_role(node, role)?;
        drop(guard);
    }
    Ok(())
}

fn render<S: TokenSource>(stream: &PathStream<S>, node: NodeRef, output: Output) -> Result<String> {
    match (output, stream.kind(node)?) {
        (Output::Xml, NodeKind::Tag) => stream.serialize(node),
        _ => stream.text_content(node),
    }
}

/// Evaluate over any token source
pub fn select_source<S: TokenSource>(
    source: S,
    query: &PathQuery,
    config: StreamConfig,
    output: Output,
) -> Result<Selection> {
    let (stream, bound) = projected_stream(source, query, config);
    let mut matches = Vec::new();
    evaluate(&stream, &bound, output, &mut |m| matches.push(m))?;

    let stats = SelectStats {
        buffer: stream.stats(),
        driver: stream.driver_stats(),
    };
    debug!(
        path = %query,
        matches = matches.len(),
        peak = stats.buffer.peak,
        skipped = stats.driver.skipped,
        "selection finished"
    );
    Ok(Selection { matches, stats })
}

/// Serialized matches of `query` in an in-memory document
pub fn select(input: &[u8], query: &PathQuery, config: StreamConfig) -> Result<Selection> {
    select_source(SliceSource::new(input), query, config, Output::Xml)
}

/// Character content of every match of `query`
pub fn select_text(input: &[u8], query: &PathQuery, config: StreamConfig) -> Result<Selection> {
    select_source(SliceSource::new(input), query, config, Output::Text)
}

/// Serialized matches of `query`, reading the document incrementally
pub fn select_reader<R: Read>(reader: R, query: &PathQuery, config: StreamConfig) -> Result<Selection> {
    let source = ReaderSource::with_chunk_size(reader, config.read_chunk_size);
    select_source(source, query, config, Output::Xml)
}

/// Role dump of what the projection for `query` keeps once the whole input
/// has been read and no role has been signed off
pub fn projection_dump(input: &[u8], query: &PathQuery, config: StreamConfig) -> Result<String> {
    let (stream, _) = projected_stream(SliceSource::new(input), query, config);
    stream.read_to_end()?;
    Ok(stream.dump_roles())
}
