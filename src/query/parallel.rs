//! Parallel evaluation of independent paths
//!
//! Streams are single-threaded, so parallelism comes from running each path
//! over its own stream of the same input on the rayon pool.

use super::cache::compile;
use super::select::{select_source, Output, Selection};
use crate::config::StreamConfig;
use crate::error::Result;
use crate::source::SliceSource;
use rayon::prelude::*;

/// Evaluate every path in `paths` over `input`, one result per path in the
/// order given
pub fn select_parallel(
    input: &[u8],
    paths: &[&str],
    config: StreamConfig,
    output: Output,
) -> Vec<Result<Selection>> {
    paths
        .par_iter()
        .map(|path| {
            let query = compile(path)?;
            select_source(SliceSource::new(input), &query, config, output)
        })
        .collect()
}
