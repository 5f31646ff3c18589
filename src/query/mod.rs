//! Location path queries over a stream
//!
//! - [`path`]: parser and binding to tags and roles
//! - [`projection`]: the decision oracle that prunes unreachable input
//! - [`select`]: nested evaluation with lock and sign-off discipline
//! - [`parallel`]: several paths over one input on the rayon pool
//! - [`cache`]: LRU of parsed paths

pub mod cache;
pub mod parallel;
pub mod path;
pub mod projection;
pub mod select;

pub use cache::{compile, QueryCache};
pub use parallel::select_parallel;
pub use path::{BoundQuery, BoundStep, PathQuery, PathStep, StepTest};
pub use projection::{PathProjection, ProjectionState};
pub use select::{
    evaluate, projected_stream, projection_dump, select, select_reader, select_source, select_text, Output,
    SelectStats, Selection,
};
