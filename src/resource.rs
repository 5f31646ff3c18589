//! ResourceArc Wrappers
//!
//! A compiled path kept on the BEAM side so repeated runs skip parsing.

use crate::query::PathQuery;
use rustler::ResourceArc;

/// Parsed location path. Binding happens per run, since tag ids and roles
/// belong to one stream.
pub struct QueryResource {
    pub query: PathQuery,
}

impl QueryResource {
    pub fn new(query: PathQuery) -> Self {
        QueryResource { query }
    }
}

#[rustler::resource_impl]
impl rustler::Resource for QueryResource {}

/// Type alias for the ResourceArc
pub type QueryRef = ResourceArc<QueryResource>;
