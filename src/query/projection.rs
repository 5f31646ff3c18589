//! Path projection oracle
//!
//! Decides, token by token, which nodes a bound path can still reach. The
//! state for the children of a node is the multiset of steps still pending
//! there (with the number of distinct match paths that lead to each) and
//! whether the node lies inside a result subtree.
//!
//! A node that matches step `i` along `n` paths receives `n` instances of
//! that step's role, exactly as many as the nested evaluation will visit
//! it. Nodes with nothing pending below them and outside every result are
//! skipped together with their whole subtree. Everything else is buffered
//! so child steps keep seeing the real parent/child structure.

use super::path::BoundQuery;
use crate::axis::Axis;
use crate::buffer::NodeKind;
use crate::driver::{Decision, Oracle, Step};
use crate::roles::RoleId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionState {
    /// (step index, number of match paths), at most one entry per step
    pending: Vec<(usize, u32)>,
    in_output: bool,
}

impl ProjectionState {
    fn add(&mut self, step: usize, count: u32) {
        match self.pending.iter_mut().find(|(s, _)| *s == step) {
            Some((_, c)) => *c += count,
            None => self.pending.push((step, count)),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && !self.in_output
    }
}

#[derive(Debug, Clone)]
pub struct PathProjection {
    query: BoundQuery,
}

impl PathProjection {
    pub fn new(query: BoundQuery) -> Self {
        PathProjection { query }
    }
}

impl Oracle for PathProjection {
    type State = ProjectionState;

    fn initial(&self) -> ProjectionState {
        let mut state = ProjectionState::default();
        state.add(0, 1);
        state
    }

    fn step(&self, state: &ProjectionState, step: Step) -> (ProjectionState, Decision) {
        if state.is_idle() {
            return (ProjectionState::default(), Decision::Skip);
        }
        let (kind, tag) = match step {
            Step::Open(tag) => (NodeKind::Tag, Some(tag)),
            Step::Text => (NodeKind::Text, None),
        };

        let mut roles: Vec<RoleId> = Vec::new();
        let mut next = ProjectionState {
            pending: Vec::new(),
            in_output: state.in_output,
        };
        for &(i, count) in &state.pending {
            let bound = self.query.steps[i];
            if bound.axis == Axis::Descendant && kind == NodeKind::Tag {
                next.add(i, count);
            }
            if bound.test.matches(kind, tag) {
                roles.extend(std::iter::repeat_n(self.query.role_for(i), count as usize));
                if self.query.is_last(i) {
                    next.in_output = true;
                } else if kind == NodeKind::Tag {
                    next.add(i + 1, count);
                }
            }
        }

        let keep = !roles.is_empty() || state.in_output || (kind == NodeKind::Tag && !next.is_idle());
        if keep {
            (next, Decision::Materialize(roles))
        } else {
            (ProjectionState::default(), Decision::Skip)
        }
    }
}
