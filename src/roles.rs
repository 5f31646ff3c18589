//! Role Ledger
//!
//! A role is an obligation that pins a buffered node against collection
//! until the evaluator signs it off. Roles are minted once, while a query is
//! bound, into a [`RoleRegistry`] that is then shared read-only. The
//! [`RoleLedger`] lives inside the buffer and tracks every attached role
//! instance so that a sign-off the buffer never saw is caught immediately.

use crate::buffer::NodeRef;
use crate::error::{Error, Result};
use std::rc::Rc;

/// Identifier of a minted role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleId(pub u32);

/// How far a role's protection reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    /// Protects the node and its whole subtree
    Cumulative,
    /// Protects exactly the node it is attached to
    NonCumulative,
}

#[derive(Debug, Clone)]
struct RoleInfo {
    kind: RoleKind,
    label: Box<str>,
}

/// Table of roles minted for one query
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: Vec<RoleInfo>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        RoleRegistry { roles: Vec::new() }
    }

    /// Mint a new role
    pub fn register(&mut self, kind: RoleKind, label: impl Into<String>) -> RoleId {
        let id = RoleId(self.roles.len() as u32);
        self.roles.push(RoleInfo {
            kind,
            label: label.into().into_boxed_str(),
        });
        id
    }

    pub fn kind(&self, role: RoleId) -> Option<RoleKind> {
        self.roles.get(role.0 as usize).map(|r| r.kind)
    }

    pub fn label(&self, role: RoleId) -> Option<&str> {
        self.roles.get(role.0 as usize).map(|r| r.label.as_ref())
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Multiset of roles carried by one node
#[derive(Debug, Clone, Default)]
pub struct RoleSet {
    cumulative: Vec<RoleId>,
    plain: Vec<RoleId>,
}

impl RoleSet {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty() && self.plain.is_empty()
    }

    /// Number of role instances, duplicates counted
    #[inline]
    pub fn len(&self) -> usize {
        self.cumulative.len() + self.plain.len()
    }

    #[inline]
    pub fn has_cumulative(&self) -> bool {
        !self.cumulative.is_empty()
    }

    pub fn cumulative(&self) -> &[RoleId] {
        &self.cumulative
    }

    pub fn non_cumulative(&self) -> &[RoleId] {
        &self.plain
    }

    pub fn contains(&self, role: RoleId) -> bool {
        self.cumulative.contains(&role) || self.plain.contains(&role)
    }

    fn insert(&mut self, role: RoleId, kind: RoleKind) {
        match kind {
            RoleKind::Cumulative => self.cumulative.push(role),
            RoleKind::NonCumulative => self.plain.push(role),
        }
    }

    /// Remove one instance; false if none was present
    fn remove(&mut self, role: RoleId, kind: RoleKind) -> bool {
        let list = match kind {
            RoleKind::Cumulative => &mut self.cumulative,
            RoleKind::NonCumulative => &mut self.plain,
        };
        match list.iter().position(|&r| r == role) {
            Some(pos) => {
                list.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Bookkeeping of attached role instances, owned by the buffer
#[derive(Debug)]
pub struct RoleLedger {
    registry: Rc<RoleRegistry>,
    /// Live instances per role id
    live: Vec<u32>,
    attached: u64,
    released: u64,
}

impl RoleLedger {
    pub fn new(registry: Rc<RoleRegistry>) -> Self {
        let live = vec![0; registry.len()];
        RoleLedger {
            registry,
            live,
            attached: 0,
            released: 0,
        }
    }

    pub fn registry(&self) -> &Rc<RoleRegistry> {
        &self.registry
    }

    fn kind_of(&self, role: RoleId, node: NodeRef) -> Result<RoleKind> {
        self.registry.kind(role).ok_or(Error::RoleConsistency {
            role,
            node,
            message: "role was never registered",
        })
    }

    /// Attach one instance of `role` to `set`, returning the kind attached
    pub(crate) fn attach(&mut self, set: &mut RoleSet, role: RoleId, node: NodeRef) -> Result<RoleKind> {
        let kind = self.kind_of(role, node)?;
        set.insert(role, kind);
        self.live[role.0 as usize] += 1;
        self.attached += 1;
        Ok(kind)
    }

    /// Detach one instance of `role` from `set`
    pub(crate) fn release(&mut self, set: &mut RoleSet, role: RoleId, node: NodeRef) -> Result<RoleKind> {
        let kind = self.kind_of(role, node)?;
        if !set.remove(role, kind) {
            return Err(Error::RoleConsistency {
                role,
                node,
                message: "role is not attached to this node",
            });
        }
        self.live[role.0 as usize] -= 1;
        self.released += 1;
        Ok(kind)
    }

    /// Instances of `role` currently attached anywhere in the buffer
    pub fn live_count(&self, role: RoleId) -> u32 {
        self.live.get(role.0 as usize).copied().unwrap_or(0)
    }

    /// Instances attached and not yet signed off
    pub fn outstanding(&self) -> u64 {
        self.attached - self.released
    }

    pub fn attached_total(&self) -> u64 {
        self.attached
    }

    pub fn released_total(&self) -> u64 {
        self.released
    }
}
