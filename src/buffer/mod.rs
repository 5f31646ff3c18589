//! Buffer Module - Partially materialized document tree
//!
//! Arena-based tree holding only the fragments of the input that a running
//! query may still need:
//! - Slots addressed by generational [`NodeRef`] handles
//! - Children as an index-linked list (first/last child, next sibling)
//! - Per-node role multisets, lock counts and a count of pins below
//! - A cursor at the innermost open element, where the driver appends
//!
//! Nodes enter the tree only through [`Buffer::append_tag`],
//! [`Buffer::append_text`] and [`Buffer::close_current`]; they leave it only
//! through the collector (see `crate::gc`).

mod dump;
mod node;

pub use node::{NodeKind, NodeRef};
pub(crate) use node::{BufferNode, Payload, Slot};

use crate::error::{Error, Result};
use crate::roles::{RoleId, RoleLedger, RoleRegistry, RoleSet};
use crate::tags::TagId;
use std::rc::Rc;

/// Slot index of the document root
pub(crate) const ROOT: u32 = 0;

/// Counters describing buffer occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Nodes currently alive, root included
    pub live: usize,
    /// Highest value `live` ever reached
    pub peak: usize,
    /// Nodes ever created, root included
    pub created: u64,
    /// Nodes removed by the collector
    pub collected: u64,
}

/// The node tree
#[derive(Debug)]
pub struct Buffer {
    slots: Vec<Slot>,
    /// Freed slot indices ready for reuse
    free: Vec<u32>,
    /// Innermost open element
    cursor: u32,
    pub(crate) ledger: RoleLedger,
    pub(crate) stats: BufferStats,
    collect_on_close: bool,
}

impl Buffer {
    /// Create a buffer holding only the open document root
    pub fn new(registry: Rc<RoleRegistry>) -> Self {
        let root = Slot {
            generation: 0,
            node: Some(BufferNode::tag(TagId::ROOT, None)),
        };
        Buffer {
            slots: vec![root],
            free: Vec::new(),
            cursor: ROOT,
            ledger: RoleLedger::new(registry),
            stats: BufferStats {
                live: 1,
                peak: 1,
                created: 1,
                collected: 0,
            },
            collect_on_close: false,
        }
    }

    /// Toggle collection of role-free nodes when they close (off by default,
    /// so a closed node stays put until a sign-off or `clear` reaches it)
    pub fn set_collect_on_close(&mut self, enabled: bool) {
        self.collect_on_close = enabled;
    }

    #[inline]
    pub fn root(&self) -> NodeRef {
        NodeRef::new(ROOT, 0)
    }

    /// Node new content is appended under
    #[inline]
    pub fn cursor(&self) -> NodeRef {
        self.ref_of(self.cursor)
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    pub fn ledger(&self) -> &RoleLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &Rc<RoleRegistry> {
        self.ledger.registry()
    }

    // ========================================================================
    // Slot access
    // ========================================================================

    #[inline]
    pub(crate) fn ref_of(&self, index: u32) -> NodeRef {
        let generation = self.slots.get(index as usize).map_or(0, |s| s.generation);
        NodeRef::new(index, generation)
    }

    #[inline]
    pub(crate) fn get(&self, index: u32) -> Option<&BufferNode> {
        self.slots.get(index as usize).and_then(|s| s.node.as_ref())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut BufferNode> {
        self.slots.get_mut(index as usize).and_then(|s| s.node.as_mut())
    }

    /// Whether the handle still names a live node
    pub fn is_alive(&self, node: NodeRef) -> bool {
        self.slots
            .get(node.index() as usize)
            .is_some_and(|s| s.generation == node.generation() && s.node.is_some())
    }

    /// Resolve a handle, failing if its node was collected
    pub(crate) fn check(&self, node: NodeRef) -> Result<u32> {
        if self.is_alive(node) {
            Ok(node.index())
        } else {
            Err(Error::IteratorMisuse { node })
        }
    }

    pub(crate) fn node(&self, node: NodeRef) -> Result<&BufferNode> {
        let index = self.check(node)?;
        self.get(index).ok_or(Error::IteratorMisuse { node })
    }

    fn alloc(&mut self, node: BufferNode) -> u32 {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.stats.live += 1;
        self.stats.created += 1;
        self.stats.peak = self.stats.peak.max(self.stats.live);
        index
    }

    /// Release a slot; the caller has already unlinked it
    pub(crate) fn release_slot(&mut self, index: u32) -> Option<BufferNode> {
        let slot = self.slots.get_mut(index as usize)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.stats.live -= 1;
        self.stats.collected += 1;
        Some(node)
    }

    // ========================================================================
    // Appending
    // ========================================================================

    /// Append an open element under the cursor and move the cursor into it.
    /// `roles` are attached before the node becomes visible to anyone.
    pub fn append_tag(&mut self, tag: TagId, roles: &[RoleId]) -> Result<NodeRef> {
        let parent = self.open_cursor()?;
        let index = self.alloc(BufferNode::tag(tag, Some(parent)));
        self.link_child(parent, index);
        self.attach_all(index, roles)?;
        self.cursor = index;
        Ok(self.ref_of(index))
    }

    /// Append a text node under the cursor; the cursor does not move
    pub fn append_text(&mut self, content: impl Into<Box<str>>, roles: &[RoleId]) -> Result<NodeRef> {
        let parent = self.open_cursor()?;
        let index = self.alloc(BufferNode::text(content.into(), parent));
        self.link_child(parent, index);
        self.attach_all(index, roles)?;
        Ok(self.ref_of(index))
    }

    /// Close the element at the cursor and move the cursor to its parent
    pub fn close_current(&mut self) -> Result<NodeRef> {
        let index = self.cursor;
        if index == ROOT {
            return Err(Error::stream("close tag without an open element"));
        }
        let node = self
            .get_mut(index)
            .ok_or_else(|| Error::stream("cursor points at a collected node"))?;
        let parent = match &mut node.payload {
            Payload::Tag { closed, .. } => {
                *closed = true;
                node.parent.unwrap_or(ROOT)
            }
            Payload::Text(_) => return Err(Error::stream("cursor points at a text node")),
        };
        let idle = node.roles.is_empty();
        self.cursor = parent;
        let closed = self.ref_of(index);
        if self.collect_on_close && idle {
            self.clear_index(index);
        }
        Ok(closed)
    }

    /// Mark the document root closed once the input is exhausted
    pub fn close_root(&mut self) -> Result<()> {
        if self.cursor != ROOT {
            return Err(Error::stream("input ended with open elements"));
        }
        if let Some(BufferNode {
            payload: Payload::Tag { closed, .. },
            ..
        }) = self.get_mut(ROOT)
        {
            *closed = true;
        }
        if self.collect_on_close {
            self.clear_index(ROOT);
        }
        Ok(())
    }

    fn open_cursor(&self) -> Result<u32> {
        match self.get(self.cursor) {
            Some(node) if !node.is_closed() => Ok(self.cursor),
            _ => Err(Error::stream("append after the document was closed")),
        }
    }

    fn link_child(&mut self, parent: u32, child: u32) {
        let previous = self.get(parent).and_then(|p| p.last_child);
        match previous {
            Some(last) => {
                if let Some(last) = self.get_mut(last) {
                    last.next_sibling = Some(child);
                }
            }
            None => {
                if let Some(p) = self.get_mut(parent) {
                    p.first_child = Some(child);
                }
            }
        }
        if let Some(p) = self.get_mut(parent) {
            p.last_child = Some(child);
        }
    }

    /// Detach the first child of `parent` from its child list
    pub(crate) fn unlink_first_child(&mut self, parent: u32) -> Option<u32> {
        let first = self.get(parent)?.first_child?;
        let next = self.get(first).and_then(|c| c.next_sibling);
        let p = self.get_mut(parent)?;
        p.first_child = next;
        if next.is_none() {
            p.last_child = None;
        }
        Some(first)
    }

    // ========================================================================
    // Roles and locks
    // ========================================================================

    fn attach_all(&mut self, index: u32, roles: &[RoleId]) -> Result<()> {
        for &role in roles {
            self.attach_role(index, role)?;
        }
        Ok(())
    }

    fn attach_role(&mut self, index: u32, role: RoleId) -> Result<()> {
        let handle = self.ref_of(index);
        let slot = self
            .slots
            .get_mut(index as usize)
            .and_then(|s| s.node.as_mut())
            .ok_or(Error::IteratorMisuse { node: handle })?;
        self.ledger.attach(&mut slot.roles, role, handle)?;
        self.pin_ancestors(index);
        Ok(())
    }

    /// Attach a role to an existing node
    pub fn add_role(&mut self, node: NodeRef, role: RoleId) -> Result<()> {
        let index = self.check(node)?;
        self.attach_role(index, role)
    }

    /// Detach one role instance without running the collector
    pub(crate) fn detach_role(&mut self, index: u32, role: RoleId) -> Result<()> {
        let handle = self.ref_of(index);
        let slot = self
            .slots
            .get_mut(index as usize)
            .and_then(|s| s.node.as_mut())
            .ok_or(Error::IteratorMisuse { node: handle })?;
        self.ledger.release(&mut slot.roles, role, handle)?;
        self.unpin_ancestors(index);
        Ok(())
    }

    pub(crate) fn lock(&mut self, node: NodeRef) -> Result<()> {
        let index = self.check(node)?;
        if let Some(n) = self.get_mut(index) {
            n.locks += 1;
        }
        self.pin_ancestors(index);
        Ok(())
    }

    /// Drop one lock; returns false if the node was not locked
    pub(crate) fn unlock(&mut self, node: NodeRef) -> Result<bool> {
        let index = self.check(node)?;
        match self.get_mut(index) {
            Some(n) if n.locks > 0 => n.locks -= 1,
            _ => return Ok(false),
        }
        self.unpin_ancestors(index);
        Ok(true)
    }

    /// Lock `node` and keep its whole subtree out of the collector's reach,
    /// so a blocking read sees every descendant as it arrives
    pub(crate) fn shield(&mut self, node: NodeRef) -> Result<()> {
        self.lock(node)?;
        if let Some(n) = self.get_mut(node.index()) {
            n.shields += 1;
        }
        Ok(())
    }

    /// Undo [`Buffer::shield`]. With collect-on-close on, an idle node and
    /// whatever closed under it during the read are collected now; a node
    /// still held keeps its subtree until that hold is released.
    pub(crate) fn unshield(&mut self, node: NodeRef) -> Result<()> {
        let index = self.check(node)?;
        if let Some(n) = self.get_mut(index) {
            n.shields = n.shields.saturating_sub(1);
        }
        self.unlock(node)?;
        let idle = self.get(index).is_some_and(|n| !n.is_held() && n.shields == 0);
        if self.collect_on_close && idle {
            self.clear_index(index);
        }
        Ok(())
    }

    fn pin_ancestors(&mut self, index: u32) {
        let mut current = self.get(index).and_then(|n| n.parent);
        while let Some(i) = current {
            let Some(n) = self.get_mut(i) else { break };
            n.pinned_below += 1;
            current = n.parent;
        }
    }

    fn unpin_ancestors(&mut self, index: u32) {
        let mut current = self.get(index).and_then(|n| n.parent);
        while let Some(i) = current {
            let Some(n) = self.get_mut(i) else { break };
            n.pinned_below = n.pinned_below.saturating_sub(1);
            current = n.parent;
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn kind(&self, node: NodeRef) -> Result<NodeKind> {
        Ok(self.node(node)?.kind())
    }

    /// Element name id, `None` for text nodes
    pub fn tag_id(&self, node: NodeRef) -> Result<Option<TagId>> {
        Ok(self.node(node)?.tag_id())
    }

    pub fn is_closed(&self, node: NodeRef) -> Result<bool> {
        Ok(self.node(node)?.is_closed())
    }

    /// Character content of a text node
    pub fn text(&self, node: NodeRef) -> Result<Option<&str>> {
        Ok(self.node(node)?.text_content())
    }

    pub fn roles(&self, node: NodeRef) -> Result<&RoleSet> {
        Ok(&self.node(node)?.roles)
    }

    pub fn is_locked(&self, node: NodeRef) -> Result<bool> {
        Ok(self.node(node)?.locks > 0)
    }

    pub fn parent(&self, node: NodeRef) -> Result<Option<NodeRef>> {
        Ok(self.node(node)?.parent.map(|p| self.ref_of(p)))
    }

    pub fn first_child(&self, node: NodeRef) -> Result<Option<NodeRef>> {
        Ok(self.node(node)?.first_child.map(|c| self.ref_of(c)))
    }

    pub fn last_child(&self, node: NodeRef) -> Result<Option<NodeRef>> {
        Ok(self.node(node)?.last_child.map(|c| self.ref_of(c)))
    }

    pub fn next_sibling(&self, node: NodeRef) -> Result<Option<NodeRef>> {
        Ok(self.node(node)?.next_sibling.map(|s| self.ref_of(s)))
    }

    /// Live children in document order
    pub fn children(&self, node: NodeRef) -> Result<Vec<NodeRef>> {
        let mut result = Vec::new();
        let mut child = self.node(node)?.first_child;
        while let Some(c) = child {
            result.push(self.ref_of(c));
            child = self.get(c).and_then(|n| n.next_sibling);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleKind;

    pub(crate) fn buffer_with_roles() -> (Buffer, RoleId, RoleId) {
        let mut reg = RoleRegistry::new();
        let plain = reg.register(RoleKind::NonCumulative, "r1");
        let cumulative = reg.register(RoleKind::Cumulative, "r2");
        (Buffer::new(Rc::new(reg)), plain, cumulative)
    }

    #[test]
    fn test_append_moves_cursor() {
        let (mut buf, _, _) = buffer_with_roles();
        let a = buf.append_tag(TagId(1), &[]).unwrap();
        assert_eq!(buf.cursor(), a);
        let t = buf.append_text("hi", &[]).unwrap();
        assert_eq!(buf.cursor(), a);
        assert_eq!(buf.kind(t).unwrap(), NodeKind::Text);
        assert_eq!(buf.parent(t).unwrap(), Some(a));
        assert_eq!(buf.close_current().unwrap(), a);
        assert_eq!(buf.cursor(), buf.root());
        assert!(buf.is_closed(a).unwrap());
    }

    #[test]
    fn test_children_in_document_order() {
        let (mut buf, _, _) = buffer_with_roles();
        buf.set_collect_on_close(false);
        let a = buf.append_tag(TagId(1), &[]).unwrap();
        let b = buf.append_tag(TagId(2), &[]).unwrap();
        buf.close_current().unwrap();
        let t = buf.append_text("x", &[]).unwrap();
        let c = buf.append_tag(TagId(3), &[]).unwrap();
        buf.close_current().unwrap();
        buf.close_current().unwrap();
        assert_eq!(buf.children(a).unwrap(), vec![b, t, c]);
        assert_eq!(buf.first_child(a).unwrap(), Some(b));
        assert_eq!(buf.last_child(a).unwrap(), Some(c));
        assert_eq!(buf.next_sibling(b).unwrap(), Some(t));
        assert_eq!(buf.next_sibling(c).unwrap(), None);
    }

    #[test]
    fn test_roles_attached_at_creation() {
        let (mut buf, plain, cumulative) = buffer_with_roles();
        let a = buf.append_tag(TagId(1), &[cumulative, plain]).unwrap();
        let roles = buf.roles(a).unwrap();
        assert_eq!(roles.cumulative(), &[cumulative]);
        assert_eq!(roles.non_cumulative(), &[plain]);
        assert_eq!(buf.get(ROOT).unwrap().pinned_below, 2);
    }

    #[test]
    fn test_close_root_errors() {
        let (mut buf, _, _) = buffer_with_roles();
        assert!(buf.close_current().is_err());
        buf.append_tag(TagId(1), &[]).unwrap();
        assert!(buf.close_root().is_err());
        buf.close_current().unwrap();
        buf.close_root().unwrap();
        assert!(buf.is_closed(buf.root()).unwrap());
        assert!(buf.append_tag(TagId(1), &[]).is_err());
    }

    #[test]
    fn test_lock_pins_ancestors() {
        let (mut buf, _, _) = buffer_with_roles();
        let a = buf.append_tag(TagId(1), &[]).unwrap();
        let t = buf.append_text("x", &[]).unwrap();
        buf.lock(t).unwrap();
        assert!(buf.is_locked(t).unwrap());
        assert_eq!(buf.get(a.index()).unwrap().pinned_below, 1);
        assert!(buf.unlock(t).unwrap());
        assert!(!buf.unlock(t).unwrap());
        assert_eq!(buf.get(a.index()).unwrap().pinned_below, 0);
    }

    #[test]
    fn test_close_root_keeps_idle_nodes_without_collect_on_close() {
        let (mut buf, _, _) = buffer_with_roles();
        let a = buf.append_tag(TagId(1), &[]).unwrap();
        let t = buf.append_text("x", &[]).unwrap();
        buf.close_current().unwrap();
        buf.close_root().unwrap();
        assert!(buf.is_alive(a));
        assert!(buf.is_alive(t));
        assert_eq!(buf.stats().live, 3);

        let (mut buf, _, _) = buffer_with_roles();
        buf.set_collect_on_close(true);
        buf.append_tag(TagId(1), &[]).unwrap();
        buf.close_current().unwrap();
        buf.close_root().unwrap();
        assert_eq!(buf.stats().live, 1);
    }

    #[test]
    fn test_shield_defers_collection_below() {
        let (mut buf, _, _) = buffer_with_roles();
        buf.set_collect_on_close(true);
        let a = buf.append_tag(TagId(1), &[]).unwrap();
        buf.shield(a).unwrap();
        let b = buf.append_tag(TagId(2), &[]).unwrap();
        let t = buf.append_text("y", &[]).unwrap();
        buf.close_current().unwrap();
        buf.close_current().unwrap();
        assert!(buf.is_alive(b));
        assert!(buf.is_alive(t));
        assert!(buf.is_locked(a).unwrap());

        buf.unshield(a).unwrap();
        assert!(!buf.is_alive(a));
        assert_eq!(buf.stats().live, 1);
    }

    #[test]
    fn test_unshield_keeps_subtree_of_held_node() {
        let (mut buf, plain, _) = buffer_with_roles();
        buf.set_collect_on_close(true);
        let a = buf.append_tag(TagId(1), &[plain]).unwrap();
        buf.shield(a).unwrap();
        let t = buf.append_text("y", &[]).unwrap();
        buf.close_current().unwrap();
        buf.unshield(a).unwrap();
        assert!(buf.is_alive(t));

        buf.remove_role(a, plain).unwrap();
        assert!(!buf.is_alive(a));
        assert!(!buf.is_alive(t));
    }

    #[test]
    fn test_stale_handle_detected() {
        let (mut buf, plain, _) = buffer_with_roles();
        let a = buf.append_tag(TagId(1), &[plain]).unwrap();
        buf.close_current().unwrap();
        buf.remove_role(a, plain).unwrap();
        assert!(!buf.is_alive(a));
        assert!(matches!(buf.kind(a), Err(Error::IteratorMisuse { .. })));

        // Reused slot gets a new generation
        let b = buf.append_tag(TagId(2), &[]).unwrap();
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(buf.is_alive(b));
        assert!(!buf.is_alive(a));
    }

    #[test]
    fn test_stats_track_peak() {
        let (mut buf, plain, _) = buffer_with_roles();
        let a = buf.append_tag(TagId(1), &[plain]).unwrap();
        buf.append_text("x", &[]).unwrap();
        buf.close_current().unwrap();
        assert_eq!(buf.stats().live, 3);
        buf.remove_role(a, plain).unwrap();
        let stats = buf.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.peak, 3);
        assert_eq!(stats.created, 3);
        assert_eq!(stats.collected, 2);
    }
}
