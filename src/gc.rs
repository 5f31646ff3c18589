//! Garbage Collector
//!
//! Role-driven pruning of the buffer. Collection is triggered locally, by a
//! role sign-off, a lock release or (optionally) a close tag, and never
//! sweeps the whole tree:
//! - `clear_subtree` (downward): deletes the dead prefix of a node's child
//!   list, unless the node sits under a cumulative role
//! - `clear` (upward): after pruning, climbs through ancestors that are left
//!   empty and role-free, collapsing the chain in one sweep
//!
//! A node is deleted only when it is closed (text is always closed), carries
//! no role, is not locked and has nothing pinned below it. Deletable children
//! always form a prefix of the child list, so deletion stops at the first
//! child that must stay.

use crate::buffer::{Buffer, NodeRef, Payload, ROOT};
use crate::error::Result;
use crate::roles::RoleId;
use tracing::{debug, trace};

impl Buffer {
    /// Sign off one instance of `role` on `node` and collect what it freed
    pub fn remove_role(&mut self, node: NodeRef, role: RoleId) -> Result<()> {
        let index = self.check(node)?;
        self.detach_role(index, role)?;
        trace!(node = index, role = role.0, "role signed off");
        self.clear_index(index);
        Ok(())
    }

    /// Upward half: prune `node`'s subtree, then collapse empty ancestors
    pub fn clear(&mut self, node: NodeRef) -> Result<()> {
        let index = self.check(node)?;
        self.clear_index(index);
        Ok(())
    }

    /// Downward half: delete the dead prefix of `node`'s children
    pub fn clear_subtree(&mut self, node: NodeRef) -> Result<()> {
        let index = self.check(node)?;
        self.clear_subtree_index(index);
        Ok(())
    }

    pub(crate) fn clear_index(&mut self, mut index: u32) {
        loop {
            self.clear_subtree_index(index);

            let Some(node) = self.get(index) else { return };
            if !node.roles.is_empty() {
                return;
            }
            let parent = match node.payload {
                Payload::Tag { .. } if node.first_child.is_some() || index == ROOT => return,
                _ => node.parent,
            };
            match parent {
                Some(p) => index = p,
                None => return,
            }
        }
    }

    pub(crate) fn clear_subtree_index(&mut self, index: u32) {
        if self.is_protected(index) {
            return;
        }
        let mut removed = 0u64;
        while let Some(child) = self.get(index).and_then(|n| n.first_child) {
            if !self.is_deletable(child) {
                break;
            }
            self.unlink_first_child(index);
            removed += self.delete_subtree(child);
        }
        if removed > 0 {
            debug!(parent = index, nodes = removed, "collected dead prefix");
        }
    }

    /// The node or one of its ancestors carries a cumulative role
    pub(crate) fn is_protected(&self, index: u32) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            let Some(node) = self.get(i) else { return false };
            if node.roles.has_cumulative() || node.shields > 0 {
                return true;
            }
            current = node.parent;
        }
        false
    }

    fn is_deletable(&self, index: u32) -> bool {
        match self.get(index) {
            Some(node) => node.is_closed() && !node.is_held() && node.pinned_below == 0,
            None => false,
        }
    }

    /// Free an already unlinked subtree, returning the number of nodes freed
    fn delete_subtree(&mut self, index: u32) -> u64 {
        let mut stack = vec![index];
        let mut freed = 0;
        while let Some(i) = stack.pop() {
            let mut child = self.get(i).and_then(|n| n.first_child);
            while let Some(c) = child {
                stack.push(c);
                child = self.get(c).and_then(|n| n.next_sibling);
            }
            if self.release_slot(i).is_some() {
                freed += 1;
            }
        }
        freed
    }
}
