//! Buffer node representation
//!
//! Nodes live in arena slots and link to each other by slot index. Handles
//! given out to callers are generational ([`NodeRef`]) so a handle to a
//! collected node is detected instead of aliasing whatever reused the slot.

use crate::roles::RoleSet;
use crate::tags::TagId;

/// Generational handle to a buffered node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    index: u32,
    generation: u32,
}

impl NodeRef {
    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        NodeRef { index, generation }
    }

    /// Slot index (stable while the node is alive)
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Public view of a node's variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Element (or the document root)
    Tag,
    /// Character content
    Text,
}

/// Variant-specific payload
#[derive(Debug)]
pub(crate) enum Payload {
    Tag { tag: TagId, closed: bool },
    Text(Box<str>),
}

/// A node in the arena
#[derive(Debug)]
pub(crate) struct BufferNode {
    pub payload: Payload,
    /// Owning parent (None only for the root)
    pub parent: Option<u32>,
    pub first_child: Option<u32>,
    pub last_child: Option<u32>,
    /// Non-owning link to the following sibling
    pub next_sibling: Option<u32>,
    pub roles: RoleSet,
    /// Active locks held by callers
    pub locks: u32,
    /// Role instances plus locks on strict descendants
    pub pinned_below: u32,
    /// Blocking reads in progress; the subtree is treated like a
    /// cumulative role holder meanwhile
    pub shields: u32,
}

impl BufferNode {
    pub fn tag(tag: TagId, parent: Option<u32>) -> Self {
        BufferNode {
            payload: Payload::Tag { tag, closed: false },
            parent,
            first_child: None,
            last_child: None,
            next_sibling: None,
            roles: RoleSet::default(),
            locks: 0,
            pinned_below: 0,
            shields: 0,
        }
    }

    pub fn text(content: Box<str>, parent: u32) -> Self {
        BufferNode {
            payload: Payload::Text(content),
            parent: Some(parent),
            first_child: None,
            last_child: None,
            next_sibling: None,
            roles: RoleSet::default(),
            locks: 0,
            pinned_below: 0,
            shields: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        match self.payload {
            Payload::Tag { .. } => NodeKind::Tag,
            Payload::Text(_) => NodeKind::Text,
        }
    }

    #[inline]
    pub fn tag_id(&self) -> Option<TagId> {
        match self.payload {
            Payload::Tag { tag, .. } => Some(tag),
            Payload::Text(_) => None,
        }
    }

    /// Text nodes are complete on arrival
    #[inline]
    pub fn is_closed(&self) -> bool {
        match self.payload {
            Payload::Tag { closed, .. } => closed,
            Payload::Text(_) => true,
        }
    }

    #[inline]
    pub fn text_content(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(t) => Some(t),
            Payload::Tag { .. } => None,
        }
    }

    /// Carries a role or is locked by a caller
    #[inline]
    pub fn is_held(&self) -> bool {
        self.locks > 0 || !self.roles.is_empty()
    }
}

/// Arena slot: the generation is bumped every time the slot is freed
#[derive(Debug)]
pub(crate) struct Slot {
    pub generation: u32,
    pub node: Option<BufferNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_node() {
        let node = BufferNode::tag(TagId(3), Some(0));
        assert_eq!(node.kind(), NodeKind::Tag);
        assert_eq!(node.tag_id(), Some(TagId(3)));
        assert!(!node.is_closed());
        assert!(!node.is_held());
    }

    #[test]
    fn test_text_node() {
        let node = BufferNode::text("hello".into(), 0);
        assert_eq!(node.kind(), NodeKind::Text);
        assert!(node.is_closed());
        assert_eq!(node.text_content(), Some("hello"));
        assert_eq!(node.tag_id(), None);
    }
}
