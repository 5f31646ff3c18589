//! Stream handle and node locks
//!
//! A [`Stream`] ties a driver to the buffer it feeds. It is a cheap clonable
//! handle: iterators keep their own clone so they can pull tokens on demand
//! while the evaluator keeps using the stream. Everything is single-threaded
//! and cooperative; no borrow of the buffer is held across a pull.
//!
//! Holding on to a node across a sign-off requires a [`NodeLock`]. The lock
//! is released when the guard is dropped, and the collector then reclaims
//! whatever the lock alone was keeping alive. A guard dropped while the
//! buffer is borrowed queues its node instead; the queue is settled before
//! the stream next touches the buffer mutably.

use crate::axis::{Axis, AxisIter, ChildAxis, DescendantAxis, NodeTest};
use crate::buffer::{Buffer, BufferStats, NodeKind, NodeRef};
use crate::config::StreamConfig;
use crate::driver::{Driver, DriverStats, Oracle};
use crate::error::{Error, Result};
use crate::roles::{RoleId, RoleRegistry};
use crate::source::TokenSource;
use crate::tags::{TagDictionary, TagId};
use std::cell::{RefCell, RefMut};
use std::rc::Rc;
use tracing::{debug, warn};

/// Nodes whose guards were dropped while the buffer was borrowed
type Deferred = Rc<RefCell<Vec<NodeRef>>>;

pub struct Stream<S, O: Oracle> {
    driver: Rc<RefCell<Driver<S, O>>>,
    buffer: Rc<RefCell<Buffer>>,
    deferred: Deferred,
}

impl<S, O: Oracle> Clone for Stream<S, O> {
    fn clone(&self) -> Self {
        Stream {
            driver: Rc::clone(&self.driver),
            buffer: Rc::clone(&self.buffer),
            deferred: Rc::clone(&self.deferred),
        }
    }
}

impl<S: TokenSource, O: Oracle> Stream<S, O> {
    /// Set up a stream over `source`. `tags` and `registry` are the ones the
    /// oracle was compiled against.
    pub fn new(
        source: S,
        oracle: O,
        tags: TagDictionary,
        registry: Rc<RoleRegistry>,
        config: StreamConfig,
    ) -> Self {
        let mut buffer = Buffer::new(registry);
        buffer.set_collect_on_close(config.collect_on_close);
        Stream {
            driver: Rc::new(RefCell::new(Driver::new(source, oracle, tags, config))),
            buffer: Rc::new(RefCell::new(buffer)),
            deferred: Rc::default(),
        }
    }

    /// Pull and apply one token; `false` once the input is exhausted
    pub fn read_next(&self) -> Result<bool> {
        let busy = |_| Error::stream("stream pulled while its buffer is borrowed");
        let mut buffer = self.buffer.try_borrow_mut().map_err(busy)?;
        settle(&self.deferred, &mut buffer);
        let mut driver = self.driver.try_borrow_mut().map_err(busy)?;
        driver.read_next(&mut buffer)
    }

    /// Drain the rest of the input
    pub fn read_to_end(&self) -> Result<()> {
        while self.read_next()? {}
        Ok(())
    }

    pub fn root(&self) -> NodeRef {
        self.buffer.borrow().root()
    }

    pub fn children(&self, node: NodeRef, test: NodeTest) -> ChildAxis<S, O> {
        ChildAxis::new(self.clone(), node, test)
    }

    pub fn descendants(&self, node: NodeRef, test: NodeTest) -> DescendantAxis<S, O> {
        DescendantAxis::new(self.clone(), node, test)
    }

    pub fn axis(&self, axis: Axis, node: NodeRef, test: NodeTest) -> AxisIter<S, O> {
        match axis {
            Axis::Child => AxisIter::Child(self.children(node, test)),
            Axis::Descendant => AxisIter::Descendant(self.descendants(node, test)),
        }
    }

    /// Lock a node against collection until the guard is dropped
    pub fn lock(&self, node: NodeRef) -> Result<NodeLock> {
        self.buffer_mut().lock(node)?;
        Ok(NodeLock {
            buffer: Rc::clone(&self.buffer),
            deferred: Rc::clone(&self.deferred),
            node,
        })
    }

    /// Sign off one role instance and collect what it freed
    pub fn remove_role(&self, node: NodeRef, role: RoleId) -> Result<()> {
        self.buffer_mut().remove_role(node, role)
    }

    pub fn add_role(&self, node: NodeRef, role: RoleId) -> Result<()> {
        self.buffer_mut().add_role(node, role)
    }

    /// Mutable buffer access, with deferred unlocks applied first
    fn buffer_mut(&self) -> RefMut<'_, Buffer> {
        let mut buffer = self.buffer.borrow_mut();
        settle(&self.deferred, &mut buffer);
        buffer
    }

    /// Pull tokens until `node` is closed.
    ///
    /// Fails with a stream consistency error if the input runs out first.
    /// The caller should hold a lock on `node`, otherwise it may be
    /// collected while reading. Role-free descendants may still be collected
    /// as they close; [`Stream::text_content`] and [`Stream::serialize`]
    /// shield the subtree for the duration of the read.
    pub fn read_until_closed(&self, node: NodeRef) -> Result<()> {
        let mut exhausted = false;
        while !self.buffer.borrow().is_closed(node)? {
            if exhausted {
                return Err(Error::stream("input exhausted before the node was closed"));
            }
            exhausted = !self.read_next()?;
        }
        Ok(())
    }

    /// Character content of the complete node, blocking until it closes
    pub fn text_content(&self, node: NodeRef) -> Result<String> {
        self.read_whole(node, |buffer, _| buffer.text_content(node))
    }

    /// The complete node as XML, blocking until it closes
    pub fn serialize(&self, node: NodeRef) -> Result<String> {
        self.read_whole(node, |buffer, tags| buffer.serialize(node, tags))
    }

    /// Read `node` to its close with its subtree shielded from collection,
    /// then render it. The shield comes off even when the read fails.
    fn read_whole<R>(
        &self,
        node: NodeRef,
        render: impl FnOnce(&Buffer, &TagDictionary) -> Result<R>,
    ) -> Result<R> {
        self.buffer_mut().shield(node)?;
        let rendered = self.read_until_closed(node).and_then(|()| {
            let driver = self.driver.borrow();
            render(&self.buffer.borrow(), driver.tags())
        });
        let released = self.buffer_mut().unshield(node);
        let value = rendered?;
        released?;
        Ok(value)
    }

    /// Id of an element name seen so far (or bound by the query)
    pub fn lookup_tag(&self, name: &[u8]) -> Option<TagId> {
        self.driver.borrow().tags().get(name)
    }

    pub fn tag_id(&self, node: NodeRef) -> Result<Option<TagId>> {
        self.buffer.borrow().tag_id(node)
    }

    /// Element name of a node, `None` for text
    pub fn tag_name(&self, node: NodeRef) -> Result<Option<String>> {
        let tag = self.tag_id(node)?;
        let driver = self.driver.borrow();
        Ok(tag.and_then(|t| driver.tags().name(t)).map(str::to_string))
    }

    pub fn kind(&self, node: NodeRef) -> Result<NodeKind> {
        self.buffer.borrow().kind(node)
    }

    pub fn is_closed(&self, node: NodeRef) -> Result<bool> {
        self.buffer.borrow().is_closed(node)
    }

    pub fn is_alive(&self, node: NodeRef) -> bool {
        self.buffer.borrow().is_alive(node)
    }

    pub fn dump(&self) -> String {
        let driver = self.driver.borrow();
        self.buffer.borrow().dump(driver.tags())
    }

    pub fn dump_roles(&self) -> String {
        let driver = self.driver.borrow();
        let buffer = self.buffer.borrow();
        buffer.dump_roles(driver.tags(), buffer.registry())
    }

    pub fn stats(&self) -> BufferStats {
        self.buffer.borrow().stats()
    }

    pub fn driver_stats(&self) -> DriverStats {
        self.driver.borrow().stats()
    }

    pub fn is_exhausted(&self) -> bool {
        self.driver.borrow().is_exhausted()
    }

    /// Run `f` against the buffer
    pub fn with_buffer<R>(&self, f: impl FnOnce(&Buffer) -> R) -> R {
        f(&self.buffer.borrow())
    }
}

/// Guard pinning a node against collection.
///
/// Dropping it releases the lock and runs the collector on the node.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct NodeLock {
    buffer: Rc<RefCell<Buffer>>,
    deferred: Deferred,
    node: NodeRef,
}

impl NodeLock {
    pub fn node(&self) -> NodeRef {
        self.node
    }
}

impl std::fmt::Debug for NodeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLock").field("node", &self.node).finish()
    }
}

impl Drop for NodeLock {
    fn drop(&mut self) {
        match self.buffer.try_borrow_mut() {
            Ok(mut buffer) => release(&mut buffer, self.node),
            Err(_) => {
                debug!(node = ?self.node, "lock dropped while the buffer was borrowed; unlock deferred");
                self.deferred.borrow_mut().push(self.node);
            }
        }
    }
}

/// Unlock a node and collect what the lock alone was keeping alive
fn release(buffer: &mut Buffer, node: NodeRef) {
    match buffer.unlock(node) {
        Ok(true) => {
            if let Err(e) = buffer.clear(node) {
                warn!(node = ?node, error = %e, "collection after unlock failed");
            }
        }
        Ok(false) => warn!(node = ?node, "lock guard found the node unlocked"),
        Err(e) => warn!(node = ?node, error = %e, "lock guard outlived its node"),
    }
}

/// Apply unlocks whose guards were dropped during a borrow
fn settle(deferred: &Deferred, buffer: &mut Buffer) {
    let pending = std::mem::take(&mut *deferred.borrow_mut());
    for node in pending {
        release(buffer, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MaterializeAll;
    use crate::roles::RoleKind;
    use crate::source::{ScriptSource, ScriptToken, SliceSource};

    fn keep_all(input: &[u8]) -> Stream<SliceSource<'_>, MaterializeAll> {
        Stream::new(
            SliceSource::new(input),
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default().with_collect_on_close(false),
        )
    }

    #[test]
    fn test_clones_share_state() {
        let stream = keep_all(b"<a>x</a>");
        let other = stream.clone();
        assert!(stream.read_next().unwrap());
        assert_eq!(other.dump(), "<a>");
        other.read_to_end().unwrap();
        assert!(stream.is_exhausted());
        assert_eq!(stream.dump(), "<a>\"x\"</a>");
    }

    #[test]
    fn test_text_content_blocks_until_closed() {
        let stream = keep_all(b"<a>one<b>two</b>three</a>");
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        assert!(!stream.is_closed(a).unwrap());
        assert_eq!(stream.text_content(a).unwrap(), "onetwothree");
        assert!(stream.is_closed(a).unwrap());
        assert_eq!(stream.serialize(a).unwrap(), "<a>one<b>two</b>three</a>");
        assert_eq!(stream.tag_name(a).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_read_until_closed_on_truncated_stream() {
        let source = ScriptSource::new(vec![ScriptToken::open("a")]);
        let stream = Stream::new(
            source,
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default(),
        );
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        assert!(matches!(
            stream.read_until_closed(a),
            Err(Error::StreamConsistency { .. })
        ));
    }

    #[test]
    fn test_lock_guard_releases_and_collects() {
        let stream = Stream::new(
            SliceSource::new(b"<a>x</a><b/>"),
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default(),
        );
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        let guard = stream.lock(a).unwrap();
        assert_eq!(guard.node(), a);
        stream.read_until_closed(a).unwrap();
        assert!(stream.is_alive(a));

        drop(guard);
        assert!(!stream.is_alive(a));
    }

    #[test]
    fn test_role_keeps_node_after_unlock() {
        let mut reg = RoleRegistry::new();
        let role = reg.register(RoleKind::NonCumulative, "r");
        let stream = Stream::new(
            SliceSource::new(b"<a/>"),
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(reg),
            StreamConfig::default(),
        );
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        stream.add_role(a, role).unwrap();
        {
            let _guard = stream.lock(a).unwrap();
            stream.read_to_end().unwrap();
        }
        assert!(stream.is_alive(a));
        assert!(stream.dump_roles().contains("a [r]"));
        stream.remove_role(a, role).unwrap();
        assert!(!stream.is_alive(a));
        assert_eq!(stream.stats().live, 1);
    }

    #[test]
    fn test_guard_dropped_during_borrow_is_deferred() {
        let stream = keep_all(b"<a/>");
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        let guard = stream.lock(a).unwrap();
        stream.with_buffer(|_| drop(guard));
        assert!(stream.with_buffer(|b| b.is_locked(a).unwrap()));

        // Settled by the next mutation of the buffer
        stream.read_next().unwrap();
        assert!(!stream.with_buffer(|b| b.is_locked(a).unwrap()));
    }

    #[test]
    fn test_deferred_unlock_collects_under_default_config() {
        let stream = Stream::new(
            SliceSource::new(b"<a>x</a><b/>"),
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default(),
        );
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        let guard = stream.lock(a).unwrap();
        stream.read_until_closed(a).unwrap();
        stream.with_buffer(|_| drop(guard));
        assert!(stream.is_alive(a));
        stream.read_to_end().unwrap();
        assert!(!stream.is_alive(a));
        assert_eq!(stream.stats().live, 1);
    }

    #[test]
    fn test_blocking_read_sees_whole_node_under_default_config() {
        let stream = Stream::new(
            SliceSource::new(b"<r><a>x<b>y</b>z</a><a>p<b>q</b></a></r>"),
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default(),
        );
        stream.read_next().unwrap();
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        let guard = stream.lock(a).unwrap();
        assert_eq!(stream.text_content(a).unwrap(), "xyz");
        assert_eq!(stream.serialize(a).unwrap(), "<a>x<b>y</b>z</a>");
        drop(guard);
        assert!(!stream.is_alive(a));

        // Unlocked node: the read shields it until the content is rendered
        stream.read_next().unwrap();
        let second = stream.with_buffer(|b| b.cursor());
        assert_eq!(stream.serialize(second).unwrap(), "<a>p<b>q</b></a>");
        assert!(!stream.is_alive(second));
    }

    #[test]
    fn test_shield_released_when_read_fails() {
        let source = ScriptSource::new(vec![ScriptToken::open("a"), ScriptToken::text("x")]);
        let stream = Stream::new(
            source,
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default(),
        );
        stream.read_next().unwrap();
        let a = stream.with_buffer(|b| b.cursor());
        assert!(matches!(
            stream.text_content(a),
            Err(Error::StreamConsistency { .. })
        ));
        assert!(!stream.with_buffer(|b| b.is_locked(a).unwrap()));
    }
}
