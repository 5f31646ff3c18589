//! Axis Iterators
//!
//! Lazy child and descendant traversals over the buffer that pull tokens
//! through the stream whenever the next structural position has not arrived
//! yet. Each iterator moves `Initial -> Positioned -> Exhausted`.
//!
//! Iterators never lock. Between two `next()` calls the evaluator may sign
//! off roles or drop locks, and the collector may delete the position the
//! iterator last returned. The collector only ever removes a prefix of a
//! child list, so every sibling before a collected node is gone as well and
//! the first live child of the deepest surviving ancestor is always the
//! correct place to resume. Only a collected base node is an error.

use crate::buffer::{NodeKind, NodeRef};
use crate::driver::Oracle;
use crate::error::{Error, Result};
use crate::source::TokenSource;
use crate::stream::Stream;
use crate::tags::TagId;

/// Navigational axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
}

/// Node test applied to each candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTest {
    /// Element with this name
    Tag(TagId),
    /// Any element
    Wildcard,
    /// Any element or text node
    AnyNode,
    /// Any text node
    Text,
}

impl NodeTest {
    #[inline]
    pub fn matches(self, kind: NodeKind, tag: Option<TagId>) -> bool {
        match self {
            NodeTest::Tag(t) => kind == NodeKind::Tag && tag == Some(t),
            NodeTest::Wildcard => kind == NodeKind::Tag,
            NodeTest::AnyNode => true,
            NodeTest::Text => kind == NodeKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Initial,
    Positioned,
    Exhausted,
}

/// Result of looking for a structural neighbour
enum Lookup {
    Found(NodeRef),
    /// The anchor is closed and has no such neighbour
    Absent,
    /// The node the lookup started from was collected during a pull
    Collected,
}

/// Wait for the first child of `node`, pulling while it is open
fn seek_first_child<S: TokenSource, O: Oracle>(stream: &Stream<S, O>, node: NodeRef) -> Result<Lookup> {
    let mut exhausted = false;
    loop {
        let found = stream.with_buffer(|b| -> Result<Option<Lookup>> {
            if !b.is_alive(node) {
                return Ok(Some(Lookup::Collected));
            }
            if let Some(child) = b.first_child(node)? {
                return Ok(Some(Lookup::Found(child)));
            }
            Ok(b.is_closed(node)?.then_some(Lookup::Absent))
        })?;
        if let Some(lookup) = found {
            return Ok(lookup);
        }
        exhausted = pull(stream, exhausted)?;
    }
}

/// Wait for the next sibling of `node` under `parent`, pulling while the
/// parent is open
fn seek_next_sibling<S: TokenSource, O: Oracle>(
    stream: &Stream<S, O>,
    node: NodeRef,
    parent: NodeRef,
) -> Result<Lookup> {
    let mut exhausted = false;
    loop {
        let found = stream.with_buffer(|b| -> Result<Option<Lookup>> {
            if !b.is_alive(node) {
                return Ok(Some(Lookup::Collected));
            }
            if let Some(sibling) = b.next_sibling(node)? {
                return Ok(Some(Lookup::Found(sibling)));
            }
            Ok(b.is_closed(parent)?.then_some(Lookup::Absent))
        })?;
        if let Some(lookup) = found {
            return Ok(lookup);
        }
        exhausted = pull(stream, exhausted)?;
    }
}

/// Pull one token. The pull that reaches the end of input still closes the
/// root, so the caller gets one more look before exhaustion is an error.
fn pull<S: TokenSource, O: Oracle>(stream: &Stream<S, O>, exhausted: bool) -> Result<bool> {
    if exhausted {
        return Err(Error::stream("input exhausted while an iterated node is still open"));
    }
    Ok(!stream.read_next()?)
}

fn test_node<S: TokenSource, O: Oracle>(stream: &Stream<S, O>, node: NodeRef, test: NodeTest) -> Result<bool> {
    stream.with_buffer(|b| Ok(test.matches(b.kind(node)?, b.tag_id(node)?)))
}

fn check_base<S: TokenSource, O: Oracle>(stream: &Stream<S, O>, base: NodeRef) -> Result<()> {
    if stream.is_alive(base) {
        Ok(())
    } else {
        Err(Error::IteratorMisuse { node: base })
    }
}

// ============================================================================
// Child axis
// ============================================================================

/// Direct children of a base node, in document order
pub struct ChildAxis<S, O: Oracle> {
    stream: Stream<S, O>,
    base: NodeRef,
    test: NodeTest,
    state: IterState,
    current: Option<NodeRef>,
}

impl<S: TokenSource, O: Oracle> ChildAxis<S, O> {
    pub fn new(stream: Stream<S, O>, base: NodeRef, test: NodeTest) -> Self {
        ChildAxis {
            stream,
            base,
            test,
            state: IterState::Initial,
            current: None,
        }
    }

    pub fn base(&self) -> NodeRef {
        self.base
    }

    fn advance(&mut self) -> Result<Option<NodeRef>> {
        loop {
            let lookup = match (self.state, self.current) {
                (IterState::Exhausted, _) => return Ok(None),
                (IterState::Positioned, Some(prev)) => {
                    match seek_next_sibling(&self.stream, prev, self.base)? {
                        Lookup::Collected => self.restart()?,
                        other => other,
                    }
                }
                _ => self.restart()?,
            };
            match lookup {
                Lookup::Found(node) => {
                    self.state = IterState::Positioned;
                    self.current = Some(node);
                    if test_node(&self.stream, node, self.test)? {
                        return Ok(Some(node));
                    }
                }
                Lookup::Absent | Lookup::Collected => {
                    self.state = IterState::Exhausted;
                    self.current = None;
                    return Ok(None);
                }
            }
        }
    }

    /// First live child of the base; everything before it is either
    /// visited or collected
    fn restart(&self) -> Result<Lookup> {
        check_base(&self.stream, self.base)?;
        match seek_first_child(&self.stream, self.base)? {
            Lookup::Collected => Err(Error::IteratorMisuse { node: self.base }),
            other => Ok(other),
        }
    }
}

impl<S: TokenSource, O: Oracle> Iterator for ChildAxis<S, O> {
    type Item = Result<NodeRef>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(node) => node.map(Ok),
            Err(e) => {
                self.state = IterState::Exhausted;
                Some(Err(e))
            }
        }
    }
}

// ============================================================================
// Descendant axis
// ============================================================================

/// All descendants of a base node in pre-order.
///
/// `path` holds the chain from the base (exclusive) down to the last
/// returned position, so traversal can suspend at any pull and resume.
pub struct DescendantAxis<S, O: Oracle> {
    stream: Stream<S, O>,
    base: NodeRef,
    test: NodeTest,
    state: IterState,
    path: Vec<NodeRef>,
}

/// Next pre-order move from the top of the path
#[derive(Clone, Copy)]
enum Move {
    Down,
    Across,
}

impl<S: TokenSource, O: Oracle> DescendantAxis<S, O> {
    pub fn new(stream: Stream<S, O>, base: NodeRef, test: NodeTest) -> Self {
        DescendantAxis {
            stream,
            base,
            test,
            state: IterState::Initial,
            path: Vec::with_capacity(16),
        }
    }

    pub fn base(&self) -> NodeRef {
        self.base
    }

    /// Current depth below the base
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    fn advance(&mut self) -> Result<Option<NodeRef>> {
        if self.state == IterState::Exhausted {
            return Ok(None);
        }
        check_base(&self.stream, self.base)?;
        if self.state == IterState::Positioned {
            self.resume();
        }

        let mut mv = Move::Down;
        loop {
            let anchor = self.path.last().copied().unwrap_or(self.base);
            let lookup = match mv {
                Move::Down => seek_first_child(&self.stream, anchor)?,
                Move::Across => seek_next_sibling(&self.stream, anchor, self.parent_of_top())?,
            };

            match (lookup, mv) {
                (Lookup::Found(node), Move::Down) => {
                    self.path.push(node);
                    if self.visit(node)? {
                        return Ok(Some(node));
                    }
                    mv = Move::Down;
                }
                (Lookup::Found(node), Move::Across) => {
                    if let Some(top) = self.path.last_mut() {
                        *top = node;
                    }
                    if self.visit(node)? {
                        return Ok(Some(node));
                    }
                    mv = Move::Down;
                }
                (Lookup::Absent, _) if self.path.is_empty() => return self.exhaust(),
                (Lookup::Absent, Move::Down) => mv = Move::Across,
                (Lookup::Absent, Move::Across) => {
                    self.path.pop();
                    if self.path.is_empty() {
                        return self.exhaust();
                    }
                }
                (Lookup::Collected, _) => {
                    check_base(&self.stream, self.base)?;
                    self.resume();
                    mv = Move::Down;
                }
            }
        }
    }

    fn visit(&mut self, node: NodeRef) -> Result<bool> {
        self.state = IterState::Positioned;
        test_node(&self.stream, node, self.test)
    }

    fn parent_of_top(&self) -> NodeRef {
        match self.path.len() {
            0 | 1 => self.base,
            n => self.path[n - 2],
        }
    }

    /// Drop collected positions from the path. A collected node takes its
    /// whole subtree with it, so the live entries form a prefix; the top is
    /// checked first since it is almost always alive.
    fn resume(&mut self) {
        let Some(&top) = self.path.last() else { return };
        if self.stream.is_alive(top) {
            return;
        }
        let live = self.stream.with_buffer(|b| self.path.iter().take_while(|&&n| b.is_alive(n)).count());
        self.path.truncate(live);
    }

    fn exhaust(&mut self) -> Result<Option<NodeRef>> {
        self.state = IterState::Exhausted;
        self.path.clear();
        Ok(None)
    }
}

impl<S: TokenSource, O: Oracle> Iterator for DescendantAxis<S, O> {
    type Item = Result<NodeRef>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(node) => node.map(Ok),
            Err(e) => {
                self.state = IterState::Exhausted;
                Some(Err(e))
            }
        }
    }
}

/// Either axis, chosen at runtime
pub enum AxisIter<S, O: Oracle> {
    Child(ChildAxis<S, O>),
    Descendant(DescendantAxis<S, O>),
}

impl<S: TokenSource, O: Oracle> Iterator for AxisIter<S, O> {
    type Item = Result<NodeRef>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            AxisIter::Child(it) => it.next(),
            AxisIter::Descendant(it) => it.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::driver::MaterializeAll;
    use crate::roles::RoleRegistry;
    use crate::source::SliceSource;
    use crate::tags::TagDictionary;
    use std::rc::Rc;

    fn stream(input: &[u8], collect: bool) -> Stream<SliceSource<'_>, MaterializeAll> {
        Stream::new(
            SliceSource::new(input),
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default().with_collect_on_close(collect),
        )
    }

    fn names<S: TokenSource, O: Oracle>(stream: &Stream<S, O>, nodes: &[NodeRef]) -> Vec<String> {
        nodes
            .iter()
            .map(|&n| match stream.tag_name(n).unwrap() {
                Some(name) => name,
                None => format!("{:?}", stream.with_buffer(|b| b.text(n).unwrap().unwrap().to_string())),
            })
            .collect()
    }

    #[test]
    fn test_child_axis_pulls_lazily() {
        let s = stream(b"<r><a/><b>x</b><a/></r>", false);
        let root = s.root();
        let mut top = s.children(root, NodeTest::Wildcard);
        let r = top.next().unwrap().unwrap();
        // Only the open tag of <r> has been read
        assert_eq!(s.dump(), "<r>");
        let kids: Vec<NodeRef> = s.children(r, NodeTest::Wildcard).map(Result::unwrap).collect();
        assert_eq!(names(&s, &kids), vec!["a", "b", "a"]);
        assert!(top.next().is_none());
        assert!(top.next().is_none());
    }

    #[test]
    fn test_child_axis_node_tests() {
        let s = stream(b"<r>t<a/>u<b/></r>", false);
        s.read_to_end().unwrap();
        let r = s.with_buffer(|b| b.children(b.root()).unwrap()[0]);
        let a = s.lookup_tag(b"a").unwrap();
        let count = |test| s.children(r, test).count();
        assert_eq!(count(NodeTest::AnyNode), 4);
        assert_eq!(count(NodeTest::Text), 2);
        assert_eq!(count(NodeTest::Wildcard), 2);
        assert_eq!(count(NodeTest::Tag(a)), 1);
    }

    #[test]
    fn test_descendant_preorder() {
        let s = stream(b"<r><a><b>x</b><c/></a><d>y</d></r>", false);
        let nodes: Vec<NodeRef> = s.descendants(s.root(), NodeTest::AnyNode).map(Result::unwrap).collect();
        assert_eq!(names(&s, &nodes), vec!["r", "a", "b", "\"x\"", "c", "d", "\"y\""]);
    }

    #[test]
    fn test_descendant_visits_every_node_once() {
        // Deep and wide input, every node must appear exactly once in pre-order
        let mut xml = String::new();
        for i in 0..50 {
            xml.push_str(&format!("<n{}>", i % 3));
            xml.push_str("<leaf/>t");
        }
        for i in (0..50).rev() {
            xml.push_str(&format!("</n{}>", i % 3));
        }
        let s = stream(xml.as_bytes(), false);
        let visited: Vec<NodeRef> = s.descendants(s.root(), NodeTest::AnyNode).map(Result::unwrap).collect();
        s.read_to_end().unwrap();

        let mut expected = Vec::new();
        s.with_buffer(|b| {
            let mut stack = vec![b.root()];
            while let Some(n) = stack.pop() {
                if n != b.root() {
                    expected.push(n);
                }
                let mut kids = b.children(n).unwrap();
                kids.reverse();
                stack.extend(kids);
            }
        });
        assert_eq!(visited, expected);
        assert_eq!(visited.len(), 150);
    }

    #[test]
    fn test_descendant_resumes_after_collection() {
        // With collection on close, unlocked positions vanish behind the iterator
        let s = stream(b"<r><a><x/></a><b/><c><y/></c></r>", true);
        let root = s.root();
        let r = s.children(root, NodeTest::Wildcard).next().unwrap().unwrap();
        let _lock = s.lock(r).unwrap();

        let mut seen = Vec::new();
        for node in s.descendants(r, NodeTest::Wildcard) {
            let node = node.unwrap();
            seen.push(s.tag_name(node).unwrap().unwrap());
        }
        assert_eq!(seen, vec!["a", "x", "b", "c", "y"]);
    }

    #[test]
    fn test_descendant_text_content_under_default_config() {
        let s = Stream::new(
            SliceSource::new(b"<r><a>x<b>y</b></a><c>z</c></r>"),
            MaterializeAll,
            TagDictionary::new(),
            Rc::new(RoleRegistry::new()),
            StreamConfig::default(),
        );
        let root = s.root();
        let r = s.children(root, NodeTest::Wildcard).next().unwrap().unwrap();
        let r_lock = s.lock(r).unwrap();

        let mut guards = Vec::new();
        let mut seen = Vec::new();
        for node in s.descendants(r, NodeTest::Wildcard) {
            let node = node.unwrap();
            guards.push(s.lock(node).unwrap());
            let name = s.tag_name(node).unwrap().unwrap();
            seen.push(format!("{}={}", name, s.text_content(node).unwrap()));
        }
        assert_eq!(seen, vec!["a=xy", "b=y", "c=z"]);
        assert!(s.is_exhausted() || !s.read_next().unwrap());

        drop(guards);
        drop(r_lock);
        s.read_to_end().unwrap();
        assert_eq!(s.stats().live, 1);
    }

    #[test]
    fn test_collected_base_is_misuse() {
        let s = stream(b"<r><a/></r><z/>", true);
        let root = s.root();
        let r = s.children(root, NodeTest::Wildcard).next().unwrap().unwrap();
        s.read_to_end().unwrap();
        assert!(!s.is_alive(r));
        let mut it = s.descendants(r, NodeTest::AnyNode);
        assert!(matches!(it.next(), Some(Err(Error::IteratorMisuse { .. }))));
        assert!(it.next().is_none());
        let mut it = s.children(r, NodeTest::AnyNode);
        assert!(matches!(it.next(), Some(Err(Error::IteratorMisuse { .. }))));
    }

    #[test]
    fn test_axis_dispatch() {
        let s = stream(b"<r><a><a/></a></r>", false);
        s.read_to_end().unwrap();
        let r = s.with_buffer(|b| b.children(b.root()).unwrap()[0]);
        assert_eq!(s.axis(Axis::Child, r, NodeTest::Wildcard).count(), 1);
        assert_eq!(s.axis(Axis::Descendant, r, NodeTest::Wildcard).count(), 2);
    }
}
