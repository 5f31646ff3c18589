//! Read-only projections of the buffer: debug dumps and XML serialization
//!
//! All walks are iterative (explicit stack) so deep documents cannot blow
//! the call stack.

use super::{Buffer, BufferNode, NodeRef, Payload, ROOT};
use crate::error::Result;
use crate::roles::{RoleId, RoleRegistry};
use crate::source::entities::encode_text;
use crate::tags::TagDictionary;
use std::fmt::Write;

enum Walk {
    Enter(u32, usize),
    Exit(u32),
}

impl Buffer {
    /// Live children of a slot, in document order
    fn child_indices(&self, index: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut child = self.get(index).and_then(|n| n.first_child);
        while let Some(c) = child {
            out.push(c);
            child = self.get(c).and_then(|n| n.next_sibling);
        }
        out
    }

    /// Push children so that the first one is popped first
    fn push_children(&self, stack: &mut Vec<Walk>, index: u32, depth: usize) {
        for c in self.child_indices(index).into_iter().rev() {
            stack.push(Walk::Enter(c, depth));
        }
    }

    /// Bracketed document-order rendering of everything currently buffered.
    /// Open elements have no closing bracket; text is quoted.
    pub fn dump(&self, tags: &TagDictionary) -> String {
        let mut out = String::new();
        let mut stack = Vec::new();
        self.push_children(&mut stack, ROOT, 0);

        while let Some(step) = stack.pop() {
            match step {
                Walk::Exit(index) => {
                    let name = self.name_of(index, tags);
                    let _ = write!(out, "</{name}>");
                }
                Walk::Enter(index, depth) => {
                    let Some(node) = self.get(index) else { continue };
                    match &node.payload {
                        Payload::Text(text) => {
                            let _ = write!(out, "{text:?}");
                        }
                        Payload::Tag { closed, .. } => {
                            let _ = write!(out, "<{}>", self.name_of(index, tags));
                            if *closed {
                                stack.push(Walk::Exit(index));
                            }
                            self.push_children(&mut stack, index, depth + 1);
                        }
                    }
                }
            }
        }
        out
    }

    /// One line per live node with its role multiset and lock count.
    /// Cumulative roles carry a `*` suffix.
    pub fn dump_roles(&self, tags: &TagDictionary, registry: &RoleRegistry) -> String {
        let mut out = String::new();
        let mut stack = vec![Walk::Enter(ROOT, 0)];

        while let Some(step) = stack.pop() {
            let Walk::Enter(index, depth) = step else { continue };
            let Some(node) = self.get(index) else { continue };

            let _ = write!(out, "{:indent$}", "", indent = depth * 2);
            match &node.payload {
                Payload::Text(text) => {
                    let _ = write!(out, "{text:?}");
                }
                Payload::Tag { closed, .. } => {
                    out.push_str(&self.name_of(index, tags));
                    if !closed {
                        out.push_str(" (open)");
                    }
                }
            }
            let roles = role_labels(node, registry);
            if !roles.is_empty() {
                let _ = write!(out, " [{}]", roles.join(", "));
            }
            if node.locks > 0 {
                let _ = write!(out, " locks={}", node.locks);
            }
            out.push('\n');

            self.push_children(&mut stack, index, depth + 1);
        }
        out
    }

    /// Render a subtree as XML. Text is escaped; empty elements are
    /// self-closing; the root renders as its children.
    pub fn serialize(&self, node: NodeRef, tags: &TagDictionary) -> Result<String> {
        let start = self.check(node)?;
        let mut out = String::new();
        let mut stack = Vec::with_capacity(32);
        if start == ROOT {
            self.push_children(&mut stack, ROOT, 0);
        } else {
            stack.push(Walk::Enter(start, 0));
        }

        while let Some(step) = stack.pop() {
            match step {
                Walk::Exit(index) => {
                    out.push_str("</");
                    out.push_str(&self.name_of(index, tags));
                    out.push('>');
                }
                Walk::Enter(index, depth) => {
                    let Some(node) = self.get(index) else { continue };
                    match &node.payload {
                        Payload::Text(text) => out.push_str(&encode_text(text)),
                        Payload::Tag { .. } => {
                            let name = self.name_of(index, tags);
                            out.push('<');
                            out.push_str(&name);
                            if node.first_child.is_none() {
                                out.push_str("/>");
                            } else {
                                out.push('>');
                                stack.push(Walk::Exit(index));
                                self.push_children(&mut stack, index, depth + 1);
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Concatenated character content of a node and its buffered descendants
    pub fn text_content(&self, node: NodeRef) -> Result<String> {
        let start = self.check(node)?;
        let mut out = String::new();
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            let Some(node) = self.get(index) else { continue };
            match &node.payload {
                Payload::Text(text) => out.push_str(text),
                Payload::Tag { .. } => stack.extend(self.child_indices(index).into_iter().rev()),
            }
        }
        Ok(out)
    }

    fn name_of(&self, index: u32, tags: &TagDictionary) -> String {
        let tag = self.get(index).and_then(|n| n.tag_id());
        tag.and_then(|t| tags.name(t)).unwrap_or("?").to_string()
    }
}

fn role_labels(node: &BufferNode, registry: &RoleRegistry) -> Vec<String> {
    let label = |r: &RoleId| {
        registry
            .label(*r)
            .map_or_else(|| format!("#{}", r.0), str::to_string)
    };
    let mut labels: Vec<String> = node
        .roles
        .cumulative()
        .iter()
        .map(|r| format!("{}*", label(r)))
        .collect();
    labels.extend(node.roles.non_cumulative().iter().map(label));
    labels
}
