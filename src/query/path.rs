//! Location Path Parser
//!
//! Absolute location paths built from child and descendant steps:
//!
//! ```text
//! Path := ('/' | '//') Step (('/' | '//') Step)*
//! Step := (Axis '::')? (Name | '*' | 'text()' | 'node()')
//! Axis := 'child' | 'descendant'
//! ```
//!
//! `//` before a step makes it a descendant step; an explicit axis after a
//! single `/` selects the axis directly.

use crate::axis::{Axis, NodeTest};
use crate::error::{Error, Result};
use crate::roles::{RoleId, RoleKind, RoleRegistry};
use crate::tags::TagDictionary;
use std::fmt;
use std::rc::Rc;

/// Node test before names are resolved to tag ids
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepTest {
    Name(String),
    Wildcard,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub axis: Axis,
    pub test: StepTest,
}

/// A parsed location path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    steps: Vec<PathStep>,
}

impl PathQuery {
    pub fn parse(input: &str) -> Result<Self> {
        PathParser::new(input).parse()
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Resolve names against `tags` and mint the roles this path needs:
    /// one plain role per inner step and a cumulative role for the result.
    pub fn bind(&self, tags: &mut TagDictionary) -> BoundQuery {
        let mut registry = RoleRegistry::new();
        let last = self.steps.len() - 1;
        let mut step_roles = Vec::with_capacity(last);
        let mut steps = Vec::with_capacity(self.steps.len());

        for (i, step) in self.steps.iter().enumerate() {
            let test = match &step.test {
                StepTest::Name(name) => NodeTest::Tag(tags.intern(name.as_bytes())),
                StepTest::Wildcard => NodeTest::Wildcard,
                StepTest::Text => NodeTest::Text,
                StepTest::Node => NodeTest::AnyNode,
            };
            steps.push(BoundStep {
                axis: step.axis,
                test,
            });
            if i < last {
                step_roles.push(registry.register(RoleKind::NonCumulative, format!("step{i}")));
            }
        }
        let output = registry.register(RoleKind::Cumulative, "output");

        BoundQuery {
            steps: steps.into(),
            step_roles: step_roles.into(),
            output,
            registry: Rc::new(registry),
        }
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            f.write_str(match step.axis {
                Axis::Child => "/",
                Axis::Descendant => "//",
            })?;
            match &step.test {
                StepTest::Name(name) => f.write_str(name)?,
                StepTest::Wildcard => f.write_str("*")?,
                StepTest::Text => f.write_str("text()")?,
                StepTest::Node => f.write_str("node()")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundStep {
    pub axis: Axis,
    pub test: NodeTest,
}

/// A path resolved against one tag dictionary, with its roles minted
#[derive(Debug, Clone)]
pub struct BoundQuery {
    pub steps: Rc<[BoundStep]>,
    /// Role signed off after each inner step's match is finished
    pub step_roles: Rc<[RoleId]>,
    /// Cumulative role on every result node
    pub output: RoleId,
    pub registry: Rc<RoleRegistry>,
}

impl BoundQuery {
    /// Role attached to matches of step `index`
    pub fn role_for(&self, index: usize) -> RoleId {
        self.step_roles.get(index).copied().unwrap_or(self.output)
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.steps.len()
    }
}

struct PathParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        PathParser {
            input: input.trim(),
            pos: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn parse(mut self) -> Result<PathQuery> {
        if self.input.is_empty() {
            return Err(Error::query("empty path", 0));
        }
        let mut steps = Vec::new();
        while self.pos < self.input.len() {
            let axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else {
                return Err(Error::query("expected '/' or '//'", self.pos));
            };
            steps.push(self.parse_step(axis)?);
        }
        Ok(PathQuery { steps })
    }

    fn parse_step(&mut self, axis: Axis) -> Result<PathStep> {
        let axis = if self.eat("child::") {
            axis
        } else if self.eat("descendant::") {
            Axis::Descendant
        } else {
            axis
        };

        if self.eat("*") {
            return Ok(PathStep {
                axis,
                test: StepTest::Wildcard,
            });
        }

        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
            .unwrap_or(self.rest().len());
        if len == 0 {
            return Err(Error::query("expected a name test", start));
        }
        let name = &self.rest()[..len];
        if name.contains("::") {
            return Err(Error::query(format!("unsupported axis in '{name}'"), start));
        }
        if name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
            return Err(Error::query(format!("invalid name '{name}'"), start));
        }
        self.pos += len;

        let test = if self.eat("()") {
            match name {
                "text" => StepTest::Text,
                "node" => StepTest::Node,
                _ => return Err(Error::query(format!("unsupported node test '{name}()'"), start)),
            }
        } else {
            StepTest::Name(name.to_string())
        };
        Ok(PathStep { axis, test })
    }
}
