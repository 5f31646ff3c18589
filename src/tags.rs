//! Tag Dictionary
//!
//! Interns element names to dense integer ids. Built once while a query is
//! bound and then extended by the driver as unseen names arrive; the buffer,
//! the oracle and the iterators only ever compare ids.

use std::collections::HashMap;

/// Dense identifier of an interned element name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub u32);

impl TagId {
    /// Reserved id of the document root
    pub const ROOT: TagId = TagId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Name used when dumping the document root
pub const ROOT_NAME: &str = "#document";

/// Interning table for element names
#[derive(Debug)]
pub struct TagDictionary {
    /// Names indexed by tag id
    names: Vec<Box<str>>,
    /// Raw name bytes -> id
    index: HashMap<Box<[u8]>, TagId>,
}

impl TagDictionary {
    /// Create a dictionary holding only the root id
    pub fn new() -> Self {
        TagDictionary {
            names: vec![ROOT_NAME.into()],
            index: HashMap::with_capacity(64),
        }
    }

    /// Intern a name, returning the existing id when already known
    pub fn intern(&mut self, name: &[u8]) -> TagId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = TagId(self.names.len() as u32);
        self.names
            .push(String::from_utf8_lossy(name).into_owned().into_boxed_str());
        self.index.insert(name.into(), id);
        id
    }

    /// Look up a name without interning it
    pub fn get(&self, name: &[u8]) -> Option<TagId> {
        self.index.get(name).copied()
    }

    /// Resolve an id back to its name
    pub fn name(&self, id: TagId) -> Option<&str> {
        self.names.get(id.index()).map(|n| n.as_ref())
    }

    /// Number of ids handed out, root included
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }
}

impl Default for TagDictionary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_duplicate() {
        let mut tags = TagDictionary::new();
        let a = tags.intern(b"book");
        let b = tags.intern(b"book");
        assert_eq!(a, b);
        assert_ne!(a, TagId::ROOT);
    }

    #[test]
    fn test_intern_different() {
        let mut tags = TagDictionary::new();
        let a = tags.intern(b"title");
        let b = tags.intern(b"author");
        assert_ne!(a, b);
        assert_eq!(tags.name(a), Some("title"));
        assert_eq!(tags.name(b), Some("author"));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn test_root_reserved() {
        let tags = TagDictionary::new();
        assert!(tags.is_empty());
        assert_eq!(tags.name(TagId::ROOT), Some(ROOT_NAME));
        assert_eq!(tags.get(b"missing"), None);
    }
}
