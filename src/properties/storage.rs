use std::collections::BTreeMap;
use tracing::debug;

use super::{
    path::{child_key, join_path, split_path, PathSegment},
    value::PropValue,
};
use crate::errors::PropertyErrorKind;

/// Shape of a key in the tree index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Map,
    Array,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf,
    Map(BTreeMap<String, Node>),
    Array(BTreeMap<usize, Node>),
}

impl Node {
    fn interior_for(segment: &PathSegment) -> Self {
        match segment {
            PathSegment::Key(_) => Self::Map(BTreeMap::new()),
            PathSegment::Index(_) => Self::Array(BTreeMap::new()),
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            Self::Leaf => NodeKind::Leaf,
            Self::Map(_) => NodeKind::Map,
            Self::Array(_) => NodeKind::Array,
        }
    }

    fn is_empty_interior(&self) -> bool {
        match self {
            Self::Leaf => false,
            Self::Map(children) => children.is_empty(),
            Self::Array(children) => children.is_empty(),
        }
    }

    fn child(&self, segment: &PathSegment) -> Option<&Node> {
        match (self, segment) {
            (Self::Map(children), PathSegment::Key(name)) => children.get(name),
            (Self::Array(children), PathSegment::Index(index)) => children.get(index),
            _ => None,
        }
    }

    /// Returns the child for `segment`, creating it as `make()` when absent.
    /// `None` if this node's kind can't hold such a segment.
    fn child_or_insert(&mut self, segment: &PathSegment, make: impl FnOnce() -> Node) -> Option<&mut Node> {
        if self.is_empty_interior() && self.kind() != Node::interior_for(segment).kind() {
            *self = Node::interior_for(segment);
        }
        match (self, segment) {
            (Self::Map(children), PathSegment::Key(name)) => Some(children.entry(name.clone()).or_insert_with(make)),
            (Self::Array(children), PathSegment::Index(index)) => Some(children.entry(*index).or_insert_with(make)),
            _ => None,
        }
    }
}

/// A flat key/value map with a tree index recording which keys are leaves and which are interior nodes.
///
/// A key holds either a scalar or sub-keys, never both.
/// Empty containers are stored as an empty string at the key plus an empty interior node.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    values: BTreeMap<String, String>,
    root: Node,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            root: Node::Map(BTreeMap::new()),
        }
    }
}

impl Properties {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds properties from flat `key = value` pairs.
    ///
    /// # Errors
    /// Fails on the first invalid or conflicting key.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, PropertyErrorKind>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<PropValue>,
    {
        let mut props = Self::new();
        for (key, val) in pairs {
            props.set(key.as_ref(), val)?;
        }
        Ok(props)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw value of `key` without any interpolation.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns `true` if `key` is a leaf, an empty container or an interior node.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.kind(key).is_some()
    }

    #[must_use]
    pub fn kind(&self, key: &str) -> Option<NodeKind> {
        self.node(key).map(Node::kind)
    }

    /// Sorted leaf keys, empty containers included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(key, val)| (key.as_str(), val.as_str()))
    }

    /// Names of the direct children of `key`: map entries by name, array entries by index.
    /// An empty `key` lists the top-level names.
    #[must_use]
    pub fn sub_keys(&self, key: &str) -> Vec<String> {
        match self.node(key) {
            Some(Node::Map(children)) => children.keys().cloned().collect(),
            Some(Node::Array(children)) => children.keys().map(ToString::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Writes `val` under `key`, flattening structured values.
    ///
    /// # Errors
    /// - Returns [`PropertyErrorKind::InvalidKey`] if the key can't be parsed
    /// - Returns [`PropertyErrorKind::Conflict`] if a leaf and an interior node would share a key
    pub fn set(&mut self, key: &str, val: impl Into<PropValue>) -> Result<(), PropertyErrorKind> {
        let val = val.into();
        if key.is_empty() {
            return match val {
                PropValue::Map(entries) => {
                    for (name, val) in entries {
                        self.set(&name, val)?;
                    }
                    Ok(())
                }
                _ => Err(PropertyErrorKind::InvalidKey {
                    key: String::new(),
                    reason: "only a map can be written at the root",
                }),
            };
        }

        match val {
            PropValue::Scalar(val) => self.insert_leaf(key, val),
            PropValue::List(items) if items.is_empty() => self.insert_empty(key, NodeKind::Array),
            PropValue::List(items) if items.iter().all(PropValue::is_scalar) => {
                let joined = items
                    .into_iter()
                    .filter_map(|item| match item {
                        PropValue::Scalar(val) => Some(val),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                self.insert_leaf(key, joined)
            }
            PropValue::List(items) => {
                for (index, item) in items.into_iter().enumerate() {
                    self.set(&format!("{key}[{index}]"), item)?;
                }
                Ok(())
            }
            PropValue::Map(entries) if entries.is_empty() => self.insert_empty(key, NodeKind::Map),
            PropValue::Map(entries) => {
                for (name, val) in entries {
                    self.set(&child_key(key, &name), val)?;
                }
                Ok(())
            }
        }
    }

    /// Copies every entry of `other` over this one.
    ///
    /// # Errors
    /// Fails on the first conflicting key.
    pub fn merge(&mut self, other: &Properties) -> Result<(), PropertyErrorKind> {
        for (key, val) in &other.values {
            match other.kind(key) {
                Some(kind @ (NodeKind::Map | NodeKind::Array)) => self.insert_empty(key, kind)?,
                _ => self.insert_leaf(key, val.clone())?,
            }
        }
        Ok(())
    }

    fn node(&self, key: &str) -> Option<&Node> {
        if key.is_empty() {
            return Some(&self.root);
        }
        let segments = split_path(key).ok()?;
        let mut node = &self.root;
        for segment in &segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    fn insert_leaf(&mut self, key: &str, val: String) -> Result<(), PropertyErrorKind> {
        let segments = split_path(key)?;
        let node = self.walk_to_parent(key, &segments)?;
        let Some(last) = segments.last() else {
            return Err(PropertyErrorKind::InvalidKey {
                key: key.to_owned(),
                reason: "empty key",
            });
        };
        let Some(slot) = node.child_or_insert(last, || Node::Leaf) else {
            return Err(conflict(key, "index and name segments mixed under one key"));
        };
        match slot {
            Node::Leaf => {}
            interior if interior.is_empty_interior() => *interior = Node::Leaf,
            _ => return Err(conflict(key, "a scalar can't replace a key with sub-keys")),
        }
        self.clear_empty_parents(&segments);
        self.values.insert(join_path(&segments), val);
        Ok(())
    }

    fn insert_empty(&mut self, key: &str, kind: NodeKind) -> Result<(), PropertyErrorKind> {
        let segments = split_path(key)?;
        let node = self.walk_to_parent(key, &segments)?;
        let Some(last) = segments.last() else {
            return Err(PropertyErrorKind::InvalidKey {
                key: key.to_owned(),
                reason: "empty key",
            });
        };
        let make = || match kind {
            NodeKind::Array => Node::Array(BTreeMap::new()),
            _ => Node::Map(BTreeMap::new()),
        };
        let Some(slot) = node.child_or_insert(last, make) else {
            return Err(conflict(key, "index and name segments mixed under one key"));
        };
        match slot {
            Node::Leaf => return Err(conflict(key, "an empty container can't replace a scalar")),
            // An existing interior node already marks the key as present.
            interior if !interior.is_empty_interior() => return Ok(()),
            _ => {}
        }
        self.clear_empty_parents(&segments);
        debug!(key, "Empty container registered");
        self.values.insert(join_path(&segments), String::new());
        Ok(())
    }

    /// Walks to the parent of the last segment, creating interior nodes on the way.
    fn walk_to_parent(&mut self, key: &str, segments: &[PathSegment]) -> Result<&mut Node, PropertyErrorKind> {
        let mut node = &mut self.root;
        for (pos, segment) in segments.iter().enumerate().take(segments.len().saturating_sub(1)) {
            let next = &segments[pos + 1];
            let Some(child) = node.child_or_insert(segment, || Node::interior_for(next)) else {
                return Err(conflict(key, "index and name segments mixed under one key"));
            };
            if matches!(child, Node::Leaf) {
                return Err(conflict(key, "a sub-key can't be written under a scalar"));
            }
            node = child;
        }
        Ok(node)
    }

    fn clear_empty_parents(&mut self, segments: &[PathSegment]) {
        for end in 1..segments.len() {
            self.values.remove(&join_path(&segments[..end]));
        }
    }
}

fn conflict(key: &str, reason: &'static str) -> PropertyErrorKind {
    PropertyErrorKind::Conflict {
        key: key.to_owned(),
        reason,
    }
}
