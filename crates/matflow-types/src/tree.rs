//! Namespaced input/output trees
//!
//! A [`NamespaceTree`] is an ordered mapping from key to either a leaf JSON
//! value or a nested tree. JSON objects are always lifted into nested trees
//! so that a tree has exactly one representation and survives a
//! serialization round trip unchanged.

use crate::error::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path separator for dotted lookups
pub const PATH_SEPARATOR: char = '.';

/// A node in a [`NamespaceTree`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Nested namespace
    Namespace(NamespaceTree),
    /// Leaf value (never a JSON object)
    Leaf(Value),
}

impl TreeNode {
    /// Borrow as a namespace
    #[inline]
    #[must_use]
    pub fn as_namespace(&self) -> Option<&NamespaceTree> {
        match self {
            Self::Namespace(tree) => Some(tree),
            Self::Leaf(_) => None,
        }
    }

    /// Borrow as a leaf value
    #[inline]
    #[must_use]
    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            Self::Leaf(value) => Some(value),
            Self::Namespace(_) => None,
        }
    }

    /// Leaf string value
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_leaf().and_then(Value::as_str)
    }

    /// Leaf float value
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.as_leaf().and_then(Value::as_f64)
    }

    /// Leaf unsigned integer value
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.as_leaf().and_then(Value::as_u64)
    }

    /// Leaf boolean value
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.as_leaf().and_then(Value::as_bool)
    }

    /// Convert back into plain JSON
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Namespace(tree) => tree.to_value(),
            Self::Leaf(value) => value.clone(),
        }
    }

    fn ensure_namespace(&mut self) -> &mut NamespaceTree {
        if !matches!(self, Self::Namespace(_)) {
            *self = Self::Namespace(NamespaceTree::new());
        }
        let Self::Namespace(tree) = self else {
            unreachable!("node was just replaced by a namespace")
        };
        tree
    }
}

impl From<Value> for TreeNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Namespace(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
            other => Self::Leaf(other),
        }
    }
}

impl From<NamespaceTree> for TreeNode {
    fn from(tree: NamespaceTree) -> Self {
        Self::Namespace(tree)
    }
}

/// Ordered, namespaced tree of inputs or outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceTree {
    entries: IndexMap<String, TreeNode>,
}

impl NamespaceTree {
    /// Create an empty tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a JSON object
    ///
    /// # Errors
    /// Returns [`ConfigError::MalformedInputs`] if `value` is not an object.
    pub fn from_value(namespace: &str, value: Value) -> Result<Self, ConfigError> {
        match TreeNode::from(value) {
            TreeNode::Namespace(tree) => Ok(tree),
            TreeNode::Leaf(other) => Err(ConfigError::malformed(
                namespace,
                format!("expected an object, found {other}"),
            )),
        }
    }

    /// Convert into a plain JSON object
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(key, node)| (key.clone(), node.to_value()))
                .collect(),
        )
    }

    /// Number of top-level entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-level keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate top-level entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Check for a top-level key
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Get a top-level entry
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TreeNode> {
        self.entries.get(key)
    }

    /// Insert a top-level entry, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<TreeNode>) -> Option<TreeNode> {
        self.entries.insert(key.into(), node.into())
    }

    /// Remove a top-level entry, keeping the order of the rest
    pub fn remove(&mut self, key: &str) -> Option<TreeNode> {
        self.entries.shift_remove(key)
    }

    /// Look up a dotted path such as `base.pw.code`
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&TreeNode> {
        let mut segments = path.split(PATH_SEPARATOR);
        let mut node = self.entries.get(segments.next()?)?;
        for segment in segments {
            node = node.as_namespace()?.entries.get(segment)?;
        }
        Some(node)
    }

    /// Whether a dotted path resolves
    #[inline]
    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.get_path(path).is_some()
    }

    /// Insert at a dotted path, creating intermediate namespaces
    ///
    /// A leaf sitting where a namespace is needed is replaced.
    pub fn insert_path(&mut self, path: &str, node: impl Into<TreeNode>) -> Option<TreeNode> {
        match path.rsplit_once(PATH_SEPARATOR) {
            None => self.insert(path, node),
            Some((parent, leaf)) => {
                let mut cursor = self;
                for segment in parent.split(PATH_SEPARATOR) {
                    cursor = cursor
                        .entries
                        .entry(segment.to_string())
                        .or_insert_with(|| TreeNode::Namespace(Self::new()))
                        .ensure_namespace();
                }
                cursor.insert(leaf, node)
            }
        }
    }

    /// Remove the entry at a dotted path
    pub fn remove_path(&mut self, path: &str) -> Option<TreeNode> {
        match path.rsplit_once(PATH_SEPARATOR) {
            None => self.remove(path),
            Some((parent, leaf)) => match self.get_path_mut(parent)? {
                TreeNode::Namespace(tree) => tree.remove(leaf),
                TreeNode::Leaf(_) => None,
            },
        }
    }

    fn get_path_mut(&mut self, path: &str) -> Option<&mut TreeNode> {
        let mut segments = path.split(PATH_SEPARATOR);
        let mut node = self.entries.get_mut(segments.next()?)?;
        for segment in segments {
            node = match node {
                TreeNode::Namespace(tree) => tree.entries.get_mut(segment)?,
                TreeNode::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    /// Deep-merge `overrides` into this tree
    ///
    /// Namespaces present on both sides are merged recursively; anything
    /// else in `overrides` replaces what is here.
    pub fn merge(&mut self, overrides: &NamespaceTree) {
        for (key, incoming) in &overrides.entries {
            if let (Some(TreeNode::Namespace(existing)), TreeNode::Namespace(nested)) =
                (self.entries.get_mut(key), incoming)
            {
                existing.merge(nested);
                continue;
            }
            self.entries.insert(key.clone(), incoming.clone());
        }
    }

    /// Deep-merge `overrides` into the namespace at a dotted path
    pub fn merge_at(&mut self, path: &str, overrides: &NamespaceTree) {
        if overrides.is_empty() {
            return;
        }
        match self.get_path_mut(path) {
            Some(node) => node.ensure_namespace().merge(overrides),
            None => {
                self.insert_path(path, overrides.clone());
            }
        }
    }

    /// Check that every key is non-empty and free of the path separator
    ///
    /// # Errors
    /// Returns [`ConfigError::MalformedInputs`] naming the first bad key.
    pub fn validate(&self, namespace: &str) -> Result<(), ConfigError> {
        for (key, node) in &self.entries {
            if key.is_empty() || key.contains(PATH_SEPARATOR) {
                return Err(ConfigError::malformed(
                    namespace,
                    format!("invalid key `{key}`"),
                ));
            }
            if let TreeNode::Namespace(nested) = node {
                nested.validate(&format!("{namespace}{PATH_SEPARATOR}{key}"))?;
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, TreeNode)> for NamespaceTree {
    fn from_iter<I: IntoIterator<Item = (String, TreeNode)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a NamespaceTree {
    type Item = (&'a String, &'a TreeNode);
    type IntoIter = indexmap::map::Iter<'a, String, TreeNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
