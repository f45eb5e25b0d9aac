use std::collections::{BTreeMap, BTreeSet};

use super::{interpolate, NodeKind, Properties};
use crate::errors::PropertyErrorKind;

/// Read access shared by single property maps and layered snapshots.
pub trait PropertyReader {
    /// Raw value of `key`, never interpolated.
    fn get(&self, key: &str) -> Option<&str>;

    fn has(&self, key: &str) -> bool;

    fn kind(&self, key: &str) -> Option<NodeKind>;

    /// Direct children of `key`, see [`Properties::sub_keys`].
    fn sub_keys(&self, key: &str) -> Vec<String>;

    /// Sorted leaf keys.
    fn keys(&self) -> Vec<String>;

    /// Raw value of `key`, or `default` when absent.
    #[inline]
    fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Replaces `${…}` segments of `input`, see [`interpolate::resolve`].
    ///
    /// # Errors
    /// Returns [`PropertyErrorKind::NotFound`] or [`PropertyErrorKind::Syntax`].
    #[inline]
    fn resolve(&self, input: &str) -> Result<String, PropertyErrorKind> {
        interpolate::resolve(self, input)
    }
}

impl PropertyReader for Properties {
    #[inline]
    fn get(&self, key: &str) -> Option<&str> {
        Properties::get(self, key)
    }

    #[inline]
    fn has(&self, key: &str) -> bool {
        Properties::has(self, key)
    }

    #[inline]
    fn kind(&self, key: &str) -> Option<NodeKind> {
        Properties::kind(self, key)
    }

    #[inline]
    fn sub_keys(&self, key: &str) -> Vec<String> {
        Properties::sub_keys(self, key)
    }

    #[inline]
    fn keys(&self) -> Vec<String> {
        Properties::keys(self).map(ToOwned::to_owned).collect()
    }
}

/// Where a layer comes from. Ordered by priority, the last variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    Builtin,
    DefaultFile,
    ProfileFile,
    Env,
    CommandLine,
    Api,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub props: Properties,
}

impl Layer {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, kind: LayerKind, props: Properties) -> Self {
        Self {
            name: name.into(),
            kind,
            props,
        }
    }
}

/// An ordered stack of layers. Lookups walk the layers from the highest priority to the lowest.
#[derive(Debug, Clone, Default)]
pub struct LayeredProperties {
    // High to low
    layers: Vec<Layer>,
}

impl LayeredProperties {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a layer by its kind. Among layers of the same kind the latest pushed wins.
    pub fn push(&mut self, layer: Layer) {
        let pos = self
            .layers
            .iter()
            .position(|existing| existing.kind <= layer.kind)
            .unwrap_or(self.layers.len());
        self.layers.insert(pos, layer);
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, layer: Layer) -> Self {
        self.push(layer);
        self
    }

    /// Removes every layer of `kind` and pushes `layer` in their place.
    pub fn replace_kind(&mut self, layer: Layer) {
        self.layers.retain(|existing| existing.kind != layer.kind);
        self.push(layer);
    }

    pub fn remove_kind(&mut self, kind: LayerKind) {
        self.layers.retain(|existing| existing.kind != kind);
    }

    /// Layers from the highest priority to the lowest.
    #[inline]
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Flat view of the visible key/value pairs.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        PropertyReader::keys(self)
            .into_iter()
            .filter_map(|key| {
                let val = self.get(&key)?.to_owned();
                Some((key, val))
            })
            .collect()
    }
}

impl PropertyReader for LayeredProperties {
    fn get(&self, key: &str) -> Option<&str> {
        self.layers.iter().find_map(|layer| layer.props.get(key))
    }

    fn has(&self, key: &str) -> bool {
        self.layers.iter().any(|layer| layer.props.has(key))
    }

    fn kind(&self, key: &str) -> Option<NodeKind> {
        self.layers.iter().find_map(|layer| layer.props.kind(key))
    }

    /// Union of children across layers, stopping at the first layer holding a scalar at `key`.
    fn sub_keys(&self, key: &str) -> Vec<String> {
        let mut names = BTreeSet::new();
        let mut indexes = BTreeSet::new();
        for layer in &self.layers {
            match layer.props.kind(key) {
                Some(NodeKind::Leaf) => break,
                Some(NodeKind::Array) => indexes.extend(layer.props.sub_keys(key).into_iter().filter_map(|idx| idx.parse::<usize>().ok())),
                Some(NodeKind::Map) => names.extend(layer.props.sub_keys(key)),
                None => {}
            }
        }
        indexes.into_iter().map(|idx| idx.to_string()).chain(names).collect()
    }

    fn keys(&self) -> Vec<String> {
        let keys = self
            .layers
            .iter()
            .flat_map(|layer| layer.props.keys())
            .collect::<BTreeSet<_>>();
        keys.into_iter().map(ToOwned::to_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Layer, LayerKind, LayeredProperties, PropertyReader};
    use crate::properties::Properties;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn layer(kind: LayerKind, pairs: &[(&str, &str)]) -> Layer {
        Layer::new(format!("{kind:?}"), kind, Properties::from_pairs(pairs.iter().copied()).unwrap())
    }

    #[test]
    #[traced_test]
    fn test_precedence() {
        let layered = LayeredProperties::new()
            .with(layer(LayerKind::DefaultFile, &[("a", "file"), ("b", "file"), ("c", "file")]))
            .with(layer(LayerKind::Api, &[("a", "api")]))
            .with(layer(LayerKind::Env, &[("a", "env"), ("b", "env")]))
            .with(layer(LayerKind::Builtin, &[("d", "builtin")]));

        assert_eq!(layered.get("a"), Some("api"));
        assert_eq!(layered.get("b"), Some("env"));
        assert_eq!(layered.get("c"), Some("file"));
        assert_eq!(layered.get("d"), Some("builtin"));
        assert_eq!(layered.get("e"), None);
        assert_eq!(layered.get_or("e", "def"), "def");
        assert_eq!(PropertyReader::keys(&layered), vec!["a", "b", "c", "d"]);
        assert_eq!(
            layered.layers().map(|layer| layer.kind).collect::<Vec<_>>(),
            vec![LayerKind::Api, LayerKind::Env, LayerKind::DefaultFile, LayerKind::Builtin]
        );
    }

    #[test]
    #[traced_test]
    fn test_sub_keys_masking() {
        let layered = LayeredProperties::new()
            .with(layer(LayerKind::DefaultFile, &[("m.x", "1"), ("m.y", "2"), ("s.k", "3")]))
            .with(layer(LayerKind::Env, &[("m.z", "4"), ("s", "scalar")]));

        assert_eq!(layered.sub_keys("m"), vec!["x", "y", "z"]);
        assert!(layered.sub_keys("s").is_empty());
        assert_eq!(layered.resolve("${m.z}-${s}").unwrap(), "4-scalar");
    }

    #[test]
    #[traced_test]
    fn test_replace_kind() {
        let mut layered = LayeredProperties::new()
            .with(layer(LayerKind::Env, &[("a", "1")]))
            .with(layer(LayerKind::Env, &[("a", "2")]));
        assert_eq!(layered.get("a"), Some("2"));

        layered.replace_kind(layer(LayerKind::Env, &[("a", "3")]));
        assert_eq!(layered.layers().count(), 1);
        assert_eq!(layered.get("a"), Some("3"));
    }
}
