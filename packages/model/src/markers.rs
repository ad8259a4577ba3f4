//! Named ranges attached to a document.

use crate::range::Range;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub name: String,
    pub range: Range,
    pub affects_data: bool,
}

impl Marker {
    /// Group is the part of the name before the first `:`.
    pub fn group(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkerCollection {
    markers: BTreeMap<String, Marker>,
}

impl MarkerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Marker> {
        self.markers.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.markers.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Markers whose name starts with `prefix`, e.g. `comment` or `comment:`.
    pub fn get_group<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Marker> + 'a {
        self.markers.values().filter(move |m| m.name.starts_with(prefix))
    }

    pub fn in_root<'a>(&'a self, root: &'a str) -> impl Iterator<Item = &'a Marker> + 'a {
        self.markers.values().filter(move |m| m.range.root() == root)
    }

    /// Adds or replaces a marker. Returns the previous one.
    pub fn set(&mut self, name: &str, range: Range, affects_data: bool) -> Option<Marker> {
        self.markers.insert(
            name.to_string(),
            Marker {
                name: name.to_string(),
                range,
                affects_data,
            },
        )
    }

    pub fn remove(&mut self, name: &str) -> Option<Marker> {
        self.markers.remove(name)
    }

    /// Replaces the range of an existing marker without other changes.
    pub(crate) fn update_range(&mut self, name: &str, range: Range) {
        if let Some(marker) = self.markers.get_mut(name) {
            marker.range = range;
        }
    }
}
