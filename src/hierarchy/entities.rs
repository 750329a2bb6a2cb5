//! Snapshot entities: layers, windows, activities.
//!
//! Serialized snapshots store each hierarchy as a flat list where every entry
//! names its parent by position. Parents must precede their children.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use super::tree::{Hierarchy, NodeId, NodeRef, Named};

pub type LayerRef<'a> = NodeRef<'a, Layer>;
pub type WindowRef<'a> = NodeRef<'a, Window>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    #[must_use]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub bounds: Rect,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            bounds: Rect::default(),
        }
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub const fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }
}

impl Named for Layer {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub name: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub bounds: Rect,
}

impl Window {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            bounds: Rect::default(),
        }
    }
}

impl Named for Window {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(default)]
    pub visible: bool,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
        }
    }
}

impl Named for Activity {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Flat serialized form of one hierarchy entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatNode<T> {
    #[serde(flatten)]
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
}

/// Rebuild an arena from flat entries. A parent index must point at an
/// earlier entry.
pub fn hierarchy_from_flat<T>(nodes: Vec<FlatNode<T>>) -> Result<Hierarchy<T>, String> {
    let mut tree = Hierarchy::new();
    let mut ids: Vec<NodeId> = Vec::with_capacity(nodes.len());
    for (position, node) in nodes.into_iter().enumerate() {
        let id = match node.parent {
            None => tree.add_root(node.value),
            Some(parent) => {
                let parent_id = ids.get(parent).copied().ok_or_else(|| {
                    format!("entry {position} references parent {parent} which does not precede it")
                })?;
                tree.add_child(parent_id, node.value)
                    .ok_or_else(|| format!("entry {position}: dangling parent {parent}"))?
            }
        };
        ids.push(id);
    }
    Ok(tree)
}

fn hierarchy_to_flat<T: Clone>(tree: &Hierarchy<T>) -> Vec<FlatNode<T>> {
    tree.nodes()
        .map(|node| FlatNode {
            value: node.value().clone(),
            parent: node.parent().map(|p| p.id().index()),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawLayersSnapshot {
    timestamp_ns: i64,
    layers: Vec<FlatNode<Layer>>,
}

/// SurfaceFlinger state at one timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RawLayersSnapshot", into = "RawLayersSnapshot")]
pub struct LayersSnapshot {
    pub timestamp_ns: i64,
    pub layers: Hierarchy<Layer>,
}

impl LayersSnapshot {
    #[must_use]
    pub fn new(timestamp_ns: i64, layers: Hierarchy<Layer>) -> Self {
        Self {
            timestamp_ns,
            layers,
        }
    }

    /// All layers, flattened.
    #[must_use]
    pub fn all_layers(&self) -> Vec<LayerRef<'_>> {
        self.layers.nodes().collect()
    }

    #[must_use]
    pub fn visible_layers(&self) -> Vec<LayerRef<'_>> {
        self.layers.nodes().filter(|l| l.value().visible).collect()
    }
}

impl TryFrom<RawLayersSnapshot> for LayersSnapshot {
    type Error = String;

    fn try_from(raw: RawLayersSnapshot) -> Result<Self, Self::Error> {
        Ok(Self {
            timestamp_ns: raw.timestamp_ns,
            layers: hierarchy_from_flat(raw.layers)?,
        })
    }
}

impl From<LayersSnapshot> for RawLayersSnapshot {
    fn from(snapshot: LayersSnapshot) -> Self {
        Self {
            timestamp_ns: snapshot.timestamp_ns,
            layers: hierarchy_to_flat(&snapshot.layers),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawWindowManagerSnapshot {
    timestamp_ns: i64,
    windows: Vec<FlatNode<Window>>,
    #[serde(default)]
    activities: Vec<Activity>,
}

/// WindowManager state at one timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(
    try_from = "RawWindowManagerSnapshot",
    into = "RawWindowManagerSnapshot"
)]
pub struct WindowManagerSnapshot {
    pub timestamp_ns: i64,
    pub windows: Hierarchy<Window>,
    pub activities: Vec<Activity>,
}

impl WindowManagerSnapshot {
    #[must_use]
    pub fn all_windows(&self) -> Vec<WindowRef<'_>> {
        self.windows.nodes().collect()
    }
}

impl TryFrom<RawWindowManagerSnapshot> for WindowManagerSnapshot {
    type Error = String;

    fn try_from(raw: RawWindowManagerSnapshot) -> Result<Self, Self::Error> {
        Ok(Self {
            timestamp_ns: raw.timestamp_ns,
            windows: hierarchy_from_flat(raw.windows)?,
            activities: raw.activities,
        })
    }
}

impl From<WindowManagerSnapshot> for RawWindowManagerSnapshot {
    fn from(snapshot: WindowManagerSnapshot) -> Self {
        Self {
            timestamp_ns: snapshot.timestamp_ns,
            windows: hierarchy_to_flat(&snapshot.windows),
            activities: snapshot.activities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_geometry() {
        let r = Rect::new(0, 0, 1080, 2400);
        assert_eq!(r.width(), 1080);
        assert!(!r.is_empty());
        assert!(Rect::default().is_empty());
    }

    #[test]
    fn layers_snapshot_from_json() {
        let json = r#"{
            "timestamp_ns": 10,
            "layers": [
                {"name": "Display 0", "visible": true},
                {"name": "Task=12", "parent": 0, "visible": true},
                {"name": "Splash Screen com.app", "parent": 1}
            ]
        }"#;
        let snapshot: LayersSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.timestamp_ns, 10);
        assert_eq!(snapshot.all_layers().len(), 3);
        assert_eq!(snapshot.visible_layers().len(), 2);
        let splash = snapshot.all_layers()[2];
        assert_eq!(splash.parent().unwrap().name(), "Task=12");
    }

    #[test]
    fn forward_parent_reference_is_rejected() {
        let json = r#"{"timestamp_ns": 0, "layers": [{"name": "a", "parent": 1}, {"name": "b"}]}"#;
        let err = serde_json::from_str::<LayersSnapshot>(json).unwrap_err();
        assert!(err.to_string().contains("does not precede"));
    }

    #[test]
    fn window_snapshot_serializes_flat() {
        let mut windows = Hierarchy::new();
        let root = windows.add_root(Window::new("root"));
        windows.add_child(root, Window::new("com.app/.Main")).unwrap();
        let snapshot = WindowManagerSnapshot {
            timestamp_ns: 5,
            windows,
            activities: vec![Activity::new("com.app/.Main")],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["windows"][1]["parent"], 0);
        assert!(json["windows"][0].get("parent").is_none());
        let back: WindowManagerSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.all_windows().len(), 2);
        assert_eq!(back.activities.len(), 1);
    }
}
