//! Exact and regex component-name matching.

use regex::Regex;

use super::ComponentMatcher;
use crate::core::errors::{FlickerError, Result};
use crate::hierarchy::entities::{Activity, LayerRef, WindowRef};

/// Starting window drawn from a task snapshot instead of a splash screen.
const SNAPSHOT_STARTING_WINDOW: &str = "SnapshotStartingWindow";

#[derive(Debug, Clone)]
enum NamePattern {
    Exact(String),
    Contains(String),
    Regex { source: String, compiled: Regex },
}

/// Matches entities whose name equals a component name, or fully matches a
/// regex.
#[derive(Debug, Clone)]
pub struct ComponentNameMatcher {
    pattern: NamePattern,
}

impl ComponentNameMatcher {
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            pattern: NamePattern::Exact(name.into()),
        }
    }

    /// `package/class` component name.
    pub fn from_component(package: &str, class: &str) -> Self {
        Self::exact(format!("{package}/{class}"))
    }

    /// The whole name must match; the pattern is anchored on both ends.
    pub fn regex(pattern: &str) -> Result<Self> {
        let compiled =
            Regex::new(&format!("^(?:{pattern})$")).map_err(|e| FlickerError::InvalidPattern {
                pattern: pattern.to_string(),
                details: e.to_string(),
            })?;
        Ok(Self {
            pattern: NamePattern::Regex {
                source: pattern.to_string(),
                compiled,
            },
        })
    }

    /// Task-snapshot starting window.
    #[must_use]
    pub fn snapshot() -> Self {
        Self {
            pattern: NamePattern::Contains(SNAPSHOT_STARTING_WINDOW.to_string()),
        }
    }

    fn source(&self) -> &str {
        match &self.pattern {
            NamePattern::Exact(name) | NamePattern::Contains(name) => name,
            NamePattern::Regex { source, .. } => source,
        }
    }

    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        match &self.pattern {
            NamePattern::Exact(expected) => expected == name,
            NamePattern::Contains(marker) => name.contains(marker.as_str()),
            NamePattern::Regex { compiled, .. } => compiled.is_match(name),
        }
    }
}

impl ComponentMatcher for ComponentNameMatcher {
    fn window_matches_any_of(&self, windows: &[WindowRef<'_>]) -> Result<bool> {
        Ok(windows.iter().any(|w| self.matches_name(w.name())))
    }

    fn activity_matches_any_of(&self, activities: &[Activity]) -> Result<bool> {
        Ok(activities.iter().any(|a| self.matches_name(&a.name)))
    }

    fn layer_matches_any_of(&self, layers: &[LayerRef<'_>]) -> Result<bool> {
        Ok(layers.iter().any(|l| self.matches_name(l.name())))
    }

    fn to_activity_identifier(&self) -> Result<String> {
        Ok(format!("Activity[{}]", self.source()))
    }

    fn to_window_identifier(&self) -> Result<String> {
        Ok(format!("Window[{}]", self.source()))
    }

    fn to_layer_identifier(&self) -> Result<String> {
        Ok(format!("Layer[{}]", self.source()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::entities::{Layer, Window};
    use crate::hierarchy::tree::Hierarchy;

    fn layers(names: &[&str]) -> Hierarchy<Layer> {
        let mut tree = Hierarchy::new();
        for name in names {
            tree.add_root(Layer::new(*name));
        }
        tree
    }

    #[test]
    fn exact_requires_equal_name() {
        let tree = layers(&["com.app/.Main#12", "com.app/.Main"]);
        let refs: Vec<_> = tree.nodes().collect();
        let m = ComponentNameMatcher::from_component("com.app", ".Main");
        assert!(m.layer_matches_any_of(&refs).unwrap());
        assert!(!m.layer_matches_any_of(&refs[..1]).unwrap());
    }

    #[test]
    fn regex_is_anchored() {
        let m = ComponentNameMatcher::regex("com\\.app.*").unwrap();
        assert!(m.matches_name("com.app/.Main"));
        assert!(!m.matches_name("x com.app/.Main"));
    }

    #[test]
    fn bad_regex_is_rejected() {
        let err = ComponentNameMatcher::regex("(").unwrap_err();
        assert_eq!(err.code(), "FLK-3003");
    }

    #[test]
    fn windows_and_activities_match_by_name() {
        let mut windows = Hierarchy::new();
        windows.add_root(Window::new("com.app/.Main"));
        let refs: Vec<_> = windows.nodes().collect();
        let m = ComponentNameMatcher::exact("com.app/.Main");
        assert!(m.window_matches_any_of(&refs).unwrap());
        assert!(
            m.activity_matches_any_of(&[Activity::new("com.app/.Main")])
                .unwrap()
        );
        assert!(!m.activity_matches_any_of(&[]).unwrap());
    }

    #[test]
    fn identifiers_differ_per_entity_kind() {
        let m = ComponentNameMatcher::exact("com.app/.Main");
        let ids = [
            m.to_activity_identifier().unwrap(),
            m.to_window_identifier().unwrap(),
            m.to_layer_identifier().unwrap(),
        ];
        assert_eq!(ids[0], "Activity[com.app/.Main]");
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn snapshot_matcher_finds_starting_window() {
        let m = ComponentNameMatcher::snapshot();
        assert!(m.matches_name("SnapshotStartingWindow for taskId=7"));
        assert!(!m.matches_name("Splash Screen com.app"));
    }
}
