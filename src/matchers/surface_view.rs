//! Background layer that SurfaceFlinger adds behind a SurfaceView.

use std::sync::LazyLock;

use regex::Regex;

use super::ComponentMatcher;
use crate::core::errors::{EntityKind, FlickerError, Result};
use crate::hierarchy::entities::{Activity, LayerRef, WindowRef};

const MATCHER_NAME: &str = "SurfaceViewBackgroundMatcher";
const BACKGROUND_PATTERN: &str = r"^Background for .+ SurfaceView.*";

static BACKGROUND_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(BACKGROUND_PATTERN).ok());

/// Layers only. Windows and activities never match.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceViewBackgroundMatcher;

impl SurfaceViewBackgroundMatcher {
    #[must_use]
    pub fn matches_name(name: &str) -> bool {
        BACKGROUND_RE.as_ref().is_some_and(|re| re.is_match(name))
    }
}

impl ComponentMatcher for SurfaceViewBackgroundMatcher {
    fn window_matches_any_of(&self, _windows: &[WindowRef<'_>]) -> Result<bool> {
        Ok(false)
    }

    fn activity_matches_any_of(&self, _activities: &[Activity]) -> Result<bool> {
        Ok(false)
    }

    fn layer_matches_any_of(&self, layers: &[LayerRef<'_>]) -> Result<bool> {
        Ok(layers.iter().any(|l| Self::matches_name(l.name())))
    }

    fn to_activity_identifier(&self) -> Result<String> {
        Err(FlickerError::unsupported(MATCHER_NAME, EntityKind::Activity))
    }

    fn to_window_identifier(&self) -> Result<String> {
        Err(FlickerError::unsupported(MATCHER_NAME, EntityKind::Window))
    }

    fn to_layer_identifier(&self) -> Result<String> {
        Ok("Background for SurfaceView".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::entities::{Layer, Window};
    use crate::hierarchy::tree::Hierarchy;

    #[test]
    fn matches_background_layer_names() {
        assert!(SurfaceViewBackgroundMatcher::matches_name(
            "Background for 4f2a SurfaceView[com.app/.Video]#1"
        ));
        assert!(!SurfaceViewBackgroundMatcher::matches_name(
            "SurfaceView[com.app/.Video]#1"
        ));
        assert!(!SurfaceViewBackgroundMatcher::matches_name(
            "Background for  SurfaceView"
        ));
    }

    #[test]
    fn layers_only() {
        let mut layers = Hierarchy::new();
        layers.add_root(Layer::new("Background for x SurfaceView - com.app#3"));
        let layer_refs: Vec<_> = layers.nodes().collect();
        let mut windows = Hierarchy::new();
        windows.add_root(Window::new("Background for x SurfaceView - com.app#3"));
        let window_refs: Vec<_> = windows.nodes().collect();

        let m = SurfaceViewBackgroundMatcher;
        assert!(m.layer_matches_any_of(&layer_refs).unwrap());
        assert!(!m.window_matches_any_of(&window_refs).unwrap());
        assert!(!m.activity_matches_any_of(&[Activity::new("x")]).unwrap());
        assert!(m.to_window_identifier().is_err());
        assert!(m.to_activity_identifier().is_err());
        assert!(m.to_layer_identifier().is_ok());
    }
}
