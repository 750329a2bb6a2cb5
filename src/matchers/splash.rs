//! Splash-screen layer matcher.
//!
//! A splash screen only exists as a layer: a leaf whose name carries the
//! splash marker and which sits, at most a few levels down, under a layer
//! owned by the launching activity.

use super::{ComponentMatcher, LayersCondition};
use crate::core::errors::{EntityKind, FlickerError, Result};
use crate::hierarchy::entities::{Activity, LayerRef, WindowRef};

pub const SPLASH_SCREEN_MARKER: &str = "Splash Screen";

/// How far up the tree the owning activity may be.
pub const MAX_OWNER_DEPTH: usize = 5;

const MATCHER_NAME: &str = "SplashScreenMatcher";

#[derive(Debug)]
pub struct SplashScreenMatcher {
    owner: Box<dyn ComponentMatcher>,
}

impl SplashScreenMatcher {
    pub fn new(owner: impl ComponentMatcher + 'static) -> Self {
        Self {
            owner: Box::new(owner),
        }
    }

    fn is_splash(&self, layer: LayerRef<'_>) -> Result<bool> {
        if !layer.name().contains(SPLASH_SCREEN_MARKER) || !layer.is_leaf() {
            return Ok(false);
        }
        for ancestor in layer.ancestors().take(MAX_OWNER_DEPTH) {
            if self.owner.layer_matches_any_of(&[ancestor])? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl ComponentMatcher for SplashScreenMatcher {
    fn window_matches_any_of(&self, _windows: &[WindowRef<'_>]) -> Result<bool> {
        Err(FlickerError::unsupported(MATCHER_NAME, EntityKind::Window))
    }

    fn activity_matches_any_of(&self, _activities: &[Activity]) -> Result<bool> {
        Err(FlickerError::unsupported(MATCHER_NAME, EntityKind::Activity))
    }

    fn layer_matches_any_of(&self, layers: &[LayerRef<'_>]) -> Result<bool> {
        for layer in layers {
            if self.is_splash(*layer)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn to_activity_identifier(&self) -> Result<String> {
        Err(FlickerError::unsupported(MATCHER_NAME, EntityKind::Activity))
    }

    fn to_window_identifier(&self) -> Result<String> {
        Err(FlickerError::unsupported(MATCHER_NAME, EntityKind::Window))
    }

    fn to_layer_identifier(&self) -> Result<String> {
        Ok(format!(
            "{SPLASH_SCREEN_MARKER}({})",
            self.owner.to_layer_identifier()?
        ))
    }

    fn check(&self, layers: &[LayerRef<'_>], condition: &LayersCondition<'_>) -> Result<bool> {
        let matched = self.filter_layers(layers)?;
        if matched.len() > 1 {
            return Err(FlickerError::AmbiguousMatch {
                matcher: self.to_layer_identifier()?,
                count: matched.len(),
            });
        }
        Ok(condition(&matched))
    }
}
