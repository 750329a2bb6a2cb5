//! Boolean alternation of two matchers.

use super::{ComponentMatcher, LayersCondition};
use crate::core::errors::Result;
use crate::hierarchy::entities::{Activity, LayerRef, WindowRef};

/// Matches when either side matches. The left side is evaluated first and a
/// match there short-circuits the right side; errors from either side are
/// returned as-is.
#[derive(Debug)]
pub struct OrMatcher {
    left: Box<dyn ComponentMatcher>,
    right: Box<dyn ComponentMatcher>,
}

impl OrMatcher {
    pub fn new(left: impl ComponentMatcher + 'static, right: impl ComponentMatcher + 'static) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn either(
        &self,
        mut query: impl FnMut(&dyn ComponentMatcher) -> Result<bool>,
    ) -> Result<bool> {
        if query(self.left.as_ref())? {
            return Ok(true);
        }
        query(self.right.as_ref())
    }

    fn join(
        &self,
        identifier: impl Fn(&dyn ComponentMatcher) -> Result<String>,
    ) -> Result<String> {
        Ok(format!(
            "{} or {}",
            identifier(self.left.as_ref())?,
            identifier(self.right.as_ref())?
        ))
    }
}

impl ComponentMatcher for OrMatcher {
    fn window_matches_any_of(&self, windows: &[WindowRef<'_>]) -> Result<bool> {
        self.either(|m| m.window_matches_any_of(windows))
    }

    fn activity_matches_any_of(&self, activities: &[Activity]) -> Result<bool> {
        self.either(|m| m.activity_matches_any_of(activities))
    }

    fn layer_matches_any_of(&self, layers: &[LayerRef<'_>]) -> Result<bool> {
        self.either(|m| m.layer_matches_any_of(layers))
    }

    fn to_activity_identifier(&self) -> Result<String> {
        self.join(|m| m.to_activity_identifier())
    }

    fn to_window_identifier(&self) -> Result<String> {
        self.join(|m| m.to_window_identifier())
    }

    fn to_layer_identifier(&self) -> Result<String> {
        self.join(|m| m.to_layer_identifier())
    }

    fn check(&self, layers: &[LayerRef<'_>], condition: &LayersCondition<'_>) -> Result<bool> {
        self.either(|m| m.check(layers, condition))
    }
}
