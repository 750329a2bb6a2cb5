//! Component matchers: decide whether a logical UI component is present among
//! the entities of one snapshot.
//!
//! Every matcher answers for the three entity kinds (windows, activities,
//! layers). Kinds a matcher has no representation for either return `false`
//! or an `UnsupportedMatcherOperation` error, depending on the variant.

#![allow(missing_docs)]

use std::fmt;

use crate::core::errors::Result;
use crate::hierarchy::entities::{Activity, LayerRef, WindowRef};

pub mod name;
pub mod or;
pub mod splash;
pub mod surface_view;

pub use name::ComponentNameMatcher;
pub use or::OrMatcher;
pub use splash::SplashScreenMatcher;
pub use surface_view::SurfaceViewBackgroundMatcher;

/// Condition applied by [`ComponentMatcher::check`] to the matched layers.
pub type LayersCondition<'c> = dyn Fn(&[LayerRef<'_>]) -> bool + 'c;

pub trait ComponentMatcher: fmt::Debug + Send + Sync {
    fn window_matches_any_of(&self, windows: &[WindowRef<'_>]) -> Result<bool>;

    fn activity_matches_any_of(&self, activities: &[Activity]) -> Result<bool>;

    fn layer_matches_any_of(&self, layers: &[LayerRef<'_>]) -> Result<bool>;

    /// Diagnostic name in activity context. Never used for matching.
    fn to_activity_identifier(&self) -> Result<String>;

    /// Diagnostic name in window context. Never used for matching.
    fn to_window_identifier(&self) -> Result<String>;

    /// Diagnostic name in layer context. Never used for matching.
    fn to_layer_identifier(&self) -> Result<String>;

    /// Apply `condition` to the layers this matcher selects.
    fn check(&self, layers: &[LayerRef<'_>], condition: &LayersCondition<'_>) -> Result<bool> {
        let matched = self.filter_layers(layers)?;
        Ok(condition(&matched))
    }

    fn filter_layers<'a>(&self, layers: &[LayerRef<'a>]) -> Result<Vec<LayerRef<'a>>> {
        let mut matched = Vec::new();
        for layer in layers {
            if self.layer_matches_any_of(std::slice::from_ref(layer))? {
                matched.push(*layer);
            }
        }
        Ok(matched)
    }

    fn filter_windows<'a>(&self, windows: &[WindowRef<'a>]) -> Result<Vec<WindowRef<'a>>> {
        let mut matched = Vec::new();
        for window in windows {
            if self.window_matches_any_of(std::slice::from_ref(window))? {
                matched.push(*window);
            }
        }
        Ok(matched)
    }

    /// Alternation: matches when `self` or `other` matches.
    fn or(self, other: impl ComponentMatcher + 'static) -> OrMatcher
    where
        Self: Sized + 'static,
    {
        OrMatcher::new(self, other)
    }
}

impl<M: ComponentMatcher + ?Sized> ComponentMatcher for Box<M> {
    fn window_matches_any_of(&self, windows: &[WindowRef<'_>]) -> Result<bool> {
        (**self).window_matches_any_of(windows)
    }

    fn activity_matches_any_of(&self, activities: &[Activity]) -> Result<bool> {
        (**self).activity_matches_any_of(activities)
    }

    fn layer_matches_any_of(&self, layers: &[LayerRef<'_>]) -> Result<bool> {
        (**self).layer_matches_any_of(layers)
    }

    fn to_activity_identifier(&self) -> Result<String> {
        (**self).to_activity_identifier()
    }

    fn to_window_identifier(&self) -> Result<String> {
        (**self).to_window_identifier()
    }

    fn to_layer_identifier(&self) -> Result<String> {
        (**self).to_layer_identifier()
    }

    fn check(&self, layers: &[LayerRef<'_>], condition: &LayersCondition<'_>) -> Result<bool> {
        (**self).check(layers, condition)
    }

    fn filter_layers<'a>(&self, layers: &[LayerRef<'a>]) -> Result<Vec<LayerRef<'a>>> {
        (**self).filter_layers(layers)
    }

    fn filter_windows<'a>(&self, windows: &[WindowRef<'a>]) -> Result<Vec<WindowRef<'a>>> {
        (**self).filter_windows(windows)
    }
}

/// `snapshot or splash(app) or app`: the alternation used while an app is
/// launching and the starting surface may be either a task snapshot or a
/// splash screen.
#[must_use]
pub fn launching_app(app: ComponentNameMatcher) -> OrMatcher {
    ComponentNameMatcher::snapshot()
        .or(SplashScreenMatcher::new(app.clone()))
        .or(app)
}
