//! Retry-until-satisfied polling used to synchronize with asynchronous state.
//!
//! [`WaitCondition`] fetches a value, tests it against one or more
//! [`Condition`]s, and retries up to `retry_limit` more times. It never sleeps on
//! its own: callers that need spaced attempts put the delay in the supplier or
//! in the `on_retry` hook (see [`WaitConditionBuilder::spaced`]).

#![allow(missing_docs)]

use std::fmt;
use std::time::Duration;

/// Attempts after the first one unless overridden.
pub const DEFAULT_RETRY_LIMIT: u32 = 5;

/// Spacing callers conventionally use between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

type Predicate<'a, T> = Box<dyn Fn(&T) -> bool + 'a>;

enum ConditionKind<'a, T> {
    Single(Predicate<'a, T>),
    All(Vec<Condition<'a, T>>),
}

/// A named predicate over a polled value. Composite conditions (`all`) are
/// spread into their parts when handed to a [`WaitCondition`], so failures are
/// reported against the most specific sub-condition.
pub struct Condition<'a, T> {
    message: String,
    kind: ConditionKind<'a, T>,
}

impl<'a, T> Condition<'a, T> {
    pub fn new(message: impl Into<String>, predicate: impl Fn(&T) -> bool + 'a) -> Self {
        Self {
            message: message.into(),
            kind: ConditionKind::Single(Box::new(predicate)),
        }
    }

    /// Satisfied when every part is satisfied.
    pub fn all(message: impl Into<String>, parts: Vec<Self>) -> Self {
        Self {
            message: message.into(),
            kind: ConditionKind::All(parts),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_satisfied(&self, value: &T) -> bool {
        match &self.kind {
            ConditionKind::Single(predicate) => predicate(value),
            ConditionKind::All(parts) => parts.iter().all(|part| part.is_satisfied(value)),
        }
    }

    fn flatten_into(self, out: &mut Vec<Self>) {
        match self.kind {
            ConditionKind::Single(_) => out.push(self),
            ConditionKind::All(parts) => {
                for part in parts {
                    part.flatten_into(out);
                }
            }
        }
    }
}

impl<T> fmt::Debug for Condition<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Callbacks fired while polling. Every hook defaults to a no-op.
pub struct WaitHooks<'a, T> {
    pub on_start: Box<dyn FnMut(&str) + 'a>,
    pub on_end: Box<dyn FnMut() + 'a>,
    pub on_retry: Box<dyn FnMut(&T) + 'a>,
    pub on_success: Box<dyn FnMut(&T) + 'a>,
    pub on_failure: Box<dyn FnMut(&T) + 'a>,
    pub on_log: Box<dyn FnMut(&str) + 'a>,
}

impl<T> Default for WaitHooks<'_, T> {
    fn default() -> Self {
        Self {
            on_start: Box::new(|_| {}),
            on_end: Box::new(|| {}),
            on_retry: Box::new(|_| {}),
            on_success: Box::new(|_| {}),
            on_failure: Box::new(|_| {}),
            on_log: Box::new(|_| {}),
        }
    }
}

/// Polls `supplier` until every condition holds or the retry limit runs out.
pub struct WaitCondition<'a, T> {
    supplier: Box<dyn FnMut() -> T + 'a>,
    conditions: Vec<Condition<'a, T>>,
    retry_limit: u32,
    retry_interval: Option<Duration>,
    hooks: WaitHooks<'a, T>,
}

impl<'a, T> WaitCondition<'a, T> {
    pub fn builder(supplier: impl FnMut() -> T + 'a) -> WaitConditionBuilder<'a, T> {
        WaitConditionBuilder {
            supplier: Box::new(supplier),
            conditions: Vec::new(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_interval: None,
            hooks: WaitHooks::default(),
        }
    }

    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Summary of all (flattened) condition messages.
    #[must_use]
    pub fn description(&self) -> String {
        self.conditions
            .iter()
            .map(Condition::message)
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Run attempts `0..=retry_limit`. Returns whether the conditions were met.
    pub fn wait_for(&mut self) -> bool {
        let description = self.description();
        (self.hooks.on_start)(&description);

        let mut attempt: u32 = 0;
        let mut last = (self.supplier)();
        let satisfied = loop {
            match self.first_unsatisfied(&last) {
                None => {
                    (self.hooks.on_log)(&format!("attempt {attempt}: {description} satisfied"));
                    (self.hooks.on_success)(&last);
                    break true;
                }
                Some(failing) => {
                    (self.hooks.on_log)(&format!("attempt {attempt}: {failing} not satisfied"));
                }
            }
            if attempt >= self.retry_limit {
                (self.hooks.on_failure)(&last);
                break false;
            }
            (self.hooks.on_retry)(&last);
            if let Some(interval) = self.retry_interval {
                std::thread::sleep(interval);
            }
            attempt += 1;
            last = (self.supplier)();
        };

        (self.hooks.on_end)();
        satisfied
    }

    fn first_unsatisfied(&self, value: &T) -> Option<String> {
        self.conditions
            .iter()
            .find(|condition| !condition.is_satisfied(value))
            .map(|condition| condition.message().to_string())
    }
}

/// Builder for [`WaitCondition`].
pub struct WaitConditionBuilder<'a, T> {
    supplier: Box<dyn FnMut() -> T + 'a>,
    conditions: Vec<Condition<'a, T>>,
    retry_limit: u32,
    retry_interval: Option<Duration>,
    hooks: WaitHooks<'a, T>,
}

impl<'a, T: 'a> WaitConditionBuilder<'a, T> {
    #[must_use]
    pub fn with_condition(mut self, condition: Condition<'a, T>) -> Self {
        condition.flatten_into(&mut self.conditions);
        self
    }

    #[must_use]
    pub fn with_predicate(
        self,
        message: impl Into<String>,
        predicate: impl Fn(&T) -> bool + 'a,
    ) -> Self {
        self.with_condition(Condition::new(message, predicate))
    }

    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    #[must_use]
    pub fn on_start(mut self, hook: impl FnMut(&str) + 'a) -> Self {
        self.hooks.on_start = Box::new(hook);
        self
    }

    #[must_use]
    pub fn on_end(mut self, hook: impl FnMut() + 'a) -> Self {
        self.hooks.on_end = Box::new(hook);
        self
    }

    #[must_use]
    pub fn on_retry(mut self, hook: impl FnMut(&T) + 'a) -> Self {
        self.hooks.on_retry = Box::new(hook);
        self
    }

    #[must_use]
    pub fn on_success(mut self, hook: impl FnMut(&T) + 'a) -> Self {
        self.hooks.on_success = Box::new(hook);
        self
    }

    #[must_use]
    pub fn on_failure(mut self, hook: impl FnMut(&T) + 'a) -> Self {
        self.hooks.on_failure = Box::new(hook);
        self
    }

    #[must_use]
    pub fn on_log(mut self, hook: impl FnMut(&str) + 'a) -> Self {
        self.hooks.on_log = Box::new(hook);
        self
    }

    /// Sleep `interval` after each `on_retry` call, whichever hook is set.
    #[must_use]
    pub fn spaced(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    /// Replace all hooks at once.
    #[must_use]
    pub fn with_hooks(mut self, hooks: WaitHooks<'a, T>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> WaitCondition<'a, T> {
        WaitCondition {
            supplier: self.supplier,
            conditions: self.conditions,
            retry_limit: self.retry_limit,
            retry_interval: self.retry_interval,
            hooks: self.hooks,
        }
    }
}
