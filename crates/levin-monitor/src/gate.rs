//! Deduplication of repeated signal values.

/// Passes a value only when it differs from the last one passed.
#[derive(Debug, Clone)]
pub struct ChangeGate<T> {
    last: Option<T>,
}

impl<T> Default for ChangeGate<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: Clone + PartialEq> ChangeGate<T> {
    /// Create an empty gate; the first offered value always passes.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Record `value`, returning `true` when it differs from the previous one.
    pub fn offer(&mut self, value: &T) -> bool {
        if self.last.as_ref() == Some(value) {
            return false;
        }
        self.last = Some(value.clone());
        true
    }

    /// Last value that passed.
    #[must_use]
    pub const fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Forget the last value so the next offer passes.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
