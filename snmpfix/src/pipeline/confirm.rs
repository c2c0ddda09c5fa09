//! Operator confirmation gate.

use std::sync::Arc;

/// Blocking yes/no prompt consulted before irreversible steps.
pub trait Confirmation: Send + Sync {
    /// Ask `prompt`; `default` is the answer when the operator just hits enter.
    fn confirm(&self, prompt: &str, default: bool) -> bool;
}

/// Answers every prompt the same way without asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoConfirm(pub bool);

impl AutoConfirm {
    pub fn yes() -> Self {
        Self(true)
    }

    pub fn no() -> Self {
        Self(false)
    }
}

impl Confirmation for AutoConfirm {
    fn confirm(&self, _prompt: &str, _default: bool) -> bool {
        self.0
    }
}

impl<T: Confirmation + ?Sized> Confirmation for Arc<T> {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        (**self).confirm(prompt, default)
    }
}
