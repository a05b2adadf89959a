//! Internal disposal bag for managing destroy hooks.

use crate::error::BeanResult;

type DestroyHook = Box<dyn FnOnce() -> BeanResult<()> + Send>;

/// Container for destroy hooks with LIFO execution order.
///
/// Every hook gets a chance to run. Failures are logged and the first one is
/// returned once the bag is drained.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<(String, DestroyHook)>,
}

impl DisposeBag {
    pub(crate) fn push(&mut self, label: impl Into<String>, hook: DestroyHook) {
        self.hooks.push((label.into(), hook));
    }

    /// Execute all hooks in reverse order (LIFO).
    pub(crate) fn run_all_reverse(&mut self) -> BeanResult<()> {
        let mut first_error = None;
        while let Some((label, hook)) = self.hooks.pop() {
            if let Err(err) = hook() {
                tracing::warn!(target: "ferrous_beans::destroy", bean = %label, error = %err, "destroy failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
