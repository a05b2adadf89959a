//! Same-thread re-entrancy detection for bean creation.

use std::cell::RefCell;

use crate::bean::BeanId;
use crate::error::{BeanError, BeanResult};

/// Maximum nesting of bean creations on one thread.
pub(crate) const MAX_DEPTH: usize = 512;

// Thread-local creation stack
thread_local! {
    static CREATION_TLS: RefCell<Vec<(BeanId, String)>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one frame of the thread-local creation stack.
///
/// Entering a bean that is already being created on this thread yields
/// [`BeanError::Circular`] with the full path instead of deadlocking on the
/// bean's context slot.
pub(crate) struct CreationGuard {
    id: BeanId,
}

impl CreationGuard {
    pub(crate) fn enter(id: BeanId, display: &str) -> BeanResult<Self> {
        CREATION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();

            if let Some(pos) = stack.iter().position(|(b, _)| *b == id) {
                let mut path: Vec<String> = stack[pos..].iter().map(|(_, d)| d.clone()).collect();
                path.push(display.to_string());
                return Err(BeanError::Circular(path));
            }

            if stack.len() >= MAX_DEPTH {
                return Err(BeanError::DepthExceeded(stack.len()));
            }

            stack.push((id, display.to_string()));
            Ok(CreationGuard { id })
        })
    }

    /// True if `id` is being created on the current thread.
    pub(crate) fn is_active(id: BeanId) -> bool {
        CREATION_TLS.with(|tls| tls.borrow().iter().any(|(b, _)| *b == id))
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        CREATION_TLS.with(|tls| {
            let mut stack = tls.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(b, _)| *b == self.id) {
                stack.truncate(pos);
            }
        });
    }
}
