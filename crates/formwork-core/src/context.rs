use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{HookError, raise};
use crate::registry::Registry;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// A typed channel for passing a value down the component tree without
/// threading it through props.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

impl<T: 'static> Context<T> {
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)),
            default: Rc::new(default),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Makes `value` visible to `use_context` calls made inside `f`. Nested
    /// provides shadow outer ones until `f` returns.
    pub fn provide<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        let registry = Registry::active_or_raise();
        registry.push_context(self.id, Rc::new(value));

        struct Pop(Registry, ContextId);
        impl Drop for Pop {
            fn drop(&mut self) {
                self.0.pop_context(self.1);
            }
        }
        let _pop = Pop(registry, self.id);
        f()
    }
}

/// Reads the innermost provided value, or the context's default.
pub fn use_context<T: Clone + 'static>(cx: &Context<T>) -> T {
    let registry = Registry::active_or_raise();
    if registry.current().is_none() {
        raise(HookError::OutsideComponent);
    }
    let provided = registry
        .read_context(cx.id)
        .and_then(|v| v.downcast::<T>().ok());
    match provided {
        Some(v) => T::clone(&v),
        None => T::clone(&cx.default),
    }
}
