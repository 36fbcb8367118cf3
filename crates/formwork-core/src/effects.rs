use std::cell::RefCell;
use std::rc::Rc;

/// Cleanup returned from an effect.
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn has_run(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl std::fmt::Debug for Dispose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Dispose").field(&!self.has_run()).finish()
    }
}

/// Helper to register cleanup inside an effect.
pub fn on_unmount(f: impl FnOnce() + 'static) -> Dispose {
    Dispose::new(f)
}

/// What an effect body may return: nothing, a cleanup, or maybe a cleanup.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Dispose>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Dispose> {
        None
    }
}

impl IntoCleanup for Dispose {
    fn into_cleanup(self) -> Option<Dispose> {
        Some(self)
    }
}

impl IntoCleanup for Option<Dispose> {
    fn into_cleanup(self) -> Option<Dispose> {
        self
    }
}

pub(crate) type EffectFn = Box<dyn FnOnce() -> Option<Dispose>>;
