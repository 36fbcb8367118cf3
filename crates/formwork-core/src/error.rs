use std::any::Any;
use std::fmt;

use formwork_wire::WireError;
use thiserror::Error;

use crate::FiberId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    State,
    Effect,
    Reducer,
    Ref,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookKind::State => "state",
            HookKind::Effect => "effect",
            HookKind::Reducer => "reducer",
            HookKind::Ref => "ref",
        };
        f.write_str(s)
    }
}

/// Programming errors in a component. Hooks raise these as panic payloads
/// (there is no sensible local recovery); [`crate::Registry::render`] catches
/// them and hands them back as [`RenderError::Hook`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("hook called outside of a rendering component")]
    OutsideComponent,

    #[error("{fiber}: hook #{index} is a {found} slot but a {expected} hook was called")]
    SlotKindMismatch {
        fiber: FiberId,
        index: usize,
        expected: HookKind,
        found: HookKind,
    },

    #[error("{fiber}: hook #{index} holds a different value type than `{expected}`")]
    SlotTypeMismatch {
        fiber: FiberId,
        index: usize,
        expected: &'static str,
    },

    #[error("{fiber}: rendered {found} hooks, previous render had {expected}")]
    HookCountChanged {
        fiber: FiberId,
        expected: usize,
        found: usize,
    },

    #[error("component `{component}` expected props of type `{expected}`")]
    PropsTypeMismatch {
        component: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no fiber registered for {0}")]
    UnknownFiber(FiberId),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("component panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Wire(#[from] WireError),
}

impl RenderError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<HookError>() {
            Ok(err) => RenderError::Hook(*err),
            Err(other) => RenderError::Panicked(panic_message(other.as_ref())),
        }
    }
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(e) = payload.downcast_ref::<HookError>() {
        e.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

/// Raises `err` as a panic payload.
pub(crate) fn raise(err: HookError) -> ! {
    std::panic::panic_any(err)
}
