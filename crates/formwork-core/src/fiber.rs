use std::any::Any;
use std::fmt;
use std::rc::Rc;

use slotmap::new_key_type;

use crate::effects::{Dispose, EffectFn};
use crate::error::HookKind;
use crate::suspense::SuspenseRecord;
use crate::view::Component;

new_key_type! {
    pub struct FiberKey;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of one component instance: the player it is shown to plus an
/// application-chosen key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId {
    pub player: PlayerId,
    pub key: String,
}

impl FiberId {
    pub fn new(player: impl Into<PlayerId>, key: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            key: key.into(),
        }
    }

    /// Identity of a nested component rendered under this one.
    pub fn child(&self, key: &str) -> Self {
        Self {
            player: self.player.clone(),
            key: format!("{}/{}", self.key, key),
        }
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.player, self.key)
    }
}

/// Lifecycle flags the render pipeline reads and flips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FiberFlags {
    /// Rendered and shown at least once.
    pub mounted: bool,
    /// A hook changed state since the last render.
    pub dirty: bool,
    /// A dialog for this fiber is open and awaiting a response.
    pub awaiting: bool,
    /// The open dialog is being closed on purpose to show a fresh one; the
    /// resulting cancellation is not terminal.
    pub reopening: bool,
}

pub(crate) struct EffectSlot {
    /// Dependencies of the last scheduled run; `None` means "every render".
    pub deps: Option<Box<dyn Any>>,
    pub create: Option<EffectFn>,
    pub cleanup: Option<Dispose>,
}

pub(crate) enum HookSlot {
    State(Rc<dyn Any>),
    Effect(EffectSlot),
    Reducer(Rc<dyn Any>),
    Ref(Rc<dyn Any>),
}

impl HookSlot {
    pub fn kind(&self) -> HookKind {
        match self {
            HookSlot::State(_) => HookKind::State,
            HookSlot::Effect(_) => HookKind::Effect,
            HookSlot::Reducer(_) => HookKind::Reducer,
            HookSlot::Ref(_) => HookKind::Ref,
        }
    }

    pub fn shared(&self) -> Option<Rc<dyn Any>> {
        match self {
            HookSlot::State(rc) | HookSlot::Reducer(rc) | HookSlot::Ref(rc) => Some(rc.clone()),
            HookSlot::Effect(_) => None,
        }
    }
}

pub(crate) type Hook = Rc<dyn Fn()>;

pub(crate) struct Fiber {
    pub id: FiberId,
    pub component: Component,
    pub props: Rc<dyn Any>,
    pub hooks: Vec<HookSlot>,
    pub cursor: usize,
    /// Hook count of the last completed render.
    pub rendered_hooks: Option<usize>,
    pub flags: FiberFlags,
    pub suspense: Option<SuspenseRecord>,
    pub on_child_ready: Option<Hook>,
    pub reschedule: Option<Hook>,
    pub on_resolve: Option<Hook>,
    pub parent: Option<FiberKey>,
    pub children: Vec<FiberKey>,
    /// Children rendered during the pass in progress.
    pub visited: Vec<FiberKey>,
    pub last_render_tick: u64,
}

impl Fiber {
    pub fn new(id: FiberId, component: Component, props: Rc<dyn Any>, tick: u64) -> Self {
        Self {
            id,
            component,
            props,
            hooks: Vec::new(),
            cursor: 0,
            rendered_hooks: None,
            flags: FiberFlags::default(),
            suspense: None,
            on_child_ready: None,
            reschedule: None,
            on_resolve: None,
            parent: None,
            children: Vec::new(),
            visited: Vec::new(),
            last_render_tick: tick,
        }
    }
}

/// Read-only view of a fiber for tooling.
#[derive(Clone, Debug, PartialEq)]
pub struct FiberSnapshot {
    pub id: FiberId,
    pub component: &'static str,
    pub hooks: Vec<HookKind>,
    pub flags: FiberFlags,
    pub pending_render: bool,
    pub suspended: Option<bool>,
    pub children: usize,
    pub last_render_tick: u64,
}
