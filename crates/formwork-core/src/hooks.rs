//! Slot-based hooks.
//!
//! Each call claims the next slot of the fiber on top of the render stack,
//! so a component must call the same hooks in the same order every render.

use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::effects::IntoCleanup;
use crate::error::{HookError, HookKind, raise};
use crate::registry::{Owner, Registry};

/// Links a suspending state slot to the boundary that waits on it.
pub(crate) struct SuspendLink<T> {
    pub sentinel: T,
    pub fired: Cell<bool>,
    pub boundary: Owner,
}

pub(crate) struct StateCell<T> {
    value: RefCell<T>,
    owner: Owner,
    pub(crate) suspense: Option<SuspendLink<T>>,
}

impl<T: Clone + PartialEq> StateCell<T> {
    pub(crate) fn new(value: T, owner: Owner, suspense: Option<SuspendLink<T>>) -> Self {
        Self {
            value: RefCell::new(value),
            owner,
            suspense,
        }
    }

    pub(crate) fn get(&self) -> T {
        self.value.borrow().clone()
    }

    fn replace(&self, value: T) -> bool {
        let mut cur = self.value.borrow_mut();
        if *cur == value {
            return false;
        }
        *cur = value;
        true
    }
}

/// Write half of [`use_state`]. Identity is stable across renders.
pub struct Setter<T> {
    cell: Rc<StateCell<T>>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> PartialEq for Setter<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Setter<T> {
    pub(crate) fn from_cell(cell: Rc<StateCell<T>>) -> Self {
        Self { cell }
    }

    /// Stores `value`; requests a render only if it differs from the
    /// current value.
    pub fn set(&self, value: T) {
        let fire = self
            .cell
            .suspense
            .as_ref()
            .filter(|link| !link.fired.get() && value != link.sentinel);

        if self.cell.replace(value) {
            self.cell.owner.notify();
        }
        if let Some(link) = fire {
            link.fired.set(true);
            crate::suspense::child_ready(&link.boundary);
        }
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.cell.get());
        self.set(next);
    }

    /// Current value, as of the last `set`.
    pub fn get(&self) -> T {
        self.cell.get()
    }
}

pub(crate) fn slot<C: 'static>(
    registry: &Registry,
    kind: HookKind,
    init: impl FnOnce(Owner) -> Rc<dyn Any>,
) -> Rc<C> {
    let (rc, _, index) = registry
        .shared_slot(kind, init)
        .unwrap_or_else(|e| raise(e));
    match rc.downcast::<C>() {
        Ok(c) => c,
        Err(_) => raise(HookError::SlotTypeMismatch {
            fiber: registry
                .current()
                .unwrap_or_else(|| raise(HookError::OutsideComponent)),
            index,
            expected: type_name::<C>(),
        }),
    }
}

/// Persistent state for the current component.
///
/// `init` runs on the first render only. Setting an equal value is a no-op.
pub fn use_state<T>(init: impl FnOnce() -> T) -> (T, Setter<T>)
where
    T: Clone + PartialEq + 'static,
{
    let registry = Registry::active_or_raise();
    let cell: Rc<StateCell<T>> = slot(&registry, HookKind::State, |owner| {
        Rc::new(StateCell::new(init(), owner, None))
    });
    (cell.get(), Setter { cell })
}

/// Runs `create` after every render of the component.
pub fn use_effect<R: IntoCleanup>(create: impl FnOnce() -> R + 'static) {
    let registry = Registry::active_or_raise();
    registry
        .effect_slot(None, never_same, Box::new(move || create().into_cleanup()))
        .unwrap_or_else(|e| raise(e));
}

/// Runs `create` on the first render and whenever `deps` changes. Pass `()`
/// to run once per mount.
pub fn use_effect_with<D, R>(deps: D, create: impl FnOnce() -> R + 'static)
where
    D: PartialEq + 'static,
    R: IntoCleanup,
{
    let registry = Registry::active_or_raise();
    registry
        .effect_slot(
            Some(Box::new(deps)),
            same_deps::<D>,
            Box::new(move || create().into_cleanup()),
        )
        .unwrap_or_else(|e| raise(e));
}

fn never_same(_: &dyn Any, _: &dyn Any) -> bool {
    false
}

fn same_deps<D: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<D>(), b.downcast_ref::<D>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

trait ReducerTarget<A> {
    fn dispatch(&self, action: A);
}

struct ReducerCell<S, A> {
    state: RefCell<S>,
    reducer: RefCell<Rc<dyn Fn(&S, A) -> S>>,
    owner: Owner,
}

impl<S: Clone + PartialEq, A> ReducerTarget<A> for ReducerCell<S, A> {
    fn dispatch(&self, action: A) {
        let reducer = self.reducer.borrow().clone();
        let current = self.state.borrow().clone();
        let next = reducer(&current, action);
        if next == current {
            return;
        }
        *self.state.borrow_mut() = next;
        self.owner.notify();
    }
}

/// Sends actions to the reducer of [`use_reducer`].
pub struct Dispatch<A> {
    target: Rc<dyn ReducerTarget<A>>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.target), Rc::as_ptr(&other.target))
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("action", &type_name::<A>())
            .finish()
    }
}

impl<A> Dispatch<A> {
    pub fn dispatch(&self, action: A) {
        self.target.dispatch(action);
    }
}

/// Reducer-driven state. The reducer from the most recent render is the one
/// applied to later dispatches; `init` runs once.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S + 'static,
    init: impl FnOnce() -> S,
) -> (S, Dispatch<A>)
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    let registry = Registry::active_or_raise();
    let reducer: Rc<dyn Fn(&S, A) -> S> = Rc::new(reducer);
    let fresh = reducer.clone();
    let cell: Rc<ReducerCell<S, A>> = slot(&registry, HookKind::Reducer, move |owner| {
        Rc::new(ReducerCell {
            state: RefCell::new(init()),
            reducer: RefCell::new(fresh),
            owner,
        })
    });
    *cell.reducer.borrow_mut() = reducer;
    let state = cell.state.borrow().clone();
    (state, Dispatch { target: cell })
}

/// A mutable box that survives renders. Writing to it never re-renders.
pub fn use_ref<T: 'static>(init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
    let registry = Registry::active_or_raise();
    slot(&registry, HookKind::Ref, |_| Rc::new(RefCell::new(init())))
}
