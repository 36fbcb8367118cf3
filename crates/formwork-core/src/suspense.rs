//! Suspense boundaries.
//!
//! A boundary shows a fallback until every suspending state hook beneath it
//! has moved off its sentinel value. The first such move on each slot tells
//! the boundary, which then asks the pipeline to replace the open dialog.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{HookKind, raise};
use crate::fiber::FiberKey;
use crate::hooks::{Setter, StateCell, SuspendLink, slot};
use crate::registry::{Owner, Registry};
use crate::view::View;

/// Boundary bookkeeping kept beside the hook slots of the fiber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SuspenseRecord {
    pub is_suspended: bool,
    pub has_checked: bool,
    /// Suspending hooks still at their sentinel in the current pass.
    pub pending: usize,
}

/// Called by a suspending hook the first time it leaves its sentinel.
pub(crate) fn child_ready(boundary: &Owner) {
    let Some(registry) = boundary.registry() else {
        return;
    };
    let ready = registry.fiber_hook(boundary.key, |f| f.on_child_ready.clone());
    match ready {
        Some(ready) => ready(),
        None => log::warn!("suspending hook resolved but its boundary is gone"),
    }
}

fn on_child_ready(owner: Owner) -> Rc<dyn Fn()> {
    Rc::new(move || {
        let Some(registry) = owner.registry() else {
            return;
        };
        let resolved = registry
            .suspense_mut(owner.key, |record, _| match record {
                Some(r) if r.is_suspended => {
                    r.is_suspended = false;
                    true
                }
                _ => false,
            })
            .unwrap_or(false);
        if !resolved {
            return;
        }
        log::debug!("suspense boundary resolved");
        if let Some(resolve) = registry.fiber_hook(owner.key, |f| f.on_resolve.clone()) {
            resolve();
        }
    })
}

/// Renders a boundary inside the current component. `children` always runs
/// so its hooks keep their slots; its output is swapped for `fallback`
/// while anything beneath is still suspended.
pub fn suspense_boundary(fallback: View, children: impl FnOnce() -> View) -> View {
    let registry = Registry::active_or_raise();
    let key = registry.current_key().unwrap_or_else(|e| raise(e));

    let owner = registry.owner(key);
    registry.suspense_mut(key, |record, ready| {
        let r = record.get_or_insert(SuspenseRecord {
            is_suspended: true,
            ..SuspenseRecord::default()
        });
        r.pending = 0;
        if ready.is_none() {
            *ready = Some(on_child_ready(owner));
        }
    });

    let content = children();

    let show_fallback = registry
        .suspense_mut(key, |record, _| {
            let r = record.get_or_insert_with(SuspenseRecord::default);
            if r.pending == 0 {
                r.is_suspended = false;
            }
            r.has_checked = true;
            r.is_suspended
        })
        .unwrap_or(false);

    if show_fallback { fallback } else { content }
}

fn nearest_boundary(registry: &Registry, from: FiberKey) -> Option<FiberKey> {
    let st = registry.state();
    let mut at = Some(from);
    while let Some(key) = at {
        let fiber = st.fibers.get(key)?;
        if fiber.suspense.is_some() {
            return Some(key);
        }
        at = fiber.parent;
    }
    None
}

/// State hook that holds its boundary in fallback until it is set to a
/// value other than `sentinel`.
///
/// Outside a boundary it behaves like [`crate::use_state`].
pub fn use_suspended_state<T>(sentinel: T) -> (T, Setter<T>)
where
    T: Clone + PartialEq + 'static,
{
    let registry = Registry::active_or_raise();
    let key = registry.current_key().unwrap_or_else(|e| raise(e));
    let boundary = nearest_boundary(&registry, key);

    let initial = sentinel.clone();
    let cell: Rc<StateCell<T>> = slot(&registry, HookKind::State, |owner| {
        let link = match boundary {
            Some(b) => Some(SuspendLink {
                sentinel,
                fired: Cell::new(false),
                boundary: registry.owner(b),
            }),
            None => {
                log::warn!("use_suspended_state called outside a suspense boundary");
                None
            }
        };
        Rc::new(StateCell::new(initial, owner, link))
    });

    let value = cell.get();
    if let Some(link) = &cell.suspense
        && value == link.sentinel
    {
        registry.suspense_mut(link.boundary.key, |record, _| {
            if let Some(r) = record {
                r.pending += 1;
            }
        });
    }

    let setter = Setter::from_cell(cell);
    (value, setter)
}
