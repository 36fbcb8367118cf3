//! Fiber registry.
//!
//! Component instances outlive each render call (the host re-invokes the
//! render on every interaction), so their hook slots live here, keyed by
//! `(player, key)`. The registry is an explicit handle: the pipeline owns one
//! and passes it around; hooks find it through [`Registry::enter`].

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::context::ContextId;
use crate::effects::{Dispose, EffectFn};
use crate::error::{HookError, HookKind, RenderError, panic_message, raise};
use crate::fiber::{
    EffectSlot, Fiber, FiberFlags, FiberId, FiberKey, FiberSnapshot, Hook, HookSlot,
};
use crate::scheduler::{TaskHandle, TickScheduler};
use crate::suspense::SuspenseRecord;
use crate::view::{Component, View};

thread_local! {
    static ACTIVE: RefCell<Vec<Registry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Default)]
pub(crate) struct RegistryState {
    pub fibers: SlotMap<FiberKey, Fiber>,
    index: HashMap<FiberId, FiberKey>,
    stack: Vec<FiberKey>,
    scheduled: HashMap<FiberId, TaskHandle>,
    contexts: HashMap<ContextId, Vec<Rc<dyn Any>>>,
    pending_effects: SmallVec<[(FiberKey, usize); 8]>,
}

pub(crate) struct Shared {
    state: RefCell<RegistryState>,
    ticks: Rc<dyn TickScheduler>,
}

#[derive(Clone)]
pub struct Registry {
    shared: Rc<Shared>,
}

/// Weak back-reference from a hook handle to the fiber that owns it.
#[derive(Clone)]
pub(crate) struct Owner {
    registry: Weak<Shared>,
    pub key: FiberKey,
}

impl Owner {
    pub fn registry(&self) -> Option<Registry> {
        self.registry.upgrade().map(|shared| Registry { shared })
    }

    /// Marks the fiber dirty and asks the pipeline for a new render.
    pub fn notify(&self) {
        let Some(registry) = self.registry() else {
            return;
        };
        let reschedule = {
            let mut st = registry.state_mut();
            let Some(fiber) = st.fibers.get_mut(self.key) else {
                log::trace!("state update for a deleted fiber ignored");
                return;
            };
            fiber.flags.dirty = true;
            fiber.reschedule.clone()
        };
        if let Some(reschedule) = reschedule {
            reschedule();
        }
    }
}

/// Pops the render stack even when the component unwinds.
struct RenderFrame<'a> {
    registry: &'a Registry,
}

impl Drop for RenderFrame<'_> {
    fn drop(&mut self) {
        let mut st = self.registry.state_mut();
        if let Some(key) = st.stack.pop()
            && let Some(fiber) = st.fibers.get_mut(key)
        {
            fiber.cursor = 0;
        }
    }
}

impl Registry {
    pub fn new(ticks: Rc<dyn TickScheduler>) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(RegistryState::default()),
                ticks,
            }),
        }
    }

    pub(crate) fn state(&self) -> Ref<'_, RegistryState> {
        self.shared.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, RegistryState> {
        self.shared.state.borrow_mut()
    }

    pub fn ticks(&self) -> Rc<dyn TickScheduler> {
        self.shared.ticks.clone()
    }

    pub(crate) fn owner(&self, key: FiberKey) -> Owner {
        Owner {
            registry: Rc::downgrade(&self.shared),
            key,
        }
    }

    /// Makes this registry the one hooks talk to for the duration of `f`.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Guard;
        impl Drop for Guard {
            fn drop(&mut self) {
                ACTIVE.with(|a| {
                    a.borrow_mut().pop();
                });
            }
        }
        ACTIVE.with(|a| a.borrow_mut().push(self.clone()));
        let _guard = Guard;
        f()
    }

    /// The registry most recently entered on this thread.
    pub fn active() -> Option<Registry> {
        ACTIVE.with(|a| a.borrow().last().cloned())
    }

    pub(crate) fn active_or_raise() -> Registry {
        Self::active().unwrap_or_else(|| raise(HookError::OutsideComponent))
    }

    pub fn len(&self) -> usize {
        self.state().fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &FiberId) -> bool {
        self.state().index.contains_key(id)
    }

    fn key_of(&self, id: &FiberId) -> Option<FiberKey> {
        self.state().index.get(id).copied()
    }

    /// Returns `true` when a fresh fiber was created. An existing fiber gets
    /// its props replaced; its hooks are untouched.
    pub fn get_or_create<P: 'static>(&self, id: &FiberId, component: &Component, props: P) -> bool {
        self.get_or_create_erased(id, component, Rc::new(props), None)
    }

    pub(crate) fn get_or_create_erased(
        &self,
        id: &FiberId,
        component: &Component,
        props: Rc<dyn Any>,
        parent: Option<FiberKey>,
    ) -> bool {
        let tick = self.shared.ticks.current_tick();
        let mut st = self.state_mut();
        if let Some(&key) = st.index.get(id) {
            let fiber = &mut st.fibers[key];
            fiber.component = component.clone();
            fiber.props = props;
            return false;
        }

        let mut fiber = Fiber::new(id.clone(), component.clone(), props, tick);
        fiber.parent = parent;
        let key = st.fibers.insert(fiber);
        st.index.insert(id.clone(), key);
        if let Some(parent) = parent
            && let Some(p) = st.fibers.get_mut(parent)
        {
            p.children.push(key);
        }
        log::debug!("created fiber {id} ({})", component.name());
        true
    }

    /// Pushes a fiber onto the render stack and rewinds its hook cursor.
    pub fn push(&self, id: &FiberId) -> Result<(), RenderError> {
        let key = self
            .key_of(id)
            .ok_or_else(|| RenderError::UnknownFiber(id.clone()))?;
        self.push_key(key);
        Ok(())
    }

    fn push_key(&self, key: FiberKey) {
        let mut st = self.state_mut();
        if let Some(fiber) = st.fibers.get_mut(key) {
            fiber.cursor = 0;
        }
        st.stack.push(key);
    }

    pub fn pop(&self) -> Option<FiberId> {
        let mut st = self.state_mut();
        let key = st.stack.pop()?;
        let fiber = st.fibers.get_mut(key)?;
        fiber.cursor = 0;
        Some(fiber.id.clone())
    }

    /// The fiber currently rendering, if any.
    pub fn current(&self) -> Option<FiberId> {
        let st = self.state();
        st.stack
            .last()
            .and_then(|k| st.fibers.get(*k))
            .map(|f| f.id.clone())
    }

    pub(crate) fn current_key(&self) -> Result<FiberKey, HookError> {
        self.state()
            .stack
            .last()
            .copied()
            .ok_or(HookError::OutsideComponent)
    }

    /// Renders a fiber: invokes its component with the stored props, then
    /// runs every effect queued during the pass (nested fibers included).
    pub fn render(&self, id: &FiberId) -> Result<View, RenderError> {
        let key = self
            .key_of(id)
            .ok_or_else(|| RenderError::UnknownFiber(id.clone()))?;
        let outermost = self.state().stack.is_empty();

        let result = self.enter(|| catch_unwind(AssertUnwindSafe(|| self.render_key(key))));
        let result = result.map_err(RenderError::from_panic);

        if outermost {
            if result.is_ok() {
                self.flush_effects();
            } else {
                self.state_mut().pending_effects.clear();
            }
        }
        result
    }

    /// Renders `key` in place; contract violations unwind to the caller.
    pub(crate) fn render_key(&self, key: FiberKey) -> View {
        let (component, props) = {
            let st = self.state();
            let fiber = &st.fibers[key];
            (fiber.component.clone(), fiber.props.clone())
        };

        self.push_key(key);
        self.state_mut().fibers[key].visited.clear();
        let frame = RenderFrame { registry: self };
        let view = component.call(props.as_ref());

        let tick = self.shared.ticks.current_tick();
        let (violation, dropped) = {
            let mut st = self.state_mut();
            let fiber = &mut st.fibers[key];
            let found = fiber.cursor;
            let violation = match fiber.rendered_hooks {
                Some(expected) if expected != found => Some(HookError::HookCountChanged {
                    fiber: fiber.id.clone(),
                    expected,
                    found,
                }),
                _ => None,
            };
            fiber.rendered_hooks = Some(found);
            fiber.flags.dirty = false;
            fiber.last_render_tick = tick;
            let stale: Vec<FiberKey> = fiber
                .children
                .iter()
                .copied()
                .filter(|k| !fiber.visited.contains(k))
                .collect();
            let dropped: Vec<FiberId> = stale
                .into_iter()
                .filter_map(|k| st.fibers.get(k).map(|f| f.id.clone()))
                .collect();
            (violation, dropped)
        };
        drop(frame);

        if let Some(err) = violation {
            raise(err);
        }
        // children the component no longer renders are unmounted
        for id in dropped {
            log::debug!("{id} was not rendered by its parent; deleting");
            self.delete(&id);
        }
        view
    }

    /// Renders a nested component as a child fiber of the one currently
    /// rendering. Called from inside a component.
    pub fn render_child<P: 'static>(&self, key: &str, component: &Component, props: P) -> View {
        let parent = self.current_key().unwrap_or_else(|e| raise(e));
        let (id, reschedule, on_resolve) = {
            let st = self.state();
            let p = &st.fibers[parent];
            (p.id.child(key), p.reschedule.clone(), p.on_resolve.clone())
        };
        self.get_or_create_erased(&id, component, Rc::new(props), Some(parent));

        let child = {
            let mut st = self.state_mut();
            let child = st.index[&id];
            let fiber = &mut st.fibers[child];
            fiber.reschedule = reschedule;
            fiber.on_resolve = on_resolve;
            let visited = &mut st.fibers[parent].visited;
            if !visited.contains(&child) {
                visited.push(child);
            }
            child
        };
        self.render_key(child)
    }

    pub(crate) fn queue_effect(&self, key: FiberKey, slot: usize) {
        self.state_mut().pending_effects.push((key, slot));
    }

    fn flush_effects(&self) {
        let pending = std::mem::take(&mut self.state_mut().pending_effects);
        for (key, index) in pending {
            let (id, create, cleanup) = {
                let mut st = self.state_mut();
                let Some(fiber) = st.fibers.get_mut(key) else {
                    continue;
                };
                let id = fiber.id.clone();
                match fiber.hooks.get_mut(index) {
                    Some(HookSlot::Effect(e)) => (id, e.create.take(), e.cleanup.take()),
                    _ => continue,
                }
            };

            if let Some(cleanup) = cleanup {
                run_cleanup(&id, &cleanup);
            }
            let Some(create) = create else {
                continue;
            };
            let dispose = match catch_unwind(AssertUnwindSafe(create)) {
                Ok(d) => d,
                Err(payload) => {
                    log::error!("effect #{index} of {id} panicked: {}", panic_message(&*payload));
                    None
                }
            };

            let mut st = self.state_mut();
            match st.fibers.get_mut(key).and_then(|f| f.hooks.get_mut(index)) {
                Some(HookSlot::Effect(e)) => e.cleanup = dispose,
                _ => {
                    drop(st);
                    // fiber went away while the effect ran
                    if let Some(d) = dispose {
                        run_cleanup(&id, &d);
                    }
                }
            }
        }
    }

    /// Claims the next hook slot of the current fiber for a hook that keeps
    /// a shared handle. `init` runs outside any registry borrow.
    pub(crate) fn shared_slot(
        &self,
        kind: HookKind,
        init: impl FnOnce(Owner) -> Rc<dyn Any>,
    ) -> Result<(Rc<dyn Any>, Owner, usize), HookError> {
        let (key, index, existing) = self.claim_slot(kind)?;
        let owner = self.owner(key);
        if let Some(rc) = existing {
            return Ok((rc, owner, index));
        }

        let rc = init(owner.clone());
        let slot = match kind {
            HookKind::State => HookSlot::State(rc.clone()),
            HookKind::Reducer => HookSlot::Reducer(rc.clone()),
            HookKind::Ref => HookSlot::Ref(rc.clone()),
            HookKind::Effect => unreachable!("effects do not use shared slots"),
        };
        self.state_mut().fibers[key].hooks.push(slot);
        Ok((rc, owner, index))
    }

    /// Advances the cursor; returns the existing shared handle, or `None`
    /// when the slot is new and must be pushed by the caller.
    fn claim_slot(
        &self,
        kind: HookKind,
    ) -> Result<(FiberKey, usize, Option<Rc<dyn Any>>), HookError> {
        let key = self.current_key()?;
        let mut st = self.state_mut();
        let fiber = &mut st.fibers[key];
        let index = fiber.cursor;
        fiber.cursor += 1;

        match fiber.hooks.get(index) {
            None => Ok((key, index, None)),
            Some(slot) if slot.kind() != kind => Err(HookError::SlotKindMismatch {
                fiber: fiber.id.clone(),
                index,
                expected: kind,
                found: slot.kind(),
            }),
            Some(slot) => Ok((key, index, slot.shared())),
        }
    }

    /// Registers an effect at the next slot. `deps == None` runs every
    /// render; otherwise it runs when `same_deps` says the deps changed.
    pub(crate) fn effect_slot(
        &self,
        deps: Option<Box<dyn Any>>,
        same_deps: fn(&dyn Any, &dyn Any) -> bool,
        create: EffectFn,
    ) -> Result<(), HookError> {
        let (key, index, _) = self.claim_slot(HookKind::Effect)?;
        let changed = {
            let mut st = self.state_mut();
            let fiber = &mut st.fibers[key];
            if index == fiber.hooks.len() {
                fiber.hooks.push(HookSlot::Effect(EffectSlot {
                    deps,
                    create: Some(create),
                    cleanup: None,
                }));
                true
            } else {
                match &mut fiber.hooks[index] {
                    HookSlot::Effect(slot) => {
                        let changed = match (&slot.deps, &deps) {
                            (Some(prev), Some(next)) => !same_deps(prev.as_ref(), next.as_ref()),
                            _ => true,
                        };
                        if changed {
                            slot.deps = deps;
                            slot.create = Some(create);
                        }
                        changed
                    }
                    _ => unreachable!("slot kind checked by claim_slot"),
                }
            }
        };
        if changed {
            self.queue_effect(key, index);
        }
        Ok(())
    }

    /// Runs every effect cleanup of the fiber and its children, then removes
    /// them. A panicking cleanup is logged and does not stop the others.
    pub fn delete(&self, id: &FiberId) -> bool {
        let Some(root) = self.key_of(id) else {
            return false;
        };

        let (removed, handles) = {
            let mut st = self.state_mut();
            let mut order = vec![root];
            let mut i = 0;
            while i < order.len() {
                if let Some(f) = st.fibers.get(order[i]) {
                    order.extend(f.children.iter().copied());
                }
                i += 1;
            }

            if let Some(parent) = st.fibers.get(root).and_then(|f| f.parent)
                && let Some(p) = st.fibers.get_mut(parent)
            {
                p.children.retain(|k| *k != root);
            }

            let mut removed = Vec::with_capacity(order.len());
            let mut handles = Vec::new();
            for &key in &order {
                if let Some(fiber) = st.fibers.remove(key) {
                    st.index.remove(&fiber.id);
                    if let Some(h) = st.scheduled.remove(&fiber.id) {
                        handles.push(h);
                    }
                    removed.push(fiber);
                }
            }
            st.pending_effects.retain(|(k, _)| !order.contains(k));
            (removed, handles)
        };

        for h in handles {
            self.shared.ticks.cancel(h);
        }
        for fiber in &removed {
            for slot in &fiber.hooks {
                if let HookSlot::Effect(EffectSlot {
                    cleanup: Some(d), ..
                }) = slot
                {
                    run_cleanup(&fiber.id, d);
                }
            }
        }
        log::debug!("deleted {id} ({} fibers)", removed.len());
        true
    }

    /// Schedules `task` after `delay_ticks`, unless a render for `id` is
    /// already pending, in which case the request is dropped.
    pub fn schedule_render(
        &self,
        id: &FiberId,
        task: impl FnOnce() + 'static,
        delay_ticks: u32,
    ) -> bool {
        if self.state().scheduled.contains_key(id) {
            log::trace!("render for {id} already pending; request dropped");
            return false;
        }
        let weak = Rc::downgrade(&self.shared);
        let owned = id.clone();
        let handle = self.shared.ticks.run_deferred(
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.state.borrow_mut().scheduled.remove(&owned);
                }
                task();
            }),
            delay_ticks,
        );
        self.state_mut().scheduled.insert(id.clone(), handle);
        true
    }

    pub fn cancel_render(&self, id: &FiberId) -> bool {
        let handle = self.state_mut().scheduled.remove(id);
        match handle {
            Some(h) => {
                self.shared.ticks.cancel(h);
                true
            }
            None => false,
        }
    }

    pub fn has_pending_render(&self, id: &FiberId) -> bool {
        self.state().scheduled.contains_key(id)
    }

    pub fn push_context(&self, id: ContextId, value: Rc<dyn Any>) {
        self.state_mut().contexts.entry(id).or_default().push(value);
    }

    pub fn pop_context(&self, id: ContextId) -> Option<Rc<dyn Any>> {
        let mut st = self.state_mut();
        let stack = st.contexts.get_mut(&id)?;
        let value = stack.pop();
        if stack.is_empty() {
            st.contexts.remove(&id);
        }
        value
    }

    pub fn read_context(&self, id: ContextId) -> Option<Rc<dyn Any>> {
        self.state()
            .contexts
            .get(&id)
            .and_then(|s| s.last())
            .cloned()
    }

    pub fn flags(&self, id: &FiberId) -> Option<FiberFlags> {
        let st = self.state();
        let key = st.index.get(id)?;
        st.fibers.get(*key).map(|f| f.flags)
    }

    /// Applies `f` to the fiber's flags and returns the updated copy.
    pub fn update_flags(
        &self,
        id: &FiberId,
        f: impl FnOnce(&mut FiberFlags),
    ) -> Option<FiberFlags> {
        let mut st = self.state_mut();
        let key = *st.index.get(id)?;
        let fiber = st.fibers.get_mut(key)?;
        f(&mut fiber.flags);
        Some(fiber.flags)
    }

    /// Installs the callback state updates use to request a render.
    pub fn set_reschedule(&self, id: &FiberId, f: impl Fn() + 'static) -> bool {
        self.set_hook(id, Rc::new(f), |fiber, h| fiber.reschedule = Some(h))
    }

    /// Installs the callback a resolved suspense boundary uses to get its
    /// dialog replaced.
    pub fn set_on_resolve(&self, id: &FiberId, f: impl Fn() + 'static) -> bool {
        self.set_hook(id, Rc::new(f), |fiber, h| fiber.on_resolve = Some(h))
    }

    fn set_hook(&self, id: &FiberId, hook: Hook, apply: fn(&mut Fiber, Hook)) -> bool {
        let mut st = self.state_mut();
        let Some(&key) = st.index.get(id) else {
            return false;
        };
        apply(&mut st.fibers[key], hook);
        true
    }

    pub(crate) fn suspense_mut<R>(
        &self,
        key: FiberKey,
        f: impl FnOnce(&mut Option<SuspenseRecord>, &mut Option<Hook>) -> R,
    ) -> Option<R> {
        let mut st = self.state_mut();
        let fiber = st.fibers.get_mut(key)?;
        Some(f(&mut fiber.suspense, &mut fiber.on_child_ready))
    }

    pub(crate) fn fiber_hook(&self, key: FiberKey, pick: fn(&Fiber) -> Option<Hook>) -> Option<Hook> {
        self.state().fibers.get(key).and_then(pick)
    }

    pub fn suspense(&self, id: &FiberId) -> Option<SuspenseRecord> {
        let st = self.state();
        let key = st.index.get(id)?;
        st.fibers.get(*key).and_then(|f| f.suspense)
    }

    /// Deletes root fibers that have not rendered for `max_idle_ticks` and
    /// are not waiting on an open dialog. Returns the evicted ids.
    pub fn evict_idle(&self, max_idle_ticks: u64) -> Vec<FiberId> {
        let now = self.shared.ticks.current_tick();
        let stale: Vec<FiberId> = {
            let st = self.state();
            st.fibers
                .values()
                .filter(|f| f.parent.is_none())
                .filter(|f| !f.flags.awaiting && !st.scheduled.contains_key(&f.id))
                .filter(|f| now.saturating_sub(f.last_render_tick) >= max_idle_ticks)
                .map(|f| f.id.clone())
                .collect()
        };
        for id in &stale {
            log::debug!("evicting idle fiber {id}");
            self.delete(id);
        }
        stale
    }

    pub fn hook_kinds(&self, id: &FiberId) -> Option<Vec<HookKind>> {
        let st = self.state();
        let key = st.index.get(id)?;
        st.fibers
            .get(*key)
            .map(|f| f.hooks.iter().map(HookSlot::kind).collect())
    }

    pub fn snapshot(&self) -> Vec<FiberSnapshot> {
        let st = self.state();
        let mut out: Vec<FiberSnapshot> = st
            .fibers
            .values()
            .map(|f| FiberSnapshot {
                id: f.id.clone(),
                component: f.component.name(),
                hooks: f.hooks.iter().map(HookSlot::kind).collect(),
                flags: f.flags,
                pending_render: st.scheduled.contains_key(&f.id),
                suspended: f.suspense.map(|s| s.is_suspended),
                children: f.children.len(),
                last_render_tick: f.last_render_tick,
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

fn run_cleanup(id: &FiberId, cleanup: &Dispose) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| cleanup.run())) {
        log::error!("effect cleanup for {id} panicked: {}", panic_message(&*payload));
    }
}

/// Renders `component` as a child fiber of the component currently
/// rendering, identified by `key` under its parent.
pub fn render_child<P: 'static>(key: &str, component: &Component, props: P) -> View {
    Registry::active_or_raise().render_child(key, component, props)
}
