//! The render/present loop.
//!
//! One cycle: render the fiber, serialize the tree into dialog segments,
//! show the dialog, wait for the player, then route the answer. A selection
//! runs its callback and schedules the next cycle; a plain dismissal tears
//! the fiber down.

use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};

use anyhow::anyhow;
use futures::FutureExt;
use thiserror::Error;

use formwork_core::{
    Callback, Component, FiberId, PlayerId, Registry, RenderError, SegmentSlot, SerializeContext,
    Settle, TickScheduler, panic_message,
};
use formwork_devtools::{Inspector, Instant, RenderMetrics};
use formwork_wire::WireError;

use crate::config::RuntimeConfig;
use crate::input::InputLocks;
use crate::surface::{DialogHost, HostError, PlayerInput};

#[derive(Debug, Error)]
pub enum PresentError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("serializing the view failed: {0}")]
    Wire(#[from] WireError),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// How one dialog cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Dismissed by the player; the fiber is gone.
    Closed,
    /// A button was picked; the next cycle is scheduled.
    Selected(usize),
    /// Closed on purpose to show fresh state; the next cycle is scheduled.
    Reopened,
}

struct Inner {
    registry: Registry,
    dialogs: Rc<dyn DialogHost>,
    input: Rc<dyn PlayerInput>,
    ticks: Rc<dyn TickScheduler>,
    config: RuntimeConfig,
    locks: RefCell<InputLocks>,
    inspector: RefCell<Inspector>,
}

#[derive(Clone)]
pub struct Presenter {
    inner: Rc<Inner>,
}

impl Presenter {
    pub fn new(
        dialogs: Rc<dyn DialogHost>,
        input: Rc<dyn PlayerInput>,
        ticks: Rc<dyn TickScheduler>,
        config: RuntimeConfig,
    ) -> Self {
        let mut inspector = Inspector::new();
        inspector.enabled = config.inspector;
        Self {
            inner: Rc::new(Inner {
                registry: Registry::new(ticks.clone()),
                dialogs,
                input,
                ticks,
                config,
                locks: RefCell::new(InputLocks::new()),
                inspector: RefCell::new(inspector),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn is_input_locked(&self, player: &PlayerId) -> bool {
        self.inner.locks.borrow().is_locked(player)
    }

    /// Inspector report for every live fiber, as JSON.
    pub fn inspect(&self) -> serde_json::Result<String> {
        self.inner
            .inspector
            .borrow()
            .snapshot_json(&self.inner.registry)
    }

    /// Shows `component` to `player` under `key` and runs one dialog cycle.
    /// An existing fiber with the same identity keeps its hooks and gets
    /// the new props.
    pub async fn present<P: 'static>(
        &self,
        player: &PlayerId,
        key: &str,
        component: &Component,
        props: P,
    ) -> Result<Outcome, PresentError> {
        let id = FiberId::new(player.clone(), key);
        if self.inner.registry.get_or_create(&id, component, props) {
            self.install_hooks(&id);
        }
        self.cycle(id).await
    }

    /// Starts [`Presenter::present`] on the next tick, for host code that
    /// cannot await.
    pub fn open<P: 'static>(
        &self,
        player: PlayerId,
        key: impl Into<String>,
        component: Component,
        props: P,
    ) {
        let this = self.clone();
        let key = key.into();
        let ticks = self.inner.ticks.clone();
        self.inner.ticks.run_next_tick(Box::new(move || {
            ticks.spawn_local(
                async move {
                    if let Err(e) = this.present(&player, &key, &component, props).await {
                        log::error!("presenting {player}:{key} failed: {e}");
                    }
                }
                .boxed_local(),
            );
        }));
    }

    /// Queues another cycle for `id` after `delay_ticks`. At most one is
    /// pending per fiber.
    pub fn request_rerender(&self, id: &FiberId, delay_ticks: u32) -> bool {
        let this = self.clone();
        let ticks = self.inner.ticks.clone();
        let owned = id.clone();
        self.inner.registry.schedule_render(
            id,
            move || {
                ticks.spawn_local(
                    async move {
                        if !this.inner.registry.contains(&owned) {
                            log::debug!("{owned} was deleted before its rerender");
                            return;
                        }
                        if let Err(e) = this.cycle(owned.clone()).await {
                            log::error!("rerender of {owned} failed: {e}");
                        }
                    }
                    .boxed_local(),
                );
            },
            delay_ticks,
        )
    }

    fn install_hooks(&self, id: &FiberId) {
        let registry = &self.inner.registry;
        let weak = Rc::downgrade(&self.inner);
        let owned = id.clone();
        registry.set_reschedule(id, move || state_changed(&weak, &owned));
        let weak = Rc::downgrade(&self.inner);
        let owned = id.clone();
        registry.set_on_resolve(id, move || state_changed(&weak, &owned));
    }

    async fn cycle(&self, id: FiberId) -> Result<Outcome, PresentError> {
        let inner = &self.inner;
        let registry = &inner.registry;
        let player = id.player.clone();

        let flags = registry
            .flags(&id)
            .ok_or_else(|| RenderError::UnknownFiber(id.clone()))?;
        if !flags.mounted {
            inner.locks.borrow_mut().lock(
                &player,
                inner.config.lock_categories(),
                inner.input.as_ref(),
            );
        }

        let started = Instant::now();
        let cx = match render_segments(registry, &id) {
            Ok(cx) => cx,
            Err(e) => {
                self.teardown(&id);
                return Err(e);
            }
        };
        inner
            .inspector
            .borrow_mut()
            .record_render(&id, RenderMetrics::measure(started, &cx));

        let mut dialog = inner.dialogs.create_dialog();
        for segment in cx.segments() {
            match segment.slot {
                SegmentSlot::Title => dialog.set_title_text(&segment.payload),
                SegmentSlot::Label => dialog.add_labeled_text(&segment.payload),
                SegmentSlot::Button => dialog.add_button(&segment.payload),
            }
        }

        let shown = registry.update_flags(&id, |f| {
            f.mounted = true;
            f.awaiting = true;
            f.reopening = false;
        });
        if shown.is_some_and(|f| f.dirty) {
            // an effect of this render already changed state
            state_changed(&Rc::downgrade(&self.inner), &id);
        }
        log::debug!("showing {id} ({} bytes)", cx.total_bytes());
        let response = dialog.show(&player).await;

        let reopening = registry
            .update_flags(&id, |f| f.awaiting = false)
            .is_some_and(|f| f.reopening);
        // a close request still queued is moot now
        registry.cancel_render(&id);

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                log::warn!("dialog for {id} rejected: {e}");
                self.teardown(&id);
                return Err(e.into());
            }
        };

        let outcome = match response.selection {
            Some(index) if !response.cancelled => {
                match cx.callback(index) {
                    Some(cb) => {
                        if let Err(e) = settle(cb).await {
                            log::error!("callback #{index} of {id} failed: {e:#}");
                        }
                    }
                    None => log::warn!("{id}: selection #{index} has no callback"),
                }
                self.request_rerender(&id, inner.config.rerender_delay_ticks);
                Outcome::Selected(index)
            }
            _ if reopening => {
                registry.update_flags(&id, |f| f.reopening = false);
                self.request_rerender(&id, inner.config.rerender_delay_ticks);
                Outcome::Reopened
            }
            _ => {
                self.teardown(&id);
                Outcome::Closed
            }
        };

        if let Some(max_idle) = inner.config.evict_idle_after_ticks {
            for evicted in registry.evict_idle(max_idle) {
                self.release(&evicted);
            }
        }
        Ok(outcome)
    }

    /// Deletes the fiber (running its cleanups) and gives input back.
    fn teardown(&self, id: &FiberId) {
        self.inner.registry.delete(id);
        self.release(id);
    }

    fn release(&self, id: &FiberId) {
        self.inner.inspector.borrow_mut().forget(id);
        let player_busy = self
            .inner
            .registry
            .snapshot()
            .iter()
            .any(|s| s.id.player == id.player);
        if !player_busy {
            self.inner
                .locks
                .borrow_mut()
                .unlock(&id.player, self.inner.input.as_ref());
        }
    }
}

fn render_segments(registry: &Registry, id: &FiberId) -> Result<SerializeContext, PresentError> {
    let view = registry.render(id)?;
    let mut cx = SerializeContext::new();
    view.serialize(&mut cx)?;
    Ok(cx)
}

/// A hook of `id` changed while no render was running. If its dialog is up,
/// close it so the next cycle shows the new state.
fn state_changed(weak: &Weak<Inner>, id: &FiberId) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let awaiting = inner.registry.flags(id).is_some_and(|f| f.awaiting);
    if !awaiting {
        // the cycle in progress schedules the next render itself
        return;
    }
    let weak = Rc::downgrade(&inner);
    let owned = id.clone();
    inner.registry.schedule_render(
        id,
        move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let flags = inner.registry.update_flags(&owned, |f| {
                if f.awaiting {
                    f.reopening = true;
                }
            });
            if flags.is_some_and(|f| f.reopening) {
                log::debug!("state changed under open dialog; reopening {owned}");
                inner.dialogs.close_dialogs(&owned.player);
            }
        },
        inner.config.state_update_delay_ticks,
    );
}

/// Runs a callback to completion. Errors, rejected futures and panics all
/// come back as `Err`.
async fn settle(cb: Callback) -> anyhow::Result<()> {
    let settled = std::panic::catch_unwind(AssertUnwindSafe(|| cb()));
    match settled {
        Ok(Settle::Done(result)) => result,
        Ok(Settle::Deferred(fut)) => match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(anyhow!("callback panicked: {}", panic_message(&*payload))),
        },
        Err(payload) => Err(anyhow!("callback panicked: {}", panic_message(&*payload))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::{HashMap, VecDeque};

    use formwork_core::{
        ManualTicks, Setter, on_unmount, use_effect_with, use_state, use_suspended_state,
    };
    use formwork_ui::*;
    use futures::channel::oneshot;
    use futures::future::LocalBoxFuture;

    use crate::input::InputCategory;
    use crate::surface::{Dialog, DialogResponse};

    type Reply = Result<DialogResponse, HostError>;

    #[derive(Clone, Debug, Default)]
    struct Shown {
        title: String,
        labels: Vec<String>,
        buttons: Vec<String>,
    }

    #[derive(Default)]
    struct HostState {
        shown: RefCell<Vec<Shown>>,
        open: RefCell<HashMap<PlayerId, oneshot::Sender<Reply>>>,
        scripted: RefCell<VecDeque<Reply>>,
        closes: Cell<usize>,
    }

    impl HostState {
        fn respond(&self, player: &PlayerId, reply: DialogResponse) {
            let tx = self.open.borrow_mut().remove(player).expect("no open dialog");
            tx.send(Ok(reply)).unwrap();
        }

        fn last(&self) -> Shown {
            self.shown.borrow().last().cloned().expect("nothing shown")
        }
    }

    struct MockHost(Rc<HostState>);

    struct MockDialog {
        host: Rc<HostState>,
        shown: Shown,
    }

    impl DialogHost for MockHost {
        fn create_dialog(&self) -> Box<dyn Dialog> {
            Box::new(MockDialog {
                host: self.0.clone(),
                shown: Shown::default(),
            })
        }

        fn close_dialogs(&self, player: &PlayerId) {
            self.0.closes.set(self.0.closes.get() + 1);
            if let Some(tx) = self.0.open.borrow_mut().remove(player) {
                let _ = tx.send(Ok(DialogResponse::cancelled()));
            }
        }
    }

    impl Dialog for MockDialog {
        fn set_title_text(&mut self, text: &str) {
            self.shown.title = text.to_string();
        }
        fn add_labeled_text(&mut self, text: &str) {
            self.shown.labels.push(text.to_string());
        }
        fn add_button(&mut self, text: &str) {
            self.shown.buttons.push(text.to_string());
        }
        fn show(self: Box<Self>, player: &PlayerId) -> LocalBoxFuture<'static, Reply> {
            let MockDialog { host, shown } = *self;
            host.shown.borrow_mut().push(shown);
            if let Some(reply) = host.scripted.borrow_mut().pop_front() {
                return futures::future::ready(reply).boxed_local();
            }
            let (tx, rx) = oneshot::channel();
            host.open.borrow_mut().insert(player.clone(), tx);
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(HostError::Rejected("dialog dropped".into())))
            }
            .boxed_local()
        }
    }

    #[derive(Default)]
    struct Perms(RefCell<HashMap<(PlayerId, u8), bool>>);

    impl PlayerInput for Perms {
        fn is_permission_enabled(&self, player: &PlayerId, category: InputCategory) -> bool {
            *self
                .0
                .borrow()
                .get(&(player.clone(), category.bits()))
                .unwrap_or(&true)
        }
        fn set_permission(&self, player: &PlayerId, category: InputCategory, enabled: bool) {
            self.0
                .borrow_mut()
                .insert((player.clone(), category.bits()), enabled);
        }
    }

    struct Rig {
        ticks: Rc<ManualTicks>,
        host: Rc<HostState>,
        perms: Rc<Perms>,
        presenter: Presenter,
    }

    fn rig(config: RuntimeConfig) -> Rig {
        let _ = env_logger::builder().is_test(true).try_init();
        let ticks = Rc::new(ManualTicks::new());
        let host = Rc::new(HostState::default());
        let perms = Rc::new(Perms::default());
        let presenter = Presenter::new(
            Rc::new(MockHost(host.clone())),
            perms.clone(),
            ticks.clone(),
            config,
        );
        Rig {
            ticks,
            host,
            perms,
            presenter,
        }
    }

    fn counter(setter: Rc<RefCell<Option<Setter<i32>>>>) -> Component {
        Component::new("Counter", move |_: &()| {
            let (n, set) = use_state(|| 0);
            *setter.borrow_mut() = Some(set.clone());
            Panel(Modifier::new().size(200.0, 80.0)).children((
                Text(format!("count {n}")),
                Button("+1", move || set.update(|n| n + 1)),
            ))
        })
    }

    #[test]
    fn selection_runs_callback_and_rerenders() {
        let Rig {
            ticks,
            host,
            perms,
            presenter,
        } = rig(RuntimeConfig::default());
        let alex = PlayerId::new("alex");
        let slot = Rc::new(RefCell::new(None));
        presenter.open(alex.clone(), "counter", counter(slot.clone()), ());

        assert!(host.shown.borrow().is_empty());
        ticks.advance(1);
        let first = host.last();
        assert!(first.title.starts_with(formwork_wire::HEADER));
        assert!(first.labels[0].contains("count 0"));
        assert_eq!(first.buttons.len(), 1);
        assert!(presenter.is_input_locked(&alex));
        assert!(!perms.is_permission_enabled(&alex, InputCategory::CAMERA));

        host.respond(&alex, DialogResponse::selected(0));
        ticks.run_until_stalled();
        let id = FiberId::new("alex", "counter");
        assert!(presenter.registry().has_pending_render(&id));
        assert_eq!(host.shown.borrow().len(), 1);

        ticks.advance(1);
        assert_eq!(host.shown.borrow().len(), 2);
        assert!(host.last().labels[0].contains("count 1"));

        host.respond(&alex, DialogResponse::cancelled());
        ticks.run_until_stalled();
        assert!(presenter.registry().is_empty());
        assert!(!presenter.is_input_locked(&alex));
        assert!(perms.is_permission_enabled(&alex, InputCategory::CAMERA));
        assert!(perms.is_permission_enabled(&alex, InputCategory::MOVEMENT));
    }

    #[test]
    fn dismissal_deletes_fiber_and_runs_cleanups() {
        let r = rig(RuntimeConfig::default());
        let cleaned = Rc::new(Cell::new(0));
        let c = cleaned.clone();
        let comp = Component::new("Menu", move |_: &()| {
            let c = c.clone();
            use_effect_with((), move || on_unmount(move || c.set(c.get() + 1)));
            Panel(Modifier::new()).children(Button("Ok", || ()))
        });
        let alex = PlayerId::new("alex");

        r.host.scripted.borrow_mut().extend([
            Ok(DialogResponse::selected(0)),
            Ok(DialogResponse::cancelled()),
        ]);
        let first = pollster::block_on(r.presenter.present(&alex, "menu", &comp, ()));
        assert_eq!(first.unwrap(), Outcome::Selected(0));
        assert_eq!(cleaned.get(), 0);

        let second = pollster::block_on(r.presenter.present(&alex, "menu", &comp, ()));
        assert_eq!(second.unwrap(), Outcome::Closed);
        assert_eq!(cleaned.get(), 1);
        assert!(!r.presenter.registry().contains(&FiberId::new("alex", "menu")));
        assert_eq!(r.ticks.pending(), 0);
    }

    #[test]
    fn failing_callbacks_still_rerender() {
        let r = rig(RuntimeConfig::default());
        let comp = Component::new("Broken", |_: &()| {
            Panel(Modifier::new()).children((
                Button("err", || -> anyhow::Result<()> { anyhow::bail!("nope") }),
                Button("panic", || -> () { panic!("handler blew up") }),
                Button("reject", || {
                    Settle::deferred(async { Err(anyhow::anyhow!("rejected")) })
                }),
                StaticButton("inert"),
            ))
        });
        let alex = PlayerId::new("alex");
        let id = FiberId::new("alex", "broken");

        for index in 0..4 {
            r.host
                .scripted
                .borrow_mut()
                .push_back(Ok(DialogResponse::selected(index)));
            let outcome = pollster::block_on(r.presenter.present(&alex, "broken", &comp, ()));
            assert_eq!(outcome.unwrap(), Outcome::Selected(index));
            assert!(r.presenter.registry().has_pending_render(&id));
        }
    }

    #[test]
    fn host_rejection_propagates_and_releases_input() {
        let r = rig(RuntimeConfig::default());
        let comp = Component::new("Menu", |_: &()| Text("hi"));
        let alex = PlayerId::new("alex");
        r.host
            .scripted
            .borrow_mut()
            .push_back(Err(HostError::PlayerLeft(alex.clone())));

        let err = pollster::block_on(r.presenter.present(&alex, "menu", &comp, ())).unwrap_err();
        assert!(matches!(err, PresentError::Host(HostError::PlayerLeft(_))));
        assert!(r.presenter.registry().is_empty());
        assert!(!r.presenter.is_input_locked(&alex));
    }

    #[test]
    fn render_errors_surface_as_present_errors() {
        let r = rig(RuntimeConfig::default());
        let comp = Component::new("Bad", |_: &()| {
            Text("x").modifier(Modifier::new().prop("nested", formwork_wire::Value::List(vec![])))
        });
        let alex = PlayerId::new("alex");
        let err = pollster::block_on(r.presenter.present(&alex, "bad", &comp, ())).unwrap_err();
        assert!(matches!(err, PresentError::Wire(_)));
        assert!(r.host.shown.borrow().is_empty());
        assert!(!r.presenter.is_input_locked(&alex));
    }

    #[test]
    fn state_change_under_open_dialog_reopens() {
        let Rig {
            ticks,
            host,
            presenter,
            ..
        } = rig(RuntimeConfig::default());
        let alex = PlayerId::new("alex");
        let slot = Rc::new(RefCell::new(None));
        presenter.open(alex.clone(), "counter", counter(slot.clone()), ());
        ticks.advance(1);
        assert_eq!(host.shown.borrow().len(), 1);

        let set = slot.borrow().clone().unwrap();
        set.set(5);
        set.set(6);
        assert_eq!(host.closes.get(), 0);

        ticks.advance(1);
        assert_eq!(host.closes.get(), 1);
        let id = FiberId::new("alex", "counter");
        assert!(presenter.registry().contains(&id));
        assert!(presenter.registry().has_pending_render(&id));

        ticks.advance(1);
        assert_eq!(host.shown.borrow().len(), 2);
        assert!(host.last().labels[0].contains("count 6"));
        assert!(presenter.is_input_locked(&alex));
    }

    #[test]
    fn resolved_suspense_replaces_the_fallback_dialog() {
        let Rig {
            ticks,
            host,
            presenter,
            ..
        } = rig(RuntimeConfig::default());
        let slot: Rc<RefCell<Option<Setter<String>>>> = Rc::new(RefCell::new(None));
        let s = slot.clone();
        let comp = Component::new("Profile", move |_: &()| {
            Suspense(Text("loading"), || {
                let (name, set) = use_suspended_state(String::new());
                *s.borrow_mut() = Some(set);
                Text(format!("hello {name}"))
            })
        });
        let alex = PlayerId::new("alex");
        presenter.open(alex.clone(), "profile", comp, ());
        ticks.advance(1);
        assert!(host.last().title.contains("loading"));

        slot.borrow().clone().unwrap().set("alex".into());
        ticks.advance(2);
        assert_eq!(host.closes.get(), 1);
        assert_eq!(host.shown.borrow().len(), 2);
        assert!(host.last().title.contains("hello alex"));
    }

    #[test]
    fn inspector_tracks_cycles_when_enabled() {
        let r = rig(RuntimeConfig {
            inspector: true,
            ..RuntimeConfig::default()
        });
        let comp = Component::new("Menu", |_: &()| Text("hi"));
        let alex = PlayerId::new("alex");
        r.host
            .scripted
            .borrow_mut()
            .push_back(Ok(DialogResponse::selected(3)));
        let outcome = pollster::block_on(r.presenter.present(&alex, "menu", &comp, ()));
        assert_eq!(outcome.unwrap(), Outcome::Selected(3));

        let json: serde_json::Value = serde_json::from_str(&r.presenter.inspect().unwrap()).unwrap();
        assert_eq!(json["total_renders"], 1);
        assert_eq!(json["fibers"][0]["component"], "Menu");
    }

    #[test]
    fn idle_fibers_are_evicted_after_a_cycle() {
        let r = rig(RuntimeConfig {
            evict_idle_after_ticks: Some(5),
            ..RuntimeConfig::default()
        });
        let comp = Component::new("Menu", |_: &()| Text("hi"));
        let (alex, sam) = (PlayerId::new("alex"), PlayerId::new("sam"));

        r.host
            .scripted
            .borrow_mut()
            .push_back(Ok(DialogResponse::selected(0)));
        pollster::block_on(r.presenter.present(&alex, "menu", &comp, ())).unwrap();
        r.presenter.registry().cancel_render(&FiberId::new("alex", "menu"));
        r.ticks.advance(10);

        r.host
            .scripted
            .borrow_mut()
            .push_back(Ok(DialogResponse::selected(0)));
        pollster::block_on(r.presenter.present(&sam, "menu", &comp, ())).unwrap();

        assert!(!r.presenter.registry().contains(&FiberId::new("alex", "menu")));
        assert!(r.presenter.registry().contains(&FiberId::new("sam", "menu")));
        assert!(!r.presenter.is_input_locked(&alex));
        assert!(r.presenter.is_input_locked(&sam));
    }
}
