//! # Fibers, Hooks, and Effects
//!
//! A host dialog is request/response: every interaction closes it and the
//! application renders a fresh one. Formwork gives components state that
//! survives those re-shows. There are three main pieces:
//!
//! - [`Registry`]: the fiber table, keyed by player and instance key.
//! - `use_*` hooks: slot-based storage bound to the rendering fiber.
//! - [`View`]: the tree a component returns, serialized into dialog segments.
//!
//! ## Components and state
//!
//! A component is a function from props to a [`View`]. Hooks called inside
//! it are matched to slots by call order:
//!
//! ```rust
//! use std::rc::Rc;
//! use formwork_core::*;
//!
//! let counter = Component::new("Counter", |_: &()| {
//!     let (count, set_count) = use_state(|| 0);
//!     View::new(ViewKind::Button {
//!         label: format!("Count = {count}"),
//!         on_press: Some(callback(move || set_count.update(|n| n + 1))),
//!     })
//! });
//!
//! let registry = Registry::new(Rc::new(ManualTicks::new()));
//! let id = FiberId::new("steve", "counter");
//! registry.get_or_create(&id, &counter, ());
//! let view = registry.render(&id).unwrap();
//! assert_eq!(view.type_name(), "button");
//! ```
//!
//! - The Nth hook call of a render always refers to the Nth slot; calling
//!   hooks conditionally is a contract violation and fails the render.
//! - Setters compare with `PartialEq`. Setting an equal value does nothing;
//!   anything else marks the fiber dirty and calls its reschedule callback.
//!
//! ## Effects and cleanup
//!
//! Effects are queued while the tree renders and run once it is complete:
//!
//! ```rust
//! use formwork_core::*;
//!
//! fn Ticker(_: &()) -> View {
//!     use_effect_with((), || {
//!         log::info!("mounted");
//!         on_unmount(|| log::info!("unmounted"))
//!     });
//!     View::new(ViewKind::Panel)
//! }
//! ```
//!
//! - `use_effect` runs after every render; `use_effect_with(deps, ..)` only
//!   when `deps` changed. The previous cleanup runs before the next body.
//! - [`Registry::delete`] runs every outstanding cleanup of the fiber and
//!   its children.
//!
//! ## Scheduling
//!
//! There are no threads. Deferred renders and spawned futures run on the
//! host tick loop through [`TickScheduler`]; [`ManualTicks`] is the
//! deterministic implementation used in tests.

pub mod context;
pub mod effects;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod prelude;
pub mod registry;
pub mod scheduler;
pub mod suspense;
pub mod view;

pub use context::*;
pub use effects::*;
pub use error::*;
pub use fiber::{FiberFlags, FiberId, FiberKey, FiberSnapshot, PlayerId};
pub use hooks::*;
pub use registry::{Registry, render_child};
pub use scheduler::*;
pub use suspense::*;
pub use view::*;
