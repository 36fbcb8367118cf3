#![allow(non_snake_case)]
//! Components for formwork dialogs.
//!
//! Every constructor returns a plain [`View`]; layout and state props come
//! from a [`Modifier`]. Interactive controls (buttons, inputs) take a
//! callback returning anything [`IntoSettle`]: `()`, `anyhow::Result<()>`,
//! or a [`Settle::deferred`] future.

pub mod modifier;

pub use modifier::Modifier;

use formwork_core::*;

/// A container node. Carries no content of its own.
pub fn Panel(modifier: Modifier) -> View {
    View::new(ViewKind::Panel).modifier(modifier)
}

pub fn Text(text: impl Into<String>) -> View {
    View::new(ViewKind::Text { text: text.into() })
}

/// Occupies one dialog button; `on_press` runs when the player selects it.
pub fn Button<R: IntoSettle>(label: impl Into<String>, on_press: impl Fn() -> R + 'static) -> View {
    View::new(ViewKind::Button {
        label: label.into(),
        on_press: Some(callback(on_press)),
    })
}

/// A button that is shown but routes to nothing. Selecting it re-renders.
pub fn StaticButton(label: impl Into<String>) -> View {
    View::new(ViewKind::Button {
        label: label.into(),
        on_press: None,
    })
}

pub fn Input<R: IntoSettle>(
    label: impl Into<String>,
    value: impl Into<String>,
    placeholder: impl Into<String>,
    on_submit: impl Fn() -> R + 'static,
) -> View {
    View::new(ViewKind::Input {
        label: label.into(),
        value: value.into(),
        placeholder: placeholder.into(),
        on_submit: Some(callback(on_submit)),
    })
}

pub fn Image(modifier: Modifier, texture: impl Into<String>) -> View {
    View::new(ViewKind::Image {
        texture: texture.into(),
    })
    .modifier(modifier)
}

/// Shows `fallback` until every suspending state hook under `children` has
/// a real value. `children` is evaluated on every render.
pub fn Suspense(fallback: View, children: impl FnOnce() -> View) -> View {
    suspense_boundary(fallback, children)
}

/// Extension trait for child building
pub trait ViewExt: Sized {
    fn modifier(self, modifier: Modifier) -> Self;
    fn children(self, children: impl IntoChildren) -> Self;
}

impl ViewExt for View {
    fn modifier(self, modifier: Modifier) -> Self {
        self.props(&modifier.to_props())
    }

    fn children(mut self, children: impl IntoChildren) -> Self {
        self.children.extend(children.into_children());
        self
    }
}

pub trait IntoChildren {
    fn into_children(self) -> Vec<View>;
}

impl IntoChildren for View {
    fn into_children(self) -> Vec<View> {
        vec![self]
    }
}

impl IntoChildren for Vec<View> {
    fn into_children(self) -> Vec<View> {
        self
    }
}

impl<const N: usize> IntoChildren for [View; N] {
    fn into_children(self) -> Vec<View> {
        self.into()
    }
}

impl IntoChildren for Option<View> {
    fn into_children(self) -> Vec<View> {
        self.into_iter().collect()
    }
}

macro_rules! impl_into_children_tuple {
    ($($idx:tt $t:ident),+) => {
        impl<$($t: IntoChildren),+> IntoChildren for ($($t,)+) {
            fn into_children(self) -> Vec<View> {
                let mut v = Vec::new();
                $(v.extend(self.$idx.into_children());)+
                v
            }
        }
    };
}

impl_into_children_tuple!(0 A, 1 B);
impl_into_children_tuple!(0 A, 1 B, 2 C);
impl_into_children_tuple!(0 A, 1 B, 2 C, 3 D);
impl_into_children_tuple!(0 A, 1 B, 2 C, 3 D, 4 E);

#[cfg(test)]
mod tests {
    use super::*;
    use formwork_wire::{FieldType, Props, compose, decode, field_plan};
    use std::cell::Cell;
    use std::rc::Rc;

    fn serialize(view: &View) -> SerializeContext {
        let mut cx = SerializeContext::new();
        view.serialize(&mut cx).unwrap();
        cx
    }

    #[test]
    fn modifier_fields_land_in_canonical_slots() {
        let m = Modifier::new().size(300.0, 120.5).offset(4.0, 8.0).hidden();
        let cx = serialize(&Panel(m.clone()));
        let plan = field_plan(&compose("panel", &m.to_props())).unwrap();
        let fields = decode(&cx.segments()[0].payload, &plan).unwrap();

        assert_eq!(fields[0].value, "panel");
        assert_eq!(fields[1].value, "false");
        assert_eq!(fields[2].value, "true");
        assert_eq!(fields[5].value, "300");
        assert_eq!(fields[6].ty, FieldType::Float);
        assert_eq!(fields[6].value, "120.5");
        assert_eq!(fields[7].value, "4");
        assert_eq!(fields[8].value, "8");
    }

    #[test]
    fn tree_segments_follow_depth_first_order() {
        let view = Panel(Modifier::new()).children((
            Text("Pick one"),
            [Button("Yes", || ()), StaticButton("Later")],
            Image(Modifier::new().size(16.0, 16.0), "icons/ok"),
        ));
        let cx = serialize(&view);
        let slots: Vec<_> = cx.segments().iter().map(|s| s.slot).collect();
        insta::assert_debug_snapshot!(slots, @r"
        [
            Title,
            Label,
            Button,
            Button,
            Label,
        ]
        ");
        assert_eq!(cx.button_count(), 2);
        assert!(cx.callback(0).is_some());
        assert!(cx.callback(1).is_none());
    }

    #[test]
    fn extra_props_follow_kind_fields() {
        let view = Text("hello").modifier(Modifier::new().prop("tone", "warn"));
        let cx = serialize(&view);
        let mut plan = field_plan(&compose("text", &Props::new())).unwrap();
        plan.extend([FieldType::Str, FieldType::Str]);
        let fields = decode(&cx.segments()[0].payload, &plan).unwrap();
        assert_eq!(fields[12].value, "hello");
        assert_eq!(fields[13].value, "warn");
    }

    #[test]
    fn button_callbacks_settle() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sync = Button("Now", move || h.set(h.get() + 1));
        let h = hits.clone();
        let later = Button("Later", move || {
            let h = h.clone();
            Settle::deferred(async move {
                h.set(h.get() + 10);
                Ok(())
            })
        });
        let failing = Button("Fail", || -> anyhow::Result<()> { anyhow::bail!("nope") });

        let cx = serialize(&Panel(Modifier::new()).children((sync, later, failing)));
        for i in 0..cx.button_count() {
            let cb = cx.callback(i).unwrap();
            let result = match cb() {
                Settle::Done(r) => r,
                Settle::Deferred(fut) => pollster::block_on(fut),
            };
            assert_eq!(result.is_ok(), i < 2);
        }
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn suspense_component_shows_fallback_first() {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = Registry::new(Rc::new(ManualTicks::new()));
        let comp = Component::new("Profile", |_: &()| {
            Suspense(Text("Loading..."), || {
                let (name, _) = use_suspended_state(String::new());
                Text(name)
            })
        });
        let id = FiberId::new("alex", "profile");
        registry.get_or_create(&id, &comp, ());
        let view = registry.render(&id).unwrap();
        match view.kind {
            ViewKind::Text { text } => assert_eq!(text, "Loading..."),
            other => panic!("unexpected {other:?}"),
        }
    }
}
