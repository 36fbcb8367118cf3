use std::any::Any;
use std::future::Future;
use std::rc::Rc;

use formwork_wire::{Props, Value, WireError, compose, encode};
use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::error::{HookError, raise};

/// How an interactive-control callback finishes.
pub enum Settle {
    Done(anyhow::Result<()>),
    Deferred(LocalBoxFuture<'static, anyhow::Result<()>>),
}

impl Settle {
    pub fn deferred(fut: impl Future<Output = anyhow::Result<()>> + 'static) -> Self {
        Settle::Deferred(fut.boxed_local())
    }
}

pub trait IntoSettle {
    fn into_settle(self) -> Settle;
}

impl IntoSettle for () {
    fn into_settle(self) -> Settle {
        Settle::Done(Ok(()))
    }
}

impl IntoSettle for anyhow::Result<()> {
    fn into_settle(self) -> Settle {
        Settle::Done(self)
    }
}

impl IntoSettle for Settle {
    fn into_settle(self) -> Settle {
        self
    }
}

pub type Callback = Rc<dyn Fn() -> Settle>;

pub fn callback<R: IntoSettle>(f: impl Fn() -> R + 'static) -> Callback {
    Rc::new(move || f().into_settle())
}

/// A component function with its props type erased, so fibers of different
/// components can share one registry.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<dyn Fn(&dyn Any) -> View>,
}

impl Component {
    pub fn new<P: 'static>(name: &'static str, f: impl Fn(&P) -> View + 'static) -> Self {
        let render = move |props: &dyn Any| match props.downcast_ref::<P>() {
            Some(p) => f(p),
            None => raise(HookError::PropsTypeMismatch {
                component: name,
                expected: std::any::type_name::<P>(),
            }),
        };
        Self {
            name,
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call(&self, props: &dyn Any) -> View {
        (self.render)(props)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// Application-defined node that writes its own segments.
pub trait Node {
    fn type_name(&self) -> &'static str;
    fn serialize(&self, cx: &mut SerializeContext) -> Result<(), WireError>;
}

#[derive(Clone)]
pub enum ViewKind {
    Panel,
    Text {
        text: String,
    },
    Button {
        label: String,
        on_press: Option<Callback>,
    },
    Input {
        label: String,
        value: String,
        placeholder: String,
        on_submit: Option<Callback>,
    },
    Image {
        texture: String,
    },
    Custom(Rc<dyn Node>),
}

impl std::fmt::Debug for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewKind::Panel => write!(f, "Panel"),
            ViewKind::Text { text } => f.debug_struct("Text").field("text", text).finish(),
            ViewKind::Button { label, .. } => f
                .debug_struct("Button")
                .field("label", label)
                .field("on_press", &"<callback>")
                .finish(),
            ViewKind::Input {
                label,
                value,
                placeholder,
                ..
            } => f
                .debug_struct("Input")
                .field("label", label)
                .field("value", value)
                .field("placeholder", placeholder)
                .finish(),
            ViewKind::Image { texture } => {
                f.debug_struct("Image").field("texture", texture).finish()
            }
            ViewKind::Custom(node) => write!(f, "Custom({})", node.type_name()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct View {
    pub kind: ViewKind,
    pub props: Props,
    pub children: Vec<View>,
}

impl View {
    pub fn new(kind: ViewKind) -> Self {
        View {
            kind,
            props: Props::new(),
            children: vec![],
        }
    }

    pub fn prop(mut self, key: impl Into<formwork_wire::PropKey>, value: impl Into<Value>) -> Self {
        self.props.insert(key, value);
        self
    }

    /// Appends every entry of `props`, in order.
    pub fn props(mut self, props: &Props) -> Self {
        for (k, v) in props.iter() {
            self.props.insert(k.to_string(), v.clone());
        }
        self
    }

    pub fn with_children(mut self, kids: Vec<View>) -> Self {
        self.children = kids;
        self
    }

    pub fn child(mut self, kid: View) -> Self {
        self.children.push(kid);
        self
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ViewKind::Panel => "panel",
            ViewKind::Text { .. } => "text",
            ViewKind::Button { .. } => "button",
            ViewKind::Input { .. } => "input",
            ViewKind::Image { .. } => "image",
            ViewKind::Custom(node) => node.type_name(),
        }
    }

    /// Writes this node's segment, then its children depth-first.
    pub fn serialize(&self, cx: &mut SerializeContext) -> Result<(), WireError> {
        let mut own = Props::new();
        let interactive = match &self.kind {
            ViewKind::Custom(node) => return node.serialize(cx),
            ViewKind::Panel => None,
            ViewKind::Text { text } => {
                own.insert("text", text.as_str());
                None
            }
            ViewKind::Image { texture } => {
                own.insert("texture", texture.as_str());
                None
            }
            ViewKind::Button { label, on_press } => {
                own.insert("label", label.as_str());
                Some(on_press.clone())
            }
            ViewKind::Input {
                label,
                value,
                placeholder,
                on_submit,
            } => {
                own.insert("label", label.as_str());
                own.insert("value", value.as_str());
                own.insert("placeholder", placeholder.as_str());
                Some(on_submit.clone())
            }
        };
        for (k, v) in self.props.iter() {
            if !own.contains_key(k) {
                own.insert(k.to_string(), v.clone());
            }
        }

        cx.write_node(self.type_name(), own, interactive)?;
        cx.depth += 1;
        let result = self.children.iter().try_for_each(|c| c.serialize(cx));
        cx.depth -= 1;
        result
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentSlot {
    /// Dialog title; carries the root node.
    Title,
    /// A labeled text row.
    Label,
    /// A dialog button; its index is the selection the host reports back.
    Button,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub slot: SegmentSlot,
    pub payload: String,
}

/// Per-render output of serialization: host segments in emission order and
/// the button-index → callback table used to route the response.
#[derive(Default)]
pub struct SerializeContext {
    segments: Vec<Segment>,
    callbacks: Vec<Option<Callback>>,
    total_bytes: usize,
    pub(crate) depth: usize,
}

impl SerializeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes, encodes and emits one node. `interactive` is `Some` for
    /// controls that occupy a dialog button (with or without a callback).
    pub fn write_node(
        &mut self,
        type_name: &str,
        mut props: Props,
        interactive: Option<Option<Callback>>,
    ) -> Result<(), WireError> {
        let slot = match interactive {
            Some(cb) => {
                let index = self.register(cb);
                props.insert("button_index", index);
                SegmentSlot::Button
            }
            None if self.depth == 0 && self.segments.is_empty() => SegmentSlot::Title,
            None => SegmentSlot::Label,
        };
        let encoded = encode(&compose(type_name, &props))?;
        self.total_bytes += encoded.total_bytes;
        self.segments.push(Segment {
            slot,
            payload: encoded.payload,
        });
        Ok(())
    }

    /// Reserves the next button index.
    pub fn register(&mut self, cb: Option<Callback>) -> usize {
        self.callbacks.push(cb);
        self.callbacks.len() - 1
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn button_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn callback(&self, index: usize) -> Option<Callback> {
        self.callbacks.get(index).cloned().flatten()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formwork_wire::{FieldType, HEADER, decode, field_plan};

    #[test]
    fn root_becomes_title_and_buttons_get_indices() {
        let tree = View::new(ViewKind::Panel)
            .prop("width", 100)
            .with_children(vec![
                View::new(ViewKind::Text {
                    text: "Hello".into(),
                }),
                View::new(ViewKind::Button {
                    label: "Ok".into(),
                    on_press: Some(callback(|| ())),
                }),
                View::new(ViewKind::Button {
                    label: "Inert".into(),
                    on_press: None,
                }),
            ]);

        let mut cx = SerializeContext::new();
        tree.serialize(&mut cx).unwrap();
        let slots: Vec<_> = cx.segments().iter().map(|s| s.slot).collect();
        assert_eq!(
            slots,
            vec![
                SegmentSlot::Title,
                SegmentSlot::Label,
                SegmentSlot::Button,
                SegmentSlot::Button
            ]
        );
        assert_eq!(cx.button_count(), 2);
        assert!(cx.callback(0).is_some());
        assert!(cx.callback(1).is_none());
        assert!(cx.callback(7).is_none());
        assert_eq!(
            cx.total_bytes(),
            cx.segments().iter().map(|s| s.payload.len()).sum::<usize>()
        );
    }

    #[test]
    fn kind_fields_follow_canonical_block() {
        let button = View::new(ViewKind::Button {
            label: "Go".into(),
            on_press: None,
        })
        .prop("tag", "x")
        .prop("label", "ignored");

        let mut cx = SerializeContext::new();
        button.serialize(&mut cx).unwrap();
        let payload = &cx.segments()[0].payload;
        assert!(payload.starts_with(HEADER));

        let mut plan = field_plan(&compose("button", &Props::new())).unwrap();
        plan.extend([FieldType::Str, FieldType::Str, FieldType::Int]);
        let fields = decode(payload, &plan).unwrap();
        assert_eq!(fields[0].value, "button");
        assert_eq!(fields[12].value, "Go");
        assert_eq!(fields[13].value, "x");
        assert_eq!(fields[14].value, "0");
    }
}
