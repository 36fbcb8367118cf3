use formwork_wire::{Props, Value};

/// Layout and state properties shared by every component.
///
/// Unset fields are left out of the node's props; the composer fills in the
/// canonical defaults (visible, enabled, zero geometry).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Modifier {
    pub visible: Option<bool>,
    pub enabled: Option<bool>,
    pub layer: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub inherit_max_sibling_width: Option<bool>,
    pub inherit_max_sibling_height: Option<bool>,
    /// Application-defined props, appended after the canonical block.
    pub extra: Props,
}

impl Modifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self, v: bool) -> Self {
        self.visible = Some(v);
        self
    }

    pub fn hidden(self) -> Self {
        self.visible(false)
    }

    pub fn enabled(mut self, v: bool) -> Self {
        self.enabled = Some(v);
        self
    }

    pub fn disabled(self) -> Self {
        self.enabled(false)
    }

    pub fn layer(mut self, layer: f64) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn width(mut self, w: f64) -> Self {
        self.width = Some(w);
        self
    }

    pub fn height(mut self, h: f64) -> Self {
        self.height = Some(h);
        self
    }

    pub fn size(self, w: f64, h: f64) -> Self {
        self.width(w).height(h)
    }

    pub fn offset(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Sizes to the widest sibling instead of `width`.
    pub fn match_sibling_width(mut self) -> Self {
        self.inherit_max_sibling_width = Some(true);
        self
    }

    pub fn match_sibling_height(mut self) -> Self {
        self.inherit_max_sibling_height = Some(true);
        self
    }

    pub fn prop(mut self, key: impl Into<formwork_wire::PropKey>, value: impl Into<Value>) -> Self {
        self.extra.insert(key, value);
        self
    }

    pub fn to_props(&self) -> Props {
        let mut props = Props::new();
        let fields: [(&'static str, Option<Value>); 9] = [
            ("visible", self.visible.map(Value::from)),
            ("enabled", self.enabled.map(Value::from)),
            ("layer", self.layer.map(Value::from)),
            ("width", self.width.map(Value::from)),
            ("height", self.height.map(Value::from)),
            ("x", self.x.map(Value::from)),
            ("y", self.y.map(Value::from)),
            (
                "inherit_max_sibling_width",
                self.inherit_max_sibling_width.map(Value::from),
            ),
            (
                "inherit_max_sibling_height",
                self.inherit_max_sibling_height.map(Value::from),
            ),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                props.insert(key, v);
            }
        }
        for (k, v) in self.extra.iter() {
            props.insert(k.to_string(), v.clone());
        }
        props
    }
}
