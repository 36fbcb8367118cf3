//! Canonical control/layout block.
//!
//! The decoder addresses fields by offset, so every layout-bearing component
//! emits the same leading block in the same order no matter how its property
//! bag was built. Extend by appending to `CANONICAL_KEYS`, never by inserting.

use crate::encode::ReservedBytes;
use crate::{Props, Value};

pub const CANONICAL_PLAN_VERSION: u32 = 1;

pub const TYPE: &str = "type";
pub const VISIBLE: &str = "visible";
pub const ENABLED: &str = "enabled";
pub const LAYER: &str = "layer";
pub const WIDTH: &str = "width";
pub const HEIGHT: &str = "height";
pub const X: &str = "x";
pub const Y: &str = "y";
pub const INHERIT_MAX_SIBLING_WIDTH: &str = "inherit_max_sibling_width";
pub const INHERIT_MAX_SIBLING_HEIGHT: &str = "inherit_max_sibling_height";

/// Room reserved after `layer` for future control flags.
pub const CONTROL_RESERVE: ReservedBytes = ReservedBytes::fixed(16);
/// Room reserved after the layout block for future layout fields.
pub const LAYOUT_RESERVE: ReservedBytes = ReservedBytes::fixed(32);

const RESERVED_CONTROL_KEY: &str = "__reserved_control";
const RESERVED_LAYOUT_KEY: &str = "__reserved_layout";

/// One slot of the canonical block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Canonical {
    Key(&'static str),
    Reserved(ReservedBytes),
}

pub const CANONICAL_KEYS: [Canonical; 12] = [
    Canonical::Key(TYPE),
    Canonical::Key(VISIBLE),
    Canonical::Key(ENABLED),
    Canonical::Key(LAYER),
    Canonical::Reserved(CONTROL_RESERVE),
    Canonical::Key(WIDTH),
    Canonical::Key(HEIGHT),
    Canonical::Key(X),
    Canonical::Key(Y),
    Canonical::Key(INHERIT_MAX_SIBLING_WIDTH),
    Canonical::Key(INHERIT_MAX_SIBLING_HEIGHT),
    Canonical::Reserved(LAYOUT_RESERVE),
];

fn default_for(key: &str) -> Value {
    match key {
        VISIBLE | ENABLED => Value::Bool(true),
        INHERIT_MAX_SIBLING_WIDTH | INHERIT_MAX_SIBLING_HEIGHT => Value::Bool(false),
        _ => Value::Number(0.0),
    }
}

fn is_canonical(key: &str) -> bool {
    key == RESERVED_CONTROL_KEY
        || key == RESERVED_LAYOUT_KEY
        || CANONICAL_KEYS
            .iter()
            .any(|c| matches!(c, Canonical::Key(k) if *k == key))
}

/// Builds the ordered bag for a component of kind `type_name`: the canonical
/// block (defaults filled in, reservations interleaved), then every other
/// caller key in its original insertion order.
///
/// A caller-supplied `type` is ignored; the component kind always wins.
pub fn compose(type_name: &str, props: &Props) -> Props {
    let mut out = Props::new();
    for slot in CANONICAL_KEYS {
        match slot {
            Canonical::Key(TYPE) => {
                out.insert(TYPE, type_name);
            }
            Canonical::Key(key) => {
                let value = props.get(key).cloned().unwrap_or_else(|| default_for(key));
                out.insert(key, value);
            }
            Canonical::Reserved(r) if r == CONTROL_RESERVE => {
                out.insert(RESERVED_CONTROL_KEY, r);
            }
            Canonical::Reserved(r) => {
                out.insert(RESERVED_LAYOUT_KEY, r);
            }
        }
    }

    for (key, value) in props.iter() {
        if is_canonical(key) {
            continue;
        }
        out.insert(key.to_string(), value.clone());
    }
    out
}
