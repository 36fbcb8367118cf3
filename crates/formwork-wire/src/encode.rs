//! Fixed-width field encoder.
//!
//! Every typed field is `prefix ':' padded-value marker`. Widths below are part
//! of the wire contract; grow the protocol by appending fields, never by
//! resizing these.

use crate::{Props, Value, WireError};

/// Magic/version string every payload starts with.
pub const HEADER: &str = "fw01";

/// Fill character for the unused tail of a value region.
pub const PAD: char = '~';

pub const STRING_WIDTH: usize = 32;
pub const BOOL_WIDTH: usize = 5;
pub const INT_WIDTH: usize = 16;
pub const FLOAT_WIDTH: usize = 24;

/// Type prefix (`s`, `b`, ...) plus the `:` separator.
pub const PREFIX_BYTES: usize = 2;
pub const MARKER_BYTES: usize = 1;

/// Position-indexed uniqueness markers. The field at index `i` ends with
/// `MARKERS[i]`.
pub const MARKERS: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

pub const MAX_FIELDS: usize = MARKERS.len();

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Str,
    Bool,
    Int,
    Float,
    Reserved(ReservedBytes),
}

impl FieldType {
    /// Detects the wire type for a value, `None` when the value cannot be
    /// encoded at all.
    pub fn of(value: &Value) -> Option<FieldType> {
        match value {
            Value::Bool(_) => Some(FieldType::Bool),
            Value::Number(n) if is_integer(*n) => Some(FieldType::Int),
            Value::Number(_) => Some(FieldType::Float),
            Value::Str(_) => Some(FieldType::Str),
            Value::Reserved(r) => Some(FieldType::Reserved(*r)),
            Value::Null | Value::List(_) => None,
        }
    }

    pub fn prefix(self) -> Option<char> {
        match self {
            FieldType::Str => Some('s'),
            FieldType::Bool => Some('b'),
            FieldType::Int => Some('i'),
            FieldType::Float => Some('f'),
            FieldType::Reserved(_) => None,
        }
    }

    /// Bytes of the value region, excluding prefix and marker.
    pub fn value_width(self) -> usize {
        match self {
            FieldType::Str => STRING_WIDTH,
            FieldType::Bool => BOOL_WIDTH,
            FieldType::Int => INT_WIDTH,
            FieldType::Float => FLOAT_WIDTH,
            FieldType::Reserved(r) => r.len() - MARKER_BYTES,
        }
    }

    /// Total bytes this field occupies in a payload.
    pub fn byte_cost(self) -> usize {
        match self {
            FieldType::Reserved(r) => r.len(),
            typed => PREFIX_BYTES + typed.value_width() + MARKER_BYTES,
        }
    }
}

/// A reserved placeholder of a fixed number of bytes (marker included).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReservedBytes(u32);

impl ReservedBytes {
    /// `None` for zero: a reservation must at least hold its marker.
    pub const fn new(len: u32) -> Option<Self> {
        if len == 0 { None } else { Some(Self(len)) }
    }

    pub(crate) const fn fixed(len: u32) -> Self {
        assert!(len > 0);
        Self(len)
    }

    pub fn len(self) -> usize {
        self.0 as usize
    }

    pub fn is_empty(self) -> bool {
        false
    }
}

/// Validates a caller-requested reservation. Negative, zero, fractional, NaN
/// and infinite sizes are rejected.
pub fn reserve_bytes(requested: f64) -> Result<ReservedBytes, WireError> {
    if !requested.is_finite() || requested.fract() != 0.0 || requested < 1.0 {
        return Err(WireError::InvalidReserve { requested });
    }
    if requested > u32::MAX as f64 {
        return Err(WireError::InvalidReserve { requested });
    }
    Ok(ReservedBytes(requested as u32))
}

/// Output of [`encode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    pub payload: String,
    pub total_bytes: usize,
}

pub fn is_integer(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0
}

pub fn marker(index: usize) -> Option<char> {
    MARKERS.as_bytes().get(index).map(|b| *b as char)
}

/// Type sequence of a property bag, failing on the first unsupported value.
pub fn field_plan(props: &Props) -> Result<Vec<FieldType>, WireError> {
    props
        .iter()
        .map(|(key, value)| {
            FieldType::of(value).ok_or_else(|| WireError::UnsupportedType {
                key: key.to_string(),
                type_name: value.type_name(),
            })
        })
        .collect()
}

/// Header plus the cost of every field in `plan`.
pub fn plan_byte_len(plan: &[FieldType]) -> usize {
    HEADER.len() + plan.iter().map(|t| t.byte_cost()).sum::<usize>()
}

/// Encodes a property bag, in order, into one fixed-layout payload.
pub fn encode(props: &Props) -> Result<Encoded, WireError> {
    if props.len() > MAX_FIELDS {
        return Err(WireError::TooManyFields {
            count: props.len(),
            max: MAX_FIELDS,
        });
    }
    let plan = field_plan(props)?;

    let mut payload = String::with_capacity(plan_byte_len(&plan));
    payload.push_str(HEADER);
    for (index, (ty, value)) in plan.iter().zip(props.values()).enumerate() {
        let Some(m) = marker(index) else {
            return Err(WireError::TooManyFields {
                count: props.len(),
                max: MAX_FIELDS,
            });
        };
        write_field(&mut payload, *ty, value, m);
    }

    let total_bytes = payload.len();
    log::trace!("encoded {} fields into {} bytes", plan.len(), total_bytes);
    Ok(Encoded {
        payload,
        total_bytes,
    })
}

fn write_field(out: &mut String, ty: FieldType, value: &Value, marker: char) {
    let width = ty.value_width();
    let Some(prefix) = ty.prefix() else {
        out.extend(std::iter::repeat_n(PAD, width));
        out.push(marker);
        return;
    };

    let text = value_text(value, width);
    let fitted = truncate_to_bytes(&text, width);
    out.push(prefix);
    out.push(':');
    out.push_str(fitted);
    out.extend(std::iter::repeat_n(PAD, width - fitted.len()));
    out.push(marker);
}

fn value_text(value: &Value, width: usize) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        // -0 has no sign on the wire
        Value::Number(n) if *n == 0.0 => "0".to_string(),
        Value::Number(n) => number_text(*n, width),
        Value::Reserved(_) | Value::Null | Value::List(_) => String::new(),
    }
}

/// Shortest round-trip text of `n`. Plain decimal when it fits `width`,
/// exponent form otherwise; every finite float fits the float width that way.
fn number_text(n: f64, width: usize) -> String {
    let plain = n.to_string();
    if plain.len() <= width {
        return plain;
    }
    format!("{n:e}")
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a code
/// point.
pub fn truncate_to_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = 0;
    for (i, ch) in s.char_indices() {
        let next = i + ch.len_utf8();
        if next > max {
            break;
        }
        end = next;
    }
    &s[..end]
}
