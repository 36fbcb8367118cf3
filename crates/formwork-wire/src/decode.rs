//! Reference reader: recovers fields from a payload using nothing but the
//! fixed widths of a known field plan, the way the external decoder does.

use crate::WireError;
use crate::encode::{FieldType, HEADER, PAD, PREFIX_BYTES, marker, plan_byte_len};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedField {
    pub ty: FieldType,
    /// Value text with padding and marker stripped. Empty for reservations.
    pub value: String,
    pub marker: char,
}

pub fn decode(payload: &str, plan: &[FieldType]) -> Result<Vec<DecodedField>, WireError> {
    let expected = plan_byte_len(plan);
    if !payload.starts_with(HEADER) {
        return Err(WireError::MissingHeader { expected: HEADER });
    }
    if payload.len() != expected {
        return Err(WireError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }

    let mut fields = Vec::with_capacity(plan.len());
    let mut offset = HEADER.len();
    for (index, ty) in plan.iter().copied().enumerate() {
        let end = offset + ty.byte_cost();
        let raw = payload
            .get(offset..end)
            .ok_or(WireError::MalformedField {
                index,
                reason: "field boundary splits a character",
            })?;
        fields.push(decode_field(index, ty, raw)?);
        offset = end;
    }
    Ok(fields)
}

fn decode_field(index: usize, ty: FieldType, raw: &str) -> Result<DecodedField, WireError> {
    let Some((at, found)) = raw.char_indices().last() else {
        return Err(WireError::MalformedField {
            index,
            reason: "empty field",
        });
    };
    let body = &raw[..at];
    if at != raw.len() - 1 || Some(found) != marker(index) {
        return Err(WireError::MalformedField {
            index,
            reason: "marker does not match field position",
        });
    }

    let value = match ty.prefix() {
        None => String::new(),
        Some(prefix) => {
            let mut chars = body.chars();
            if chars.next() != Some(prefix) || chars.next() != Some(':') {
                return Err(WireError::MalformedField {
                    index,
                    reason: "type prefix does not match plan",
                });
            }
            body[PREFIX_BYTES..].trim_end_matches(PAD).to_string()
        }
    };

    Ok(DecodedField {
        ty,
        value,
        marker: found,
    })
}
