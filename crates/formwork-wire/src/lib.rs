//! # Wire format
//!
//! The host dialog can only show one short text field, so a component's
//! properties travel as a single fixed-layout string that an external,
//! string-based decoder splits back apart:
//!
//! ```text
//! HEADER || Field0 || Field1 || ... || FieldN
//! Field = TypePrefix ':' PaddedValue Marker
//! ```
//!
//! - Each type has a fixed value width (string 32, bool 5, integer 16,
//!   float 24 bytes). Longer values are truncated on a UTF-8 boundary,
//!   shorter ones are padded with [`PAD`].
//! - The trailing marker is unique per position, so two fields holding the
//!   same value never produce the same text.
//! - Reserved fields pre-allocate room for future fields without moving
//!   existing offsets.
//!
//! ```rust
//! use formwork_wire::*;
//!
//! let props = Props::new().with("width", 250.5).with("label", "Hello");
//! let composed = compose("panel", &props);
//! let out = encode(&composed).unwrap();
//! assert_eq!(out.total_bytes, plan_byte_len(&field_plan(&composed).unwrap()));
//! ```
//!
//! [`compose`] puts the canonical control/layout block first so its offsets
//! never depend on how the caller built the bag.

pub mod compose;
pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

pub use compose::{CANONICAL_KEYS, CANONICAL_PLAN_VERSION, Canonical, compose};
pub use decode::{DecodedField, decode};
pub use encode::{
    Encoded, FieldType, HEADER, MAX_FIELDS, PAD, ReservedBytes, encode, field_plan, plan_byte_len,
    reserve_bytes, truncate_to_bytes,
};
pub use error::WireError;
pub use value::{PropKey, Props, Value};
