//! Data model and value types for FHIRPath expressions
//!
//! Values, collections, partial-precision temporals, quantities, and the
//! trait through which resource trees are navigated.

pub mod json;
pub mod provider;
pub mod quantity;
pub mod temporal;
pub mod types;
pub mod value;

pub use json::{JsonElement, json_to_collection};
pub use provider::{Element, ElementNode};
pub use quantity::Quantity;
pub use temporal::{
    CalendarUnit, PrecisionDate, PrecisionDateTime, PrecisionTime, TemporalPrecision,
};
pub use types::TypeSpecifier;
pub use value::{Collection, FhirPathValue};
