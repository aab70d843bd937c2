// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Quantity type with UCUM unit conversion

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::temporal::CalendarUnit;

/// Quantity value with a unit
///
/// `unit` keeps the spelling from the source (`'mg'`, `days`). A missing
/// unit is stored as `"1"`, the UCUM unity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    /// Numeric value
    pub value: Decimal,
    /// Unit as written
    pub unit: String,
}

impl Quantity {
    /// Create a new quantity
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self {
            value,
            unit: if unit.is_empty() { "1".to_string() } else { unit },
        }
    }

    /// Create a unit-less quantity
    pub fn unitless(value: Decimal) -> Self {
        Self::new(value, "1")
    }

    /// Whether the unit is one of the FHIRPath calendar keywords
    pub fn is_calendar_keyword(&self) -> bool {
        is_calendar_keyword(&self.unit)
    }

    /// Calendar unit of this quantity, if it denotes a time span
    pub fn calendar_unit(&self) -> Option<CalendarUnit> {
        CalendarUnit::from_unit(&self.unit)
    }

    /// UCUM code for the unit; calendar keywords map to their UCUM spelling
    pub fn ucum_code(&self) -> &str {
        match self.unit.as_str() {
            "year" | "years" => "a",
            "month" | "months" => "mo",
            "week" | "weeks" => "wk",
            "day" | "days" => "d",
            "hour" | "hours" => "h",
            "minute" | "minutes" => "min",
            "second" | "seconds" => "s",
            "millisecond" | "milliseconds" => "ms",
            other => other,
        }
    }

    /// Convert to `target` unit; `None` when the units are not commensurable
    pub fn convert_to(&self, target: &str) -> Option<Quantity> {
        let from = self.ucum_code();
        if from == target || self.unit == target {
            return Some(Quantity::new(self.value, target));
        }
        // years and months are calendar durations, not fixed lengths
        if is_variable_length(from) || is_variable_length(target) {
            return None;
        }
        let from_analysis = octofhir_ucum::analyse(from).ok()?;
        let to_analysis = octofhir_ucum::analyse(target).ok()?;
        if from_analysis.dimension != to_analysis.dimension {
            return None;
        }
        let from_factor = exact(from_analysis.factor)?;
        let to_factor = exact(to_analysis.factor)?;
        let offset = exact(from_analysis.offset)?.checked_sub(exact(to_analysis.offset)?)?;
        let converted = self
            .value
            .checked_mul(from_factor)?
            .checked_div(to_factor)?
            .checked_add(offset)?;
        Some(Quantity::new(converted.normalize(), target))
    }

    /// Compare two quantities after unit conversion
    pub fn partial_compare(&self, other: &Quantity) -> Option<Ordering> {
        if self.is_calendar_keyword() != other.is_calendar_keyword()
            && (is_variable_length(self.ucum_code()) || is_variable_length(other.ucum_code()))
        {
            // 1 year and 1 'a' are different things
            return None;
        }
        let converted = other.convert_to(self.ucum_code())?;
        Some(self.value.cmp(&converted.value))
    }

    /// Equality after conversion; `None` when the units are incomparable
    pub fn equals(&self, other: &Quantity) -> Option<bool> {
        self.partial_compare(other).map(|o| o == Ordering::Equal)
    }

    /// Equivalence: like equality but compared at the lesser decimal precision
    pub fn equivalent(&self, other: &Quantity) -> bool {
        match other.convert_to(self.ucum_code()) {
            Some(converted) => {
                let scale = self.value.scale().min(converted.value.scale());
                self.value.round_dp(scale) == converted.value.round_dp(scale)
            }
            None => false,
        }
    }

    /// Sum of two quantities in the left operand's unit
    pub fn add(&self, other: &Quantity) -> Option<Quantity> {
        let converted = other.convert_to(self.ucum_code())?;
        Some(Quantity::new(self.value.checked_add(converted.value)?, self.unit.clone()))
    }

    /// Difference of two quantities in the left operand's unit
    pub fn sub(&self, other: &Quantity) -> Option<Quantity> {
        let converted = other.convert_to(self.ucum_code())?;
        Some(Quantity::new(self.value.checked_sub(converted.value)?, self.unit.clone()))
    }

    /// Scale by a plain number
    pub fn scale(&self, factor: Decimal) -> Option<Quantity> {
        Some(Quantity::new(self.value.checked_mul(factor)?, self.unit.clone()))
    }

    /// Product of two quantities; units are multiplied symbolically
    pub fn mul(&self, other: &Quantity) -> Option<Quantity> {
        let value = self.value.checked_mul(other.value)?;
        Some(Quantity::new(value, combine_units(self.ucum_code(), other.ucum_code(), '.')))
    }

    /// Quotient of two quantities; identical units cancel to unity
    pub fn div(&self, other: &Quantity) -> Option<Quantity> {
        if other.value.is_zero() {
            return None;
        }
        if let Some(converted) = other.convert_to(self.ucum_code()) {
            let value = self.value.checked_div(converted.value)?;
            return Some(Quantity::unitless(value));
        }
        let value = self.value.checked_div(other.value)?;
        Some(Quantity::new(value, combine_units(self.ucum_code(), other.ucum_code(), '/')))
    }
}

fn combine_units(left: &str, right: &str, op: char) -> String {
    match (left, right, op) {
        ("1", "1", _) => "1".to_string(),
        (l, "1", _) => l.to_string(),
        ("1", r, '.') => r.to_string(),
        (l, r, op) => format!("{l}{op}{r}"),
    }
}

/// Whether `unit` is a FHIRPath calendar duration keyword (`days`, `year`, ...)
pub fn is_calendar_keyword(unit: &str) -> bool {
    matches!(
        unit,
        "year"
            | "years"
            | "month"
            | "months"
            | "week"
            | "weeks"
            | "day"
            | "days"
            | "hour"
            | "hours"
            | "minute"
            | "minutes"
            | "second"
            | "seconds"
            | "millisecond"
            | "milliseconds"
    )
}

/// UCUM factors arrive as `f64`; only 15 significant digits survive that
fn exact(factor: f64) -> Option<Decimal> {
    Decimal::from_f64(factor)?.round_sf(15).map(|d| d.normalize())
}

fn is_variable_length(code: &str) -> bool {
    matches!(code, "a" | "mo")
}

/// Whether `unit` is a unit FHIRPath accepts in a quantity literal
pub fn is_valid_unit(unit: &str) -> bool {
    is_calendar_keyword(unit) || unit == "1" || octofhir_ucum::validate(unit).is_ok()
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_calendar_keyword() {
            write!(f, "{} {}", self.value, self.unit)
        } else {
            write!(f, "{} '{}'", self.value, self.unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn q(value: &str, unit: &str) -> Quantity {
        Quantity::new(Decimal::from_str(value).unwrap(), unit)
    }

    #[test]
    fn test_same_unit_compare() {
        assert_eq!(q("4", "g").partial_compare(&q("5", "g")), Some(Ordering::Less));
        assert_eq!(q("4", "g").equals(&q("4.0", "g")), Some(true));
    }

    #[test]
    fn test_ucum_conversion() {
        assert_eq!(q("4", "g").equals(&q("4000", "mg")), Some(true));
        assert_eq!(q("1", "m").partial_compare(&q("99", "cm")), Some(Ordering::Greater));
    }

    #[test]
    fn test_conversion_is_exact_both_ways() {
        assert_eq!(q("3", "g").convert_to("mg"), Some(q("3000", "mg")));
        assert_eq!(q("3000", "mg").convert_to("g"), Some(q("3", "g")));
        assert_eq!(q("3000", "mg").equals(&q("3", "g")), Some(true));
        assert_eq!(q("3", "g").equals(&q("3000", "mg")), Some(true));
        assert_eq!(q("2", "mg").add(&q("3", "g")), Some(q("3002", "mg")));
        assert_eq!(q("123456.789", "km").convert_to("mm"), Some(q("123456789000", "mm")));
    }

    #[test]
    fn test_incompatible_units() {
        assert_eq!(q("1", "g").partial_compare(&q("1", "m")), None);
    }

    #[test]
    fn test_calendar_keywords() {
        assert_eq!(q("7", "days").equals(&q("1", "week")), Some(true));
        assert_eq!(q("1", "year").equals(&q("1", "a")), None);
        assert_eq!(q("1", "second").equals(&q("1", "s")), Some(true));
    }

    #[test]
    fn test_display() {
        assert_eq!(q("5", "mg").to_string(), "5 'mg'");
        assert_eq!(q("3", "days").to_string(), "3 days");
    }
}
