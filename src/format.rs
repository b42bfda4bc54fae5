//! Rendering of geolocation records as bracketed annotations.

use std::fmt;

use crate::error::{Error, Result};
use crate::locator::GeoRecord;

/// How much of a record to show. Each level includes the previous ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    #[default]
    Continent = 0,
    Country = 1,
    City = 2,
    Coordinates = 3,
}

impl Verbosity {
    pub const MAX: u8 = Verbosity::Coordinates as u8;
}

impl TryFrom<u8> for Verbosity {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Verbosity::Continent),
            1 => Ok(Verbosity::Country),
            2 => Ok(Verbosity::City),
            3 => Ok(Verbosity::Coordinates),
            _ => Err(Error::invalid(
                "verbosity",
                level.to_string(),
                format!("must be between 0 and {}", Verbosity::MAX),
            )),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Formats [`GeoRecord`]s as `[continent | country | city | lat, long]`,
/// cut down to the configured verbosity.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocationFormatter {
    verbosity: Verbosity,
}

impl LocationFormatter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn format(&self, record: &GeoRecord) -> String {
        let mut out = String::with_capacity(64);
        out.push('[');
        out.push_str(text_or(&record.continent, "Unknown continent"));
        if self.verbosity >= Verbosity::Country {
            out.push_str(" | ");
            out.push_str(text_or(&record.country, "Unknown country"));
        }
        if self.verbosity >= Verbosity::City {
            out.push_str(" | ");
            out.push_str(text_or(&record.city, "Unknown city"));
        }
        if self.verbosity >= Verbosity::Coordinates {
            out.push_str(" | ");
            push_coordinate(&mut out, record.latitude, "Unknown latitude");
            out.push_str(", ");
            push_coordinate(&mut out, record.longitude, "Unknown longitude");
        }
        out.push(']');
        out
    }
}

fn text_or<'a>(value: &'a Option<String>, unknown: &'a str) -> &'a str {
    value.as_deref().unwrap_or(unknown)
}

// Shortest round-trip form, always with a fractional part: 40.0, -122.0574.
fn push_coordinate(out: &mut String, value: Option<f64>, unknown: &str) {
    match value {
        Some(v) if v.is_finite() => {
            let mut buffer = ryu::Buffer::new();
            out.push_str(buffer.format_finite(v));
        }
        _ => out.push_str(unknown),
    }
}
