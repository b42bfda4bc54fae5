//! Dotted-quad IPv4 candidate scanning.
//!
//! `ipv4-scan` finds every substring of the form "1-3 digits, dot" repeated
//! three times and closed by 1-3 digits. No range check is applied to the
//! octets, so `999.999.999.999` is reported just like `8.8.8.8`: deciding
//! whether a candidate is a real, routable address is left to whoever
//! resolves it.
//!
//! ## Quick Start
//!
//! ```
//! use ipv4_scan::find_addresses;
//!
//! let found = find_addresses(b"ping 8.8.8.8 then 1.1.1.1 and 8.8.8.8 again");
//! assert_eq!(found.len(), 2);
//! assert!(found.contains("8.8.8.8"));
//! ```
//!
//! ## Byte ranges
//!
//! When the positions matter, [`Scanner::find_iter`] yields the byte range of
//! every candidate, duplicates included, in haystack order:
//!
//! ```
//! use ipv4_scan::Scanner;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = Scanner::new()?;
//! let data = b"from 10.0.0.1 to 10.0.0.2";
//! let ranges: Vec<_> = scanner.find_iter(data).collect();
//! assert_eq!(ranges, vec![5..13, 17..25]);
//! # Ok(())
//! # }
//! ```

use std::ops::Range;
use std::sync::OnceLock;

use indexmap::IndexSet;
use regex_automata::meta::{BuildError, Regex};

/// Four groups of one to three ASCII digits joined by dots.
///
/// The pattern has no anchors or boundary assertions: `1234.5.6.7` yields
/// `234.5.6.7` and `1.2.3.4.5` yields `1.2.3.4`.
pub const IPV4_PATTERN: &str = r"[0-9]{1,3}(?:\.[0-9]{1,3}){3}";

static DEFAULT_SCANNER: OnceLock<Scanner> = OnceLock::new();

/// A compiled IPv4 candidate scanner.
///
/// Scanners are cheap to share by reference and are meant to be built once
/// and reused for every line of input.
#[derive(Clone, Debug)]
pub struct Scanner {
    regex: Regex,
}

impl Scanner {
    /// Compile the dotted-quad pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex engine's build error. With the fixed pattern this
    /// only happens if the engine runs out of its configured size limits.
    pub fn new() -> Result<Scanner, BuildError> {
        let regex = Regex::new(IPV4_PATTERN)?;
        Ok(Scanner { regex })
    }

    /// Find every IPv4 candidate in a byte slice.
    ///
    /// Returns an iterator of byte ranges `[start, end)`, in the order they
    /// occur. Repeated addresses are reported once per occurrence.
    #[inline]
    pub fn find_iter<'a>(&'a self, haystack: &'a [u8]) -> impl Iterator<Item = Range<usize>> + 'a {
        self.regex.find_iter(haystack).map(|m| m.range())
    }

    /// Collect the distinct candidates found in `haystack`.
    ///
    /// The set keeps first-occurrence order, so iterating it visits
    /// addresses the way a reader of the line would meet them.
    pub fn addresses<'h>(&self, haystack: &'h [u8]) -> IndexSet<&'h str> {
        self.find_iter(haystack)
            // Matches are pure ASCII digits and dots.
            .filter_map(|range| std::str::from_utf8(&haystack[range]).ok())
            .collect()
    }
}

/// Collect the distinct IPv4 candidates in `haystack` using a shared,
/// lazily compiled [`Scanner`].
///
/// Returns an empty set when the haystack holds no candidate.
pub fn find_addresses(haystack: &[u8]) -> IndexSet<&str> {
    default_scanner().addresses(haystack)
}

fn default_scanner() -> &'static Scanner {
    DEFAULT_SCANNER.get_or_init(|| Scanner::new().expect("dotted-quad pattern compiles"))
}
