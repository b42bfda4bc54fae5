//! Line by line annotation of IPv4 addresses.

use bstr::ByteSlice;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::Result;
use crate::format::LocationFormatter;
use crate::input::LineSource;
use crate::locator::GeoLocator;

/// Annotation used for addresses no locator knows about.
pub const NOT_FOUND_MESSAGE: &str = "[IP not found]";

/// Upper bound on cached annotations; later addresses are looked up every time.
pub const CACHE_LIMIT: usize = 100_000;

enum State {
    Active(LineSource),
    Exhausted,
}

/// Iterator yielding input lines with every located address followed by its
/// bracketed location.
///
/// Lines without addresses pass through unchanged. When an address cannot
/// be located it is tagged with [`NOT_FOUND_MESSAGE`] and the line is
/// returned right away, leaving any later addresses on it untouched.
///
/// Located addresses are cached per rewriter, up to [`CACHE_LIMIT`] entries.
/// Failed lookups are not cached, so the next occurrence asks the locators
/// again.
pub struct LineRewriter<'a, L> {
    state: State,
    locator: &'a L,
    formatter: LocationFormatter,
    highlight: bool,
    cache: FxHashMap<String, String>,
}

impl<'a, L: GeoLocator> LineRewriter<'a, L> {
    pub fn new(source: LineSource, locator: &'a L, formatter: LocationFormatter) -> Self {
        Self {
            state: State::Active(source),
            locator,
            formatter,
            highlight: false,
            cache: FxHashMap::with_capacity_and_hasher(1024, Default::default()),
        }
    }

    /// Wrap annotations in ANSI bold red.
    pub fn highlight(mut self, yes: bool) -> Self {
        self.highlight = yes;
        self
    }

    /// Annotate a single line.
    pub fn rewrite_line(&mut self, line: &[u8]) -> Vec<u8> {
        let addresses: Vec<String> = ipv4_scan::find_addresses(line)
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut out = line.to_vec();
        for address in addresses {
            match self.annotation(&address) {
                Some(annotation) => {
                    out = out.replace(&address, self.decorate(&address, &annotation));
                }
                None => {
                    out = out.replace(&address, self.decorate(&address, NOT_FOUND_MESSAGE));
                    return out;
                }
            }
        }
        out
    }

    fn annotation(&mut self, address: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(address) {
            return Some(cached.clone());
        }
        match self.locator.locate(address) {
            Ok(record) => {
                let annotation = self.formatter.format(&record);
                if self.cache.len() < CACHE_LIMIT {
                    self.cache.insert(address.to_string(), annotation.clone());
                }
                Some(annotation)
            }
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    fn decorate(&self, address: &str, annotation: &str) -> String {
        if self.highlight {
            format!("{address} \x1b[1;31m{annotation}\x1b[0;0m")
        } else {
            format!("{address} {annotation}")
        }
    }
}

impl<L: GeoLocator> Iterator for LineRewriter<'_, L> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let State::Active(source) = &mut self.state else {
            return None;
        };
        match source.next() {
            Some(Ok(line)) => Some(Ok(self.rewrite_line(&line))),
            Some(Err(e)) => {
                self.state = State::Exhausted;
                Some(Err(e.into()))
            }
            None => {
                self.state = State::Exhausted;
                None
            }
        }
    }
}
