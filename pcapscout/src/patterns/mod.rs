//! Pattern decoding, validation and compilation.
//!
//! Two compiled forms exist and the compiler picks one per pattern set:
//!
//! 1. **Horspool tables**: one bad-character table per pattern. Setup is
//!    nearly free, but every pattern costs a separate pass over the capture, so
//!    the total cost grows linearly with the number of patterns.
//! 2. **Automaton**: one shared failure-resolved automaton. Building it costs
//!    time proportional to the total pattern bytes, after which one pass
//!    handles every pattern at a constant amount of work per byte.
//!
//! Up to `pattern_count_threshold` patterns the first form wins; past that the
//! second does.

pub mod automaton;
pub mod horspool;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{PatternError, ScanResult};

pub use automaton::{Automaton, StateId, ROOT};
pub use horspool::{BadCharTable, HorspoolPattern};

/// Longest pattern accepted, in bytes
pub const MAX_PATTERN_LEN: usize = 512;

/// A validated, non-empty search pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Position in the pattern set
    pub id: u32,
    pub bytes: Vec<u8>,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An ordered set of validated patterns; ids are positions in the set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
    max_len: usize,
}

impl PatternSet {
    /// Builds a set from raw byte patterns. Empty patterns are dropped before
    /// ids are assigned.
    pub fn new<I, P>(raw: I) -> ScanResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let mut patterns = Vec::new();
        let mut dropped = 0;
        for bytes in raw.into_iter().map(Into::into) {
            if bytes.is_empty() {
                dropped += 1;
                continue;
            }
            if bytes.len() > MAX_PATTERN_LEN {
                return Err(PatternError::TooLong {
                    index: patterns.len() + dropped,
                    len: bytes.len(),
                    max: MAX_PATTERN_LEN,
                }
                .into());
            }
            patterns.push(Pattern {
                id: patterns.len() as u32,
                bytes,
            });
        }

        if dropped > 0 {
            warn!("Ignoring {} empty patterns", dropped);
        }
        if patterns.is_empty() {
            return Err(PatternError::EmptySet.into());
        }

        let max_len = patterns.iter().map(Pattern::len).max().unwrap_or(0);
        Ok(Self { patterns, max_len })
    }

    /// Builds a set from escape-coded strings, see [`unescape`]
    pub fn from_escaped<S: AsRef<str>>(raw: &[S]) -> ScanResult<Self> {
        Self::new(raw.iter().map(|s| unescape(s.as_ref())))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pattern> {
        self.patterns.iter()
    }

    pub fn get(&self, id: u32) -> Option<&Pattern> {
        self.patterns.get(id as usize)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Byte length of every pattern, indexed by id
    pub fn lengths(&self) -> Vec<usize> {
        self.patterns.iter().map(Pattern::len).collect()
    }
}

/// Decodes `\xHH`, `\n`, `\r` and `\t`. Any other escaped character stands for
/// itself, as does a backslash at the very end.
pub fn unescape(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(next) = chars.next() else {
            out.push(b'\\');
            break;
        };
        match next {
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'x' => {
                let mut lookahead = chars.clone();
                let hi = lookahead.next().and_then(|h| h.to_digit(16));
                let lo = lookahead.next().and_then(|l| l.to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        chars = lookahead;
                    }
                    _ => out.push(b'x'),
                }
            }
            other => out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes()),
        }
    }
    out
}

/// Requested compilation strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    /// Decide by pattern count
    #[default]
    Auto,
    /// Always build per-pattern Horspool tables
    Horspool,
    /// Always build the shared automaton
    Automaton,
}

/// Strategy actually compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Horspool,
    Automaton,
}

/// Output of the compiler
#[derive(Debug, Clone)]
pub enum CompiledPatterns {
    Horspool(Vec<HorspoolPattern>),
    Automaton(Automaton),
}

impl CompiledPatterns {
    pub fn strategy(&self) -> Strategy {
        match self {
            CompiledPatterns::Horspool(_) => Strategy::Horspool,
            CompiledPatterns::Automaton(_) => Strategy::Automaton,
        }
    }
}

/// Chooses and builds the compiled form of a pattern set
#[derive(Debug, Clone, Copy)]
pub struct PatternCompiler {
    threshold: usize,
    choice: StrategyChoice,
}

impl PatternCompiler {
    pub fn new(threshold: usize, choice: StrategyChoice) -> Self {
        Self { threshold, choice }
    }

    /// Strategy this compiler would use for `count` patterns
    pub fn select(&self, count: usize) -> Strategy {
        match self.choice {
            StrategyChoice::Horspool => Strategy::Horspool,
            StrategyChoice::Automaton => Strategy::Automaton,
            StrategyChoice::Auto if count <= self.threshold => Strategy::Horspool,
            StrategyChoice::Auto => Strategy::Automaton,
        }
    }

    pub fn compile(&self, set: &PatternSet) -> CompiledPatterns {
        let strategy = self.select(set.len());
        debug!(
            "Compiling {} patterns (threshold {}, {:?}) as {:?}",
            set.len(),
            self.threshold,
            self.choice,
            strategy
        );

        let compiled = match strategy {
            Strategy::Horspool => {
                CompiledPatterns::Horspool(set.iter().map(HorspoolPattern::new).collect())
            }
            Strategy::Automaton => CompiledPatterns::Automaton(Automaton::build(set)),
        };

        if let CompiledPatterns::Automaton(automaton) = &compiled {
            info!(
                "Built automaton with {} states for {} patterns",
                automaton.num_states(),
                set.len()
            );
        }
        compiled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ScanError;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("plain"), b"plain");
        assert_eq!(unescape(r"\x16\x03\x01"), vec![0x16, 0x03, 0x01]);
        assert_eq!(unescape(r"GET /\r\n"), b"GET /\r\n");
        assert_eq!(unescape(r"a\tb"), b"a\tb");
        assert_eq!(unescape(r"\xFFz"), vec![0xff, b'z']);
    }

    #[test]
    fn test_unescape_unrecognized() {
        assert_eq!(unescape(r"\q"), b"q");
        assert_eq!(unescape(r"\\"), b"\\");
        assert_eq!(unescape(r"end\"), b"end\\");
        assert_eq!(unescape(r"\xZ1"), b"xZ1");
        assert_eq!(unescape(r"\x4"), b"x4");
    }

    #[test]
    fn test_pattern_set_ids_skip_empty() {
        let set = PatternSet::from_escaped(&["abc", "", r"\x00\x01"]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().bytes, b"abc");
        assert_eq!(set.get(1).unwrap().bytes, vec![0, 1]);
        assert_eq!(set.max_len(), 3);
        assert_eq!(set.lengths(), vec![3, 2]);
    }

    #[test]
    fn test_pattern_set_errors() {
        let err = PatternSet::from_escaped(&["", ""]).unwrap_err();
        assert!(matches!(err, ScanError::Pattern(PatternError::EmptySet)));

        let long = vec![b'a'; MAX_PATTERN_LEN + 1];
        let err = PatternSet::new(vec![b"ok".to_vec(), long]).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Pattern(PatternError::TooLong { index: 1, len: 513, max: 512 })
        ));

        let exact = vec![b'a'; MAX_PATTERN_LEN];
        assert!(PatternSet::new(vec![exact]).is_ok());
    }

    #[test]
    fn test_strategy_selection() {
        let compiler = PatternCompiler::new(16, StrategyChoice::Auto);
        assert_eq!(compiler.select(1), Strategy::Horspool);
        assert_eq!(compiler.select(16), Strategy::Horspool);
        assert_eq!(compiler.select(17), Strategy::Automaton);

        let forced = PatternCompiler::new(16, StrategyChoice::Automaton);
        assert_eq!(forced.select(1), Strategy::Automaton);
        let forced = PatternCompiler::new(16, StrategyChoice::Horspool);
        assert_eq!(forced.select(100), Strategy::Horspool);
    }

    #[test]
    fn test_compile_produces_selected_form() {
        let set = PatternSet::from_escaped(&["AAAA", "ZZZZ"]).unwrap();
        let compiled = PatternCompiler::new(16, StrategyChoice::Auto).compile(&set);
        match compiled {
            CompiledPatterns::Horspool(tables) => {
                assert_eq!(tables.len(), 2);
                assert_eq!(tables[1].id(), 1);
            }
            CompiledPatterns::Automaton(_) => panic!("expected Horspool tables"),
        }

        let compiled = PatternCompiler::new(1, StrategyChoice::Auto).compile(&set);
        assert_eq!(compiled.strategy(), Strategy::Automaton);
    }
}
