use std::cmp::Reverse;
use std::collections::VecDeque;

use super::PatternSet;

/// Index of an automaton state; states live in flat arrays, never in nodes
pub type StateId = u32;

/// Initial state
pub const ROOT: StateId = 0;

/// Marks a trie edge that does not exist yet; gone once the build finishes
const UNSET: StateId = StateId::MAX;

const ALPHABET: usize = 256;

/// Multi-pattern automaton with every failure transition pre-resolved.
///
/// `goto` is one flat `num_states * 256` table, so a scan step is one lookup
/// and the whole structure is plain integer arrays. Each state keeps its depth
/// in the trie and a slice of output pattern ids: the patterns spelled by the
/// state itself, followed by those reachable along its failure chain, longest
/// first. Every output carries its own id so end offsets can be turned into
/// start offsets with that pattern's own length.
#[derive(Debug, Clone)]
pub struct Automaton {
    goto: Vec<StateId>,
    depth: Vec<u16>,
    out_start: Vec<u32>,
    out_len: Vec<u32>,
    out_ids: Vec<u32>,
    pattern_lens: Vec<u16>,
    max_pattern_len: usize,
}

impl Automaton {
    pub fn build(set: &PatternSet) -> Self {
        let pattern_lens: Vec<u16> = set.iter().map(|p| p.len() as u16).collect();

        let mut goto = vec![UNSET; ALPHABET];
        let mut depth: Vec<u16> = vec![0];
        let mut outputs: Vec<Vec<u32>> = vec![Vec::new()];

        for pattern in set.iter() {
            let mut state = ROOT;
            for &b in &pattern.bytes {
                let slot = state as usize * ALPHABET + b as usize;
                state = match goto[slot] {
                    UNSET => {
                        let next = depth.len() as StateId;
                        goto[slot] = next;
                        goto.resize(goto.len() + ALPHABET, UNSET);
                        depth.push(depth[state as usize] + 1);
                        outputs.push(Vec::new());
                        next
                    }
                    next => next,
                };
            }
            outputs[state as usize].push(pattern.id);
        }

        // Breadth-first, so a state's failure target (always shallower) has a
        // fully resolved row before the state itself is visited.
        let mut fail = vec![ROOT; depth.len()];
        let mut queue = VecDeque::new();
        for slot in goto.iter_mut().take(ALPHABET) {
            match *slot {
                UNSET => *slot = ROOT,
                child => queue.push_back(child),
            }
        }

        while let Some(state) = queue.pop_front() {
            let row = state as usize * ALPHABET;
            let fail_row = fail[state as usize] as usize * ALPHABET;
            for b in 0..ALPHABET {
                match goto[row + b] {
                    UNSET => goto[row + b] = goto[fail_row + b],
                    child => {
                        let target = goto[fail_row + b];
                        fail[child as usize] = target;
                        let inherited = outputs[target as usize].clone();
                        outputs[child as usize].extend(inherited);
                        queue.push_back(child);
                    }
                }
            }
        }

        let mut out_start = Vec::with_capacity(outputs.len());
        let mut out_len = Vec::with_capacity(outputs.len());
        let mut out_ids = Vec::new();
        for ids in &mut outputs {
            ids.sort_by_key(|&id| Reverse(pattern_lens[id as usize]));
            out_start.push(out_ids.len() as u32);
            out_len.push(ids.len() as u32);
            out_ids.extend_from_slice(ids);
        }

        Self {
            goto,
            depth,
            out_start,
            out_len,
            out_ids,
            pattern_lens,
            max_pattern_len: set.max_len(),
        }
    }

    pub fn num_states(&self) -> usize {
        self.depth.len()
    }

    pub fn max_pattern_len(&self) -> usize {
        self.max_pattern_len
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_lens.len()
    }

    /// The flat transition table, `num_states * 256` entries
    pub fn table(&self) -> &[StateId] {
        &self.goto
    }

    #[inline]
    pub fn step(&self, state: StateId, byte: u8) -> StateId {
        self.goto[state as usize * ALPHABET + byte as usize]
    }

    #[inline]
    pub fn depth(&self, state: StateId) -> usize {
        self.depth[state as usize] as usize
    }

    /// Output pattern ids of `state`, longest pattern first
    #[inline]
    pub fn outputs(&self, state: StateId) -> &[u32] {
        let start = self.out_start[state as usize] as usize;
        &self.out_ids[start..start + self.out_len[state as usize] as usize]
    }

    #[inline]
    pub fn pattern_len(&self, id: u32) -> usize {
        self.pattern_lens[id as usize] as usize
    }

    /// Walks from `start` and reports `(end, id)` for every pattern that
    /// begins exactly at `start`. The walk ends as soon as a lookup lands on a
    /// state that is not one level deeper, meaning no pattern continues the
    /// bytes read so far, and never runs longer than the longest pattern.
    ///
    /// Patterns that only end inside the walk belong to later starts, which
    /// is what keeps independent walks from reporting anything twice.
    pub fn walk_from(&self, window: &[u8], start: usize, mut emit: impl FnMut(usize, u32)) {
        let mut state = ROOT;
        for (steps, &b) in window[start..].iter().enumerate() {
            let next = self.step(state, b);
            let depth = steps + 1;
            if self.depth(next) != depth {
                return;
            }
            state = next;
            for &id in self.outputs(state) {
                if self.pattern_len(id) != depth {
                    break;
                }
                emit(start + depth, id);
            }
        }
    }

    /// Single streaming pass reporting `(end, id)` for every occurrence
    pub fn scan_stream(&self, haystack: &[u8], mut emit: impl FnMut(usize, u32)) {
        let mut state = ROOT;
        for (i, &b) in haystack.iter().enumerate() {
            state = self.step(state, b);
            for &id in self.outputs(state) {
                emit(i + 1, id);
            }
        }
    }
}
