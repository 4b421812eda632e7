use std::ops::Range;

use super::Pattern;

/// Horspool bad-character shifts for one pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadCharTable {
    shifts: [u16; 256],
}

impl BadCharTable {
    /// Every byte shifts by the full length, except bytes occurring before the
    /// last position, which shift by their distance from the end. Later
    /// occurrences overwrite earlier ones, leaving the smallest shift.
    pub fn new(pattern: &[u8]) -> Self {
        let m = pattern.len();
        let mut shifts = [m as u16; 256];
        for (i, &b) in pattern.iter().enumerate().take(m.saturating_sub(1)) {
            shifts[b as usize] = (m - 1 - i) as u16;
        }
        Self { shifts }
    }

    /// Shift for a window whose last byte is `byte`, never below 1
    #[inline]
    pub fn shift(&self, byte: u8) -> usize {
        (self.shifts[byte as usize] as usize).max(1)
    }
}

/// A pattern paired with its shift table
#[derive(Debug, Clone)]
pub struct HorspoolPattern {
    id: u32,
    bytes: Vec<u8>,
    table: BadCharTable,
}

impl HorspoolPattern {
    pub fn new(pattern: &Pattern) -> Self {
        Self {
            id: pattern.id,
            bytes: pattern.bytes.clone(),
            table: BadCharTable::new(&pattern.bytes),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn table(&self) -> &BadCharTable {
        &self.table
    }

    /// Start positions in `window` at which a full occurrence can begin
    pub fn start_limit(&self, window: &[u8]) -> usize {
        (window.len() + 1).saturating_sub(self.len())
    }

    /// Runs Horspool over the start positions in `starts`, reading as far past
    /// `starts.end` as a full comparison needs. Reports each start offset at
    /// which the pattern occurs.
    ///
    /// After a full match the cursor moves by the bad-character shift of the
    /// window's last byte, the same as after a mismatch. That shift never steps
    /// over an occurrence, so overlapping occurrences are all reported.
    pub fn scan_range(&self, window: &[u8], starts: Range<usize>, mut emit: impl FnMut(usize)) {
        let m = self.len();
        let end = starts.end.min(self.start_limit(window));
        let mut i = starts.start;
        while i < end {
            let candidate = &window[i..i + m];
            if candidate.iter().rev().eq(self.bytes.iter().rev()) {
                emit(i);
            }
            i += self.table.shift(candidate[m - 1]);
        }
    }

    /// Every occurrence in `haystack`, in order
    pub fn find_all(&self, haystack: &[u8]) -> Vec<usize> {
        let mut found = Vec::new();
        self.scan_range(haystack, 0..haystack.len(), |at| found.push(at));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(bytes: &[u8]) -> HorspoolPattern {
        HorspoolPattern::new(&Pattern {
            id: 0,
            bytes: bytes.to_vec(),
        })
    }

    #[test]
    fn test_bad_char_table() {
        let table = BadCharTable::new(b"ABCAB");
        assert_eq!(table.shift(b'A'), 1);
        assert_eq!(table.shift(b'B'), 3);
        assert_eq!(table.shift(b'C'), 2);
        assert_eq!(table.shift(b'Z'), 5);
    }

    #[test]
    fn test_bad_char_table_single_byte() {
        let table = BadCharTable::new(b"x");
        assert_eq!(table.shift(b'x'), 1);
        assert_eq!(table.shift(b'y'), 1);
    }

    #[test]
    fn test_long_pattern_shift_is_exact() {
        let mut bytes = vec![b'a'; 400];
        bytes[0] = b'q';
        let table = BadCharTable::new(&bytes);
        assert_eq!(table.shift(b'q'), 399);
        assert_eq!(table.shift(b'z'), 400);
    }

    #[test]
    fn test_find_all() {
        let p = pattern(b"AAAA");
        assert_eq!(p.find_all(b"AAAABBBBCCCC"), vec![0]);
        assert_eq!(p.find_all(b"XXXXAAAAYYYY"), vec![4]);
        assert!(p.find_all(b"AAA").is_empty());
    }

    #[test]
    fn test_overlapping_occurrences() {
        let p = pattern(b"AA");
        assert_eq!(p.find_all(b"AAAA"), vec![0, 1, 2]);

        let p = pattern(b"ABAB");
        assert_eq!(p.find_all(b"ABABABAB"), vec![0, 2, 4]);
    }

    #[test]
    fn test_scan_range_only_reports_owned_starts() {
        let p = pattern(b"needle");
        let hay = b"needle..needle..needle";
        let mut found = Vec::new();
        p.scan_range(hay, 1..9, |at| found.push(at));
        assert_eq!(found, vec![8]);

        // Start owned by the range, bytes read past its end
        let mut found = Vec::new();
        p.scan_range(hay, 16..17, |at| found.push(at));
        assert_eq!(found, vec![16]);
    }

    #[test]
    fn test_split_ranges_cover_every_start() {
        let p = pattern(b"abcab");
        let hay = b"abcabcabcababcabxabcab";
        let whole = p.find_all(hay);

        let mut pieces = Vec::new();
        for chunk_start in (0..hay.len()).step_by(3) {
            p.scan_range(hay, chunk_start..chunk_start + 3, |at| pieces.push(at));
        }
        assert_eq!(pieces, whole);
    }
}
