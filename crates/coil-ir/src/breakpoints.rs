//! Breakpoint map: source ranges, instruction ranges and stepping edges.
//!
//! A breakpoint here is a logical source-statement boundary, not a user-set
//! debugger breakpoint. The map carries two sorted, non-overlapping range
//! indexes over shared records, plus a directed successor graph used for
//! step semantics.

#![allow(missing_docs)]

use rustc_hash::FxHashSet;

/// Line/column pair, both 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source-text range, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

/// Instruction-index range, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionRange {
    pub start: u32,
    pub end: u32,
}

/// Identifier of one breakpoint record within its map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointId(pub u32);

/// Construction input for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointEntry {
    pub source: SourceRange,
    pub instructions: InstructionRange,
    pub successors: Vec<BreakpointId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BreakpointRecord {
    source: SourceRange,
    instructions: InstructionRange,
    succ_start: u32,
    succ_len: u32,
}

/// Frozen, binary-searchable breakpoint map for one compiled POU.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BreakpointMap {
    records: Vec<BreakpointRecord>,
    /// Record ids sorted by source-range start.
    by_source: Vec<BreakpointId>,
    /// Record ids sorted by instruction-range start.
    by_instruction: Vec<BreakpointId>,
    /// All successor lists, flattened; each record slices into this.
    successors: Vec<BreakpointId>,
}

impl BreakpointMap {
    /// Freeze a list of records. Ids are the entry indices.
    #[must_use]
    pub fn new(entries: Vec<BreakpointEntry>) -> Self {
        let mut successors = Vec::new();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let succ_start = successors.len() as u32;
            let succ_len = entry.successors.len() as u32;
            successors.extend(entry.successors);
            records.push(BreakpointRecord {
                source: entry.source,
                instructions: entry.instructions,
                succ_start,
                succ_len,
            });
        }

        let mut by_source: Vec<BreakpointId> =
            (0..records.len() as u32).map(BreakpointId).collect();
        by_source.sort_by_key(|id| records[id.0 as usize].source.start);
        let mut by_instruction: Vec<BreakpointId> =
            (0..records.len() as u32).map(BreakpointId).collect();
        by_instruction.sort_by_key(|id| records[id.0 as usize].instructions.start);

        Self {
            records,
            by_source,
            by_instruction,
            successors,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All record ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = BreakpointId> + '_ {
        (0..self.records.len() as u32).map(BreakpointId)
    }

    #[must_use]
    pub fn source_range(&self, id: BreakpointId) -> SourceRange {
        self.records[id.0 as usize].source
    }

    #[must_use]
    pub fn instruction_range(&self, id: BreakpointId) -> InstructionRange {
        self.records[id.0 as usize].instructions
    }

    /// Direct stepping successors of a record.
    #[must_use]
    pub fn successors(&self, id: BreakpointId) -> &[BreakpointId] {
        let record = &self.records[id.0 as usize];
        let start = record.succ_start as usize;
        &self.successors[start..start + record.succ_len as usize]
    }

    /// Breakpoint covering a source position, with floor fallback.
    #[must_use]
    pub fn breakpoint_at_source(&self, line: u32, column: Option<u32>) -> Option<BreakpointId> {
        if let Some(column) = column {
            return self.floor_source(SourcePosition::new(line, column));
        }
        // With no column, prefer the first breakpoint starting on the line.
        let first_on_line = self
            .by_source
            .iter()
            .copied()
            .find(|id| self.records[id.0 as usize].source.start.line == line);
        first_on_line.or_else(|| self.floor_source(SourcePosition::new(line, 0)))
    }

    /// Breakpoint covering an instruction index, with floor fallback.
    #[must_use]
    pub fn breakpoint_at_instruction(&self, index: u32) -> Option<BreakpointId> {
        let slot = self
            .by_instruction
            .partition_point(|id| self.records[id.0 as usize].instructions.start <= index);
        if slot == 0 {
            return None;
        }
        let id = self.by_instruction[slot - 1];
        let range = self.records[id.0 as usize].instructions;
        let last = slot == self.by_instruction.len();
        if index < range.end || (last && index == range.end) {
            Some(id)
        } else {
            None
        }
    }

    /// Successors reachable through a same-line closure: intermediate
    /// records on the same source line are skipped so that one "step"
    /// lands on a different line.
    #[must_use]
    pub fn next_line_successors(&self, id: BreakpointId) -> Vec<BreakpointId> {
        let line = self.records[id.0 as usize].source.start.line;
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            for &succ in self.successors(current) {
                if !seen.insert(succ) {
                    continue;
                }
                if self.records[succ.0 as usize].source.start.line == line {
                    pending.push(succ);
                } else {
                    out.push(succ);
                }
            }
        }
        out
    }

    fn floor_source(&self, pos: SourcePosition) -> Option<BreakpointId> {
        let slot = self
            .by_source
            .partition_point(|id| self.records[id.0 as usize].source.start <= pos);
        if slot == 0 {
            return None;
        }
        let id = self.by_source[slot - 1];
        let range = self.records[id.0 as usize].source;
        let last = slot == self.by_source.len();
        if pos < range.end || (last && pos == range.end) {
            Some(id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> BreakpointMap {
        let entry = |sl, sc, el, ec, is, ie, succ: Vec<u32>| BreakpointEntry {
            source: SourceRange {
                start: SourcePosition::new(sl, sc),
                end: SourcePosition::new(el, ec),
            },
            instructions: InstructionRange { start: is, end: ie },
            successors: succ.into_iter().map(BreakpointId).collect(),
        };
        BreakpointMap::new(vec![
            entry(0, 0, 0, 10, 0, 3, vec![1]),
            entry(1, 4, 1, 12, 3, 7, vec![2]),
            entry(3, 0, 3, 8, 7, 9, vec![]),
        ])
    }

    #[test]
    fn floor_falls_back_inside_range() {
        let map = map();
        assert_eq!(map.breakpoint_at_instruction(4), Some(BreakpointId(1)));
        assert_eq!(map.breakpoint_at_instruction(3), Some(BreakpointId(1)));
        assert_eq!(map.breakpoint_at_source(1, Some(8)), Some(BreakpointId(1)));
    }

    #[test]
    fn final_range_is_end_inclusive() {
        let map = map();
        assert_eq!(map.breakpoint_at_instruction(9), Some(BreakpointId(2)));
        assert_eq!(map.breakpoint_at_instruction(10), None);
    }

    #[test]
    fn gap_between_ranges_misses() {
        let map = map();
        // Line 2 sits between the second and third source ranges.
        assert_eq!(map.breakpoint_at_source(2, Some(0)), None);
    }

    #[test]
    fn line_lookup_prefers_first_on_line() {
        let map = map();
        assert_eq!(map.breakpoint_at_source(1, None), Some(BreakpointId(1)));
        assert_eq!(map.breakpoint_at_source(3, None), Some(BreakpointId(2)));
    }
}
