//! Incremental breakpoint-map construction.
//!
//! The generator registers one record per lowered source statement, keeping
//! a *frontier*: the set of records an execution path may be at just before
//! reaching the next statement. Registering a record links every frontier
//! member to it and replaces the frontier with the new record. Structured
//! statements fork the frontier per branch and merge the branch exits back
//! together, so the successor graph mirrors the control flow of the source.

use coil_hir::LineIndex;
use coil_ir::{BreakpointEntry, BreakpointId, BreakpointMap, InstructionRange, SourceRange};
use text_size::TextRange;

#[derive(Debug)]
struct PendingRecord {
    span: TextRange,
    instructions: InstructionRange,
    successors: Vec<u32>,
}

#[derive(Debug, Default)]
pub(crate) struct BreakpointMapBuilder {
    records: Vec<PendingRecord>,
    frontier: Vec<u32>,
}

impl BreakpointMapBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a record for the instructions `[start, end)` lowered from
    /// `span`. Links the current frontier to it and makes it the sole
    /// frontier member. Statements without a span register nothing, leaving
    /// the frontier untouched so stepping skips them.
    pub(crate) fn register(
        &mut self,
        span: Option<TextRange>,
        start: usize,
        end: usize,
    ) -> Option<u32> {
        let span = span?;
        let id = self.records.len() as u32;
        for &from in &self.frontier {
            push_edge(&mut self.records[from as usize].successors, id);
        }
        self.records.push(PendingRecord {
            span,
            instructions: InstructionRange {
                start: start as u32,
                end: end as u32,
            },
            successors: Vec::new(),
        });
        self.frontier = vec![id];
        Some(id)
    }

    pub(crate) fn frontier(&self) -> Vec<u32> {
        self.frontier.clone()
    }

    pub(crate) fn set_frontier(&mut self, frontier: Vec<u32>) {
        self.frontier = frontier;
    }

    /// Merges several branch-exit frontiers into the current one.
    pub(crate) fn merge_frontiers(&mut self, exits: Vec<Vec<u32>>) {
        let mut merged = Vec::new();
        for exit in exits {
            for id in exit {
                if !merged.contains(&id) {
                    merged.push(id);
                }
            }
        }
        self.frontier = merged;
    }

    /// Adds explicit edges, used for loop back-edges.
    pub(crate) fn connect(&mut self, from: &[u32], to: u32) {
        for &id in from {
            push_edge(&mut self.records[id as usize].successors, to);
        }
    }

    pub(crate) fn next_id(&self) -> u32 {
        self.records.len() as u32
    }

    /// Resolves spans to line/column ranges and freezes the map. Without a
    /// line index there is nothing to resolve against, so no map is built.
    pub(crate) fn freeze(self, line_index: Option<&LineIndex>) -> Option<BreakpointMap> {
        let line_index = line_index?;
        let entries = self
            .records
            .into_iter()
            .map(|record| BreakpointEntry {
                source: SourceRange {
                    start: line_index.position(record.span.start()),
                    end: line_index.position(record.span.end()),
                },
                instructions: record.instructions,
                successors: record.successors.into_iter().map(BreakpointId).collect(),
            })
            .collect();
        Some(BreakpointMap::new(entries))
    }
}

fn push_edge(successors: &mut Vec<u32>, to: u32) {
    if !successors.contains(&to) {
        successors.push(to);
    }
}
