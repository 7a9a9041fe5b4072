//! Byte-offset to line/column conversion.

use coil_ir::SourcePosition;
use text_size::TextSize;

/// Precomputed line-start table for one source file.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Index a source text.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset as u32 + 1);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to a 0-based line/column pair.
    #[must_use]
    pub fn position(&self, offset: TextSize) -> SourcePosition {
        let offset = u32::from(offset);
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        SourcePosition::new(line as u32, offset - self.line_starts[line])
    }
}
