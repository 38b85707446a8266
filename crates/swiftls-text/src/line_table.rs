//! Line table mapping byte offsets to line/column coordinates.

/// Index over the line structure of a UTF-8 string.
///
/// The table stores the byte offset of every line start; conversions walk at
/// most one line, so lookups are O(log lines + line length). Out-of-range
/// inputs, offsets inside a multi-byte character, and UTF-16 columns landing
/// inside a surrogate pair all yield `None` rather than an error. Whether
/// that is a client bug is the caller's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTable {
    /// Byte offset of the start of each line. Always non-empty; the first
    /// entry is 0.
    line_starts: Vec<usize>,
}

impl LineTable {
    /// Build a table for `text`. Lines are terminated by `\n`; a trailing
    /// `\r` is treated as line content for column purposes.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Number of lines, counting the line after a trailing newline.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte range of a line's content within `text`, excluding the trailing
    /// newline (and a preceding `\r`).
    fn content_range(&self, text: &str, line: u32) -> Option<(usize, usize)> {
        let line = line as usize;
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(text.len());
        let content = text.get(start..end)?;
        let content = content.strip_suffix('\n').unwrap_or(content);
        let content = content.strip_suffix('\r').unwrap_or(content);
        Some((start, start + content.len()))
    }

    /// Convert (line, UTF-16 column) to a UTF-8 byte offset.
    pub fn utf8_offset_of(&self, text: &str, line: u32, utf16_col: u32) -> Option<usize> {
        let (start, end) = self.content_range(text, line)?;
        let mut acc: u32 = 0;
        for (i, ch) in text[start..end].char_indices() {
            if acc == utf16_col {
                return Some(start + i);
            }
            if acc > utf16_col {
                // utf16_col landed inside a surrogate pair
                return None;
            }
            acc += ch.len_utf16() as u32;
        }
        (acc == utf16_col).then_some(end)
    }

    /// Convert a UTF-8 byte offset to (line, UTF-16 column).
    pub fn position_of_utf8_offset(&self, text: &str, offset: usize) -> Option<(u32, u32)> {
        if offset > text.len() || !text.is_char_boundary(offset) {
            return None;
        }
        let line = self.line_starts.partition_point(|&s| s <= offset) - 1;
        let start = self.line_starts[line];
        let col: usize = text[start..offset].chars().map(|c| c.len_utf16()).sum();
        Some((line as u32, col as u32))
    }

    /// Convert (line, UTF-8 column) to a UTF-16 column on the same line.
    pub fn utf16_col_of(&self, text: &str, line: u32, utf8_col: usize) -> Option<u32> {
        let (start, end) = self.content_range(text, line)?;
        if utf8_col > end - start || !text.is_char_boundary(start + utf8_col) {
            return None;
        }
        let col: usize = text[start..start + utf8_col]
            .chars()
            .map(|c| c.len_utf16())
            .sum();
        Some(col as u32)
    }
}
