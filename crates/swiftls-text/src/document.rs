//! Document snapshots and the in-memory document manager.

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::{Position, Range, TextDocumentContentChangeEvent, Uri};
use thiserror::Error;
use tracing::debug;

use crate::line_table::LineTable;

/// Errors from document-manager operations.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The URI has no open document.
    #[error("document not open: {0}")]
    NotOpen(String),

    /// An edit range does not resolve against the pre-edit snapshot.
    #[error("invalid edit range at {line}:{character}")]
    InvalidRange { line: u32, character: u32 },
}

/// An immutable view of a document at a specific version.
///
/// Consumers hold `Arc<Snapshot>` references; the manager replaces the stored
/// snapshot on each edit without invalidating outstanding ones.
#[derive(Debug, Clone)]
pub struct Snapshot {
    uri: Uri,
    version: i64,
    text: String,
    line_table: LineTable,
}

impl Snapshot {
    fn new(uri: Uri, version: i64, text: String) -> Self {
        let line_table = LineTable::new(&text);
        Self {
            uri,
            version,
            text,
            line_table,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_table(&self) -> &LineTable {
        &self.line_table
    }

    /// UTF-8 byte offset of an LSP position (UTF-16 columns).
    pub fn utf8_offset_of(&self, pos: Position) -> Option<usize> {
        self.line_table
            .utf8_offset_of(&self.text, pos.line, pos.character)
    }

    /// LSP position (UTF-16 columns) of a UTF-8 byte offset.
    pub fn position_of_utf8_offset(&self, offset: usize) -> Option<Position> {
        self.line_table
            .position_of_utf8_offset(&self.text, offset)
            .map(|(line, character)| Position { line, character })
    }

    /// UTF-16 column for a (line, UTF-8 column) coordinate.
    pub fn utf16_col_of(&self, line: u32, utf8_col: usize) -> Option<u32> {
        self.line_table.utf16_col_of(&self.text, line, utf8_col)
    }

    /// UTF-8 byte range of an LSP range.
    pub fn utf8_range_of(&self, range: Range) -> Option<std::ops::Range<usize>> {
        let lo = self.utf8_offset_of(range.start)?;
        let hi = self.utf8_offset_of(range.end)?;
        (lo <= hi).then(|| lo..hi)
    }
}

/// A single normalized text replacement in UTF-8 byte coordinates.
///
/// Full-document replacements are normalized to a replacement of the entire
/// previous text, which is also what the compiler service expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub offset: usize,
    pub length: usize,
    pub text: String,
}

/// In-memory store of the latest snapshot per open URI.
#[derive(Debug, Default)]
pub struct DocumentManager {
    docs: HashMap<String, Arc<Snapshot>>,
}

impl DocumentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document, replacing any existing snapshot for the URI.
    pub fn open(&mut self, uri: Uri, version: i64, text: String) -> Arc<Snapshot> {
        debug!(uri = uri.as_str(), version, "open document");
        let snapshot = Arc::new(Snapshot::new(uri.clone(), version, text));
        self.docs
            .insert(uri.as_str().to_string(), Arc::clone(&snapshot));
        snapshot
    }

    /// Close a document. Idempotent.
    pub fn close(&mut self, uri: &Uri) {
        debug!(uri = uri.as_str(), "close document");
        self.docs.remove(uri.as_str());
    }

    /// Latest snapshot for a URI, if open.
    pub fn latest_snapshot(&self, uri: &Uri) -> Option<Arc<Snapshot>> {
        self.docs.get(uri.as_str()).cloned()
    }

    /// Number of open documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Iterate over open snapshots.
    pub fn snapshots(&self) -> impl Iterator<Item = &Arc<Snapshot>> {
        self.docs.values()
    }

    /// Apply an ordered sequence of changes, producing the final snapshot.
    ///
    /// `before_each` is invoked once per change with the pre-edit snapshot and
    /// the normalized byte-coordinate edit, so the caller can mirror each
    /// change to the compiler service using the pre-edit line table. A
    /// malformed range aborts processing of the remaining changes.
    pub fn edit(
        &mut self,
        uri: &Uri,
        version: i64,
        changes: &[TextDocumentContentChangeEvent],
        mut before_each: impl FnMut(&Snapshot, &Edit),
    ) -> Result<Arc<Snapshot>, DocumentError> {
        let mut snapshot = self
            .latest_snapshot(uri)
            .ok_or_else(|| DocumentError::NotOpen(uri.as_str().to_string()))?;

        for change in changes {
            let edit = match change.range {
                Some(range) => {
                    let bytes =
                        snapshot
                            .utf8_range_of(range)
                            .ok_or(DocumentError::InvalidRange {
                                line: range.start.line,
                                character: range.start.character,
                            })?;
                    Edit {
                        offset: bytes.start,
                        length: bytes.end - bytes.start,
                        text: change.text.clone(),
                    }
                }
                None => Edit {
                    offset: 0,
                    length: snapshot.text().len(),
                    text: change.text.clone(),
                },
            };

            before_each(&snapshot, &edit);

            let old = snapshot.text();
            let mut text = String::with_capacity(old.len() - edit.length + edit.text.len());
            text.push_str(&old[..edit.offset]);
            text.push_str(&edit.text);
            text.push_str(&old[edit.offset + edit.length..]);

            snapshot = Arc::new(Snapshot::new(uri.clone(), version, text));
            self.docs
                .insert(uri.as_str().to_string(), Arc::clone(&snapshot));
        }

        Ok(snapshot)
    }
}
