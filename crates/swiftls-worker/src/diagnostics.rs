//! Diagnostic cache, merge rules, and daemon-to-LSP diagnostic translation.

use std::collections::HashMap;

use lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, CodeActionParams, Diagnostic,
    DiagnosticSeverity, Position, Range, TextEdit, Uri, WorkspaceEdit,
};
use tracing::warn;

use swiftls_sourcekitd::{Kinds, Uid, Value, Vocabulary};
use swiftls_text::Snapshot;

/// The compiler stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Sema,
}

impl Stage {
    pub fn from_uid(uid: Uid, kinds: &Kinds) -> Option<Self> {
        if uid == kinds.stage_parse {
            Some(Stage::Parse)
        } else if uid == kinds.stage_sema {
            Some(Stage::Sema)
        } else {
            None
        }
    }
}

/// A diagnostic as cached per document: the LSP diagnostic, its fix-its, and
/// the merge metadata.
#[derive(Debug, Clone)]
pub struct CachedDiagnostic {
    pub diagnostic: Diagnostic,
    pub fixits: Vec<TextEdit>,
    pub stage: Stage,
    pub is_fallback: bool,
}

/// Per-document diagnostic cache with stage-scoped merging.
#[derive(Debug, Default)]
pub struct DiagnosticCache {
    map: HashMap<String, Vec<CachedDiagnostic>>,
}

impl DiagnosticCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate `new` diagnostics for `uri` produced at `stage`.
    ///
    /// Old diagnostics of the same stage are replaced. Under fallback
    /// arguments, semantic results are withheld. Returns the merged list for
    /// publication.
    pub fn merge(
        &mut self,
        uri: &Uri,
        stage: Stage,
        is_fallback: bool,
        new: Vec<CachedDiagnostic>,
    ) -> Vec<Diagnostic> {
        let entry = self.map.entry(uri.as_str().to_string()).or_default();
        entry.retain(|d| d.stage != stage);
        entry.extend(
            new.into_iter()
                .filter(|d| !(is_fallback && d.stage == Stage::Sema)),
        );
        entry.iter().map(|d| d.diagnostic.clone()).collect()
    }

    /// Cached diagnostics for a URI, in publication order.
    pub fn cached(&self, uri: &Uri) -> &[CachedDiagnostic] {
        self.map.get(uri.as_str()).map_or(&[], Vec::as_slice)
    }

    /// Drop the cache entry for a URI. Idempotent.
    pub fn clear(&mut self, uri: &Uri) {
        self.map.remove(uri.as_str());
    }

    pub fn clear_all(&mut self) {
        self.map.clear();
    }
}

/// Translate the diagnostics of a daemon response.
///
/// Items missing expected keys are dropped; translation never fails as a
/// whole.
pub fn diagnostics_from_response(
    response: &Value,
    vocab: &Vocabulary,
    snapshot: &Snapshot,
    stage: Stage,
    is_fallback: bool,
) -> Vec<CachedDiagnostic> {
    let keys = &vocab.keys;
    let Some(items) = response.get_array(keys.diagnostics) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let severity = item
                .get_uid(keys.severity)
                .and_then(|uid| severity_from_uid(uid, &vocab.kinds));
            let stage = item
                .get_uid(keys.diagnostic_stage)
                .and_then(|uid| Stage::from_uid(uid, &vocab.kinds))
                .unwrap_or(stage);
            let Some(range) = diagnostic_range(item, vocab, snapshot) else {
                warn!("dropping diagnostic with unresolvable position");
                return None;
            };
            let message = item.get_str(keys.description)?.to_string();
            let fixits = item
                .get_array(keys.fixits)
                .map(|fixits| {
                    fixits
                        .iter()
                        .filter_map(|f| fixit_edit(f, vocab, snapshot))
                        .collect()
                })
                .unwrap_or_default();

            Some(CachedDiagnostic {
                diagnostic: Diagnostic {
                    range,
                    severity,
                    code: None,
                    code_description: None,
                    source: Some("sourcekitd".to_string()),
                    message,
                    related_information: None,
                    tags: None,
                    data: None,
                },
                fixits,
                stage,
                is_fallback,
            })
        })
        .collect()
}

fn severity_from_uid(uid: Uid, kinds: &Kinds) -> Option<DiagnosticSeverity> {
    if uid == kinds.severity_error {
        Some(DiagnosticSeverity::ERROR)
    } else if uid == kinds.severity_warning {
        Some(DiagnosticSeverity::WARNING)
    } else if uid == kinds.severity_note {
        Some(DiagnosticSeverity::INFORMATION)
    } else {
        None
    }
}

/// Resolve a diagnostic's range: an explicit range if the daemon gave one, a
/// zero-length range at the reported offset, or a zero-length range at the
/// reported 1-based line/column.
fn diagnostic_range(item: &Value, vocab: &Vocabulary, snapshot: &Snapshot) -> Option<Range> {
    let keys = &vocab.keys;

    if let Some(first) = item.get_array(keys.ranges).and_then(<[Value]>::first) {
        if let (Some(offset), Some(length)) =
            (first.get_usize(keys.offset), first.get_usize(keys.length))
        {
            if let (Some(start), Some(end)) = (
                snapshot.position_of_utf8_offset(offset),
                snapshot.position_of_utf8_offset(offset + length),
            ) {
                return Some(Range { start, end });
            }
        }
    }

    if let Some(offset) = item.get_usize(keys.offset) {
        let position = snapshot.position_of_utf8_offset(offset)?;
        return Some(Range {
            start: position,
            end: position,
        });
    }

    let line = u32::try_from(item.get_usize(keys.line)?).ok()?.checked_sub(1)?;
    let column = item.get_usize(keys.column)?.checked_sub(1)?;
    let character = snapshot.utf16_col_of(line, column)?;
    let position = Position { line, character };
    Some(Range {
        start: position,
        end: position,
    })
}

fn fixit_edit(fixit: &Value, vocab: &Vocabulary, snapshot: &Snapshot) -> Option<TextEdit> {
    let keys = &vocab.keys;
    let offset = fixit.get_usize(keys.offset)?;
    let length = fixit.get_usize(keys.length)?;
    let new_text = fixit.get_str(keys.sourcetext)?.to_string();
    let start = snapshot.position_of_utf8_offset(offset)?;
    let end = snapshot.position_of_utf8_offset(offset + length)?;
    Some(TextEdit {
        range: Range { start, end },
        new_text,
    })
}

/// Range overlap where zero-length ranges participate: an empty range
/// `[p, p)` overlaps `[lo, hi)` iff `lo <= p < hi`, and two empty ranges
/// overlap iff their points coincide.
pub fn ranges_overlap_including_empty(a: &Range, b: &Range) -> bool {
    let a_empty = a.start == a.end;
    let b_empty = b.start == b.end;
    match (a_empty, b_empty) {
        (true, true) => a.start == b.start,
        (true, false) => b.start <= a.start && a.start < b.end,
        (false, true) => a.start <= b.start && b.start < a.end,
        (false, false) => a.start < b.end && b.start < a.end,
    }
}

/// Structural equality on the fields a client echoes back in
/// `context.diagnostics`.
pub fn diagnostics_structurally_equal(a: &Diagnostic, b: &Diagnostic) -> bool {
    a.range == b.range
        && a.severity == b.severity
        && a.code == b.code
        && a.source == b.source
        && a.message == b.message
}

/// Quick-fix provider: one code action per fix-it of each cached diagnostic
/// that overlaps the request range and appears in the client's submitted
/// diagnostics. The diagnostic is moved onto the action without its fix-its.
pub fn quick_fixes(cached: &[CachedDiagnostic], params: &CodeActionParams) -> Vec<CodeActionOrCommand> {
    let mut actions = Vec::new();
    for entry in cached {
        if entry.fixits.is_empty() {
            continue;
        }
        if !ranges_overlap_including_empty(&entry.diagnostic.range, &params.range) {
            continue;
        }
        let submitted = params
            .context
            .diagnostics
            .iter()
            .any(|d| diagnostics_structurally_equal(d, &entry.diagnostic));
        if !submitted {
            continue;
        }
        for fixit in &entry.fixits {
            let mut changes = HashMap::new();
            changes.insert(params.text_document.uri.clone(), vec![fixit.clone()]);
            actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                title: format!("Fix: {}", entry.diagnostic.message),
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![entry.diagnostic.clone()]),
                edit: Some(WorkspaceEdit {
                    changes: Some(changes),
                    ..Default::default()
                }),
                command: None,
                is_preferred: None,
                disabled: None,
                data: None,
            }));
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().expect("valid uri")
    }

    fn diag(message: &str, line: u32) -> Diagnostic {
        Diagnostic {
            range: Range {
                start: Position::new(line, 0),
                end: Position::new(line, 1),
            },
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some("sourcekitd".to_string()),
            message: message.to_string(),
            ..Default::default()
        }
    }

    fn cached(message: &str, line: u32, stage: Stage) -> CachedDiagnostic {
        CachedDiagnostic {
            diagnostic: diag(message, line),
            fixits: Vec::new(),
            stage,
            is_fallback: false,
        }
    }

    #[test]
    fn test_merge_replaces_same_stage() {
        let mut cache = DiagnosticCache::new();
        let u = uri("file:///a.swift");
        cache.merge(&u, Stage::Parse, false, vec![cached("old parse", 0, Stage::Parse)]);
        cache.merge(&u, Stage::Sema, false, vec![cached("sema", 1, Stage::Sema)]);
        let merged = cache.merge(&u, Stage::Parse, false, vec![cached("new parse", 2, Stage::Parse)]);

        let messages: Vec<_> = merged.iter().map(|d| d.message.as_str()).collect();
        assert!(messages.contains(&"new parse"));
        assert!(messages.contains(&"sema"));
        assert!(!messages.contains(&"old parse"));
    }

    #[test]
    fn test_merge_fallback_withholds_sema() {
        let mut cache = DiagnosticCache::new();
        let u = uri("file:///a.swift");
        let merged = cache.merge(
            &u,
            Stage::Sema,
            true,
            vec![cached("sema under fallback", 0, Stage::Sema)],
        );
        assert!(merged.is_empty());

        let merged = cache.merge(&u, Stage::Parse, true, vec![cached("parse", 1, Stage::Parse)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].message, "parse");
    }

    #[test]
    fn test_merge_clear_on_close() {
        let mut cache = DiagnosticCache::new();
        let u = uri("file:///a.swift");
        cache.merge(&u, Stage::Parse, false, vec![cached("x", 0, Stage::Parse)]);
        cache.clear(&u);
        assert!(cache.cached(&u).is_empty());
        cache.clear(&u);
    }

    fn range(start: (u32, u32), end: (u32, u32)) -> Range {
        Range {
            start: Position::new(start.0, start.1),
            end: Position::new(end.0, end.1),
        }
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let cases = [
            (range((0, 0), (0, 0)), range((0, 0), (0, 5))),
            (range((0, 2), (0, 4)), range((0, 3), (0, 9))),
            (range((1, 0), (1, 0)), range((1, 0), (1, 0))),
            (range((0, 0), (0, 1)), range((2, 0), (2, 1))),
        ];
        for (a, b) in cases {
            assert_eq!(
                ranges_overlap_including_empty(&a, &b),
                ranges_overlap_including_empty(&b, &a),
            );
        }
    }

    #[test]
    fn test_overlap_empty_range_rules() {
        let nonempty = range((0, 2), (0, 6));
        // lo <= p < hi
        assert!(ranges_overlap_including_empty(&range((0, 2), (0, 2)), &nonempty));
        assert!(ranges_overlap_including_empty(&range((0, 4), (0, 4)), &nonempty));
        assert!(!ranges_overlap_including_empty(&range((0, 6), (0, 6)), &nonempty));
        assert!(!ranges_overlap_including_empty(&range((0, 1), (0, 1)), &nonempty));
        // empty/empty: points must coincide
        assert!(ranges_overlap_including_empty(
            &range((3, 1), (3, 1)),
            &range((3, 1), (3, 1))
        ));
        assert!(!ranges_overlap_including_empty(
            &range((3, 1), (3, 1)),
            &range((3, 2), (3, 2))
        ));
    }

    #[test]
    fn test_structural_equality_ignores_extras() {
        let a = diag("msg", 0);
        let mut b = diag("msg", 0);
        b.data = Some(serde_json::json!({"x": 1}));
        assert!(diagnostics_structurally_equal(&a, &b));

        let mut c = diag("msg", 0);
        c.message = "other".to_string();
        assert!(!diagnostics_structurally_equal(&a, &c));
    }
}
