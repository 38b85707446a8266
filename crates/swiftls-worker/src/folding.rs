//! Folding ranges from the syntax map and the substructure tree.

use lsp_types::{FoldingRange, FoldingRangeKind};

use swiftls_sourcekitd::{Value, Vocabulary};
use swiftls_text::Snapshot;

/// Client folding preferences captured at initialize time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldingPrefs {
    /// The client only uses line numbers; keep the closing line visible and
    /// drop ranges that collapse to a single line.
    pub line_folding_only: bool,
    /// Maximum number of ranges the client will accept.
    pub range_limit: Option<u32>,
}

/// Build folding ranges from a syntactic open response.
///
/// Two sources: runs of adjacent comment tokens in the syntax map, and every
/// substructure node with a non-empty body. Emission stops at the client's
/// range limit; the result is deterministically sorted.
pub fn folding_ranges(
    response: &Value,
    vocab: &Vocabulary,
    snapshot: &Snapshot,
    prefs: &FoldingPrefs,
) -> Vec<FoldingRange> {
    let keys = &vocab.keys;
    let mut out = Vec::new();

    if let Some(tokens) = response.get_array(keys.syntaxmap) {
        let mut run: Option<(usize, usize)> = None;
        for token in tokens {
            let comment = token.get_uid(keys.kind).is_some_and(|uid| {
                uid == vocab.kinds.syntaxtype_comment
                    || uid == vocab.kinds.syntaxtype_doccomment
                    || uid == vocab.kinds.syntaxtype_comment_marker
                    || uid == vocab.kinds.syntaxtype_comment_url
            });
            let span = token
                .get_usize(keys.offset)
                .zip(token.get_usize(keys.length));
            match (comment, span) {
                (true, Some((offset, length))) => {
                    run = Some(match run.take() {
                        // a comment token starting exactly at the end of the
                        // previous one extends the run
                        Some((start, end)) if offset == end => (start, offset + length),
                        Some((start, end)) => {
                            push_range(
                                &mut out,
                                snapshot,
                                start,
                                end,
                                Some(FoldingRangeKind::Comment),
                                prefs,
                            );
                            (offset, offset + length)
                        }
                        None => (offset, offset + length),
                    });
                }
                _ => {
                    if let Some((start, end)) = run.take() {
                        push_range(
                            &mut out,
                            snapshot,
                            start,
                            end,
                            Some(FoldingRangeKind::Comment),
                            prefs,
                        );
                    }
                }
            }
        }
        if let Some((start, end)) = run {
            push_range(
                &mut out,
                snapshot,
                start,
                end,
                Some(FoldingRangeKind::Comment),
                prefs,
            );
        }
    }

    if let Some(nodes) = response.get_array(keys.substructure) {
        fold_substructure(nodes, vocab, snapshot, prefs, &mut out);
    }

    out.sort_by_key(|r| {
        (
            r.start_line,
            r.start_character.unwrap_or(0),
            r.end_line,
            r.end_character.unwrap_or(0),
        )
    });
    out
}

fn fold_substructure(
    nodes: &[Value],
    vocab: &Vocabulary,
    snapshot: &Snapshot,
    prefs: &FoldingPrefs,
    out: &mut Vec<FoldingRange>,
) {
    let keys = &vocab.keys;
    for node in nodes {
        if let (Some(offset), Some(length)) = (
            node.get_usize(keys.bodyoffset),
            node.get_usize(keys.bodylength),
        ) {
            if length > 0 {
                push_range(out, snapshot, offset, offset + length, None, prefs);
            }
        }
        if let Some(children) = node.get_array(keys.substructure) {
            fold_substructure(children, vocab, snapshot, prefs, out);
        }
    }
}

fn push_range(
    out: &mut Vec<FoldingRange>,
    snapshot: &Snapshot,
    start_offset: usize,
    end_offset: usize,
    kind: Option<FoldingRangeKind>,
    prefs: &FoldingPrefs,
) {
    if let Some(limit) = prefs.range_limit {
        if out.len() >= limit as usize {
            return;
        }
    }
    let Some(start) = snapshot.position_of_utf8_offset(start_offset) else {
        return;
    };
    let Some(end) = snapshot.position_of_utf8_offset(end_offset) else {
        return;
    };

    if prefs.line_folding_only {
        // keep the closing line visible
        let Some(end_line) = end.line.checked_sub(1) else {
            return;
        };
        if end_line <= start.line {
            return;
        }
        out.push(FoldingRange {
            start_line: start.line,
            start_character: None,
            end_line,
            end_character: None,
            kind,
            collapsed_text: None,
        });
    } else {
        out.push(FoldingRange {
            start_line: start.line,
            start_character: Some(start.character),
            end_line: end.line,
            end_character: Some(end.character),
            kind,
            collapsed_text: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swiftls_test_utils::FakeService;

    fn snapshot(text: &str) -> Snapshot {
        let mut mgr = swiftls_text::DocumentManager::new();
        let snap = mgr.open("file:///a.swift".parse().expect("uri"), 1, text.into());
        (*snap).clone()
    }

    #[test]
    fn test_adjacent_comment_tokens_collapse() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let text = "// a\n// b\n// c\nlet x = 1\n";
        let snap = snapshot(text);

        // three comment tokens, each including its trailing newline
        let comment = |offset: i64, length: i64| {
            Value::dictionary([
                (keys.kind, Value::Uid(vocab.kinds.syntaxtype_comment)),
                (keys.offset, Value::Int(offset)),
                (keys.length, Value::Int(length)),
            ])
        };
        let keyword = Value::dictionary([
            (keys.kind, Value::Uid(vocab.kinds.syntaxtype_keyword)),
            (keys.offset, Value::Int(15)),
            (keys.length, Value::Int(3)),
        ]);
        let response = Value::dictionary([(
            keys.syntaxmap,
            Value::Array(vec![comment(0, 5), comment(5, 5), comment(10, 5), keyword]),
        )]);

        let ranges = folding_ranges(&response, &vocab, &snap, &FoldingPrefs::default());
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_line, 0);
        assert_eq!(ranges[0].end_line, 3);
        assert_eq!(ranges[0].kind, Some(FoldingRangeKind::Comment));
    }

    #[test]
    fn test_line_folding_only_drops_single_line_ranges() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        // lines 0..7; comment spans lines 2-5, brace block entirely on line 7
        let text = "let a = 1\nlet b = 2\n/* c\n   c\n   c\n*/\nlet d = 3\nfunc e() { f() }\n";
        let snap = snapshot(text);

        let comment_start = text.find("/*").expect("comment");
        let comment_end = text.find("*/").expect("comment") + 2;
        let body_start = text.rfind('{').expect("brace") + 1;
        let body_end = text.rfind('}').expect("brace");

        let response = Value::dictionary([
            (
                keys.syntaxmap,
                Value::Array(vec![Value::dictionary([
                    (keys.kind, Value::Uid(vocab.kinds.syntaxtype_comment)),
                    (keys.offset, Value::Int(comment_start as i64)),
                    (
                        keys.length,
                        Value::Int((comment_end - comment_start) as i64),
                    ),
                ])]),
            ),
            (
                keys.substructure,
                Value::Array(vec![Value::dictionary([
                    (keys.kind, Value::Uid(vocab.kinds.decl_function_free)),
                    (keys.bodyoffset, Value::Int(body_start as i64)),
                    (keys.bodylength, Value::Int((body_end - body_start) as i64)),
                ])]),
            ),
        ]);

        let prefs = FoldingPrefs {
            line_folding_only: true,
            range_limit: None,
        };
        let ranges = folding_ranges(&response, &vocab, &snap, &prefs);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_line, 2);
        assert_eq!(ranges[0].end_line, 4);
        assert_eq!(ranges[0].kind, Some(FoldingRangeKind::Comment));
        assert_eq!(ranges[0].start_character, None);
    }

    #[test]
    fn test_range_limit_stops_emission() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let text = "a {\n}\nb {\n}\nc {\n}\n";
        let snap = snapshot(text);

        let node = |offset: i64, length: i64| {
            Value::dictionary([
                (keys.bodyoffset, Value::Int(offset)),
                (keys.bodylength, Value::Int(length)),
            ])
        };
        let response = Value::dictionary([(
            keys.substructure,
            Value::Array(vec![node(3, 1), node(9, 1), node(15, 1)]),
        )]);

        let prefs = FoldingPrefs {
            line_folding_only: false,
            range_limit: Some(2),
        };
        let ranges = folding_ranges(&response, &vocab, &snap, &prefs);
        assert_eq!(ranges.len(), 2);
    }
}
