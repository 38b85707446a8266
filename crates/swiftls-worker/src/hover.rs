//! Hover contents from cursor-info responses.
//!
//! The daemon reports documentation as XML and declarations as annotated
//! XML-ish markup. Both are rendered to markdown with a small tag scanner;
//! unknown tags are stripped, entities are unescaped, and nothing here can
//! fail. Worst case the hover shows plain text.

use lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind};

use swiftls_sourcekitd::{Value, Vocabulary};

/// Build hover contents from a cursor-info response. `None` when the cursor
/// did not resolve to a named entity.
pub fn hover_from_cursor_info(info: &Value, vocab: &Vocabulary) -> Option<Hover> {
    let keys = &vocab.keys;
    let name = info.get_str(keys.name)?;

    let mut value = format!("# {}\n", escape_markdown(name));
    if let Some(xml) = info.get_str(keys.doc_full_as_xml) {
        value.push_str(&xml_doc_to_markdown(xml));
    } else if let Some(decl) = info.get_str(keys.annotated_decl) {
        value.push_str(&annotated_decl_to_markdown(decl));
    }

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: None,
    })
}

/// Backslash-escape markdown metacharacters in a symbol name.
fn escape_markdown(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if matches!(ch, '\\' | '`' | '*' | '_' | '{' | '}' | '[' | ']' | '<' | '>' | '#') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Render the daemon's XML documentation to markdown.
fn xml_doc_to_markdown(xml: &str) -> String {
    let mut out = String::new();
    let mut chars = xml.char_indices().peekable();
    // identity tags whose text is not prose
    let mut skip_depth = 0usize;

    while let Some((i, ch)) = chars.next() {
        if ch != '<' {
            if skip_depth == 0 {
                push_unescaped_from(&mut out, xml, i, &mut chars);
            }
            continue;
        }
        // collect the tag up to '>'
        let mut tag = String::new();
        for (_, t) in chars.by_ref() {
            if t == '>' {
                break;
            }
            tag.push(t);
        }
        let closing = tag.starts_with('/');
        let tag_name = tag
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match tag_name.as_str() {
            "name" | "usr" => {
                if closing {
                    skip_depth = skip_depth.saturating_sub(1);
                } else {
                    skip_depth += 1;
                }
            }
            "declaration" | "codelisting" => {
                if closing {
                    out.push_str("\n```\n\n");
                } else {
                    out.push_str("```swift\n");
                }
            }
            "zcodelinenumbered" => {
                if closing {
                    out.push('\n');
                }
            }
            "para" | "abstract" | "discussion" => {
                if closing {
                    out.push_str("\n\n");
                }
            }
            "codevoice" => out.push('`'),
            _ => {}
        }
    }
    let trimmed = out.trim_end();
    let mut rendered = trimmed.to_string();
    if !rendered.is_empty() {
        rendered.push('\n');
    }
    rendered
}

/// Render an annotated declaration to a swift code block.
fn annotated_decl_to_markdown(decl: &str) -> String {
    let mut code = String::new();
    let mut chars = decl.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if ch == '<' {
            for (_, t) in chars.by_ref() {
                if t == '>' {
                    break;
                }
            }
        } else {
            push_unescaped_from(&mut code, decl, i, &mut chars);
        }
    }
    format!("```swift\n{}\n```\n", code.trim())
}

/// Append one character (or one unescaped entity) starting at byte `i`.
fn push_unescaped_from(
    out: &mut String,
    source: &str,
    i: usize,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) {
    let rest = &source[i..];
    if rest.starts_with('&') {
        for (entity, replacement) in [
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&amp;", '&'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ] {
            if rest.starts_with(entity) {
                out.push(replacement);
                for _ in 0..entity.len() - 1 {
                    chars.next();
                }
                return;
            }
        }
    }
    // `i` indexes the char the caller just consumed
    if let Some(ch) = rest.chars().next() {
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swiftls_test_utils::FakeService;

    fn markdown(hover: &Hover) -> &str {
        match &hover.contents {
            HoverContents::Markup(content) => &content.value,
            other => panic!("unexpected hover contents: {other:?}"),
        }
    }

    #[test]
    fn test_hover_requires_name() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        assert!(hover_from_cursor_info(&Value::dictionary([]), &vocab).is_none());
    }

    #[test]
    fn test_hover_name_is_escaped_but_readable() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let info = Value::dictionary([(keys.name, Value::string("foo(_:)"))]);
        let hover = hover_from_cursor_info(&info, &vocab).expect("hover");
        let text = markdown(&hover);
        assert!(text.starts_with("# foo("));
        assert!(text.contains("\\_"));
    }

    #[test]
    fn test_hover_renders_xml_doc() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let info = Value::dictionary([
            (keys.name, Value::string("greet()")),
            (
                keys.doc_full_as_xml,
                Value::string(
                    "<Function><Name>greet()</Name>\
                     <Declaration>func greet() -&gt; String</Declaration>\
                     <Abstract><Para>Says hello via <CodeVoice>print</CodeVoice>.</Para></Abstract>\
                     </Function>",
                ),
            ),
        ]);
        let hover = hover_from_cursor_info(&info, &vocab).expect("hover");
        let text = markdown(&hover);
        assert!(text.contains("```swift\nfunc greet() -> String\n```"));
        assert!(text.contains("`print`"));
        assert!(text.contains("Says hello"));
    }

    #[test]
    fn test_hover_falls_back_to_annotated_decl() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let info = Value::dictionary([
            (keys.name, Value::string("x")),
            (
                keys.annotated_decl,
                Value::string("<decl.var.global>let x: <ref.struct>Int</ref.struct></decl.var.global>"),
            ),
        ]);
        let hover = hover_from_cursor_info(&info, &vocab).expect("hover");
        let text = markdown(&hover);
        assert!(text.contains("```swift\nlet x: Int\n```"));
    }
}
