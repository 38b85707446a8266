//! Completion item translation.

use lsp_types::{CompletionItem, CompletionItemKind, InsertTextFormat};

use swiftls_sourcekitd::{Kinds, Uid, Value, Vocabulary};

/// Translate a code-completion response into LSP completion items, capped at
/// `max` results.
pub fn completion_items(
    response: &Value,
    vocab: &Vocabulary,
    max: usize,
    snippet_support: bool,
) -> Vec<CompletionItem> {
    let keys = &vocab.keys;
    let Some(results) = response.get_array(keys.results) else {
        return Vec::new();
    };

    results
        .iter()
        .take(max)
        .filter_map(|item| {
            let label = item
                .get_str(keys.description)
                .or_else(|| item.get_str(keys.name))?
                .to_string();
            let kind = item
                .get_uid(keys.kind)
                .and_then(|uid| completion_kind(uid, &vocab.kinds));
            let (insert_text, insert_text_format) = match item.get_str(keys.sourcetext) {
                Some(sourcetext) => {
                    let (text, format) = rewrite_placeholders(sourcetext, snippet_support);
                    (Some(text), Some(format))
                }
                None => (None, None),
            };

            Some(CompletionItem {
                label,
                kind,
                detail: item.get_str(keys.typename).map(String::from),
                filter_text: item.get_str(keys.name).map(String::from),
                insert_text,
                insert_text_format,
                ..Default::default()
            })
        })
        .collect()
}

fn completion_kind(uid: Uid, kinds: &Kinds) -> Option<CompletionItemKind> {
    if uid == kinds.keyword || uid == kinds.syntaxtype_keyword {
        Some(CompletionItemKind::KEYWORD)
    } else if uid == kinds.decl_module {
        Some(CompletionItemKind::MODULE)
    } else if uid == kinds.decl_class {
        Some(CompletionItemKind::CLASS)
    } else if uid == kinds.decl_struct {
        Some(CompletionItemKind::STRUCT)
    } else if uid == kinds.decl_enum {
        Some(CompletionItemKind::ENUM)
    } else if uid == kinds.decl_enumelement {
        Some(CompletionItemKind::ENUM_MEMBER)
    } else if uid == kinds.decl_protocol {
        Some(CompletionItemKind::INTERFACE)
    } else if uid == kinds.decl_function_free {
        Some(CompletionItemKind::FUNCTION)
    } else if uid == kinds.decl_method_instance
        || uid == kinds.decl_method_static
        || uid == kinds.decl_method_class
    {
        Some(CompletionItemKind::METHOD)
    } else if uid == kinds.decl_operator_prefix
        || uid == kinds.decl_operator_infix
        || uid == kinds.decl_operator_postfix
    {
        Some(CompletionItemKind::OPERATOR)
    } else if uid == kinds.decl_var_instance
        || uid == kinds.decl_var_static
        || uid == kinds.decl_var_class
    {
        Some(CompletionItemKind::PROPERTY)
    } else if uid == kinds.decl_var_global
        || uid == kinds.decl_var_local
        || uid == kinds.decl_var_parameter
    {
        Some(CompletionItemKind::VARIABLE)
    } else if uid == kinds.decl_typealias
        || uid == kinds.decl_associatedtype
        || uid == kinds.decl_generic_type_param
    {
        Some(CompletionItemKind::TYPE_PARAMETER)
    } else {
        None
    }
}

/// Rewrite daemon placeholders (`<#T##display##type#>`) into LSP snippet
/// tab stops, or strip them to their display text for plain-text clients.
fn rewrite_placeholders(sourcetext: &str, snippet_support: bool) -> (String, InsertTextFormat) {
    if !sourcetext.contains("<#") {
        return (sourcetext.to_string(), InsertTextFormat::PLAIN_TEXT);
    }

    let mut out = String::with_capacity(sourcetext.len());
    let mut rest = sourcetext;
    let mut index = 0u32;
    while let Some(open) = rest.find("<#") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("#>") else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let inner = &after[..close];
        let inner = inner.strip_prefix("T##").unwrap_or(inner);
        let display = inner.split("##").next().unwrap_or(inner);
        if snippet_support {
            index += 1;
            out.push_str(&format!("${{{index}:{display}}}"));
        } else {
            out.push_str(display);
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);

    let format = if snippet_support {
        InsertTextFormat::SNIPPET
    } else {
        InsertTextFormat::PLAIN_TEXT
    };
    (out, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swiftls_test_utils::FakeService;

    #[test]
    fn test_placeholder_rewriting() {
        let (text, format) = rewrite_placeholders("foo(<#T##x: Int##Int#>)", true);
        assert_eq!(text, "foo(${1:x: Int})");
        assert_eq!(format, InsertTextFormat::SNIPPET);

        let (text, format) = rewrite_placeholders("foo(<#T##x: Int##Int#>)", false);
        assert_eq!(text, "foo(x: Int)");
        assert_eq!(format, InsertTextFormat::PLAIN_TEXT);

        let (text, format) = rewrite_placeholders("plain", true);
        assert_eq!(text, "plain");
        assert_eq!(format, InsertTextFormat::PLAIN_TEXT);
    }

    #[test]
    fn test_multiple_placeholders_number_sequentially() {
        let (text, _) = rewrite_placeholders("min(<#T##a: Int##Int#>, <#T##b: Int##Int#>)", true);
        assert_eq!(text, "min(${1:a: Int}, ${2:b: Int})");
    }

    #[test]
    fn test_items_from_response() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;

        let item = |name: &str, description: &str, kind| {
            Value::dictionary([
                (keys.name, Value::string(name)),
                (keys.description, Value::string(description)),
                (keys.sourcetext, Value::string(name)),
                (keys.typename, Value::string("Int")),
                (keys.kind, Value::Uid(kind)),
            ])
        };
        let response = Value::dictionary([(
            keys.results,
            Value::Array(vec![
                item("count", "count", vocab.kinds.decl_var_instance),
                item("map", "map(transform:)", vocab.kinds.decl_method_instance),
                Value::dictionary([]), // malformed: dropped
            ]),
        )]);

        let items = completion_items(&response, &vocab, 10, false);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "count");
        assert_eq!(items[0].kind, Some(CompletionItemKind::PROPERTY));
        assert_eq!(items[0].detail.as_deref(), Some("Int"));
        assert_eq!(items[1].kind, Some(CompletionItemKind::METHOD));
    }

    #[test]
    fn test_result_cap() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let results: Vec<Value> = (0..20)
            .map(|i| Value::dictionary([(keys.name, Value::string(format!("item{i}")))]))
            .collect();
        let response = Value::dictionary([(keys.results, Value::Array(results))]);
        assert_eq!(completion_items(&response, &vocab, 5, false).len(), 5);
    }
}
