//! Document symbols and symbol details from daemon responses.

use lsp_types::{DocumentSymbol, Range, SymbolKind};
use serde::{Deserialize, Serialize};

use swiftls_sourcekitd::{Kinds, Uid, Value, Vocabulary};
use swiftls_text::Snapshot;

/// Map a declaration kind UID to an LSP symbol kind.
pub fn symbol_kind_for(uid: Uid, kinds: &Kinds) -> Option<SymbolKind> {
    if uid == kinds.decl_class {
        Some(SymbolKind::CLASS)
    } else if uid == kinds.decl_struct {
        Some(SymbolKind::STRUCT)
    } else if uid == kinds.decl_enum {
        Some(SymbolKind::ENUM)
    } else if uid == kinds.decl_enumelement {
        Some(SymbolKind::ENUM_MEMBER)
    } else if uid == kinds.decl_protocol {
        Some(SymbolKind::INTERFACE)
    } else if uid == kinds.decl_function_free {
        Some(SymbolKind::FUNCTION)
    } else if uid == kinds.decl_method_instance
        || uid == kinds.decl_method_static
        || uid == kinds.decl_method_class
    {
        Some(SymbolKind::METHOD)
    } else if uid == kinds.decl_var_instance
        || uid == kinds.decl_var_static
        || uid == kinds.decl_var_class
    {
        Some(SymbolKind::PROPERTY)
    } else if uid == kinds.decl_var_global || uid == kinds.decl_var_local {
        Some(SymbolKind::VARIABLE)
    } else if uid == kinds.decl_generic_type_param {
        Some(SymbolKind::TYPE_PARAMETER)
    } else if uid == kinds.decl_extension {
        Some(SymbolKind::NAMESPACE)
    } else {
        None
    }
}

/// Build the document-symbol tree from a syntactic open response.
///
/// Nodes with an unmapped kind or no name are skipped; their children are
/// spliced into the parent's list.
pub fn document_symbols(
    response: &Value,
    vocab: &Vocabulary,
    snapshot: &Snapshot,
) -> Vec<DocumentSymbol> {
    response
        .get_array(vocab.keys.substructure)
        .map(|items| symbols_from_nodes(items, vocab, snapshot))
        .unwrap_or_default()
}

fn symbols_from_nodes(
    nodes: &[Value],
    vocab: &Vocabulary,
    snapshot: &Snapshot,
) -> Vec<DocumentSymbol> {
    let mut out = Vec::new();
    for node in nodes {
        push_node(node, vocab, snapshot, &mut out);
    }
    out
}

#[allow(deprecated)]
fn push_node(node: &Value, vocab: &Vocabulary, snapshot: &Snapshot, out: &mut Vec<DocumentSymbol>) {
    let keys = &vocab.keys;
    let children = node
        .get_array(keys.substructure)
        .map(|items| symbols_from_nodes(items, vocab, snapshot))
        .unwrap_or_default();

    let kind = node
        .get_uid(keys.kind)
        .and_then(|uid| symbol_kind_for(uid, &vocab.kinds));
    let name = node.get_str(keys.name);
    let range = subrange(node, keys.offset, keys.length, snapshot);

    match (kind, name, range) {
        (Some(kind), Some(name), Some(range)) => {
            let selection_range =
                subrange(node, keys.nameoffset, keys.namelength, snapshot).unwrap_or(range);
            out.push(DocumentSymbol {
                name: name.to_string(),
                detail: node.get_str(keys.typename).map(String::from),
                kind,
                tags: None,
                deprecated: None,
                range,
                selection_range,
                children: (!children.is_empty()).then_some(children),
            });
        }
        _ => out.extend(children),
    }
}

fn subrange(node: &Value, offset_key: Uid, length_key: Uid, snapshot: &Snapshot) -> Option<Range> {
    let offset = node.get_usize(offset_key)?;
    let length = node.get_usize(length_key)?;
    let start = snapshot.position_of_utf8_offset(offset)?;
    let end = snapshot.position_of_utf8_offset(offset + length)?;
    Some(Range { start, end })
}

/// Symbol identity details for the symbol-info request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usr: Option<String>,
}

/// Extract symbol details from a cursor-info response; `None` when the
/// cursor resolved to nothing.
pub fn symbol_details(cursor_info: &Value, vocab: &Vocabulary) -> Option<SymbolDetails> {
    let keys = &vocab.keys;
    let name = cursor_info.get_str(keys.name).map(String::from);
    let usr = cursor_info.get_str(keys.usr).map(String::from);
    if name.is_none() && usr.is_none() {
        return None;
    }
    Some(SymbolDetails {
        name,
        container_name: None,
        usr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use swiftls_test_utils::FakeService;
    use swiftls_sourcekitd::CompilerService;

    fn snapshot(text: &str) -> Snapshot {
        let mut mgr = swiftls_text::DocumentManager::new();
        let snap = mgr.open("file:///a.swift".parse().expect("uri"), 1, text.into());
        (*snap).clone()
    }

    #[test]
    fn test_tree_with_unmapped_nodes_spliced() {
        let fake = FakeService::new();
        let vocab = *fake.vocabulary();
        let keys = vocab.keys;
        let text = "class A {\n  func m() {}\n}\n";
        let snap = snapshot(text);

        // class A (0..26) containing an unmapped node that wraps method m
        let method = Value::dictionary([
            (keys.kind, Value::Uid(vocab.kinds.decl_method_instance)),
            (keys.name, Value::string("m()")),
            (keys.offset, Value::Int(12)),
            (keys.length, Value::Int(11)),
            (keys.nameoffset, Value::Int(17)),
            (keys.namelength, Value::Int(3)),
        ]);
        let wrapper = Value::dictionary([
            (keys.kind, Value::Uid(fake.uid("source.lang.swift.expr.call"))),
            (keys.offset, Value::Int(12)),
            (keys.length, Value::Int(11)),
            (keys.substructure, Value::Array(vec![method])),
        ]);
        let class = Value::dictionary([
            (keys.kind, Value::Uid(vocab.kinds.decl_class)),
            (keys.name, Value::string("A")),
            (keys.offset, Value::Int(0)),
            (keys.length, Value::Int(text.len() as i64 - 1)),
            (keys.nameoffset, Value::Int(6)),
            (keys.namelength, Value::Int(1)),
            (keys.substructure, Value::Array(vec![wrapper])),
        ]);
        let response = Value::dictionary([(keys.substructure, Value::Array(vec![class]))]);

        let symbols = document_symbols(&response, &vocab, &snap);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "A");
        assert_eq!(symbols[0].kind, SymbolKind::CLASS);
        let children = symbols[0].children.as_ref().expect("children");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "m()");
        assert_eq!(children[0].kind, SymbolKind::METHOD);
        // selectionRange is the name subrange
        assert_eq!(children[0].selection_range.start.character, 7);
    }

    #[test]
    fn test_node_without_name_range_falls_back() {
        let fake = FakeService::new();
        let vocab = *fake.vocabulary();
        let keys = vocab.keys;
        let snap = snapshot("var x = 1\n");

        let node = Value::dictionary([
            (keys.kind, Value::Uid(vocab.kinds.decl_var_global)),
            (keys.name, Value::string("x")),
            (keys.offset, Value::Int(0)),
            (keys.length, Value::Int(9)),
        ]);
        let response = Value::dictionary([(keys.substructure, Value::Array(vec![node]))]);

        let symbols = document_symbols(&response, &vocab, &snap);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].range, symbols[0].selection_range);
    }

    #[test]
    fn test_symbol_details() {
        let fake = FakeService::new();
        let vocab = *fake.vocabulary();
        let keys = vocab.keys;

        let info = Value::dictionary([
            (keys.name, Value::string("foo()")),
            (keys.usr, Value::string("s:4main3fooyyF")),
        ]);
        let details = symbol_details(&info, &vocab).expect("details");
        assert_eq!(details.name.as_deref(), Some("foo()"));
        assert_eq!(details.usr.as_deref(), Some("s:4main3fooyyF"));

        assert!(symbol_details(&Value::dictionary([]), &vocab).is_none());
    }
}
