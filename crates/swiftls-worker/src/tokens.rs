//! Semantic token classification and delta encoding.

use lsp_types::{SemanticToken, SemanticTokenType, SemanticTokensLegend};

use swiftls_sourcekitd::{Kinds, Uid, Value, Vocabulary};
use swiftls_text::Snapshot;

/// Token types in legend order. Indices are part of the wire contract
/// reported at initialize time.
pub const TOKEN_TYPES: &[SemanticTokenType] = &[
    SemanticTokenType::KEYWORD,        // 0
    SemanticTokenType::NAMESPACE,      // 1
    SemanticTokenType::CLASS,          // 2
    SemanticTokenType::STRUCT,         // 3
    SemanticTokenType::ENUM,           // 4
    SemanticTokenType::INTERFACE,      // 5
    SemanticTokenType::TYPE_PARAMETER, // 6
    SemanticTokenType::FUNCTION,       // 7
    SemanticTokenType::OPERATOR,       // 8
    SemanticTokenType::PROPERTY,       // 9
    SemanticTokenType::VARIABLE,       // 10
    SemanticTokenType::PARAMETER,      // 11
    SemanticTokenType::TYPE,           // 12
];

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPES.to_vec(),
        token_modifiers: Vec::new(),
    }
}

/// Classify a kind UID into a legend index. Unknown kinds yield `None` and
/// the token is dropped before encoding.
fn token_type_index(uid: Uid, kinds: &Kinds) -> Option<u32> {
    if uid == kinds.syntaxtype_keyword || uid == kinds.keyword {
        Some(0)
    } else if uid == kinds.decl_module {
        Some(1)
    } else if uid == kinds.decl_class {
        Some(2)
    } else if uid == kinds.decl_struct {
        Some(3)
    } else if uid == kinds.decl_enum {
        Some(4)
    } else if uid == kinds.decl_protocol {
        Some(5)
    } else if uid == kinds.decl_associatedtype
        || uid == kinds.decl_typealias
        || uid == kinds.decl_generic_type_param
    {
        Some(6)
    } else if uid == kinds.decl_function_free
        || uid == kinds.decl_method_instance
        || uid == kinds.decl_method_static
        || uid == kinds.decl_method_class
    {
        Some(7)
    } else if uid == kinds.decl_operator_prefix
        || uid == kinds.decl_operator_infix
        || uid == kinds.decl_operator_postfix
    {
        Some(8)
    } else if uid == kinds.decl_var_static
        || uid == kinds.decl_var_class
        || uid == kinds.decl_var_instance
    {
        Some(9)
    } else if uid == kinds.decl_var_local || uid == kinds.decl_var_global {
        Some(10)
    } else if uid == kinds.decl_var_parameter {
        Some(11)
    } else if uid == kinds.syntaxtype_typeidentifier {
        Some(12)
    } else if is_reference(uid, kinds) {
        Some(10)
    } else {
        None
    }
}

fn is_reference(uid: Uid, kinds: &Kinds) -> bool {
    [
        kinds.ref_class,
        kinds.ref_struct,
        kinds.ref_enum,
        kinds.ref_enumelement,
        kinds.ref_protocol,
        kinds.ref_typealias,
        kinds.ref_associatedtype,
        kinds.ref_generic_type_param,
        kinds.ref_module,
        kinds.ref_function_free,
        kinds.ref_method_instance,
        kinds.ref_method_static,
        kinds.ref_method_class,
        kinds.ref_var_instance,
        kinds.ref_var_static,
        kinds.ref_var_class,
        kinds.ref_var_global,
        kinds.ref_var_local,
    ]
    .contains(&uid)
}

/// A classified token before encoding: line, UTF-16 start, UTF-16 length,
/// legend index.
pub type RawToken = (u32, u32, u32, u32);

/// Collect tokens from the syntax map and the annotation stream of a
/// syntactic open response, sorted by (line, start).
pub fn semantic_tokens(
    response: &Value,
    vocab: &Vocabulary,
    snapshot: &Snapshot,
) -> Vec<SemanticToken> {
    let keys = &vocab.keys;
    let mut raw: Vec<RawToken> = Vec::new();

    for source in [keys.syntaxmap, keys.annotations] {
        let Some(items) = response.get_array(source) else {
            continue;
        };
        for item in items {
            let Some(index) = item
                .get_uid(keys.kind)
                .and_then(|uid| token_type_index(uid, &vocab.kinds))
            else {
                continue;
            };
            let Some(offset) = item.get_usize(keys.offset) else {
                continue;
            };
            let Some(length) = item.get_usize(keys.length) else {
                continue;
            };
            let Some(start) = snapshot.position_of_utf8_offset(offset) else {
                continue;
            };
            let Some(end) = snapshot.position_of_utf8_offset(offset + length) else {
                continue;
            };
            if end.line != start.line {
                // tokens cannot span lines on the wire
                continue;
            }
            raw.push((
                start.line,
                start.character,
                end.character - start.character,
                index,
            ));
        }
    }

    raw.sort_by_key(|&(line, start, _, _)| (line, start));
    encode(&raw)
}

/// Delta-encode classified tokens into LSP 5-tuples. The character delta is
/// absolute whenever the line delta is non-zero.
pub fn encode(tokens: &[RawToken]) -> Vec<SemanticToken> {
    let mut data = Vec::with_capacity(tokens.len());
    let mut prev_line = 0;
    let mut prev_start = 0;
    for &(line, start, length, token_type) in tokens {
        let delta_line = line - prev_line;
        let delta_start = if delta_line == 0 {
            start - prev_start
        } else {
            start
        };
        data.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type,
            token_modifiers_bitset: 0,
        });
        prev_line = line;
        prev_start = start;
    }
    data
}
