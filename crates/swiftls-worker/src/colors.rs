//! Color literals: detection in the substructure and presentation edits.

use lsp_types::{Color, ColorInformation, ColorPresentation, Range, TextEdit};

use swiftls_sourcekitd::{Value, Vocabulary};
use swiftls_text::Snapshot;

/// Walk the substructure for `#colorLiteral` expressions.
pub fn color_literals(
    response: &Value,
    vocab: &Vocabulary,
    snapshot: &Snapshot,
) -> Vec<ColorInformation> {
    let mut out = Vec::new();
    if let Some(nodes) = response.get_array(vocab.keys.substructure) {
        walk(nodes, vocab, snapshot, &mut out);
    }
    out
}

fn walk(nodes: &[Value], vocab: &Vocabulary, snapshot: &Snapshot, out: &mut Vec<ColorInformation>) {
    let keys = &vocab.keys;
    for node in nodes {
        let is_color_literal = node.get_uid(keys.kind) == Some(vocab.kinds.expr_object_literal)
            && node.get_str(keys.name) == Some("colorLiteral");
        if is_color_literal {
            if let Some(info) = color_from_node(node, vocab, snapshot) {
                out.push(info);
            }
        }
        if let Some(children) = node.get_array(keys.substructure) {
            walk(children, vocab, snapshot, out);
        }
    }
}

fn color_from_node(node: &Value, vocab: &Vocabulary, snapshot: &Snapshot) -> Option<ColorInformation> {
    let keys = &vocab.keys;
    let offset = node.get_usize(keys.offset)?;
    let length = node.get_usize(keys.length)?;
    let start = snapshot.position_of_utf8_offset(offset)?;
    let end = snapshot.position_of_utf8_offset(offset + length)?;

    let arguments = node.get_array(keys.substructure)?;
    let component = |name: &str| -> Option<f32> {
        arguments
            .iter()
            .find(|arg| {
                arg.get_uid(keys.kind) == Some(vocab.kinds.expr_argument)
                    && arg.get_str(keys.name) == Some(name)
            })
            .and_then(|arg| {
                let offset = arg.get_usize(keys.bodyoffset)?;
                let length = arg.get_usize(keys.bodylength)?;
                snapshot.text().get(offset..offset + length)
            })
            .and_then(|body| body.trim().parse::<f32>().ok())
    };

    Some(ColorInformation {
        range: Range { start, end },
        color: Color {
            red: component("red")?,
            green: component("green")?,
            blue: component("blue")?,
            alpha: component("alpha")?,
        },
    })
}

/// Presentation for a picked color: a `#colorLiteral(...)` replacement.
pub fn presentations(color: &Color, range: Range) -> Vec<ColorPresentation> {
    let label = format!(
        "#colorLiteral(red: {}, green: {}, blue: {}, alpha: {})",
        color.red, color.green, color.blue, color.alpha
    );
    vec![ColorPresentation {
        label: label.clone(),
        text_edit: Some(TextEdit {
            range,
            new_text: label,
        }),
        additional_text_edits: None,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::Position;
    use swiftls_test_utils::FakeService;

    #[test]
    fn test_color_literal_extraction() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let text = "let c = #colorLiteral(red: 0.5, green: 0.25, blue: 1.0, alpha: 1.0)\n";
        let mut mgr = swiftls_text::DocumentManager::new();
        let snap = mgr.open("file:///a.swift".parse().expect("uri"), 1, text.into());

        let argument = |name: &str| {
            let needle = format!("{name}: ");
            let value_start = text.find(&needle).expect("argument") + needle.len();
            let value_end = text[value_start..]
                .find(|c: char| c == ',' || c == ')')
                .map(|i| value_start + i)
                .expect("terminator");
            Value::dictionary([
                (keys.kind, Value::Uid(vocab.kinds.expr_argument)),
                (keys.name, Value::string(name)),
                (keys.bodyoffset, Value::Int(value_start as i64)),
                (keys.bodylength, Value::Int((value_end - value_start) as i64)),
            ])
        };
        let literal_start = text.find('#').expect("literal");
        let literal_len = text.trim_end().len() - literal_start;
        let node = Value::dictionary([
            (keys.kind, Value::Uid(vocab.kinds.expr_object_literal)),
            (keys.name, Value::string("colorLiteral")),
            (keys.offset, Value::Int(literal_start as i64)),
            (keys.length, Value::Int(literal_len as i64)),
            (
                keys.substructure,
                Value::Array(vec![
                    argument("red"),
                    argument("green"),
                    argument("blue"),
                    argument("alpha"),
                ]),
            ),
        ]);
        let response = Value::dictionary([(keys.substructure, Value::Array(vec![node]))]);

        let colors = color_literals(&response, &vocab, &(*snap).clone());
        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0].color.red, 0.5);
        assert_eq!(colors[0].color.green, 0.25);
        assert_eq!(colors[0].color.blue, 1.0);
        assert_eq!(colors[0].color.alpha, 1.0);
        assert_eq!(colors[0].range.start.character, literal_start as u32);
    }

    #[test]
    fn test_missing_component_drops_literal() {
        let fake = FakeService::new();
        let vocab = fake.vocab();
        let keys = vocab.keys;
        let text = "#colorLiteral(red: 1)\n";
        let mut mgr = swiftls_text::DocumentManager::new();
        let snap = mgr.open("file:///a.swift".parse().expect("uri"), 1, text.into());

        let node = Value::dictionary([
            (keys.kind, Value::Uid(vocab.kinds.expr_object_literal)),
            (keys.name, Value::string("colorLiteral")),
            (keys.offset, Value::Int(0)),
            (keys.length, Value::Int(21)),
            (keys.substructure, Value::Array(vec![])),
        ]);
        let response = Value::dictionary([(keys.substructure, Value::Array(vec![node]))]);

        assert!(color_literals(&response, &vocab, &(*snap).clone()).is_empty());
    }

    #[test]
    fn test_presentation_label() {
        let range = Range {
            start: Position::new(0, 0),
            end: Position::new(0, 10),
        };
        let color = Color {
            red: 0.5,
            green: 0.25,
            blue: 1.0,
            alpha: 1.0,
        };
        let presentations = presentations(&color, range);
        assert_eq!(presentations.len(), 1);
        assert_eq!(
            presentations[0].label,
            "#colorLiteral(red: 0.5, green: 0.25, blue: 1, alpha: 1)"
        );
        assert_eq!(
            presentations[0].text_edit.as_ref().expect("edit").range,
            range
        );
    }
}
