//! Semantic refactoring: action discovery and categorized-edit translation.

use std::collections::HashMap;

use lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, Command, Position, Range,
    TextDocumentIdentifier, TextEdit, Uri, WorkspaceEdit,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use swiftls_sourcekitd::{Value, Vocabulary};
use swiftls_text::Snapshot;

/// The one command this worker executes.
pub const SEMANTIC_REFACTOR_COMMAND: &str = "swiftls.semantic.refactor.command";

/// Arguments round-tripped through the client for a refactor command.
///
/// `action_uid` is opaque and valid only within this server instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticRefactorCommand {
    pub title: String,
    pub action_uid: u64,
    pub position: Position,
    pub text_document: TextDocumentIdentifier,
}

/// Translate cursor-info refactor actions into code actions carrying the
/// semantic-refactor command.
pub fn refactor_actions(
    cursor_info: &Value,
    vocab: &Vocabulary,
    uri: &Uri,
    position: Position,
) -> Vec<CodeActionOrCommand> {
    let keys = &vocab.keys;
    let Some(actions) = cursor_info.get_array(keys.refactor_actions) else {
        return Vec::new();
    };

    actions
        .iter()
        .filter_map(|action| {
            let action_uid = action.get_uid(keys.actionuid)?;
            let title = action.get_str(keys.actionname)?.to_string();
            let command = SemanticRefactorCommand {
                title: title.clone(),
                action_uid: action_uid.to_raw(),
                position,
                text_document: TextDocumentIdentifier { uri: uri.clone() },
            };
            let arguments = match serde_json::to_value(&command) {
                Ok(value) => Some(vec![value]),
                Err(e) => {
                    warn!(error = %e, "failed to serialize refactor command");
                    return None;
                }
            };
            Some(CodeActionOrCommand::CodeAction(CodeAction {
                title: title.clone(),
                kind: Some(CodeActionKind::REFACTOR),
                diagnostics: None,
                edit: None,
                command: Some(Command {
                    title,
                    command: SEMANTIC_REFACTOR_COMMAND.to_string(),
                    arguments,
                }),
                is_preferred: None,
                disabled: None,
                data: None,
            }))
        })
        .collect()
}

/// Translate a semantic-refactoring response's categorized edits into a
/// workspace edit against the command's document. Malformed edits are
/// dropped.
pub fn workspace_edit_from_response(
    response: &Value,
    vocab: &Vocabulary,
    snapshot: &Snapshot,
) -> WorkspaceEdit {
    let keys = &vocab.keys;
    let mut edits = Vec::new();
    for category in response.get_array(keys.categorizededits).unwrap_or(&[]) {
        for edit in category.get_array(keys.edits).unwrap_or(&[]) {
            let range = (|| {
                let start = position_from_line_column(
                    edit.get_usize(keys.line)?,
                    edit.get_usize(keys.column)?,
                    snapshot,
                )?;
                let end = position_from_line_column(
                    edit.get_usize(keys.endline)?,
                    edit.get_usize(keys.endcolumn)?,
                    snapshot,
                )?;
                Some(Range { start, end })
            })();
            let Some(range) = range else {
                warn!("dropping refactoring edit with unresolvable range");
                continue;
            };
            edits.push(TextEdit {
                range,
                new_text: edit.get_str(keys.text).unwrap_or("").to_string(),
            });
        }
    }

    let mut changes = HashMap::new();
    changes.insert(snapshot.uri().clone(), edits);
    WorkspaceEdit {
        changes: Some(changes),
        ..Default::default()
    }
}

/// Convert the daemon's 1-based (line, UTF-8 column) into an LSP position.
fn position_from_line_column(line: usize, column: usize, snapshot: &Snapshot) -> Option<Position> {
    let line = u32::try_from(line.checked_sub(1)?).ok()?;
    let character = snapshot.utf16_col_of(line, column.checked_sub(1)?)?;
    Some(Position { line, character })
}
