//! Opaque UIDs and the resolved vocabulary.
//!
//! The daemon's protocol keys, request names, and kind taxonomy are all UIDs:
//! interned strings whose numeric identity is private to one loaded client
//! library. The vocabulary resolves every UID the worker uses exactly once,
//! at connection time; nothing above this layer touches a raw string or an
//! integer literal.

/// An opaque UID valid for one compiler-service connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(u64);

impl Uid {
    /// Wrap a raw UID produced by the client library (or a test interner).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// Protocol dictionary keys.
#[derive(Debug, Clone, Copy)]
pub struct Keys {
    pub request: Uid,
    pub name: Uid,
    pub sourcetext: Uid,
    pub sourcefile: Uid,
    pub offset: Uid,
    pub length: Uid,
    pub line: Uid,
    pub column: Uid,
    pub endline: Uid,
    pub endcolumn: Uid,
    pub compilerargs: Uid,
    pub syntactic_only: Uid,
    pub enable_syntaxmap: Uid,
    pub enable_substructure: Uid,
    pub retrieve_refactor_actions: Uid,
    pub notification: Uid,
    pub results: Uid,
    pub diagnostics: Uid,
    pub diagnostic_stage: Uid,
    pub severity: Uid,
    pub description: Uid,
    pub fixits: Uid,
    pub ranges: Uid,
    pub substructure: Uid,
    pub syntaxmap: Uid,
    pub annotations: Uid,
    pub kind: Uid,
    pub bodyoffset: Uid,
    pub bodylength: Uid,
    pub nameoffset: Uid,
    pub namelength: Uid,
    pub typename: Uid,
    pub annotated_decl: Uid,
    pub doc_full_as_xml: Uid,
    pub usr: Uid,
    pub refactor_actions: Uid,
    pub actionuid: Uid,
    pub actionname: Uid,
    pub categorizededits: Uid,
    pub edits: Uid,
    pub text: Uid,
}

/// Request names.
#[derive(Debug, Clone, Copy)]
pub struct Requests {
    pub editor_open: Uid,
    pub editor_close: Uid,
    pub editor_replacetext: Uid,
    pub relatedidents: Uid,
    pub cursor_info: Uid,
    pub codecomplete_open: Uid,
    pub codecomplete_close: Uid,
    pub semantic_refactoring: Uid,
    pub crash_exit: Uid,
}

/// Value UIDs: severities, stages, notification kinds, and the Swift kind
/// taxonomy consumed by the response translators.
#[derive(Debug, Clone, Copy)]
pub struct Kinds {
    pub severity_error: Uid,
    pub severity_warning: Uid,
    pub severity_note: Uid,
    pub stage_parse: Uid,
    pub stage_sema: Uid,
    pub note_sema_enabled: Uid,
    pub note_documentupdate: Uid,

    pub syntaxtype_keyword: Uid,
    pub syntaxtype_identifier: Uid,
    pub syntaxtype_typeidentifier: Uid,
    pub syntaxtype_comment: Uid,
    pub syntaxtype_doccomment: Uid,
    pub syntaxtype_comment_marker: Uid,
    pub syntaxtype_comment_url: Uid,

    pub decl_class: Uid,
    pub decl_struct: Uid,
    pub decl_enum: Uid,
    pub decl_enumelement: Uid,
    pub decl_protocol: Uid,
    pub decl_extension: Uid,
    pub decl_typealias: Uid,
    pub decl_associatedtype: Uid,
    pub decl_generic_type_param: Uid,
    pub decl_module: Uid,
    pub decl_function_free: Uid,
    pub decl_method_instance: Uid,
    pub decl_method_static: Uid,
    pub decl_method_class: Uid,
    pub decl_operator_prefix: Uid,
    pub decl_operator_infix: Uid,
    pub decl_operator_postfix: Uid,
    pub decl_var_instance: Uid,
    pub decl_var_static: Uid,
    pub decl_var_class: Uid,
    pub decl_var_global: Uid,
    pub decl_var_local: Uid,
    pub decl_var_parameter: Uid,

    pub ref_class: Uid,
    pub ref_struct: Uid,
    pub ref_enum: Uid,
    pub ref_enumelement: Uid,
    pub ref_protocol: Uid,
    pub ref_typealias: Uid,
    pub ref_associatedtype: Uid,
    pub ref_generic_type_param: Uid,
    pub ref_module: Uid,
    pub ref_function_free: Uid,
    pub ref_method_instance: Uid,
    pub ref_method_static: Uid,
    pub ref_method_class: Uid,
    pub ref_var_instance: Uid,
    pub ref_var_static: Uid,
    pub ref_var_class: Uid,
    pub ref_var_global: Uid,
    pub ref_var_local: Uid,

    pub expr_object_literal: Uid,
    pub expr_argument: Uid,

    pub keyword: Uid,
}

/// Every UID the worker uses, resolved once per connection.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    pub keys: Keys,
    pub requests: Requests,
    pub kinds: Kinds,
}

impl Vocabulary {
    /// Resolve the full vocabulary through an interner (the client library's
    /// UID intern function, or a test-side string table).
    pub fn resolve(mut intern: impl FnMut(&str) -> Uid) -> Self {
        Self {
            keys: Keys {
                request: intern("key.request"),
                name: intern("key.name"),
                sourcetext: intern("key.sourcetext"),
                sourcefile: intern("key.sourcefile"),
                offset: intern("key.offset"),
                length: intern("key.length"),
                line: intern("key.line"),
                column: intern("key.column"),
                endline: intern("key.endline"),
                endcolumn: intern("key.endcolumn"),
                compilerargs: intern("key.compilerargs"),
                syntactic_only: intern("key.syntactic_only"),
                enable_syntaxmap: intern("key.enablesyntaxmap"),
                enable_substructure: intern("key.enablesubstructure"),
                retrieve_refactor_actions: intern("key.retrieve_refactor_actions"),
                notification: intern("key.notification"),
                results: intern("key.results"),
                diagnostics: intern("key.diagnostics"),
                diagnostic_stage: intern("key.diagnostic_stage"),
                severity: intern("key.severity"),
                description: intern("key.description"),
                fixits: intern("key.fixits"),
                ranges: intern("key.ranges"),
                substructure: intern("key.substructure"),
                syntaxmap: intern("key.syntaxmap"),
                annotations: intern("key.annotations"),
                kind: intern("key.kind"),
                bodyoffset: intern("key.bodyoffset"),
                bodylength: intern("key.bodylength"),
                nameoffset: intern("key.nameoffset"),
                namelength: intern("key.namelength"),
                typename: intern("key.typename"),
                annotated_decl: intern("key.annotated_decl"),
                doc_full_as_xml: intern("key.doc.full_as_xml"),
                usr: intern("key.usr"),
                refactor_actions: intern("key.refactor_actions"),
                actionuid: intern("key.actionuid"),
                actionname: intern("key.actionname"),
                categorizededits: intern("key.categorizededits"),
                edits: intern("key.edits"),
                text: intern("key.text"),
            },
            requests: Requests {
                editor_open: intern("source.request.editor.open"),
                editor_close: intern("source.request.editor.close"),
                editor_replacetext: intern("source.request.editor.replacetext"),
                relatedidents: intern("source.request.relatedidents"),
                cursor_info: intern("source.request.cursorinfo"),
                codecomplete_open: intern("source.request.codecomplete.open"),
                codecomplete_close: intern("source.request.codecomplete.close"),
                semantic_refactoring: intern("source.request.semantic.refactoring"),
                crash_exit: intern("source.request.crash_exit"),
            },
            kinds: Kinds {
                severity_error: intern("source.diagnostic.severity.error"),
                severity_warning: intern("source.diagnostic.severity.warning"),
                severity_note: intern("source.diagnostic.severity.note"),
                stage_parse: intern("source.diagnostic.stage.swift.parse"),
                stage_sema: intern("source.diagnostic.stage.swift.sema"),
                note_sema_enabled: intern("source.notification.sema_enabled"),
                note_documentupdate: intern("source.notification.editor.documentupdate"),

                syntaxtype_keyword: intern("source.lang.swift.syntaxtype.keyword"),
                syntaxtype_identifier: intern("source.lang.swift.syntaxtype.identifier"),
                syntaxtype_typeidentifier: intern("source.lang.swift.syntaxtype.typeidentifier"),
                syntaxtype_comment: intern("source.lang.swift.syntaxtype.comment"),
                syntaxtype_doccomment: intern("source.lang.swift.syntaxtype.doccomment"),
                syntaxtype_comment_marker: intern("source.lang.swift.syntaxtype.comment.mark"),
                syntaxtype_comment_url: intern("source.lang.swift.syntaxtype.comment.url"),

                decl_class: intern("source.lang.swift.decl.class"),
                decl_struct: intern("source.lang.swift.decl.struct"),
                decl_enum: intern("source.lang.swift.decl.enum"),
                decl_enumelement: intern("source.lang.swift.decl.enumelement"),
                decl_protocol: intern("source.lang.swift.decl.protocol"),
                decl_extension: intern("source.lang.swift.decl.extension"),
                decl_typealias: intern("source.lang.swift.decl.typealias"),
                decl_associatedtype: intern("source.lang.swift.decl.associatedtype"),
                decl_generic_type_param: intern("source.lang.swift.decl.generic_type_param"),
                decl_module: intern("source.lang.swift.decl.module"),
                decl_function_free: intern("source.lang.swift.decl.function.free"),
                decl_method_instance: intern("source.lang.swift.decl.function.method.instance"),
                decl_method_static: intern("source.lang.swift.decl.function.method.static"),
                decl_method_class: intern("source.lang.swift.decl.function.method.class"),
                decl_operator_prefix: intern("source.lang.swift.decl.function.operator.prefix"),
                decl_operator_infix: intern("source.lang.swift.decl.function.operator.infix"),
                decl_operator_postfix: intern("source.lang.swift.decl.function.operator.postfix"),
                decl_var_instance: intern("source.lang.swift.decl.var.instance"),
                decl_var_static: intern("source.lang.swift.decl.var.static"),
                decl_var_class: intern("source.lang.swift.decl.var.class"),
                decl_var_global: intern("source.lang.swift.decl.var.global"),
                decl_var_local: intern("source.lang.swift.decl.var.local"),
                decl_var_parameter: intern("source.lang.swift.decl.var.parameter"),

                ref_class: intern("source.lang.swift.ref.class"),
                ref_struct: intern("source.lang.swift.ref.struct"),
                ref_enum: intern("source.lang.swift.ref.enum"),
                ref_enumelement: intern("source.lang.swift.ref.enumelement"),
                ref_protocol: intern("source.lang.swift.ref.protocol"),
                ref_typealias: intern("source.lang.swift.ref.typealias"),
                ref_associatedtype: intern("source.lang.swift.ref.associatedtype"),
                ref_generic_type_param: intern("source.lang.swift.ref.generic_type_param"),
                ref_module: intern("source.lang.swift.ref.module"),
                ref_function_free: intern("source.lang.swift.ref.function.free"),
                ref_method_instance: intern("source.lang.swift.ref.function.method.instance"),
                ref_method_static: intern("source.lang.swift.ref.function.method.static"),
                ref_method_class: intern("source.lang.swift.ref.function.method.class"),
                ref_var_instance: intern("source.lang.swift.ref.var.instance"),
                ref_var_static: intern("source.lang.swift.ref.var.static"),
                ref_var_class: intern("source.lang.swift.ref.var.class"),
                ref_var_global: intern("source.lang.swift.ref.var.global"),
                ref_var_local: intern("source.lang.swift.ref.var.local"),

                expr_object_literal: intern("source.lang.swift.expr.object_literal"),
                expr_argument: intern("source.lang.swift.expr.argument"),

                keyword: intern("source.lang.swift.keyword"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_resolve_interns_each_string_once() {
        let mut table: HashMap<String, u64> = HashMap::new();
        let mut next = 1u64;
        let mut calls = 0usize;
        let vocab = Vocabulary::resolve(|s| {
            calls += 1;
            let id = *table.entry(s.to_string()).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
            Uid::from_raw(id)
        });
        // every interned string was distinct
        assert_eq!(calls, table.len());
        // spot-check distinctness across namespaces
        assert_ne!(vocab.keys.request, vocab.requests.editor_open);
        assert_ne!(vocab.kinds.stage_parse, vocab.kinds.stage_sema);
    }
}
