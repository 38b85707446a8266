//! The Swift language service worker.
//!
//! All public operations are scheduled onto a single FIFO lane: one tokio
//! task owns every piece of mutable state (worker state, document manager,
//! compile commands, diagnostic cache) and drains a job queue. Awaiting a
//! daemon round-trip on the lane blocks the lane, which is the serialization
//! point; no mutex guards any of this.
//!
//! Crash recovery is a three-state machine. A connection-interrupted signal
//! moves the worker to `ConnectionInterrupted` and empties the document
//! manager; the next daemon message means the daemon restarted, so the
//! coordinator is asked to re-open documents while semantic functionality
//! stays disabled; the daemon's `sema_enabled` notification completes the
//! round trip back to `Connected`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lsp_types::*;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use swiftls_sourcekitd::{CompilerService, Notification, ServiceError, Uid, Value, Vocabulary};
use swiftls_text::{DocumentError, DocumentManager, Snapshot};
use swiftls_util::path::{pseudo_path, uri_from_document_name, uri_scheme};

use crate::colors;
use crate::completion;
use crate::config::WorkerConfig;
use crate::diagnostics::{self, DiagnosticCache, Stage};
use crate::error::{WorkerError, WorkerResult};
use crate::folding::{self, FoldingPrefs};
use crate::hover;
use crate::refactor::{self, SemanticRefactorCommand, SEMANTIC_REFACTOR_COMMAND};
use crate::symbols::{self, SymbolDetails};
use crate::tokens;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// The daemon is healthy.
    Connected,
    /// The daemon died; documents were dropped.
    ConnectionInterrupted,
    /// The daemon restarted; waiting for semantic warm-up.
    SemanticFunctionalityDisabled,
}

/// Compiler arguments as resolved by the build-settings provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub compiler_arguments: Vec<String>,
    pub working_directory: Option<String>,
}

/// A build-settings change delivered by the provider.
#[derive(Debug, Clone)]
pub enum BuildSettingsChange {
    /// Settings inferred without the real build system.
    Fallback(BuildSettings),
    /// Real settings, new or changed.
    Modified(BuildSettings),
    /// The provider no longer has settings for the document.
    RemovedOrUnavailable,
}

/// The compile command a document is currently open under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub argv: Vec<String>,
    pub is_fallback: bool,
}

impl CompileCommand {
    fn from_settings(settings: BuildSettings, is_fallback: bool) -> Self {
        let mut argv = settings.compiler_arguments;
        if let Some(dir) = settings.working_directory {
            if !argv.iter().any(|arg| arg == "-working-directory") {
                argv.push("-working-directory".to_string());
                argv.push(dir);
            }
        }
        Self { argv, is_fallback }
    }
}

/// Whether the worker owns a routed request or declines it so the router can
/// consult the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled<T> {
    Yes(T),
    Declined,
}

/// Upstream LSP coordinator, as seen from the worker.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Forward a `textDocument/publishDiagnostics` notification.
    fn publish_diagnostics(&self, uri: Uri, version: Option<i32>, diagnostics: Vec<Diagnostic>);

    /// Send `workspace/applyEdit` and await the client's verdict.
    async fn apply_edit(
        &self,
        label: Option<String>,
        edit: WorkspaceEdit,
    ) -> WorkerResult<ApplyWorkspaceEditResponse>;

    /// Re-open every document after the daemon restarted.
    async fn reopen_documents(&self);
}

type StateChangeHandler = Box<dyn Fn(WorkerState, WorkerState) + Send>;
type Reply<T> = oneshot::Sender<WorkerResult<T>>;

/// Lane jobs. One variant per public operation plus internal signals.
enum Job {
    Initialize {
        params: Box<InitializeParams>,
        reply: Reply<ServerCapabilities>,
    },
    ClientInitialized,
    Shutdown {
        reply: Reply<()>,
    },
    OpenDocument {
        params: DidOpenTextDocumentParams,
        reply: Reply<()>,
    },
    CloseDocument {
        params: DidCloseTextDocumentParams,
        reply: Reply<()>,
    },
    ChangeDocument {
        params: DidChangeTextDocumentParams,
        reply: Reply<()>,
    },
    WillSaveDocument {
        params: WillSaveTextDocumentParams,
    },
    DidSaveDocument {
        params: DidSaveTextDocumentParams,
    },
    BuildSettingsChanged {
        uri: Uri,
        change: BuildSettingsChange,
        reply: Reply<()>,
    },
    DependenciesUpdated {
        uri: Uri,
        reply: Reply<()>,
    },
    Completion {
        params: CompletionParams,
        reply: Reply<Option<CompletionResponse>>,
    },
    Hover {
        params: HoverParams,
        reply: Reply<Option<Hover>>,
    },
    SymbolInfo {
        params: TextDocumentPositionParams,
        reply: Reply<Vec<SymbolDetails>>,
    },
    Definition {
        reply: Reply<Handled<GotoDefinitionResponse>>,
    },
    DocumentHighlight {
        params: DocumentHighlightParams,
        reply: Reply<Option<Vec<DocumentHighlight>>>,
    },
    FoldingRanges {
        params: FoldingRangeParams,
        reply: Reply<Option<Vec<FoldingRange>>>,
    },
    DocumentSymbols {
        params: DocumentSymbolParams,
        reply: Reply<Option<DocumentSymbolResponse>>,
    },
    SemanticTokensFull {
        params: SemanticTokensParams,
        reply: Reply<Option<SemanticTokens>>,
    },
    DocumentColor {
        params: DocumentColorParams,
        reply: Reply<Vec<ColorInformation>>,
    },
    ColorPresentations {
        params: ColorPresentationParams,
        reply: Reply<Vec<ColorPresentation>>,
    },
    QuickFixActions {
        params: CodeActionParams,
        reply: Reply<Vec<CodeActionOrCommand>>,
    },
    RefactorActions {
        params: CodeActionParams,
        reply: Reply<Vec<CodeActionOrCommand>>,
    },
    ExecuteCommand {
        params: ExecuteCommandParams,
        reply: Reply<serde_json::Value>,
    },
    AddStateChangeHandler {
        handler: StateChangeHandler,
    },
    Crash,
    State {
        reply: Reply<WorkerState>,
    },
    DaemonNotification {
        note: Notification,
    },
}

/// The language worker handle. Cheap to clone; all operations are scheduled
/// onto the worker's lane in call order.
#[derive(Clone)]
pub struct SwiftWorker {
    lane: mpsc::UnboundedSender<Job>,
}

impl SwiftWorker {
    pub fn new(
        service: Arc<dyn CompilerService>,
        coordinator: Arc<dyn Coordinator>,
        config: WorkerConfig,
    ) -> Self {
        let (lane, mut jobs) = mpsc::unbounded_channel();

        // Route daemon notifications back onto the lane.
        let mut notifications = service.subscribe();
        let note_lane: mpsc::UnboundedSender<Job> = lane.clone();
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(note) => {
                        if note_lane.send(Job::DaemonNotification { note }).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "daemon notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut inner = Inner {
            service,
            coordinator,
            config,
            state: WorkerState::Connected,
            documents: DocumentManager::new(),
            commands: HashMap::new(),
            diagnostics: DiagnosticCache::new(),
            state_handlers: Vec::new(),
            completion_session: None,
            folding_prefs: FoldingPrefs::default(),
            snippet_support: false,
            code_action_literal_support: true,
        };
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                inner.run(job).await;
            }
            debug!("worker lane closed");
        });

        Self { lane }
    }

    fn post(&self, job: Job) -> WorkerResult<()> {
        self.lane
            .send(job)
            .map_err(|_| WorkerError::unknown("worker lane closed"))
    }

    async fn call<T>(&self, job: impl FnOnce(Reply<T>) -> Job) -> WorkerResult<T> {
        let (tx, rx) = oneshot::channel();
        self.post(job(tx))?;
        rx.await
            .map_err(|_| WorkerError::unknown("worker dropped the request"))?
    }

    pub async fn initialize(&self, params: InitializeParams) -> WorkerResult<ServerCapabilities> {
        self.call(|reply| Job::Initialize {
            params: Box::new(params),
            reply,
        })
        .await
    }

    pub fn client_initialized(&self) -> WorkerResult<()> {
        self.post(Job::ClientInitialized)
    }

    pub async fn shutdown(&self) -> WorkerResult<()> {
        self.call(|reply| Job::Shutdown { reply }).await
    }

    pub async fn open_document(&self, params: DidOpenTextDocumentParams) -> WorkerResult<()> {
        self.call(|reply| Job::OpenDocument { params, reply }).await
    }

    pub async fn close_document(&self, params: DidCloseTextDocumentParams) -> WorkerResult<()> {
        self.call(|reply| Job::CloseDocument { params, reply }).await
    }

    pub async fn change_document(&self, params: DidChangeTextDocumentParams) -> WorkerResult<()> {
        self.call(|reply| Job::ChangeDocument { params, reply })
            .await
    }

    pub fn will_save_document(&self, params: WillSaveTextDocumentParams) -> WorkerResult<()> {
        self.post(Job::WillSaveDocument { params })
    }

    pub fn did_save_document(&self, params: DidSaveTextDocumentParams) -> WorkerResult<()> {
        self.post(Job::DidSaveDocument { params })
    }

    pub async fn document_updated_build_settings(
        &self,
        uri: Uri,
        change: BuildSettingsChange,
    ) -> WorkerResult<()> {
        self.call(|reply| Job::BuildSettingsChanged { uri, change, reply })
            .await
    }

    pub async fn document_dependencies_updated(&self, uri: Uri) -> WorkerResult<()> {
        self.call(|reply| Job::DependenciesUpdated { uri, reply })
            .await
    }

    pub async fn completion(
        &self,
        params: CompletionParams,
    ) -> WorkerResult<Option<CompletionResponse>> {
        self.call(|reply| Job::Completion { params, reply }).await
    }

    pub async fn hover(&self, params: HoverParams) -> WorkerResult<Option<Hover>> {
        self.call(|reply| Job::Hover { params, reply }).await
    }

    pub async fn symbol_info(
        &self,
        params: TextDocumentPositionParams,
    ) -> WorkerResult<Vec<SymbolDetails>> {
        self.call(|reply| Job::SymbolInfo { params, reply }).await
    }

    /// The worker declines definition requests; the router consults the
    /// index instead.
    pub async fn definition(
        &self,
        _params: GotoDefinitionParams,
    ) -> WorkerResult<Handled<GotoDefinitionResponse>> {
        self.call(|reply| Job::Definition { reply }).await
    }

    pub async fn document_symbol_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> WorkerResult<Option<Vec<DocumentHighlight>>> {
        self.call(|reply| Job::DocumentHighlight { params, reply })
            .await
    }

    pub async fn folding_range(
        &self,
        params: FoldingRangeParams,
    ) -> WorkerResult<Option<Vec<FoldingRange>>> {
        self.call(|reply| Job::FoldingRanges { params, reply }).await
    }

    pub async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> WorkerResult<Option<DocumentSymbolResponse>> {
        self.call(|reply| Job::DocumentSymbols { params, reply })
            .await
    }

    pub async fn document_semantic_tokens(
        &self,
        params: SemanticTokensParams,
    ) -> WorkerResult<Option<SemanticTokens>> {
        self.call(|reply| Job::SemanticTokensFull { params, reply })
            .await
    }

    pub async fn document_color(
        &self,
        params: DocumentColorParams,
    ) -> WorkerResult<Vec<ColorInformation>> {
        self.call(|reply| Job::DocumentColor { params, reply }).await
    }

    pub async fn color_presentation(
        &self,
        params: ColorPresentationParams,
    ) -> WorkerResult<Vec<ColorPresentation>> {
        self.call(|reply| Job::ColorPresentations { params, reply })
            .await
    }

    /// Collect quick fixes and refactorings as two independent lane jobs and
    /// join their results.
    pub async fn code_action(
        &self,
        params: CodeActionParams,
    ) -> WorkerResult<Option<CodeActionResponse>> {
        let refactor_params = params.clone();
        let quick = self.call(move |reply| Job::QuickFixActions { params, reply });
        let refactorings = self.call(move |reply| Job::RefactorActions {
            params: refactor_params,
            reply,
        });
        let (quick, refactorings) = futures::join!(quick, refactorings);
        let mut actions = quick?;
        actions.extend(refactorings?);
        Ok(Some(actions))
    }

    pub async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> WorkerResult<serde_json::Value> {
        self.call(|reply| Job::ExecuteCommand { params, reply })
            .await
    }

    pub fn add_state_change_handler(
        &self,
        handler: impl Fn(WorkerState, WorkerState) + Send + 'static,
    ) -> WorkerResult<()> {
        self.post(Job::AddStateChangeHandler {
            handler: Box::new(handler),
        })
    }

    /// Test-only: ask the daemon to crash.
    pub fn simulate_crash(&self) -> WorkerResult<()> {
        self.post(Job::Crash)
    }

    /// Current lifecycle state, observed from the lane.
    pub async fn state(&self) -> WorkerResult<WorkerState> {
        self.call(|reply| Job::State { reply }).await
    }
}

/// The server capabilities this worker reports at initialize time. The wire
/// behavior of every feature must match what is reported here.
pub fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::INCREMENTAL),
                will_save: Some(true),
                will_save_wait_until: Some(false),
                save: None,
            },
        )),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        completion_provider: Some(CompletionOptions {
            resolve_provider: Some(false),
            trigger_characters: Some(vec![".".to_string()]),
            ..Default::default()
        }),
        implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
        document_highlight_provider: Some(OneOf::Left(true)),
        document_symbol_provider: Some(OneOf::Left(true)),
        semantic_tokens_provider: Some(
            SemanticTokensServerCapabilities::SemanticTokensOptions(SemanticTokensOptions {
                legend: tokens::legend(),
                range: Some(false),
                full: Some(SemanticTokensFullOptions::Bool(true)),
                work_done_progress_options: Default::default(),
            }),
        ),
        code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
            code_action_kinds: Some(vec![CodeActionKind::QUICKFIX, CodeActionKind::REFACTOR]),
            resolve_provider: None,
            work_done_progress_options: Default::default(),
        })),
        color_provider: Some(ColorProviderCapability::Simple(true)),
        folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: vec![SEMANTIC_REFACTOR_COMMAND.to_string()],
            work_done_progress_options: Default::default(),
        }),
        ..Default::default()
    }
}

struct CompletionSession {
    name: String,
    offset: usize,
}

/// Lane-owned worker state. Every method here runs on the lane task.
struct Inner {
    service: Arc<dyn CompilerService>,
    coordinator: Arc<dyn Coordinator>,
    config: WorkerConfig,
    state: WorkerState,
    documents: DocumentManager,
    /// Compile command per URI string.
    commands: HashMap<String, CompileCommand>,
    diagnostics: DiagnosticCache,
    state_handlers: Vec<StateChangeHandler>,
    completion_session: Option<CompletionSession>,
    folding_prefs: FoldingPrefs,
    snippet_support: bool,
    code_action_literal_support: bool,
}

impl Inner {
    async fn run(&mut self, job: Job) {
        match job {
            Job::Initialize { params, reply } => {
                let _ = reply.send(self.initialize(*params));
            }
            Job::ClientInitialized => debug!("client initialized"),
            Job::Shutdown { reply } => {
                let _ = reply.send(self.shutdown().await);
            }
            Job::OpenDocument { params, reply } => {
                let _ = reply.send(self.open_document(params).await);
            }
            Job::CloseDocument { params, reply } => {
                let _ = reply.send(self.close_document(params).await);
            }
            Job::ChangeDocument { params, reply } => {
                let _ = reply.send(self.change_document(params).await);
            }
            Job::WillSaveDocument { params } => {
                debug!(uri = params.text_document.uri.as_str(), "will save");
            }
            Job::DidSaveDocument { params } => {
                debug!(uri = params.text_document.uri.as_str(), "did save");
            }
            Job::BuildSettingsChanged { uri, change, reply } => {
                let _ = reply.send(self.build_settings_changed(uri, change).await);
            }
            Job::DependenciesUpdated { uri, reply } => {
                let _ = reply.send(self.dependencies_updated(&uri).await);
            }
            Job::Completion { params, reply } => {
                let _ = reply.send(self.completion(params).await);
            }
            Job::Hover { params, reply } => {
                let _ = reply.send(self.hover(params).await);
            }
            Job::SymbolInfo { params, reply } => {
                let _ = reply.send(self.symbol_info(params).await);
            }
            Job::Definition { reply } => {
                let _ = reply.send(Ok(Handled::Declined));
            }
            Job::DocumentHighlight { params, reply } => {
                let _ = reply.send(self.document_highlight(params).await);
            }
            Job::FoldingRanges { params, reply } => {
                let _ = reply.send(self.folding_range(params).await);
            }
            Job::DocumentSymbols { params, reply } => {
                let _ = reply.send(self.document_symbol(params).await);
            }
            Job::SemanticTokensFull { params, reply } => {
                let _ = reply.send(self.semantic_tokens(params).await);
            }
            Job::DocumentColor { params, reply } => {
                let _ = reply.send(self.document_color(params).await);
            }
            Job::ColorPresentations { params, reply } => {
                let _ = reply.send(Ok(colors::presentations(&params.color, params.range)));
            }
            Job::QuickFixActions { params, reply } => {
                let _ = reply.send(self.quick_fix_actions(&params));
            }
            Job::RefactorActions { params, reply } => {
                let _ = reply.send(self.refactor_actions(params).await);
            }
            Job::ExecuteCommand { params, reply } => {
                let _ = reply.send(self.execute_command(params).await);
            }
            Job::AddStateChangeHandler { handler } => {
                self.state_handlers.push(handler);
            }
            Job::Crash => self.crash().await,
            Job::State { reply } => {
                let _ = reply.send(Ok(self.state));
            }
            Job::DaemonNotification { note } => self.handle_notification(note).await,
        }
    }

    fn vocab(&self) -> Vocabulary {
        *self.service.vocabulary()
    }

    fn is_excluded(&self, uri: &Uri) -> bool {
        uri_scheme(uri).is_some_and(|scheme| self.config.is_excluded_scheme(&scheme))
    }

    fn open_snapshot(&self, uri: &Uri) -> Option<Arc<Snapshot>> {
        let snapshot = self.documents.latest_snapshot(uri);
        if snapshot.is_none() {
            warn!(uri = uri.as_str(), "no open document for request");
        }
        snapshot
    }

    /// Send a request and wait on the lane. Only a connection interrupt
    /// changes worker state.
    async fn request(&mut self, request: Value) -> WorkerResult<Value> {
        let outcome = match tokio::time::timeout(
            self.config.request_timeout(),
            self.service.send(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ServiceError::TimedOut),
        };
        match outcome {
            Ok(value) => Ok(value),
            Err(ServiceError::ConnectionInterrupted) => {
                self.connection_interrupted();
                Err(WorkerError::ConnectionInterrupted)
            }
            Err(ServiceError::Cancelled) => Err(WorkerError::Cancelled),
            Err(other) => Err(WorkerError::unknown(other.to_string())),
        }
    }

    fn transition(&mut self, to: WorkerState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        info!(?from, ?to, "worker state change");
        for handler in &self.state_handlers {
            handler(from, to);
        }
    }

    fn connection_interrupted(&mut self) {
        if self.state != WorkerState::Connected {
            return;
        }
        self.transition(WorkerState::ConnectionInterrupted);
        // open editor sessions died with the daemon
        self.documents = DocumentManager::new();
        self.completion_session = None;
    }

    async fn handle_notification(&mut self, note: Notification) {
        match note {
            Notification::ConnectionInterrupted => self.connection_interrupted(),
            Notification::Message(value) => {
                if self.state == WorkerState::ConnectionInterrupted {
                    // any message means the daemon is back
                    self.transition(WorkerState::SemanticFunctionalityDisabled);
                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move { coordinator.reopen_documents().await });
                }
                let vocab = self.vocab();
                let kind = value.get_uid(vocab.keys.notification);
                if kind == Some(vocab.kinds.note_sema_enabled) {
                    if self.state == WorkerState::SemanticFunctionalityDisabled {
                        self.transition(WorkerState::Connected);
                    }
                } else if kind == Some(vocab.kinds.note_documentupdate) {
                    let Some(uri) = value
                        .get_str(vocab.keys.name)
                        .and_then(uri_from_document_name)
                    else {
                        warn!("documentupdate notification without a usable name");
                        return;
                    };
                    self.refresh_diagnostics(&uri).await;
                }
            }
        }
    }

    fn initialize(&mut self, params: InitializeParams) -> WorkerResult<ServerCapabilities> {
        if let Some(text_document) = params.capabilities.text_document.as_ref() {
            if let Some(folding) = text_document.folding_range.as_ref() {
                self.folding_prefs = FoldingPrefs {
                    line_folding_only: folding.line_folding_only.unwrap_or(false),
                    range_limit: folding.range_limit,
                };
            }
            self.snippet_support = text_document
                .completion
                .as_ref()
                .and_then(|c| c.completion_item.as_ref())
                .and_then(|item| item.snippet_support)
                .unwrap_or(false);
            self.code_action_literal_support = text_document
                .code_action
                .as_ref()
                .and_then(|c| c.code_action_literal_support.as_ref())
                .is_some();
        }
        Ok(server_capabilities())
    }

    /// Match the response shape the client declared: action literals where
    /// supported, bare commands otherwise (edit-only actions are dropped for
    /// such clients).
    fn shape_actions(&self, actions: Vec<CodeActionOrCommand>) -> Vec<CodeActionOrCommand> {
        if self.code_action_literal_support {
            return actions;
        }
        actions
            .into_iter()
            .filter_map(|action| match action {
                CodeActionOrCommand::Command(command) => {
                    Some(CodeActionOrCommand::Command(command))
                }
                CodeActionOrCommand::CodeAction(action) => {
                    action.command.map(CodeActionOrCommand::Command)
                }
            })
            .collect()
    }

    async fn shutdown(&mut self) -> WorkerResult<()> {
        self.close_completion_session().await;
        let uris: Vec<Uri> = self
            .documents
            .snapshots()
            .map(|snapshot| snapshot.uri().clone())
            .collect();
        for uri in uris {
            if let Err(e) = self.editor_close(&uri).await {
                debug!(uri = uri.as_str(), error = %e, "editor close failed during shutdown");
            }
            self.documents.close(&uri);
            self.diagnostics.clear(&uri);
        }
        self.commands.clear();
        Ok(())
    }

    async fn open_document(&mut self, params: DidOpenTextDocumentParams) -> WorkerResult<()> {
        let uri = params.text_document.uri;
        let version = i64::from(params.text_document.version);
        let snapshot = self
            .documents
            .open(uri.clone(), version, params.text_document.text);
        self.editor_open(&snapshot).await
    }

    async fn editor_open(&mut self, snapshot: &Snapshot) -> WorkerResult<()> {
        let vocab = self.vocab();
        let keys = vocab.keys;
        let name = pseudo_path(snapshot.uri());
        let mut entries = vec![
            (keys.request, Value::Uid(vocab.requests.editor_open)),
            (keys.name, Value::string(name.as_str())),
            (keys.sourcetext, Value::string(snapshot.text())),
            (keys.enable_syntaxmap, Value::Int(0)),
            (keys.enable_substructure, Value::Int(0)),
        ];
        if let Some(command) = self.commands.get(snapshot.uri().as_str()) {
            entries.push((keys.compilerargs, Value::strings(command.argv.iter().cloned())));
        }
        let response = self.request(Value::dictionary(entries)).await?;
        self.publish_from_response(snapshot, &response);
        Ok(())
    }

    async fn editor_close(&mut self, uri: &Uri) -> WorkerResult<()> {
        let vocab = self.vocab();
        let request = Value::dictionary([
            (vocab.keys.request, Value::Uid(vocab.requests.editor_close)),
            (vocab.keys.name, Value::string(pseudo_path(uri).as_str())),
        ]);
        self.request(request).await.map(|_| ())
    }

    async fn close_document(&mut self, params: DidCloseTextDocumentParams) -> WorkerResult<()> {
        let uri = params.text_document.uri;
        self.documents.close(&uri);
        self.commands.remove(uri.as_str());
        self.diagnostics.clear(&uri);
        self.editor_close(&uri).await
    }

    async fn change_document(&mut self, params: DidChangeTextDocumentParams) -> WorkerResult<()> {
        let uri = params.text_document.uri.clone();
        let version = i64::from(params.text_document.version);

        let mut edits = Vec::new();
        let result = self
            .documents
            .edit(&uri, version, &params.content_changes, |_, edit| {
                edits.push(edit.clone())
            });
        let (snapshot, edit_error) = match result {
            Ok(snapshot) => (Some(snapshot), None),
            Err(DocumentError::NotOpen(_)) => {
                warn!(uri = uri.as_str(), "change for a document that is not open");
                return Ok(());
            }
            // Surface the bad range but still mirror the applied prefix so
            // the daemon stays in sync with the document manager.
            Err(err @ DocumentError::InvalidRange { .. }) => {
                (self.documents.latest_snapshot(&uri), Some(err))
            }
        };

        let vocab = self.vocab();
        let keys = vocab.keys;
        let name = pseudo_path(&uri);
        let mut last_response = None;
        for edit in &edits {
            let request = Value::dictionary([
                (keys.request, Value::Uid(vocab.requests.editor_replacetext)),
                (keys.name, Value::string(name.as_str())),
                (keys.offset, Value::Int(edit.offset as i64)),
                (keys.length, Value::Int(edit.length as i64)),
                (keys.sourcetext, Value::string(edit.text.as_str())),
            ]);
            last_response = Some(self.request(request).await?);
        }
        if let (Some(snapshot), Some(response)) = (snapshot.as_ref(), last_response.as_ref()) {
            self.publish_from_response(snapshot, response);
        }
        match edit_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Zero-length replace at offset 0: the idiomatic way to ask the daemon
    /// for fresh diagnostics.
    async fn refresh_diagnostics(&mut self, uri: &Uri) {
        let Some(snapshot) = self.documents.latest_snapshot(uri) else {
            debug!(uri = uri.as_str(), "documentupdate for unopened document");
            return;
        };
        let vocab = self.vocab();
        let keys = vocab.keys;
        let request = Value::dictionary([
            (keys.request, Value::Uid(vocab.requests.editor_replacetext)),
            (keys.name, Value::string(pseudo_path(uri).as_str())),
            (keys.offset, Value::Int(0)),
            (keys.length, Value::Int(0)),
            (keys.sourcetext, Value::string("")),
        ]);
        match self.request(request).await {
            Ok(response) => self.publish_from_response(&snapshot, &response),
            Err(e) => warn!(uri = uri.as_str(), error = %e, "diagnostic refresh failed"),
        }
    }

    async fn build_settings_changed(
        &mut self,
        uri: Uri,
        change: BuildSettingsChange,
    ) -> WorkerResult<()> {
        let new_command = match change {
            BuildSettingsChange::Fallback(settings) => {
                Some(CompileCommand::from_settings(settings, true))
            }
            BuildSettingsChange::Modified(settings) => {
                Some(CompileCommand::from_settings(settings, false))
            }
            BuildSettingsChange::RemovedOrUnavailable => None,
        };
        if self.commands.get(uri.as_str()) == new_command.as_ref() {
            debug!(uri = uri.as_str(), "compile command unchanged");
            return Ok(());
        }
        match new_command {
            Some(command) => {
                self.commands.insert(uri.as_str().to_string(), command);
            }
            None => {
                self.commands.remove(uri.as_str());
            }
        }
        self.reopen(&uri).await
    }

    async fn dependencies_updated(&mut self, uri: &Uri) -> WorkerResult<()> {
        // the AST must be re-elaborated against the rebuilt modules
        self.reopen(uri).await
    }

    async fn reopen(&mut self, uri: &Uri) -> WorkerResult<()> {
        let Some(snapshot) = self.open_snapshot(uri) else {
            return Ok(());
        };
        self.editor_close(uri).await?;
        self.editor_open(&snapshot).await
    }

    fn publish_from_response(&mut self, snapshot: &Snapshot, response: &Value) {
        let vocab = self.vocab();
        let Some(stage) = response
            .get_uid(vocab.keys.diagnostic_stage)
            .and_then(|uid| Stage::from_uid(uid, &vocab.kinds))
        else {
            return;
        };
        if self.is_excluded(snapshot.uri()) {
            debug!(
                uri = snapshot.uri().as_str(),
                "diagnostics withheld for excluded scheme"
            );
            return;
        }
        let is_fallback = self
            .commands
            .get(snapshot.uri().as_str())
            .is_some_and(|command| command.is_fallback);
        let new =
            diagnostics::diagnostics_from_response(response, &vocab, snapshot, stage, is_fallback);
        let merged = self
            .diagnostics
            .merge(snapshot.uri(), stage, is_fallback, new);
        self.coordinator.publish_diagnostics(
            snapshot.uri().clone(),
            i32::try_from(snapshot.version()).ok(),
            merged,
        );
    }

    fn compiler_args_entry(&self, uri: &Uri) -> Option<(Uid, Value)> {
        self.commands.get(uri.as_str()).map(|command| {
            (
                self.vocab().keys.compilerargs,
                Value::strings(command.argv.iter().cloned()),
            )
        })
    }

    async fn cursor_info(
        &mut self,
        snapshot: &Snapshot,
        offset: usize,
        length: usize,
        retrieve_refactor_actions: bool,
    ) -> WorkerResult<Value> {
        let vocab = self.vocab();
        let keys = vocab.keys;
        let mut entries = vec![
            (keys.request, Value::Uid(vocab.requests.cursor_info)),
            (
                keys.sourcefile,
                Value::string(pseudo_path(snapshot.uri()).as_str()),
            ),
            (keys.offset, Value::Int(offset as i64)),
            (keys.length, Value::Int(length as i64)),
        ];
        if retrieve_refactor_actions {
            entries.push((keys.retrieve_refactor_actions, Value::Int(1)));
        }
        if let Some(entry) = self.compiler_args_entry(snapshot.uri()) {
            entries.push(entry);
        }
        self.request(Value::dictionary(entries)).await
    }

    async fn hover(&mut self, params: HoverParams) -> WorkerResult<Option<Hover>> {
        let uri = params
            .text_document_position_params
            .text_document
            .uri
            .clone();
        let position = params.text_document_position_params.position;
        let Some(snapshot) = self.open_snapshot(&uri) else {
            return Ok(None);
        };
        let Some(offset) = snapshot.utf8_offset_of(position) else {
            warn!(uri = uri.as_str(), "hover position out of range");
            return Ok(None);
        };
        let info = self.cursor_info(&snapshot, offset, 0, false).await?;
        Ok(hover::hover_from_cursor_info(&info, &self.vocab()))
    }

    async fn symbol_info(
        &mut self,
        params: TextDocumentPositionParams,
    ) -> WorkerResult<Vec<SymbolDetails>> {
        let Some(snapshot) = self.open_snapshot(&params.text_document.uri) else {
            return Ok(Vec::new());
        };
        let Some(offset) = snapshot.utf8_offset_of(params.position) else {
            warn!("symbol-info position out of range");
            return Ok(Vec::new());
        };
        let info = self.cursor_info(&snapshot, offset, 0, false).await?;
        Ok(symbols::symbol_details(&info, &self.vocab())
            .into_iter()
            .collect())
    }

    async fn document_highlight(
        &mut self,
        params: DocumentHighlightParams,
    ) -> WorkerResult<Option<Vec<DocumentHighlight>>> {
        let uri = params
            .text_document_position_params
            .text_document
            .uri
            .clone();
        let position = params.text_document_position_params.position;
        let Some(snapshot) = self.open_snapshot(&uri) else {
            return Ok(None);
        };
        let Some(offset) = snapshot.utf8_offset_of(position) else {
            warn!(uri = uri.as_str(), "highlight position out of range");
            return Ok(None);
        };

        let vocab = self.vocab();
        let keys = vocab.keys;
        let mut entries = vec![
            (keys.request, Value::Uid(vocab.requests.relatedidents)),
            (keys.sourcefile, Value::string(pseudo_path(&uri).as_str())),
            (keys.offset, Value::Int(offset as i64)),
        ];
        if let Some(entry) = self.compiler_args_entry(&uri) {
            entries.push(entry);
        }
        let response = self.request(Value::dictionary(entries)).await?;

        let Some(results) = response.get_array(keys.results) else {
            return Ok(Some(Vec::new()));
        };
        let highlights = results
            .iter()
            .filter_map(|item| {
                let offset = item.get_usize(keys.offset)?;
                let length = item.get_usize(keys.length)?;
                let start = snapshot.position_of_utf8_offset(offset)?;
                let end = snapshot.position_of_utf8_offset(offset + length)?;
                Some(DocumentHighlight {
                    range: Range { start, end },
                    // the service does not distinguish reads from writes
                    kind: Some(DocumentHighlightKind::READ),
                })
            })
            .collect();
        Ok(Some(highlights))
    }

    /// Open a transient syntactic-only session under a synthesized name,
    /// paired with a close.
    async fn syntactic_open(
        &mut self,
        prefix: &str,
        snapshot: &Snapshot,
        with_syntaxmap: bool,
    ) -> WorkerResult<Value> {
        let vocab = self.vocab();
        let keys = vocab.keys;
        let name = format!("{prefix}:{}", pseudo_path(snapshot.uri()));
        let open = Value::dictionary([
            (keys.request, Value::Uid(vocab.requests.editor_open)),
            (keys.name, Value::string(name.as_str())),
            (keys.sourcetext, Value::string(snapshot.text())),
            (keys.syntactic_only, Value::Int(1)),
            (
                keys.enable_syntaxmap,
                Value::Int(i64::from(with_syntaxmap)),
            ),
            (keys.enable_substructure, Value::Int(1)),
        ]);
        let response = self.request(open).await?;

        let close = Value::dictionary([
            (keys.request, Value::Uid(vocab.requests.editor_close)),
            (keys.name, Value::string(name.as_str())),
        ]);
        if let Err(e) = self.request(close).await {
            warn!(error = %e, "failed to close syntactic session");
        }
        Ok(response)
    }

    async fn folding_range(
        &mut self,
        params: FoldingRangeParams,
    ) -> WorkerResult<Option<Vec<FoldingRange>>> {
        let Some(snapshot) = self.open_snapshot(&params.text_document.uri) else {
            return Ok(None);
        };
        let response = self.syntactic_open("FoldingRanges", &snapshot, true).await?;
        let prefs = self.folding_prefs;
        Ok(Some(folding::folding_ranges(
            &response,
            &self.vocab(),
            &snapshot,
            &prefs,
        )))
    }

    async fn document_symbol(
        &mut self,
        params: DocumentSymbolParams,
    ) -> WorkerResult<Option<DocumentSymbolResponse>> {
        let Some(snapshot) = self.open_snapshot(&params.text_document.uri) else {
            return Ok(None);
        };
        let response = self
            .syntactic_open("DocumentSymbols", &snapshot, false)
            .await?;
        let symbols = symbols::document_symbols(&response, &self.vocab(), &snapshot);
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn semantic_tokens(
        &mut self,
        params: SemanticTokensParams,
    ) -> WorkerResult<Option<SemanticTokens>> {
        let Some(snapshot) = self.open_snapshot(&params.text_document.uri) else {
            return Ok(None);
        };
        let response = self
            .syntactic_open("SemanticTokens", &snapshot, true)
            .await?;
        let data = tokens::semantic_tokens(&response, &self.vocab(), &snapshot);
        Ok(Some(SemanticTokens {
            result_id: None,
            data,
        }))
    }

    async fn document_color(
        &mut self,
        params: DocumentColorParams,
    ) -> WorkerResult<Vec<ColorInformation>> {
        let Some(snapshot) = self.open_snapshot(&params.text_document.uri) else {
            return Ok(Vec::new());
        };
        let response = self
            .syntactic_open("DocumentColor", &snapshot, false)
            .await?;
        Ok(colors::color_literals(&response, &self.vocab(), &snapshot))
    }

    fn quick_fix_actions(&self, params: &CodeActionParams) -> WorkerResult<Vec<CodeActionOrCommand>> {
        if !wants_kind(params, &CodeActionKind::QUICKFIX) {
            return Ok(Vec::new());
        }
        Ok(self.shape_actions(diagnostics::quick_fixes(
            self.diagnostics.cached(&params.text_document.uri),
            params,
        )))
    }

    async fn refactor_actions(
        &mut self,
        params: CodeActionParams,
    ) -> WorkerResult<Vec<CodeActionOrCommand>> {
        if !wants_kind(&params, &CodeActionKind::REFACTOR) {
            return Ok(Vec::new());
        }
        let uri = params.text_document.uri.clone();
        let Some(snapshot) = self.open_snapshot(&uri) else {
            return Ok(Vec::new());
        };
        let Some(bytes) = snapshot.utf8_range_of(params.range) else {
            return Err(WorkerError::invalid_request(
                "code-action range out of range",
            ));
        };
        let info = self
            .cursor_info(&snapshot, bytes.start, bytes.end - bytes.start, true)
            .await?;
        Ok(self.shape_actions(refactor::refactor_actions(
            &info,
            &self.vocab(),
            &uri,
            params.range.start,
        )))
    }

    async fn execute_command(
        &mut self,
        params: ExecuteCommandParams,
    ) -> WorkerResult<serde_json::Value> {
        if params.command != SEMANTIC_REFACTOR_COMMAND {
            return Err(WorkerError::invalid_request(format!(
                "unsupported command: {}",
                params.command
            )));
        }
        let argument = params
            .arguments
            .first()
            .cloned()
            .ok_or_else(|| WorkerError::invalid_request("missing command arguments"))?;
        let command: SemanticRefactorCommand = serde_json::from_value(argument)
            .map_err(|e| WorkerError::invalid_request(format!("malformed refactor command: {e}")))?;

        let uri = command.text_document.uri.clone();
        let Some(snapshot) = self.open_snapshot(&uri) else {
            return Err(WorkerError::not_found(uri.as_str().to_string()));
        };
        let Some(offset) = snapshot.utf8_offset_of(command.position) else {
            return Err(WorkerError::invalid_request("position out of range"));
        };
        let Some(line_start) = snapshot.utf8_offset_of(Position {
            line: command.position.line,
            character: 0,
        }) else {
            return Err(WorkerError::invalid_request("position out of range"));
        };

        let vocab = self.vocab();
        let keys = vocab.keys;
        let mut entries = vec![
            (
                keys.request,
                Value::Uid(vocab.requests.semantic_refactoring),
            ),
            (keys.actionuid, Value::Uid(Uid::from_raw(command.action_uid))),
            (keys.name, Value::string(pseudo_path(&uri).as_str())),
            (keys.sourcefile, Value::string(pseudo_path(&uri).as_str())),
            (keys.line, Value::Int(i64::from(command.position.line) + 1)),
            (keys.column, Value::Int((offset - line_start) as i64 + 1)),
        ];
        if let Some(entry) = self.compiler_args_entry(&uri) {
            entries.push(entry);
        }
        let response = self.request(Value::dictionary(entries)).await?;
        let edit = refactor::workspace_edit_from_response(&response, &vocab, &snapshot);

        let verdict = self
            .coordinator
            .apply_edit(Some(command.title.clone()), edit.clone())
            .await?;
        if verdict.applied {
            serde_json::to_value(edit).map_err(|e| WorkerError::unknown(e.to_string()))
        } else {
            let reason = verdict
                .failure_reason
                .unwrap_or_else(|| "client rejected the edit".to_string());
            warn!(reason = %reason, "workspace edit was not applied");
            Err(WorkerError::unknown(reason))
        }
    }

    async fn completion(
        &mut self,
        params: CompletionParams,
    ) -> WorkerResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri.clone();
        let Some(snapshot) = self.open_snapshot(&uri) else {
            return Ok(None);
        };
        let Some(offset) = snapshot.utf8_offset_of(params.text_document_position.position) else {
            return Err(WorkerError::invalid_request(
                "completion position out of range",
            ));
        };

        // at most one session per worker
        self.close_completion_session().await;

        let vocab = self.vocab();
        let keys = vocab.keys;
        let name = pseudo_path(&uri);
        let mut entries = vec![
            (keys.request, Value::Uid(vocab.requests.codecomplete_open)),
            (keys.name, Value::string(name.as_str())),
            (keys.sourcetext, Value::string(snapshot.text())),
            (keys.offset, Value::Int(offset as i64)),
        ];
        if let Some(entry) = self.compiler_args_entry(&uri) {
            entries.push(entry);
        }
        let response = self.request(Value::dictionary(entries)).await?;
        self.completion_session = Some(CompletionSession { name, offset });

        let items = completion::completion_items(
            &response,
            &vocab,
            self.config.completion_max_results,
            self.snippet_support,
        );
        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: items.len() >= self.config.completion_max_results,
            items,
        })))
    }

    async fn close_completion_session(&mut self) {
        let Some(session) = self.completion_session.take() else {
            return;
        };
        let vocab = self.vocab();
        let keys = vocab.keys;
        let request = Value::dictionary([
            (keys.request, Value::Uid(vocab.requests.codecomplete_close)),
            (keys.name, Value::string(session.name.as_str())),
            (keys.offset, Value::Int(session.offset as i64)),
        ]);
        if let Err(e) = self.request(request).await {
            debug!(error = %e, "failed to close completion session");
        }
    }

    async fn crash(&mut self) {
        let vocab = self.vocab();
        let request = Value::dictionary([(
            vocab.keys.request,
            Value::Uid(vocab.requests.crash_exit),
        )]);
        if let Err(e) = self.request(request).await {
            debug!(error = %e, "crash request returned an error");
        }
    }
}

fn wants_kind(params: &CodeActionParams, kind: &CodeActionKind) -> bool {
    match &params.context.only {
        None => true,
        Some(kinds) => kinds
            .iter()
            .any(|requested| kind.as_str().starts_with(requested.as_str())),
    }
}
