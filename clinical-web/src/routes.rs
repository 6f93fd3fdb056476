//! Rotas HTTP/WebSocket do servidor.
//!
//! | Rota                          | Função                                        |
//! |-------------------------------|-----------------------------------------------|
//! | `GET /`                       | Relatório HTML com o formulário de colagem    |
//! | `POST /documents`             | Formulário: segmenta (e rotula) e redireciona |
//! | `GET /documents`              | Lista os documentos carregados                |
//! | `DELETE /documents`           | Limpa o espaço de trabalho                    |
//! | `POST /segment`               | JSON `{file, text}` → segmentos e tokens      |
//! | `POST /label`                 | JSON `{file, text}` → tokens rotulados        |
//! | `GET /export/:file/:kind`     | `segments.jsonl`, `tokens.jsonl`, `labeled.jsonl` |
//! | `GET /ws`                     | Eventos do pipeline em tempo real             |
//! | `GET /demo-texts`             | Notas de demonstração                         |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use clinical_core::{
    corpus::demo_texts,
    document::to_jsonl,
    ClinicalPipeline, Document, Error, PipelineEvent, SegmentRecord, TokenRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::labeler::{model_endpoint, Backend, HttpLabeler, LabelerConfig};
use crate::report::{render_report, LabelSet, ReportEntry, ReportOptions};

/// Documento guardado no servidor: a versão segmentada e, se houve NER, a
/// rotulada.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub segmented: Document,
    pub labeled: Option<Document>,
}

impl StoredDocument {
    /// Versão exibida: a rotulada quando existir.
    pub fn current(&self) -> &Document {
        self.labeled.as_ref().unwrap_or(&self.segmented)
    }
}

/// Documentos carregados e rótulos presentes neles.
#[derive(Debug, Default)]
pub struct Workspace {
    pub documents: BTreeMap<String, StoredDocument>,
    pub labels: LabelSet,
}

impl Workspace {
    /// Guarda o documento (substituindo o de mesmo nome) e refaz o conjunto
    /// de rótulos a partir do que ficou guardado.
    fn store(&mut self, segmented: Document, labeled: Option<Document>) {
        self.documents
            .insert(segmented.file.clone(), StoredDocument { segmented, labeled });
        self.labels = LabelSet::from_documents(self.documents.values().filter_map(|d| d.labeled.as_ref()));
    }
}

/// Estado compartilhado da aplicação
pub struct AppState {
    pub pipeline: ClinicalPipeline,
    pub labeler: Backend,
    pub client: reqwest::Client,
    pub labeler_defaults: LabelerConfig,
    pub options: ReportOptions,
    pub workspace: RwLock<Workspace>,
}

impl AppState {
    pub fn new(
        pipeline: ClinicalPipeline,
        labeler: Backend,
        client: reqwest::Client,
        labeler_defaults: LabelerConfig,
        options: ReportOptions,
    ) -> Self {
        Self {
            pipeline,
            labeler,
            client,
            labeler_defaults,
            options,
            workspace: RwLock::new(Workspace::default()),
        }
    }

    /// Rotulador da requisição: um modelo ou token informado pelo usuário
    /// substitui o configurado. Sem token algum o modelo pedido é ignorado e
    /// vale o rotulador configurado.
    fn labeler_for(&self, model: Option<&str>, token: Option<&str>) -> Backend {
        let model = model.map(str::trim).filter(|m| !m.is_empty());
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        if model.is_none() && token.is_none() {
            return self.labeler.clone();
        }

        let mut config = self.labeler_defaults.clone();
        if let Some(model) = model {
            config.endpoint = model_endpoint(model);
        }
        if let Some(token) = token {
            config.token = Some(token.to_string());
        }
        if config.token.is_none() {
            return self.labeler.clone();
        }
        Backend::Remote(HttpLabeler::with_client(self.client.clone(), config))
    }

    fn file_name(&self, file: Option<&str>) -> String {
        file.map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(&self.options.default_file)
            .to_string()
    }

    /// Segmenta e, se pedido, rotula fora da trava; depois guarda.
    async fn ingest(&self, file: String, text: &str, labeler: Option<Backend>) -> Result<StoredDocument, ApiError> {
        let segmented = self.pipeline.segment(&file, text)?;

        let labeled = match labeler {
            Some(backend) => {
                if !backend.is_enabled() {
                    return Err(ApiError::LabelerDisabled);
                }
                let mut doc = segmented.clone();
                let started = Instant::now();
                let sentences = self.pipeline.label(&backend, &mut doc).await?;
                info!(
                    file = %file,
                    backend = backend.name(),
                    sentences,
                    ms = started.elapsed().as_millis() as u64,
                    "documento rotulado"
                );
                Some(doc)
            }
            None => None,
        };

        let stored = StoredDocument { segmented, labeled };
        self.workspace
            .write()
            .await
            .store(stored.segmented.clone(), stored.labeled.clone());
        Ok(stored)
    }
}

/// Erros das rotas, convertidos em respostas JSON.
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    NotFound(String),
    LabelerDisabled,
    Render(askama::Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl From<askama::Error> for ApiError {
    fn from(err: askama::Error) -> Self {
        ApiError::Render(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Core(Error::InputEmpty) => (StatusCode::BAD_REQUEST, json!({"error": "Texto vazio"})),
            ApiError::Core(err @ Error::RemoteLabeling { status, .. }) => (
                StatusCode::BAD_GATEWAY,
                json!({"error": err.to_string(), "upstream_status": status}),
            ),
            ApiError::Core(err) => {
                error!("falha interna: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": err.to_string()}))
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, json!({"error": format!("não encontrado: {what}")})),
            ApiError::LabelerDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "nenhum rotulador configurado (informe um token ou use --lexicon)"}),
            ),
            ApiError::Render(err) => {
                error!("falha ao renderizar o relatório: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": err.to_string()}))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Monta o roteador com CORS liberado.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route(
            "/documents",
            get(list_documents_handler)
                .post(submit_document_handler)
                .delete(clear_documents_handler),
        )
        .route("/segment", post(segment_handler))
        .route("/label", post(label_handler))
        .route("/export/:file/:kind", get(export_handler))
        .route("/ws", get(ws_handler))
        .route("/demo-texts", get(demo_texts_handler))
        .layer(cors)
        .with_state(state)
}

/// Retorna a página principal HTML
async fn index_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let workspace = state.workspace.read().await;
    let entries: Vec<ReportEntry<'_>> = workspace
        .documents
        .values()
        .map(|stored| ReportEntry {
            document: stored.current(),
            labeled: stored.labeled.is_some(),
        })
        .collect();
    let html = render_report(&entries, &workspace.labels, &state.options)?;
    Ok(Html(html))
}

#[derive(Debug, Deserialize)]
struct DocumentForm {
    #[serde(default)]
    file: Option<String>,
    text: String,
    /// Checkbox: presente ("on") quando marcado.
    #[serde(default)]
    ner: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    hf_token: Option<String>,
}

/// Formulário de colagem: segmenta, rotula se pedido e volta para o relatório.
async fn submit_document_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DocumentForm>,
) -> Result<Redirect, ApiError> {
    let file = state.file_name(form.file.as_deref());
    let labeler = form
        .ner
        .is_some()
        .then(|| state.labeler_for(form.model.as_deref(), form.hf_token.as_deref()));
    state.ingest(file, &form.text, labeler).await?;
    Ok(Redirect::to("/"))
}

#[derive(Debug, Serialize)]
struct DocumentInfo {
    file: String,
    sections: usize,
    sentences: usize,
    tokens: usize,
    labeled: bool,
}

async fn list_documents_handler(State(state): State<Arc<AppState>>) -> Json<Vec<DocumentInfo>> {
    let workspace = state.workspace.read().await;
    Json(
        workspace
            .documents
            .values()
            .map(|stored| DocumentInfo {
                file: stored.segmented.file.clone(),
                sections: stored.segmented.sections.len(),
                sentences: stored.segmented.sentence_count(),
                tokens: stored.segmented.token_count(),
                labeled: stored.labeled.is_some(),
            })
            .collect(),
    )
}

async fn clear_documents_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let mut workspace = state.workspace.write().await;
    *workspace = Workspace::default();
    info!("espaço de trabalho limpo");
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct SegmentRequest {
    #[serde(default)]
    file: Option<String>,
    text: String,
}

#[derive(Debug, Serialize)]
struct SegmentResponse {
    file: String,
    segments: Vec<SegmentRecord>,
    tokens: Vec<TokenRecord>,
}

/// Segmentação via HTTP POST (sem rotulagem)
async fn segment_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SegmentRequest>,
) -> Result<Json<SegmentResponse>, ApiError> {
    let file = state.file_name(req.file.as_deref());
    let stored = state.ingest(file.clone(), &req.text, None).await?;
    Ok(Json(SegmentResponse {
        file,
        segments: stored.segmented.segment_records(),
        tokens: stored.segmented.token_records(),
    }))
}

#[derive(Debug, Deserialize)]
struct LabelRequest {
    #[serde(default)]
    file: Option<String>,
    text: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    hf_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct LabelResponse {
    file: String,
    backend: &'static str,
    labels: Vec<String>,
    tokens: Vec<TokenRecord>,
}

/// Segmenta e rotula; falhas remotas viram 502 com o status de origem.
async fn label_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LabelRequest>,
) -> Result<Json<LabelResponse>, ApiError> {
    let file = state.file_name(req.file.as_deref());
    let backend = state.labeler_for(req.model.as_deref(), req.hf_token.as_deref());
    let name = backend.name();
    let stored = state.ingest(file.clone(), &req.text, Some(backend)).await?;
    let labeled = stored.current();
    Ok(Json(LabelResponse {
        file,
        backend: name,
        labels: labeled.distinct_labels().into_iter().collect(),
        tokens: labeled.token_records(),
    }))
}

/// Download de um dos três JSONL de um documento.
async fn export_handler(
    State(state): State<Arc<AppState>>,
    Path((file, kind)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let workspace = state.workspace.read().await;
    let stored = workspace
        .documents
        .get(&file)
        .ok_or_else(|| ApiError::NotFound(file.clone()))?;

    let body = match kind.as_str() {
        "segments.jsonl" => to_jsonl(&stored.segmented.segment_records())?,
        "tokens.jsonl" => to_jsonl(&stored.segmented.token_records())?,
        "labeled.jsonl" => {
            let labeled = stored
                .labeled
                .as_ref()
                .ok_or_else(|| ApiError::NotFound(format!("{file}/{kind}")))?;
            to_jsonl(&labeled.token_records())?
        }
        _ => return Err(ApiError::NotFound(kind)),
    };

    let disposition = format!("attachment; filename=\"{}\"", kind);
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Retorna textos de demonstração
async fn demo_texts_handler() -> impl IntoResponse {
    let texts: Vec<serde_json::Value> = demo_texts()
        .iter()
        .map(|(title, text)| {
            json!({
                "title": title,
                "text": text
            })
        })
        .collect();
    Json(texts)
}

/// Mensagem WebSocket recebida do cliente
#[derive(Deserialize)]
struct WsRequest {
    #[serde(default)]
    file: Option<String>,
    text: String,
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Recebe uma nota, executa o pipeline e envia os eventos passo a passo.
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                // JSON {file, text}; senão o texto puro é a nota
                let (file, note) = match serde_json::from_str::<WsRequest>(&text) {
                    Ok(req) => (state.file_name(req.file.as_deref()), req.text),
                    Err(_) => (state.options.default_file.clone(), text),
                };
                if note.trim().is_empty() {
                    continue;
                }

                info!(file = %file, chars = note.chars().count(), "segmentando via WebSocket");

                // O pipeline é síncrono: roda fora do runtime
                let (tx_std, rx_std) = std::sync::mpsc::channel::<PipelineEvent>();
                let worker = Arc::clone(&state);
                let handle = tokio::task::spawn_blocking(move || {
                    worker.pipeline.segment_streaming(&file, &note, tx_std);
                });
                if let Err(err) = handle.await {
                    warn!("pipeline abortado: {err}");
                    continue;
                }

                let events: Vec<PipelineEvent> = rx_std.try_iter().collect();
                for event in &events {
                    if let PipelineEvent::Done { document, .. } = event {
                        state.workspace.write().await.store(document.clone(), None);
                    }
                    match serde_json::to_string(event) {
                        Ok(json) => {
                            if socket.send(Message::Text(json)).await.is_err() {
                                return; // cliente desconectou
                            }
                        }
                        Err(err) => warn!("evento não serializável: {err}"),
                    }
                    // Pequena pausa para animação visual (passo a passo)
                    tokio::time::sleep(tokio::time::Duration::from_millis(35)).await;
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}
