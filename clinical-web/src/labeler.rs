//! Rotuladores disponíveis para o servidor e a CLI.
//!
//! - [`HttpLabeler`]: serviço de inferência no estilo Hugging Face
//!   (`POST {inputs, parameters: {aggregation_strategy: "simple"}}` com token
//!   Bearer), devolvendo `[{entity_group, score, word, start, end}]`.
//! - [`Backend`]: escolha feita na configuração (remoto, léxico local ou
//!   nenhum).

use std::time::Duration;

use clinical_core::{EntityLabeler, EntitySpan, Error, LexiconLabeler, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// Prefixo da API de inferência hospedada.
pub const HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";

/// Modelo biomédico usado quando nenhum é informado.
pub const DEFAULT_MODEL: &str = "d4data/biomedical-ner-all";

/// Endpoint de inferência de um modelo hospedado.
pub fn model_endpoint(model: &str) -> String {
    format!("{HF_INFERENCE_URL}/{}", model.trim().trim_matches('/'))
}

/// Configuração do rotulador remoto.
#[derive(Debug, Clone)]
pub struct LabelerConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            endpoint: model_endpoint(DEFAULT_MODEL),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct InferenceParameters {
    aggregation_strategy: &'static str,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

/// Cliente do serviço remoto de NER.
#[derive(Debug, Clone)]
pub struct HttpLabeler {
    client: reqwest::Client,
    config: LabelerConfig,
}

impl HttpLabeler {
    pub fn new(config: LabelerConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reaproveita um cliente HTTP existente (pool de conexões compartilhado).
    pub fn with_client(client: reqwest::Client, config: LabelerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &LabelerConfig {
        &self.config
    }
}

impl EntityLabeler for HttpLabeler {
    async fn label(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let body = InferenceRequest {
            inputs: text,
            parameters: InferenceParameters {
                aggregation_strategy: "simple",
            },
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .timeout(self.config.timeout)
            .json(&body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| Error::remote(err.status().map(|s| s.as_u16()), err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.config.endpoint, status = status.as_u16(), "serviço de NER recusou a requisição");
            return Err(Error::remote(
                Some(status.as_u16()),
                format!("HF API {}", status.as_u16()),
            ));
        }

        let spans: Vec<EntitySpan> = response.json().await.map_err(|err| {
            Error::remote(Some(status.as_u16()), format!("resposta inválida do serviço de NER: {err}"))
        })?;
        debug!(chars = text.chars().count(), spans = spans.len(), "resposta do serviço de NER");
        Ok(spans)
    }
}

/// Rotulador escolhido na configuração.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Serviço remoto de inferência.
    Remote(HttpLabeler),
    /// Léxico clínico embutido, sem rede.
    Lexicon(LexiconLabeler),
    /// Nenhum rotulador configurado (sem token e sem léxico).
    Disabled,
}

impl Backend {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Backend::Disabled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Remote(_) => "remote",
            Backend::Lexicon(_) => "lexicon",
            Backend::Disabled => "disabled",
        }
    }
}

impl EntityLabeler for Backend {
    async fn label(&self, text: &str) -> Result<Vec<EntitySpan>> {
        match self {
            Backend::Remote(remote) => remote.label(text).await,
            Backend::Lexicon(lexicon) => lexicon.label(text).await,
            Backend::Disabled => Err(Error::remote(None, "nenhum rotulador configurado")),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    use super::*;

    /// Sobe um servidor local que imita o endpoint de inferência.
    async fn fake_endpoint(fail: bool) -> String {
        let app = Router::new().route(
            "/models/test",
            post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
                if fail {
                    return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "loading"})));
                }
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                assert_eq!(auth, "Bearer hf_test");
                assert_eq!(body["parameters"]["aggregation_strategy"], "simple");
                let text = body["inputs"].as_str().unwrap_or_default();
                let end = text.find(',').unwrap_or(text.len());
                (
                    StatusCode::OK,
                    Json(json!([
                        {"entity_group": "SYMPTOM", "score": 0.97, "word": &text[..end], "start": 0, "end": end}
                    ])),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/models/test")
    }

    fn config(endpoint: String) -> LabelerConfig {
        LabelerConfig {
            endpoint,
            token: Some("hf_test".into()),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_model_endpoint() {
        assert_eq!(
            model_endpoint(DEFAULT_MODEL),
            "https://api-inference.huggingface.co/models/d4data/biomedical-ner-all"
        );
    }

    #[tokio::test]
    async fn test_http_labeler_parses_spans() {
        let labeler = HttpLabeler::new(config(fake_endpoint(false).await));
        let spans = labeler.label("fever, cough").await.unwrap();
        assert_eq!(spans, vec![EntitySpan { start: 0, end: 5, label: "SYMPTOM".into(), score: 0.97 }]);
    }

    #[tokio::test]
    async fn test_http_labeler_maps_status_failure() {
        let labeler = HttpLabeler::new(config(fake_endpoint(true).await));
        let err = labeler.label("fever").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("HF API 503"));
    }

    #[tokio::test]
    async fn test_disabled_backend_fails() {
        assert!(!Backend::Disabled.is_enabled());
        assert!(Backend::Disabled.label("x").await.is_err());
        let spans = Backend::Lexicon(LexiconLabeler::clinical()).label("chest pain").await.unwrap();
        assert_eq!(spans[0].label, "SYMPTOM");
    }
}
