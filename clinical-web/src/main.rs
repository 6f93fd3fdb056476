//! Servidor web Axum e CLI para segmentação e NER de notas clínicas
//!
//! - `serve`: relatório interativo, API JSON e WebSocket com os eventos do
//!   pipeline em tempo real.
//! - `render`: processa arquivos locais e grava o relatório HTML mais os três
//!   JSONL (`segments`, `tokens`, `labeled`).

mod config;
mod labeler;
mod report;
mod routes;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use clinical_core::{document::write_jsonl, ClinicalPipeline, Document};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Command};
use crate::labeler::Backend;
use crate::report::{render_report, LabelSet, ReportEntry};
use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = reqwest::Client::new();
    let pipeline = ClinicalPipeline::with_config(cli.segmenter_config());

    match &cli.command {
        Command::Serve { addr } => {
            let backend = cli.labeler.backend(client.clone());
            match &backend {
                Backend::Remote(remote) => info!(
                    backend = backend.name(),
                    endpoint = %remote.config().endpoint,
                    timeout_secs = remote.config().timeout.as_secs(),
                    "rotulador configurado"
                ),
                _ => info!(backend = backend.name(), "rotulador configurado"),
            }
            let state = Arc::new(AppState::new(
                pipeline,
                backend,
                client,
                cli.labeler.labeler_config(),
                cli.report_options(true),
            ));

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("não foi possível escutar em {addr}"))?;
            info!("🚀 Servidor clínico iniciado em http://{addr}");
            axum::serve(listener, router(state)).await?;
        }
        Command::Render {
            inputs,
            out_dir,
            out,
            ner,
        } => {
            render(&cli, pipeline, client, inputs, out_dir, out, *ner).await?;
        }
    }
    Ok(())
}

/// Nome do documento: o nome do arquivo, sem diretórios.
fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn render(
    cli: &Cli,
    pipeline: ClinicalPipeline,
    client: reqwest::Client,
    inputs: &[PathBuf],
    out_dir: &Path,
    out: &str,
    ner: bool,
) -> anyhow::Result<()> {
    let backend = cli.labeler.backend(client);
    if ner && !backend.is_enabled() {
        bail!("--ner exige --hf-token/HF_TOKEN, --endpoint ou --lexicon");
    }

    let mut notes = Vec::with_capacity(inputs.len());
    for path in inputs {
        let text = fs::read_to_string(path).with_context(|| format!("falha ao ler {}", path.display()))?;
        notes.push((document_name(path), text));
    }

    let mut documents = Vec::with_capacity(notes.len());
    for ((file, _), result) in notes.iter().zip(pipeline.segment_many(&notes)) {
        match result {
            Ok(doc) => {
                info!(file = %file, sections = doc.sections.len(), sentences = doc.sentence_count(), "documento segmentado");
                documents.push(doc);
            }
            Err(err) => warn!(file = %file, "documento ignorado: {err}"),
        }
    }
    if documents.is_empty() {
        bail!("nenhum documento com texto para processar");
    }

    let labeled: Option<Vec<Document>> = if ner {
        let mut labeled = Vec::with_capacity(documents.len());
        for doc in &documents {
            let mut copy = doc.clone();
            let sentences = pipeline
                .label(&backend, &mut copy)
                .await
                .with_context(|| format!("rotulagem de {} falhou", doc.file))?;
            info!(file = %doc.file, sentences, backend = backend.name(), "documento rotulado");
            labeled.push(copy);
        }
        Some(labeled)
    } else {
        None
    };

    fs::create_dir_all(out_dir).with_context(|| format!("falha ao criar {}", out_dir.display()))?;

    let shown: &[Document] = labeled.as_deref().unwrap_or(&documents);
    let labels = LabelSet::from_documents(shown);
    let entries: Vec<ReportEntry<'_>> = shown
        .iter()
        .map(|document| ReportEntry {
            document,
            labeled: labeled.is_some(),
        })
        .collect();
    let html = render_report(&entries, &labels, &cli.report_options(false))?;
    let html_path = out_dir.join(out);
    fs::write(&html_path, html).with_context(|| format!("falha ao gravar {}", html_path.display()))?;
    info!(path = %html_path.display(), "relatório gravado");

    let segments: Vec<_> = documents.iter().flat_map(Document::segment_records).collect();
    write_records(&out_dir.join("segments.jsonl"), &segments)?;
    let tokens: Vec<_> = documents.iter().flat_map(Document::token_records).collect();
    write_records(&out_dir.join("tokens.jsonl"), &tokens)?;
    if let Some(labeled) = &labeled {
        let records: Vec<_> = labeled.iter().flat_map(Document::token_records).collect();
        write_records(&out_dir.join("labeled.jsonl"), &records)?;
    }
    Ok(())
}

fn write_records<T: serde::Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("falha ao criar {}", path.display()))?;
    write_jsonl(BufWriter::new(file), records)?;
    info!(path = %path.display(), records = records.len(), "JSONL gravado");
    Ok(())
}
