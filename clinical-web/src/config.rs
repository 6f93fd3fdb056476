//! Linha de comando e configuração do serviço.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use clinical_core::{LexiconLabeler, SegmenterConfig};

use crate::labeler::{model_endpoint, Backend, HttpLabeler, LabelerConfig, DEFAULT_MODEL};
use crate::report::{ReportOptions, DEFAULT_SUBTITLE, DEFAULT_TITLE};

#[derive(Debug, Parser)]
#[command(
    name = "clinical-web",
    version,
    about = "Segmenta notas clínicas em seções, sentenças e tokens, com NER opcional"
)]
pub struct Cli {
    /// Filtro de log (sintaxe do EnvFilter).
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log: String,

    #[command(flatten)]
    pub labeler: LabelerArgs,

    /// Mantém o texto anterior ao primeiro cabeçalho como seção "全文".
    #[arg(long, global = true)]
    pub keep_preamble: bool,

    /// Título do relatório HTML.
    #[arg(long, default_value = DEFAULT_TITLE, global = true)]
    pub title: String,

    /// Subtítulo do relatório HTML.
    #[arg(long, default_value = DEFAULT_SUBTITLE, global = true)]
    pub subtitle: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe o servidor HTTP/WebSocket.
    Serve {
        /// Endereço de escuta.
        #[arg(long, default_value = "0.0.0.0:3000")]
        addr: String,
    },
    /// Processa arquivos e grava o relatório HTML e os JSONL.
    Render {
        /// Notas clínicas em texto puro.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Diretório de saída.
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
        /// Nome do arquivo HTML.
        #[arg(long, default_value = "ner_report.html")]
        out: String,
        /// Rotula as sentenças depois de segmentar.
        #[arg(long)]
        ner: bool,
    },
}

/// Opções do rotulador de entidades.
#[derive(Debug, Clone, Args)]
pub struct LabelerArgs {
    /// Token da API de inferência.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true, global = true)]
    pub hf_token: Option<String>,

    /// Modelo hospedado.
    #[arg(long, default_value = DEFAULT_MODEL, global = true)]
    pub model: String,

    /// Endpoint completo (substitui o derivado de `--model`).
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Tempo máximo por requisição, em segundos.
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout_secs: u64,

    /// Usa o léxico clínico embutido em vez do serviço remoto.
    #[arg(long, global = true)]
    pub lexicon: bool,
}

impl LabelerArgs {
    pub fn labeler_config(&self) -> LabelerConfig {
        LabelerConfig {
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| model_endpoint(&self.model)),
            token: self.hf_token.clone().filter(|t| !t.trim().is_empty()),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Léxico se pedido; remoto se houver token ou endpoint próprio; senão nenhum.
    pub fn backend(&self, client: reqwest::Client) -> Backend {
        let config = self.labeler_config();
        if self.lexicon {
            Backend::Lexicon(LexiconLabeler::clinical())
        } else if config.token.is_some() || self.endpoint.is_some() {
            Backend::Remote(HttpLabeler::with_client(client, config))
        } else {
            Backend::Disabled
        }
    }
}

impl Cli {
    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            keep_preamble: self.keep_preamble,
            ..SegmenterConfig::default()
        }
    }

    pub fn report_options(&self, interactive: bool) -> ReportOptions {
        ReportOptions {
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            interactive,
            default_model: self.labeler.model.clone(),
            ..ReportOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_command() {
        let cli = Cli::try_parse_from([
            "clinical-web",
            "render",
            "a.txt",
            "b.txt",
            "--ner",
            "--lexicon",
            "--keep-preamble",
        ])
        .unwrap();
        match &cli.command {
            Command::Render { inputs, ner, out_dir, .. } => {
                assert_eq!(inputs.len(), 2);
                assert!(*ner);
                assert_eq!(out_dir, &PathBuf::from("out"));
            }
            other => panic!("comando inesperado: {other:?}"),
        }
        assert!(cli.segmenter_config().keep_preamble);
        assert_eq!(cli.labeler.backend(reqwest::Client::new()).name(), "lexicon");
    }

    #[test]
    fn test_labeler_endpoint_from_model() {
        let cli = Cli::try_parse_from([
            "clinical-web",
            "serve",
            "--model",
            "org/clinical-ner",
            "--hf-token",
            "hf_abc",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        let config = cli.labeler.labeler_config();
        assert_eq!(config.endpoint, "https://api-inference.huggingface.co/models/org/clinical-ner");
        assert_eq!(config.token.as_deref(), Some("hf_abc"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(cli.labeler.backend(reqwest::Client::new()).name(), "remote");
    }

    #[test]
    fn test_render_requires_inputs() {
        assert!(Cli::try_parse_from(["clinical-web", "render"]).is_err());
    }
}
