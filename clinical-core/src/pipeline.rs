//! # Pipeline Clínico — Orquestrador com Eventos Observáveis
//!
//! O pipeline coordena os estágios determinísticos (detecção de seções,
//! recorte em blocos, segmentação de sentenças, tokenização) e emite eventos
//! em cada passo via um canal Rust (`mpsc`), permitindo que o servidor
//! WebSocket transmita o progresso em tempo real para o cliente.
//!
//! A rotulagem de entidades fica fora: é uma capacidade injetada
//! ([`EntityLabeler`]) aplicada depois sobre o [`Document`] pronto.

use std::sync::mpsc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, Section, Sentence};
use crate::error::{Error, Result};
use crate::labeling::{label_document, EntityLabeler};
use crate::offset::CharMap;
use crate::section::{detect_sections, preamble_block, slice_blocks, Block, SectionKind};
use crate::segmenter::{finalize_span, segment_block, segment_fallback, SegmenterConfig, TextSpan};
use crate::tokenizer::tokenize_sentence;

/// Resumo de uma seção detectada (offsets em caracteres).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Eventos emitidos pelo pipeline durante o processamento.
///
/// Permitem que a UI acompanhe a decomposição passo a passo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// **Passo 1**: Seções detectadas (ou fallback "全文" sem cabeçalhos).
    SectionsDetected {
        sections: Vec<SectionSummary>,
        fallback: bool,
    },
    /// **Passo 2**: Uma sentença foi segmentada e tokenizada.
    SentenceSegmented {
        section: String,
        sentence: Sentence,
    },
    /// **Passo 3**: Tokenização concluída para o documento inteiro.
    TokenizationDone {
        total_sentences: usize,
        total_tokens: usize,
    },
    /// **Conclusão**: Documento pronto.
    Done {
        document: Document,
        processing_ms: u64,
    },
    /// **Falha**: Ocorreu um erro irrecuperável.
    Error {
        message: String,
    },
}

/// O pipeline de segmentação.
///
/// # Modos de Uso
/// - **Sync**: [`ClinicalPipeline::segment`] para scripts e chamadas diretas.
/// - **Streaming**: [`ClinicalPipeline::segment_streaming`] para UIs reativas.
/// - **Lote**: [`ClinicalPipeline::segment_many`], documentos em paralelo.
#[derive(Debug, Clone, Default)]
pub struct ClinicalPipeline {
    pub config: SegmenterConfig,
}

impl ClinicalPipeline {
    /// Cria o pipeline com os limiares padrão.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segmenta e tokeniza um documento.
    ///
    /// Falha apenas com [`Error::InputEmpty`] quando o texto é vazio ou só
    /// espaços.
    pub fn segment(&self, file: &str, text: &str) -> Result<Document> {
        self.run(file, text, None)
    }

    /// Executa o pipeline enviando eventos de progresso em tempo real.
    ///
    /// # Fluxo de Eventos
    /// 1. `SectionsDetected`
    /// 2. `SentenceSegmented` (uma por sentença, em ordem)
    /// 3. `TokenizationDone`
    /// 4. `Done` com o documento, ou `Error`
    pub fn segment_streaming(&self, file: &str, text: &str, tx: mpsc::Sender<PipelineEvent>) {
        let start = Instant::now();
        match self.run(file, text, Some(&tx)) {
            Ok(document) => {
                let _ = tx.send(PipelineEvent::Done {
                    document,
                    processing_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(err) => {
                let _ = tx.send(PipelineEvent::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Segmenta vários documentos independentes em paralelo.
    ///
    /// Cada entrada é `(file, text)`; a ordem do resultado acompanha a entrada.
    pub fn segment_many(&self, inputs: &[(String, String)]) -> Vec<Result<Document>> {
        inputs
            .par_iter()
            .map(|(file, text)| self.segment(file, text))
            .collect()
    }

    /// Rotula um documento já segmentado com o rotulador informado.
    pub async fn label<L: EntityLabeler>(&self, labeler: &L, document: &mut Document) -> Result<usize> {
        label_document(labeler, document).await
    }

    fn run(&self, file: &str, text: &str, tx: Option<&mpsc::Sender<PipelineEvent>>) -> Result<Document> {
        if text.trim().is_empty() {
            return Err(Error::InputEmpty);
        }

        let map = CharMap::new(text);
        let hits = detect_sections(text);
        let fallback = hits.is_empty();

        // === Passo 1: Seções e blocos ===
        let plan: Vec<(Block, Vec<TextSpan>)> = if fallback {
            let block = Block {
                kind: SectionKind::WholeText,
                start: 0,
                end: text.len(),
            };
            vec![(block, segment_fallback(text))]
        } else {
            let mut blocks = Vec::new();
            if self.config.keep_preamble {
                blocks.extend(preamble_block(text, &hits));
            }
            blocks.extend(slice_blocks(text, &hits));
            blocks
                .into_iter()
                .map(|block| {
                    let spans = segment_block(text, &block, &self.config);
                    (block, spans)
                })
                .collect()
        };

        debug!(file, sections = plan.len(), fallback, "seções detectadas");
        if let Some(tx) = tx {
            let sections = plan
                .iter()
                .map(|(block, _)| {
                    let (start, end) = map.span(block.start, block.end);
                    SectionSummary {
                        name: block.kind.name().to_string(),
                        start,
                        end,
                    }
                })
                .collect();
            let _ = tx.send(PipelineEvent::SectionsDetected { sections, fallback });
        }

        // === Passo 2: Sentenças e tokens ===
        let mut sections = Vec::with_capacity(plan.len());
        for (block, spans) in plan {
            let name = block.kind.name();
            let mode = block.kind.tokenizer_mode();

            let sentences: Vec<Sentence> = spans
                .into_iter()
                .filter_map(|span| finalize_span(text, span))
                .enumerate()
                .map(|(index, span)| {
                    let sentence_text = span.slice(text);
                    let (start, end) = map.span(span.start, span.end);
                    Sentence {
                        index,
                        start,
                        end,
                        text: sentence_text.to_string(),
                        tokens: tokenize_sentence(file, name, index, sentence_text, mode),
                    }
                })
                .collect();

            if sentences.is_empty() {
                debug!(file, section = name, "seção sem sentenças descartada");
                continue;
            }
            if let Some(tx) = tx {
                for sentence in &sentences {
                    let _ = tx.send(PipelineEvent::SentenceSegmented {
                        section: name.to_string(),
                        sentence: sentence.clone(),
                    });
                }
            }

            let (start, end) = map.span(block.start, block.end);
            sections.push(Section {
                name: name.to_string(),
                kind: block.kind,
                start,
                end,
                sentences,
            });
        }

        let document = Document {
            file: file.to_string(),
            sections,
        };

        // === Passo 3: Totais ===
        let total_sentences = document.sentence_count();
        let total_tokens = document.token_count();
        debug!(file, total_sentences, total_tokens, "tokenização concluída");
        if let Some(tx) = tx {
            let _ = tx.send(PipelineEvent::TokenizationDone {
                total_sentences,
                total_tokens,
            });
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "診斷：\n# CAD s/p PCI\n# HTN\n主訴：胸痛三天。Fever 38.5 C.\n過去病史：\nHypertension for 10 years. DM on metformin.\n住院治療經過：\n入院後給予抗生素治療，病情穩定。\n";

    fn sentence_texts<'a>(doc: &'a Document, section: &str) -> Vec<&'a str> {
        doc.section(section)
            .map(|s| s.sentences.iter().map(|x| x.text.as_str()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_pipeline_full_note() {
        let doc = ClinicalPipeline::new().segment("note1", NOTE).unwrap();

        let names: Vec<&str> = doc.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["診斷", "主訴", "過去病史", "住院治療經過"]);

        assert_eq!(sentence_texts(&doc, "診斷"), vec!["CAD", "PCI", "HTN"]);
        assert_eq!(sentence_texts(&doc, "主訴"), vec!["胸痛三天。", "Fever 38.5 C."]);
        assert_eq!(
            sentence_texts(&doc, "過去病史"),
            vec!["Hypertension for 10 years.", "DM on metformin."]
        );
        assert_eq!(sentence_texts(&doc, "住院治療經過"), vec!["入院後給予抗生素治療，病情穩定。"]);
    }

    #[test]
    fn test_sentence_offsets_point_into_raw_text() {
        let doc = ClinicalPipeline::new().segment("note1", NOTE).unwrap();
        let chars: Vec<char> = NOTE.chars().collect();
        for section in &doc.sections {
            for pair in section.sentences.windows(2) {
                assert!(pair[0].end <= pair[1].start);
            }
            for sentence in &section.sentences {
                let slice: String = chars[sentence.start..sentence.end].iter().collect();
                assert_eq!(slice, sentence.text);
                assert!(section.start <= sentence.start && sentence.end <= section.end);
            }
        }
        for pair in doc.sections.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_word_joined_sections_rebuild_sentence() {
        let doc = ClinicalPipeline::new().segment("note1", NOTE).unwrap();
        let history = doc.section("過去病史").unwrap();
        for sentence in &history.sentences {
            let rebuilt: String = sentence.tokens.iter().map(|t| t.text.as_str()).collect();
            assert_eq!(rebuilt, sentence.text);
        }
        let cc = doc.section("主訴").unwrap();
        assert_eq!(cc.sentences[1].tokens.len(), 1);
        assert_eq!(cc.sentences[1].tokens[0].meta.section, "主訴");
    }

    #[test]
    fn test_volume_units_are_not_headers() {
        let pipeline = ClinicalPipeline::new();

        let doc = pipeline
            .segment("v1", "住院治療經過：\nDrained 300 cc: serous fluid, patient stable.\n")
            .unwrap();
        assert_eq!(
            sentence_texts(&doc, "住院治療經過"),
            vec!["Drained 300 cc: serous fluid, patient stable."]
        );

        let doc = pipeline.segment("v2", "Infused NS 500 cc: tolerated well\n").unwrap();
        assert_eq!(sentence_texts(&doc, "全文"), vec!["Infused NS 500 cc: tolerated well"]);

        let doc = pipeline
            .segment("v3", "主訴：Vomiting, about 200 cc: coffee ground, since morning.\n")
            .unwrap();
        assert_eq!(
            sentence_texts(&doc, "主訴"),
            vec!["Vomiting, about 200 cc: coffee ground, since morning."]
        );
    }

    #[test]
    fn test_pipeline_empty() {
        let pipeline = ClinicalPipeline::new();
        assert!(matches!(pipeline.segment("x", ""), Err(Error::InputEmpty)));
        assert!(matches!(pipeline.segment("x", " \n\t "), Err(Error::InputEmpty)));
    }

    #[test]
    fn test_no_headers_fallback() {
        let doc = ClinicalPipeline::new()
            .segment("plain", "Patient admitted.\n\n  Fever noted\n")
            .unwrap();
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].name, "全文");
        assert_eq!(sentence_texts(&doc, "全文"), vec!["Patient admitted.", "Fever noted"]);
        assert_eq!(doc.sections[0].sentences[1].start, 21);
    }

    #[test]
    fn test_keep_preamble() {
        let raw = "Admission note for Mr Chen\nDiagnosis: CAD\n";
        let default = ClinicalPipeline::new().segment("p", raw).unwrap();
        assert_eq!(default.sections.len(), 1);
        assert_eq!(default.sections[0].name, "診斷");

        let config = SegmenterConfig {
            keep_preamble: true,
            ..SegmenterConfig::default()
        };
        let doc = ClinicalPipeline::with_config(config).segment("p", raw).unwrap();
        let names: Vec<&str> = doc.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["全文", "診斷"]);
        assert_eq!(sentence_texts(&doc, "全文"), vec!["Admission note for Mr Chen"]);
    }

    #[test]
    fn test_pipeline_events_streaming() {
        let pipeline = ClinicalPipeline::new();
        let (tx, rx) = mpsc::channel();
        pipeline.segment_streaming("note1", NOTE, tx);

        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert!(
            matches!(&events[0], PipelineEvent::SectionsDetected { fallback: false, .. }),
            "Primeiro evento deve ser SectionsDetected"
        );
        let segmented = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::SentenceSegmented { .. }))
            .count();
        assert_eq!(segmented, 8);
        assert!(matches!(
            events.last().unwrap(),
            PipelineEvent::Done { .. }
        ));

        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["type"], "SectionsDetected");
        assert_eq!(json["data"]["sections"][0]["name"], "診斷");
    }

    #[test]
    fn test_streaming_reports_empty_input() {
        let (tx, rx) = mpsc::channel();
        ClinicalPipeline::new().segment_streaming("x", "   ", tx);
        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PipelineEvent::Error { .. }));
    }

    #[test]
    fn test_segment_many_keeps_order() {
        let inputs = vec![
            ("a".to_string(), "主訴：fever".to_string()),
            ("b".to_string(), String::new()),
            ("c".to_string(), "cough\n".to_string()),
        ];
        let results = ClinicalPipeline::new().segment_many(&inputs);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().file, "a");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().sections[0].name, "全文");
    }
}
