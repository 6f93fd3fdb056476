//! # clinical-core — Segmentação de Notas Clínicas e Alinhamento BIO
//!
//! Este crate decompõe notas clínicas (chinês, inglês ou mistas) de forma
//! determinística em **documento → seção → sentença → token** e alinha spans
//! de entidades vindos de um rotulador externo com os tokens, no esquema BIO.
//!
//! ## Arquitetura do Sistema
//!
//! O dado flui em uma única direção:
//!
//! 1.  **Entrada**: Texto bruto da nota (String).
//! 2.  **Seções** ([`section`]): cabeçalhos detectados linha a linha e convertidos em blocos.
//! 3.  **Sentenças** ([`segmenter`]): estratégia de corte por seção, fusão de fragmentos curtos e de enumeradores.
//! 4.  **Tokens** ([`tokenizer`]): tokenização colada ou por pontuação, com recuperação de offsets.
//! 5.  **Rotulagem** ([`labeling`], [`align`]): spans do rotulador viram tags BIO por token.
//! 6.  **Saída**: [`Document`] e registros JSONL ([`document`]).
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use clinical_core::ClinicalPipeline;
//!
//! let pipeline = ClinicalPipeline::new();
//! let note = "主訴：胸痛三天。\n診斷：\n# CAD s/p PCI\n";
//!
//! let doc = pipeline.segment("note1", note).unwrap();
//! let dx = doc.section("診斷").unwrap();
//! let texts: Vec<&str> = dx.sentences.iter().map(|s| s.text.as_str()).collect();
//! assert_eq!(texts, vec!["CAD", "PCI"]);
//! ```
//!
//! ## Módulos Principais
//!
//! - [`pipeline`]: Orquestrador que conecta todos os estágios e emite eventos.
//! - [`lexicon`]: Rotulador local por dicionário e regex.
//! - [`corpus`]: Notas de demonstração.

pub mod align;
pub mod corpus;
pub mod document;
pub mod error;
pub mod labeling;
pub mod lexicon;
pub mod offset;
pub mod pipeline;
pub mod section;
pub mod segmenter;
pub mod tagger;
pub mod tokenizer;

pub use document::{Document, Section, SegmentRecord, Sentence, TokenRecord};
pub use error::{Error, Result};
pub use labeling::{label_document, EntityLabeler};
pub use lexicon::LexiconLabeler;
pub use pipeline::{ClinicalPipeline, PipelineEvent};
pub use section::SectionKind;
pub use segmenter::SegmenterConfig;
pub use tagger::{EntityGroup, EntitySpan, Tag};
pub use tokenizer::{Token, TokenizerMode};
