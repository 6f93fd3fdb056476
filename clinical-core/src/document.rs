//! # Modelo de Documento e Registros JSONL
//!
//! Hierarquia produzida pelo pipeline:
//!
//! ```text
//! Document (file)
//! └── Section (nome canônico, span no documento)
//!     └── Sentence (índice, span absoluto, texto)
//!         └── Token (span local à sentença, rótulo BIO, meta)
//! ```
//!
//! Todos os offsets são em **caracteres**. Sentenças e seções usam offsets
//! absolutos no texto bruto; tokens usam offsets relativos à sentença.
//!
//! ## Formatos de Exportação
//!
//! | Arquivo           | Um registro por | Campos                                             |
//! |-------------------|-----------------|----------------------------------------------------|
//! | `segments.jsonl`  | sentença        | `file, section, start, end, text`                  |
//! | `tokens.jsonl`    | token           | `id, meta, text, start, end, label`                |
//! | `labeled.jsonl`   | token rotulado  | igual a `tokens.jsonl`, com os rótulos preenchidos |

use std::collections::BTreeSet;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::section::SectionKind;
use crate::tagger::Tag;
use crate::tokenizer::{Token, TokenMeta, TokenizerMode};

/// Uma sentença segmentada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    /// Posição da sentença dentro da seção (0, 1, 2...).
    pub index: usize,
    /// Caractere inicial no documento (inclusive).
    pub start: usize,
    /// Caractere final no documento (exclusivo).
    pub end: usize,
    pub text: String,
    pub tokens: Vec<Token>,
}

/// Uma seção do documento com suas sentenças em ordem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Nome canônico ("診斷", "主訴"...).
    pub name: String,
    pub kind: SectionKind,
    pub start: usize,
    pub end: usize,
    pub sentences: Vec<Sentence>,
}

impl Section {
    pub fn tokenizer_mode(&self) -> TokenizerMode {
        self.kind.tokenizer_mode()
    }
}

/// Um documento segmentado (e opcionalmente rotulado).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub file: String,
    pub sections: Vec<Section>,
}

/// Registro de `segments.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub file: String,
    pub section: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Registro de `tokens.jsonl` / `labeled.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// `<file>:<section>:<sentence_index>:<token_index>`
    pub id: String,
    pub meta: TokenMeta,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub label: Tag,
}

impl From<&Token> for TokenRecord {
    fn from(token: &Token) -> Self {
        Self {
            id: token.id(),
            meta: token.meta.clone(),
            text: token.text.clone(),
            start: token.start,
            end: token.end,
            label: token.label.clone(),
        }
    }
}

impl Document {
    /// Procura uma seção pelo nome canônico.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn sentence_count(&self) -> usize {
        self.sections.iter().map(|s| s.sentences.len()).sum()
    }

    /// Todos os tokens, na ordem seção → sentença → token.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.sections
            .iter()
            .flat_map(|s| s.sentences.iter())
            .flat_map(|s| s.tokens.iter())
    }

    pub fn token_count(&self) -> usize {
        self.tokens().count()
    }

    /// Rótulos distintos presentes nos tokens.
    pub fn distinct_labels(&self) -> BTreeSet<String> {
        self.tokens().map(|t| t.label.label()).collect()
    }

    /// Volta todos os rótulos para `O`.
    pub fn clear_labels(&mut self) {
        for section in &mut self.sections {
            for sentence in &mut section.sentences {
                for token in &mut sentence.tokens {
                    token.label = Tag::Outside;
                }
            }
        }
    }

    pub fn segment_records(&self) -> Vec<SegmentRecord> {
        self.sections
            .iter()
            .flat_map(|section| {
                section.sentences.iter().map(|sentence| SegmentRecord {
                    file: self.file.clone(),
                    section: section.name.clone(),
                    start: sentence.start,
                    end: sentence.end,
                    text: sentence.text.clone(),
                })
            })
            .collect()
    }

    pub fn token_records(&self) -> Vec<TokenRecord> {
        self.tokens().map(TokenRecord::from).collect()
    }
}

/// Escreve um registro JSON por linha.
pub fn write_jsonl<W: Write, T: Serialize>(mut writer: W, records: &[T]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Serializa os registros como texto JSONL.
pub fn to_jsonl<T: Serialize>(records: &[T]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}
