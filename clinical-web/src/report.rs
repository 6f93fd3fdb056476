//! # Relatório HTML
//!
//! Camada de apresentação sobre os documentos segmentados/rotulados:
//!
//! - paleta estável por entidade ([`build_palette`]);
//! - conjunto de rótulos observados ([`LabelSet`]), sempre com `O`;
//! - ordenação natural de arquivos e ordem preferida de seções;
//! - resumo das entidades por seção;
//! - página renderizada com askama (`templates/report.html`).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use askama::Template;
use clinical_core::tagger::{group_entities, EntityGroup};
use clinical_core::{Document, Tag};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_TITLE: &str = "臨床 NER 標註報告";
pub const DEFAULT_SUBTITLE: &str = "貼上病歷文字 → 斷段/分詞 → 可套用 Hugging Face NER → 下載三種 JSONL";

/// Seções exibidas primeiro, nesta ordem; as demais vêm em ordem alfabética.
pub const PREFERRED_SECTIONS: &[&str] = &[
    "診斷",
    "主訴",
    "過去病史",
    "住院治療經過",
    "Diagnosis",
    "Impression",
    "Chief_Complaint",
    "Chief Complaint",
    "Past_History",
    "Past History",
    "Hospital_Course",
    "Hospital Course",
];

static CSS_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("padrão de classe CSS inválido"));

/// Converte qualquer texto num nome de classe CSS seguro.
pub fn cls_safe(s: &str) -> String {
    CSS_UNSAFE.replace_all(s, "-").into_owned()
}

/// Âncora HTML: minúsculas, só letras/dígitos (inclusive CJK), `_` e `-`.
pub fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut gap = false;
    for ch in s.to_lowercase().chars() {
        let keep = ch.is_ascii_alphanumeric()
            || ch == '_'
            || ch == '-'
            || ('\u{4e00}'..='\u{9fff}').contains(&ch);
        if keep {
            out.push(ch);
            gap = false;
        } else if !gap {
            out.push('-');
            gap = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Codifica um segmento de caminho de URL (percent-encoding).
pub fn path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Cores de fundo e borda de um rótulo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swatch {
    pub background: String,
    pub border: String,
}

/// Paleta estável: entidades ordenadas dividem o círculo de matiz igualmente.
///
/// `B-` usa o tom mais forte, `I-` o mais claro e `O` fica transparente com
/// contorno tracejado.
pub fn build_palette<'a>(labels: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, Swatch> {
    let entities: BTreeSet<String> = labels
        .into_iter()
        .filter_map(Tag::from_label)
        .filter_map(|tag| tag.entity().map(str::to_string))
        .collect();
    let total = entities.len().max(1);

    let mut palette = BTreeMap::new();
    for (i, entity) in entities.iter().enumerate() {
        let hue = 360 * i / total;
        palette.insert(
            format!("B-{entity}"),
            Swatch {
                background: format!("hsl({hue},85%,90%)"),
                border: format!("hsl({hue},70%,35%)"),
            },
        );
        palette.insert(
            format!("I-{entity}"),
            Swatch {
                background: format!("hsl({hue},85%,96%)"),
                border: format!("hsl({hue},70%,55%)"),
            },
        );
    }
    palette.insert(
        "O".to_string(),
        Swatch {
            background: "transparent".to_string(),
            border: "rgba(0,0,0,.18)".to_string(),
        },
    );
    palette
}

/// Regras CSS `.lab-<rótulo>` da paleta.
pub fn css_rules(palette: &BTreeMap<String, Swatch>) -> String {
    palette
        .iter()
        .map(|(label, swatch)| {
            let left = if label.starts_with("B-") { "3px" } else { "1px" };
            format!(
                ".lab-{}{{background:{};border:1px solid {};border-left:{} solid {};}}",
                cls_safe(label),
                swatch.background,
                swatch.border,
                left,
                swatch.border
            )
        })
        .collect::<Vec<_>>()
        .join("\n  ")
}

/// Rótulos BIO já observados. Sempre contém `O`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: BTreeSet<String>,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: BTreeSet::from(["O".to_string()]),
        }
    }
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conjunto reconstruído do zero a partir dos documentos rotulados.
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Self {
        let mut labels = Self::new();
        for document in documents {
            labels.observe(document);
        }
        labels
    }

    /// Acrescenta os rótulos de um documento.
    pub fn observe(&mut self, document: &Document) {
        self.labels.extend(document.distinct_labels());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NatChunk {
    /// Dígitos sem zeros à esquerda, comparados por (tamanho, texto).
    Num(usize, String),
    Text(String),
}

fn nat_key(s: &str) -> Vec<NatChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut digits = false;

    let mut flush = |current: &mut String, digits: bool| {
        if current.is_empty() {
            return;
        }
        if digits {
            let stripped = current.trim_start_matches('0');
            let stripped = if stripped.is_empty() { "0" } else { stripped };
            chunks.push(NatChunk::Num(stripped.len(), stripped.to_string()));
        } else {
            chunks.push(NatChunk::Text(current.to_lowercase()));
        }
        current.clear();
    };

    for ch in s.chars() {
        let is_digit = ch.is_ascii_digit();
        if is_digit != digits {
            flush(&mut current, digits);
            digits = is_digit;
        }
        current.push(ch);
    }
    flush(&mut current, digits);
    chunks
}

/// Ordem natural: `file2` < `file10`, sem diferenciar maiúsculas.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    nat_key(a).cmp(&nat_key(b))
}

/// Seções preferidas primeiro (na ordem de [`PREFERRED_SECTIONS`]), depois o
/// resto em ordem alfabética.
pub fn order_sections<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let names: BTreeSet<&str> = names.into_iter().collect();
    let mut ordered: Vec<&str> = PREFERRED_SECTIONS
        .iter()
        .filter_map(|p| names.get(p).copied())
        .collect();
    ordered.extend(names.iter().copied().filter(|n| !PREFERRED_SECTIONS.contains(n)));
    ordered
}

/// Trechos de entidade por seção, na ordem de exibição.
pub fn summarize(document: &Document) -> Vec<(String, Vec<EntityGroup>)> {
    let mut buckets: BTreeMap<&str, Vec<EntityGroup>> = BTreeMap::new();
    for section in &document.sections {
        let joiner = section.tokenizer_mode().joiner();
        let bucket = buckets.entry(section.name.as_str()).or_default();
        for sentence in &section.sentences {
            bucket.extend(group_entities(&sentence.tokens, joiner));
        }
    }

    order_sections(buckets.keys().copied())
        .into_iter()
        .filter_map(|name| {
            let groups = buckets.remove(name)?;
            (!groups.is_empty()).then(|| (name.to_string(), groups))
        })
        .collect()
}

/// Opções de apresentação do relatório.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub title: String,
    pub subtitle: String,
    /// Inclui o formulário de colagem e os links de exportação (modo servidor).
    pub interactive: bool,
    pub default_file: String,
    pub default_model: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            subtitle: DEFAULT_SUBTITLE.to_string(),
            interactive: false,
            default_file: "pasted.txt".to_string(),
            default_model: crate::labeler::DEFAULT_MODEL.to_string(),
        }
    }
}

pub struct LegendItem {
    pub label: String,
    pub class: String,
    pub background: String,
    pub border: String,
}

pub struct TokenView {
    pub text: String,
    pub label: String,
    pub class: String,
    pub start: usize,
    pub end: usize,
}

pub struct SentenceView {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub tokens: Vec<TokenView>,
}

pub struct SectionView {
    pub name: String,
    pub anchor: String,
    pub sentences: Vec<SentenceView>,
}

pub struct SummaryView {
    pub section: String,
    pub items: Vec<EntityGroup>,
}

pub struct FileView {
    pub file: String,
    pub anchor: String,
    pub href: String,
    pub labeled: bool,
    pub sentence_count: usize,
    pub token_count: usize,
    pub sections: Vec<SectionView>,
    pub summary_total: usize,
    pub summary: Vec<SummaryView>,
}

#[derive(Template)]
#[template(path = "report.html")]
pub struct ReportTemplate {
    pub title: String,
    pub subtitle: String,
    pub css_rules: String,
    pub interactive: bool,
    pub default_file: String,
    pub default_model: String,
    pub legend: Vec<LegendItem>,
    pub files: Vec<FileView>,
}

fn token_class(tag: &Tag) -> String {
    let label = tag.label();
    if tag.is_outside() {
        format!("O lab-{}", cls_safe(&label))
    } else {
        format!("lab-{}", cls_safe(&label))
    }
}

fn file_view(document: &Document, labeled: bool) -> FileView {
    let section_names = order_sections(document.sections.iter().map(|s| s.name.as_str()));
    let anchor = slug(&document.file);

    let sections = section_names
        .into_iter()
        .filter_map(|name| document.section(name))
        .map(|section| SectionView {
            name: section.name.clone(),
            anchor: format!("{anchor}-{}", slug(&section.name)),
            sentences: section
                .sentences
                .iter()
                .map(|sentence| SentenceView {
                    index: sentence.index,
                    start: sentence.start,
                    end: sentence.end,
                    text: sentence.text.clone(),
                    tokens: sentence
                        .tokens
                        .iter()
                        .map(|token| TokenView {
                            text: token.text.clone(),
                            label: token.label.label(),
                            class: token_class(&token.label),
                            start: token.start,
                            end: token.end,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    let summary: Vec<SummaryView> = summarize(document)
        .into_iter()
        .map(|(section, items)| SummaryView { section, items })
        .collect();

    FileView {
        file: document.file.clone(),
        anchor,
        href: path_segment(&document.file),
        labeled,
        sentence_count: document.sentence_count(),
        token_count: document.token_count(),
        sections,
        summary_total: summary.iter().map(|s| s.items.len()).sum(),
        summary,
    }
}

/// Documento exibido no relatório e se ele passou pela rotulagem.
pub struct ReportEntry<'a> {
    pub document: &'a Document,
    pub labeled: bool,
}

/// Monta a página com os documentos em ordem natural de arquivo.
pub fn build_report(entries: &[ReportEntry<'_>], labels: &LabelSet, options: &ReportOptions) -> ReportTemplate {
    let palette = build_palette(labels.iter());
    let legend = palette
        .iter()
        .map(|(label, swatch)| LegendItem {
            label: label.clone(),
            class: cls_safe(label),
            background: swatch.background.clone(),
            border: swatch.border.clone(),
        })
        .collect();

    let mut ordered: Vec<&ReportEntry<'_>> = entries.iter().collect();
    ordered.sort_by(|a, b| natural_cmp(&a.document.file, &b.document.file));

    ReportTemplate {
        title: options.title.clone(),
        subtitle: options.subtitle.clone(),
        css_rules: css_rules(&palette),
        interactive: options.interactive,
        default_file: options.default_file.clone(),
        default_model: options.default_model.clone(),
        legend,
        files: ordered
            .into_iter()
            .map(|entry| file_view(entry.document, entry.labeled))
            .collect(),
    }
}

/// Renderiza o relatório como HTML.
pub fn render_report(
    entries: &[ReportEntry<'_>],
    labels: &LabelSet,
    options: &ReportOptions,
) -> Result<String, askama::Error> {
    build_report(entries, labels, options).render()
}
