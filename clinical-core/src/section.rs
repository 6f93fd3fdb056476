//! # Detecção de Seções em Notas Clínicas
//!
//! Notas clínicas transcritas costumam ter cabeçalhos como `診斷：`, `主訴：`,
//! `Past History` ou `Hospital Course`. Este módulo:
//!
//! 1. Varre o texto **linha a linha** procurando cabeçalhos conhecidos
//!    ([`detect_sections`]). Sinônimos chineses e ingleses são normalizados para
//!    um conjunto fechado de nomes canônicos ([`SectionKind`]).
//! 2. Converte os cabeçalhos encontrados em blocos contíguos de texto
//!    ([`slice_blocks`]).
//! 3. Oferece o limpador de "vazamento" entre seções ([`clean_cross_section`]),
//!    usado quando a detecção deixa um cabeçalho seguinte dentro de um fragmento.
//!
//! Todos os offsets deste módulo são **bytes** no texto bruto.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use clinical_core::section::{detect_sections, slice_blocks, SectionKind};
//!
//! let raw = "主訴：fever for 3 days.\nDiagnosis: pneumonia\n";
//! let hits = detect_sections(raw);
//! assert_eq!(hits.len(), 2);
//! assert_eq!(hits[0].kind, SectionKind::ChiefComplaint);
//!
//! let blocks = slice_blocks(raw, &hits);
//! assert_eq!(&raw[blocks[1].start..blocks[1].end], "pneumonia\n");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tokenizer::TokenizerMode;

/// Nomes canônicos de seção.
///
/// Cada variante agrupa os sinônimos de cabeçalho que o detector reconhece.
/// `WholeText` ("全文") é o fallback quando nenhum cabeçalho é encontrado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// **Diagnóstico** (`診斷`, `Diagnosis`, `Impression`).
    Diagnosis,
    /// **Queixa principal** (`主訴`, `Chief Complaint`, `CC`).
    ChiefComplaint,
    /// **História pregressa** (`過去病史`, `既往史`, `Past (Medical) History`, `HPI`).
    PastHistory,
    /// **Evolução da internação** (`住院治療經過`, `住院經過`, `Hospital Course`).
    HospitalCourse,
    /// **Texto inteiro** (`全文`): documento sem cabeçalhos reconhecidos.
    WholeText,
}

impl SectionKind {
    /// Nome canônico usado nas chaves do documento e nos registros exportados.
    pub fn name(&self) -> &'static str {
        match self {
            SectionKind::Diagnosis => "診斷",
            SectionKind::ChiefComplaint => "主訴",
            SectionKind::PastHistory => "過去病史",
            SectionKind::HospitalCourse => "住院治療經過",
            SectionKind::WholeText => "全文",
        }
    }

    /// Tenta mapear um nome (canônico ou sinônimo de exibição) para a seção.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "診斷" | "Diagnosis" | "Impression" => Some(SectionKind::Diagnosis),
            "主訴" | "Chief Complaint" | "Chief_Complaint" => Some(SectionKind::ChiefComplaint),
            "過去病史" | "Past History" | "Past_History" => Some(SectionKind::PastHistory),
            "住院治療經過" | "Hospital Course" | "Hospital_Course" => {
                Some(SectionKind::HospitalCourse)
            }
            "全文" | "Whole Text" => Some(SectionKind::WholeText),
            _ => None,
        }
    }

    /// Seções narrativas longas são tokenizadas por espaços (tokens "colados").
    pub fn is_word_joined(&self) -> bool {
        matches!(self, SectionKind::PastHistory | SectionKind::HospitalCourse)
    }

    /// Estratégia de tokenização associada à seção.
    pub fn tokenizer_mode(&self) -> TokenizerMode {
        if self.is_word_joined() {
            TokenizerMode::WordJoined
        } else {
            TokenizerMode::Punctuation
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tabela de cabeçalhos, avaliada **em ordem de prioridade**.
///
/// Novos sinônimos entram aqui, sem tocar no fluxo de controle.
const HEADER_TABLE: &[(&str, SectionKind)] = &[
    (
        r"(?i)^\s*(?:診斷\s*[:：]|Diagnosis\s*[:：]|Impression\s*[:：])",
        SectionKind::Diagnosis,
    ),
    (
        r"(?i)^\s*(?:主訴\s*[:：]|Chief\s*Complaint\s*[:：]|CC\b\s*[:：]?)",
        SectionKind::ChiefComplaint,
    ),
    (
        r"(?i)^\s*(?:過去病史|既往史|Past\s*(?:Medical\s*)?History|History\s*of\s*Present\s*Illness|HPI\b)\s*[:：]?",
        SectionKind::PastHistory,
    ),
    (
        r"(?i)^\s*(?:住院治療經過|住院經過|住院過程|Hospital\s*Course|Hospitalization\s*Course)\s*[:：]?",
        SectionKind::HospitalCourse,
    ),
];

static SECTION_PATTERNS: Lazy<Vec<(Regex, SectionKind)>> = Lazy::new(|| {
    HEADER_TABLE
        .iter()
        .map(|(pattern, kind)| (Regex::new(pattern).expect("cabeçalho de seção inválido"), *kind))
        .collect()
});

/// Rótulos de cabeçalho procurados pelo limpador entre seções.
pub const SECTION_LABELS: &[&str] = &[
    "診斷",
    "主訴",
    "過去病史",
    "住院治療經過",
    "Diagnosis",
    "Impression",
    "Chief Complaint",
    "CC",
    "Past Medical History",
    "Past History",
    "History of Present Illness",
    "HPI",
    "Hospital Course",
    "Hospitalization Course",
];

fn label_alternation() -> String {
    SECTION_LABELS
        .iter()
        .map(|label| regex::escape(label))
        .collect::<Vec<_>>()
        .join("|")
}

/// Fragmento que é só "<cabeçalho>:".
static BARE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^(?:{})\s*[:：]\s*$", label_alternation()))
        .expect("padrão de cabeçalho isolado inválido")
});

/// Cabeçalho embutido: no início do fragmento, no início de uma linha ou logo
/// após pontuação terminal. O grupo 1 marca onde cortar.
///
/// Espaço sozinho não basta: "300 cc: serous fluid" não é cabeçalho.
static EMBEDDED_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|\n|[.。．!?！？])([ \t]*(?:{})\s*[:：])",
        label_alternation()
    ))
    .expect("padrão de cabeçalho embutido inválido")
});

/// Uma linha física do texto, incluindo o `\n` final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

/// Itera as linhas físicas (separadas por `\n`) preservando offsets.
pub fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |line| {
        let start = offset;
        offset += line.len();
        Line {
            start,
            end: offset,
            text: line,
        }
    })
}

/// Um cabeçalho encontrado no texto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderHit {
    pub kind: SectionKind,
    /// Byte onde o cabeçalho começa.
    pub header_start: usize,
    /// Byte onde o conteúdo começa (após o cabeçalho e espaços/tabs).
    pub content_start: usize,
}

/// Procura cabeçalhos de seção linha a linha.
///
/// - O primeiro padrão que casar vence; cada linha gera no máximo um cabeçalho.
/// - Cabeçalhos repetidos do mesmo nome canônico são ignorados: o texto que os
///   segue continua pertencendo à primeira ocorrência.
pub fn detect_sections(raw: &str) -> Vec<HeaderHit> {
    let mut hits: Vec<HeaderHit> = Vec::new();

    for line in lines(raw) {
        let found = SECTION_PATTERNS
            .iter()
            .find_map(|(pattern, kind)| pattern.find(line.text).map(|m| (m, *kind)));

        if let Some((m, kind)) = found {
            let bytes = line.text.as_bytes();
            let mut k = m.end();
            while k < bytes.len() && matches!(bytes[k], b' ' | b'\t') {
                k += 1;
            }
            hits.push(HeaderHit {
                kind,
                header_start: line.start + m.start(),
                content_start: line.start + k,
            });
        }
    }

    hits.sort_by_key(|hit| hit.header_start);

    let mut unique: Vec<HeaderHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        if unique.iter().all(|seen| seen.kind != hit.kind) {
            unique.push(hit);
        }
    }
    unique
}

/// Região contígua do texto atribuída a uma seção.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: SectionKind,
    pub start: usize,
    pub end: usize,
}

/// Converte cabeçalhos em blocos `[content_start_i, header_start_{i+1})`.
///
/// O último bloco vai até o fim do documento. Sem cabeçalhos não há blocos: o
/// chamador deve seguir o caminho de fallback ("全文", uma sentença por linha).
pub fn slice_blocks(raw: &str, hits: &[HeaderHit]) -> Vec<Block> {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let end = hits
                .get(i + 1)
                .map(|next| next.header_start)
                .unwrap_or(raw.len());
            Block {
                kind: hit.kind,
                start: hit.content_start.min(end),
                end,
            }
        })
        .collect()
}

/// Texto antes do primeiro cabeçalho, como bloco "全文" (se não for vazio).
pub fn preamble_block(raw: &str, hits: &[HeaderHit]) -> Option<Block> {
    let first = hits.first()?;
    if raw[..first.header_start].trim().is_empty() {
        return None;
    }
    Some(Block {
        kind: SectionKind::WholeText,
        start: 0,
        end: first.header_start,
    })
}

/// Remove de um fragmento o conteúdo que pertence a outra seção.
///
/// - Fragmento que é apenas `<cabeçalho>:` → vazio.
/// - Fragmento que contém um cabeçalho no início, no começo de uma linha ou
///   logo após o fim de uma frase → cortado antes do cabeçalho.
/// - Caso contrário, só remove espaços finais.
///
/// O resultado é sempre um **prefixo** de `text`, então o offset inicial do
/// fragmento continua válido.
pub fn clean_cross_section(text: &str) -> &str {
    if text.is_empty() {
        return text;
    }
    if BARE_HEADER.is_match(text.trim()) {
        return "";
    }
    if let Some(header) = EMBEDDED_HEADER.captures(text).and_then(|caps| caps.get(1)) {
        return text[..header.start()].trim_end();
    }
    text.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_headers_detected() {
        let raw = "Patient was admitted yesterday.\nFever subsided after antibiotics.\n";
        assert!(detect_sections(raw).is_empty());
        assert!(slice_blocks(raw, &[]).is_empty());
    }

    #[test]
    fn test_synonyms_map_to_canonical_names() {
        let raw = "Impression: sepsis\nCC: fever\nPast Medical History: DM\nHospitalization Course\nstable\n";
        let kinds: Vec<SectionKind> = detect_sections(raw).iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Diagnosis,
                SectionKind::ChiefComplaint,
                SectionKind::PastHistory,
                SectionKind::HospitalCourse,
            ]
        );
    }

    #[test]
    fn test_content_start_skips_horizontal_whitespace() {
        let raw = "主訴：\t  胸痛三天\n";
        let hits = detect_sections(raw);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].header_start, 0);
        assert_eq!(&raw[hits[0].content_start..], "胸痛三天\n");
    }

    #[test]
    fn test_duplicate_headers_keep_first() {
        let raw = "Diagnosis: CAD\nCC: chest pain\nDiagnosis: HTN\n";
        let hits = detect_sections(raw);
        assert_eq!(hits.len(), 2);
        let blocks = slice_blocks(raw, &hits);
        // o segundo "Diagnosis:" fica dentro do bloco da queixa principal
        assert_eq!(&raw[blocks[1].start..blocks[1].end], "chest pain\nDiagnosis: HTN\n");
    }

    #[test]
    fn test_cc_requires_word_boundary() {
        assert!(detect_sections("CCU transfer was arranged.\n").is_empty());
        assert_eq!(detect_sections("CC fever\n")[0].kind, SectionKind::ChiefComplaint);
    }

    #[test]
    fn test_blocks_are_contiguous_and_ordered() {
        let raw = "診斷：\n# CAD\n主訴：胸痛\n住院治療經過：\n入院後穩定。\n";
        let hits = detect_sections(raw);
        let blocks = slice_blocks(raw, &hits);
        assert_eq!(blocks.len(), 3);
        for pair in blocks.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert_eq!(blocks[2].end, raw.len());
    }

    #[test]
    fn test_preamble_block() {
        let raw = "Admission note\nDiagnosis: CAD\n";
        let hits = detect_sections(raw);
        let pre = preamble_block(raw, &hits).unwrap();
        assert_eq!(&raw[pre.start..pre.end], "Admission note\n");
        assert!(preamble_block("Diagnosis: CAD\n", &detect_sections("Diagnosis: CAD\n")).is_none());
    }

    #[test]
    fn test_clean_cross_section_bare_header() {
        assert_eq!(clean_cross_section("  主訴：  \n"), "");
        assert_eq!(clean_cross_section("Chief Complaint:"), "");
    }

    #[test]
    fn test_clean_cross_section_truncates_embedded_header() {
        assert_eq!(
            clean_cross_section("Condition remained stable. 主訴：chest pain"),
            "Condition remained stable."
        );
        assert_eq!(
            clean_cross_section("CAD s/p PCI\nHospital Course: admitted"),
            "CAD s/p PCI"
        );
        assert_eq!(clean_cross_section("no header here  \n"), "no header here");
    }

    #[test]
    fn test_clean_cross_section_keeps_volume_units() {
        let text = "Drained 300 cc: serous fluid, patient stable.";
        assert_eq!(clean_cross_section(text), text);
        assert_eq!(clean_cross_section("Infused NS 500 cc: tolerated well\n"), "Infused NS 500 cc: tolerated well");
        // após pontuação terminal continua sendo cabeçalho
        assert_eq!(clean_cross_section("Stable. CC: fever"), "Stable.");
    }

    #[test]
    fn test_section_kind_names_round_trip() {
        for kind in [
            SectionKind::Diagnosis,
            SectionKind::ChiefComplaint,
            SectionKind::PastHistory,
            SectionKind::HospitalCourse,
            SectionKind::WholeText,
        ] {
            assert_eq!(SectionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(SectionKind::from_name("Past History"), Some(SectionKind::PastHistory));
        assert!(SectionKind::PastHistory.is_word_joined());
        assert!(!SectionKind::Diagnosis.is_word_joined());
    }
}
