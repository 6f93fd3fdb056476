//! # Segmentação de Sentenças
//!
//! Divide o bloco de cada seção em fragmentos do tamanho de uma sentença. A
//! estratégia depende da seção:
//!
//! | Seção                       | Corte                               | Fusão de fragmentos curtos |
//! |-----------------------------|-------------------------------------|----------------------------|
//! | 診斷 (Diagnosis)            | por linha, separadores `#` / `s/p`  | —                          |
//! | 主訴 (Chief Complaint)      | pontuação terminal                  | ≤ 18 caracteres            |
//! | 過去病史 / 住院治療經過     | por linha + pontuação terminal      | ≤ 28 caracteres            |
//! | genérica                    | pontuação terminal                  | ≤ 24 caracteres            |
//!
//! Depois do corte vêm duas passadas de limpeza:
//!
//! - [`merge_tiny_forward`]: fragmentos curtos sem pontuação terminal ("Dr",
//!   marcadores de lista, decimais truncados) são colados aos seguintes.
//! - [`merge_enumerators`]: itens numerados ("1.", "(2)", "3)") separados do
//!   conteúdo pelo corte são reunidos.
//!
//! ## Guarda de decimais
//!
//! Um `.`/`．` precedido por dígito e seguido (após espaços opcionais) por dígito
//! **não** encerra a sentença: "3.5 kg" continua inteiro.
//!
//! Todos os spans deste módulo são offsets em **bytes** no texto bruto.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::offset::char_len;
use crate::section::{clean_cross_section, lines, Block, SectionKind};

/// Pontuação que encerra uma sentença (convenções ocidental e chinesa).
pub const SENTENCE_TERMINATORS: &[char] = &['.', '。', '．', '!', '?', '！', '？'];

pub fn is_terminal(ch: char) -> bool {
    SENTENCE_TERMINATORS.contains(&ch)
}

fn is_gap(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

/// Limiares do segmentador, contados em caracteres.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Limiar de fusão para a queixa principal.
    pub chief_complaint_tiny: usize,
    /// Limiar de fusão para história pregressa e evolução.
    pub history_tiny: usize,
    /// Limiar de fusão para a estratégia genérica.
    pub generic_tiny: usize,
    /// Tamanho máximo do fragmento que absorve um sucessor numerado.
    pub enumerator_prefix_max: usize,
    /// Mantém o texto anterior ao primeiro cabeçalho como seção "全文".
    pub keep_preamble: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chief_complaint_tiny: 18,
            history_tiny: 28,
            generic_tiny: 24,
            enumerator_prefix_max: 12,
            keep_preamble: false,
        }
    }
}

/// Intervalo `[start, end)` em bytes no texto bruto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn slice<'a>(&self, raw: &'a str) -> &'a str {
        &raw[self.start..self.end]
    }

    /// Comprimento em caracteres (os limiares são contados em caracteres).
    pub fn char_len(&self, raw: &str) -> usize {
        char_len(self.slice(raw))
    }

    /// Span sem espaços nas pontas; `None` se só houver espaços.
    pub fn trimmed(&self, raw: &str) -> Option<TextSpan> {
        let text = self.slice(raw);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lead = text.len() - text.trim_start().len();
        Some(TextSpan::new(self.start + lead, self.start + lead + trimmed.len()))
    }
}

/// Separadores de diagnóstico: `#`, `##`... ou `s/p` (com `-` opcional).
static DIAGNOSIS_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)#+|(?:-\s?)?\bs/p").expect("separador de diagnóstico inválido"));

/// Fragmento que é só um marcador "<n>.".
static BARE_ENUMERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[0-9]+\.\s*$").expect("padrão de enumerador inválido"));
/// Fragmento que termina com "<n>.".
static ENUMERATOR_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+\.\s*$").expect("padrão de enumerador inválido"));
/// Fragmento que começa com "(n)", "n)" ou "n.".
static ENUMERATOR_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\(?[0-9]+\)?[.)]\s+").expect("padrão de enumerador inválido"));

/// `.`/`．` entre dígitos é separador decimal, não fim de sentença.
fn is_decimal_point(chars: &[(usize, char)], i: usize) -> bool {
    let ch = chars[i].1;
    if ch != '.' && ch != '．' {
        return false;
    }
    let prev_is_digit = i > 0 && chars[i - 1].1.is_ascii_digit();
    if !prev_is_digit {
        return false;
    }
    chars[i + 1..]
        .iter()
        .map(|(_, c)| *c)
        .find(|c| !is_gap(*c))
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
}

/// Corta `raw[start..end]` em cada pontuação terminal (com a guarda de decimais).
///
/// O espaço em branco após cada corte é pulado; o resto final (sem pontuação)
/// vira o último fragmento.
pub fn split_on_terminals(raw: &str, start: usize, end: usize) -> Vec<TextSpan> {
    let text = &raw[start..end];
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut cuts = Vec::new();
    let mut last = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];
        if is_terminal(ch) && !is_decimal_point(&chars, i) {
            let seg_end = pos + ch.len_utf8();
            cuts.push(TextSpan::new(start + last, start + seg_end));

            let mut k = i + 1;
            while k < chars.len() && is_gap(chars[k].1) {
                k += 1;
            }
            last = chars.get(k).map(|(p, _)| *p).unwrap_or(text.len());
            i = k;
            continue;
        }
        i += 1;
    }

    if last < text.len() {
        cuts.push(TextSpan::new(start + last, end));
    }
    cuts
}

/// Cola fragmentos curtos (≤ `tiny` caracteres) sem pontuação terminal aos
/// seguintes, até absorver um que termine em pontuação ou acabar a lista.
pub fn merge_tiny_forward(raw: &str, spans: Vec<TextSpan>, tiny: usize) -> Vec<TextSpan> {
    let ends_terminal = |span: &TextSpan| span.slice(raw).chars().next_back().is_some_and(is_terminal);

    let mut out = Vec::with_capacity(spans.len());
    let mut i = 0;
    while i < spans.len() {
        let mut merged = spans[i];
        i += 1;
        if merged.char_len(raw) <= tiny && !ends_terminal(&merged) {
            while i < spans.len() {
                merged.end = spans[i].end;
                i += 1;
                if ends_terminal(&spans[i - 1]) {
                    break;
                }
            }
        }
        out.push(merged);
    }
    out
}

/// Reúne itens numerados separados pelo corte.
///
/// Um fragmento é colado ao sucessor quando:
/// - é apenas um marcador `<n>.`;
/// - termina com `<n>.`;
/// - o sucessor começa com `(n)`, `n)` ou `n.` e o fragmento tem no máximo
///   `prefix_max` caracteres.
///
/// Cada fusão consome o par; o resultado não é reavaliado.
pub fn merge_enumerators(raw: &str, spans: Vec<TextSpan>, prefix_max: usize) -> Vec<TextSpan> {
    let mut out = Vec::with_capacity(spans.len());
    let mut i = 0;
    while i < spans.len() {
        let current = spans[i];
        if let Some(next) = spans.get(i + 1) {
            let frag = current.slice(raw);
            let glue = BARE_ENUMERATOR.is_match(frag.trim())
                || ENUMERATOR_TAIL.is_match(frag)
                || (ENUMERATOR_HEAD.is_match(next.slice(raw)) && current.char_len(raw) <= prefix_max);
            if glue {
                out.push(TextSpan::new(current.start, next.end));
                i += 2;
                continue;
            }
        }
        out.push(current);
        i += 1;
    }
    out
}

/// Seção de diagnóstico: linha a linha, cortando nos separadores `#`/`s/p`.
///
/// Cada fragmento entre separadores é aparado e mantido se não for vazio; uma
/// linha sem separador é um fragmento só. Por fim cada fragmento passa pelo
/// limpador entre seções.
pub fn split_diagnosis(raw: &str, start: usize, end: usize) -> Vec<TextSpan> {
    let mut pieces = Vec::new();

    for line in lines(&raw[start..end]) {
        if line.text.trim().is_empty() {
            continue;
        }
        let base = start + line.start;
        let mut cursor = 0;
        for sep in DIAGNOSIS_SEPARATOR.find_iter(line.text) {
            pieces.extend(TextSpan::new(base + cursor, base + sep.start()).trimmed(raw));
            cursor = sep.end();
        }
        pieces.extend(TextSpan::new(base + cursor, base + line.text.len()).trimmed(raw));
    }

    pieces
        .into_iter()
        .filter_map(|span| {
            let cleaned = clean_cross_section(span.slice(raw));
            (!cleaned.is_empty()).then(|| TextSpan::new(span.start, span.start + cleaned.len()))
        })
        .collect()
}

/// Aplica a estratégia da seção a um bloco.
pub fn segment_block(raw: &str, block: &Block, config: &SegmenterConfig) -> Vec<TextSpan> {
    match block.kind {
        SectionKind::Diagnosis => split_diagnosis(raw, block.start, block.end),
        SectionKind::ChiefComplaint => {
            let spans = split_on_terminals(raw, block.start, block.end);
            let spans = merge_tiny_forward(raw, spans, config.chief_complaint_tiny);
            merge_enumerators(raw, spans, config.enumerator_prefix_max)
        }
        SectionKind::PastHistory | SectionKind::HospitalCourse => {
            let mut spans = Vec::new();
            for line in lines(&raw[block.start..block.end]) {
                if line.text.trim().is_empty() {
                    continue;
                }
                spans.extend(split_on_terminals(
                    raw,
                    block.start + line.start,
                    block.start + line.end,
                ));
            }
            let spans = merge_tiny_forward(raw, spans, config.history_tiny);
            merge_enumerators(raw, spans, config.enumerator_prefix_max)
        }
        SectionKind::WholeText => {
            let spans = split_on_terminals(raw, block.start, block.end);
            let spans = merge_tiny_forward(raw, spans, config.generic_tiny);
            merge_enumerators(raw, spans, config.enumerator_prefix_max)
        }
    }
}

/// Fallback sem cabeçalhos: cada linha não vazia, já limpa, é uma sentença.
pub fn segment_fallback(raw: &str) -> Vec<TextSpan> {
    lines(raw)
        .filter(|line| !line.text.trim().is_empty())
        .filter_map(|line| {
            let cleaned = clean_cross_section(line.text);
            (!cleaned.is_empty()).then(|| TextSpan::new(line.start, line.start + cleaned.len()))
        })
        .collect()
}

/// Forma final de um fragmento como sentença: limpo entre seções e sem
/// espaços à esquerda. `None` se nada sobrar.
pub fn finalize_span(raw: &str, span: TextSpan) -> Option<TextSpan> {
    let cleaned = clean_cross_section(span.slice(raw));
    let lead = cleaned.len() - cleaned.trim_start().len();
    if cleaned.trim().is_empty() {
        return None;
    }
    Some(TextSpan::new(span.start + lead, span.start + cleaned.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(raw: &'a str, spans: &[TextSpan]) -> Vec<&'a str> {
        spans.iter().map(|s| s.slice(raw)).collect()
    }

    #[test]
    fn test_decimal_guard() {
        let raw = "Patient weight is 3.5 kg and stable.";
        let spans = split_on_terminals(raw, 0, raw.len());
        assert_eq!(texts(raw, &spans), vec![raw]);
    }

    #[test]
    fn test_split_mixed_punctuation() {
        let raw = "胸痛三天。Fever 38.5 C! Cough?  none";
        let spans = split_on_terminals(raw, 0, raw.len());
        assert_eq!(
            texts(raw, &spans),
            vec!["胸痛三天。", "Fever 38.5 C!", "Cough?", "none"]
        );
    }

    #[test]
    fn test_fullwidth_decimal_guard() {
        let raw = "體溫３８．５度。Temp 38． 5";
        // dígitos de largura total não ativam a guarda; "38． 5" sim
        let spans = split_on_terminals(raw, 0, raw.len());
        assert_eq!(texts(raw, &spans), vec!["體溫３８．", "５度。", "Temp 38． 5"]);
    }

    #[test]
    fn test_spans_are_increasing_and_inside_block() {
        let raw = "xx. One. Two! Three";
        let spans = split_on_terminals(raw, 4, raw.len());
        for pair in spans.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert_eq!(spans.first().unwrap().start, 4);
        assert_eq!(spans.last().unwrap().end, raw.len());
    }

    #[test]
    fn test_merge_tiny_forward_absorbs_until_terminal() {
        let raw = "Dr Wang saw pt\nhe said ok\nall good.\nNext sentence is long enough.";
        let spans = vec![
            TextSpan::new(0, 15),
            TextSpan::new(15, 26),
            TextSpan::new(26, 35),
            TextSpan::new(36, raw.len()),
        ];
        let merged = merge_tiny_forward(raw, spans, 18);
        assert_eq!(
            texts(raw, &merged),
            vec!["Dr Wang saw pt\nhe said ok\nall good.", "Next sentence is long enough."]
        );
    }

    #[test]
    fn test_merge_tiny_forward_keeps_terminal_fragments() {
        let raw = "Ok. Fine.";
        let spans = split_on_terminals(raw, 0, raw.len());
        let merged = merge_tiny_forward(raw, spans.clone(), 18);
        assert_eq!(merged, spans);
    }

    #[test]
    fn test_enumerator_bare_marker_merges() {
        let raw = "1. Chief complaint: fever";
        let spans = vec![TextSpan::new(0, 2), TextSpan::new(3, raw.len())];
        let merged = merge_enumerators(raw, spans, 12);
        assert_eq!(texts(raw, &merged), vec!["1. Chief complaint: fever"]);
    }

    #[test]
    fn test_enumerator_tail_and_head() {
        let raw = "Problems 2. CAD with stent. Hx (1) DM";
        let spans = vec![
            TextSpan::new(0, 11),
            TextSpan::new(12, 27),
            TextSpan::new(28, 30),
            TextSpan::new(31, raw.len()),
        ];
        let merged = merge_enumerators(raw, spans, 12);
        assert_eq!(
            texts(raw, &merged),
            vec!["Problems 2. CAD with stent.", "Hx (1) DM"]
        );
    }

    #[test]
    fn test_enumerator_head_needs_short_prefix() {
        let raw = "This fragment is long enough. 2) next item";
        let spans = vec![TextSpan::new(0, 29), TextSpan::new(30, raw.len())];
        let merged = merge_enumerators(raw, spans.clone(), 12);
        assert_eq!(merged, spans);
    }

    #[test]
    fn test_split_diagnosis_separators() {
        let raw = "# CAD ## HTN\n- s/p PCI  \n\nType 2 DM\n";
        let spans = split_diagnosis(raw, 0, raw.len());
        assert_eq!(texts(raw, &spans), vec!["CAD", "HTN", "PCI", "Type 2 DM"]);
    }

    #[test]
    fn test_split_diagnosis_sp_without_dash() {
        let raw = "CAD S/P CABG\n";
        let spans = split_diagnosis(raw, 0, raw.len());
        assert_eq!(texts(raw, &spans), vec!["CAD", "CABG"]);
    }

    #[test]
    fn test_split_diagnosis_drops_leaked_header() {
        let raw = "Pneumonia\n主訴：\n";
        let spans = split_diagnosis(raw, 0, raw.len());
        assert_eq!(texts(raw, &spans), vec!["Pneumonia"]);
    }

    #[test]
    fn test_history_block_is_line_based() {
        let raw = "Hypertension for years\nDM on metformin. No allergy.\n";
        let block = Block { kind: SectionKind::PastHistory, start: 0, end: raw.len() };
        let spans = segment_block(raw, &block, &SegmenterConfig::default());
        assert_eq!(
            texts(raw, &spans),
            vec!["Hypertension for years\nDM on metformin.", "No allergy."]
        );
    }

    #[test]
    fn test_fallback_one_sentence_per_line() {
        let raw = "line one. still one\n\n   \nline two\n";
        let spans = segment_fallback(raw);
        assert_eq!(texts(raw, &spans), vec!["line one. still one", "line two"]);
    }

    #[test]
    fn test_finalize_span_trims_and_cleans() {
        let raw = "\n  stable. 主訴：chest pain";
        let span = finalize_span(raw, TextSpan::new(0, raw.len())).unwrap();
        assert_eq!(span.slice(raw), "stable.");
        assert!(finalize_span("  \n", TextSpan::new(0, 3)).is_none());
    }
}
