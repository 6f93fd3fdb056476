//! # Tokenizador de Sentenças Clínicas
//!
//! Divide cada sentença em tokens e recupera a posição de cada token dentro da
//! sentença. Os offsets dos tokens são **caracteres locais à sentença**: o
//! mesmo sistema de coordenadas que o rotulador de entidades usa, o que permite
//! alinhar as duas coisas sem conversão.
//!
//! ## Estratégias
//!
//! - **WordJoined** (história pregressa, evolução): cada token é uma sequência
//!   máxima sem espaços **mais os espaços que a seguem**. A concatenação dos
//!   tokens reproduz a sentença exatamente.
//! - **Punctuation** (demais seções): corta em `,`, `;` e ` and ` fora de
//!   parênteses; ` and ` vira um token próprio. Os pedaços são aparados e os
//!   vazios descartados.
//!
//! ## Recuperação de Offsets
//!
//! Cada token é procurado na sentença a partir de um cursor:
//!
//! 1. busca exata a partir do cursor ([`OffsetRecovery::Exact`]);
//! 2. busca com espaços colapsados, convertida de volta para as coordenadas
//!    originais ([`OffsetRecovery::Collapsed`]);
//! 3. último recurso: o token é assumido na posição do cursor
//!    ([`OffsetRecovery::Assumed`]), com um aviso no log.
//!
//! O cursor avança até o fim de cada ocorrência encontrada.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use clinical_core::tokenizer::{tokenize_sentence, TokenizerMode};
//!
//! let tokens = tokenize_sentence("note1", "主訴", 0, "fever, cough and chills", TokenizerMode::Punctuation);
//! let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
//! assert_eq!(texts, vec!["fever", "cough", "and", "chills"]);
//! assert_eq!((tokens[1].start, tokens[1].end), (7, 12));
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::offset::CharMap;
use crate::tagger::Tag;

/// Metadados de um token, exportados junto com ele nos registros JSONL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub file: String,
    pub section: String,
    /// Reservado: sempre `[null, null]` na exportação.
    pub source_span: (Option<usize>, Option<usize>),
    pub sentence_index: usize,
    pub token_index: usize,
}

/// Como o offset de um token foi obtido.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetRecovery {
    /// Encontrado literalmente a partir do cursor.
    #[default]
    Exact,
    /// Encontrado após colapsar sequências de espaços.
    Collapsed,
    /// Não encontrado: posição assumida no cursor.
    Assumed,
}

/// Um token de uma sentença.
///
/// `start`/`end` são offsets em caracteres dentro de [`Sentence::text`]; o
/// span absoluto no documento é `sentence.start + token.start`.
///
/// [`Sentence::text`]: crate::document::Sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Texto do token (em WordJoined inclui os espaços finais).
    pub text: String,
    /// Caractere inicial na sentença (inclusive).
    pub start: usize,
    /// Caractere final na sentença (exclusivo).
    pub end: usize,
    /// Rótulo BIO; `O` até a rotulagem.
    #[serde(default)]
    pub label: Tag,
    pub meta: TokenMeta,
    /// Diagnóstico da recuperação de offset (não exportado).
    #[serde(skip)]
    pub recovery: OffsetRecovery,
}

impl Token {
    /// Identificador estável `<file>:<section>:<sentence_index>:<token_index>`.
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.meta.file, self.meta.section, self.meta.sentence_index, self.meta.token_index
        )
    }
}

/// Estratégias de tokenização.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerMode {
    /// **Colado**: corta nos espaços e mantém os espaços finais no token.
    /// Usado nas seções narrativas, onde a sentença é reconstruída por
    /// concatenação direta.
    WordJoined,
    /// **Pontuação**: corta em `,` `;` e ` and ` fora de parênteses.
    Punctuation,
}

impl Default for TokenizerMode {
    fn default() -> Self {
        TokenizerMode::Punctuation
    }
}

impl TokenizerMode {
    /// Separador usado para reconstruir o texto a partir dos tokens.
    pub fn joiner(&self) -> &'static str {
        match self {
            TokenizerMode::WordJoined => "",
            TokenizerMode::Punctuation => " ",
        }
    }
}

/// Divide nos espaços ASCII, anexando ao token os espaços que o seguem.
pub fn split_word_joined(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let mut j = i;
        while j < bytes.len() && bytes[j] != b' ' {
            j += 1;
        }
        while j < bytes.len() && bytes[j] == b' ' {
            j += 1;
        }
        pieces.push(&text[i..j]);
        i = j;
    }
    pieces
}

/// Divide em `,`, `;` e ` and ` (sem diferenciar maiúsculas) fora de parênteses.
///
/// O `and` é devolvido como o trecho original ("and", "AND"...), então o
/// offset continua exato. Um `)` sem par não deixa a profundidade negativa.
pub fn split_outside_parens(text: &str) -> Vec<&str> {
    const AND: &[u8] = b" and ";

    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut current_start = 0;
    let mut i = 0;

    // Todos os delimitadores são ASCII, então `i` sempre cai em fronteira de
    // caractere quando há corte.
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b' ' if depth == 0
                && bytes.len() - i >= AND.len()
                && bytes[i..i + AND.len()].eq_ignore_ascii_case(AND) =>
            {
                flush_token(&mut pieces, text, current_start, i);
                pieces.push(&text[i + 1..i + 4]);
                i += AND.len();
                current_start = i;
                continue;
            }
            b',' | b';' if depth == 0 => {
                flush_token(&mut pieces, text, current_start, i);
                current_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    flush_token(&mut pieces, text, current_start, text.len());
    pieces
}

fn flush_token<'a>(pieces: &mut Vec<&'a str>, text: &'a str, start: usize, end: usize) {
    let piece = text[start..end].trim();
    if !piece.is_empty() {
        pieces.push(piece);
    }
}

/// Divide `text` segundo o modo.
pub fn split_with_mode(text: &str, mode: TokenizerMode) -> Vec<&str> {
    match mode {
        TokenizerMode::WordJoined => split_word_joined(text),
        TokenizerMode::Punctuation => split_outside_parens(text),
    }
}

/// Texto com sequências de espaço colapsadas em um único `' '`, mais o byte
/// de origem de cada byte do texto colapsado (com sentinela no fim).
fn collapse_whitespace(text: &str) -> (String, Vec<usize>) {
    let mut collapsed = String::with_capacity(text.len());
    let mut origin = Vec::with_capacity(text.len() + 1);
    let mut in_gap = false;

    for (pos, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if !in_gap {
                collapsed.push(' ');
                origin.push(pos);
            }
            in_gap = true;
            continue;
        }
        in_gap = false;
        collapsed.push(ch);
        origin.extend(pos..pos + ch.len_utf8());
    }
    origin.push(text.len());
    (collapsed, origin)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Localiza `token` em `sentence` a partir de `cursor` (bytes).
///
/// Devolve o intervalo `[start, end)` em bytes e como ele foi obtido.
pub fn locate(sentence: &str, token: &str, cursor: usize) -> (usize, usize, OffsetRecovery) {
    let cursor = floor_char_boundary(sentence, cursor);

    if let Some(idx) = sentence[cursor..].find(token) {
        let start = cursor + idx;
        return (start, start + token.len(), OffsetRecovery::Exact);
    }

    let (collapsed, origin) = collapse_whitespace(sentence);
    let (needle, _) = collapse_whitespace(token);
    let from = origin.partition_point(|&o| o < cursor);
    if !needle.is_empty() && collapsed.is_char_boundary(from) {
        if let Some(idx) = collapsed[from..].find(needle.as_str()) {
            let j = from + idx;
            let start = origin[j];
            let end = origin[j + needle.len() - 1] + 1;
            return (start, floor_char_boundary(sentence, end).max(start), OffsetRecovery::Collapsed);
        }
    }

    let end = floor_char_boundary(sentence, cursor + token.len());
    warn!(
        token = token,
        cursor = cursor,
        "offset do token não localizado; assumindo posição do cursor"
    );
    (cursor, end, OffsetRecovery::Assumed)
}

/// Localiza uma sequência de tokens, avançando o cursor a cada ocorrência.
///
/// Devolve offsets em **caracteres** dentro de `sentence`.
pub fn recover_offsets(sentence: &str, tokens: &[&str]) -> Vec<(usize, usize, OffsetRecovery)> {
    let map = CharMap::new(sentence);
    let mut cursor = 0;
    tokens
        .iter()
        .map(|token| {
            let (start, end, recovery) = locate(sentence, token, cursor);
            cursor = end;
            let (start, end) = map.span(start, end);
            (start, end, recovery)
        })
        .collect()
}

/// Tokeniza uma sentença e monta os tokens com seus metadados.
pub fn tokenize_sentence(
    file: &str,
    section: &str,
    sentence_index: usize,
    text: &str,
    mode: TokenizerMode,
) -> Vec<Token> {
    let pieces = split_with_mode(text, mode);
    let offsets = recover_offsets(text, &pieces);

    pieces
        .into_iter()
        .zip(offsets)
        .enumerate()
        .map(|(token_index, (piece, (start, end, recovery)))| Token {
            text: piece.to_string(),
            start,
            end,
            label: Tag::Outside,
            meta: TokenMeta {
                file: file.to_string(),
                section: section.to_string(),
                source_span: (None, None),
                sentence_index,
                token_index,
            },
            recovery,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    fn spans(tokens: &[Token]) -> Vec<(usize, usize)> {
        tokens.iter().map(|t| (t.start, t.end)).collect()
    }

    #[test]
    fn test_word_joined_keeps_trailing_spaces() {
        let text = "Hx of  DM, on insulin";
        let tokens = tokenize_sentence("f", "過去病史", 0, text, TokenizerMode::WordJoined);
        assert_eq!(texts(&tokens), vec!["Hx ", "of  ", "DM, ", "on ", "insulin"]);
        assert_eq!(spans(&tokens), vec![(0, 3), (3, 7), (7, 11), (11, 14), (14, 21)]);
        // concatenação reconstrói a sentença
        assert_eq!(texts(&tokens).concat(), text);
    }

    #[test]
    fn test_word_joined_uses_char_offsets() {
        let tokens = tokenize_sentence("f", "過去病史", 0, "高血壓 十年", TokenizerMode::WordJoined);
        assert_eq!(texts(&tokens), vec!["高血壓 ", "十年"]);
        assert_eq!(spans(&tokens), vec![(0, 4), (4, 6)]);
    }

    #[test]
    fn test_punctuation_respects_parentheses() {
        let text = "fever, cough (productive, yellow) and chills; no rash";
        let tokens = tokenize_sentence("f", "主訴", 0, text, TokenizerMode::Punctuation);
        assert_eq!(
            texts(&tokens),
            vec!["fever", "cough (productive, yellow)", "and", "chills", "no rash"]
        );
        assert_eq!(
            spans(&tokens),
            vec![(0, 5), (7, 33), (34, 37), (38, 44), (46, 53)]
        );
        assert!(tokens.iter().all(|t| t.recovery == OffsetRecovery::Exact));
    }

    #[test]
    fn test_uppercase_and_keeps_source_text() {
        let tokens = tokenize_sentence("f", "診斷", 0, "CAD AND DM", TokenizerMode::Punctuation);
        assert_eq!(texts(&tokens), vec!["CAD", "AND", "DM"]);
        assert_eq!(spans(&tokens), vec![(0, 3), (4, 7), (8, 10)]);
    }

    #[test]
    fn test_unbalanced_close_paren() {
        assert_eq!(split_outside_parens("a) b, c"), vec!["a) b", "c"]);
        assert_eq!(split_outside_parens(" , ;"), Vec::<&str>::new());
    }

    #[test]
    fn test_offsets_are_non_decreasing() {
        let text = "pain, pain, pain and pain";
        let tokens = tokenize_sentence("f", "主訴", 0, text, TokenizerMode::Punctuation);
        for pair in tokens.windows(2) {
            assert!(pair[0].start <= pair[1].start);
            assert!(pair[0].end <= pair[1].start);
        }
        assert_eq!(spans(&tokens), vec![(0, 4), (6, 10), (12, 16), (17, 20), (21, 25)]);
    }

    #[test]
    fn test_recovery_collapsed_whitespace() {
        let recovered = recover_offsets("blood  pressure high", &["blood pressure", "high"]);
        assert_eq!(recovered[0], (0, 15, OffsetRecovery::Collapsed));
        assert_eq!(recovered[1], (16, 20, OffsetRecovery::Exact));
    }

    #[test]
    fn test_recovery_assumed_is_clamped() {
        let recovered = recover_offsets("abc", &["xyz", "abcdef"]);
        assert_eq!(recovered[0], (0, 3, OffsetRecovery::Assumed));
        assert_eq!(recovered[1], (3, 3, OffsetRecovery::Assumed));
    }

    #[test]
    fn test_meta_and_id() {
        let tokens = tokenize_sentence("note1", "主訴", 2, "胸痛, 喘", TokenizerMode::Punctuation);
        assert_eq!(tokens[1].id(), "note1:主訴:2:1");
        assert_eq!(tokens[1].meta.sentence_index, 2);
        assert_eq!(tokens[1].label, Tag::Outside);

        let json = serde_json::to_value(&tokens[0]).unwrap();
        assert_eq!(json["meta"]["source_span"], serde_json::json!([null, null]));
        assert_eq!(json["label"], "O");
        assert!(json.get("recovery").is_none());
    }
}
