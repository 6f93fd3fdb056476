//! # Conversão de Offsets (byte ↔ caractere)
//!
//! Internamente o pipeline fatia strings por **bytes** (o único índice seguro em
//! Rust), mas tudo o que sai do crate usa **caracteres** (escalares Unicode):
//! é isso que o serviço de NER devolve e o que os registros JSONL carregam.
//!
//! Em notas clínicas com chinês a diferença é grande: "診斷" tem 2 caracteres
//! e 6 bytes.

/// Tabela pré-computada de byte → índice de caractere para um texto.
///
/// Para textos ASCII a tabela é dispensada (byte == caractere).
#[derive(Debug, Clone)]
pub struct CharMap {
    byte_to_char: Vec<usize>,
    ascii: bool,
    char_len: usize,
}

impl CharMap {
    pub fn new(text: &str) -> Self {
        if text.is_ascii() {
            return Self {
                byte_to_char: Vec::new(),
                ascii: true,
                char_len: text.len(),
            };
        }

        let mut byte_to_char = vec![0; text.len() + 1];
        let mut count = 0;
        for (char_idx, (byte_idx, ch)) in text.char_indices().enumerate() {
            for slot in &mut byte_to_char[byte_idx..byte_idx + ch.len_utf8()] {
                *slot = char_idx;
            }
            count = char_idx + 1;
        }
        byte_to_char[text.len()] = count;

        Self {
            byte_to_char,
            ascii: false,
            char_len: count,
        }
    }

    /// Índice de caractere do byte informado (satura no fim do texto).
    pub fn char_at(&self, byte_idx: usize) -> usize {
        if self.ascii {
            byte_idx.min(self.char_len)
        } else {
            self.byte_to_char
                .get(byte_idx)
                .copied()
                .unwrap_or(self.char_len)
        }
    }

    /// Converte um intervalo de bytes `[start, end)` em caracteres.
    pub fn span(&self, start: usize, end: usize) -> (usize, usize) {
        (self.char_at(start), self.char_at(end))
    }

    /// Número total de caracteres do texto.
    pub fn char_len(&self) -> usize {
        self.char_len
    }
}

/// Comprimento em caracteres (não em bytes).
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
