//! # Alinhamento Span → BIO
//!
//! O rotulador devolve spans em caracteres sobre o texto da sentença; aqui
//! eles viram uma tag por token.
//!
//! Para cada span, os tokens que o sobrepõem (sobreposição > 0) recebem, em
//! ordem, `B-<ENT>` e depois `I-<ENT>`. Quando spans concorrem pelo mesmo token
//! vence o de **maior sobreposição**; em empate fica a atribuição anterior.
//! Tokens não tocados por nenhum span ficam `O`.

use crate::tagger::{EntitySpan, Tag};
use crate::tokenizer::Token;

fn overlap(a: (usize, usize), b: (usize, usize)) -> usize {
    a.1.min(b.1).saturating_sub(a.0.max(b.0))
}

/// Calcula as tags BIO para tokens com os offsets `[start, end)` informados.
pub fn assign_bio(offsets: &[(usize, usize)], spans: &[EntitySpan]) -> Vec<Tag> {
    let mut tags = vec![Tag::Outside; offsets.len()];
    let mut best = vec![0usize; offsets.len()];

    for span in spans {
        let touched = offsets
            .iter()
            .enumerate()
            .filter_map(|(i, &tok)| {
                let ov = overlap(tok, (span.start, span.end));
                (ov > 0).then_some((i, ov))
            });

        for (rank, (i, ov)) in touched.enumerate() {
            if ov > best[i] {
                tags[i] = if rank == 0 {
                    Tag::begin(&span.label)
                } else {
                    Tag::inside(&span.label)
                };
                best[i] = ov;
            }
        }
    }

    tags
}

/// Escreve as tags alinhadas nos próprios tokens (uma vez por token).
pub fn apply_labels(tokens: &mut [Token], spans: &[EntitySpan]) {
    let offsets: Vec<(usize, usize)> = tokens.iter().map(|t| (t.start, t.end)).collect();
    for (token, tag) in tokens.iter_mut().zip(assign_bio(&offsets, spans)) {
        token.label = tag;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{tokenize_sentence, TokenizerMode};

    fn labels(tags: &[Tag]) -> Vec<String> {
        tags.iter().map(Tag::label).collect()
    }

    #[test]
    fn test_single_span_covers_tokens() {
        let offsets = [(0, 4), (5, 10), (11, 14)];
        let tags = assign_bio(&offsets, &[EntitySpan::new(0, 10, "DISEASE")]);
        assert_eq!(labels(&tags), vec!["B-DISEASE", "I-DISEASE", "O"]);
    }

    #[test]
    fn test_no_spans_all_outside() {
        let tags = assign_bio(&[(0, 3), (4, 8)], &[]);
        assert!(tags.iter().all(Tag::is_outside));
        assert!(assign_bio(&[], &[EntitySpan::new(0, 3, "X")]).is_empty());
    }

    #[test]
    fn test_larger_overlap_wins() {
        // token (0,10): 4 caracteres com A, 6 com B
        let offsets = [(0, 10)];
        let spans = [EntitySpan::new(0, 4, "A"), EntitySpan::new(4, 10, "B")];
        assert_eq!(labels(&assign_bio(&offsets, &spans)), vec!["B-B"]);
    }

    #[test]
    fn test_tie_keeps_earlier_assignment() {
        let offsets = [(0, 10)];
        let spans = [EntitySpan::new(0, 5, "A"), EntitySpan::new(5, 10, "B")];
        assert_eq!(labels(&assign_bio(&offsets, &spans)), vec!["B-A"]);
    }

    #[test]
    fn test_second_span_inside_of_first_token_group() {
        // o segundo span só toca o token 1, onde sobrepõe mais
        let offsets = [(0, 5), (6, 12)];
        let spans = [EntitySpan::new(0, 7, "A"), EntitySpan::new(6, 12, "B")];
        assert_eq!(labels(&assign_bio(&offsets, &spans)), vec!["B-A", "B-B"]);
    }

    #[test]
    fn test_span_order_does_not_matter() {
        let offsets = [(0, 10)];
        let forward = [EntitySpan::new(0, 4, "A"), EntitySpan::new(4, 10, "B")];
        let reverse = [EntitySpan::new(4, 10, "B"), EntitySpan::new(0, 4, "A")];
        assert_eq!(labels(&assign_bio(&offsets, &forward)), vec!["B-B"]);
        assert_eq!(labels(&assign_bio(&offsets, &reverse)), vec!["B-B"]);

        let offsets = [(0, 5), (6, 12)];
        let forward = [EntitySpan::new(0, 7, "A"), EntitySpan::new(6, 12, "B")];
        let reverse = [EntitySpan::new(6, 12, "B"), EntitySpan::new(0, 7, "A")];
        assert_eq!(assign_bio(&offsets, &forward), assign_bio(&offsets, &reverse));
    }

    #[test]
    fn test_span_over_three_tokens() {
        let offsets = [(0, 5), (6, 9), (10, 16)];
        let tags = assign_bio(&offsets, &[EntitySpan::new(0, 19, "DISEASE")]);
        assert_eq!(labels(&tags), vec!["B-DISEASE", "I-DISEASE", "I-DISEASE"]);
    }

    #[test]
    fn test_prefixed_remote_label_is_normalised() {
        let tags = assign_bio(&[(0, 3)], &[EntitySpan::new(0, 3, "B-DRUG")]);
        assert_eq!(labels(&tags), vec!["B-DRUG"]);
    }

    #[test]
    fn test_apply_labels_on_sentence_tokens() {
        let mut tokens = tokenize_sentence(
            "f",
            "主訴",
            0,
            "chest pain, dyspnea and fever",
            TokenizerMode::Punctuation,
        );
        apply_labels(&mut tokens, &[EntitySpan::new(0, 10, "SYMPTOM"), EntitySpan::new(24, 29, "SYMPTOM")]);
        let got: Vec<String> = tokens.iter().map(|t| t.label.label()).collect();
        assert_eq!(got, vec!["B-SYMPTOM", "O", "O", "B-SYMPTOM"]);
    }

    #[test]
    fn test_apply_labels_twice_is_stable() {
        let mut tokens = tokenize_sentence("f", "主訴", 0, "chest pain, fever", TokenizerMode::Punctuation);
        let spans = [EntitySpan::new(0, 10, "SYMPTOM")];
        apply_labels(&mut tokens, &spans);
        let first: Vec<String> = tokens.iter().map(|t| t.label.label()).collect();
        apply_labels(&mut tokens, &spans);
        let second: Vec<String> = tokens.iter().map(|t| t.label.label()).collect();
        assert_eq!(first, vec!["B-SYMPTOM", "O"]);
        assert_eq!(first, second);
    }
}
