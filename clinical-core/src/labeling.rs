//! # Capacidade de Rotulagem
//!
//! O pipeline de segmentação não sabe de onde vêm as entidades: ele só
//! depende de algo que, dado o texto de uma sentença, devolva spans
//! ([`EntityLabeler`]). O serviço HTTP de NER e o léxico local são duas
//! implementações da mesma capacidade.
//!
//! [`label_document`] percorre o documento **sequencialmente** (seções em
//! ordem, sentenças por índice, uma requisição por vez). A primeira falha
//! interrompe o lote: sentenças já rotuladas mantêm seus rótulos e as não
//! alcançadas ficam `O`, mesmo que o documento já tivesse rótulos antigos.

use std::future::Future;

use tracing::{debug, error};

use crate::align::apply_labels;
use crate::document::Document;
use crate::error::Result;
use crate::tagger::EntitySpan;

/// Algo capaz de rotular entidades num texto.
///
/// Os spans devolvidos usam offsets em **caracteres** sobre `text`.
pub trait EntityLabeler {
    fn label(&self, text: &str) -> impl Future<Output = Result<Vec<EntitySpan>>> + Send;
}

/// Rotula todas as sentenças do documento, escrevendo o rótulo de cada token.
///
/// Devolve o número de sentenças rotuladas.
pub async fn label_document<L: EntityLabeler>(labeler: &L, document: &mut Document) -> Result<usize> {
    let mut labeled = 0;
    document.clear_labels();

    for section in &mut document.sections {
        section.sentences.sort_by_key(|s| s.index);
        for sentence in &mut section.sentences {
            let spans = labeler.label(&sentence.text).await.map_err(|err| {
                error!(
                    file = %document.file,
                    section = %section.name,
                    sentence = sentence.index,
                    "rotulagem interrompida: {err}"
                );
                err
            })?;
            debug!(
                section = %section.name,
                sentence = sentence.index,
                spans = spans.len(),
                "sentença rotulada"
            );
            apply_labels(&mut sentence.tokens, &spans);
            labeled += 1;
        }
    }

    Ok(labeled)
}
