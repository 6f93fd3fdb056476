//! Tipos de erro do pipeline clínico.
//!
//! Apenas dois estágios podem falhar de verdade: a validação da entrada e a
//! chamada ao rotulador externo. Problemas de segmentação (fronteiras ruins,
//! offsets não localizados) degradam o resultado mas nunca abortam.

use thiserror::Error;

/// Resultado padrão das operações do crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// O texto submetido está vazio ou contém apenas espaços.
    #[error("texto de entrada vazio")]
    InputEmpty,

    /// Falha de transporte/HTTP no rotulador externo.
    #[error("falha na rotulagem remota{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    RemoteLabeling {
        /// Status HTTP devolvido pelo serviço, quando houver.
        status: Option<u16>,
        message: String,
    },

    /// Padrão de regra inválido no léxico.
    #[error("padrão inválido: {0}")]
    Pattern(#[from] regex::Error),

    #[error("erro de serialização: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("erro de IO: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Cria um erro de rotulagem remota.
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::RemoteLabeling {
            status,
            message: message.into(),
        }
    }

    /// Status HTTP associado ao erro, se for uma falha remota.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RemoteLabeling { status, .. } => *status,
            _ => None,
        }
    }
}
