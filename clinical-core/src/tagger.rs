//! # Esquema de Tags BIO e Spans de Entidade
//!
//! Define o esquema de anotação **BIO** (Beginning-Inside-Outside) aplicado
//! aos tokens das notas clínicas, o formato dos spans devolvidos pelo
//! rotulador e o agrupamento inverso (tokens → trechos de entidade).
//!
//! ## Esquema BIO
//!
//! - `B-<ENT>`: Begin, primeiro token de uma entidade
//! - `I-<ENT>`: Inside, tokens subsequentes da mesma entidade
//! - `O`: Outside, não é parte de nenhuma entidade
//!
//! Diferente de um conjunto fechado de categorias, `<ENT>` aqui é o nome que
//! o modelo externo devolver (`DISEASE`, `DRUG`, `SYMPTOM`...). O nome é
//! normalizado: prefixos `B-`/`I-` repetidos são removidos e um nome vazio
//! vira `ENT`.

use serde::{Deserialize, Serialize};

use crate::tokenizer::Token;

/// Nome de entidade usado quando o rotulador não informa nenhum.
pub const DEFAULT_ENTITY: &str = "ENT";

/// Remove prefixos `B-`/`I-` (inclusive repetidos) de um nome de entidade.
pub fn normalize_entity(name: &str) -> String {
    let mut rest = name.trim();
    while let Some(stripped) = rest.strip_prefix("B-").or_else(|| rest.strip_prefix("I-")) {
        rest = stripped;
    }
    if rest.is_empty() {
        DEFAULT_ENTITY.to_string()
    } else {
        rest.to_string()
    }
}

/// Tag BIO aplicada a um token.
///
/// Serializada como a string BIO (`"O"`, `"B-DRUG"`, `"I-DRUG"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tag {
    /// **Begin**: início de uma entidade. Ex: **Type** (B-DISEASE) 2 DM.
    Begin(String),
    /// **Inside**: continuação de uma entidade. Ex: Type **2** (I-DISEASE) DM.
    Inside(String),
    /// **Outside**: o token não faz parte de nenhuma entidade.
    #[default]
    Outside,
}

impl Tag {
    pub fn begin(entity: &str) -> Self {
        Tag::Begin(normalize_entity(entity))
    }

    pub fn inside(entity: &str) -> Self {
        Tag::Inside(normalize_entity(entity))
    }

    /// Representação textual da tag (ex: "B-DRUG", "I-DRUG", "O")
    pub fn label(&self) -> String {
        match self {
            Tag::Begin(ent) => format!("B-{ent}"),
            Tag::Inside(ent) => format!("I-{ent}"),
            Tag::Outside => "O".to_string(),
        }
    }

    /// Nome da entidade (se for B- ou I-)
    pub fn entity(&self) -> Option<&str> {
        match self {
            Tag::Begin(ent) | Tag::Inside(ent) => Some(ent),
            Tag::Outside => None,
        }
    }

    pub fn is_outside(&self) -> bool {
        matches!(self, Tag::Outside)
    }

    /// Parseia uma tag a partir de string (ex: "B-DRUG" → Begin("DRUG"))
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == "O" {
            return Some(Tag::Outside);
        }
        let (prefix, entity) = s.split_once('-')?;
        if entity.trim().is_empty() {
            return None;
        }
        match prefix {
            "B" => Some(Tag::begin(entity)),
            "I" => Some(Tag::inside(entity)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.label()
    }
}

impl TryFrom<String> for Tag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Tag::from_label(&value).ok_or_else(|| format!("tag BIO inválida: {value:?}"))
    }
}

fn default_entity() -> String {
    DEFAULT_ENTITY.to_string()
}

/// Span de entidade devolvido pelo rotulador.
///
/// `start`/`end` são offsets em caracteres no texto enviado (a sentença). O
/// campo `entity_group` (ou `entity`) do serviço remoto é aceito como `label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub start: usize,
    pub end: usize,
    #[serde(alias = "entity_group", alias = "entity", default = "default_entity")]
    pub label: String,
    /// Confiança do rotulador (0.0 a 1.0), quando informada.
    #[serde(default)]
    pub score: f64,
}

impl EntitySpan {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            score: 1.0,
        }
    }
}

/// Trecho contínuo de uma mesma entidade numa sentença.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGroup {
    pub entity: String,
    /// Textos dos tokens unidos pelo separador da seção.
    pub text: String,
    /// Índice do primeiro token
    pub start_token: usize,
    /// Índice do último token (inclusivo)
    pub end_token: usize,
}

/// Converte uma sequência de tokens rotulados (BIO) em trechos de entidade.
///
/// Máquina de estados do esquema BIO:
/// - Inicia um trecho novo em `B-X`, ou em `I-X` sem trecho aberto de `X`.
/// - Continua o trecho enquanto encontrar `I-X` da **mesma** entidade.
/// - Fecha o trecho em `O`.
///
/// `joiner` é `""` nas seções coladas (os tokens já carregam os espaços) e
/// `" "` nas demais.
///
/// # Exemplo
/// `[B-DRUG, I-DRUG, O, I-DISEASE]` -> `[DRUG, DISEASE]`
pub fn group_entities(tokens: &[Token], joiner: &str) -> Vec<EntityGroup> {
    let mut groups: Vec<EntityGroup> = Vec::new();
    let mut open = false;

    for (i, token) in tokens.iter().enumerate() {
        let Some(entity) = token.label.entity() else {
            open = false;
            continue;
        };

        let continues = open
            && matches!(token.label, Tag::Inside(_))
            && groups.last().is_some_and(|g| g.entity == entity);

        if continues {
            if let Some(group) = groups.last_mut() {
                group.text.push_str(joiner);
                group.text.push_str(&token.text);
                group.end_token = i;
            }
        } else {
            groups.push(EntityGroup {
                entity: entity.to_string(),
                text: token.text.clone(),
                start_token: i,
                end_token: i,
            });
            open = true;
        }
    }

    for group in &mut groups {
        let trimmed = group.text.trim_end().len();
        group.text.truncate(trimmed);
    }
    groups
}
