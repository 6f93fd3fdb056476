//! # Léxico Clínico — Gazetteers e Padrões Regex
//!
//! Rotulador local que implementa [`EntityLabeler`] sem rede: listas de
//! termos conhecidos (doenças, medicamentos, sintomas, procedimentos) e
//! expressões regulares para padrões como medidas e datas.
//!
//! Útil para rodar o pipeline inteiro offline (demonstração, testes) e como
//! linha de base contra o modelo remoto.
//!
//! ## Regras de Casamento
//!
//! - Termos são comparados sem diferenciar maiúsculas. Termos que começam ou
//!   terminam em letra/dígito ASCII exigem fronteira de palavra (`CAD` não casa
//!   em `CADASIL`); termos chineses casam em qualquer posição.
//! - Entre casamentos sobrepostos vence o **mais longo** (em empate, o mais à
//!   esquerda). O resultado não tem sobreposições.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::labeling::EntityLabeler;
use crate::offset::CharMap;
use crate::tagger::EntitySpan;

/// Uma regra do léxico: padrão compilado e a entidade que ele produz.
#[derive(Debug, Clone)]
struct LexiconRule {
    name: String,
    pattern: Regex,
    entity: String,
    score: f64,
}

/// Rotulador por dicionário e regex.
#[derive(Debug, Clone, Default)]
pub struct LexiconLabeler {
    rules: Vec<LexiconRule>,
}

fn term_pattern(term: &str) -> String {
    let escaped = regex::escape(term.trim());
    let starts_word = term.trim().chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_word = term.trim().chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric());
    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

const DISEASES: &[&str] = &[
    "type 2 diabetes mellitus",
    "diabetes mellitus",
    "DM",
    "hypertension",
    "HTN",
    "coronary artery disease",
    "CAD",
    "chronic kidney disease",
    "CKD",
    "pneumonia",
    "sepsis",
    "heart failure",
    "atrial fibrillation",
    "高血壓",
    "糖尿病",
    "肺炎",
    "冠狀動脈疾病",
    "心衰竭",
    "敗血症",
];

const DRUGS: &[&str] = &[
    "aspirin",
    "clopidogrel",
    "metformin",
    "insulin",
    "ceftriaxone",
    "furosemide",
    "amlodipine",
    "阿斯匹靈",
    "抗生素",
    "胰島素",
];

const SYMPTOMS: &[&str] = &[
    "chest pain",
    "fever",
    "cough",
    "dyspnea",
    "shortness of breath",
    "headache",
    "胸痛",
    "發燒",
    "咳嗽",
    "喘",
    "頭痛",
];

const PROCEDURES: &[&str] = &["PCI", "CABG", "hemodialysis", "心導管", "插管"];

const PATTERNS: &[(&str, &str, &str)] = &[
    (
        "measurement",
        r"(?i)\b[0-9]+(?:\.[0-9]+)?\s?(?:mg/dl|mmhg|mg|kg|ml)\b",
        "MEASUREMENT",
    ),
    ("date", r"\b[0-9]{4}[/-][0-9]{1,2}[/-][0-9]{1,2}\b", "DATE"),
];

static CLINICAL: Lazy<LexiconLabeler> = Lazy::new(|| {
    let mut lexicon = LexiconLabeler::new();
    for (terms, entity) in [
        (DISEASES, "DISEASE"),
        (DRUGS, "DRUG"),
        (SYMPTOMS, "SYMPTOM"),
        (PROCEDURES, "PROCEDURE"),
    ] {
        for term in terms {
            lexicon.add_term(term, entity);
        }
    }
    for (name, pattern, entity) in PATTERNS {
        let rule = Regex::new(pattern).expect("padrão do léxico clínico inválido");
        lexicon.rules.push(LexiconRule {
            name: name.to_string(),
            pattern: rule,
            entity: entity.to_string(),
            score: 0.85,
        });
    }
    lexicon
});

impl LexiconLabeler {
    /// Léxico vazio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Léxico clínico embutido (inglês e chinês).
    pub fn clinical() -> Self {
        CLINICAL.clone()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Adiciona um termo literal.
    pub fn add_term(&mut self, term: &str, entity: &str) {
        if term.trim().is_empty() {
            return;
        }
        // termo escapado sempre compila
        if let Ok(pattern) = Regex::new(&term_pattern(term)) {
            self.rules.push(LexiconRule {
                name: format!("term:{}", term.trim()),
                pattern,
                entity: entity.to_string(),
                score: 0.95,
            });
        }
    }

    /// Adiciona uma regra regex.
    pub fn add_pattern(&mut self, name: &str, pattern: &str, entity: &str) -> Result<()> {
        self.rules.push(LexiconRule {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
            entity: entity.to_string(),
            score: 0.85,
        });
        Ok(())
    }

    /// Encontra as entidades do texto (offsets em caracteres, sem sobreposição).
    pub fn find(&self, text: &str) -> Vec<EntitySpan> {
        let mut candidates: Vec<(usize, usize, &LexiconRule)> = self
            .rules
            .iter()
            .flat_map(|rule| {
                rule.pattern
                    .find_iter(text)
                    .filter(|m| !m.as_str().is_empty())
                    .map(move |m| (m.start(), m.end(), rule))
            })
            .collect();

        // mais longo primeiro; em empate, mais à esquerda
        candidates.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)).then(a.0.cmp(&b.0)));

        let mut chosen: Vec<(usize, usize, &LexiconRule)> = Vec::new();
        for cand in candidates {
            if chosen.iter().all(|c| cand.1 <= c.0 || cand.0 >= c.1) {
                chosen.push(cand);
            }
        }
        chosen.sort_by_key(|c| c.0);

        let map = CharMap::new(text);
        chosen
            .into_iter()
            .map(|(start, end, rule)| {
                tracing::trace!(rule = %rule.name, start, end, "regra do léxico aplicada");
                let (start, end) = map.span(start, end);
                EntitySpan {
                    start,
                    end,
                    label: rule.entity.clone(),
                    score: rule.score,
                }
            })
            .collect()
    }
}

impl EntityLabeler for LexiconLabeler {
    async fn label(&self, text: &str) -> Result<Vec<EntitySpan>> {
        Ok(self.find(text))
    }
}
