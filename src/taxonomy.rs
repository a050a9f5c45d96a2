//! Error taxonomy and skill catalog
//!
//! Process-wide, read-only reference data. The catalog is initialized once at
//! start-up and shared by the rule engine, the model client, and the trackers.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Kind of language error detected in an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Tense,
    Article,
    SubjectVerbAgreement,
    WordOrder,
    Preposition,
    VerbPattern,
    WordChoice,
    Spelling,
    Unclassified,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Tense => "tense",
            ErrorKind::Article => "article",
            ErrorKind::SubjectVerbAgreement => "subject-verb-agreement",
            ErrorKind::WordOrder => "word-order",
            ErrorKind::Preposition => "preposition",
            ErrorKind::VerbPattern => "verb-pattern",
            ErrorKind::WordChoice => "word-choice",
            ErrorKind::Spelling => "spelling",
            ErrorKind::Unclassified => "unclassified",
        };
        write!(f, "{}", s)
    }
}

impl ErrorKind {
    /// Parse a kind string leniently. Model replies use free-form labels, so
    /// anything unrecognized maps to `Unclassified` rather than failing.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "tense" | "verb-tense" => ErrorKind::Tense,
            "article" | "articles" => ErrorKind::Article,
            "subject-verb-agreement" | "agreement" | "sva" => ErrorKind::SubjectVerbAgreement,
            "word-order" => ErrorKind::WordOrder,
            "preposition" | "prepositions" => ErrorKind::Preposition,
            "verb-pattern" | "infinitive" | "gerund" => ErrorKind::VerbPattern,
            "word-choice" | "vocabulary" | "lexical" => ErrorKind::WordChoice,
            "spelling" => ErrorKind::Spelling,
            _ => ErrorKind::Unclassified,
        }
    }
}

/// Provenance of a finding: which detection layer produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSource {
    Heuristic,
    Model,
}

impl std::fmt::Display for FindingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingSource::Heuristic => write!(f, "heuristic"),
            FindingSource::Model => write!(f, "model"),
        }
    }
}

/// One entry in the skill catalog
#[derive(Debug, Clone)]
pub struct Skill {
    pub key: &'static str,
    pub name: &'static str,
    pub kinds: &'static [ErrorKind],
}

/// Static skill catalog, loaded once per process
pub static SKILL_CATALOG: Lazy<Vec<Skill>> = Lazy::new(|| {
    vec![
        Skill {
            key: "grammar.tense.past-simple",
            name: "Past simple tense",
            kinds: &[ErrorKind::Tense],
        },
        Skill {
            key: "grammar.articles",
            name: "Article usage",
            kinds: &[ErrorKind::Article],
        },
        Skill {
            key: "grammar.subject-verb-agreement",
            name: "Subject-verb agreement",
            kinds: &[ErrorKind::SubjectVerbAgreement],
        },
        Skill {
            key: "grammar.word-order",
            name: "Word order",
            kinds: &[ErrorKind::WordOrder],
        },
        Skill {
            key: "grammar.prepositions",
            name: "Preposition usage",
            kinds: &[ErrorKind::Preposition],
        },
        Skill {
            key: "grammar.verb-patterns",
            name: "Verb patterns and infinitives",
            kinds: &[ErrorKind::VerbPattern],
        },
        Skill {
            key: "vocabulary.word-choice",
            name: "Word choice",
            kinds: &[ErrorKind::WordChoice],
        },
        Skill {
            key: "writing.spelling",
            name: "Spelling",
            kinds: &[ErrorKind::Spelling],
        },
    ]
});

/// Resolve the skill keys a given error kind maps to.
///
/// `Unclassified` findings map to no skills; they are logged but do not feed
/// the mastery tracker or the review scheduler.
pub fn skill_keys_for(kind: ErrorKind) -> Vec<String> {
    SKILL_CATALOG
        .iter()
        .filter(|s| s.kinds.contains(&kind))
        .map(|s| s.key.to_string())
        .collect()
}

/// Look up a skill by key
pub fn skill_by_key(key: &str) -> Option<&'static Skill> {
    SKILL_CATALOG.iter().find(|s| s.key == key)
}
