//! Heuristic rule engine
//!
//! Deterministic, local, pattern-based error detection. Every rule is an
//! independent check with a deliberately low false-positive rate; the engine
//! runs all of them and concatenates the results, since multiple independent
//! errors can coexist in one sentence. Anything needing semantic judgment is
//! left to the model layer. This component never fails; the worst case is an
//! empty result.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::taxonomy::{skill_keys_for, ErrorKind, FindingSource};
use crate::types::ErrorFinding;

/// Base-form verbs and their past forms, used by the tense rule
const PAST_FORMS: &[(&str, &str)] = &[
    ("go", "went"),
    ("eat", "ate"),
    ("see", "saw"),
    ("come", "came"),
    ("buy", "bought"),
    ("get", "got"),
    ("take", "took"),
    ("make", "made"),
    ("have", "had"),
    ("do", "did"),
    ("give", "gave"),
    ("write", "wrote"),
    ("meet", "met"),
    ("find", "found"),
    ("run", "ran"),
    ("drink", "drank"),
    ("speak", "spoke"),
    ("watch", "watched"),
    ("play", "played"),
    ("visit", "visited"),
    ("walk", "walked"),
    ("talk", "talked"),
    ("study", "studied"),
    ("work", "worked"),
    ("cook", "cooked"),
    ("stay", "stayed"),
    ("travel", "traveled"),
];

/// Words before a verb that make its base form legitimate
const BASE_FORM_LICENSES: &[&str] = &[
    "to", "will", "would", "do", "does", "did", "didn't", "don't", "doesn't", "can", "could",
    "should", "shall", "must", "may", "might", "not",
];

/// Vowel-initial words that take "a" anyway (consonant sound)
const A_EXCEPTIONS: &[&str] = &[
    "university", "uniform", "united", "unique", "user", "useful", "usual", "european", "one",
    "once",
];

/// Consonant-initial words that take "an" anyway (silent h)
const AN_EXCEPTIONS: &[&str] = &["hour", "honest", "honor", "heir"];

/// Catenative verbs requiring "to" before a following verb
const CATENATIVES: &[&str] = &[
    "want", "wants", "wanted", "need", "needs", "needed", "plan", "plans", "planned", "hope",
    "hopes", "hoped", "decide", "decides", "decided",
];

static PAST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(yesterday|last\s+(night|week|month|year)|\d+\s+(days?|weeks?|months?|years?)\s+ago)\b")
        .expect("past marker regex")
});

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z']+").expect("word regex"));

static ARTICLE_A: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(a)\s+([a-z']+)").expect("article regex"));

static SVA_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(he|she|it)\s+(go|do|have|want|like|need|play|work|study|eat|watch|say|get|make|know|think|live|come)\b")
        .expect("agreement regex")
});

static BE_MISMATCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(i)\s+(is|are)\b|\b(he|she|it)\s+(are)\b|\b(you|we|they)\s+(is)\b")
        .expect("be-verb regex")
});

static MISSING_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(want|wants|wanted|need|needs|needed|plan|plans|planned|hope|hopes|hoped|decide|decides|decided)\s+(go|eat|see|buy|study|play|visit|learn|travel|work|speak|read|write|watch)\b")
        .expect("infinitive regex")
});

static ADVERB_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(always|never|often|usually|sometimes)\s+(i|you|we|they|he|she|it)\b")
        .expect("adverb order regex")
});

/// Deterministic pattern-based error detector
#[derive(Debug, Default, Clone)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run every rule against the utterance and concatenate the findings.
    /// The scenario tag is accepted for parity with the model layer; the
    /// current rules are scenario-independent.
    pub fn analyze(&self, text: &str, scenario: Option<&str>) -> Vec<ErrorFinding> {
        trace!(?scenario, "running heuristic rules");
        let mut findings = Vec::new();

        findings.extend(rule_past_tense(text));
        findings.extend(rule_article(text));
        findings.extend(rule_agreement(text));
        findings.extend(rule_be_mismatch(text));
        findings.extend(rule_missing_infinitive(text));
        findings.extend(rule_adverb_order(text));

        findings
    }
}

fn make_finding(
    kind: ErrorKind,
    original: &str,
    corrected: String,
    explanation: String,
) -> Option<ErrorFinding> {
    ErrorFinding::new(
        kind,
        original,
        corrected,
        explanation,
        skill_keys_for(kind),
        FindingSource::Heuristic,
    )
}

/// Past-time marker with a base-form verb. Corrects the whole utterance so
/// the learner sees the full repaired sentence.
fn rule_past_tense(text: &str) -> Vec<ErrorFinding> {
    if !PAST_MARKER.is_match(text) {
        return Vec::new();
    }

    let mut prev_word: Option<String> = None;
    for m in WORD.find_iter(text) {
        let token = m.as_str().to_lowercase();
        let licensed = prev_word
            .as_deref()
            .map(|w| BASE_FORM_LICENSES.contains(&w))
            .unwrap_or(false);

        if !licensed {
            if let Some((_, past)) = PAST_FORMS.iter().find(|(base, _)| *base == token) {
                let replacement = match_case(m.as_str(), past);
                let corrected = format!("{}{}{}", &text[..m.start()], replacement, &text[m.end()..]);
                let finding = make_finding(
                    ErrorKind::Tense,
                    text.trim(),
                    corrected.trim().to_string(),
                    format!(
                        "The sentence refers to the past, so use the past form '{}' instead of '{}'.",
                        past,
                        m.as_str()
                    ),
                );
                return finding.into_iter().collect();
            }
        }
        prev_word = Some(token);
    }

    Vec::new()
}

/// "a" before a vowel sound (including silent-h words). Sound exceptions on
/// both sides keep the false-positive rate down.
fn rule_article(text: &str) -> Vec<ErrorFinding> {
    let mut findings = Vec::new();

    for caps in ARTICLE_A.captures_iter(text) {
        let article = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let noun = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let noun_lower = noun.to_lowercase();

        let starts_with_vowel = noun_lower
            .chars()
            .next()
            .map(|c| "aeiou".contains(c))
            .unwrap_or(false);

        let wrong = (starts_with_vowel && !A_EXCEPTIONS.contains(&noun_lower.as_str()))
            || AN_EXCEPTIONS.contains(&noun_lower.as_str());

        if wrong {
            let original = format!("{} {}", article, noun);
            let corrected = format!("{} {}", match_case(article, "an"), noun);
            findings.extend(make_finding(
                ErrorKind::Article,
                &original,
                corrected,
                format!("Use 'an' before '{}' because it begins with a vowel sound.", noun),
            ));
        }
    }

    findings
}

/// Third-person singular subject with a bare verb form
fn rule_agreement(text: &str) -> Vec<ErrorFinding> {
    let mut findings = Vec::new();

    for caps in SVA_BARE.captures_iter(text) {
        let full = caps.get(0).expect("whole match");
        let subject = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let verb = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        // Skip when an auxiliary licenses the bare form: "does he go", "did it work"
        let before = text[..full.start()].trim_end();
        if let Some(prev) = WORD.find_iter(before).last() {
            if BASE_FORM_LICENSES.contains(&prev.as_str().to_lowercase().as_str()) {
                continue;
            }
        }

        let fixed = third_person_form(&verb.to_lowercase());
        let original = format!("{} {}", subject, verb);
        let corrected = format!("{} {}", subject, match_case(verb, &fixed));
        findings.extend(make_finding(
            ErrorKind::SubjectVerbAgreement,
            &original,
            corrected,
            format!(
                "With '{}', the verb takes the third-person singular form '{}'.",
                subject.to_lowercase(),
                fixed
            ),
        ));
    }

    findings
}

/// Mismatched be-verb: "I is", "he are", "they is"
fn rule_be_mismatch(text: &str) -> Vec<ErrorFinding> {
    let mut findings = Vec::new();

    for caps in BE_MISMATCH.captures_iter(text) {
        let (subject, verb) = if let (Some(s), Some(v)) = (caps.get(1), caps.get(2)) {
            (s.as_str(), v.as_str())
        } else if let (Some(s), Some(v)) = (caps.get(3), caps.get(4)) {
            (s.as_str(), v.as_str())
        } else if let (Some(s), Some(v)) = (caps.get(5), caps.get(6)) {
            (s.as_str(), v.as_str())
        } else {
            continue;
        };

        let fixed = match subject.to_lowercase().as_str() {
            "i" => "am",
            "he" | "she" | "it" => "is",
            _ => "are",
        };
        let original = format!("{} {}", subject, verb);
        let corrected = format!("{} {}", subject, fixed);
        findings.extend(make_finding(
            ErrorKind::SubjectVerbAgreement,
            &original,
            corrected,
            format!("'{}' takes '{}', not '{}'.", subject, fixed, verb.to_lowercase()),
        ));
    }

    findings
}

/// Catenative verb directly followed by a bare verb: "want go" -> "want to go"
fn rule_missing_infinitive(text: &str) -> Vec<ErrorFinding> {
    let mut findings = Vec::new();

    for caps in MISSING_TO.captures_iter(text) {
        let v1 = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let v2 = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if !CATENATIVES.contains(&v1.to_lowercase().as_str()) {
            continue;
        }
        let original = format!("{} {}", v1, v2);
        let corrected = format!("{} to {}", v1, v2);
        findings.extend(make_finding(
            ErrorKind::VerbPattern,
            &original,
            corrected,
            format!("'{}' needs the infinitive: '{} to {}'.", v1.to_lowercase(), v1.to_lowercase(), v2),
        ));
    }

    findings
}

/// Sentence-initial frequency adverb before a pronoun subject
fn rule_adverb_order(text: &str) -> Vec<ErrorFinding> {
    let mut findings = Vec::new();

    if let Some(caps) = ADVERB_FIRST.captures(text) {
        let adverb = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let subject = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let original = format!("{} {}", adverb, subject);
        let corrected = format!(
            "{} {}",
            capitalize(subject),
            adverb.to_lowercase()
        );
        findings.extend(make_finding(
            ErrorKind::WordOrder,
            &original,
            corrected,
            format!(
                "Frequency adverbs like '{}' usually come after the subject.",
                adverb.to_lowercase()
            ),
        ));
    }

    findings
}

fn third_person_form(verb: &str) -> String {
    match verb {
        "go" => "goes".to_string(),
        "do" => "does".to_string(),
        "have" => "has".to_string(),
        "study" => "studies".to_string(),
        "watch" => "watches".to_string(),
        other => format!("{}s", other),
    }
}

/// Apply the source token's leading case to the replacement
fn match_case(source: &str, replacement: &str) -> String {
    if source.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
        capitalize(replacement)
    } else {
        replacement.to_string()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tense_mismatch_scenario() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("I go to school yesterday.", None);

        let tense: Vec<_> = findings.iter().filter(|f| f.kind == ErrorKind::Tense).collect();
        assert_eq!(tense.len(), 1);
        assert_eq!(tense[0].corrected_text, "I went to school yesterday.");
        assert!(!tense[0].corrected_text.is_empty());
        assert_eq!(tense[0].source, FindingSource::Heuristic);
    }

    #[test]
    fn test_engine_is_deterministic() {
        let engine = RuleEngine::new();
        let text = "Always I want go to a university, but he have a idea yesterday.";
        let first = engine.analyze(text, None);
        for _ in 0..5 {
            assert_eq!(engine.analyze(text, None), first);
        }
    }

    #[test]
    fn test_clean_sentence_yields_no_findings() {
        let engine = RuleEngine::new();
        assert!(engine.analyze("I went to school yesterday.", None).is_empty());
        assert!(engine.analyze("She goes to work every day.", None).is_empty());
        assert!(engine.analyze("I want to learn Spanish.", None).is_empty());
    }

    #[test]
    fn test_article_rule() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("She bought a apple.", None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ErrorKind::Article);
        assert_eq!(findings[0].corrected_text, "an apple");

        // Consonant-sound exceptions stay untouched
        assert!(engine.analyze("He attends a university.", None).is_empty());
    }

    #[test]
    fn test_agreement_rule_skips_auxiliaries() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("He go to work.", None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].corrected_text, "He goes");

        assert!(engine.analyze("Does he go to work?", None).is_empty());
        assert!(engine.analyze("She didn't go there.", None).is_empty());
    }

    #[test]
    fn test_be_mismatch_rule() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("I is happy.", None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].corrected_text, "I am");
        assert_eq!(findings[0].kind, ErrorKind::SubjectVerbAgreement);
    }

    #[test]
    fn test_missing_infinitive_rule() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("I want go home now.", None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ErrorKind::VerbPattern);
        assert_eq!(findings[0].corrected_text, "want to go");
    }

    #[test]
    fn test_adverb_order_rule() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("Always I drink coffee.", None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ErrorKind::WordOrder);
        assert_eq!(findings[0].corrected_text, "I always");
    }

    #[test]
    fn test_multiple_independent_errors_coexist() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("He want go to a airport.", None);
        let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&ErrorKind::SubjectVerbAgreement));
        assert!(kinds.contains(&ErrorKind::VerbPattern));
        assert!(kinds.contains(&ErrorKind::Article));
    }

    #[test]
    fn test_findings_carry_skill_keys() {
        let engine = RuleEngine::new();
        let findings = engine.analyze("I go to school yesterday.", None);
        assert_eq!(findings[0].skill_keys, vec!["grammar.tense.past-simple".to_string()]);
    }
}
