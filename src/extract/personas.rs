//! Persona phrase extraction engine
//!
//! Mines review text for self-identifying clauses ("as a busy mom", "I'm a
//! nurse") with a fixed set of lexical patterns, filters grammatical false
//! positives, and counts occurrences per normalized phrase. Only the top
//! slice of the resulting frequency table is forwarded to LLM normalization,
//! so ordering must be deterministic: descending count, ties in encounter
//! order.

use crate::catalog::Review;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Captures bounded at sentence punctuation or a following clause stop-word,
/// so a match does not run on into unrelated clauses.
const PERSONA_PATTERNS: &[&str] = &[
    // "as a ___" (most common)
    r"(?i)\bas\s+a\s+([^,.!?]{3,50}?)(?:[,.!?]|\s+(?:i|who|and|this|the|it)\b)",
    // "I'm a ___" / "I am a ___"
    r"(?i)\bi(?:'m|\s+am)\s+a\s+([^,.!?]{3,50}?)(?:[,.!?]|\s+(?:and|who|so|that|this)\b)",
    // "being a ___"
    r"(?i)\bbeing\s+a\s+([^,.!?]{3,50}?)(?:[,.!?]|\s+(?:i|this|and|it)\b)",
    // "as someone who ___"
    r"(?i)\bas\s+someone\s+who\s+([^,.!?]{5,60}?)[,.!?]",
];

/// Phrases the grammatical templates also produce but which are not personas
const EXCLUSION_PATTERNS: &[&str] = &[
    r"(?i)^result",
    r"(?i)^matter\s+of",
    r"(?i)^whole",
    r"(?i)^way\s+to",
    r"(?i)^bonus",
    r"(?i)^gift",
    r"(?i)^treat",
    r"(?i)^surprise",
    r"(?i)^reminder",
    r"(?i)^reference",
    r"(?i)^starting\s+point",
    r"(?i)^test",
    r"(?i)^trial",
    r"(?i)^backup",
    r"(?i)^replacement",
    r"(?i)^default",
    r"(?i)^last\s+resort",
    r"(?i)^first\s+step",
    r"(?i)^side\s+effect",
    r"(?i)^consequence",
];

const STOP_WORDS_PATTERN: &str = r"(?i)^(?:the|a|an|very|really|just|only|also)\s*$";

const MIN_PHRASE_LEN: usize = 3;

/// One extracted phrase with its occurrence count
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonaPhrase {
    /// Normalized (lowercased, trimmed) phrase text
    pub phrase: String,
    /// Total accepted matches across all reviews
    pub count: usize,
    /// Deduplicated ids of the reviews that contributed
    pub review_ids: Vec<String>,
}

/// Result of one extraction run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaExtraction {
    /// Phrases in descending count order; ties keep encounter order
    pub phrases: Vec<PersonaPhrase>,
    /// Reviews that contributed at least one accepted phrase
    pub reviews_with_matches: usize,
}

impl PersonaExtraction {
    /// The bounded prefix forwarded to LLM normalization
    pub fn top(&self, n: usize) -> &[PersonaPhrase] {
        &self.phrases[..self.phrases.len().min(n)]
    }
}

/// Lexical persona phrase extractor
pub struct PersonaExtractor {
    patterns: Vec<Regex>,
    exclusions: Vec<Regex>,
    stop_words: Regex,
}

impl PersonaExtractor {
    pub fn new() -> Result<Self> {
        let patterns = PERSONA_PATTERNS
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid persona pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;

        let exclusions = EXCLUSION_PATTERNS
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid exclusion pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;

        let stop_words =
            Regex::new(STOP_WORDS_PATTERN).context("Invalid stop word pattern")?;

        Ok(Self {
            patterns,
            exclusions,
            stop_words,
        })
    }

    /// Extract persona phrases from a set of reviews
    ///
    /// Missing titles or contents are treated as empty strings. An empty
    /// review set yields an empty extraction without error.
    pub fn extract(&self, reviews: &[Review]) -> PersonaExtraction {
        let mut phrases: Vec<PersonaPhrase> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut reviews_with_matches = 0;

        for review in reviews {
            let title = review.title.as_deref().unwrap_or("");
            let content = review.content.as_deref().unwrap_or("");
            let text = format!("{} {}", title, content);

            let mut found_in_review = false;

            for pattern in &self.patterns {
                for caps in pattern.captures_iter(&text) {
                    let Some(m) = caps.get(1) else { continue };
                    let phrase = m.as_str().trim().to_lowercase();

                    if !self.accept(&phrase) {
                        continue;
                    }

                    found_in_review = true;

                    match index.get(&phrase) {
                        Some(&i) => {
                            let entry = &mut phrases[i];
                            entry.count += 1;
                            if !entry.review_ids.contains(&review.review_id) {
                                entry.review_ids.push(review.review_id.clone());
                            }
                        }
                        None => {
                            index.insert(phrase.clone(), phrases.len());
                            phrases.push(PersonaPhrase {
                                phrase,
                                count: 1,
                                review_ids: vec![review.review_id.clone()],
                            });
                        }
                    }
                }
            }

            if found_in_review {
                reviews_with_matches += 1;
            }
        }

        // stable sort: equal counts keep encounter order
        phrases.sort_by(|a, b| b.count.cmp(&a.count));

        PersonaExtraction {
            phrases,
            reviews_with_matches,
        }
    }

    /// Extract unique phrases from one raw text string
    pub fn extract_from_text(&self, text: &str) -> Vec<String> {
        let mut matches = Vec::new();

        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(m) = caps.get(1) else { continue };
                let phrase = m.as_str().trim().to_lowercase();
                if self.accept(&phrase) && !matches.contains(&phrase) {
                    matches.push(phrase);
                }
            }
        }

        matches
    }

    fn accept(&self, phrase: &str) -> bool {
        if phrase.len() < MIN_PHRASE_LEN {
            return false;
        }
        if self.exclusions.iter().any(|e| e.is_match(phrase)) {
            return false;
        }
        if self.stop_words.is_match(phrase) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: &str, title: &str, content: &str) -> Review {
        Review {
            review_id: id.to_string(),
            app_id: "100".to_string(),
            app_name: "Calm Minds".to_string(),
            author: None,
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            rating: 2,
            version: None,
            published_at: None,
        }
    }

    fn extractor() -> PersonaExtractor {
        PersonaExtractor::new().unwrap()
    }

    #[test]
    fn test_as_a_pattern() {
        let phrases = extractor().extract_from_text("As a busy mom, I need quick sessions.");
        assert_eq!(phrases, vec!["busy mom".to_string()]);
    }

    #[test]
    fn test_i_am_pattern() {
        let phrases = extractor().extract_from_text("I am a nurse who works nights.");
        assert_eq!(phrases, vec!["nurse".to_string()]);
    }

    #[test]
    fn test_being_a_pattern() {
        let phrases = extractor().extract_from_text("Being a college student, I can't afford this.");
        assert_eq!(phrases, vec!["college student".to_string()]);
    }

    #[test]
    fn test_as_someone_who_pattern() {
        let phrases =
            extractor().extract_from_text("As someone who struggles with anxiety, this helps.");
        assert_eq!(phrases, vec!["struggles with anxiety".to_string()]);
    }

    #[test]
    fn test_exclusions_filtered() {
        let ex = extractor();
        assert!(ex.extract_from_text("As a result, the app crashed.").is_empty());
        assert!(ex
            .extract_from_text("Got this as a gift, it's fine.")
            .is_empty());
        assert!(ex
            .extract_from_text("I use it as a reminder, works okay.")
            .is_empty());
    }

    #[test]
    fn test_no_short_or_excluded_phrases_survive() {
        let reviews = vec![
            review("r1", "", "As a result, nothing. As a busy mom, great. As a gift, meh."),
            review("r2", "", "I'm a dad, and I love it."),
        ];
        let result = extractor().extract(&reviews);

        for p in &result.phrases {
            assert!(p.phrase.len() >= 3, "short phrase leaked: {:?}", p.phrase);
            assert!(!p.phrase.starts_with("result"));
            assert!(!p.phrase.starts_with("gift"));
        }
    }

    #[test]
    fn test_counts_and_review_id_dedup() {
        // the same review matches "busy mom" through two different patterns
        let reviews = vec![
            review("r1", "As a busy mom, I love it.", "I'm a busy mom, truly."),
            review("r2", "", "As a busy mom, this works."),
        ];
        let result = extractor().extract(&reviews);

        let busy_mom = result
            .phrases
            .iter()
            .find(|p| p.phrase == "busy mom")
            .unwrap();
        assert_eq!(busy_mom.count, 3);
        assert_eq!(busy_mom.review_ids, vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(result.reviews_with_matches, 2);
    }

    #[test]
    fn test_count_sum_matches_accepted_pairs() {
        let reviews = vec![
            review("r1", "", "As a runner, great. As a coach, useful."),
            review("r2", "", "As a runner, too slow."),
        ];
        let result = extractor().extract(&reviews);

        let total: usize = result.phrases.iter().map(|p| p.count).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_ordering_descending_count_stable_ties() {
        let reviews = vec![
            review("r1", "", "As a runner, ok. As a teacher, ok."),
            review("r2", "", "As a teacher, nice."),
            review("r3", "", "As a nurse, fine."),
        ];
        let result = extractor().extract(&reviews);

        let ordered: Vec<&str> = result.phrases.iter().map(|p| p.phrase.as_str()).collect();
        // "teacher" wins on count; "runner" precedes "nurse" by encounter order
        assert_eq!(ordered, vec!["teacher", "runner", "nurse"]);
    }

    #[test]
    fn test_empty_and_null_fields() {
        let result = extractor().extract(&[]);
        assert!(result.phrases.is_empty());
        assert_eq!(result.reviews_with_matches, 0);

        let mut r = review("r1", "", "");
        r.title = None;
        r.content = None;
        let result = extractor().extract(&[r]);
        assert!(result.phrases.is_empty());
        assert_eq!(result.reviews_with_matches, 0);
    }

    #[test]
    fn test_one_review_multiple_phrases() {
        let reviews = vec![review(
            "r1",
            "",
            "As a therapist, I recommend it. Being a parent, I use it nightly.",
        )];
        let result = extractor().extract(&reviews);

        assert_eq!(result.phrases.len(), 2);
        assert_eq!(result.reviews_with_matches, 1);
    }

    #[test]
    fn test_top_slice() {
        let reviews = vec![review("r1", "", "As a runner, ok. As a teacher, ok.")];
        let result = extractor().extract(&reviews);
        assert_eq!(result.top(1).len(), 1);
        assert_eq!(result.top(50).len(), 2);
    }
}
