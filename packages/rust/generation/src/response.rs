//! Parsing and structural validation of generated output.
//!
//! The service is asked for a JSON object; it sometimes wraps it in a
//! Markdown code fence or surrounds it with prose, so [`extract_json`]
//! locates the object first.

use std::sync::LazyLock;

use lectio_shared::{Citation, ReadingSynopsis, Reflection, is_catechism_paragraph};
use regex::Regex;
use serde::Deserialize;

use crate::backend::Completion;

/// Synopses longer than this are rejected.
pub const SYNOPSIS_MAX_WORDS: usize = 40;
pub const MIN_QUESTIONS: usize = 2;
pub const MAX_QUESTIONS: usize = 3;
pub const MIN_CITATIONS: usize = 1;
pub const MAX_CITATIONS: usize = 2;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("fence pattern is valid")
});

/// Why a completion was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("response is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("synopsis has {words} words, limit is 40")]
    SynopsisTooLong { words: usize },

    #[error("expected 2-3 pondering questions, got {0}")]
    QuestionCount(usize),

    #[error("pondering question is not a question: {0:?}")]
    NotAQuestion(String),

    #[error("expected 1-2 catechism citations, got {0}")]
    CitationCount(usize),

    #[error("catechism paragraph {0} is out of range (1-2865)")]
    CitationOutOfRange(i64),

    #[error("citation of paragraph {0} has no excerpt")]
    EmptyExcerpt(i64),
}

/// Locate the JSON object inside raw completion text.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if let Some(inner) = FENCE.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn parse<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, Violation> {
    serde_json::from_str(extract_json(text)).map_err(|e| Violation::MalformedJson(e.to_string()))
}

// ---------------------------------------------------------------------------
// Synopsis
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawSynopsis {
    #[serde(default)]
    synopsis: String,
}

/// Validate a synopsis completion for the named reading.
pub fn parse_synopsis(
    completion: &Completion,
    reading_title: &str,
) -> Result<ReadingSynopsis, Violation> {
    let raw: RawSynopsis = parse(&completion.text)?;
    let text = raw.synopsis.trim();
    if text.is_empty() {
        return Err(Violation::EmptyField("synopsis"));
    }
    let words = text.split_whitespace().count();
    if words > SYNOPSIS_MAX_WORDS {
        return Err(Violation::SynopsisTooLong { words });
    }
    Ok(ReadingSynopsis {
        reading_title: reading_title.to_string(),
        synopsis_text: text.to_string(),
        tokens_used: completion.input_tokens + completion.output_tokens,
    })
}

// ---------------------------------------------------------------------------
// Reflection
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawReflection {
    #[serde(default)]
    reflection_text: String,
    #[serde(default)]
    pondering_questions: Vec<String>,
    #[serde(default, alias = "ccc_citations")]
    citations: Vec<RawCitation>,
}

#[derive(Deserialize)]
struct RawCitation {
    #[serde(alias = "paragraph_number")]
    reference_number: i64,
    #[serde(default)]
    excerpt_text: String,
    #[serde(default)]
    context_note: Option<String>,
}

/// Validate a reflection completion.
pub fn parse_reflection(completion: &Completion) -> Result<Reflection, Violation> {
    let raw: RawReflection = parse(&completion.text)?;

    let reflection_text = raw.reflection_text.trim().to_string();
    if reflection_text.is_empty() {
        return Err(Violation::EmptyField("reflection_text"));
    }

    let questions: Vec<String> = raw
        .pondering_questions
        .iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&questions.len()) {
        return Err(Violation::QuestionCount(questions.len()));
    }
    if let Some(bad) = questions.iter().find(|q| !q.ends_with('?')) {
        return Err(Violation::NotAQuestion(bad.clone()));
    }

    if !(MIN_CITATIONS..=MAX_CITATIONS).contains(&raw.citations.len()) {
        return Err(Violation::CitationCount(raw.citations.len()));
    }
    let mut citations = Vec::with_capacity(raw.citations.len());
    for raw_citation in raw.citations {
        let number = raw_citation.reference_number;
        if !is_catechism_paragraph(number) {
            return Err(Violation::CitationOutOfRange(number));
        }
        let excerpt = raw_citation.excerpt_text.trim();
        if excerpt.is_empty() {
            return Err(Violation::EmptyExcerpt(number));
        }
        citations.push(Citation {
            // In range, so it fits.
            reference_number: number as u32,
            excerpt_text: excerpt.to_string(),
            context_note: raw_citation
                .context_note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        });
    }

    Ok(Reflection {
        reflection_text,
        pondering_questions: questions,
        citations,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            input_tokens: 100,
            output_tokens: 20,
        }
    }

    fn reflection_json(numbers: &[i64], questions: &[&str]) -> String {
        let citations: Vec<_> = numbers
            .iter()
            .map(|n| {
                serde_json::json!({
                    "paragraph_number": n,
                    "excerpt_text": "The Church is apostolic.",
                    "context_note": "Sent as the apostles were sent."
                })
            })
            .collect();
        serde_json::json!({
            "reflection_text": "Andrew hears and follows.",
            "pondering_questions": questions,
            "ccc_citations": citations,
        })
        .to_string()
    }

    #[test]
    fn extracts_fenced_and_embedded_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Here you go: {\"a\": 1} Enjoy."), "{\"a\": 1}");
        assert_eq!(extract_json("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn accepts_short_synopsis() {
        let synopsis = parse_synopsis(
            &completion(r#"{"synopsis": "Jesus calls fishermen to follow him."}"#),
            "Gospel",
        )
        .unwrap();
        assert_eq!(synopsis.reading_title, "Gospel");
        assert_eq!(synopsis.synopsis_text, "Jesus calls fishermen to follow him.");
        assert_eq!(synopsis.tokens_used, 120);
    }

    #[test]
    fn rejects_empty_or_long_synopsis() {
        let empty = parse_synopsis(&completion(r#"{"synopsis": "  "}"#), "Gospel");
        assert_eq!(empty.unwrap_err(), Violation::EmptyField("synopsis"));

        let long = vec!["word"; SYNOPSIS_MAX_WORDS + 1].join(" ");
        let json = serde_json::json!({ "synopsis": long }).to_string();
        let err = parse_synopsis(&completion(&json), "Gospel").unwrap_err();
        assert_eq!(err, Violation::SynopsisTooLong { words: SYNOPSIS_MAX_WORDS + 1 });

        let err = parse_synopsis(&completion("no json here"), "Gospel").unwrap_err();
        assert!(matches!(err, Violation::MalformedJson(_)));
    }

    #[test]
    fn accepts_valid_reflection() {
        let json = reflection_json(&[863], &["Whom am I called to?", "What nets do I keep?"]);
        let reflection = parse_reflection(&completion(&json)).unwrap();
        assert_eq!(reflection.citations.len(), 1);
        assert_eq!(reflection.citations[0].reference_number, 863);
        assert_eq!(reflection.pondering_questions.len(), 2);
        assert_eq!(reflection.output_tokens, 20);
    }

    #[test]
    fn rejects_out_of_range_citation() {
        let json = reflection_json(&[9000], &["One?", "Two?"]);
        let err = parse_reflection(&completion(&json)).unwrap_err();
        assert_eq!(err, Violation::CitationOutOfRange(9000));

        let json = reflection_json(&[0], &["One?", "Two?"]);
        assert_eq!(
            parse_reflection(&completion(&json)).unwrap_err(),
            Violation::CitationOutOfRange(0)
        );

        let json = reflection_json(&[-12], &["One?", "Two?"]);
        assert_eq!(
            parse_reflection(&completion(&json)).unwrap_err(),
            Violation::CitationOutOfRange(-12)
        );

        let json = reflection_json(&[2865], &["One?", "Two?"]);
        assert!(parse_reflection(&completion(&json)).is_ok());
    }

    #[test]
    fn enforces_question_and_citation_counts() {
        let json = reflection_json(&[1], &["Only one?"]);
        assert_eq!(
            parse_reflection(&completion(&json)).unwrap_err(),
            Violation::QuestionCount(1)
        );

        let json = reflection_json(&[1], &["One?", "Not a question."]);
        assert!(matches!(
            parse_reflection(&completion(&json)).unwrap_err(),
            Violation::NotAQuestion(_)
        ));

        let json = reflection_json(&[1, 2, 3], &["One?", "Two?"]);
        assert_eq!(
            parse_reflection(&completion(&json)).unwrap_err(),
            Violation::CitationCount(3)
        );
    }
}
