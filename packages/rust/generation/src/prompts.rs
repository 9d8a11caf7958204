//! Prompt templates.

use lectio_shared::{FeastInfo, LiturgicalContext, Reading, SynopsisEntry};

use crate::response::Violation;

pub const SYNOPSIS_SYSTEM_PROMPT: &str = "\
You are a Catholic Scripture scholar helping people pray with the daily readings.
Summarize a single reading in one plain sentence that a general audience can follow.

Rules:
- Remain faithful to Catholic teaching.
- Avoid technical theological vocabulary.
- State the central message of the passage and nothing beyond it.
- Use 10 to 25 words.
- Keep a reverent, pastoral tone.

Respond with a single JSON object and no other text.";

pub const REFLECTION_SYSTEM_PROMPT: &str = "\
You are a Catholic theologian and spiritual director writing a daily reflection.
Draw all of the day's readings together into one reflection that helps the reader
hear God's Word in ordinary life.

Rules:
- Remain faithful to Catholic teaching.
- Treat the readings as one whole rather than one at a time.
- Write 300 to 500 words in warm, accessible language.
- Offer 2 or 3 questions for personal prayer, each ending with a question mark.
- Cite 1 or 2 paragraphs of the Catechism of the Catholic Church, numbered 1 to 2865,
  with a short excerpt from each.

Respond with a single JSON object and no other text.";

/// `Gospel (Matthew 4:18-22)` followed by the text, readings separated by a
/// blank line.
pub fn format_readings(readings: &[Reading]) -> String {
    readings
        .iter()
        .map(|r| format!("{}\n{}", r.title_with_citation(), r.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn synopsis_prompt(reading: &Reading) -> String {
    format!(
        r#"Reading: {title}
Citation: {citation}

{text}

Write a one-sentence synopsis (10 to 25 words) of the central message of this reading.

Answer as JSON:
{{"synopsis": "..."}}"#,
        title = reading.title,
        citation = reading.citation,
        text = reading.text.trim(),
    )
}

/// The reflection prompt, including whichever synopses were generated.
pub fn reflection_prompt(
    readings: &[Reading],
    synopses: &[SynopsisEntry],
    context: &LiturgicalContext,
    feast: Option<&FeastInfo>,
) -> String {
    let mut prompt = format!(
        "Date: {}\nLiturgical day: {} ({})\n",
        context.date.format("%A, %B %-d, %Y"),
        context.day_label,
        context.season.label(),
    );
    if let Some(feast) = feast.and_then(FeastInfo::describe) {
        prompt.push_str(&format!("Feast: {feast}\n"));
    }

    prompt.push_str("\nReadings:\n\n");
    prompt.push_str(&format_readings(readings));

    let summaries: Vec<String> = synopses
        .iter()
        .filter_map(SynopsisEntry::synopsis)
        .map(|s| format!("- {}: {}", s.reading_title, s.synopsis_text))
        .collect();
    if !summaries.is_empty() {
        prompt.push_str("\n\nIn brief:\n");
        prompt.push_str(&summaries.join("\n"));
    }

    prompt.push_str(
        r#"

Write one reflection that joins the themes of all the readings and applies them to daily life.
Include 2 or 3 pondering questions and 1 or 2 Catechism citations (paragraphs 1 to 2865).

Answer as JSON:
{
  "reflection_text": "...",
  "pondering_questions": ["...?", "...?"],
  "ccc_citations": [
    {"paragraph_number": 1234, "excerpt_text": "...", "context_note": "..."}
  ]
}"#,
    );
    prompt
}

/// Note appended to the user prompt after a rejected completion.
pub fn correction_note(violation: &Violation) -> String {
    let hint = match violation {
        Violation::CitationOutOfRange(_) | Violation::CitationCount(_) => {
            " Cite 1 or 2 Catechism paragraphs numbered between 1 and 2865."
        }
        Violation::QuestionCount(_) | Violation::NotAQuestion(_) => {
            " Give 2 or 3 pondering questions, each ending with a question mark."
        }
        Violation::SynopsisTooLong { .. } => " Keep the synopsis to a single short sentence.",
        Violation::MalformedJson(_) => " Answer with the JSON object only.",
        Violation::EmptyField(_) | Violation::EmptyExcerpt(_) => "",
    };
    format!("Your previous answer was rejected: {violation}.{hint} Please try again.")
}
