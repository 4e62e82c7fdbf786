// Prompt text for the scoring oracle.

use crate::models::chat::Turn;
use crate::models::vacancy::{non_blank, VacancySnapshot};

/// System instruction shared by every provider. Forces JSON-only output.
pub const SCREENING_SYSTEM: &str = "You are a recruiting assistant that screens candidates. \
    You speak in a friendly, clear way without pressure. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Keys are in English. Keep every text value short and to the point.";

const RESPONSE_SCHEMA: &str = r#"Return STRICTLY a JSON object with this structure and no text outside it.
If data is missing, use null or an empty list.
{
  "candidate_profile": {"city": str|null, "experience_years": number|null, "education": str|null, "languages": [str]|null, "skills": [str]|null, "employment_type": str|null, "salary_expectation": number|null},
  "mismatches": [str],
  "summary": str,
  "score": number,
  "question": str|null
}
Notes:
- mismatches: SHORT labels of key mismatches, ONLY against the vacancy requirements above. Prefer the labels city, experience, employment_type, education, languages, salary.
- score: integer 0..100 based on how well the candidate meets the requirements.
- summary: a brief digest of how the candidate fits the vacancy.
"#;

const FIRST_QUESTION_RULES: &str = "- question: ONE natural, conversational question to the candidate \
    about the MOST critical mismatch.\n";

const FOLLOW_UP_RULES: &str = "- question: ONE natural, conversational question to the candidate. CRITICAL:\n\
    * Study the CHAT CONTEXT: which questions were already asked and which answers were given.\n\
    * NEVER repeat a question that was already asked, even if it would be phrased differently.\n\
    * Ask only about a NEW mismatch that has not been discussed yet.\n\
    * If an answer resolved a mismatch, do NOT raise it again and drop it from mismatches.\n\
    * If every critical mismatch has been discussed, return question: null to end the conversation.\n";

const STYLE_RULES: &str = "Phrase the question like a real HR manager: no templates, no lists, \
    one or two sentences, friendly tone.\n";

const REQUIREMENTS_LIMIT: usize = 4_000;
const RESUME_LIMIT: usize = 12_000;
const CONTEXT_LINES: usize = 15;

/// Builds the user prompt for one evaluation. `context` empty means first question.
pub fn build_evaluation_prompt(resume: &str, vacancy: &VacancySnapshot, context: &[Turn]) -> String {
    let vacancy_json = serde_json::to_string(vacancy).unwrap_or_default();
    let chat_block = format_context(context);

    let mut prompt = format!(
        "VACANCY REQUIREMENTS (text):\n{}\n\nVACANCY (JSON): {vacancy_json}\n\nRESUME (FULL TEXT):\n{}\n\n",
        clip_text(&requirements_text(vacancy), REQUIREMENTS_LIMIT),
        clip_text(resume, RESUME_LIMIT),
    );
    if let Some(block) = &chat_block {
        prompt.push_str(&format!("CHAT CONTEXT (latest messages):\n{block}\n\n"));
    }
    prompt.push_str(RESPONSE_SCHEMA);
    prompt.push_str(if chat_block.is_some() {
        FOLLOW_UP_RULES
    } else {
        FIRST_QUESTION_RULES
    });
    prompt.push_str(STYLE_RULES);
    prompt
}

/// Human-readable requirement lines; missing fields are omitted.
pub fn requirements_text(vacancy: &VacancySnapshot) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !vacancy.title.trim().is_empty() {
        parts.push(format!("Position: {}", vacancy.title.trim()));
    }
    if let Some(city) = non_blank(&vacancy.city) {
        parts.push(format!("City: {city}"));
    }
    if let Some(description) = non_blank(&vacancy.description) {
        parts.push(format!("Description: {description}"));
    }
    if vacancy.min_experience_years > 0 {
        parts.push(format!(
            "Minimum experience: {} years",
            vacancy.min_experience_years
        ));
    }
    if let Some(kind) = non_blank(&vacancy.employment_type) {
        parts.push(format!("Employment type: {kind}"));
    }
    if let Some(level) = non_blank(&vacancy.education_level) {
        parts.push(format!("Education: {level}"));
    }
    if !vacancy.languages.is_empty() {
        parts.push(format!("Languages: {}", vacancy.languages.join(", ")));
    }
    let currency = non_blank(&vacancy.currency).unwrap_or("");
    match (vacancy.salary_min, vacancy.salary_max) {
        (Some(min), Some(max)) => parts.push(
            format!("Salary: {min:.0}-{max:.0} {currency}")
                .trim_end()
                .to_string(),
        ),
        (Some(min), None) => parts.push(format!("Salary from: {min:.0} {currency}").trim_end().to_string()),
        (None, Some(max)) => parts.push(format!("Salary up to: {max:.0} {currency}").trim_end().to_string()),
        (None, None) => {}
    }
    if !vacancy.skills.is_empty() {
        parts.push(format!("Skills: {}", vacancy.skills.join(", ")));
    }
    parts.join("\n")
}

/// Last exchanged lines as "Candidate:" / "Bot:" transcript, or `None` if empty.
pub fn format_context(turns: &[Turn]) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    for turn in turns {
        let question = turn.question.trim();
        if !question.is_empty() {
            lines.push(format!("Bot: {question}"));
        }
        if let Some(answer) = turn.answer.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            lines.push(format!("Candidate: {answer}"));
        }
    }
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(CONTEXT_LINES);
    Some(lines[start..].join("\n"))
}

/// Keeps the first 80% and last 20% of an over-long text, by characters.
pub fn clip_text(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let head_len = limit * 8 / 10;
    let tail_len = limit * 2 / 10;
    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();
    format!("{head}\n…\n{tail}")
}
