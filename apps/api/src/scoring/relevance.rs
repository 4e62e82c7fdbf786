//! Relevance scorer: deterministic weighted heuristic, résumé text vs vacancy.
//!
//! Pure: no I/O, no LLM. Used whenever the oracle is unavailable and to seed
//! fallback questions on the first turn.
//!
//! Weights:
//! - base 40
//! - skills up to +35, scaled by matched / required
//! - city +6, experience +6, employment type +3, education +3, languages +3
//! - salary +4 (only when a claimed figure is found)
//! - title +5
//!
//! A missing requirement is skipped, never counted as a mismatch.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::vacancy::{non_blank, VacancySnapshot};
use crate::scoring::{Mismatch, ScoringResult};

const BASE_SCORE: i32 = 40;
const SKILLS_WEIGHT: i32 = 35;
const CITY_BONUS: i32 = 6;
const EXPERIENCE_BONUS: i32 = 6;
const EMPLOYMENT_BONUS: i32 = 3;
const EDUCATION_BONUS: i32 = 3;
const LANGUAGES_BONUS: i32 = 3;
const SALARY_BONUS: i32 = 4;
const TITLE_BONUS: i32 = 5;
/// Claimed salary may exceed the vacancy minimum by this factor and still fit.
const SALARY_TOLERANCE: f64 = 1.2;
const MAX_PLAUSIBLE_YEARS: u32 = 50;

// "5 years", "3+ yrs", "7 лет", "2 года"
static YEARS_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*\+?\s*(?:years?|yrs?|год|года|лет)").unwrap()
});
// "experience: 4", "опыт 6"
static YEARS_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:experience|опыт)[^\d\n]{0,20}(\d{1,2})\b").unwrap()
});
// "salary expectations: 450 000", "зарплата от 300000"
static SALARY_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:salary|expect\w*|compensation|зарплат\w*|ожидани\w*|оклад)[^\d\n]{0,30}(\d{1,3}(?:[ \x{a0}]\d{3})+|\d{2,7})\s*(k\b|к\b|тыс)?",
    )
    .unwrap()
});
// "500k", "300 000 тг", "450000 ₸", "2500 usd"
static SALARY_CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,3}(?:[ \x{a0}]\d{3})+|\d{2,7})\s*(k\b|к\b|тыс|тг|₸|kzt|usd|eur|руб|\$|€)",
    )
    .unwrap()
});

/// Degree families: if the required level names one, any marker of it satisfies.
const DEGREE_FAMILIES: &[&[&str]] = &[
    &["bachelor", "бакалавр", "bsc", "b.sc"],
    &["master", "магистр", "msc", "m.sc", "mba"],
    &["phd", "ph.d", "doctor", "кандидат наук", "доктор наук"],
    &[
        "higher",
        "высшее",
        "university",
        "университет",
        "bachelor",
        "бакалавр",
        "master",
        "магистр",
    ],
];

/// Scores résumé text against a vacancy. Always returns a result in [0, 100].
pub fn compute_relevance(resume_text: &str, vacancy: &VacancySnapshot) -> ScoringResult {
    let text = resume_text.to_lowercase();
    let mut score = BASE_SCORE;
    let mut mismatches: Vec<Mismatch> = Vec::new();
    let mut notes: Vec<String> = Vec::new();

    let skills: Vec<String> = vacancy
        .skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if !skills.is_empty() {
        let matched = skills.iter().filter(|s| text.contains(s.as_str())).count();
        score += SKILLS_WEIGHT * matched as i32 / skills.len() as i32;
        notes.push(format!("skills {matched}/{}", skills.len()));
    }

    if let Some(city) = non_blank(&vacancy.city) {
        if text.contains(&city.to_lowercase()) {
            score += CITY_BONUS;
            notes.push("city matches".to_string());
        } else {
            mismatches.push(Mismatch::City);
        }
    }

    let min_years = vacancy.min_experience_years;
    if min_years > 0 {
        let years = extract_years(&text).unwrap_or(0);
        if years >= min_years {
            score += EXPERIENCE_BONUS;
            notes.push(format!("experience {years} >= {min_years}"));
        } else {
            mismatches.push(Mismatch::Experience);
        }
    }

    if let Some(employment) = non_blank(&vacancy.employment_type) {
        if text.contains(&employment.to_lowercase()) {
            score += EMPLOYMENT_BONUS;
        } else {
            mismatches.push(Mismatch::EmploymentType);
        }
    }

    if let Some(level) = non_blank(&vacancy.education_level) {
        let level = level.to_lowercase();
        if text.contains(&level) || degree_equivalent(&level, &text) {
            score += EDUCATION_BONUS;
        } else {
            mismatches.push(Mismatch::Education);
        }
    }

    let languages: Vec<String> = vacancy
        .languages
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();
    if !languages.is_empty() {
        let hits = languages
            .iter()
            .filter(|l| text.contains(l.as_str()))
            .count();
        if hits == 0 {
            mismatches.push(Mismatch::Languages);
        } else {
            score += LANGUAGES_BONUS;
            notes.push(format!("languages {hits}/{}", languages.len()));
        }
    }

    if let Some(salary_min) = vacancy.salary_min.filter(|s| *s > 0.0) {
        if let Some(claimed) = extract_salary(&text) {
            if claimed <= salary_min * SALARY_TOLERANCE {
                score += SALARY_BONUS;
                notes.push("salary fits".to_string());
            } else {
                mismatches.push(Mismatch::Salary);
            }
        }
    }

    let key = vacancy.base_title().to_lowercase();
    if key.split_whitespace().any(|token| text.contains(token)) {
        score += TITLE_BONUS;
        notes.push("position relevant".to_string());
    }

    ScoringResult {
        score: clamp_score(score),
        mismatches,
        summary: notes.join("; "),
    }
}

pub(crate) fn clamp_score(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}

/// Largest plausible "N years" figure in already-lowercased text.
fn extract_years(text: &str) -> Option<u32> {
    YEARS_SUFFIX_RE
        .captures_iter(text)
        .chain(YEARS_PREFIX_RE.captures_iter(text))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .filter(|years| *years <= MAX_PLAUSIBLE_YEARS)
        .max()
}

/// First salary-looking figure: prefers numbers next to a salary word,
/// then numbers carrying a currency marker. Bare numbers are ignored so
/// phone digits and calendar years do not read as salary claims.
fn extract_salary(text: &str) -> Option<f64> {
    let caps = SALARY_CONTEXT_RE
        .captures(text)
        .or_else(|| SALARY_CURRENCY_RE.captures(text))?;
    let digits: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let amount: f64 = digits.parse().ok()?;
    let thousands = matches!(
        caps.get(2).map(|m| m.as_str()),
        Some("k") | Some("к") | Some("тыс")
    );
    Some(if thousands { amount * 1000.0 } else { amount })
}

fn degree_equivalent(level: &str, text: &str) -> bool {
    DEGREE_FAMILIES.iter().any(|family| {
        family.iter().any(|marker| level.contains(marker))
            && family.iter().any(|marker| text.contains(marker))
    })
}
