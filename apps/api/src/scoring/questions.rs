//! Fallback question synthesizer: fixed templates per mismatch category.
//!
//! Used when the oracle is unavailable or its question is empty or already asked.
//! Each category has a primary phrasing and one follow-up phrasing; the session
//! walks them in order and skips anything already asked.

use crate::models::vacancy::{non_blank, VacancySnapshot};
use crate::scoring::Mismatch;

/// Primary clarifying question for a category.
pub fn fallback_question(mismatch: Mismatch, vacancy: &VacancySnapshot) -> String {
    match mismatch {
        Mismatch::City => match non_blank(&vacancy.city) {
            Some(city) => format!(
                "The position is based in {city}. Is working from {city} convenient for you, \
                 or would you consider relocating or a remote arrangement?"
            ),
            None => "Which city are you based in, and does the work format of this position \
                     suit you?"
                .to_string(),
        },
        Mismatch::Experience => format!(
            "Could you tell us more about your experience relevant to {}: how many years, \
             and what kind of tasks did you handle?",
            vacancy.title_or_default()
        ),
        Mismatch::EmploymentType => "What employment format suits you right now (full-time, \
                                     part-time, project-based, flexible schedule)?"
            .to_string(),
        Mismatch::Education => "Could you describe your education related to this position, \
                                or any relevant courses and certificates?"
            .to_string(),
        Mismatch::Languages => "Which languages do you speak, and at what level? Have you used \
                                them in a business setting?"
            .to_string(),
        Mismatch::Salary => "What are your salary expectations for this position?".to_string(),
        Mismatch::Generic => format!(
            "Could you briefly describe your most relevant experience for {}: what did you do \
             and what results did you achieve?",
            vacancy.title_or_default()
        ),
    }
}

/// Narrower second phrasing, parameterised by the concrete requirement.
pub fn follow_up_question(mismatch: Mismatch, vacancy: &VacancySnapshot) -> String {
    match mismatch {
        Mismatch::City => match non_blank(&vacancy.city) {
            Some(city) => format!(
                "Just to clarify the location: would you be able to work on site in {city} \
                 when the team needs it?"
            ),
            None => "Would the location of this position be an obstacle for you in any way?"
                .to_string(),
        },
        Mismatch::Experience => {
            if vacancy.min_experience_years > 0 {
                format!(
                    "The role asks for at least {} years of experience. Which projects best \
                     show that level of experience?",
                    vacancy.min_experience_years
                )
            } else {
                "Which of your projects best shows your level of experience?".to_string()
            }
        }
        Mismatch::EmploymentType => match non_blank(&vacancy.employment_type) {
            Some(kind) => format!("The position is {kind}. Would that format work for you?"),
            None => "Are you open to the employment format this position offers?".to_string(),
        },
        Mismatch::Education => match non_blank(&vacancy.education_level) {
            Some(level) => format!(
                "The role expects {level} education. Do you hold it or an equivalent \
                 qualification?"
            ),
            None => "Do you hold a degree or certification relevant to this role?".to_string(),
        },
        Mismatch::Languages => {
            let required: Vec<&str> = vacancy
                .languages
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect();
            if required.is_empty() {
                "Are you comfortable communicating with colleagues in a foreign language?"
                    .to_string()
            } else {
                format!(
                    "The position requires {}. How confident are you working in these languages?",
                    required.join(", ")
                )
            }
        }
        Mismatch::Salary => match salary_range(vacancy) {
            Some(range) => format!("The budget for this role is {range}. Would that work for you?"),
            None => "Is there any flexibility in your salary expectations?".to_string(),
        },
        Mismatch::Generic => format!(
            "Is there anything else about your background that makes you a strong fit for {}?",
            vacancy.title_or_default()
        ),
    }
}

/// All phrasings for a category, in the order they should be tried.
pub fn question_variants(mismatch: Mismatch, vacancy: &VacancySnapshot) -> [String; 2] {
    [
        fallback_question(mismatch, vacancy),
        follow_up_question(mismatch, vacancy),
    ]
}

fn salary_range(vacancy: &VacancySnapshot) -> Option<String> {
    let currency = non_blank(&vacancy.currency)
        .map(|c| format!(" {c}"))
        .unwrap_or_default();
    let min = vacancy.salary_min.filter(|v| *v > 0.0);
    let max = vacancy.salary_max.filter(|v| *v > 0.0);
    match (min, max) {
        (Some(min), Some(max)) => Some(format!("{min:.0}-{max:.0}{currency}")),
        (Some(min), None) => Some(format!("from {min:.0}{currency}")),
        (None, Some(max)) => Some(format!("up to {max:.0}{currency}")),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vacancy() -> VacancySnapshot {
        VacancySnapshot {
            title: "Data Analyst".to_string(),
            city: Some("Almaty".to_string()),
            min_experience_years: 2,
            employment_type: Some("full-time".to_string()),
            education_level: Some("Bachelor".to_string()),
            languages: vec!["English".to_string(), "Kazakh".to_string()],
            salary_min: Some(400_000.0),
            salary_max: Some(600_000.0),
            currency: Some("KZT".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_city_question_mentions_city() {
        let q = fallback_question(Mismatch::City, &vacancy());
        assert!(q.contains("Almaty"));
    }

    #[test]
    fn test_city_question_without_city() {
        let q = fallback_question(Mismatch::City, &VacancySnapshot::default());
        assert!(q.starts_with("Which city"));
    }

    #[test]
    fn test_generic_question_uses_default_title() {
        let q = fallback_question(Mismatch::Generic, &VacancySnapshot::default());
        assert!(q.contains("this position"));
    }

    #[test]
    fn test_follow_ups_reference_requirements() {
        let v = vacancy();
        assert!(follow_up_question(Mismatch::Experience, &v).contains("2 years"));
        assert!(follow_up_question(Mismatch::Languages, &v).contains("English, Kazakh"));
        assert!(follow_up_question(Mismatch::Salary, &v).contains("400000-600000 KZT"));
        assert!(follow_up_question(Mismatch::Education, &v).contains("Bachelor"));
        assert!(follow_up_question(Mismatch::EmploymentType, &v).contains("full-time"));
    }

    #[test]
    fn test_variants_are_distinct_for_every_category() {
        let v = vacancy();
        for m in [
            Mismatch::City,
            Mismatch::Experience,
            Mismatch::EmploymentType,
            Mismatch::Education,
            Mismatch::Languages,
            Mismatch::Salary,
            Mismatch::Generic,
        ] {
            let [a, b] = question_variants(m, &v);
            assert_ne!(a.to_lowercase(), b.to_lowercase(), "{m:?}");
        }
    }

    #[test]
    fn test_salary_range_only_min() {
        let v = VacancySnapshot {
            salary_min: Some(300_000.0),
            ..Default::default()
        };
        assert_eq!(salary_range(&v).as_deref(), Some("from 300000"));
    }
}
