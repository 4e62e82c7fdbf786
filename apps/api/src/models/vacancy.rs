use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only view of a posting's requirements. Built once per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VacancySnapshot {
    pub title: String,
    pub city: Option<String>,
    pub description: Option<String>,
    pub min_experience_years: u32,
    pub employment_type: Option<String>,
    pub education_level: Option<String>,
    pub languages: Vec<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub currency: Option<String>,
    pub skills: Vec<String>,
}

impl VacancySnapshot {
    /// Title without a trailing parenthetical qualifier, e.g. "Frontend Developer (React)".
    pub fn base_title(&self) -> &str {
        self.title.split('(').next().unwrap_or("").trim()
    }

    /// Display title for question templates.
    pub fn title_or_default(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() {
            "this position"
        } else {
            title
        }
    }
}

/// A stored posting: its owner plus the requirement snapshot.
#[derive(Debug, Clone)]
pub struct Posting {
    pub id: Uuid,
    pub created_by: Option<Uuid>,
    pub vacancy: VacancySnapshot,
}

/// Returns the trimmed value when present and non-blank.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
