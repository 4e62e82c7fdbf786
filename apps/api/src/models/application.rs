use uuid::Uuid;

use crate::scoring::Mismatch;

/// A candidate's submission against one posting, with its latest scoring projection.
#[derive(Debug, Clone)]
pub struct Application {
    pub id: Uuid,
    pub vacancy_id: Uuid,
    pub candidate_email: String,
    pub cv_text: Option<String>,
    pub relevance_score: Option<i32>,
    pub mismatches: Vec<Mismatch>,
    pub summary: Option<String>,
    pub status: String,
}

impl Application {
    pub fn resume_text(&self) -> &str {
        self.cv_text.as_deref().unwrap_or("")
    }

    pub fn is_owned_by(&self, email: &str) -> bool {
        self.candidate_email.trim().eq_ignore_ascii_case(email.trim())
    }
}

/// Application status written when a screening conversation closes.
pub const STATUS_SCREENED: &str = "screened";
