use serde::{Deserialize, Serialize};

/// A requirement category the résumé does not currently satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mismatch {
    City,
    Experience,
    EmploymentType,
    Education,
    Languages,
    Salary,
    Generic,
}

impl Mismatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mismatch::City => "city",
            Mismatch::Experience => "experience",
            Mismatch::EmploymentType => "employment_type",
            Mismatch::Education => "education",
            Mismatch::Languages => "languages",
            Mismatch::Salary => "salary",
            Mismatch::Generic => "generic",
        }
    }

    /// Exact category name, as stored in the comma-joined column.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "city" => Some(Mismatch::City),
            "experience" => Some(Mismatch::Experience),
            "employment_type" => Some(Mismatch::EmploymentType),
            "education" => Some(Mismatch::Education),
            "languages" => Some(Mismatch::Languages),
            "salary" => Some(Mismatch::Salary),
            "generic" => Some(Mismatch::Generic),
            _ => None,
        }
    }

    /// Maps a free-text label (as the oracle writes it, English or Russian)
    /// onto a category. Anything unrecognised becomes `Generic`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if let Some(exact) = Self::parse(&label) {
            return exact;
        }

        const KEYWORDS: &[(Mismatch, &[&str])] = &[
            (Mismatch::EmploymentType, &["employment", "schedule", "занятост", "график"]),
            (Mismatch::City, &["city", "location", "relocat", "город", "переезд", "локац"]),
            (Mismatch::Experience, &["experience", "years", "опыт", "стаж"]),
            (Mismatch::Education, &["education", "degree", "образован", "диплом"]),
            (Mismatch::Languages, &["language", "english", "язык", "английск"]),
            (Mismatch::Salary, &["salary", "compensation", "pay", "зарплат", "оклад"]),
        ];

        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| label.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(Mismatch::Generic)
    }
}

/// Maps labels onto categories, keeping first-seen order and dropping repeats.
pub fn categories_from_labels<I, S>(labels: I) -> Vec<Mismatch>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<Mismatch> = Vec::new();
    for label in labels {
        let label = label.as_ref();
        if label.trim().is_empty() {
            continue;
        }
        let category = Mismatch::from_label(label);
        if !out.contains(&category) {
            out.push(category);
        }
    }
    out
}
