use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Assessment period. Marks and attendance are recorded independently per term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    #[serde(rename = "first", alias = "First Terminal")]
    First,
    #[serde(rename = "second", alias = "Second Terminal")]
    Second,
    #[serde(rename = "final", alias = "Final Terminal")]
    Final,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::First, Term::Second, Term::Final];

    pub fn code(self) -> &'static str {
        match self {
            Term::First => "first",
            Term::Second => "second",
            Term::Final => "final",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Term::First => "First Terminal",
            Term::Second => "Second Terminal",
            Term::Final => "Final Terminal",
        }
    }

    /// Accepts the wire code or the printed label, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        Term::ALL
            .into_iter()
            .find(|term| t.eq_ignore_ascii_case(term.code()) || t.eq_ignore_ascii_case(term.label()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    A,
    B,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::A, Section::B];

    pub fn as_str(self) -> &'static str {
        match self {
            Section::A => "A",
            Section::B => "B",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Section::A),
            "B" => Some(Section::B),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Conduct {
    Excellent,
    /// Neutral value used when no term data was recorded.
    #[default]
    Good,
    Satisfactory,
}

impl Conduct {
    pub const ALL: [Conduct; 3] = [Conduct::Excellent, Conduct::Good, Conduct::Satisfactory];

    pub fn as_str(self) -> &'static str {
        match self {
            Conduct::Excellent => "Excellent",
            Conduct::Good => "Good",
            Conduct::Satisfactory => "Satisfactory",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        Conduct::ALL
            .into_iter()
            .find(|c| t.eq_ignore_ascii_case(c.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Teacher,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Teacher => "TEACHER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(UserRole::Admin),
            "TEACHER" => Some(UserRole::Teacher),
            _ => None,
        }
    }
}

/// A logged-in identity. Passwords never leave the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub name: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_no: String,
    pub section: Section,
}

impl Student {
    /// Rolls are free text but numbered in practice; non-numeric rolls sort last.
    pub fn roll_sort_key(&self) -> (Section, i64, String) {
        let n = self.roll_no.trim().parse::<i64>().unwrap_or(i64::MAX);
        (self.section, n, self.roll_no.clone())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty("name"));
        }
        if self.roll_no.trim().is_empty() {
            return Err(ValidationError::Empty("rollNo"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub credit_hour: f64,
    pub full_marks_theory: f64,
    pub full_marks_practical: f64,
    pub pass_marks_theory: f64,
    pub pass_marks_practical: f64,
    #[serde(default)]
    pub sort_order: i64,
}

impl Subject {
    /// Configuration check applied when a subject is defined or edited.
    /// Grading itself trusts subjects that passed this check.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.code.trim().is_empty() {
            return Err(ValidationError::Empty("code"));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty("name"));
        }
        positive("creditHour", self.credit_hour)?;
        positive("fullMarksTheory", self.full_marks_theory)?;
        positive("fullMarksPractical", self.full_marks_practical)?;
        pass_within_full(Component::Theory, self.pass_marks_theory, self.full_marks_theory)?;
        pass_within_full(
            Component::Practical,
            self.pass_marks_practical,
            self.full_marks_practical,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marks {
    pub student_id: String,
    pub subject_id: String,
    pub term: Term,
    #[serde(default)]
    pub theory_obtained: f64,
    #[serde(default)]
    pub practical_obtained: f64,
}

impl Marks {
    pub fn zero(student_id: &str, subject_id: &str, term: Term) -> Self {
        Self {
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            term,
            theory_obtained: 0.0,
            practical_obtained: 0.0,
        }
    }

    /// Data-entry bound check: `0 <= obtained <= fullMarks` per component.
    pub fn validate_against(&self, subject: &Subject) -> Result<(), ValidationError> {
        mark_in_range(Component::Theory, self.theory_obtained, subject.full_marks_theory)?;
        mark_in_range(
            Component::Practical,
            self.practical_obtained,
            subject.full_marks_practical,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermData {
    pub student_id: String,
    pub term: Term,
    #[serde(default)]
    pub attendance_present: u32,
    #[serde(default)]
    pub attendance_total: u32,
    #[serde(default)]
    pub conduct: Conduct,
}

impl TermData {
    pub fn neutral(student_id: &str, term: Term) -> Self {
        Self {
            student_id: student_id.to_string(),
            term,
            attendance_present: 0,
            attendance_total: 0,
            conduct: Conduct::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.attendance_present > self.attendance_total {
            return Err(ValidationError::AttendanceExceedsTotal {
                present: self.attendance_present,
                total: self.attendance_total,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: String,
    pub date: String,
}

impl Expense {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.description.trim().is_empty() {
            return Err(ValidationError::Empty("description"));
        }
        positive("amount", self.amount)?;
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| ValidationError::BadDate(self.date.clone()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Theory,
    Practical,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Component::Theory => f.write_str("theory"),
            Component::Practical => f.write_str("practical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} must be greater than 0 (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{component} pass marks must be between 0 and full marks {full} (got {pass})")]
    PassOutOfRange {
        component: Component,
        pass: f64,
        full: f64,
    },
    #[error("{component} mark must be between 0 and {full} (got {value})")]
    MarkOutOfRange {
        component: Component,
        value: f64,
        full: f64,
    },
    #[error("attendance present ({present}) exceeds total ({total})")]
    AttendanceExceedsTotal { present: u32, total: u32 },
    #[error("date must be YYYY-MM-DD (got {0:?})")]
    BadDate(String),
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NotPositive { field, value })
    }
}

fn pass_within_full(component: Component, pass: f64, full: f64) -> Result<(), ValidationError> {
    if pass.is_finite() && pass >= 0.0 && pass <= full {
        Ok(())
    } else {
        Err(ValidationError::PassOutOfRange {
            component,
            pass,
            full,
        })
    }
}

fn mark_in_range(component: Component, value: f64, full: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 && value <= full {
        Ok(())
    } else {
        Err(ValidationError::MarkOutOfRange {
            component,
            value,
            full,
        })
    }
}
