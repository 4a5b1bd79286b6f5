use crate::model::{Conduct, Marks, Student, Subject, Term, TermData};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const NG_GRADE: &str = "NG";

/// One row of a grade scale: a passing percentage at or above `min_percent`
/// earns `grade` / `grade_point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_percent: f64,
    pub grade: String,
    pub grade_point: f64,
}

impl GradeBand {
    fn new(min_percent: f64, grade: &str, grade_point: f64) -> Self {
        Self {
            min_percent,
            grade: grade.to_string(),
            grade_point,
        }
    }
}

/// Percentage → letter/point policy shared by every computation in a workspace.
///
/// Bands are ordered from the highest threshold down. The first band whose
/// `min_percent` does not exceed the score wins; a passing score below the
/// lowest threshold still lands in the lowest band, since "passed" is decided
/// by the subject's pass marks and not by the scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScale {
    pub version: String,
    pub bands: Vec<GradeBand>,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::neb_2079()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleError {
    #[error("grade scale must have at least one band")]
    NoBands,
    #[error("grade scale version must not be empty")]
    NoVersion,
    #[error("band {index}: grade must be a non-empty label other than NG")]
    BadGrade { index: usize },
    #[error("band {index}: minPercent {value} must be within 0..=100")]
    ThresholdOutOfRange { index: usize, value: f64 },
    #[error("band {index}: thresholds must strictly decrease")]
    ThresholdOrder { index: usize },
    #[error("band {index}: grade point must be finite and >= 0")]
    BadPoint { index: usize },
    #[error("band {index}: grade points must not increase as thresholds decrease")]
    PointOrder { index: usize },
}

impl GradeScale {
    /// Secondary-level letter grading as printed on the school's grade sheets.
    pub fn neb_2079() -> Self {
        Self {
            version: "neb-2079".to_string(),
            bands: vec![
                GradeBand::new(90.0, "A+", 4.0),
                GradeBand::new(80.0, "A", 3.6),
                GradeBand::new(70.0, "B+", 3.2),
                GradeBand::new(60.0, "B", 2.8),
                GradeBand::new(50.0, "C+", 2.4),
                GradeBand::new(40.0, "C", 2.0),
                GradeBand::new(35.0, "D", 1.6),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), ScaleError> {
        if self.version.trim().is_empty() {
            return Err(ScaleError::NoVersion);
        }
        if self.bands.is_empty() {
            return Err(ScaleError::NoBands);
        }
        let mut prev: Option<&GradeBand> = None;
        for (index, band) in self.bands.iter().enumerate() {
            let label = band.grade.trim();
            if label.is_empty() || label.eq_ignore_ascii_case(NG_GRADE) {
                return Err(ScaleError::BadGrade { index });
            }
            if !band.min_percent.is_finite() || !(0.0..=100.0).contains(&band.min_percent) {
                return Err(ScaleError::ThresholdOutOfRange {
                    index,
                    value: band.min_percent,
                });
            }
            if !band.grade_point.is_finite() || band.grade_point < 0.0 {
                return Err(ScaleError::BadPoint { index });
            }
            if let Some(p) = prev {
                if band.min_percent >= p.min_percent {
                    return Err(ScaleError::ThresholdOrder { index });
                }
                if band.grade_point > p.grade_point {
                    return Err(ScaleError::PointOrder { index });
                }
            }
            prev = Some(band);
        }
        Ok(())
    }

    pub fn top_band(&self) -> Option<&GradeBand> {
        self.bands.first()
    }

    /// Band for a passing percentage. An empty scale grades nothing above NG.
    pub fn band_for(&self, percentage: f64) -> Option<&GradeBand> {
        self.bands
            .iter()
            .find(|b| percentage >= b.min_percent)
            .or_else(|| self.bands.last())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub grade: String,
    pub grade_point: f64,
    #[serde(rename = "isNG")]
    pub is_ng: bool,
}

impl GradingResult {
    fn non_graded() -> Self {
        Self {
            grade: NG_GRADE.to_string(),
            grade_point: 0.0,
            is_ng: true,
        }
    }

    fn from_band(band: Option<&GradeBand>) -> Self {
        match band {
            Some(b) => Self {
                grade: b.grade.clone(),
                grade_point: b.grade_point,
                is_ng: false,
            },
            None => Self::non_graded(),
        }
    }
}

/// Percentages are snapped to this many steps per point before any band lookup.
const PERCENT_RESOLUTION: f64 = 1e6;

/// Full (or over-full) marks are exactly 100 so the top band is always reachable.
///
/// The quotient is snapped to a 1e-6 grid: decimal marks such as 18.9/21 divide
/// to 89.999... in binary floating point and must still land on 90.
pub fn percentage(obtained: f64, full_marks: f64) -> f64 {
    if full_marks <= 0.0 {
        0.0
    } else if obtained >= full_marks {
        100.0
    } else {
        let raw = 100.0 * obtained / full_marks;
        (raw * PERCENT_RESOLUTION).round() / PERCENT_RESOLUTION
    }
}

/// Grades one component (theory or practical).
pub fn grade_component(
    obtained: f64,
    full_marks: f64,
    pass_marks: f64,
    scale: &GradeScale,
) -> GradingResult {
    if obtained < pass_marks {
        return GradingResult::non_graded();
    }
    GradingResult::from_band(scale.band_for(percentage(obtained, full_marks)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectResult {
    #[serde(rename = "subjectId")]
    pub subject_id: String,
    #[serde(rename = "subjectCode")]
    pub subject_code: String,
    #[serde(rename = "subjectName")]
    pub subject_name: String,
    #[serde(rename = "creditHour")]
    pub credit_hour: f64,
    pub theory: f64,
    #[serde(rename = "theoryGrade")]
    pub theory_grade: String,
    #[serde(rename = "theoryGP")]
    pub theory_gp: f64,
    pub practical: f64,
    #[serde(rename = "practicalGrade")]
    pub practical_grade: String,
    #[serde(rename = "practicalGP")]
    pub practical_gp: f64,
    #[serde(rename = "finalGrade")]
    pub final_grade: String,
    #[serde(rename = "finalGP")]
    pub final_gp: f64,
    #[serde(rename = "isNG")]
    pub is_ng: bool,
}

/// Combines a subject's two components into one result.
///
/// The final grade is the aggregate percentage of both components re-mapped
/// through the scale, unless either component is NG.
pub fn subject_result(subject: &Subject, marks: Option<&Marks>, scale: &GradeScale) -> SubjectResult {
    let (theory, practical) = marks
        .map(|m| (m.theory_obtained, m.practical_obtained))
        .unwrap_or((0.0, 0.0));

    let th = grade_component(
        theory,
        subject.full_marks_theory,
        subject.pass_marks_theory,
        scale,
    );
    let pr = grade_component(
        practical,
        subject.full_marks_practical,
        subject.pass_marks_practical,
        scale,
    );

    let is_ng = th.is_ng || pr.is_ng;
    let combined = if is_ng {
        GradingResult::non_graded()
    } else {
        let pct = percentage(
            theory + practical,
            subject.full_marks_theory + subject.full_marks_practical,
        );
        GradingResult::from_band(scale.band_for(pct))
    };

    SubjectResult {
        subject_id: subject.id.clone(),
        subject_code: subject.code.clone(),
        subject_name: subject.name.clone(),
        credit_hour: subject.credit_hour,
        theory,
        theory_grade: th.grade,
        theory_gp: th.grade_point,
        practical,
        practical_grade: pr.grade,
        practical_gp: pr.grade_point,
        final_grade: combined.grade,
        final_gp: combined.grade_point,
        is_ng: is_ng || combined.is_ng,
    }
}

/// Source of a term's per-student records. Absent records are defaulted by the caller.
pub trait RecordLookup {
    fn find_marks(&self, student_id: &str, subject_id: &str, term: Term) -> Option<&Marks>;
    fn find_term_data(&self, student_id: &str, term: Term) -> Option<&TermData>;
}

/// In-memory index over loaded marks and term data.
#[derive(Debug, Clone, Default)]
pub struct TermRecords {
    marks: HashMap<(String, String, Term), Marks>,
    term_data: HashMap<(String, Term), TermData>,
}

impl TermRecords {
    pub fn new<M, T>(marks: M, term_data: T) -> Self
    where
        M: IntoIterator<Item = Marks>,
        T: IntoIterator<Item = TermData>,
    {
        let mut out = Self::default();
        for m in marks {
            out.insert_marks(m);
        }
        for td in term_data {
            out.insert_term_data(td);
        }
        out
    }

    pub fn insert_marks(&mut self, m: Marks) {
        self.marks
            .insert((m.student_id.clone(), m.subject_id.clone(), m.term), m);
    }

    pub fn insert_term_data(&mut self, td: TermData) {
        self.term_data.insert((td.student_id.clone(), td.term), td);
    }
}

impl RecordLookup for TermRecords {
    fn find_marks(&self, student_id: &str, subject_id: &str, term: Term) -> Option<&Marks> {
        self.marks
            .get(&(student_id.to_string(), subject_id.to_string(), term))
    }

    fn find_term_data(&self, student_id: &str, term: Term) -> Option<&TermData> {
        self.term_data.get(&(student_id.to_string(), term))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student: Student,
    pub term: Term,
    pub results: Vec<SubjectResult>,
    /// Weighted average of final grade points. Kept even when the report is
    /// non-graded; use [`StudentReport::display_gpa`] for anything shown.
    pub gpa: f64,
    #[serde(rename = "hasNG")]
    pub has_ng: bool,
    pub attendance_present: u32,
    pub attendance_total: u32,
    pub conduct: Conduct,
}

impl StudentReport {
    /// GPA as every consumer must show it: 0.00 whenever any subject is NG.
    pub fn display_gpa(&self) -> f64 {
        if self.has_ng {
            0.0
        } else {
            round_2_decimals(self.gpa)
        }
    }

    pub fn gpa_text(&self) -> String {
        format!("{:.2}", self.display_gpa())
    }

    pub fn total_credit_hours(&self) -> f64 {
        self.results.iter().map(|r| r.credit_hour).sum()
    }

    /// Counted as passed on the dashboard.
    pub fn is_qualified(&self) -> bool {
        !self.has_ng && !self.results.is_empty()
    }
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `Σ(finalGP × creditHour) / Σ(creditHour)`; 0 when no credit is carried.
pub fn weighted_gpa(results: &[SubjectResult]) -> f64 {
    let mut sum = 0.0_f64;
    let mut credits = 0.0_f64;
    for r in results {
        sum += r.final_gp * r.credit_hour;
        credits += r.credit_hour;
    }
    if credits > 0.0 {
        sum / credits
    } else {
        0.0
    }
}

pub fn build_student_report<L: RecordLookup + ?Sized>(
    student: &Student,
    subjects: &[Subject],
    records: &L,
    term: Term,
    scale: &GradeScale,
) -> StudentReport {
    let results: Vec<SubjectResult> = subjects
        .iter()
        .map(|sub| subject_result(sub, records.find_marks(&student.id, &sub.id, term), scale))
        .collect();

    let has_ng = results.iter().any(|r| r.is_ng);
    let gpa = weighted_gpa(&results);
    let td = records
        .find_term_data(&student.id, term)
        .cloned()
        .unwrap_or_else(|| TermData::neutral(&student.id, term));

    StudentReport {
        student: student.clone(),
        term,
        results,
        gpa,
        has_ng,
        attendance_present: td.attendance_present,
        attendance_total: td.attendance_total,
        conduct: td.conduct,
    }
}

pub fn build_term_reports<L: RecordLookup + ?Sized>(
    students: &[Student],
    subjects: &[Subject],
    records: &L,
    term: Term,
    scale: &GradeScale,
) -> Vec<StudentReport> {
    students
        .iter()
        .map(|s| build_student_report(s, subjects, records, term, scale))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    fn subject(id: &str, credit: f64) -> Subject {
        Subject {
            id: id.to_string(),
            code: id.to_string(),
            name: format!("Subject {}", id),
            credit_hour: credit,
            full_marks_theory: 50.0,
            full_marks_practical: 50.0,
            pass_marks_theory: 18.0,
            pass_marks_practical: 18.0,
            sort_order: 0,
        }
    }

    fn marks(subject_id: &str, th: f64, pr: f64) -> Marks {
        Marks {
            student_id: "s1".to_string(),
            subject_id: subject_id.to_string(),
            term: Term::First,
            theory_obtained: th,
            practical_obtained: pr,
        }
    }

    #[test]
    fn default_scale_is_valid() {
        GradeScale::default().validate().expect("default scale");
    }

    #[test]
    fn band_boundaries_are_inclusive_lower_bounds() {
        let scale = GradeScale::default();
        assert_eq!(grade_component(45.0, 50.0, 18.0, &scale).grade, "A+");
        assert_eq!(grade_component(44.5, 50.0, 18.0, &scale).grade, "A");
        assert_eq!(grade_component(40.0, 50.0, 18.0, &scale).grade, "A");
        assert_eq!(grade_component(18.0, 50.0, 18.0, &scale).grade, "D");
        let r = grade_component(17.5, 50.0, 18.0, &scale);
        assert_eq!(r.grade, NG_GRADE);
        assert!(r.is_ng);
        assert_eq!(r.grade_point, 0.0);
    }

    #[test]
    fn decimal_marks_on_a_threshold_reach_that_band() {
        let scale = GradeScale::default();
        assert_eq!(percentage(18.9, 21.0), 90.0);
        assert_eq!(grade_component(18.9, 21.0, 7.0, &scale).grade, "A+");
        assert_eq!(grade_component(10.2, 17.0, 5.0, &scale).grade, "B");
        assert_eq!(grade_component(9.2, 23.0, 5.0, &scale).grade, "C");
    }

    #[test]
    fn passing_score_below_lowest_threshold_gets_lowest_band() {
        let scale = GradeScale::default();
        let r = grade_component(10.0, 50.0, 10.0, &scale);
        assert!(!r.is_ng);
        assert_eq!(r.grade, "D");
        assert_eq!(r.grade_point, 1.6);
    }

    #[test]
    fn zero_full_marks_does_not_panic_or_nan() {
        let scale = GradeScale::default();
        let r = grade_component(0.0, 0.0, 0.0, &scale);
        assert!(!r.grade_point.is_nan());
    }

    #[test]
    fn final_grade_uses_aggregate_percentage() {
        let scale = GradeScale::default();
        // 45/50 theory (A+), 35/50 practical (B+) → 80% aggregate → A.
        let r = subject_result(&subject("x", 2.5), Some(&marks("x", 45.0, 35.0)), &scale);
        assert_eq!(r.theory_grade, "A+");
        assert_eq!(r.practical_grade, "B+");
        assert_eq!(r.final_grade, "A");
        assert_eq!(r.final_gp, 3.6);
        assert!(!r.is_ng);
    }

    #[test]
    fn one_failed_component_makes_subject_ng() {
        let scale = GradeScale::default();
        let r = subject_result(&subject("x", 2.5), Some(&marks("x", 10.0, 40.0)), &scale);
        assert!(r.is_ng);
        assert_eq!(r.theory_grade, NG_GRADE);
        assert_eq!(r.practical_grade, "A");
        assert_eq!(r.final_grade, NG_GRADE);
        assert_eq!(r.final_gp, 0.0);
    }

    #[test]
    fn scale_validation_rejects_unordered_bands() {
        let mut scale = GradeScale::default();
        scale.bands.swap(0, 1);
        assert_eq!(scale.validate(), Err(ScaleError::ThresholdOrder { index: 1 }));

        let mut scale = GradeScale::default();
        scale.bands[1].grade_point = 4.5;
        assert_eq!(scale.validate(), Err(ScaleError::PointOrder { index: 1 }));

        let mut scale = GradeScale::default();
        scale.bands[2].grade = "ng".to_string();
        assert_eq!(scale.validate(), Err(ScaleError::BadGrade { index: 2 }));
    }

    #[test]
    fn report_keeps_raw_gpa_but_displays_zero_when_ng() {
        let scale = GradeScale::default();
        let subjects = vec![subject("a", 2.5), subject("b", 2.5)];
        let records = TermRecords::new(
            vec![marks("a", 50.0, 50.0), marks("b", 5.0, 50.0)],
            Vec::new(),
        );
        let student = Student {
            id: "s1".to_string(),
            name: "Test".to_string(),
            roll_no: "1".to_string(),
            section: Section::A,
        };
        let report = build_student_report(&student, &subjects, &records, Term::First, &scale);
        assert!(report.has_ng);
        assert!((report.gpa - 2.0).abs() < 1e-9);
        assert_eq!(report.display_gpa(), 0.0);
        assert_eq!(report.gpa_text(), "0.00");
        assert_eq!(report.conduct, Conduct::Good);
        assert!(!report.is_qualified());
    }
}
