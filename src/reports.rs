//! Presentation models assembled from computed student reports: the per-student
//! grade sheet, the per-section ledger and the dashboard summary.
//!
//! Every model reads `display_gpa`, never the raw `gpa`, so a non-graded student
//! always shows 0.00.

use crate::grading::{StudentReport, SubjectResult};
use crate::model::{Conduct, Section, Student, Subject, Term};
use serde::Serialize;

const DASHBOARD_RECENT_LIMIT: usize = 5;

/// A report as sent to callers: the stored fields plus the display values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView<'a> {
    #[serde(flatten)]
    pub report: &'a StudentReport,
    pub display_gpa: f64,
    pub gpa_text: String,
    pub qualified: bool,
}

impl<'a> From<&'a StudentReport> for ReportView<'a> {
    fn from(report: &'a StudentReport) -> Self {
        Self {
            report,
            display_gpa: report.display_gpa(),
            gpa_text: report.gpa_text(),
            qualified: report.is_qualified(),
        }
    }
}

/// Reports for one section (or all), ordered by section then numeric roll.
pub fn reports_for_section(reports: &[StudentReport], section: Option<Section>) -> Vec<&StudentReport> {
    let mut out: Vec<&StudentReport> = reports
        .iter()
        .filter(|r| section.map(|s| r.student.section == s).unwrap_or(true))
        .collect();
    out.sort_by_key(|r| r.student.roll_sort_key());
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductOption {
    pub conduct: Conduct,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheetModel<'a> {
    pub term_label: &'static str,
    #[serde(flatten)]
    pub view: ReportView<'a>,
    pub total_credit_hours: f64,
    pub conduct_options: Vec<ConductOption>,
}

pub fn grade_sheet_model(report: &StudentReport) -> GradeSheetModel<'_> {
    GradeSheetModel {
        term_label: report.term.label(),
        view: ReportView::from(report),
        total_credit_hours: report.total_credit_hours(),
        conduct_options: Conduct::ALL
            .into_iter()
            .map(|c| ConductOption {
                conduct: c,
                selected: c == report.conduct,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerColumn {
    pub subject_id: String,
    pub code: String,
    pub name: String,
    pub credit_hour: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCell {
    pub subject_code: String,
    pub final_grade: String,
    #[serde(rename = "isNG")]
    pub is_ng: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub student_id: String,
    pub name: String,
    pub roll_no: String,
    pub cells: Vec<LedgerCell>,
    #[serde(rename = "hasNG")]
    pub has_ng: bool,
    pub display_gpa: f64,
    pub gpa_text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionLedgerModel {
    pub term: Term,
    pub term_label: &'static str,
    pub section: Section,
    pub columns: Vec<LedgerColumn>,
    pub rows: Vec<LedgerRow>,
    pub row_count: usize,
    pub col_count: usize,
}

fn ledger_cell(r: &SubjectResult) -> LedgerCell {
    LedgerCell {
        subject_code: r.subject_code.clone(),
        final_grade: r.final_grade.clone(),
        is_ng: r.is_ng,
    }
}

pub fn section_ledger_model(
    reports: &[StudentReport],
    subjects: &[Subject],
    term: Term,
    section: Section,
) -> SectionLedgerModel {
    let columns: Vec<LedgerColumn> = subjects
        .iter()
        .map(|s| LedgerColumn {
            subject_id: s.id.clone(),
            code: s.code.clone(),
            name: s.name.clone(),
            credit_hour: s.credit_hour,
        })
        .collect();

    let rows: Vec<LedgerRow> = reports_for_section(reports, Some(section))
        .into_iter()
        .map(|r| LedgerRow {
            student_id: r.student.id.clone(),
            name: r.student.name.clone(),
            roll_no: r.student.roll_no.clone(),
            cells: r.results.iter().map(ledger_cell).collect(),
            has_ng: r.has_ng,
            display_gpa: r.display_gpa(),
            gpa_text: r.gpa_text(),
        })
        .collect();

    SectionLedgerModel {
        term,
        term_label: term.label(),
        section,
        row_count: rows.len(),
        col_count: columns.len(),
        columns,
        rows,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCount {
    pub section: Section,
    pub students: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEntry {
    pub student: Student,
    #[serde(rename = "hasNG")]
    pub has_ng: bool,
    pub display_gpa: f64,
    pub gpa_text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub term: Term,
    pub total_students: usize,
    pub qualified: usize,
    pub non_graded: usize,
    pub sections: Vec<SectionCount>,
    pub total_expense: f64,
    pub recent: Vec<DashboardEntry>,
}

/// `reports` arrive in listing order (section, then numeric roll); the first few
/// become the recent list.
pub fn dashboard_model(reports: &[StudentReport], term: Term, total_expense: f64) -> DashboardModel {
    let qualified = reports.iter().filter(|r| r.is_qualified()).count();
    let non_graded = reports.iter().filter(|r| r.has_ng).count();
    let sections = Section::ALL
        .into_iter()
        .map(|section| SectionCount {
            section,
            students: reports
                .iter()
                .filter(|r| r.student.section == section)
                .count(),
        })
        .collect();
    let recent = reports
        .iter()
        .take(DASHBOARD_RECENT_LIMIT)
        .map(|r| DashboardEntry {
            student: r.student.clone(),
            has_ng: r.has_ng,
            display_gpa: r.display_gpa(),
            gpa_text: r.gpa_text(),
        })
        .collect();

    DashboardModel {
        term,
        total_students: reports.len(),
        qualified,
        non_graded,
        sections,
        total_expense,
        recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::{build_term_reports, GradeScale, TermRecords};
    use crate::model::Marks;

    fn student(id: &str, roll: &str, section: Section) -> Student {
        Student {
            id: id.to_string(),
            name: format!("Student {}", id),
            roll_no: roll.to_string(),
            section,
        }
    }

    fn subject(id: &str) -> Subject {
        Subject {
            id: id.to_string(),
            code: format!("0{}", id),
            name: format!("Subject {}", id),
            credit_hour: 2.0,
            full_marks_theory: 50.0,
            full_marks_practical: 50.0,
            pass_marks_theory: 18.0,
            pass_marks_practical: 18.0,
            sort_order: 0,
        }
    }

    fn fixture() -> (Vec<StudentReport>, Vec<Subject>) {
        let students = vec![
            student("s10", "10", Section::A),
            student("s2", "2", Section::A),
            student("s3", "3", Section::B),
        ];
        let subjects = vec![subject("1"), subject("2")];
        let mut marks = Vec::new();
        for st in ["s10", "s2"] {
            for sub in ["1", "2"] {
                marks.push(Marks {
                    student_id: st.to_string(),
                    subject_id: sub.to_string(),
                    term: Term::First,
                    theory_obtained: 45.0,
                    practical_obtained: 45.0,
                });
            }
        }
        let records = TermRecords::new(marks, Vec::new());
        let reports = build_term_reports(
            &students,
            &subjects,
            &records,
            Term::First,
            &GradeScale::default(),
        );
        (reports, subjects)
    }

    #[test]
    fn ledger_rows_sorted_by_roll_and_columns_follow_subjects() {
        let (reports, subjects) = fixture();
        let ledger = section_ledger_model(&reports, &subjects, Term::First, Section::A);
        assert_eq!(ledger.row_count, 2);
        assert_eq!(ledger.col_count, 2);
        assert_eq!(ledger.rows[0].roll_no, "2");
        assert_eq!(ledger.rows[1].roll_no, "10");
        assert_eq!(ledger.rows[0].cells[0].final_grade, "A+");
        assert_eq!(ledger.rows[0].gpa_text, "4.00");
    }

    #[test]
    fn dashboard_counts_ng_students_as_not_qualified() {
        let (reports, _) = fixture();
        let dash = dashboard_model(&reports, Term::First, 1200.0);
        assert_eq!(dash.total_students, 3);
        assert_eq!(dash.qualified, 2);
        assert_eq!(dash.non_graded, 1);
        assert_eq!(dash.sections[0].students, 2);
        assert_eq!(dash.sections[1].students, 1);
        assert_eq!(dash.recent.len(), 3);
        assert_eq!(dash.recent[2].gpa_text, "0.00");
    }

    #[test]
    fn grade_sheet_marks_selected_conduct() {
        let (reports, _) = fixture();
        let sheet = grade_sheet_model(&reports[0]);
        assert_eq!(sheet.total_credit_hours, 4.0);
        let selected: Vec<Conduct> = sheet
            .conduct_options
            .iter()
            .filter(|o| o.selected)
            .map(|o| o.conduct)
            .collect();
        assert_eq!(selected, vec![Conduct::Good]);

        let v = serde_json::to_value(&sheet).expect("serialize sheet");
        assert_eq!(v["gpaText"], "4.00");
        assert_eq!(v["hasNG"], false);
        assert_eq!(v["termLabel"], "First Terminal");
    }
}
