use crate::grading::{GradeScale, TermRecords};
use crate::model::{
    Conduct, Expense, Marks, Section, Student, Subject, Term, TermData, User, UserRole,
};
use rusqlite::{types::Type, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";
pub const GRADE_SCALE_KEY: &str = "grading.scale";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            role TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            section TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            credit_hour REAL NOT NULL,
            full_marks_theory REAL NOT NULL,
            full_marks_practical REAL NOT NULL,
            pass_marks_theory REAL NOT NULL,
            pass_marks_practical REAL NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Report column order; older workspaces kept insertion order only.
    ensure_subjects_sort_order(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            term TEXT NOT NULL,
            theory_obtained REAL NOT NULL DEFAULT 0,
            practical_obtained REAL NOT NULL DEFAULT 0,
            updated_at TEXT,
            PRIMARY KEY(student_id, subject_id, term),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_marks_term ON marks(term)", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS term_data(
            student_id TEXT NOT NULL,
            term TEXT NOT NULL,
            attendance_present INTEGER NOT NULL DEFAULT 0,
            attendance_total INTEGER NOT NULL DEFAULT 0,
            conduct TEXT NOT NULL DEFAULT 'Good',
            updated_at TEXT,
            PRIMARY KEY(student_id, term),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses(
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_subjects_sort_order(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "subjects", "sort_order")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE subjects ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
        [],
    )?;

    let mut stmt = conn.prepare("SELECT id FROM subjects ORDER BY rowid")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for (i, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE subjects SET sort_order = ? WHERE id = ?",
            (i as i64, id),
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn enum_col<T>(idx: usize, raw: String, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized value {:?}", raw).into(),
        )
    })
}

/// Fills an empty workspace with the starter accounts, curriculum and class list.
/// Returns whether anything was written.
pub fn seed_defaults_if_empty(conn: &Connection) -> anyhow::Result<bool> {
    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    let subject_count: i64 = conn.query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))?;
    let student_count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    if user_count > 0 || subject_count > 0 || student_count > 0 {
        return Ok(false);
    }

    let tx = conn.unchecked_transaction()?;
    for (username, password, role, name) in [
        ("admin", "admin123", UserRole::Admin, "Main Admin"),
        ("teacher1", "password123", UserRole::Teacher, "Class Teacher"),
    ] {
        insert_user(&tx, username, password, role, name)?;
    }

    for (code, name, credit) in [
        ("01", "Nepali", 2.5),
        ("03", "English", 2.5),
        ("05", "Mathematics", 2.5),
        ("07", "Social Studies", 2.5),
        ("09", "Science", 2.5),
        ("11", "Health & Physical", 1.5),
        ("13", "Computer", 2.0),
    ] {
        let mut subject = Subject {
            id: new_id(),
            code: code.to_string(),
            name: name.to_string(),
            credit_hour: credit,
            full_marks_theory: 50.0,
            full_marks_practical: 50.0,
            pass_marks_theory: 18.0,
            pass_marks_practical: 18.0,
            sort_order: 0,
        };
        insert_subject(&tx, &mut subject)?;
    }

    for (name, roll) in [("Subina Tamang", "8"), ("Aarav Sharma", "1")] {
        insert_student(
            &tx,
            &Student {
                id: new_id(),
                name: name.to_string(),
                roll_no: roll.to_string(),
                section: Section::A,
            },
        )?;
    }
    tx.commit()?;
    Ok(true)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Active grade scale. A missing or unreadable saved scale falls back to the default
/// so a damaged setting cannot block report generation.
pub fn load_grade_scale(conn: &Connection) -> anyhow::Result<GradeScale> {
    let Some(saved) = settings_get_json(conn, GRADE_SCALE_KEY)? else {
        return Ok(GradeScale::default());
    };
    match serde_json::from_value::<GradeScale>(saved) {
        Ok(scale) if scale.validate().is_ok() => Ok(scale),
        Ok(_) | Err(_) => {
            tracing::warn!("stored grade scale is invalid; using default");
            Ok(GradeScale::default())
        }
    }
}

pub fn save_grade_scale(conn: &Connection, scale: &GradeScale) -> anyhow::Result<()> {
    settings_set_json(conn, GRADE_SCALE_KEY, &serde_json::to_value(scale)?)
}

// --- users ---

pub fn insert_user(
    conn: &Connection,
    username: &str,
    password: &str,
    role: UserRole,
    name: &str,
) -> anyhow::Result<User> {
    let user = User {
        id: new_id(),
        username: username.to_string(),
        role,
        name: name.to_string(),
    };
    conn.execute(
        "INSERT INTO users(id, username, password, role, name) VALUES(?, ?, ?, ?, ?)",
        (&user.id, &user.username, password, role.as_str(), &user.name),
    )?;
    Ok(user)
}

fn user_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: r.get(0)?,
        username: r.get(1)?,
        role: enum_col(2, r.get(2)?, UserRole::parse)?,
        name: r.get(3)?,
    })
}

pub fn find_user_by_credentials(
    conn: &Connection,
    username: &str,
    password: &str,
) -> anyhow::Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, username, role, name FROM users WHERE username = ? AND password = ?",
            (username, password),
            user_from_row,
        )
        .optional()?)
}

pub fn list_users(conn: &Connection) -> anyhow::Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, username, role, name FROM users ORDER BY username")?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn username_taken(conn: &Connection, username: &str) -> anyhow::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [username], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

pub fn delete_user(conn: &Connection, user_id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?", [user_id])? > 0)
}

// --- students ---

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        roll_no: r.get(2)?,
        section: enum_col(3, r.get(3)?, Section::parse)?,
    })
}

/// Students ordered by section, then numeric roll.
pub fn list_students(conn: &Connection, section: Option<Section>) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare("SELECT id, name, roll_no, section FROM students")?;
    let mut students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(sec) = section {
        students.retain(|s| s.section == sec);
    }
    students.sort_by_key(|s| s.roll_sort_key());
    Ok(students)
}

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    Ok(conn
        .query_row(
            "SELECT id, name, roll_no, section FROM students WHERE id = ?",
            [student_id],
            student_from_row,
        )
        .optional()?)
}

pub fn insert_student(conn: &Connection, student: &Student) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO students(id, name, roll_no, section, updated_at) VALUES(?, ?, ?, ?, ?)",
        (
            &student.id,
            student.name.trim(),
            student.roll_no.trim(),
            student.section.as_str(),
            now_stamp(),
        ),
    )?;
    Ok(())
}

pub fn update_student(conn: &Connection, student: &Student) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE students SET name = ?, roll_no = ?, section = ?, updated_at = ? WHERE id = ?",
        (
            student.name.trim(),
            student.roll_no.trim(),
            student.section.as_str(),
            now_stamp(),
            &student.id,
        ),
    )?;
    Ok(changed > 0)
}

/// Removes a student with every mark and term record they own.
pub fn delete_student(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM marks WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM term_data WHERE student_id = ?", [student_id])?;
    let changed = tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    tx.commit()?;
    Ok(changed > 0)
}

// --- subjects ---

const SUBJECT_COLUMNS: &str = "id, code, name, credit_hour, full_marks_theory, full_marks_practical,
    pass_marks_theory, pass_marks_practical, sort_order";

fn subject_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        credit_hour: r.get(3)?,
        full_marks_theory: r.get(4)?,
        full_marks_practical: r.get(5)?,
        pass_marks_theory: r.get(6)?,
        pass_marks_practical: r.get(7)?,
        sort_order: r.get(8)?,
    })
}

pub fn list_subjects(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let sql = format!(
        "SELECT {} FROM subjects ORDER BY sort_order, rowid",
        SUBJECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let subjects = stmt
        .query_map([], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subjects)
}

pub fn get_subject(conn: &Connection, subject_id: &str) -> anyhow::Result<Option<Subject>> {
    let sql = format!("SELECT {} FROM subjects WHERE id = ?", SUBJECT_COLUMNS);
    Ok(conn
        .query_row(&sql, [subject_id], subject_from_row)
        .optional()?)
}

/// Appends the subject after the current last column and records its sort order.
pub fn insert_subject(conn: &Connection, subject: &mut Subject) -> anyhow::Result<()> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM subjects",
        [],
        |r| r.get(0),
    )?;
    subject.sort_order = next;
    conn.execute(
        "INSERT INTO subjects(id, code, name, credit_hour, full_marks_theory, full_marks_practical,
            pass_marks_theory, pass_marks_practical, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            subject.id,
            subject.code.trim(),
            subject.name.trim(),
            subject.credit_hour,
            subject.full_marks_theory,
            subject.full_marks_practical,
            subject.pass_marks_theory,
            subject.pass_marks_practical,
            subject.sort_order,
            now_stamp(),
        ],
    )?;
    Ok(())
}

pub fn update_subject(conn: &Connection, subject: &Subject) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE subjects SET code = ?, name = ?, credit_hour = ?, full_marks_theory = ?,
            full_marks_practical = ?, pass_marks_theory = ?, pass_marks_practical = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            subject.code.trim(),
            subject.name.trim(),
            subject.credit_hour,
            subject.full_marks_theory,
            subject.full_marks_practical,
            subject.pass_marks_theory,
            subject.pass_marks_practical,
            now_stamp(),
            subject.id,
        ],
    )?;
    Ok(changed > 0)
}

pub fn subject_has_marks(conn: &Connection, subject_id: &str) -> anyhow::Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM marks WHERE subject_id = ? LIMIT 1",
            [subject_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub fn delete_subject(conn: &Connection, subject_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM marks WHERE subject_id = ?", [subject_id])?;
    let changed = tx.execute("DELETE FROM subjects WHERE id = ?", [subject_id])?;
    tx.commit()?;
    Ok(changed > 0)
}

/// Rewrites sort order from the given id sequence. Caller guarantees it is a
/// permutation of the stored subject ids.
pub fn reorder_subjects(conn: &Connection, ordered_ids: &[String]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for (i, id) in ordered_ids.iter().enumerate() {
        tx.execute(
            "UPDATE subjects SET sort_order = ? WHERE id = ?",
            (i as i64, id),
        )?;
    }
    tx.commit()?;
    Ok(())
}

// --- marks / term data ---

pub fn list_marks(conn: &Connection, term: Term) -> anyhow::Result<Vec<Marks>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, subject_id, theory_obtained, practical_obtained
         FROM marks
         WHERE term = ?
         ORDER BY student_id, subject_id",
    )?;
    let marks = stmt
        .query_map([term.code()], |r| {
            Ok(Marks {
                student_id: r.get(0)?,
                subject_id: r.get(1)?,
                term,
                theory_obtained: r.get(2)?,
                practical_obtained: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(marks)
}

pub fn list_term_data(conn: &Connection, term: Term) -> anyhow::Result<Vec<TermData>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, attendance_present, attendance_total, conduct
         FROM term_data
         WHERE term = ?
         ORDER BY student_id",
    )?;
    let rows = stmt
        .query_map([term.code()], |r| {
            Ok(TermData {
                student_id: r.get(0)?,
                term,
                attendance_present: r.get(1)?,
                attendance_total: r.get(2)?,
                conduct: enum_col(3, r.get(3)?, Conduct::parse)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Upserts a batch of already-validated marks and term data in one transaction.
/// Records not present in the batch are left untouched.
pub fn save_term_records(conn: &Connection, marks: &[Marks], term_data: &[TermData]) -> anyhow::Result<()> {
    let stamp = now_stamp();
    let tx = conn.unchecked_transaction()?;
    for m in marks {
        tx.execute(
            "INSERT INTO marks(student_id, subject_id, term, theory_obtained, practical_obtained, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, term) DO UPDATE SET
               theory_obtained = excluded.theory_obtained,
               practical_obtained = excluded.practical_obtained,
               updated_at = excluded.updated_at",
            rusqlite::params![
                m.student_id,
                m.subject_id,
                m.term.code(),
                m.theory_obtained,
                m.practical_obtained,
                stamp,
            ],
        )?;
    }
    for td in term_data {
        tx.execute(
            "INSERT INTO term_data(student_id, term, attendance_present, attendance_total, conduct, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, term) DO UPDATE SET
               attendance_present = excluded.attendance_present,
               attendance_total = excluded.attendance_total,
               conduct = excluded.conduct,
               updated_at = excluded.updated_at",
            rusqlite::params![
                td.student_id,
                td.term.code(),
                td.attendance_present,
                td.attendance_total,
                td.conduct.as_str(),
                stamp,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn load_term_records(conn: &Connection, term: Term) -> anyhow::Result<TermRecords> {
    Ok(TermRecords::new(
        list_marks(conn, term)?,
        list_term_data(conn, term)?,
    ))
}

// --- expenses ---

pub fn list_expenses(conn: &Connection) -> anyhow::Result<Vec<Expense>> {
    let mut stmt = conn.prepare(
        "SELECT id, description, amount, category, date
         FROM expenses
         ORDER BY date DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Expense {
                id: r.get(0)?,
                description: r.get(1)?,
                amount: r.get(2)?,
                category: r.get(3)?,
                date: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_expense(conn: &Connection, expense: &Expense) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO expenses(id, description, amount, category, date, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            expense.id,
            expense.description.trim(),
            expense.amount,
            expense.category.trim(),
            expense.date.trim(),
            now_stamp(),
        ],
    )?;
    Ok(())
}

pub fn delete_expense(conn: &Connection, expense_id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM expenses WHERE id = ?", [expense_id])? > 0)
}

pub fn total_expenses(conn: &Connection) -> anyhow::Result<f64> {
    Ok(conn.query_row("SELECT COALESCE(SUM(amount), 0) FROM expenses", [], |r| r.get(0))?)
}
