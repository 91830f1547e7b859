//! Database operations module for SQLite storage
//!
//! This module handles:
//! - Database initialization and migrations
//! - Lookups of courses, subjects, students and admins
//! - Student number generation
//! - The activity log
//! - Demo data seeding

use anyhow::{Context, Result};
use chrono::Datelike;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::types::{ActivityEntry, Admin, Course, Student, Subject};

/// Migrations embedded in the binary, applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema",
    include_str!("../db/migrations/001_initial_schema.sql"),
)];

/// Initialize the database at the given path, running any pending migrations
pub fn init_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    prepare(conn)
}

/// Fresh in-memory database with the full schema
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    prepare(conn)
}

fn prepare(conn: Connection) -> Result<Connection> {
    // Enable foreign keys
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    register_functions(&conn)?;

    let count = run_migrations(&conn)?;
    if count > 0 {
        info!(count = count, "Applied migrations");
    }

    Ok(conn)
}

/// `fold_case(text)`: Unicode lowercase, for case-insensitive search.
/// SQLite's own `LOWER()` only folds ASCII.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Run pending migrations, returning how many were applied
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = 0;

    for (version, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
            [version],
            |row| row.get(0),
        )?;

        if already_applied {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration: {}", version))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;
        tx.commit()?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

// ========== Courses & subjects ==========

/// All active courses, by code
pub fn list_courses(conn: &Connection) -> Result<Vec<Course>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_code, course_name FROM courses
         WHERE status = 'active'
         ORDER BY course_code ASC",
    )?;

    let courses = stmt
        .query_map([], |row| {
            Ok(Course {
                id: row.get(0)?,
                course_code: row.get(1)?,
                course_name: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(courses)
}

/// Active subjects, optionally restricted to one course
pub fn list_subjects(conn: &Connection, course_id: Option<i64>) -> Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_code, subject_name, course_id FROM subjects
         WHERE status = 'active' AND (?1 IS NULL OR course_id = ?1)
         ORDER BY subject_code ASC",
    )?;

    let subjects = stmt
        .query_map([course_id], |row| {
            Ok(Subject {
                id: row.get(0)?,
                subject_code: row.get(1)?,
                subject_name: row.get(2)?,
                course_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(subjects)
}

pub fn insert_course(conn: &Connection, code: &str, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO courses (course_code, course_name) VALUES (?1, ?2)",
        params![code, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_subject(
    conn: &Connection,
    code: &str,
    name: &str,
    course_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO subjects (subject_code, subject_name, course_id) VALUES (?1, ?2, ?3)",
        params![code, name, course_id],
    )?;
    Ok(conn.last_insert_rowid())
}

// ========== Students ==========

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        student_number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        year_level: row.get(4)?,
        course_id: row.get(5)?,
    })
}

/// Active students, optionally restricted to one course, by name
pub fn list_active_students(conn: &Connection, course_id: Option<i64>) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_number, first_name, last_name, year_level, course_id
         FROM students
         WHERE status = 'active' AND (?1 IS NULL OR course_id = ?1)
         ORDER BY last_name ASC, first_name ASC",
    )?;

    let students = stmt
        .query_map([course_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

/// Next free student number for `year`, formatted `{year}{sequence:03}`.
/// Sequences past 999 simply grow a digit.
pub fn next_student_number(conn: &Connection, year: i32) -> Result<String> {
    let prefix = year.to_string();
    let last: Option<i64> = conn.query_row(
        "SELECT MAX(CAST(SUBSTR(student_number, ?2) AS INTEGER)) FROM students
         WHERE student_number LIKE ?1 || '%'
           AND LENGTH(student_number) >= ?3
           AND SUBSTR(student_number, ?2) NOT GLOB '*[^0-9]*'",
        params![prefix, prefix.len() as i64 + 1, prefix.len() as i64 + 3],
        |row| row.get(0),
    )?;

    let sequence = last.map_or(1, |n| n + 1);
    Ok(format!("{}{:03}", prefix, sequence))
}

/// Insert a student with a freshly generated student number
pub fn insert_student(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    year_level: i64,
    course_id: Option<i64>,
) -> Result<Student> {
    let year = chrono::Local::now().date_naive().year();
    let student_number = next_student_number(conn, year)?;

    conn.execute(
        "INSERT INTO students (student_number, first_name, last_name, year_level, course_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![student_number, first_name, last_name, year_level, course_id],
    )?;

    Ok(Student {
        id: conn.last_insert_rowid(),
        student_number,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        year_level,
        course_id,
    })
}

// ========== Admins & activity log ==========

fn admin_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Admin> {
    Ok(Admin {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
    })
}

pub fn get_admin(conn: &Connection, id: i64) -> Result<Option<Admin>> {
    let admin = conn
        .query_row(
            "SELECT id, username, full_name, email FROM admins WHERE id = ?1",
            [id],
            admin_from_row,
        )
        .optional()?;
    Ok(admin)
}

pub fn find_admin_by_username(conn: &Connection, username: &str) -> Result<Option<Admin>> {
    let admin = conn
        .query_row(
            "SELECT id, username, full_name, email FROM admins WHERE username = ?1",
            [username],
            admin_from_row,
        )
        .optional()?;
    Ok(admin)
}

pub fn insert_admin(conn: &Connection, username: &str, full_name: &str, email: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO admins (username, full_name, email) VALUES (?1, ?2, ?3)",
        params![username, full_name, email],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Append an entry to the activity log
pub fn log_activity(
    conn: &Connection,
    admin_id: Option<i64>,
    action: &str,
    details: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO activity_logs (admin_id, action, details) VALUES (?1, ?2, ?3)",
        params![admin_id, action, details],
    )?;
    Ok(())
}

/// Most recent activity log entries, newest first
pub fn recent_activity(conn: &Connection, limit: usize) -> Result<Vec<ActivityEntry>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, ad.full_name, l.action, l.details, l.created_at
         FROM activity_logs l
         LEFT JOIN admins ad ON l.admin_id = ad.id
         ORDER BY l.created_at DESC, l.id DESC
         LIMIT ?1",
    )?;

    let entries = stmt
        .query_map([limit as i64], |row| {
            Ok(ActivityEntry {
                id: row.get(0)?,
                admin_name: row.get(1)?,
                action: row.get(2)?,
                details: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ========== Dashboard ==========

/// Headline counts shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardCounts {
    pub students: i64,
    pub courses: i64,
    pub subjects: i64,
}

pub fn dashboard_counts(conn: &Connection) -> Result<DashboardCounts> {
    let counts = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM students WHERE status = 'active'),
            (SELECT COUNT(*) FROM courses WHERE status = 'active'),
            (SELECT COUNT(*) FROM subjects WHERE status = 'active')",
        [],
        |row| {
            Ok(DashboardCounts {
                students: row.get(0)?,
                courses: row.get(1)?,
                subjects: row.get(2)?,
            })
        },
    )?;
    Ok(counts)
}

// ========== Demo data ==========

const DEMO_STUDENTS: &[(&str, &str, i64)] = &[
    ("Ada", "Lovelace", 1),
    ("Alan", "Turing", 1),
    ("Grace", "Hopper", 2),
    ("Edsger", "Dijkstra", 2),
    ("Barbara", "Liskov", 3),
    ("Donald", "Knuth", 3),
];

/// Populate an empty database with a course, subjects, students and an admin.
/// Returns false without touching anything when courses already exist.
pub fn seed_demo(conn: &Connection) -> Result<bool> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(false);
    }

    let tx = conn.unchecked_transaction()?;

    let course_id = insert_course(&tx, "BSCS", "Bachelor of Science in Computer Science")?;
    insert_subject(&tx, "CS101", "Introduction to Programming", Some(course_id))?;
    insert_subject(&tx, "CS102", "Data Structures", Some(course_id))?;
    insert_subject(&tx, "MATH101", "Discrete Mathematics", Some(course_id))?;

    for (first, last, year_level) in DEMO_STUDENTS {
        insert_student(&tx, first, last, *year_level, Some(course_id))?;
    }

    insert_admin(&tx, "admin", "System Administrator", "admin@example.com")?;

    tx.commit()?;
    info!(students = DEMO_STUDENTS.len(), "Seeded demo data");
    Ok(true)
}
