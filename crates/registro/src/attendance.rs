//! Attendance marking and listing.
//!
//! Marks are written in one IMMEDIATE transaction so the existence check and
//! the write cannot interleave with another submission; the unique index on
//! (student, subject, date) backs the same invariant at the schema level.

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

use crate::db;
use crate::error::MarkError;
use crate::filter::{parse_date, parse_id, AttendanceFilter, WhereClause};
use crate::pagination::Pagination;
use crate::types::{AttendanceRecord, AttendanceStatus};

/// Rows of `attendance` joined with the tables every listing needs
const JOINED_FROM: &str = "FROM attendance a
     JOIN students s ON a.student_id = s.id
     LEFT JOIN courses c ON s.course_id = c.id
     LEFT JOIN subjects sub ON a.subject_id = sub.id";

const RECORD_COLUMNS: &str = "a.id, a.date, a.status, a.remarks, s.id, s.student_number,
     s.first_name, s.last_name, s.year_level, c.course_code, sub.subject_code, sub.subject_name";

const RECORD_ORDER: &str = "ORDER BY a.date DESC, s.last_name ASC, s.first_name ASC, a.id ASC";

// ========== Mark form ==========

/// One student's line of the mark form, as submitted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkEntry {
    pub status: String,
    pub remarks: String,
}

/// Decoded mark-attendance submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkForm {
    pub date: Option<NaiveDate>,
    pub course_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub submitted: bool,
    pub entries: BTreeMap<i64, MarkEntry>,
}

impl MarkForm {
    /// Decode urlencoded pairs, including `attendance[{student_id}][status|remarks]` keys
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut form = MarkForm::default();

        for (key, value) in pairs {
            match key.as_str() {
                "attendance_date" => form.date = parse_date(&Some(value.clone())),
                "course_id" => form.course_id = parse_id(&Some(value.clone())),
                "subject_id" => form.subject_id = parse_id(&Some(value.clone())),
                "submit_attendance" => form.submitted = true,
                _ => {
                    if let Some((student_id, field)) = parse_entry_key(key) {
                        let entry = form.entries.entry(student_id).or_default();
                        match field {
                            "status" => entry.status = value.trim().to_string(),
                            "remarks" => entry.remarks = value.trim().to_string(),
                            _ => {}
                        }
                    }
                }
            }
        }

        form
    }

    /// Date and subject, or the list of what is missing
    pub fn validate(&self) -> Result<(NaiveDate, i64), Vec<String>> {
        let mut errors = Vec::new();
        if self.date.is_none() {
            errors.push("Attendance date is required".to_string());
        }
        if self.subject_id.is_none() {
            errors.push("Subject is required".to_string());
        }
        match (self.date, self.subject_id) {
            (Some(date), Some(subject_id)) if errors.is_empty() => Ok((date, subject_id)),
            _ => Err(errors),
        }
    }
}

/// `attendance[12][status]` -> `(12, "status")`
fn parse_entry_key(key: &str) -> Option<(i64, &str)> {
    let rest = key.strip_prefix("attendance[")?;
    let (id, rest) = rest.split_once("][")?;
    let field = rest.strip_suffix(']')?;
    let id = id.parse::<i64>().ok()?;
    Some((id, field))
}

// ========== Upsert ==========

/// How many marks a submission created and how many it overwrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertOutcome {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Insert or update one mark per student for `date`/`subject_id`, all or nothing.
///
/// Entries with an empty or unknown status are skipped.
pub fn upsert_attendance(
    conn: &mut Connection,
    date: NaiveDate,
    subject_id: Option<i64>,
    entries: &BTreeMap<i64, MarkEntry>,
) -> rusqlite::Result<UpsertOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut outcome = UpsertOutcome::default();

    for (student_id, entry) in entries {
        let status: AttendanceStatus = match entry.status.parse() {
            Ok(status) => status,
            Err(_) => {
                debug!(student_id, status = %entry.status, "Skipping entry without valid status");
                continue;
            }
        };
        let remarks = Some(entry.remarks.as_str()).filter(|r| !r.is_empty());

        let changed = tx.execute(
            "UPDATE attendance SET status = ?1, remarks = ?2, updated_at = datetime('now')
             WHERE student_id = ?3 AND date = ?4 AND subject_id IS ?5",
            params![status, remarks, student_id, date, subject_id],
        )?;

        if changed > 0 {
            outcome.updated += 1;
        } else {
            tx.execute(
                "INSERT INTO attendance (student_id, subject_id, date, status, remarks)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![student_id, subject_id, date, status, remarks],
            )?;
            outcome.inserted += 1;
        }
    }

    // Dropping the transaction on an early return rolls the batch back
    tx.commit()?;
    Ok(outcome)
}

/// Validate a submission, write its marks and record the action in the activity log
pub fn mark_attendance(
    conn: &mut Connection,
    admin_id: Option<i64>,
    form: &MarkForm,
) -> Result<UpsertOutcome, MarkError> {
    let (date, subject_id) = form.validate().map_err(MarkError::Validation)?;

    let outcome = upsert_attendance(conn, date, Some(subject_id), &form.entries).map_err(|e| {
        error!(error = %e, %date, subject_id, "Attendance batch rolled back");
        MarkError::from(e)
    })?;

    info!(
        %date,
        subject_id,
        inserted = outcome.inserted,
        updated = outcome.updated,
        "Attendance marked"
    );

    let details = format!(
        "Marked attendance for {} on {} (subject {}): {} new, {} updated",
        outcome.total(),
        date,
        subject_id,
        outcome.inserted,
        outcome.updated
    );
    if let Err(e) = db::log_activity(conn, admin_id, "mark_attendance", &details) {
        warn!(error = %e, "Failed to write activity log");
    }

    Ok(outcome)
}

/// Existing marks for a day and subject, keyed by student id
pub fn marks_for(
    conn: &Connection,
    date: NaiveDate,
    subject_id: i64,
) -> Result<HashMap<i64, (AttendanceStatus, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, status, remarks FROM attendance
         WHERE date = ?1 AND subject_id = ?2",
    )?;

    let marks = stmt
        .query_map(params![date, subject_id], |row| {
            let student_id: i64 = row.get(0)?;
            let status: AttendanceStatus = row.get(1)?;
            let remarks: Option<String> = row.get(2)?;
            Ok((student_id, (status, remarks)))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;

    Ok(marks)
}

// ========== Listing ==========

/// One page of joined attendance rows
#[derive(Debug, Clone)]
pub struct AttendancePage {
    pub records: Vec<AttendanceRecord>,
    pub pagination: Pagination,
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.get(0)?,
        date: row.get(1)?,
        status: row.get(2)?,
        remarks: row.get(3)?,
        student_id: row.get(4)?,
        student_number: row.get(5)?,
        first_name: row.get(6)?,
        last_name: row.get(7)?,
        year_level: row.get(8)?,
        course_code: row.get(9)?,
        subject_code: row.get(10)?,
        subject_name: row.get(11)?,
    })
}

/// Number of attendance rows matching the clause
pub fn count_attendance(conn: &Connection, clause: &WhereClause) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) {}{}", JOINED_FROM, clause.sql());
    let count: i64 = conn.query_row(&sql, params_from_iter(clause.params()), |row| row.get(0))?;
    Ok(count as u64)
}

/// Page `page` of the rows matching `filter`, newest first
pub fn list_attendance(
    conn: &Connection,
    filter: &AttendanceFilter,
    page: u32,
    page_size: u32,
) -> Result<AttendancePage> {
    let clause = filter.build();
    let total = count_attendance(conn, &clause)?;
    let pagination = Pagination::new(page, page_size, total);

    let sql = format!(
        "SELECT {} {}{} {} LIMIT ? OFFSET ?",
        RECORD_COLUMNS,
        JOINED_FROM,
        clause.sql(),
        RECORD_ORDER
    );
    let params = clause.params_with([
        Value::Integer(pagination.page_size as i64),
        Value::Integer(pagination.offset() as i64),
    ]);

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(params.iter()), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AttendancePage {
        records,
        pagination,
    })
}

/// Every row matching `filter`, in listing order
pub fn all_attendance(conn: &Connection, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>> {
    let clause = filter.build();
    let sql = format!(
        "SELECT {} {}{} {}",
        RECORD_COLUMNS,
        JOINED_FROM,
        clause.sql(),
        RECORD_ORDER
    );

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(clause.params()), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{insert_course, insert_student, insert_subject, open_in_memory};

    pub(crate) struct Fixture {
        pub conn: Connection,
        pub course_id: i64,
        pub subject_id: i64,
        pub students: Vec<i64>,
    }

    /// One course, one subject, and `n` students named Student00..
    pub(crate) fn fixture(n: usize) -> Fixture {
        let conn = open_in_memory().unwrap();
        let course_id = insert_course(&conn, "BSCS", "Computer Science").unwrap();
        let subject_id = insert_subject(&conn, "S1", "Subject One", Some(course_id)).unwrap();
        let students = (0..n)
            .map(|i| {
                insert_student(&conn, &format!("First{:02}", i), &format!("Student{:02}", i), 1, Some(course_id))
                    .unwrap()
                    .id
            })
            .collect();
        Fixture {
            conn,
            course_id,
            subject_id,
            students,
        }
    }

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn entries(marks: &[(i64, &str)]) -> BTreeMap<i64, MarkEntry> {
        marks
            .iter()
            .map(|(id, status)| {
                (
                    *id,
                    MarkEntry {
                        status: status.to_string(),
                        remarks: String::new(),
                    },
                )
            })
            .collect()
    }

    fn attendance_rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))
            .unwrap()
    }

    // ========== Form decoding tests ==========

    #[test]
    fn test_parse_entry_key() {
        assert_eq!(parse_entry_key("attendance[12][status]"), Some((12, "status")));
        assert_eq!(parse_entry_key("attendance[3][remarks]"), Some((3, "remarks")));
        assert_eq!(parse_entry_key("attendance[x][status]"), None);
        assert_eq!(parse_entry_key("attendance[12]"), None);
        assert_eq!(parse_entry_key("other"), None);
    }

    #[test]
    fn test_form_from_pairs() {
        let pairs: Vec<(String, String)> = [
            ("attendance_date", "2024-01-10"),
            ("course_id", "1"),
            ("subject_id", "2"),
            ("attendance[5][status]", "present"),
            ("attendance[5][remarks]", "  on time "),
            ("attendance[6][status]", "late"),
            ("submit_attendance", "1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let form = MarkForm::from_pairs(&pairs);
        assert_eq!(form.date, Some(date("2024-01-10")));
        assert_eq!(form.course_id, Some(1));
        assert_eq!(form.subject_id, Some(2));
        assert!(form.submitted);
        assert_eq!(form.entries.len(), 2);
        assert_eq!(form.entries[&5].remarks, "on time");
        assert_eq!(form.entries[&6].status, "late");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let errors = MarkForm::default().validate().unwrap_err();
        assert_eq!(errors.len(), 2);

        let form = MarkForm {
            date: Some(date("2024-01-10")),
            ..Default::default()
        };
        assert_eq!(form.validate().unwrap_err(), vec!["Subject is required".to_string()]);
    }

    // ========== Upsert tests ==========

    #[test]
    fn test_upsert_inserts_then_updates() {
        let mut fx = fixture(3);
        let marks = entries(&[
            (fx.students[0], "present"),
            (fx.students[1], "absent"),
            (fx.students[2], "late"),
        ]);

        let first = upsert_attendance(&mut fx.conn, date("2024-01-10"), Some(fx.subject_id), &marks).unwrap();
        assert_eq!(first, UpsertOutcome { inserted: 3, updated: 0 });

        let second = upsert_attendance(&mut fx.conn, date("2024-01-10"), Some(fx.subject_id), &marks).unwrap();
        assert_eq!(second, UpsertOutcome { inserted: 0, updated: 3 });

        assert_eq!(attendance_rows(&fx.conn), 3);
    }

    #[test]
    fn test_upsert_update_changes_status_and_remarks() {
        let mut fx = fixture(1);
        let student = fx.students[0];
        upsert_attendance(&mut fx.conn, date("2024-01-10"), Some(fx.subject_id), &entries(&[(student, "absent")]))
            .unwrap();

        let mut changed = entries(&[(student, "late")]);
        changed.get_mut(&student).unwrap().remarks = "bus".to_string();
        upsert_attendance(&mut fx.conn, date("2024-01-10"), Some(fx.subject_id), &changed).unwrap();

        let marks = marks_for(&fx.conn, date("2024-01-10"), fx.subject_id).unwrap();
        assert_eq!(marks[&student], (AttendanceStatus::Late, Some("bus".to_string())));
    }

    #[test]
    fn test_upsert_skips_invalid_status() {
        let mut fx = fixture(3);
        let marks = entries(&[
            (fx.students[0], "present"),
            (fx.students[1], ""),
            (fx.students[2], "excused"),
        ]);

        let outcome = upsert_attendance(&mut fx.conn, date("2024-01-10"), Some(fx.subject_id), &marks).unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 1, updated: 0 });
        assert_eq!(attendance_rows(&fx.conn), 1);
    }

    #[test]
    fn test_upsert_is_atomic() {
        let mut fx = fixture(2);
        // Unknown student violates the foreign key after two good rows
        let marks = entries(&[
            (fx.students[0], "present"),
            (fx.students[1], "present"),
            (9_999, "present"),
        ]);

        let result = upsert_attendance(&mut fx.conn, date("2024-01-10"), Some(fx.subject_id), &marks);
        assert!(result.is_err());
        assert_eq!(attendance_rows(&fx.conn), 0);
    }

    #[test]
    fn test_upsert_general_subject_is_distinct_key() {
        let mut fx = fixture(1);
        let student = fx.students[0];
        let marks = entries(&[(student, "present")]);

        upsert_attendance(&mut fx.conn, date("2024-01-10"), None, &marks).unwrap();
        let again = upsert_attendance(&mut fx.conn, date("2024-01-10"), None, &marks).unwrap();
        assert_eq!(again, UpsertOutcome { inserted: 0, updated: 1 });

        upsert_attendance(&mut fx.conn, date("2024-01-10"), Some(fx.subject_id), &marks).unwrap();
        assert_eq!(attendance_rows(&fx.conn), 2);
    }

    #[test]
    fn test_unique_index_rejects_duplicate_mark() {
        let fx = fixture(1);
        let insert = "INSERT INTO attendance (student_id, subject_id, date, status) VALUES (?1, ?2, '2024-01-10', 'present')";
        fx.conn.execute(insert, params![fx.students[0], fx.subject_id]).unwrap();
        assert!(fx.conn.execute(insert, params![fx.students[0], fx.subject_id]).is_err());
    }

    #[test]
    fn test_mark_attendance_validation_touches_nothing() {
        let mut fx = fixture(1);
        let form = MarkForm {
            entries: entries(&[(fx.students[0], "present")]),
            ..Default::default()
        };

        match mark_attendance(&mut fx.conn, None, &form) {
            Err(MarkError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(attendance_rows(&fx.conn), 0);
        assert!(db::recent_activity(&fx.conn, 5).unwrap().is_empty());
    }

    #[test]
    fn test_mark_attendance_logs_activity() {
        let mut fx = fixture(2);
        let admin = db::insert_admin(&fx.conn, "admin", "Admin", "").unwrap();
        let form = MarkForm {
            date: Some(date("2024-01-10")),
            course_id: Some(fx.course_id),
            subject_id: Some(fx.subject_id),
            submitted: true,
            entries: entries(&[(fx.students[0], "present"), (fx.students[1], "absent")]),
        };

        let outcome = mark_attendance(&mut fx.conn, Some(admin), &form).unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 2, updated: 0 });

        let log = db::recent_activity(&fx.conn, 5).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "mark_attendance");
        assert!(log[0].details.contains("2 new, 0 updated"));
    }

    #[test]
    fn test_mark_attendance_survives_activity_log_failure() {
        let mut fx = fixture(1);
        fx.conn.execute_batch("DROP TABLE activity_logs").unwrap();
        let form = MarkForm {
            date: Some(date("2024-01-10")),
            subject_id: Some(fx.subject_id),
            submitted: true,
            entries: entries(&[(fx.students[0], "present")]),
            ..Default::default()
        };

        let outcome = mark_attendance(&mut fx.conn, None, &form).unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 1, updated: 0 });
        assert_eq!(attendance_rows(&fx.conn), 1);
    }

    #[test]
    fn test_mark_attendance_store_error() {
        let mut fx = fixture(1);
        let form = MarkForm {
            date: Some(date("2024-01-10")),
            subject_id: Some(fx.subject_id),
            entries: entries(&[(fx.students[0], "present"), (4_242, "late")]),
            ..Default::default()
        };

        assert!(matches!(
            mark_attendance(&mut fx.conn, None, &form),
            Err(MarkError::Store(_))
        ));
        assert_eq!(attendance_rows(&fx.conn), 0);
    }

    // ========== Listing tests ==========

    fn seed_listing(fx: &mut Fixture) {
        for (day, status) in [("2024-01-08", "present"), ("2024-01-09", "absent"), ("2024-01-10", "late")] {
            let marks = fx.students.iter().map(|id| (*id, status)).collect::<Vec<_>>();
            upsert_attendance(&mut fx.conn, date(day), Some(fx.subject_id), &entries(&marks)).unwrap();
        }
    }

    #[test]
    fn test_list_orders_by_date_then_name() {
        let mut fx = fixture(3);
        seed_listing(&mut fx);

        let page = list_attendance(&fx.conn, &AttendanceFilter::default(), 1, 4).unwrap();
        assert_eq!(page.pagination.total, 9);
        assert_eq!(page.records.len(), 4);
        assert_eq!(page.records[0].date, date("2024-01-10"));
        assert_eq!(page.records[0].last_name, "Student00");
        assert_eq!(page.records[2].last_name, "Student02");
        assert_eq!(page.records[3].date, date("2024-01-09"));
        assert_eq!(page.records[0].subject_display(), "S1 - Subject One");
    }

    #[test]
    fn test_list_out_of_range_page_is_empty() {
        let mut fx = fixture(2);
        seed_listing(&mut fx);

        let page = list_attendance(&fx.conn, &AttendanceFilter::default(), 10, 5).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.pagination.total, 6);
    }

    #[test]
    fn test_count_agrees_with_listing() {
        let mut fx = fixture(4);
        seed_listing(&mut fx);

        let filters = vec![
            AttendanceFilter::default(),
            AttendanceFilter {
                status: Some(AttendanceStatus::Absent),
                ..Default::default()
            },
            AttendanceFilter {
                search: Some("student01".to_string()),
                ..Default::default()
            },
            AttendanceFilter {
                course_id: Some(fx.course_id),
                date: Some(date("2024-01-09")),
                ..Default::default()
            },
            AttendanceFilter {
                date_from: Some(date("2024-01-09")),
                date_to: Some(date("2024-01-10")),
                subject_id: Some(fx.subject_id),
                ..Default::default()
            },
            AttendanceFilter {
                subject_id: Some(fx.subject_id + 100),
                ..Default::default()
            },
        ];

        for filter in filters {
            let count = count_attendance(&fx.conn, &filter.build()).unwrap();
            let all = all_attendance(&fx.conn, &filter).unwrap();
            let page = list_attendance(&fx.conn, &filter, 1, 1_000).unwrap();
            assert_eq!(count as usize, all.len(), "filter {:?}", filter);
            assert_eq!(count as usize, page.records.len(), "filter {:?}", filter);
        }
    }

    #[test]
    fn test_search_ignores_case_of_accented_names() {
        let mut fx = fixture(1);
        let emile = db::insert_student(&fx.conn, "Émile", "Zoë", 1, Some(fx.course_id)).unwrap();
        upsert_attendance(
            &mut fx.conn,
            date("2024-01-10"),
            Some(fx.subject_id),
            &entries(&[(emile.id, "present"), (fx.students[0], "present")]),
        )
        .unwrap();

        for term in ["Émile", "émile", "ÉMILE", "ZOË", "zoë", "mIlE"] {
            let filter = AttendanceFilter {
                search: Some(term.to_string()),
                ..Default::default()
            };
            let records = all_attendance(&fx.conn, &filter).unwrap();
            assert_eq!(records.len(), 1, "search {:?}", term);
            assert_eq!(records[0].student_id, emile.id);
            assert_eq!(count_attendance(&fx.conn, &filter.build()).unwrap(), 1);
        }
    }

    #[test]
    fn test_search_matches_student_number() {
        let mut fx = fixture(2);
        seed_listing(&mut fx);
        let number: String = fx
            .conn
            .query_row(
                "SELECT student_number FROM students WHERE id = ?1",
                [fx.students[1]],
                |row| row.get(0),
            )
            .unwrap();

        let filter = AttendanceFilter {
            search: Some(number),
            ..Default::default()
        };
        let records = all_attendance(&fx.conn, &filter).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.student_id == fx.students[1]));
    }
}
