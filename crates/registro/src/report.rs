//! Aggregate attendance reports.
//!
//! Each view is an independent grouped query over the same filtered row set.
//! Nothing is cached; every call reflects the current contents of the store.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::filter::{AttendanceFilter, WhereClause};
use crate::types::{
    percentage, DailyTrend, OverallStats, StudentSummary, LOW_ATTENDANCE_MIN_DAYS,
    LOW_ATTENDANCE_THRESHOLD,
};

const DAILY_TREND_DAYS: i64 = 10;
const LOW_ATTENDANCE_LIMIT: i64 = 10;

const FROM_FILTERED: &str = "FROM attendance a
     JOIN students s ON a.student_id = s.id
     LEFT JOIN courses c ON s.course_id = c.id";

const STATUS_COUNTS: &str = "COUNT(*),
     COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0),
     COALESCE(SUM(CASE WHEN a.status = 'absent' THEN 1 ELSE 0 END), 0),
     COALESCE(SUM(CASE WHEN a.status = 'late' THEN 1 ELSE 0 END), 0)";

const PRESENT_PCT: &str =
    "ROUND(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END) * 100.0 / COUNT(*), 1)";

/// All four views for one filter
#[derive(Debug, Clone)]
pub struct AttendanceReport {
    pub overall: OverallStats,
    pub students: Vec<StudentSummary>,
    pub daily: Vec<DailyTrend>,
    pub low_attendance: Vec<StudentSummary>,
}

pub fn build_report(conn: &Connection, filter: &AttendanceFilter) -> Result<AttendanceReport> {
    let clause = filter.build();
    Ok(AttendanceReport {
        overall: overall_stats(conn, &clause)?,
        students: student_summaries(conn, &clause)?,
        daily: daily_trend(conn, &clause)?,
        low_attendance: low_attendance(conn, &clause)?,
    })
}

/// Row and student totals with per-status counts
pub fn overall_stats(conn: &Connection, clause: &WhereClause) -> Result<OverallStats> {
    let sql = format!(
        "SELECT COUNT(*), COUNT(DISTINCT a.student_id),
            COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN a.status = 'absent' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN a.status = 'late' THEN 1 ELSE 0 END), 0)
         {}{}",
        FROM_FILTERED,
        clause.sql()
    );

    let stats = conn.query_row(&sql, params_from_iter(clause.params()), |row| {
        Ok(OverallStats {
            total_records: row.get(0)?,
            total_students: row.get(1)?,
            present: row.get(2)?,
            absent: row.get(3)?,
            late: row.get(4)?,
        })
    })?;

    Ok(stats)
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentSummary> {
    let total_days: i64 = row.get(5)?;
    let present: i64 = row.get(6)?;
    Ok(StudentSummary {
        student_id: row.get(0)?,
        student_number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        course_code: row.get(4)?,
        total_days,
        present,
        absent: row.get(7)?,
        late: row.get(8)?,
        percentage: percentage(present, total_days),
    })
}

fn summary_query(clause: &WhereClause, having: &str, order: &str, limit: &str) -> String {
    format!(
        "SELECT s.id, s.student_number, s.first_name, s.last_name, c.course_code, {}
         {}{}
         GROUP BY s.id, s.student_number, s.first_name, s.last_name, c.course_code
         {} {} {}",
        STATUS_COUNTS,
        FROM_FILTERED,
        clause.sql(),
        having,
        order,
        limit
    )
}

/// Per-student totals, best attendance first, then by name
pub fn student_summaries(conn: &Connection, clause: &WhereClause) -> Result<Vec<StudentSummary>> {
    let sql = summary_query(
        clause,
        "",
        &format!("ORDER BY {} DESC, s.last_name ASC, s.first_name ASC", PRESENT_PCT),
        "",
    );

    let mut stmt = conn.prepare(&sql)?;
    let summaries = stmt
        .query_map(params_from_iter(clause.params()), summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(summaries)
}

/// Students under the low-attendance threshold with enough recorded days, worst first
pub fn low_attendance(conn: &Connection, clause: &WhereClause) -> Result<Vec<StudentSummary>> {
    let sql = summary_query(
        clause,
        &format!("HAVING COUNT(*) >= ? AND {} < ?", PRESENT_PCT),
        &format!("ORDER BY {} ASC, s.last_name ASC, s.first_name ASC", PRESENT_PCT),
        "LIMIT ?",
    );
    let params = clause.params_with([
        Value::Integer(LOW_ATTENDANCE_MIN_DAYS),
        Value::Real(LOW_ATTENDANCE_THRESHOLD),
        Value::Integer(LOW_ATTENDANCE_LIMIT),
    ]);

    let mut stmt = conn.prepare(&sql)?;
    let summaries = stmt
        .query_map(params_from_iter(params.iter()), summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(summaries)
}

/// Per-day totals for the most recent days, newest first
pub fn daily_trend(conn: &Connection, clause: &WhereClause) -> Result<Vec<DailyTrend>> {
    let sql = format!(
        "SELECT a.date, {} {}{} GROUP BY a.date ORDER BY a.date DESC LIMIT ?",
        STATUS_COUNTS,
        FROM_FILTERED,
        clause.sql()
    );
    let params = clause.params_with([Value::Integer(DAILY_TREND_DAYS)]);

    let mut stmt = conn.prepare(&sql)?;
    let days = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            let total: i64 = row.get(1)?;
            let present: i64 = row.get(2)?;
            Ok(DailyTrend {
                date: row.get(0)?,
                total,
                present,
                absent: row.get(3)?,
                late: row.get(4)?,
                percentage: percentage(present, total),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(days)
}
