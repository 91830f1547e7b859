use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attendance status recorded for a student on a given day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [Self::Present, Self::Absent, Self::Late];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attendance status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl rusqlite::types::FromSql for AttendanceStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: UnknownStatus| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

impl rusqlite::ToSql for AttendanceStatus {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// Classification of an attendance percentage
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub enum Band {
    Excellent,
    Good,
    Average,
    Poor,
}

pub const EXCELLENT_THRESHOLD: f64 = 90.0;
pub const GOOD_THRESHOLD: f64 = 75.0;
pub const AVERAGE_THRESHOLD: f64 = 60.0;

impl Band {
    pub fn from_percentage(pct: f64) -> Self {
        if pct >= EXCELLENT_THRESHOLD {
            Self::Excellent
        } else if pct >= GOOD_THRESHOLD {
            Self::Good
        } else if pct >= AVERAGE_THRESHOLD {
            Self::Average
        } else {
            Self::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Average => "Average",
            Self::Poor => "Poor",
        }
    }
}

/// Severity of a low-attendance alert
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub enum AlertLevel {
    Critical,
    Warning,
}

/// Students under this percentage appear in the low-attendance alert
pub const LOW_ATTENDANCE_THRESHOLD: f64 = 75.0;
/// ...and only once they have at least this many recorded days
pub const LOW_ATTENDANCE_MIN_DAYS: i64 = 5;
pub const CRITICAL_THRESHOLD: f64 = 50.0;

impl AlertLevel {
    pub fn from_percentage(pct: f64) -> Self {
        if pct < CRITICAL_THRESHOLD {
            Self::Critical
        } else {
            Self::Warning
        }
    }
}

/// `count / total * 100` rounded to one decimal, 0 when there is nothing to divide by
pub fn percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Course {
    pub id: i64,
    pub course_code: String,
    pub course_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Subject {
    pub id: i64,
    pub subject_code: String,
    pub subject_name: String,
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Student {
    pub id: i64,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub year_level: i64,
    pub course_id: Option<i64>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
}

/// One attendance row joined with its student, course and subject
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttendanceRecord {
    pub id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub student_id: i64,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub year_level: i64,
    pub course_code: Option<String>,
    pub subject_code: Option<String>,
    pub subject_name: Option<String>,
}

impl AttendanceRecord {
    pub fn subject_display(&self) -> String {
        match (&self.subject_code, &self.subject_name) {
            (Some(code), Some(name)) => format!("{} - {}", code, name),
            _ => "General".to_string(),
        }
    }
}

/// Totals over the filtered attendance rows
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OverallStats {
    pub total_records: i64,
    pub total_students: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

impl OverallStats {
    pub fn count(&self, status: AttendanceStatus) -> i64 {
        match status {
            AttendanceStatus::Present => self.present,
            AttendanceStatus::Absent => self.absent,
            AttendanceStatus::Late => self.late,
        }
    }

    pub fn percentage(&self, status: AttendanceStatus) -> f64 {
        percentage(self.count(status), self.total_records)
    }
}

/// Attendance totals for one student
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StudentSummary {
    pub student_id: i64,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub course_code: Option<String>,
    pub total_days: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub percentage: f64,
}

impl StudentSummary {
    pub fn band(&self) -> Band {
        Band::from_percentage(self.percentage)
    }

    pub fn alert_level(&self) -> AlertLevel {
        AlertLevel::from_percentage(self.percentage)
    }
}

/// Attendance totals for one calendar day
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub percentage: f64,
}

/// An entry of the audit trail
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityEntry {
    pub id: i64,
    pub admin_name: Option<String>,
    pub action: String,
    pub details: String,
    pub created_at: String,
}
