//! Translation of optional query-string filters into a parameterized WHERE clause.
//!
//! Every attendance page (listing, reports, export) scopes its queries with the
//! same predicate, so the listing count and the aggregates always agree on the
//! row set. Column names and operators come from a closed set below; values are
//! always bound.

use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use serde::Deserialize;

use crate::types::AttendanceStatus;

/// Raw query string as submitted by the filter forms.
///
/// Everything is kept as text: forms submit empty strings for unset selects,
/// and an unparsable value must behave like an unset one rather than reject
/// the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterQuery {
    pub search: Option<String>,
    #[serde(alias = "course_id")]
    pub course: Option<String>,
    #[serde(alias = "subject_id")]
    pub subject: Option<String>,
    pub student_id: Option<String>,
    pub date: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
}

impl FilterQuery {
    /// Requested page, 1 when absent or invalid
    pub fn page(&self) -> u32 {
        parse_id(&self.page)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1)
            .max(1)
    }
}

/// Recognized attendance filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceFilter {
    pub search: Option<String>,
    pub course_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub student_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
}

impl From<&FilterQuery> for AttendanceFilter {
    fn from(query: &FilterQuery) -> Self {
        Self {
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            course_id: parse_id(&query.course),
            subject_id: parse_id(&query.subject),
            student_id: parse_id(&query.student_id),
            date: parse_date(&query.date),
            date_from: parse_date(&query.date_from),
            date_to: parse_date(&query.date_to),
            status: query.status.as_deref().and_then(|s| s.parse().ok()),
        }
    }
}

impl AttendanceFilter {
    /// Fill a missing range bound: first day of `today`'s month through `today`
    pub fn with_default_range(mut self, today: NaiveDate) -> Self {
        if self.date_from.is_none() {
            self.date_from = today.with_day(1);
        }
        if self.date_to.is_none() {
            self.date_to = Some(today);
        }
        self
    }

    /// Build the predicate over the `attendance a JOIN students s` row set
    pub fn build(&self) -> WhereClause {
        let mut clause = WhereClause::default();

        if let Some(ref search) = self.search {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            clause.push(
                "(fold_case(s.first_name) LIKE ? ESCAPE '\\' \
                 OR fold_case(s.last_name) LIKE ? ESCAPE '\\' \
                 OR fold_case(s.student_number) LIKE ? ESCAPE '\\')",
                vec![
                    Value::Text(pattern.clone()),
                    Value::Text(pattern.clone()),
                    Value::Text(pattern),
                ],
            );
        }
        if let Some(course_id) = self.course_id {
            clause.push("s.course_id = ?", vec![Value::Integer(course_id)]);
        }
        if let Some(subject_id) = self.subject_id {
            clause.push("a.subject_id = ?", vec![Value::Integer(subject_id)]);
        }
        if let Some(student_id) = self.student_id {
            clause.push("a.student_id = ?", vec![Value::Integer(student_id)]);
        }
        if let Some(date) = self.date {
            clause.push("a.date = ?", vec![date_value(date)]);
        }
        if let Some(from) = self.date_from {
            clause.push("a.date >= ?", vec![date_value(from)]);
        }
        if let Some(to) = self.date_to {
            clause.push("a.date <= ?", vec![date_value(to)]);
        }
        if let Some(status) = self.status {
            clause.push("a.status = ?", vec![Value::Text(status.as_str().to_string())]);
        }

        clause
    }

    /// Query-string pairs reproducing this filter, used for page links
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(ref search) = self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(id) = self.course_id {
            pairs.push(("course", id.to_string()));
        }
        if let Some(id) = self.subject_id {
            pairs.push(("subject", id.to_string()));
        }
        if let Some(id) = self.student_id {
            pairs.push(("student_id", id.to_string()));
        }
        if let Some(date) = self.date {
            pairs.push(("date", date.to_string()));
        }
        if let Some(date) = self.date_from {
            pairs.push(("date_from", date.to_string()));
        }
        if let Some(date) = self.date_to {
            pairs.push(("date_to", date.to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        pairs
    }
}

/// AND-joined conditions plus their positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl WhereClause {
    fn push(&mut self, condition: &str, params: Vec<Value>) {
        debug_assert_eq!(condition.matches('?').count(), params.len());
        self.conditions.push(condition.to_string());
        self.params.extend(params);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `" WHERE c1 AND c2"`, or an empty string when nothing is filtered
    pub fn sql(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameters followed by `extra`, for queries appending LIMIT/OFFSET
    pub fn params_with(&self, extra: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut all = self.params.clone();
        all.extend(extra);
        all
    }
}

fn date_value(date: NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn parse_id(raw: &Option<String>) -> Option<i64> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|id| *id > 0)
}

pub fn parse_date(raw: &Option<String>) -> Option<NaiveDate> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}
