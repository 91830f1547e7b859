//! Page models and their renderers.
//!
//! Handlers gather everything a page shows into one of the structs below;
//! rendering never touches the database.

use chrono::NaiveDate;
use maud::{html, Markup};
use std::collections::HashMap;

use crate::attendance::AttendancePage;
use crate::db::DashboardCounts;
use crate::filter::AttendanceFilter;
use crate::html::{
    alert_badge, band_badge, course_options, format_pct, layout, pagination_nav, query_string,
    stat_card, status_badge, student_options, subject_options, Nav, Notice,
};
use crate::report::AttendanceReport;
use crate::types::{ActivityEntry, AttendanceStatus, Course, OverallStats, Student, Subject};

// ========== Dashboard ==========

pub struct DashboardPage {
    pub admin_name: Option<String>,
    pub today: NaiveDate,
    pub counts: DashboardCounts,
    pub today_stats: OverallStats,
    pub recent_activity: Vec<ActivityEntry>,
}

pub fn render_dashboard(page: &DashboardPage) -> Markup {
    let stats = &page.today_stats;
    let today_link = format!("/attendance?date={}", page.today);

    let content = html! {
        div.row {
            (stat_card("Active students", page.counts.students, None, "primary"))
            (stat_card("Courses", page.counts.courses, None, "secondary"))
            (stat_card("Subjects", page.counts.subjects, None, "info"))
            (stat_card(
                "Marked today",
                stats.total_records,
                Some(format!("{} present", format_pct(stats.percentage(AttendanceStatus::Present)))),
                "success",
            ))
        }
        div.row {
            div.col-lg-6.mb-4 {
                div.card {
                    div.card-header { "Today (" (page.today.to_string()) ")" }
                    div.card-body {
                        @if stats.total_records == 0 {
                            p.text-muted { "No attendance recorded today." }
                            a.btn.btn-primary href="/attendance/mark" { "Mark attendance" }
                        } @else {
                            (status_breakdown(stats))
                            a.btn.btn-outline-primary href=(today_link) { "View today's records" }
                        }
                    }
                }
            }
            div.col-lg-6.mb-4 {
                div.card {
                    div.card-header { "Recent activity" }
                    ul.list-group.list-group-flush {
                        @if page.recent_activity.is_empty() {
                            li.list-group-item.text-muted { "Nothing yet." }
                        }
                        @for entry in &page.recent_activity {
                            li.list-group-item {
                                div.small.text-muted {
                                    (entry.created_at) " - " (entry.admin_name.as_deref().unwrap_or("system"))
                                }
                                div { (entry.details) }
                            }
                        }
                    }
                }
            }
        }
    };

    layout("Dashboard", Nav::Dashboard, page.admin_name.as_deref(), None, content)
}

fn status_breakdown(stats: &OverallStats) -> Markup {
    html! {
        table.table.table-sm {
            tbody {
                @for status in AttendanceStatus::ALL {
                    tr {
                        td { (status_badge(status)) }
                        td { (stats.count(status)) }
                        td { (format_pct(stats.percentage(status))) }
                    }
                }
            }
        }
    }
}

// ========== Attendance listing ==========

pub struct ListingPage {
    pub admin_name: Option<String>,
    pub filter: AttendanceFilter,
    pub courses: Vec<Course>,
    pub subjects: Vec<Subject>,
    pub stats: OverallStats,
    pub page: AttendancePage,
}

pub fn render_listing(page: &ListingPage) -> Markup {
    let filter = &page.filter;
    let stats = &page.stats;
    let pagination = &page.page.pagination;
    let pairs = filter.query_pairs();
    let export_link = format!("/attendance/export{}", query_string(&pairs));

    let content = html! {
        form.filters.row.g-2.mb-4 method="get" action="/attendance" {
            div.col-md-3 {
                input.form-control type="text" name="search" placeholder="Name or student number"
                    value=(filter.search.as_deref().unwrap_or(""));
            }
            div.col-md-2 {
                select.form-select name="course" {
                    option value="" { "All courses" }
                    (course_options(&page.courses, filter.course_id))
                }
            }
            div.col-md-2 {
                select.form-select name="subject" {
                    option value="" { "All subjects" }
                    (subject_options(&page.subjects, filter.subject_id))
                }
            }
            div.col-md-2 {
                input.form-control type="date" name="date"
                    value=(filter.date.map(|d| d.to_string()).unwrap_or_default());
            }
            div.col-md-1 {
                select.form-select name="status" {
                    option value="" { "Any" }
                    @for status in AttendanceStatus::ALL {
                        option value=(status.as_str()) selected[filter.status == Some(status)] { (status.label()) }
                    }
                }
            }
            div.col-md-2 {
                button.btn.btn-primary.me-2 type="submit" { "Filter" }
                a.btn.btn-outline-secondary href="/attendance" { "Reset" }
            }
        }

        div.row {
            (stat_card("Records", stats.total_records, Some(format!("{} students", stats.total_students)), "primary"))
            @for (status, color) in [
                (AttendanceStatus::Present, "success"),
                (AttendanceStatus::Absent, "danger"),
                (AttendanceStatus::Late, "warning"),
            ] {
                (stat_card(status.label(), stats.count(status), Some(format_pct(stats.percentage(status))), color))
            }
        }

        div.d-flex.justify-content-between.align-items-center.mb-2 {
            span.text-muted {
                @if pagination.total > 0 && !page.page.records.is_empty() {
                    "Showing " (pagination.first_row()) "-" (pagination.last_row()) " of " (pagination.total)
                } @else {
                    "No records"
                }
            }
            div {
                a.btn.btn-sm.btn-outline-success.me-2 href=(export_link) { "Export CSV" }
                a.btn.btn-sm.btn-primary href="/attendance/mark" { "Mark attendance" }
            }
        }

        div.card.mb-3 {
            div.table-responsive {
                table.table.table-striped.table-hover.mb-0 {
                    thead.table-light {
                        tr {
                            th { "Date" }
                            th { "Student" }
                            th { "Course" }
                            th { "Subject" }
                            th { "Status" }
                            th { "Remarks" }
                        }
                    }
                    tbody {
                        @if page.page.records.is_empty() {
                            tr { td.text-center.text-muted colspan="6" { "No attendance records found." } }
                        }
                        @for record in &page.page.records {
                            tr {
                                td { (record.date.format("%b %d, %Y").to_string()) }
                                td {
                                    a href={"/attendance/view?student_id=" (record.student_id)} {
                                        (record.last_name) ", " (record.first_name)
                                    }
                                    div.small.text-muted { (record.student_number) }
                                }
                                td { (record.course_code.as_deref().unwrap_or("-")) " / Year " (record.year_level) }
                                td { (record.subject_display()) }
                                td { (status_badge(record.status)) }
                                td { (record.remarks.as_deref().unwrap_or("")) }
                            }
                        }
                    }
                }
            }
        }

        (pagination_nav(pagination, "/attendance", &pairs))
    };

    layout("Attendance", Nav::Attendance, page.admin_name.as_deref(), None, content)
}

// ========== Mark attendance ==========

pub struct MarkPage {
    pub admin_name: Option<String>,
    pub notice: Option<Notice>,
    pub date: NaiveDate,
    pub course_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub courses: Vec<Course>,
    pub subjects: Vec<Subject>,
    pub students: Vec<Student>,
    pub marks: HashMap<i64, (AttendanceStatus, Option<String>)>,
}

pub fn render_mark(page: &MarkPage) -> Markup {
    let content = html! {
        form.filters.row.g-2.mb-4 method="get" action="/attendance/mark" {
            div.col-md-3 {
                label.form-label for="attendance_date" { "Date" }
                input.form-control #attendance_date type="date" name="attendance_date" value=(page.date.to_string()) required;
            }
            div.col-md-3 {
                label.form-label for="course_id" { "Course" }
                select.form-select #course_id name="course_id" {
                    option value="" { "Select course" }
                    (course_options(&page.courses, page.course_id))
                }
            }
            div.col-md-3 {
                label.form-label for="subject_id" { "Subject" }
                select.form-select #subject_id name="subject_id" {
                    option value="" { "Select subject" }
                    (subject_options(&page.subjects, page.subject_id))
                }
            }
            div.col-md-3.d-flex.align-items-end {
                button.btn.btn-outline-primary type="submit" { "Load students" }
            }
        }

        @if page.course_id.is_none() {
            p.text-muted { "Select a course to list its students." }
        } @else if page.students.is_empty() {
            p.text-muted { "No active students in this course." }
        } @else {
            form method="post" action="/attendance/mark" {
                input type="hidden" name="attendance_date" value=(page.date.to_string());
                input type="hidden" name="course_id" value=(page.course_id.unwrap_or_default());
                input type="hidden" name="subject_id"
                    value=(page.subject_id.map(|id| id.to_string()).unwrap_or_default());

                div.card.mb-3 {
                    div.table-responsive {
                        table.table.table-hover.mb-0 {
                            thead.table-light {
                                tr {
                                    th { "Student number" }
                                    th { "Name" }
                                    th { "Status" }
                                    th { "Remarks" }
                                }
                            }
                            tbody {
                                @for student in &page.students {
                                    (mark_row(student, page.marks.get(&student.id)))
                                }
                            }
                        }
                    }
                }
                button.btn.btn-primary type="submit" name="submit_attendance" value="1" { "Save attendance" }
            }
        }
    };

    layout(
        "Mark Attendance",
        Nav::Mark,
        page.admin_name.as_deref(),
        page.notice.as_ref(),
        content,
    )
}

fn mark_row(student: &Student, existing: Option<&(AttendanceStatus, Option<String>)>) -> Markup {
    let current = existing.map(|(status, _)| *status);
    let remarks = existing.and_then(|(_, r)| r.as_deref()).unwrap_or("");

    html! {
        tr {
            td { (student.student_number) }
            td { (student.full_name()) }
            td.status-choices {
                div.d-flex {
                    @for status in AttendanceStatus::ALL {
                        @let id = format!("att-{}-{}", student.id, status.as_str());
                        div.form-check {
                            input.form-check-input type="radio" id=(id)
                                name={"attendance[" (student.id) "][status]"}
                                value=(status.as_str())
                                checked[current == Some(status)];
                            label.form-check-label for=(id) { (status.label()) }
                        }
                    }
                }
            }
            td {
                input.form-control.form-control-sm type="text"
                    name={"attendance[" (student.id) "][remarks]"} value=(remarks);
            }
        }
    }
}

// ========== Reports ==========

pub struct ReportPage {
    pub admin_name: Option<String>,
    pub filter: AttendanceFilter,
    pub courses: Vec<Course>,
    pub subjects: Vec<Subject>,
    pub students: Vec<Student>,
    pub report: AttendanceReport,
}

pub fn render_report(page: &ReportPage) -> Markup {
    let filter = &page.filter;
    let report = &page.report;
    let export_link = format!("/attendance/export{}", query_string(&filter.query_pairs()));

    let content = html! {
        form.filters.row.g-2.mb-4 method="get" action="/attendance/view" {
            div.col-md-3 {
                select.form-select name="student_id" {
                    option value="" { "All students" }
                    (student_options(&page.students, filter.student_id))
                }
            }
            div.col-md-2 {
                select.form-select name="course_id" {
                    option value="" { "All courses" }
                    (course_options(&page.courses, filter.course_id))
                }
            }
            div.col-md-2 {
                select.form-select name="subject_id" {
                    option value="" { "All subjects" }
                    (subject_options(&page.subjects, filter.subject_id))
                }
            }
            div.col-md-2 {
                input.form-control type="date" name="date_from"
                    value=(filter.date_from.map(|d| d.to_string()).unwrap_or_default());
            }
            div.col-md-2 {
                input.form-control type="date" name="date_to"
                    value=(filter.date_to.map(|d| d.to_string()).unwrap_or_default());
            }
            div.col-md-1 {
                button.btn.btn-primary type="submit" { "Apply" }
            }
        }

        div.row {
            (stat_card("Records", report.overall.total_records, Some(format!("{} students", report.overall.total_students)), "primary"))
            @for (status, color) in [
                (AttendanceStatus::Present, "success"),
                (AttendanceStatus::Absent, "danger"),
                (AttendanceStatus::Late, "warning"),
            ] {
                (stat_card(status.label(), report.overall.count(status), Some(format_pct(report.overall.percentage(status))), color))
            }
        }

        div.d-flex.justify-content-end.mb-3 {
            a.btn.btn-sm.btn-outline-success.me-2 href=(export_link) { "Export CSV" }
            button.btn.btn-sm.btn-outline-secondary type="button" onclick="window.print()" { "Print" }
        }

        @if !report.low_attendance.is_empty() {
            div.card.border-danger.mb-4 {
                div.card-header.bg-danger.text-white { "Low attendance alert" }
                div.table-responsive {
                    table.table.table-sm.mb-0 {
                        thead {
                            tr {
                                th { "Student" }
                                th { "Days" }
                                th { "Attendance" }
                                th { "Level" }
                            }
                        }
                        tbody {
                            @for summary in &report.low_attendance {
                                tr {
                                    td { (summary.last_name) ", " (summary.first_name) " (" (summary.student_number) ")" }
                                    td { (summary.total_days) }
                                    td { (format_pct(summary.percentage)) }
                                    td { (alert_badge(summary.alert_level())) }
                                }
                            }
                        }
                    }
                }
            }
        }

        div.row {
            div.col-lg-7.mb-4 {
                div.card {
                    div.card-header { "Student summary" }
                    div.table-responsive {
                        table.table.table-striped.mb-0 {
                            thead.table-light {
                                tr {
                                    th { "Student" }
                                    th { "Course" }
                                    th { "Days" }
                                    th { "Present" }
                                    th { "Absent" }
                                    th { "Late" }
                                    th { "Attendance" }
                                    th { "Rating" }
                                }
                            }
                            tbody {
                                @if report.students.is_empty() {
                                    tr { td.text-center.text-muted colspan="8" { "No attendance in this range." } }
                                }
                                @for summary in &report.students {
                                    tr {
                                        td {
                                            (summary.last_name) ", " (summary.first_name)
                                            div.small.text-muted { (summary.student_number) }
                                        }
                                        td { (summary.course_code.as_deref().unwrap_or("-")) }
                                        td { (summary.total_days) }
                                        td { (summary.present) }
                                        td { (summary.absent) }
                                        td { (summary.late) }
                                        td { (format_pct(summary.percentage)) }
                                        td { (band_badge(summary.band())) }
                                    }
                                }
                            }
                        }
                    }
                }
            }
            div.col-lg-5.mb-4 {
                div.card {
                    div.card-header { "Daily trend" }
                    div.table-responsive {
                        table.table.table-sm.mb-0 {
                            thead.table-light {
                                tr {
                                    th { "Date" }
                                    th { "Present" }
                                    th { "Absent" }
                                    th { "Late" }
                                    th { "Rate" }
                                }
                            }
                            tbody {
                                @for day in &report.daily {
                                    tr {
                                        td { (day.date.format("%a %b %d").to_string()) }
                                        td { (day.present) }
                                        td { (day.absent) }
                                        td { (day.late) }
                                        td { (format_pct(day.percentage)) }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };

    layout("Attendance Report", Nav::Reports, page.admin_name.as_deref(), None, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::Pagination;
    use crate::types::{AttendanceRecord, StudentSummary};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn student(id: i64, last: &str) -> Student {
        Student {
            id,
            student_number: format!("2024{:03}", id),
            first_name: "Test".to_string(),
            last_name: last.to_string(),
            year_level: 1,
            course_id: Some(1),
        }
    }

    #[test]
    fn test_mark_page_prefills_existing_marks() {
        let mut marks = HashMap::new();
        marks.insert(2, (AttendanceStatus::Late, Some("bus".to_string())));

        let page = MarkPage {
            admin_name: None,
            notice: Some(Notice::success("Saved")),
            date: date("2024-01-10"),
            course_id: Some(1),
            subject_id: Some(3),
            courses: vec![],
            subjects: vec![],
            students: vec![student(1, "Hopper"), student(2, "Lovelace")],
            marks,
        };
        let html = render_mark(&page).into_string();

        assert!(html.contains("name=\"attendance[1][status]\""));
        assert!(html.contains("name=\"attendance[2][remarks]\" value=\"bus\""));
        assert_eq!(html.matches("checked").count(), 1);
        assert!(html.contains("alert-success"));
        assert!(html.contains("submit_attendance"));
    }

    #[test]
    fn test_mark_page_without_course_has_no_form() {
        let page = MarkPage {
            admin_name: None,
            notice: None,
            date: date("2024-01-10"),
            course_id: None,
            subject_id: None,
            courses: vec![],
            subjects: vec![],
            students: vec![],
            marks: HashMap::new(),
        };
        let html = render_mark(&page).into_string();
        assert!(!html.contains("submit_attendance"));
        assert!(html.contains("Select a course"));
    }

    #[test]
    fn test_listing_renders_rows_and_stats() {
        let record = AttendanceRecord {
            id: 1,
            date: date("2024-01-10"),
            status: AttendanceStatus::Absent,
            remarks: Some("sick".to_string()),
            student_id: 4,
            student_number: "2024004".to_string(),
            first_name: "Alan".to_string(),
            last_name: "Turing".to_string(),
            year_level: 2,
            course_code: Some("BSCS".to_string()),
            subject_code: None,
            subject_name: None,
        };
        let page = ListingPage {
            admin_name: Some("Admin".to_string()),
            filter: AttendanceFilter::default(),
            courses: vec![],
            subjects: vec![],
            stats: OverallStats {
                total_records: 1,
                total_students: 1,
                present: 0,
                absent: 1,
                late: 0,
            },
            page: AttendancePage {
                records: vec![record],
                pagination: Pagination::new(1, 20, 1),
            },
        };
        let html = render_listing(&page).into_string();

        assert!(html.contains("Turing, Alan"));
        assert!(html.contains("General"));
        assert!(html.contains("100.0%"));
        assert!(html.contains("Showing 1-1 of 1"));
        assert!(!html.contains("page-link"));
    }

    #[test]
    fn test_report_shows_bands_and_alerts() {
        let summary = StudentSummary {
            student_id: 1,
            student_number: "2024001".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            course_code: None,
            total_days: 10,
            present: 4,
            absent: 6,
            late: 0,
            percentage: 40.0,
        };
        let page = ReportPage {
            admin_name: None,
            filter: AttendanceFilter::default(),
            courses: vec![],
            subjects: vec![],
            students: vec![],
            report: AttendanceReport {
                overall: OverallStats::default(),
                students: vec![summary.clone()],
                daily: vec![],
                low_attendance: vec![summary],
            },
        };
        let html = render_report(&page).into_string();

        assert!(html.contains("Low attendance alert"));
        assert!(html.contains("Critical"));
        assert!(html.contains("Poor"));
        assert!(html.contains("40.0%"));
    }
}
