//! Page chrome and widgets shared by every page.

use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::pagination::Pagination;
use crate::types::{AlertLevel, AttendanceStatus, Band, Course, Student, Subject};

const BOOTSTRAP_CSS: &str = "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css";
const BOOTSTRAP_JS: &str = "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/js/bootstrap.bundle.min.js";

/// Section highlighted in the navigation bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    Dashboard,
    Attendance,
    Mark,
    Reports,
}

const NAV_ITEMS: &[(Nav, &str, &str)] = &[
    (Nav::Dashboard, "/", "Dashboard"),
    (Nav::Attendance, "/attendance", "Attendance"),
    (Nav::Mark, "/attendance/mark", "Mark Attendance"),
    (Nav::Reports, "/attendance/view", "Reports"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Danger,
}

impl NoticeKind {
    fn class(&self) -> &'static str {
        match self {
            Self::Success => "alert-success",
            Self::Danger => "alert-danger",
        }
    }
}

/// One-shot message shown above the page content
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub messages: Vec<String>,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            messages: vec![message.into()],
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Danger,
            messages: vec![message.into()],
        }
    }

    pub fn errors(messages: Vec<String>) -> Self {
        Self {
            kind: NoticeKind::Danger,
            messages,
        }
    }
}

pub fn layout(
    title: &str,
    nav: Nav,
    admin_name: Option<&str>,
    notice: Option<&Notice>,
    content: Markup,
) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) " - Registro" }
                link rel="stylesheet" href=(BOOTSTRAP_CSS);
                style { (PreEscaped(CSS)) }
            }
            body {
                nav.navbar.navbar-expand-lg.navbar-dark.bg-primary.mb-4 {
                    div.container-fluid {
                        a.navbar-brand href="/" { "Registro" }
                        ul.navbar-nav.me-auto {
                            @for (item, href, label) in NAV_ITEMS {
                                li.nav-item {
                                    a.nav-link.active[*item == nav] href=(href) { (label) }
                                }
                            }
                        }
                        @if let Some(name) = admin_name {
                            span.navbar-text { "Signed in as " strong { (name) } }
                        }
                    }
                }
                main.container-fluid {
                    h1.h3.mb-4 { (title) }
                    @if let Some(notice) = notice {
                        (render_notice(notice))
                    }
                    (content)
                }
                script src=(BOOTSTRAP_JS) {}
            }
        }
    }
}

fn render_notice(notice: &Notice) -> Markup {
    html! {
        div class={"alert alert-dismissible fade show " (notice.kind.class())} role="alert" {
            @if notice.messages.len() == 1 {
                (notice.messages[0])
            } @else {
                ul.mb-0 {
                    @for message in &notice.messages {
                        li { (message) }
                    }
                }
            }
            button.btn-close type="button" data-bs-dismiss="alert" aria-label="Close" {}
        }
    }
}

/// Stand-alone page for failed requests
pub fn render_error_page(title: &str, message: &str) -> Markup {
    layout(
        title,
        Nav::Dashboard,
        None,
        Some(&Notice::danger(message)),
        html! { a.btn.btn-outline-primary href="/" { "Back to dashboard" } },
    )
}

pub fn status_badge(status: AttendanceStatus) -> Markup {
    let class = match status {
        AttendanceStatus::Present => "bg-success",
        AttendanceStatus::Absent => "bg-danger",
        AttendanceStatus::Late => "bg-warning text-dark",
    };
    html! { span class={"badge " (class)} { (status.label()) } }
}

pub fn band_badge(band: Band) -> Markup {
    let class = match band {
        Band::Excellent => "bg-success",
        Band::Good => "bg-info text-dark",
        Band::Average => "bg-warning text-dark",
        Band::Poor => "bg-danger",
    };
    html! { span class={"badge " (class)} { (band.label()) } }
}

pub fn alert_badge(level: AlertLevel) -> Markup {
    match level {
        AlertLevel::Critical => html! { span.badge.bg-danger { "Critical" } },
        AlertLevel::Warning => html! { span.badge.bg-warning.text-dark { "Warning" } },
    }
}

pub fn format_pct(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Summary tile with a big number
pub fn stat_card(label: &str, value: impl std::fmt::Display, detail: Option<String>, color: &str) -> Markup {
    html! {
        div.col-md-3.col-sm-6.mb-3 {
            div class={"card stat-card border-start border-4 border-" (color)} {
                div.card-body {
                    div.text-muted.small.text-uppercase { (label) }
                    div.fs-3.fw-bold { (value.to_string()) }
                    @if let Some(detail) = detail {
                        div.small.text-muted { (detail) }
                    }
                }
            }
        }
    }
}

/// `?a=1&b=2` from the given pairs, empty when there are none
pub fn query_string(pairs: &[(&str, String)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let joined = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("?{}", joined)
}

/// Previous / numbered / next links, carrying the current filter along
pub fn pagination_nav(pagination: &Pagination, path: &str, pairs: &[(&str, String)]) -> Markup {
    let link = |page: u32| {
        let mut all = pairs.to_vec();
        all.push(("page", page.to_string()));
        format!("{}{}", path, query_string(&all))
    };

    html! {
        @if pagination.total_pages() > 1 {
            nav aria-label="Page navigation" {
                ul.pagination.justify-content-center {
                    li.page-item.disabled[!pagination.has_previous()] {
                        a.page-link href=(link(pagination.page.saturating_sub(1).max(1))) { "Previous" }
                    }
                    @for page in pagination.pages() {
                        li.page-item.active[page == pagination.page] {
                            a.page-link href=(link(page)) { (page) }
                        }
                    }
                    li.page-item.disabled[!pagination.has_next()] {
                        a.page-link href=(link(pagination.page + 1)) { "Next" }
                    }
                }
            }
        }
    }
}

pub fn course_options(courses: &[Course], selected: Option<i64>) -> Markup {
    html! {
        @for course in courses {
            option value=(course.id) selected[selected == Some(course.id)] {
                (course.course_code) " - " (course.course_name)
            }
        }
    }
}

pub fn subject_options(subjects: &[Subject], selected: Option<i64>) -> Markup {
    html! {
        @for subject in subjects {
            option value=(subject.id) selected[selected == Some(subject.id)] {
                (subject.subject_code) " - " (subject.subject_name)
            }
        }
    }
}

pub fn student_options(students: &[Student], selected: Option<i64>) -> Markup {
    html! {
        @for student in students {
            option value=(student.id) selected[selected == Some(student.id)] {
                (student.full_name()) " (" (student.student_number) ")"
            }
        }
    }
}

const CSS: &str = r#"
body {
    background: #f5f6fa;
}

.stat-card {
    box-shadow: 0 1px 3px rgba(0,0,0,0.08);
}

.table td, .table th {
    vertical-align: middle;
}

.status-choices .form-check {
    margin-right: 1rem;
}

@media print {
    nav, form.filters, .pagination, .btn {
        display: none !important;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_encodes_values() {
        assert_eq!(query_string(&[]), "");
        assert_eq!(
            query_string(&[("search", "de la cruz".to_string()), ("page", "2".to_string())]),
            "?search=de%20la%20cruz&page=2"
        );
    }

    #[test]
    fn test_layout_escapes_content() {
        let page = layout(
            "<script>",
            Nav::Attendance,
            Some("Admin"),
            None,
            html! { p { "<b>" } },
        )
        .into_string();
        assert!(page.contains("&lt;script&gt; - Registro"));
        assert!(page.contains("&lt;b&gt;"));
        assert!(page.contains("Signed in as"));
    }

    #[test]
    fn test_notice_renders_all_messages() {
        let notice = Notice::errors(vec!["first".to_string(), "second".to_string()]);
        let page = layout("T", Nav::Mark, None, Some(&notice), html! {}).into_string();
        assert!(page.contains("alert-danger"));
        assert!(page.contains("<li>first</li>"));
        assert!(page.contains("<li>second</li>"));
    }

    #[test]
    fn test_pagination_hidden_for_single_page() {
        let markup = pagination_nav(&Pagination::new(1, 20, 5), "/attendance", &[]).into_string();
        assert!(markup.is_empty());
    }

    #[test]
    fn test_pagination_links_keep_filter() {
        let pairs = vec![("status", "late".to_string())];
        let markup = pagination_nav(&Pagination::new(2, 10, 30), "/attendance", &pairs).into_string();
        assert!(markup.contains("/attendance?status=late&amp;page=1"));
        assert!(markup.contains("/attendance?status=late&amp;page=3"));
        assert_eq!(markup.matches("page-item active").count(), 1);
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(33.333), "33.3%");
        assert_eq!(format_pct(0.0), "0.0%");
    }
}
