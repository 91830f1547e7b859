use axum::extract::{Form, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::attendance::{self, MarkForm};
use crate::config::Config;
use crate::context::RequestContext;
use crate::db;
use crate::error::{AppError, MarkError};
use crate::export;
use crate::filter::{AttendanceFilter, FilterQuery};
use crate::html::Notice;
use crate::pages::{self, DashboardPage, ListingPage, MarkPage, ReportPage};
use crate::report;
use crate::types::OverallStats;

const RECENT_ACTIVITY: usize = 8;

/// Application state shared across requests
pub struct AppState {
    pub db: Mutex<Connection>,
    pub config: Config,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(conn),
            config,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/attendance", get(listing_handler))
        .route("/attendance/mark", get(mark_form_handler).post(mark_submit_handler))
        .route("/attendance/view", get(report_handler))
        .route("/attendance/export", get(export_handler))
        .route("/api/attendance/stats", get(stats_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let conn = db::init_db(&config.database_path)?;
    let addr = SocketAddr::new(config.bind, config.port);
    let state = AppState::new(conn, config);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server running");
    axum::serve(listener, app).await?;

    Ok(())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Serve the dashboard
async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Html<String>, AppError> {
    let today = today();
    let conn = state.db.lock().await;

    let today_filter = AttendanceFilter {
        date: Some(today),
        ..Default::default()
    };
    let page = DashboardPage {
        admin_name: ctx.admin_name().map(str::to_string),
        today,
        counts: db::dashboard_counts(&conn)?,
        today_stats: report::overall_stats(&conn, &today_filter.build())?,
        recent_activity: db::recent_activity(&conn, RECENT_ACTIVITY)?,
    };

    Ok(Html(pages::render_dashboard(&page).into_string()))
}

/// Filtered, paginated attendance listing with totals
async fn listing_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<FilterQuery>,
) -> Result<Html<String>, AppError> {
    let filter = AttendanceFilter::from(&query);
    let conn = state.db.lock().await;

    let page = ListingPage {
        admin_name: ctx.admin_name().map(str::to_string),
        courses: db::list_courses(&conn)?,
        subjects: db::list_subjects(&conn, None)?,
        stats: report::overall_stats(&conn, &filter.build())?,
        page: attendance::list_attendance(&conn, &filter, query.page(), state.config.page_size)?,
        filter,
    };

    Ok(Html(pages::render_listing(&page).into_string()))
}

/// Course/subject/date selection and the student grid
async fn mark_form_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Html<String>, AppError> {
    let form = MarkForm::from_pairs(&pairs);
    let conn = state.db.lock().await;
    let page = mark_page(&conn, &ctx, &form, None)?;
    Ok(Html(pages::render_mark(&page).into_string()))
}

/// Save a mark-attendance submission and re-render the grid with the outcome
async fn mark_submit_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Html<String>, AppError> {
    let form = MarkForm::from_pairs(&pairs);
    let mut conn = state.db.lock().await;

    let notice = if form.submitted {
        Some(match attendance::mark_attendance(&mut conn, ctx.admin_id(), &form) {
            Ok(outcome) => Notice::success(format!(
                "Attendance saved: {} new, {} updated.",
                outcome.inserted, outcome.updated
            )),
            Err(MarkError::Validation(errors)) => Notice::errors(errors),
            Err(MarkError::Store(_)) => {
                Notice::danger("Failed to save attendance. No changes were made.")
            }
        })
    } else {
        None
    };

    let page = mark_page(&conn, &ctx, &form, notice)?;
    Ok(Html(pages::render_mark(&page).into_string()))
}

fn mark_page(
    conn: &Connection,
    ctx: &RequestContext,
    form: &MarkForm,
    notice: Option<Notice>,
) -> Result<MarkPage, AppError> {
    let date = form.date.unwrap_or_else(today);

    let students = match form.course_id {
        Some(course_id) => db::list_active_students(conn, Some(course_id))?,
        None => Vec::new(),
    };
    let marks = match form.subject_id {
        Some(subject_id) if !students.is_empty() => attendance::marks_for(conn, date, subject_id)?,
        _ => Default::default(),
    };

    Ok(MarkPage {
        admin_name: ctx.admin_name().map(str::to_string),
        notice,
        date,
        course_id: form.course_id,
        subject_id: form.subject_id,
        courses: db::list_courses(conn)?,
        subjects: db::list_subjects(conn, form.course_id)?,
        students,
        marks,
    })
}

/// Aggregate reports over a date range (month to date by default)
async fn report_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<FilterQuery>,
) -> Result<Html<String>, AppError> {
    let filter = AttendanceFilter::from(&query).with_default_range(today());
    let conn = state.db.lock().await;

    let page = ReportPage {
        admin_name: ctx.admin_name().map(str::to_string),
        courses: db::list_courses(&conn)?,
        subjects: db::list_subjects(&conn, filter.course_id)?,
        students: db::list_active_students(&conn, filter.course_id)?,
        report: report::build_report(&conn, &filter)?,
        filter,
    };

    Ok(Html(pages::render_report(&page).into_string()))
}

/// Download the filtered rows as CSV
async fn export_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilterQuery>,
) -> Result<Response, AppError> {
    let filter = AttendanceFilter::from(&query);
    let records = {
        let conn = state.db.lock().await;
        attendance::all_attendance(&conn, &filter)?
    };
    let body = export::to_csv_bytes(&records)?;
    let disposition = format!("attachment; filename=\"attendance_{}.csv\"", today());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Return the overall totals for a filter as JSON
async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<OverallStats>, AppError> {
    let filter = AttendanceFilter::from(&query);
    let conn = state.db.lock().await;
    Ok(Json(report::overall_stats(&conn, &filter.build())?))
}
