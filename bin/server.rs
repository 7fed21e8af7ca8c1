// Membership Ledger - Web Server
// REST API with Axum; ledger calls are blocking SQLite work, so every
// handler hands them to tokio's blocking pool.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use membership_ledger::{
    AttendanceEntry, Club, Config, FeeSchedule, LedgerError, Member, PaymentEntry, Transport,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared application state
#[derive(Clone)]
struct AppState {
    club: Club,
    fees: FeeSchedule,
}

// ============================================================================
// Errors
// ============================================================================

enum ApiError {
    Ledger(LedgerError),
    /// The blocking task panicked or was cancelled
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ledger(err) => {
                let status = match &err {
                    LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                    LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                    LedgerError::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
                    LedgerError::NothingDue(_) | LedgerError::Conflict(_) => StatusCode::CONFLICT,
                    LedgerError::Storage(_) if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                    LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }
                (
                    status,
                    ErrorBody {
                        error: err.to_string(),
                        retryable: err.is_retryable(),
                    },
                )
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "Internal error".to_string(),
                        retryable: false,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Run blocking ledger work off the async runtime
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::Ledger),
        Err(join_err) => Err(ApiError::Internal(join_err.to_string())),
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Deserialize)]
struct RegisterForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    transport: String,
}

#[derive(Deserialize)]
struct CodeForm {
    #[serde(default)]
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    member_code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceResponse {
    message: &'static str,
    visit_number: u32,
    need_payment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_amount: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentResponse {
    message: &'static str,
    amount_paid: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeeResponse {
    transport: Transport,
    fee: i64,
    cycle_amount: i64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "OK" }))
}

/// GET /api/fees - Fee schedule
async fn get_fees(State(state): State<AppState>) -> Json<Vec<FeeResponse>> {
    let fees = state
        .fees
        .iter()
        .map(|(transport, fee)| FeeResponse {
            transport,
            fee,
            cycle_amount: fee * i64::from(membership_ledger::VISITS_PER_CYCLE),
        })
        .collect();
    Json(fees)
}

/// POST /api/register - Register a member
async fn register_member(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let registry = state.club.registry.clone();
    let member = blocking(move || registry.create_member(&form.name, &form.transport)).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            member_code: member.code,
        }),
    ))
}

/// GET /api/members/:code - Member lookup
async fn get_member(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Member>, ApiError> {
    let registry = state.club.registry.clone();
    let member = blocking(move || registry.get_member_by_code(&code)).await?;
    Ok(Json(member))
}

/// POST /api/attendance - Record a visit
async fn record_attendance(
    State(state): State<AppState>,
    Form(form): Form<CodeForm>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let ledger = state.club.attendance.clone();
    let visit = blocking(move || ledger.record_visit(&form.code)).await?;

    Ok(Json(AttendanceResponse {
        message: "Attendance Recorded",
        visit_number: visit.visit_number,
        need_payment: visit.payment_triggered,
        payment_amount: visit.payment_amount,
    }))
}

/// GET /api/attendance-list - All visit cursors
async fn get_attendance_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<AttendanceEntry>>, ApiError> {
    let ledger = state.club.attendance.clone();
    Ok(Json(blocking(move || ledger.list_all()).await?))
}

/// GET /api/payment-list - All fee obligations
async fn get_payment_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentEntry>>, ApiError> {
    let ledger = state.club.payments.clone();
    Ok(Json(blocking(move || ledger.list_all()).await?))
}

/// POST /api/pay - Settle the outstanding fee
async fn pay_fee(
    State(state): State<AppState>,
    Form(form): Form<CodeForm>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let ledger = state.club.payments.clone();
    let settlement = blocking(move || ledger.settle(&form.code)).await?;

    Ok(Json(PaymentResponse {
        message: "Payment processed successfully",
        amount_paid: settlement.amount_paid,
    }))
}

// ============================================================================
// Router
// ============================================================================

fn build_app(state: AppState, static_dir: &FsPath) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/fees", get(get_fees))
        .route("/register", post(register_member))
        .route("/members/:code", get(get_member))
        .route("/attendance", post(record_attendance))
        .route("/attendance-list", get(get_attendance_list))
        .route("/payment-list", get(get_payment_list))
        .route("/pay", post(pay_fee))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,membership_ledger=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Membership Ledger server");

    let config = Config::from_env().context("Failed to load configuration")?;
    let store = config.open_store()?;
    tracing::info!(path = %store.path().display(), "Database opened");

    let state = AppState {
        club: Club::new(store, config.fees.clone()),
        fees: config.fees.clone(),
    };
    let app = build_app(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
