//! SACCO Back-Office Backend
//!
//! REST backend for a savings and credit cooperative: membership onboarding,
//! share capital and contributions, loans, guarantors and dividends, persisted
//! in SQLite.

mod api;
mod auth;
mod config;
mod db;
mod engine;
mod errors;
mod models;
mod notify;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use notify::{LogMailer, Mailer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SACCO Back-Office Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (SACCO_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    match &config.bootstrap_admin_email {
        Some(email) => {
            repo.bootstrap_admin(email).await?;
        }
        None => tracing::debug!("No bootstrap administrator configured"),
    }

    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
        mailer: Arc::new(LogMailer),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Settings
        .route("/settings", get(api::get_settings).put(api::update_settings))
        .route("/revision", get(api::get_revision))
        // Invitations
        .route(
            "/invitations",
            get(api::list_invitations).post(api::create_invitation),
        )
        .route("/invitations/accept", post(api::accept_invitation))
        .route("/invitations/{id}/resend", post(api::resend_invitation))
        // Members
        .route("/members", get(api::list_members))
        .route("/members/me", get(api::get_me))
        .route("/members/{id}", get(api::get_member))
        .route("/members/{id}/dashboard", get(api::member_dashboard))
        .route(
            "/members/{id}/financial-summary",
            get(api::member_financial_summary),
        )
        .route("/members/{id}/profile", put(api::update_profile))
        .route("/members/{id}/verification", put(api::set_verification))
        .route("/members/{id}/hold", put(api::set_hold))
        .route("/members/{id}/active", put(api::set_active))
        .route(
            "/members/{id}/share-capital-term",
            put(api::set_share_capital_term),
        )
        .route(
            "/members/{id}/documents",
            get(api::list_documents).post(api::upload_document),
        )
        .route("/documents/{id}/verify", post(api::verify_document))
        // Share capital and contributions
        .route("/share-capital", post(api::record_share_capital))
        .route("/share-capital/bulk", post(api::bulk_record_share_capital))
        .route("/members/{id}/share-capital", get(api::list_share_capital))
        .route("/contributions", post(api::record_contribution))
        .route("/contributions/bulk", post(api::bulk_record_contributions))
        .route("/members/{id}/contributions", get(api::list_contributions))
        .route("/members/{id}/summary", get(api::get_share_summary))
        .route("/summaries", get(api::list_share_summaries))
        .route("/summaries/recalculate", post(api::recalculate_summaries))
        .route("/members/{id}/eligibility", get(api::loan_eligibility))
        // Loan applications
        .route(
            "/loan-applications",
            get(api::list_applications).post(api::apply_for_loan),
        )
        .route("/loan-applications/{id}", get(api::get_application))
        .route(
            "/loan-applications/{id}/cancel",
            post(api::cancel_application),
        )
        .route(
            "/loan-applications/{id}/approve",
            post(api::approve_application),
        )
        .route(
            "/loan-applications/{id}/reject",
            post(api::reject_application),
        )
        // Loans
        .route("/loans", get(api::list_loans))
        .route("/loans/{id}", get(api::get_loan))
        .route("/loans/{id}/disburse", post(api::disburse_loan))
        .route(
            "/loans/{id}/repayments",
            get(api::list_repayments).post(api::record_repayment),
        )
        .route("/loans/{id}/default", post(api::mark_defaulted))
        .route("/loans/{id}/schedule", get(api::get_schedule))
        .route("/loans/{id}/statement", get(api::loan_statement))
        // Guarantors
        .route(
            "/guarantor-requests",
            get(api::list_guarantor_requests).post(api::request_guarantee),
        )
        .route(
            "/guarantor-requests/{id}/respond",
            post(api::respond_to_guarantor_request),
        )
        .route(
            "/guarantor-requests/{id}/cancel",
            post(api::cancel_guarantor_request),
        )
        .route("/members/{id}/guarantor-limit", get(api::guarantor_limit))
        // Dividends
        .route(
            "/dividends",
            get(api::list_distributions).post(api::declare_dividend),
        )
        .route("/dividends/{id}", get(api::get_distribution))
        .route("/members/{id}/dividends", get(api::member_dividends))
        // Society books
        .route("/expenses", get(api::list_expenses).post(api::record_expense))
        .route("/income", get(api::list_income).post(api::record_income))
        // Audit and reports
        .route("/activity", get(api::list_activity))
        .route("/transactions", get(api::list_transactions))
        .route("/reports/financial-summary", get(api::financial_summary))
        .route(
            "/reports/missing-contributions",
            get(api::missing_contributions),
        )
        .route(
            "/reports/incomplete-share-capital",
            get(api::incomplete_share_capital),
        )
        .route("/reports/due-payments", get(api::due_payments))
        // Notifications
        .route("/notifications/mass-email", post(api::send_mass_email))
        .route(
            "/notifications/payment-reminders",
            post(api::send_payment_reminders),
        )
        .route(
            "/notifications/contribution-reminders",
            post(api::send_contribution_reminders),
        )
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
