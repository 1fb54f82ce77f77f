//! Configuration module for the SACCO backend.
//!
//! Process configuration is loaded from environment variables with sensible defaults.
//! Business parameters (share value, rates, multipliers) are not configured here: they
//! live in the settings row of the database and are passed explicitly to the engine.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Upper bound for `SACCO_INVITATION_TTL_HOURS` (30 days).
pub const MAX_INVITATION_TTL_HOURS: i64 = 720;
/// Upper bound for `SACCO_REMINDER_WINDOW_DAYS`.
pub const MAX_REMINDER_WINDOW_DAYS: i64 = 365;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Email of the administrator created on first start when no admin exists
    pub bootstrap_admin_email: Option<String>,
    /// Reject a second contribution for the same member/year/month
    pub unique_monthly_contributions: bool,
    /// Lifetime of an invitation OTP
    pub invitation_ttl_hours: i64,
    /// How far ahead an installment counts as "upcoming"
    pub reminder_window_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("SACCO_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("SACCO_DB_PATH")
            .unwrap_or_else(|_| "./data/sacco.sqlite".to_string())
            .into();

        let bind_addr = env::var("SACCO_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| format!("Invalid SACCO_BIND_ADDR format: {}", e))?;

        let log_level = env::var("SACCO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let bootstrap_admin_email = env::var("SACCO_BOOTSTRAP_ADMIN_EMAIL")
            .ok()
            .filter(|e| !e.trim().is_empty());

        let unique_monthly_contributions = match env::var("SACCO_UNIQUE_MONTHLY_CONTRIBUTIONS") {
            Ok(v) => parse_bool(&v)
                .ok_or_else(|| format!("Invalid SACCO_UNIQUE_MONTHLY_CONTRIBUTIONS: {}", v))?,
            Err(_) => true,
        };

        let invitation_ttl_hours = parse_bounded(
            "SACCO_INVITATION_TTL_HOURS",
            env::var("SACCO_INVITATION_TTL_HOURS").ok(),
            48,
            MAX_INVITATION_TTL_HOURS,
        )?;
        let reminder_window_days = parse_bounded(
            "SACCO_REMINDER_WINDOW_DAYS",
            env::var("SACCO_REMINDER_WINDOW_DAYS").ok(),
            7,
            MAX_REMINDER_WINDOW_DAYS,
        )?;

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            bootstrap_admin_email,
            unique_monthly_contributions,
            invitation_ttl_hours,
            reminder_window_days,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_psk: None,
            db_path: PathBuf::from("./data/sacco.sqlite"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            bootstrap_admin_email: None,
            unique_monthly_contributions: true,
            invitation_ttl_hours: 48,
            reminder_window_days: 7,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an optional integer that must lie in `1..=max`.
fn parse_bounded(var: &str, value: Option<String>, default: i64, max: i64) -> Result<i64, String> {
    match value {
        Some(v) => match v.trim().parse::<i64>() {
            Ok(n) if (1..=max).contains(&n) => Ok(n),
            _ => Err(format!("Invalid {}: {} (expected 1 to {})", var, v, max)),
        },
        None => Ok(default),
    }
}
