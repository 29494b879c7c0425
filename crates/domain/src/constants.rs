//! Domain constants
//!
//! Session store keys, backend endpoint paths and configuration defaults.

// Session store slots
pub const ACCESS_TOKEN_KEY: &str = "novem.access_token";
pub const REFRESH_TOKEN_KEY: &str = "novem.refresh_token";
pub const IDENTITY_KEY: &str = "novem.identity";
pub const OFFLINE_QUEUE_KEY: &str = "novem.offline_queue";

/// The three slots that together make up a session.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY];

// Backend endpoints, relative to the API base URL
pub const LOGIN_PATH: &str = "/auth/login/";
pub const REFRESH_PATH: &str = "/auth/token/refresh/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const DELETE_ACCOUNT_PATH: &str = "/auth/account/delete/";
pub const HEALTH_PATH: &str = "/health/";

// Defaults
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 300;
pub const DEFAULT_PROACTIVE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_GRACE_PERIOD_DAYS: u32 = 7;
pub const DEFAULT_HEALTH_POLL_SECS: u64 = 300;
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "Novem";
