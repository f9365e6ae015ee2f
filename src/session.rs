use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, Backend};
use crate::config::Settings;

pub const USER_KEY: &str = "user";
pub const COMPANY_KEY: &str = "company";
pub const COOKIE_KEY: &str = "cookie";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login required, run `jobquest-admin login` first")]
    LoginRequired,

    #[error("{0}")]
    Rejected(String),

    #[error("session storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Local key-value storage for the session markers and the cookie.
pub struct SessionStore {
    conn: Connection,
    path: PathBuf,
}

impl SessionStore {
    pub fn open(settings: &Settings) -> Result<Self> {
        let dir = settings.data_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join("session.db");
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let store = Self { conn, path };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, AuthError> {
        let value = self
            .conn
            .query_row("SELECT value FROM storage WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.conn.execute(
            "INSERT INTO storage (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<(), AuthError> {
        self.conn
            .execute("DELETE FROM storage WHERE key = ?1", [key])?;
        Ok(())
    }

    pub fn clear_session(&self) -> Result<(), AuthError> {
        for key in [USER_KEY, COMPANY_KEY, COOKIE_KEY] {
            self.remove_item(key)?;
        }
        Ok(())
    }

    /// A stored JSON marker; unparseable or `null` values count as absent.
    fn marker(&self, key: &str) -> Result<Option<Value>, AuthError> {
        Ok(self
            .get_item(key)?
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .filter(|v| !v.is_null()))
    }

    pub fn remember_cookie(&self, cookie: Option<&str>) -> Result<(), AuthError> {
        match cookie.filter(|c| !c.is_empty()) {
            Some(cookie) => self.set_item(COOKIE_KEY, cookie),
            None => self.remove_item(COOKIE_KEY),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    User(Value),
    Company(Value),
}

impl Identity {
    pub fn display_name(&self) -> String {
        let (record, keys): (&Value, &[&str]) = match self {
            Identity::User(v) => (v, &["name", "email"]),
            Identity::Company(v) => (v, &["nameCompany", "name", "email"]),
        };
        keys.iter()
            .find_map(|k| record.get(*k).and_then(Value::as_str))
            .unwrap_or("(unknown)")
            .to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Identity::User(_) => "user",
            Identity::Company(_) => "company",
        }
    }
}

pub struct AuthGuard<'a> {
    store: &'a SessionStore,
}

impl<'a> AuthGuard<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        Self { store }
    }

    /// Passes when either identity marker is present. No expiry checks; the
    /// backend rejects stale sessions on its own.
    pub fn check(&self) -> Result<Identity, AuthError> {
        if let Some(user) = self.store.marker(USER_KEY)? {
            return Ok(Identity::User(user));
        }
        if let Some(company) = self.store.marker(COMPANY_KEY)? {
            return Ok(Identity::Company(company));
        }
        Err(AuthError::LoginRequired)
    }
}

pub fn login_error_message(err: &ApiError) -> String {
    match err.status() {
        Some(409) => "Incorrect email or password".to_string(),
        Some(401) => "Invalid login credentials".to_string(),
        Some(404) => "Account does not exist".to_string(),
        Some(500) => "Server error, please try again later".to_string(),
        _ => {
            if let Some(message) = err.backend_message() {
                return message;
            }
            if let ApiError::Status { body, .. } = err {
                if let Some(fatal) = body.get("fatal").and_then(Value::as_str) {
                    return fatal.to_string();
                }
            }
            err.to_string()
        }
    }
}

/// Signs in and stores the returned account under the `user` marker.
pub fn login(
    backend: &dyn Backend,
    store: &SessionStore,
    email: &str,
    password: &str,
) -> Result<Value, AuthError> {
    let body = json!({ "email": email, "password": password });
    let account = backend
        .post("/auth/login", &body)
        .map_err(|e| AuthError::Rejected(login_error_message(&e)))?;
    store.set_item(USER_KEY, &account.to_string())?;
    info!(email, "logged in");
    Ok(account)
}

/// Local markers are cleared even when the backend call fails.
pub fn logout(backend: &dyn Backend, store: &SessionStore) -> Result<(), AuthError> {
    let result = backend.post("/auth/logout", &json!({}));
    store.clear_session()?;
    if let Err(e) = result {
        warn!(error = %e, "logout request failed");
        return Err(AuthError::Rejected(e.user_message("Logout failed")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;

    #[test]
    fn test_guard_requires_a_marker() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(matches!(
            AuthGuard::new(&store).check(),
            Err(AuthError::LoginRequired)
        ));

        store.set_item(USER_KEY, "null").unwrap();
        assert!(matches!(
            AuthGuard::new(&store).check(),
            Err(AuthError::LoginRequired)
        ));

        store.set_item(COMPANY_KEY, r#"{"nameCompany":"Anvil Co"}"#).unwrap();
        let identity = AuthGuard::new(&store).check().unwrap();
        assert_eq!(identity.kind(), "company");
        assert_eq!(identity.display_name(), "Anvil Co");
    }

    #[test]
    fn test_set_item_overwrites() {
        let store = SessionStore::open_in_memory().unwrap();
        store.set_item("k", "1").unwrap();
        store.set_item("k", "2").unwrap();
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("2"));
        store.remove_item("k").unwrap();
        assert_eq!(store.get_item("k").unwrap(), None);
    }

    #[test]
    fn test_login_stores_user() {
        let store = SessionStore::open_in_memory().unwrap();
        let backend = FakeBackend::new();
        backend.on("POST", "/auth/login", Ok(json!({"id": 1, "name": "Admin", "privilege": "admin"})));

        login(&backend, &store, "admin@sdu.vn", "Secret1!").unwrap();
        let identity = AuthGuard::new(&store).check().unwrap();
        assert_eq!(identity.kind(), "user");
        assert_eq!(identity.display_name(), "Admin");
        assert_eq!(
            backend.calls_to("POST")[0].body,
            json!({"email": "admin@sdu.vn", "password": "Secret1!"})
        );
    }

    #[test]
    fn test_login_maps_status_codes() {
        let store = SessionStore::open_in_memory().unwrap();
        let backend = FakeBackend::new();
        backend.fail("POST", "/auth/login", 409, json!("wrong"));

        let err = login(&backend, &store, "a@b.vn", "x").unwrap_err();
        assert_eq!(err.to_string(), "Incorrect email or password");
        assert_eq!(store.get_item(USER_KEY).unwrap(), None);

        let err = ApiError::Status { status: 400, body: json!({"fatal": "locked"}) };
        assert_eq!(login_error_message(&err), "locked");
        let err = ApiError::Status { status: 404, body: Value::Null };
        assert_eq!(login_error_message(&err), "Account does not exist");
    }

    #[test]
    fn test_logout_clears_even_on_failure() {
        let store = SessionStore::open_in_memory().unwrap();
        store.set_item(USER_KEY, r#"{"name":"Admin"}"#).unwrap();
        store.remember_cookie(Some("accessToken=abc")).unwrap();
        let backend = FakeBackend::new();
        backend.fail("POST", "/auth/logout", 500, Value::Null);

        assert!(logout(&backend, &store).is_err());
        assert_eq!(store.get_item(USER_KEY).unwrap(), None);
        assert_eq!(store.get_item(COOKIE_KEY).unwrap(), None);
        assert!(AuthGuard::new(&store).check().is_err());
    }
}
