//! Wire and storage types for the session client.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;

fn default_token_type() -> String {
    "bearer".to_string()
}

fn default_true() -> bool {
    true
}

/// Access and refresh token pair issued by the login endpoint.
///
/// Both tokens are opaque to the client. `Debug` output never includes them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds, as reported by the server
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in: 0,
            token_type: default_token_type(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// The signed-in user as returned by the server.
///
/// `is_guest` is local-only: the server never sends it, and a guest profile
/// is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, rename = "isGuest")]
    pub is_guest: bool,
}

impl UserProfile {
    pub const GUEST_ID: i64 = 0;

    /// Ephemeral identity used when the user skips signing in.
    pub fn guest() -> Self {
        Self {
            id: Self::GUEST_ID,
            username: "Guest".to_string(),
            email: String::new(),
            full_name: None,
            role_id: None,
            is_active: true,
            created_at: None,
            updated_at: None,
            is_guest: true,
        }
    }

    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// Uniform response shape used by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// A missing field reads as `None` without requiring `T: Default`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_code: None,
        }
    }

    pub fn failure(message: impl Into<String>, error_code: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code,
        }
    }

    /// Payload of a successful envelope.
    ///
    /// `success: false`, or `success: true` without data, becomes
    /// [`AuthError::Rejected`] carrying the server message.
    pub fn into_data(self) -> Result<T, AuthError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) if self.message.is_empty() => Err(AuthError::rejected(
                "Response did not include data",
                self.error_code,
            )),
            _ => Err(AuthError::rejected(self.message, self.error_code)),
        }
    }
}

/// Body of the login call.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("device_name", &self.device_name)
            .finish()
    }
}

/// `data` of a successful login.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct LoginData {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    pub user: UserProfile,
}

impl LoginData {
    pub fn credentials(&self) -> CredentialPair {
        CredentialPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_in: self.expires_in,
            token_type: self.token_type.clone(),
        }
    }
}

impl fmt::Debug for LoginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginData")
            .field("credentials", &self.credentials())
            .field("user", &self.user)
            .finish()
    }
}

/// Body of the refresh and logout calls.
#[derive(Clone, Serialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl fmt::Debug for RefreshTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshTokenRequest { refresh_token: [REDACTED] }")
    }
}

/// `data` of a successful refresh. Servers that do not rotate refresh tokens
/// omit `refresh_token`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshData {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl fmt::Debug for RefreshData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshData")
            .field("access_token", &"[REDACTED]")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// One login session of the current user on some device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: i64,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub issued_at: String,
    pub last_used: String,
    pub expires_at: String,
    #[serde(default)]
    pub is_current_session: bool,
}

impl SessionInfo {
    pub fn issued_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.issued_at)
    }

    pub fn last_used_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.last_used)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expires_at)
    }
}

/// Accepts RFC 3339 and the naive ISO form (`2024-05-01T10:00:00`) many
/// backends emit, treating the latter as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Body of the session listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessions {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(default)]
    pub current_session_id: Option<i64>,
    #[serde(default)]
    pub sessions: Vec<SessionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ActiveSessions {
    pub fn current(&self) -> Option<&SessionInfo> {
        self.sessions.iter().find(|s| s.is_current_session)
    }

    pub fn others(&self) -> impl Iterator<Item = &SessionInfo> {
        self.sessions.iter().filter(|s| !s.is_current_session)
    }

    pub(crate) fn without(&self, session_id: i64) -> Self {
        let sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .filter(|s| s.id != session_id)
            .cloned()
            .collect();
        Self {
            total_sessions: sessions.len() as u32,
            sessions,
            ..self.clone()
        }
    }

    pub(crate) fn only_current(&self) -> Self {
        let sessions: Vec<SessionInfo> = self.current().cloned().into_iter().collect();
        Self {
            total_sessions: sessions.len() as u32,
            sessions,
            ..self.clone()
        }
    }
}

/// Body returned by the session revocation endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionActionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub revoked_sessions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}
