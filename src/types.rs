//! Wire and session types shared by the gateway, session manager and orchestrator

use crate::token;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Authentication tokens (access + refresh) as issued by `/auth/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds, as reported by the server
    #[serde(default)]
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl AuthTokens {
    /// Check if the access token is expired according to its own `exp` claim
    pub fn is_expired(&self) -> bool {
        token::is_expired(&self.access_token)
    }

    pub fn should_refresh(&self, now: SystemTime, window_minutes: i64) -> bool {
        token::should_refresh_within(&self.access_token, window_minutes, now)
    }
}

/// End-user profile returned by `/auth/profile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Display name (`first_name` + `last_name`)
    pub name: String,
    #[serde(default)]
    pub is_active: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified_at: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
    Moderator,
}

/// Administrator identity returned alongside the tokens by `/admin/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: AdminRole,
    #[serde(default)]
    pub is_active: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Payload of a successful admin login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminTokens {
    pub tokens: AuthTokens,
    pub admin: AdminProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Uniform response wrapper used by every API endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub status_code: u16,
}

impl<T> ApiEnvelope<T> {
    /// Successful envelope carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: String::new(),
            errors: Vec::new(),
            pagination: None,
            timestamp: String::new(),
            status_code: 200,
        }
    }

    /// Failed envelope with a server message
    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            errors: Vec::new(),
            pagination: None,
            timestamp: String::new(),
            status_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_tolerates_missing_optional_fields() {
        let json = r#"{"success": false, "message": "invalid credentials", "status_code": 401}"#;
        let envelope: ApiEnvelope<AuthTokens> = serde_json::from_str(json).unwrap();
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert!(envelope.errors.is_empty());
        assert_eq!(envelope.message, "invalid credentials");
    }

    #[test]
    fn test_admin_role_wire_names() {
        let role: AdminRole = serde_json::from_str("\"super_admin\"").unwrap();
        assert_eq!(role, AdminRole::SuperAdmin);
        assert_eq!(serde_json::to_string(&AdminRole::Moderator).unwrap(), "\"moderator\"");
    }

    #[test]
    fn test_tokens_default_type() {
        let tokens: AuthTokens =
            serde_json::from_str(r#"{"access_token": "a", "refresh_token": "r"}"#).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 0);
        // an opaque non-JWT access token counts as expired
        assert!(tokens.is_expired());
    }
}
