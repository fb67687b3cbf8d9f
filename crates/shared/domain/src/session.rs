//! User session entity.
//!
//! A session is created active and ends either expired (time based) or
//! revoked (explicit). Both end states are terminal.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    MAX_IP_ADDRESS_LENGTH, MAX_REFRESH_TOKEN_LENGTH, SESSION_STATUS_ACTIVE, SESSION_STATUS_EXPIRED,
    SESSION_STATUS_REVOKED,
};
use crate::document::Document;
use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => SESSION_STATUS_ACTIVE,
            SessionStatus::Expired => SESSION_STATUS_EXPIRED,
            SessionStatus::Revoked => SESSION_STATUS_REVOKED,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }

    /// Only `active -> expired` and `active -> revoked` exist.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Active, SessionStatus::Expired)
                | (SessionStatus::Active, SessionStatus::Revoked)
        )
    }

    /// Check a transition, returning the target status when allowed.
    pub fn transition_to(&self, next: SessionStatus) -> DomainResult<SessionStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            SESSION_STATUS_ACTIVE => Ok(SessionStatus::Active),
            SESSION_STATUS_EXPIRED => Ok(SessionStatus::Expired),
            SESSION_STATUS_REVOKED => Ok(SessionStatus::Revoked),
            other => Err(DomainError::invalid_value("session status", other)),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session domain entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub status: SessionStatus,
    pub device_info: Document,
    pub location_info: Document,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSession {
    /// True iff the session is active and `now` is strictly before
    /// `expires_at`. Does not change the stored status.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Still marked active but past its deadline; a sweep will expire it.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && now >= self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.status == SessionStatus::Revoked
    }
}

/// Data needed to open a session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: Uuid,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Document,
    pub location_info: Document,
}

impl NewSession {
    pub fn new(user_id: Uuid, refresh_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            refresh_token: refresh_token.into(),
            expires_at,
            ip_address: None,
            user_agent: None,
            device_info: Document::new(),
            location_info: Document::new(),
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn with_device_info(mut self, device_info: Document) -> Self {
        self.device_info = device_info;
        self
    }

    pub fn with_location_info(mut self, location_info: Document) -> Self {
        self.location_info = location_info;
        self
    }

    /// A session must have a token that fits its column and a deadline
    /// after `now`.
    pub fn validate_at(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.refresh_token.trim().is_empty() {
            return Err(DomainError::validation("Refresh token is required"));
        }
        if self.refresh_token.chars().count() > MAX_REFRESH_TOKEN_LENGTH as usize {
            return Err(DomainError::validation(format!(
                "Refresh token must be at most {} characters",
                MAX_REFRESH_TOKEN_LENGTH
            )));
        }
        if self
            .ip_address
            .as_ref()
            .is_some_and(|ip| ip.chars().count() > MAX_IP_ADDRESS_LENGTH as usize)
        {
            return Err(DomainError::validation(format!(
                "IP address must be at most {} characters",
                MAX_IP_ADDRESS_LENGTH
            )));
        }
        if self.expires_at <= now {
            return Err(DomainError::validation("Session expiry must be in the future"));
        }
        Ok(())
    }
}
