//! Personal access token fixture.
//!
//! Renders a script for `gitlab-rails runner` that gives the admin user a
//! token with a known secret, so the functional test suite can authenticate
//! without scraping the web UI. The script is idempotent enough for CI:
//! `first_or_create` reuses the user's first token on re-runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    TOKEN_EXPIRES_IN_DAYS, TOKEN_NAME, TOKEN_SCOPES, TOKEN_USERNAME, TOKEN_VALUE,
};

/// Errors while validating a token fixture.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("token {0} must not be empty")]
    Empty(&'static str),

    #[error("at least one token scope is required")]
    NoScopes,

    #[error("invalid token scope '{0}': scopes are lowercase identifiers like 'api' or 'read_repository'")]
    InvalidScope(String),

    #[error("token {0} must not contain quotes or backslashes")]
    UnsafeValue(&'static str),
}

/// A personal access token to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenFixture {
    pub username: String,
    pub name: String,
    pub scopes: Vec<String>,
    /// The secret the token is forced to.
    pub token: String,
    /// `None` creates a token without an expiry date.
    pub expires_in_days: Option<u32>,
}

impl Default for TokenFixture {
    fn default() -> Self {
        Self {
            username: TOKEN_USERNAME.to_string(),
            name: TOKEN_NAME.to_string(),
            scopes: TOKEN_SCOPES.iter().map(|s| s.to_string()).collect(),
            token: TOKEN_VALUE.to_string(),
            expires_in_days: Some(TOKEN_EXPIRES_IN_DAYS),
        }
    }
}

impl TokenFixture {
    pub fn validate(&self) -> Result<(), TokenError> {
        for (field, value) in [
            ("username", &self.username),
            ("name", &self.name),
            ("value", &self.token),
        ] {
            if value.trim().is_empty() {
                return Err(TokenError::Empty(field));
            }
            // Values are embedded in single-quoted Ruby literals.
            if value.contains(['\'', '\\']) {
                return Err(TokenError::UnsafeValue(field));
            }
        }

        if self.scopes.is_empty() {
            return Err(TokenError::NoScopes);
        }
        if let Some(bad) = self.scopes.iter().find(|s| !is_scope_name(s)) {
            return Err(TokenError::InvalidScope(bad.clone()));
        }
        Ok(())
    }

    /// Render the runner script. It prints the token on success.
    pub fn render(&self) -> Result<String, TokenError> {
        self.validate()?;

        let scopes = self
            .scopes
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut attrs = format!("scopes: [{scopes}], name: '{}'", self.name);
        if let Some(days) = self.expires_in_days {
            attrs.push_str(&format!(", expires_at: {days}.days.from_now"));
        }

        Ok(format!(
            "# Generated by {app} {version}. Run with `gitlab-rails runner <file>`.\n\
             \n\
             user = User.find_by_username!('{username}')\n\
             \n\
             token = user.personal_access_tokens.first_or_create({attrs})\n\
             token.set_token('{token}')\n\
             token.save!\n\
             \n\
             puts token.token\n",
            app = crate::constants::APP_NAME,
            version = crate::constants::VERSION,
            username = self.username,
            token = self.token,
        ))
    }
}

fn is_scope_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_lowercase() || c == '_')
        && !s.starts_with('_')
}
