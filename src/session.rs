use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Persisted key holding the auth token
pub const TOKEN_KEY: &str = "nexcard_token";
/// Persisted key holding the active company identifier
pub const EMPRESA_KEY: &str = "nexcard_empresa_id";
/// Persisted key holding the company display alias
pub const ALIAS_KEY: &str = "nexcard_empresa_alias";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No session token, please log in.")]
    MissingToken,

    #[error("empresa_id required.")]
    MissingCompany,

    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is corrupt: {0}")]
    Format(#[from] serde_json::Error),
}

/// Values remembered between runs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empresa_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empresa_alias: Option<String>,
}

impl StoredSession {
    /// Remember the company of a resolved session
    pub fn remember(&mut self, session: &ActiveSession) {
        self.empresa_id = Some(session.company.clone());
        if session.alias.is_some() {
            self.empresa_alias = session.alias.clone();
        }
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }
}

/// Token and company the dashboard is operating on
///
/// Both are remembered between runs: in a small JSON file for the terminal
/// client and in cookies for the web front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveSession {
    pub token: String,
    pub company: String,
    pub alias: Option<String>,
}

impl ActiveSession {
    /// Alias if one was given, otherwise the company identifier
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.company)
    }
}

/// Company identifiers are trimmed and lowercased; blank means none
pub fn normalize_company(raw: &str) -> Option<String> {
    let company = raw.trim().to_lowercase();
    (!company.is_empty()).then_some(company)
}

/// Pick the token, company and alias for this run
///
/// An explicitly requested company wins over the remembered one. Without a
/// token the user has to log in; without a company they have to pick one.
///
/// # Arguments
/// * `requested_company` - Company from the command line or query string
/// * `requested_alias` - Display name to go with it
/// * `stored` - What was remembered from the last run
///
/// # Returns
/// * `Ok(ActiveSession)` - Ready to load
/// * `Err(SessionError::MissingToken)` or `Err(SessionError::MissingCompany)`
pub fn resolve(
    requested_company: Option<&str>,
    requested_alias: Option<&str>,
    stored: &StoredSession,
) -> Result<ActiveSession, SessionError> {
    let token = stored
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(SessionError::MissingToken)?;

    let company = requested_company
        .and_then(normalize_company)
        .or_else(|| stored.empresa_id.as_deref().and_then(normalize_company))
        .ok_or(SessionError::MissingCompany)?;

    let alias = requested_alias
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .or_else(|| stored.empresa_alias.clone().filter(|a| !a.trim().is_empty()));

    Ok(ActiveSession {
        token: token.to_string(),
        company,
        alias,
    })
}

/// Backend refusals mentioning the token mean the session is no longer valid
pub fn is_token_message(message: &str) -> bool {
    message.to_lowercase().contains("token")
}

/// Link that opens the dashboard directly on `company`
///
/// # Examples
/// ```
/// use nexcard_panel::session::share_link;
///
/// assert_eq!(
///     share_link("http://localhost:3000/", "trampa clean"),
///     "http://localhost:3000/dashboard?empresa_id=trampa%20clean"
/// );
/// ```
pub fn share_link(public_url: &str, company: &str) -> String {
    format!(
        "{}/dashboard?empresa_id={}",
        public_url.trim_end_matches('/'),
        urlencoding::encode(company)
    )
}

/// JSON file holding a [`StoredSession`]
#[derive(Clone, Debug)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session; a missing file is an empty session
    pub fn load(&self) -> Result<StoredSession, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No session file at {}", self.path.display());
                Ok(StoredSession::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, json)?;
        info!("Session saved to {}", self.path.display());
        Ok(())
    }

    /// Forget the token but keep the company
    pub fn clear_token(&self) -> Result<(), SessionError> {
        let mut session = self.load()?;
        session.clear_token();
        self.save(&session)
    }
}
