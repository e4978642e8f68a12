//! OAuth2 credential supply for the Gmail gateway
//!
//! The engine treats a [`Credential`] as opaque: a supplier hands one out,
//! refreshes it on request, and forgets it on sign-out. Refresh policy lives
//! entirely in the supplier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::ApplicationSecret;

use crate::error::{Result, SweepError};

/// Full mailbox access; required for permanent deletion
pub const FULL_ACCESS_SCOPE: &str = "https://mail.google.com/";

/// Read/write access except permanent deletion
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Headers-only read access
pub const METADATA_SCOPE: &str = "https://www.googleapis.com/auth/gmail.metadata";

/// Scopes requested at sign-in
pub const REQUIRED_SCOPES: &[&str] = &[FULL_ACCESS_SCOPE, MODIFY_SCOPE, METADATA_SCOPE];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

type InstalledAuthenticator =
    Authenticator<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Opaque, time-bounded access credential
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// A credential without an expiry never expires
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of credentials for the gateway
#[async_trait]
pub trait CredentialSupplier: Send + Sync {
    /// Credential from the last sign-in or refresh, if any
    fn current_credential(&self) -> Option<Credential>;

    /// Obtain a fresh credential for the signed-in user
    async fn refresh(&self) -> Result<Credential>;

    /// Interactive sign-in
    async fn sign_in(&self) -> Result<Credential>;

    /// Forget the signed-in user
    async fn sign_out(&self) -> Result<()>;
}

/// Supplier backed by the installed-app OAuth flow with an on-disk token cache
pub struct InstalledFlowSupplier {
    secret: ApplicationSecret,
    token_cache_path: PathBuf,
    authenticator: Mutex<Option<InstalledAuthenticator>>,
    current: RwLock<Option<Credential>>,
}

impl InstalledFlowSupplier {
    pub fn new(secret: ApplicationSecret, token_cache_path: impl Into<PathBuf>) -> Self {
        Self {
            secret,
            token_cache_path: token_cache_path.into(),
            authenticator: Mutex::new(None),
            current: RwLock::new(None),
        }
    }

    /// Build a supplier from a downloaded `credentials.json`
    pub async fn from_secret_file(
        credentials_path: &Path,
        token_cache_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let secret = yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| SweepError::AuthError(format!("Failed to read credentials: {}", e)))?;
        Ok(Self::new(secret, token_cache_path))
    }

    pub fn token_cache_path(&self) -> &Path {
        &self.token_cache_path
    }

    async fn build_authenticator(&self) -> Result<InstalledAuthenticator> {
        if let Some(parent) = self.token_cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // HTTPRedirect opens a browser for user authorization
        yup_oauth2::InstalledFlowAuthenticator::builder(
            self.secret.clone(),
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(self.token_cache_path.clone())
        .build()
        .await
        .map_err(|e| SweepError::AuthError(format!("Failed to build authenticator: {}", e)))
    }

    fn store(&self, credential: &Credential) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(credential.clone());
        }
    }
}

fn credential_from_token(token: yup_oauth2::AccessToken) -> Result<Credential> {
    let access_token = token
        .token()
        .ok_or_else(|| SweepError::AuthError("Token response carried no access token".to_string()))?
        .to_string();
    let expires_at = token
        .expiration_time()
        .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), 0));
    Ok(Credential::new(access_token, expires_at))
}

#[async_trait]
impl CredentialSupplier for InstalledFlowSupplier {
    fn current_credential(&self) -> Option<Credential> {
        self.current.read().ok().and_then(|c| c.clone())
    }

    async fn refresh(&self) -> Result<Credential> {
        let guard = self.authenticator.lock().await;
        let auth = guard
            .as_ref()
            .ok_or_else(|| SweepError::AuthError("Not signed in".to_string()))?;

        let token = auth
            .force_refreshed_token(REQUIRED_SCOPES)
            .await
            .map_err(|e| SweepError::AuthError(format!("Failed to refresh token: {}", e)))?;
        let credential = credential_from_token(token)?;

        self.store(&credential);
        debug!("Refreshed access token (expires {:?})", credential.expires_at());
        Ok(credential)
    }

    async fn sign_in(&self) -> Result<Credential> {
        let mut guard = self.authenticator.lock().await;
        if guard.is_none() {
            *guard = Some(self.build_authenticator().await?);
        }
        let auth = guard
            .as_ref()
            .ok_or_else(|| SweepError::AuthError("Authenticator unavailable".to_string()))?;

        // Pre-authenticate with all scopes so the cached token carries them
        let token = auth
            .token(REQUIRED_SCOPES)
            .await
            .map_err(|e| SweepError::AuthError(format!("Failed to obtain token: {}", e)))?;
        let credential = credential_from_token(token)?;

        if self.token_cache_path.exists() {
            secure_token_file(&self.token_cache_path).await?;
        }

        self.store(&credential);
        info!("Signed in; token cached at {:?}", self.token_cache_path);
        Ok(credential)
    }

    async fn sign_out(&self) -> Result<()> {
        self.authenticator.lock().await.take();
        if let Ok(mut current) = self.current.write() {
            *current = None;
        }

        if self.token_cache_path.exists() {
            tokio::fs::remove_file(&self.token_cache_path).await?;
            info!("Removed token cache {:?}", self.token_cache_path);
        }
        Ok(())
    }
}

/// Supplier holding a fixed, externally obtained credential
pub struct StaticCredentialSupplier {
    credential: RwLock<Option<Credential>>,
    initial: Credential,
}

impl StaticCredentialSupplier {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential.clone())),
            initial: credential,
        }
    }

    /// Read an access token from `INBOX_SWEEP_ACCESS_TOKEN`
    pub fn from_env() -> Result<Self> {
        let token = env::var("INBOX_SWEEP_ACCESS_TOKEN").map_err(|_| {
            SweepError::ConfigError("INBOX_SWEEP_ACCESS_TOKEN not set".to_string())
        })?;
        Ok(Self::new(Credential::new(token, None)))
    }
}

#[async_trait]
impl CredentialSupplier for StaticCredentialSupplier {
    fn current_credential(&self) -> Option<Credential> {
        self.credential.read().ok().and_then(|c| c.clone())
    }

    async fn refresh(&self) -> Result<Credential> {
        self.current_credential()
            .ok_or_else(|| SweepError::AuthError("Not signed in".to_string()))
    }

    async fn sign_in(&self) -> Result<Credential> {
        if let Ok(mut current) = self.credential.write() {
            *current = Some(self.initial.clone());
        }
        Ok(self.initial.clone())
    }

    async fn sign_out(&self) -> Result<()> {
        if let Ok(mut current) = self.credential.write() {
            *current = None;
        }
        Ok(())
    }
}

/// Load OAuth2 client secret from environment variables
///
/// # Environment Variables
/// - `INBOX_SWEEP_CLIENT_ID`: OAuth2 client ID
/// - `INBOX_SWEEP_CLIENT_SECRET`: OAuth2 client secret
/// - `INBOX_SWEEP_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_secret_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("INBOX_SWEEP_CLIENT_ID")
        .map_err(|_| SweepError::ConfigError("INBOX_SWEEP_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("INBOX_SWEEP_CLIENT_SECRET")
        .map_err(|_| SweepError::ConfigError("INBOX_SWEEP_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("INBOX_SWEEP_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token cache to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the profile directory ACLs
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    #[test]
    fn test_credential_expiry() {
        let fresh = Credential::new("tok", Some(Utc::now() + Duration::minutes(30)));
        assert!(!fresh.is_expired());

        let stale = Credential::new("tok", Some(Utc::now() - Duration::minutes(1)));
        assert!(stale.is_expired());

        assert!(!Credential::new("tok", None).is_expired());
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new("ya29.secret-value", None);
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret-value"));
        assert!(debug.contains("redacted"));
    }

    #[tokio::test]
    async fn test_static_supplier_lifecycle() {
        let supplier = StaticCredentialSupplier::new(Credential::new("tok", None));
        assert_eq!(
            supplier.current_credential().map(|c| c.access_token().to_string()),
            Some("tok".to_string())
        );

        supplier.sign_out().await.unwrap();
        assert!(supplier.current_credential().is_none());
        assert!(supplier.refresh().await.is_err());

        let credential = supplier.sign_in().await.unwrap();
        assert_eq!(credential.access_token(), "tok");
        assert!(supplier.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_installed_supplier_refresh_requires_sign_in() {
        let supplier = InstalledFlowSupplier::new(ApplicationSecret::default(), "/tmp/unused-token.json");
        assert!(supplier.current_credential().is_none());

        let err = supplier.refresh().await.unwrap_err();
        assert!(matches!(err, SweepError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_installed_supplier_sign_out_removes_cache() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();
        tokio::fs::write(&path, "{}").await.unwrap();

        let supplier = InstalledFlowSupplier::new(ApplicationSecret::default(), path.clone());
        supplier.sign_out().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_secure_token_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "test content")
            .await
            .unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    #[serial]
    fn test_load_secret_from_env() {
        env::set_var("INBOX_SWEEP_CLIENT_ID", "test-id");
        env::set_var("INBOX_SWEEP_CLIENT_SECRET", "test-secret");
        env::set_var("INBOX_SWEEP_REDIRECT_URI", "http://localhost:9999");

        let secret = load_secret_from_env().unwrap();
        assert_eq!(secret.client_id, "test-id");
        assert_eq!(secret.client_secret, "test-secret");
        assert_eq!(secret.redirect_uris[0], "http://localhost:9999");

        env::remove_var("INBOX_SWEEP_CLIENT_ID");
        env::remove_var("INBOX_SWEEP_CLIENT_SECRET");
        env::remove_var("INBOX_SWEEP_REDIRECT_URI");
    }

    #[test]
    #[serial]
    fn test_load_secret_from_env_missing_id() {
        env::remove_var("INBOX_SWEEP_CLIENT_ID");
        let result = load_secret_from_env();
        assert!(matches!(result, Err(SweepError::ConfigError(_))));
    }

    #[test]
    fn test_scopes_constants() {
        assert_eq!(REQUIRED_SCOPES.len(), 3);
        assert!(REQUIRED_SCOPES.contains(&"https://mail.google.com/"));
        assert!(REQUIRED_SCOPES.contains(&MODIFY_SCOPE));
    }
}
