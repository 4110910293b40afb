//! Serialization and deserialization structures for Google OAuth credential files.
//! - `credentials.json`: OAuth 2.0 client credentials from Google Cloud Console
//! - `token.json`: the access and refresh tokens that we receive from Google OAuth

use crate::api::{ACCEPTED_SCOPES, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
use crate::{utils, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Debug;
use std::path::Path;
use tracing::debug;

/// One of these redirects needs to be present in the OAuth credential file, or else the loopback
/// consent flow will not work.
const REDIRECT: &str = "http://localhost";
const REDIRECT_IP: &str = "http://127.0.0.1";

/// Represents the structure of the `credentials.json` file downloaded from Google Cloud Console.
///
/// This file contains OAuth 2.0 Desktop Application credentials. The standard format from Google
/// has an "installed" wrapper around the actual credentials.
///
/// Example:
/// ```json
/// {
///   "installed": {
///     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
///     "client_secret": "YOUR_CLIENT_SECRET",
///     "redirect_uris": ["http://localhost"],
///     "auth_uri": "https://accounts.google.com/o/oauth2/auth",
///     "token_uri": "https://oauth2.googleapis.com/token"
///   }
/// }
/// ```
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct SecretFile {
    /// Wrapper containing the installed application credentials
    installed: InstalledCredentials,
}

impl SecretFile {
    /// Loads the OAuth client credentials from `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if none of its redirect URIs is a
    /// loopback address.
    pub(crate) async fn load(path: &Path) -> Result<SecretFile> {
        utils::deserialize(path).await.with_context(|| {
            format!(
                "Unable to read the OAuth client credentials file {}",
                path.display()
            )
        })
    }

    pub(crate) fn client_id(&self) -> &str {
        &self.installed.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.installed.client_secret
    }

    pub(crate) fn auth_uri(&self) -> &str {
        self.installed.auth_uri.as_deref().unwrap_or(GOOGLE_AUTH_URI)
    }

    pub(crate) fn token_uri(&self) -> &str {
        self.installed.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URI)
    }
}

/// The actual OAuth credentials nested within the `credentials.json` file.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    /// For this application, should contain "http://localhost" (without a port number)
    redirect_uris: RedirectUris,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Default, Debug, Clone)]
struct RedirectUris(Vec<String>);

impl Serialize for RedirectUris {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RedirectUris {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<String>::deserialize(deserializer)?;
        if !vec.iter().any(|s| is_valid_redirect(s)) {
            return Err(D::Error::custom(format!(
                "At least one of the redirects needs to be {REDIRECT}, but this was not found. \
                When creating the redirect URI for your Google API Key, you must include \
                '{REDIRECT}'"
            )));
        }
        Ok(RedirectUris(vec))
    }
}

fn is_valid_redirect(s: &str) -> bool {
    let s = s.trim_end_matches('/');
    s == REDIRECT || s == REDIRECT_IP
}

/// This is how we save the token information that we receive from Google OAuth. Along with the
/// tokens it keeps the client ID, client secret and token endpoint, so a token file on its own is
/// enough to refresh the access token.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct TokenFile {
    scopes: Vec<String>,
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    client_id: String,
    client_secret: String,
    token_uri: String,
}

impl TokenFile {
    pub(crate) fn new(
        scopes: Vec<String>,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        client: &SecretFile,
    ) -> Self {
        Self {
            scopes,
            access_token,
            refresh_token,
            expires_at,
            client_id: client.client_id().to_string(),
            client_secret: client.client_secret().to_string(),
            token_uri: client.token_uri().to_string(),
        }
    }

    /// Loads a token file, returning `None` when there is no file at `path`.
    pub(crate) async fn load(path: &Path) -> Result<Option<Self>> {
        if !tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("Unable to check for a token file at {}", path.display()))?
        {
            return Ok(None);
        }
        let token: Self = utils::deserialize(path)
            .await
            .context("Unable to deserialize the token JSON file")?;
        Ok(Some(token))
    }

    /// Writes the token to `path` with permissions that only allow the owner to read it.
    pub(crate) async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize token")?;
        utils::make_parent_dir(path).await?;
        utils::write(path, json).await?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, Permissions::from_mode(0o600))
                .await
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }

        debug!("Token saved to {}", path.display());
        Ok(())
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(crate) fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|s| !s.is_empty())
    }

    pub(crate) fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub(crate) fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Check if the token is expired or will expire soon (within 5 minutes)
    pub(crate) fn is_expired(&self) -> bool {
        let now = Utc::now();
        let buffer = chrono::Duration::minutes(5);
        self.expires_at <= now + buffer
    }

    /// True if the token grants read access to spreadsheets.
    pub(crate) fn has_required_scope(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| ACCEPTED_SCOPES.contains(&s.as_str()))
    }

    /// A token is valid when it can be used as-is.
    pub(crate) fn is_valid(&self) -> bool {
        !self.is_expired() && self.has_required_scope() && !self.access_token.is_empty()
    }

    /// Update the token with the values of a refresh response.
    pub(crate) fn update(
        &mut self,
        access_token: String,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
        scopes: Option<Vec<String>>,
    ) {
        self.access_token = access_token;
        self.expires_at = expires_at;
        if let Some(rt) = refresh_token {
            self.refresh_token = Some(rt);
        }
        if let Some(scopes) = scopes {
            self.scopes = scopes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OAUTH_SCOPES;
    use tempfile::TempDir;

    const SECRET: &str = r#"
{
    "installed": {
        "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
        "client_secret": "YOUR_CLIENT_SECRET",
        "redirect_uris": ["http://localhost", "https://example.com:4040/whatever"],
        "auth_uri": "https://accounts.google.com/o/oauth2/auth",
        "token_uri": "https://oauth2.googleapis.com/token"
    }
}
"#;

    async fn secret_file(dir: &TempDir, json: &str) -> Result<SecretFile> {
        let p = dir.path().join("credentials.json");
        utils::write(&p, json).await.unwrap();
        SecretFile::load(&p).await
    }

    fn token(expires_at: DateTime<Utc>, scopes: &[&str]) -> TokenFile {
        TokenFile {
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            access_token: "abc12".to_string(),
            refresh_token: Some("xyz89".to_string()),
            expires_at,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
        }
    }

    #[tokio::test]
    async fn test_client_secret_good_redirect() {
        let dir = TempDir::new().unwrap();
        let secret = secret_file(&dir, SECRET).await.unwrap();
        assert_eq!(secret.client_id(), "YOUR_CLIENT_ID.apps.googleusercontent.com");
        assert_eq!(secret.token_uri(), "https://oauth2.googleapis.com/token");
    }

    #[tokio::test]
    async fn test_client_secret_loopback_ip_redirect() {
        let dir = TempDir::new().unwrap();
        let json = SECRET.replace("http://localhost", "http://127.0.0.1");
        assert!(secret_file(&dir, &json).await.is_ok());
    }

    #[tokio::test]
    async fn test_client_secret_bad_redirect() {
        let dir = TempDir::new().unwrap();
        let json = SECRET.replace("http://localhost", "http://localhost:9900");
        let err = secret_file(&dir, &json).await.unwrap_err();
        assert!(format!("{err:?}")
            .contains("At least one of the redirects needs to be http://localhost"));
    }

    #[tokio::test]
    async fn test_client_secret_default_uris() {
        let dir = TempDir::new().unwrap();
        let json = r#"{"installed": {"client_id": "a", "client_secret": "b", "redirect_uris": ["http://localhost"]}}"#;
        let secret = secret_file(&dir, json).await.unwrap();
        assert_eq!(secret.auth_uri(), GOOGLE_AUTH_URI);
        assert_eq!(secret.token_uri(), GOOGLE_TOKEN_URI);
    }

    #[tokio::test]
    async fn test_token_file_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("token.json");
        assert!(TokenFile::load(&path).await.unwrap().is_none());

        let original = token(Utc::now(), OAUTH_SCOPES);
        original.save(&path).await.unwrap();
        let loaded = TokenFile::load(&path).await.unwrap().unwrap();
        assert_eq!(original, loaded);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_token_file_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        utils::write(&path, "not json").await.unwrap();
        assert!(TokenFile::load(&path).await.is_err());
    }

    #[test]
    fn test_token_validity() {
        let later = Utc::now() + chrono::Duration::hours(1);
        assert!(token(later, OAUTH_SCOPES).is_valid());
        assert!(token(later, &["https://www.googleapis.com/auth/spreadsheets"]).is_valid());

        let soon = Utc::now() + chrono::Duration::minutes(2);
        assert!(token(soon, OAUTH_SCOPES).is_expired());
        assert!(!token(soon, OAUTH_SCOPES).is_valid());

        let drive_only = token(later, &["https://www.googleapis.com/auth/drive.readonly"]);
        assert!(!drive_only.has_required_scope());
        assert!(!drive_only.is_valid());
    }

    #[test]
    fn test_token_update_keeps_refresh_token() {
        let mut t = token(Utc::now(), OAUTH_SCOPES);
        let later = Utc::now() + chrono::Duration::hours(1);
        t.update("new".to_string(), later, None, None);
        assert_eq!(t.access_token(), "new");
        assert_eq!(t.refresh_token(), Some("xyz89"));
        assert_eq!(t.expires_at(), later);
    }
}
