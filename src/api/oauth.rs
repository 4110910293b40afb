//! OAuth 2.0 credential handling for the Google Sheets API.
//!
//! This module handles:
//! - Loading the access and refresh tokens from the token file
//! - Refreshing the access token when it has expired
//! - Falling back to an [`Authorizer`] when there is no usable token
//! - Saving tokens back to the token file, unless the filesystem is read-only

use crate::api::files::{SecretFile, TokenFile};
use crate::api::{GOOGLE_AUTH_URI, OAUTH_SCOPES};
use crate::{Config, Result};
use anyhow::{bail, Context};
use chrono::Utc;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// How long the consent flow waits for the browser to come back to the callback listener.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Produces a fresh token when there is no stored token that can be used or refreshed.
#[async_trait::async_trait]
pub(crate) trait Authorizer: Send + Sync {
    async fn authorize(&self) -> Result<TokenFile>;
}

/// Holds the current token and refreshes it when needed. Refreshed tokens are saved to the token
/// file when `persist` is true.
#[derive(Debug)]
pub(crate) struct TokenProvider {
    token: TokenFile,
    token_path: PathBuf,
    persist: bool,
    http: reqwest::Client,
}

impl TokenProvider {
    /// Returns a provider holding a valid token:
    /// - A stored token that is still valid is used as-is.
    /// - A stored token that has expired, and that has a refresh token, is refreshed.
    /// - Otherwise `authorizer` is asked for a new token.
    ///
    /// A token that was refreshed or newly authorized is saved unless the config says the
    /// filesystem is read-only.
    ///
    /// # Errors
    /// Returns an error if the token file cannot be read, if the refresh fails, or if the
    /// authorizer fails.
    pub async fn obtain(config: &Config, authorizer: &dyn Authorizer) -> Result<Self> {
        let token_path = config.token_path().to_path_buf();
        let http = http_client()?;
        let stored = TokenFile::load(&token_path).await?;

        let (token, changed) = match stored {
            Some(token) if token.is_valid() => {
                debug!("Using the stored token, valid until {}", token.expires_at());
                (token, false)
            }
            Some(mut token)
                if token.is_expired()
                    && token.has_required_scope()
                    && token.refresh_token().is_some() =>
            {
                info!("The stored token has expired, refreshing it");
                refresh(&http, &mut token).await?;
                (token, true)
            }
            Some(_) => {
                warn!("The stored token cannot be used or refreshed, authorization is required");
                (authorizer.authorize().await?, true)
            }
            None => {
                info!("No token found at {}", token_path.display());
                (authorizer.authorize().await?, true)
            }
        };

        let provider = Self {
            token,
            token_path,
            persist: config.persist_token(),
            http,
        };
        if changed {
            provider.save().await?;
        }
        Ok(provider)
    }

    /// Runs `authorizer` regardless of any stored token, then saves the new token.
    pub async fn authorize(config: &Config, authorizer: &dyn Authorizer) -> Result<Self> {
        let provider = Self {
            token: authorizer.authorize().await?,
            token_path: config.token_path().to_path_buf(),
            persist: config.persist_token(),
            http: http_client()?,
        };
        provider.save().await?;
        Ok(provider)
    }

    /// Loads the stored token without ever authorizing. Fails if there is no token file.
    pub async fn load(config: &Config) -> Result<Self> {
        let token_path = config.token_path().to_path_buf();
        let token = TokenFile::load(&token_path)
            .await?
            .with_context(|| format!("There is no token file at {}", token_path.display()))?;
        Ok(Self {
            token,
            token_path,
            persist: config.persist_token(),
            http: http_client()?,
        })
    }

    /// Returns the access token, refreshing it first if it has expired.
    pub async fn token_with_refresh(&mut self) -> Result<&str> {
        if self.token.is_expired() {
            self.refresh().await?;
        }
        Ok(self.token.access_token())
    }

    /// Unconditionally refreshes the access token and saves it.
    pub async fn refresh(&mut self) -> Result<()> {
        refresh(&self.http, &mut self.token).await?;
        self.save().await
    }

    /// Returns the current access token, which may have expired.
    #[cfg(test)]
    pub fn token(&self) -> &str {
        self.token.access_token()
    }

    async fn save(&self) -> Result<()> {
        if self.persist {
            self.token.save(&self.token_path).await
        } else {
            debug!("Read-only filesystem, not saving the token");
            Ok(())
        }
    }
}

/// Exchanges the refresh token for a new access token.
async fn refresh(http: &reqwest::Client, token: &mut TokenFile) -> Result<()> {
    let refresh_token = token
        .refresh_token()
        .context("The token has no refresh token")?
        .to_string();
    let client = oauth_client(
        token.client_id(),
        token.client_secret(),
        GOOGLE_AUTH_URI,
        token.token_uri(),
    )?;
    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token))
        .request_async(http)
        .await
        .context("Failed to refresh the OAuth token")?;

    let (access_token, expires_at, refresh_token, scopes) = token_parts(&response);
    token.update(access_token, expires_at, refresh_token, scopes);
    debug!("Token refreshed, valid until {}", token.expires_at());
    Ok(())
}

/// Pulls the values we store out of a token response.
fn token_parts(
    response: &BasicTokenResponse,
) -> (
    String,
    chrono::DateTime<Utc>,
    Option<String>,
    Option<Vec<String>>,
) {
    let lifetime = response
        .expires_in()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .unwrap_or_else(|| chrono::Duration::hours(1));
    (
        response.access_token().secret().to_string(),
        Utc::now() + lifetime,
        response.refresh_token().map(|t| t.secret().to_string()),
        response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect()),
    )
}

fn oauth_client(
    client_id: &str,
    client_secret: &str,
    auth_uri: &str,
    token_uri: &str,
) -> Result<OAuthClient> {
    Ok(BasicClient::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_auth_uri(AuthUrl::new(auth_uri.to_string()).context("Invalid OAuth auth URI")?)
        .set_token_uri(TokenUrl::new(token_uri.to_string()).context("Invalid OAuth token URI")?))
}

fn http_client() -> Result<reqwest::Client> {
    // Token endpoints answer directly; a redirect is treated as the response.
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Unable to create the HTTP client")
}

/// The interactive consent flow for installed applications.
///
/// This:
/// 1. Loads the OAuth client credentials file
/// 2. Starts a local HTTP listener on `localhost:<callback_port>`
/// 3. Logs the Google consent URL for the user to open in a browser
/// 4. Waits for the redirect carrying the authorization code
/// 5. Exchanges the code for access and refresh tokens
#[derive(Debug, Clone)]
pub(crate) struct ConsentFlow {
    client_secret_path: PathBuf,
    callback_port: u16,
}

impl ConsentFlow {
    pub fn new(config: &Config) -> Self {
        Self {
            client_secret_path: config.client_secret_path().to_path_buf(),
            callback_port: config.callback_port(),
        }
    }
}

#[async_trait::async_trait]
impl Authorizer for ConsentFlow {
    async fn authorize(&self) -> Result<TokenFile> {
        info!("Starting OAuth consent flow");
        let secret = SecretFile::load(&self.client_secret_path).await?;
        let listener = TcpListener::bind(("127.0.0.1", self.callback_port))
            .await
            .with_context(|| {
                format!(
                    "Unable to listen for the OAuth callback on port {}",
                    self.callback_port
                )
            })?;
        let redirect = format!("http://localhost:{}", self.callback_port);
        let client = oauth_client(
            secret.client_id(),
            secret.client_secret(),
            secret.auth_uri(),
            secret.token_uri(),
        )?
        .set_redirect_uri(RedirectUrl::new(redirect).context("Invalid redirect URI")?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        info!("Open this URL in your browser to authorize access to the ledger:\n\n{auth_url}\n");
        info!(
            "Waiting for the authorization callback on http://localhost:{}",
            self.callback_port
        );

        let callback = tokio::time::timeout(CONSENT_TIMEOUT, wait_for_callback(listener))
            .await
            .context("Timed out waiting for the OAuth callback")??;
        if let Some(error) = callback.error {
            bail!("Authorization was denied: {error}");
        }
        if callback.state.as_deref() != Some(csrf_token.secret().as_str()) {
            bail!("The OAuth callback state does not match, refusing the authorization code");
        }
        let code = callback
            .code
            .context("The OAuth callback did not include an authorization code")?;

        let http = http_client()?;
        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http)
            .await
            .context("Failed to exchange the authorization code for a token")?;

        let (access_token, expires_at, refresh_token, scopes) = token_parts(&response);
        if refresh_token.is_none() {
            warn!("Google did not return a refresh token, the token will stop working when it expires");
        }
        let scopes =
            scopes.unwrap_or_else(|| OAUTH_SCOPES.iter().map(|s| s.to_string()).collect());
        info!("Authorization successful!");
        Ok(TokenFile::new(
            scopes,
            access_token,
            refresh_token,
            expires_at,
            &secret,
        ))
    }
}

/// Used where nobody is around to open a browser: it always fails.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Headless;

#[async_trait::async_trait]
impl Authorizer for Headless {
    async fn authorize(&self) -> Result<TokenFile> {
        bail!(
            "There is no usable OAuth token and no terminal to authorize interactively. \
            Run 'ledger-exporter auth' where a browser is available and provide the resulting \
            token file through CRED_PATH."
        )
    }
}

/// The query parameters of the OAuth redirect.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl Callback {
    fn parse(query: &str) -> Self {
        let mut callback = Callback::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => callback.code = Some(value.into_owned()),
                "state" => callback.state = Some(value.into_owned()),
                "error" => callback.error = Some(value.into_owned()),
                _ => {}
            }
        }
        callback
    }

    fn is_complete(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// Serves the callback listener until a request arrives that carries a code or an error. Other
/// requests, such as a browser asking for `/favicon.ico`, get a 404.
async fn wait_for_callback(listener: TcpListener) -> Result<Callback> {
    let (tx, mut rx) = mpsc::channel::<Callback>(1);
    loop {
        tokio::select! {
            Some(callback) = rx.recv() => return Ok(callback),
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("Failed to accept the OAuth callback")?;
                trace!("OAuth callback connection from {peer}");
                let tx = tx.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let tx = tx.clone();
                        async move { Ok::<_, Infallible>(handle_callback(req, &tx).await) }
                    });
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Error serving the OAuth callback: {e}");
                    }
                });
            }
        }
    }
}

async fn handle_callback(req: Request<Incoming>, tx: &mpsc::Sender<Callback>) -> Response<Full<Bytes>> {
    let callback = Callback::parse(req.uri().query().unwrap_or_default());
    if !callback.is_complete() {
        return text_response(StatusCode::NOT_FOUND, "Not found");
    }
    let body = if callback.error.is_some() {
        "Authorization was denied. You can close this window."
    } else {
        "Authorization complete. You can close this window and return to the terminal."
    };
    let _ = tx.send(callback).await;
    text_response(StatusCode::OK, body)
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
