// toolhub-github/src/client.rs
// ============================================================================
// Module: GitHub App Client
// Description: Installation-token auth, typed errors, and capped retries.
// Purpose: Implement the ForgeClient contract against the GitHub REST API.
// Dependencies: toolhub-core, jsonwebtoken, reqwest, chrono
// ============================================================================

//! ## Overview
//! Authentication follows the GitHub App flow: a ten-minute RS256 JWT signed
//! with the app private key is exchanged for an installation token, cached
//! in memory under a mutex and refreshed at least sixty seconds before
//! expiry. Issue creation retries transient failures (HTTP 5xx and 429) with
//! capped exponential backoff and honors `Retry-After` when it exceeds the
//! computed delay. Tokens and private keys are never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use reqwest::Method;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use toolhub_core::CreateIssueInput;
use toolhub_core::CreatePullRequestInput;
use toolhub_core::ForgeClient;
use toolhub_core::ForgeError;
use toolhub_core::Issue;
use toolhub_core::PrComment;
use toolhub_core::PullRequest;
use toolhub_core::PullRequestFile;
use toolhub_core::RepoName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.github.com";
/// App JWT lifetime.
const JWT_LIFETIME: Duration = Duration::from_secs(600);
/// App JWT issued-at backdate for clock skew.
const JWT_BACKDATE: Duration = Duration::from_secs(60);
/// Installation token refresh safety margin.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Retry attempts for issue creation.
const MAX_CREATE_ISSUE_ATTEMPTS: u32 = 4;
/// Base backoff delay.
const BACKOFF_BASE: Duration = Duration::from_millis(250);
/// Backoff delay cap.
const BACKOFF_CAP: Duration = Duration::from_secs(5);
/// Pull request file page size.
const PR_FILES_PER_PAGE: usize = 100;
/// Maximum pull request file pages fetched.
const PR_FILES_MAX_PAGES: usize = 10;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the GitHub App client.
#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    /// GitHub App identifier.
    pub app_id: u64,
    /// Installation identifier; auto-discovered when absent.
    pub installation_id: Option<u64>,
    /// Path to the app private key (PKCS#1 or PKCS#8 PEM).
    pub private_key_path: PathBuf,
    /// API base URL; override for tests.
    pub api_base: String,
}

impl GithubClientConfig {
    /// Builds a config against the public API.
    #[must_use]
    pub fn new(app_id: u64, installation_id: Option<u64>, private_key_path: PathBuf) -> Self {
        Self {
            app_id,
            installation_id,
            private_key_path,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Client construction errors.
#[derive(Debug, Error)]
pub enum GithubClientError {
    /// The private key file could not be read.
    #[error("read private key: {0}")]
    KeyRead(String),
    /// The private key could not be parsed as RSA PEM.
    #[error("parse private key: {0}")]
    KeyParse(String),
    /// The HTTP client could not be built.
    #[error("build http client: {0}")]
    Http(String),
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Cached installation token state.
struct TokenState {
    /// Resolved installation identifier.
    installation_id: Option<u64>,
    /// Cached token value.
    token: Option<String>,
    /// Token expiry as reported by the API.
    expires_at: DateTime<Utc>,
}

/// GitHub App-authenticated forge client.
pub struct GithubClient {
    /// App identifier used as the JWT issuer.
    app_id: u64,
    /// API base URL without a trailing slash.
    api_base: String,
    /// RS256 signing key.
    signing_key: EncodingKey,
    /// HTTP client with request timeouts.
    http: reqwest::Client,
    /// Token cache; refresh is single-flight under this mutex.
    token: Mutex<TokenState>,
}

/// App JWT claims.
#[derive(Debug, Serialize)]
struct AppClaims {
    /// Issuer: the app id.
    iss: String,
    /// Issued-at, backdated for clock skew.
    iat: u64,
    /// Expiry.
    exp: u64,
}

/// Installation token response body.
#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    /// Token value.
    token: String,
    /// Token expiry.
    expires_at: DateTime<Utc>,
}

/// Installation listing entry.
#[derive(Debug, Deserialize)]
struct InstallationInfo {
    /// Installation identifier.
    id: u64,
}

impl GithubClient {
    /// Builds a client, loading and parsing the private key.
    ///
    /// # Errors
    ///
    /// Returns [`GithubClientError`] when the key cannot be read or parsed
    /// or the HTTP client cannot be built.
    pub fn new(config: GithubClientConfig) -> Result<Self, GithubClientError> {
        let pem = std::fs::read(&config.private_key_path)
            .map_err(|err| GithubClientError::KeyRead(err.to_string()))?;
        let signing_key = EncodingKey::from_rsa_pem(&pem)
            .map_err(|err| GithubClientError::KeyParse(err.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| GithubClientError::Http(err.to_string()))?;
        Ok(Self {
            app_id: config.app_id,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            signing_key,
            http,
            token: Mutex::new(TokenState {
                installation_id: config.installation_id,
                token: None,
                expires_at: DateTime::<Utc>::MIN_UTC,
            }),
        })
    }

    /// Signs a short-lived app JWT.
    fn make_jwt(&self) -> Result<String, ForgeError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let claims = AppClaims {
            iss: self.app_id.to_string(),
            iat: now.as_secs().saturating_sub(JWT_BACKDATE.as_secs()),
            exp: now.as_secs().saturating_add(JWT_LIFETIME.as_secs()),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key).map_err(
            |err| ForgeError::Transport {
                operation: "sign app jwt".to_string(),
                detail: err.to_string(),
            },
        )
    }

    /// Resolves the installation id, discovering it when exactly one exists.
    async fn ensure_installation_id(&self, state: &mut TokenState) -> Result<u64, ForgeError> {
        if let Some(id) = state.installation_id {
            return Ok(id);
        }
        let jwt = self.make_jwt()?;
        let url = format!("{}/app/installations?per_page=100", self.api_base);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|err| ForgeError::AppNotInstalled(format!("discover installation id: {err}")))?;
        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::AppNotInstalled(format!(
                "discover installation id HTTP {status}: {body}"
            )));
        }
        let installations: Vec<InstallationInfo> =
            response.json().await.map_err(|err| ForgeError::Decode {
                operation: "discover installation id".to_string(),
                detail: err.to_string(),
            })?;
        match installations.as_slice() {
            [] => Err(ForgeError::AppNotInstalled(
                "no installation found for this GitHub App".to_string(),
            )),
            [only] => {
                state.installation_id = Some(only.id);
                Ok(only.id)
            }
            many => Err(ForgeError::AppNotInstalled(format!(
                "multiple installations found ({}), set GITHUB_INSTALLATION_ID explicitly",
                many.len()
            ))),
        }
    }

    /// Returns a valid installation token, refreshing under the mutex.
    async fn installation_token(&self) -> Result<String, ForgeError> {
        let mut state = self.token.lock().await;
        let installation_id = self.ensure_installation_id(&mut state).await?;

        if let Some(token) = &state.token {
            let margin = chrono::Duration::from_std(TOKEN_REFRESH_MARGIN).unwrap_or_default();
            if Utc::now() < state.expires_at - margin {
                return Ok(token.clone());
            }
        }

        let jwt = self.make_jwt()?;
        let url =
            format!("{}/app/installations/{installation_id}/access_tokens", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|err| ForgeError::Transport {
                operation: "request installation token".to_string(),
                detail: err.to_string(),
            })?;
        if response.status() != StatusCode::CREATED {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Api {
                operation: "installation token".to_string(),
                status,
                body,
            });
        }
        let token: InstallationTokenResponse =
            response.json().await.map_err(|err| ForgeError::Decode {
                operation: "installation token".to_string(),
                detail: err.to_string(),
            })?;
        state.token = Some(token.token.clone());
        state.expires_at = token.expires_at;
        Ok(token.token)
    }

    /// Sends an authenticated API request.
    async fn do_api<B: Serialize>(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, ForgeError> {
        let token = self.installation_token().await?;
        let mut request = self
            .http
            .request(method, url)
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|err| ForgeError::Transport {
            operation: operation.to_string(),
            detail: err.to_string(),
        })
    }

    /// Converts an unexpected response into a typed API error.
    async fn api_error(operation: &str, response: Response) -> ForgeError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        toolhub_telemetry::inc_forge_api_error(operation, status);
        ForgeError::Api {
            operation: operation.to_string(),
            status,
            body,
        }
    }
}

// ============================================================================
// SECTION: ForgeClient Implementation
// ============================================================================

#[async_trait]
impl ForgeClient for GithubClient {
    async fn create_issue(
        &self,
        repo: &RepoName,
        input: CreateIssueInput,
    ) -> Result<Issue, ForgeError> {
        let (owner, name) = repo.split();
        let operation = "create issue";
        let url = format!("{}/repos/{owner}/{name}/issues", self.api_base);

        let mut last_error: Option<ForgeError> = None;
        for attempt in 1..=MAX_CREATE_ISSUE_ATTEMPTS {
            let response = match self.do_api(operation, Method::POST, &url, Some(&input)).await {
                Ok(response) => response,
                Err(err) => {
                    let retryable = matches!(err, ForgeError::Transport { .. });
                    last_error = Some(err);
                    if retryable && attempt < MAX_CREATE_ISSUE_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt, None)).await;
                        continue;
                    }
                    break;
                }
            };

            if response.status() == StatusCode::CREATED {
                return response.json().await.map_err(|err| ForgeError::Decode {
                    operation: operation.to_string(),
                    detail: err.to_string(),
                });
            }

            let status = response.status().as_u16();
            let retry_after = retry_after_duration(response.headers());
            last_error = Some(Self::api_error(operation, response).await);
            if is_retryable_status(status) && attempt < MAX_CREATE_ISSUE_ATTEMPTS {
                tokio::time::sleep(backoff_delay(attempt, retry_after)).await;
                continue;
            }
            break;
        }
        Err(last_error.unwrap_or_else(|| ForgeError::Transport {
            operation: operation.to_string(),
            detail: "create issue failed".to_string(),
        }))
    }

    async fn create_pr_comment(
        &self,
        repo: &RepoName,
        pr_number: u64,
        body: &str,
    ) -> Result<PrComment, ForgeError> {
        let (owner, name) = repo.split();
        let operation = "create pr comment";
        let url =
            format!("{}/repos/{owner}/{name}/issues/{pr_number}/comments", self.api_base);
        let payload = serde_json::json!({"body": body});
        let response = self.do_api(operation, Method::POST, &url, Some(&payload)).await?;
        if response.status() != StatusCode::CREATED {
            return Err(Self::api_error(operation, response).await);
        }
        response.json().await.map_err(|err| ForgeError::Decode {
            operation: operation.to_string(),
            detail: err.to_string(),
        })
    }

    async fn get_pull_request(
        &self,
        repo: &RepoName,
        pr_number: u64,
    ) -> Result<PullRequest, ForgeError> {
        let (owner, name) = repo.split();
        let operation = "get pull request";
        let url = format!("{}/repos/{owner}/{name}/pulls/{pr_number}", self.api_base);
        let response = self.do_api::<()>(operation, Method::GET, &url, None).await?;
        if response.status() != StatusCode::OK {
            return Err(Self::api_error(operation, response).await);
        }
        response.json().await.map_err(|err| ForgeError::Decode {
            operation: operation.to_string(),
            detail: err.to_string(),
        })
    }

    async fn list_pull_request_files(
        &self,
        repo: &RepoName,
        pr_number: u64,
    ) -> Result<Vec<PullRequestFile>, ForgeError> {
        let (owner, name) = repo.split();
        let operation = "list pull request files";
        let mut files = Vec::new();
        for page in 1..=PR_FILES_MAX_PAGES {
            let url = format!(
                "{}/repos/{owner}/{name}/pulls/{pr_number}/files?per_page={PR_FILES_PER_PAGE}&page={page}",
                self.api_base
            );
            let response = self.do_api::<()>(operation, Method::GET, &url, None).await?;
            if response.status() != StatusCode::OK {
                return Err(Self::api_error(operation, response).await);
            }
            let page_files: Vec<PullRequestFile> =
                response.json().await.map_err(|err| ForgeError::Decode {
                    operation: operation.to_string(),
                    detail: err.to_string(),
                })?;
            let page_len = page_files.len();
            files.extend(page_files);
            if page_len < PR_FILES_PER_PAGE {
                break;
            }
        }
        Ok(files)
    }

    async fn create_pull_request(
        &self,
        repo: &RepoName,
        input: CreatePullRequestInput,
    ) -> Result<PullRequest, ForgeError> {
        let (owner, name) = repo.split();
        let operation = "create pull request";
        let url = format!("{}/repos/{owner}/{name}/pulls", self.api_base);
        let response = self.do_api(operation, Method::POST, &url, Some(&input)).await?;
        if response.status() != StatusCode::CREATED {
            return Err(Self::api_error(operation, response).await);
        }
        response.json().await.map_err(|err| ForgeError::Decode {
            operation: operation.to_string(),
            detail: err.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Returns true for statuses worth retrying (429 and 5xx).
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Computes the delay before the given retry attempt.
///
/// Exponential backoff from the base, capped, with a small jitter; a larger
/// `Retry-After` wins over the computed delay.
#[must_use]
pub fn backoff_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let backoff = BACKOFF_BASE.saturating_mul(1 << exponent).min(BACKOFF_CAP);
    let jitter_ms = u64::from(
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos() % 200,
    );
    let wait = backoff + Duration::from_millis(jitter_ms);
    match retry_after {
        Some(retry_after) if retry_after > wait => retry_after,
        _ => wait,
    }
}

/// Parses a `Retry-After` header as seconds or an HTTP date.
#[must_use]
pub fn retry_after_duration(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("Retry-After")?.to_str().ok()?;
    if let Ok(seconds) = value.trim().parse::<i64>() {
        if seconds <= 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds as u64));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let until = when.with_timezone(&Utc) - Utc::now();
    until.to_std().ok().filter(|duration| !duration.is_zero())
}
