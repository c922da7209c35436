//! Diff source backed by the GitHub REST API.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, warn};

use reposync_types::{ChangeKind, ChangedFile, Comparison, GitHubSettings, HeadCommit};

use crate::collaborators::DiffSource;
use crate::error::CollaboratorError;

/// Most files GitHub lists for one comparison.
pub const COMPARE_FILE_LIMIT: usize = 300;

/// Commits requested per compare page.
const COMPARE_PAGE_SIZE: u32 = 100;

/// Compare pages followed before the listing is considered incomplete.
const MAX_COMPARE_PAGES: usize = 30;

/// Configuration for [`GitHubDiffSource`].
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API base URL (e.g., "https://api.github.com")
    pub api_url: String,

    /// Optional token sent as a bearer credential
    pub token: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,

    /// Attempts per request for transient failures
    pub max_retries: u32,

    /// First backoff delay between attempts
    pub initial_backoff: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self::from(&GitHubSettings::default())
    }
}

impl From<&GitHubSettings> for GitHubConfig {
    fn from(settings: &GitHubSettings) -> Self {
        Self {
            api_url: settings.api_url.clone(),
            token: settings.token.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries.max(1),
            initial_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    total_commits: u32,
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Deserialize)]
struct CompareFile {
    filename: String,
    status: String,
    #[serde(default)]
    previous_filename: Option<String>,
}

impl CompareFile {
    fn into_changed_file(self) -> Option<ChangedFile> {
        let kind = match self.status.as_str() {
            "added" => ChangeKind::Added,
            "removed" => ChangeKind::Deleted,
            "renamed" => ChangeKind::Renamed,
            "modified" | "changed" | "copied" => ChangeKind::Modified,
            "unchanged" => return None,
            other => {
                debug!(
                    path = %self.filename,
                    status = %other,
                    "Unknown file status, treating as modified"
                );
                ChangeKind::Modified
            }
        };
        Some(ChangedFile {
            path: self.filename,
            kind,
            previous_path: self.previous_filename,
        })
    }
}

/// A decoded response and the URL of the following page, if any.
struct Page<T> {
    body: T,
    next: Option<String>,
}

/// URL tagged `rel="next"` in a `Link` header.
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let url = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        url.strip_prefix('<')
            .and_then(|u| u.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// GitHub-backed [`DiffSource`].
///
/// Compare results are paginated through the `Link` header and files from
/// every page are collected. GitHub stops listing files at
/// [`COMPARE_FILE_LIMIT`]; a listing that reaches the limit without further
/// files on later pages is returned with `truncated` set.
pub struct GitHubDiffSource {
    client: Client,
    config: GitHubConfig,
}

impl GitHubDiffSource {
    pub fn new(config: GitHubConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("reposync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollaboratorError::Other(format!("HTTP client setup failed: {e}")))?;

        Ok(Self { client, config })
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            owner,
            repo
        )
    }

    /// GET with retry on transient failures.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>, CollaboratorError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(url = %url, attempt = attempts, "Calling GitHub API");

            match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(e @ CollaboratorError::Http(_)) => {
                    if attempts >= self.config.max_retries {
                        error!(url = %url, error = %e, "GitHub request failed, giving up");
                        return Err(e);
                    }
                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                url = %url,
                                error = %e,
                                retry_in_ms = duration.as_millis() as u64,
                                "GitHub request failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>, CollaboratorError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.config.token {
            request = request.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CollaboratorError::NotFound(url.to_string()));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Http(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Other(format!("GitHub returned HTTP {status}: {body}")));
        }

        let next = next_page_url(response.headers());
        let body = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Serialization(e.to_string()))?;
        Ok(Page { body, next })
    }
}

#[async_trait]
impl DiffSource for GitHubDiffSource {
    async fn get_head_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<HeadCommit, CollaboratorError> {
        let url = format!("{}/commits/{}", self.repo_url(owner, repo), branch);
        let response: CommitResponse = self.get_json(&url).await?.body;
        Ok(HeadCommit::new(response.sha, response.commit.message))
    }

    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, CollaboratorError> {
        let mut url = Some(format!(
            "{}/compare/{}...{}?per_page={}",
            self.repo_url(owner, repo),
            base,
            head,
            COMPARE_PAGE_SIZE
        ));
        let mut total_commits = 0;
        let mut files = Vec::new();
        let mut at_limit = false;
        let mut pages = 0;

        while let Some(page_url) = url.take() {
            if pages == MAX_COMPARE_PAGES {
                warn!(base = %base, head = %head, pages, "Stopped following compare pages");
                at_limit = true;
                break;
            }
            pages += 1;

            let page: Page<CompareResponse> = self.get_json(&page_url).await?;
            total_commits = total_commits.max(page.body.total_commits);

            let listed = page.body.files.len();
            if listed > 0 {
                at_limit = listed >= COMPARE_FILE_LIMIT;
            }
            files.extend(
                page.body
                    .files
                    .into_iter()
                    .filter_map(CompareFile::into_changed_file),
            );
            url = page.next;
        }

        debug!(
            base = %base,
            head = %head,
            pages,
            files = files.len(),
            truncated = at_limit,
            "Comparison listed"
        );

        Ok(Comparison {
            base_sha: base.to_string(),
            head_sha: head.to_string(),
            total_commits,
            files,
            truncated: at_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> GitHubDiffSource {
        GitHubDiffSource::new(GitHubConfig {
            api_url: server.uri(),
            token: None,
            timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_head_commit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/commits/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "def5678aaaa",
                "commit": {"message": "Fix parser"}
            })))
            .mount(&server)
            .await;

        let head = source(&server)
            .get_head_commit("acme", "my-api", "main")
            .await
            .unwrap();
        assert_eq!(head.sha, "def5678aaaa");
        assert_eq!(head.message, "Fix parser");
    }

    #[tokio::test]
    async fn test_missing_branch_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/commits/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = source(&server)
            .get_head_commit("acme", "my-api", "gone")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_compare_maps_file_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/compare/abc1234...def5678"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_commits": 3,
                "files": [
                    {"filename": "src/new.rs", "status": "added"},
                    {"filename": "src/lib.rs", "status": "modified"},
                    {"filename": "src/old.rs", "status": "removed"},
                    {"filename": "src/b.rs", "status": "renamed", "previous_filename": "src/a.rs"},
                    {"filename": "src/c.rs", "status": "copied"},
                    {"filename": "src/same.rs", "status": "unchanged"}
                ]
            })))
            .mount(&server)
            .await;

        let comparison = source(&server)
            .compare_commits("acme", "my-api", "abc1234", "def5678")
            .await
            .unwrap();

        assert_eq!(comparison.total_commits, 3);
        assert_eq!(comparison.base_sha, "abc1234");
        assert_eq!(comparison.changed_file_count(), 5);
        assert_eq!(comparison.count_of(ChangeKind::Added), 1);
        assert_eq!(comparison.count_of(ChangeKind::Modified), 2);
        assert_eq!(comparison.count_of(ChangeKind::Deleted), 1);
        assert_eq!(comparison.files[3].previous_path.as_deref(), Some("src/a.rs"));
    }

    fn compare_files(prefix: &str, count: usize) -> Vec<serde_json::Value> {
        (0..count)
            .map(|i| json!({"filename": format!("{prefix}/file_{i}.rs"), "status": "modified"}))
            .collect()
    }

    #[tokio::test]
    async fn test_compare_follows_next_page() {
        let server = MockServer::start().await;
        let compare_path = "/repos/acme/my-api/compare/abc1234...def5678";
        let next = format!("{}{compare_path}?per_page=100&page=2", server.uri());

        Mock::given(method("GET"))
            .and(path(compare_path))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_commits": 140,
                "files": compare_files("lib", 50)
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(compare_path))
            .and(query_param("per_page", "100"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "Link",
                        format!(r#"<{next}>; rel="next", <{next}>; rel="last""#).as_str(),
                    )
                    .set_body_json(json!({
                        "total_commits": 140,
                        "files": compare_files("src", COMPARE_FILE_LIMIT)
                    })),
            )
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        let comparison = source(&server)
            .compare_commits("acme", "my-api", "abc1234", "def5678")
            .await
            .unwrap();

        assert_eq!(comparison.changed_file_count(), COMPARE_FILE_LIMIT + 50);
        assert_eq!(comparison.total_commits, 140);
        assert!(!comparison.truncated);
        assert_eq!(comparison.files.last().unwrap().path, "lib/file_49.rs");
    }

    #[tokio::test]
    async fn test_compare_at_file_limit_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/compare/abc1234...def5678"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_commits": 12,
                "files": compare_files("src", COMPARE_FILE_LIMIT)
            })))
            .expect(1)
            .mount(&server)
            .await;

        let comparison = source(&server)
            .compare_commits("acme", "my-api", "abc1234", "def5678")
            .await
            .unwrap();

        assert_eq!(comparison.changed_file_count(), COMPARE_FILE_LIMIT);
        assert!(comparison.truncated);
    }

    #[test]
    fn test_next_page_url() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            r#"<https://api.github.com/x?page=3>; rel="next", <https://api.github.com/x?page=9>; rel="last""#
                .parse()
                .unwrap(),
        );
        assert_eq!(
            next_page_url(&headers).as_deref(),
            Some("https://api.github.com/x?page=3")
        );

        headers.insert(LINK, r#"<https://api.github.com/x?page=1>; rel="prev""#.parse().unwrap());
        assert_eq!(next_page_url(&headers), None);
        assert_eq!(next_page_url(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_compare_unknown_base_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/compare/abc1234...def5678"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = source(&server)
            .compare_commits("acme", "my-api", "abc1234", "def5678")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_token_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/private/commits/main"))
            .and(header("Authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "abc",
                "commit": {"message": "m"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = GitHubDiffSource::new(GitHubConfig {
            api_url: server.uri(),
            token: Some(SecretString::from("s3cret".to_string())),
            ..GitHubConfig::default()
        })
        .unwrap();
        source.get_head_commit("acme", "private", "main").await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/commits/main"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/commits/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "abc",
                "commit": {"message": "m"}
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let head = source(&server)
            .get_head_commit("acme", "my-api", "main")
            .await
            .unwrap();
        assert_eq!(head.sha, "abc");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/my-api/commits/main"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = source(&server)
            .get_head_commit("acme", "my-api", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Other(_)));
    }
}
