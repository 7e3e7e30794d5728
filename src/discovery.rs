//! Repository discovery from hosting accounts
//!
//! [`RepoListing`] is the provider-agnostic seam the batch runner pulls
//! repositories through. [`GitLabListing`] implements it against the GitLab v4
//! projects API with page-number pagination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Source;
use crate::error::ListingError;

/// Projects requested per page
pub const DEFAULT_PER_PAGE: u32 = 50;

/// One remote repository as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepositoryRecord {
    pub id: u64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_with_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Stable key, e.g. "team/api"
    pub path_with_namespace: String,

    pub http_url_to_repo: String,

    pub created_at: DateTime<Utc>,
}

impl RepositoryRecord {
    /// `<destination>/<domain>/<path_with_namespace>.git`
    ///
    /// `.`, `..` and empty segments are dropped; `None` if nothing is left,
    /// since the result would sit beside the domain directory
    pub fn local_path(&self, destination: &Path, domain: &str) -> Option<PathBuf> {
        let mut path = destination.join(domain);
        let mut segments = 0;
        for segment in self
            .path_with_namespace
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        {
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return None;
        }
        let mut os = path.into_os_string();
        os.push(".git");
        Some(PathBuf::from(os))
    }
}

/// A paginated source of repository records
#[async_trait]
pub trait RepoListing: Send + Sync {
    /// Fetch one page (1-based); an empty page marks the end
    async fn list_page(
        &self,
        source: &Source,
        page: u32,
    ) -> Result<Vec<RepositoryRecord>, ListingError>;

    /// Fetch every page until the first empty one
    async fn list_all(&self, source: &Source) -> Result<Vec<RepositoryRecord>, ListingError> {
        let mut repos = Vec::new();
        let mut page = 1;
        loop {
            let items = self.list_page(source, page).await?;
            if items.is_empty() {
                break;
            }
            repos.extend(items);
            page += 1;
        }
        Ok(repos)
    }
}

/// GitLab v4 `/projects` listing
#[derive(Debug, Clone)]
pub struct GitLabListing {
    client: reqwest::Client,
    per_page: u32,
}

impl GitLabListing {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    fn page_url(&self, source: &Source, page: u32) -> String {
        format!(
            "{}/api/v4/projects?simple=true&page={}&per_page={}&order_by=id&sort=asc",
            source.api_base(),
            page,
            self.per_page
        )
    }
}

impl Default for GitLabListing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoListing for GitLabListing {
    async fn list_page(
        &self,
        source: &Source,
        page: u32,
    ) -> Result<Vec<RepositoryRecord>, ListingError> {
        let url = self.page_url(source, page);
        debug!("Fetching repositories page {} for [{}]", page, source);

        let mut request = self.client.get(&url);
        if let Some(token) = source.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| ListingError::Request {
            url: url.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<RepositoryRecord>>()
            .await
            .map_err(|e| ListingError::Decode { url, source: e })
    }
}
