// Repository lister: fetch, parse, dedupe, cache and paginate

use super::parse::parse_organization_page;
use super::{Repository, RepositoryPage};
use crate::cache::{repositories_key, CacheStore};
use crate::error::ListError;
use crate::source::OrganizationSource;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Lists an organization's repositories
///
/// The full, deduplicated and truncated list is cached; every call
/// paginates the cached superset.
pub struct RepositoryLister {
    source: Arc<dyn OrganizationSource>,
    cache: Arc<dyn CacheStore>,
    web_base_url: String,
    repo_limit: usize,
    ttl: Duration,
}

impl RepositoryLister {
    pub fn new(
        source: Arc<dyn OrganizationSource>,
        cache: Arc<dyn CacheStore>,
        web_base_url: impl Into<String>,
        repo_limit: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            web_base_url: web_base_url.into(),
            repo_limit: repo_limit.max(1),
            ttl,
        }
    }

    /// List one page of repositories
    ///
    /// # Arguments
    ///
    /// * `org` - Organization name
    /// * `force_refresh` - Bypass and overwrite the cached listing
    /// * `page` - 1-based page number; 0 is treated as 1
    /// * `per_page` - Page size; 0 is treated as 1
    pub async fn list(
        &self,
        org: &str,
        force_refresh: bool,
        page: usize,
        per_page: usize,
    ) -> Result<RepositoryPage, ListError> {
        let all = self.fetch_all(org, force_refresh).await?;
        Ok(RepositoryPage::paginate(&all, page, per_page))
    }

    /// The full cached listing, fetching it on a miss
    pub async fn fetch_all(&self, org: &str, force_refresh: bool) -> Result<Vec<Repository>, ListError> {
        let org = org.trim();
        if org.is_empty() {
            return Err(ListError::NoOrganization);
        }

        let key = repositories_key(org);
        if !force_refresh {
            if let Some(cached) = self.cache.get(&key) {
                match serde_json::from_value::<Vec<Repository>>(cached) {
                    Ok(repositories) => {
                        tracing::debug!(org, count = repositories.len(), "Repositories served from cache");
                        return Ok(repositories);
                    }
                    Err(e) => tracing::warn!(org, error = %e, "Ignoring unreadable cached listing"),
                }
            }
        }

        let html = self.source.fetch_organization_page(org).await?;
        let parsed = parse_organization_page(&html, org, &self.web_base_url);
        if parsed.is_empty() {
            tracing::warn!(org, bytes = html.len(), "No repositories recognized in organization page");
            return Err(ListError::Parse);
        }

        let repositories = dedupe_and_truncate(parsed, self.repo_limit);
        tracing::info!(org, count = repositories.len(), "Fetched repository listing");

        match serde_json::to_value(&repositories) {
            Ok(value) => {
                if let Err(e) = self.cache.set(&key, value, self.ttl) {
                    tracing::warn!(org, error = %e, "Failed to cache repository listing");
                }
            }
            Err(e) => tracing::warn!(org, error = %e, "Failed to serialize repository listing"),
        }

        Ok(repositories)
    }

    /// Drop the cached listing of an organization
    pub fn invalidate(&self, org: &str) -> bool {
        let key = repositories_key(org);
        let existed = self.cache.get(&key).is_some();
        if let Err(e) = self.cache.delete(&key) {
            tracing::warn!(org, error = %e, "Failed to delete cached listing");
        }
        existed
    }
}

/// Keep the first occurrence of each name (case-insensitive), then cap the count
pub fn dedupe_and_truncate(repositories: Vec<Repository>, limit: usize) -> Vec<Repository> {
    let mut seen = HashSet::new();
    repositories
        .into_iter()
        .filter(|repo| seen.insert(repo.name.to_lowercase()))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::source::MemorySource;

    fn page_with(names: &[&str]) -> String {
        names
            .iter()
            .map(|n| format!(r#"<li class="Box-row"><a href="/acme/{n}">{n}</a></li>"#))
            .collect()
    }

    fn lister(source: MemorySource, limit: usize) -> (RepositoryLister, Arc<MemorySource>, Arc<MemoryCache>) {
        let source = Arc::new(source);
        let cache = Arc::new(MemoryCache::new());
        let lister = RepositoryLister::new(
            source.clone(),
            cache.clone(),
            "https://github.com",
            limit,
            Duration::from_secs(3600),
        );
        (lister, source, cache)
    }

    #[tokio::test]
    async fn duplicates_keep_first_occurrence() {
        let (lister, _, _) = lister(
            MemorySource::new().with_org_page("acme", &page_with(&["A", "B", "A"])),
            15,
        );

        let page = lister.list("acme", false, 1, 15).await.unwrap();
        let names: Vec<_> = page.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(page.pagination.total_items, 2);
    }

    #[tokio::test]
    async fn truncates_to_limit_then_paginates_cached_superset() {
        let names: Vec<String> = (1..=20).map(|i| format!("r{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (lister, source, _) =
            lister(MemorySource::new().with_org_page("acme", &page_with(&refs)), 12);

        let first = lister.list("acme", false, 1, 5).await.unwrap();
        let third = lister.list("acme", false, 3, 5).await.unwrap();

        assert_eq!(first.pagination.total_pages, 3);
        assert_eq!(third.repositories.len(), 2);
        assert_eq!(third.repositories[1].name, "r12");
        assert_eq!(source.requests(), vec!["org:acme"]);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache() {
        let (lister, source, _) =
            lister(MemorySource::new().with_org_page("acme", &page_with(&["a"])), 15);

        lister.list("acme", false, 1, 5).await.unwrap();
        lister.list("acme", true, 1, 5).await.unwrap();
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn failures_are_typed_not_empty() {
        let (lister, _, cache) = lister(
            MemorySource::new()
                .with_org_status("down", 503)
                .with_org_failure("flaky", "timed out")
                .with_org_page("blank", "<html></html>"),
            15,
        );

        assert_eq!(lister.list("down", false, 1, 5).await.unwrap_err(), ListError::Status(503));
        assert!(matches!(
            lister.list("flaky", false, 1, 5).await.unwrap_err(),
            ListError::Network(_)
        ));
        assert_eq!(lister.list("blank", false, 1, 5).await.unwrap_err(), ListError::Parse);
        assert_eq!(lister.list(" ", false, 1, 5).await.unwrap_err(), ListError::NoOrganization);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_drops_cached_listing() {
        let (lister, _, cache) =
            lister(MemorySource::new().with_org_page("acme", &page_with(&["a"])), 15);

        lister.list("acme", false, 1, 5).await.unwrap();
        assert!(lister.invalidate("acme"));
        assert!(cache.is_empty());
        assert!(!lister.invalidate("acme"));
    }
}
