// Organization repository listing

pub mod lister;
pub mod parse;

pub use lister::RepositoryLister;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository published by the organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique, case-insensitive identifier
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Page position within the full cached listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(page: usize, per_page: usize, total_items: usize) -> Self {
        let per_page = per_page.max(1);
        Self {
            current_page: page.max(1),
            per_page,
            total_items,
            total_pages: total_items.div_ceil(per_page),
        }
    }

    /// Index range of this page within the full list
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = (self.current_page - 1)
            .saturating_mul(self.per_page)
            .min(self.total_items);
        let end = start.saturating_add(self.per_page).min(self.total_items);
        start..end
    }
}

/// One page of repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPage {
    pub repositories: Vec<Repository>,
    pub pagination: Pagination,
}

impl RepositoryPage {
    /// Slice a page out of the full list
    pub fn paginate(all: &[Repository], page: usize, per_page: usize) -> Self {
        let pagination = Pagination::new(page, per_page, all.len());
        Self {
            repositories: all[pagination.range()].to_vec(),
            pagination,
        }
    }
}
