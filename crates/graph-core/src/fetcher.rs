//! Bounded cursor pagination
//!
//! [`fetch_all`] walks a cursor-paginated listing page by page until the
//! remote reports no further cursor or the page bound is hit. Hitting the
//! bound is a silent truncation: the caller gets whatever was accumulated.
//! Any page failure aborts the walk and the partial accumulation is dropped.

use atproto_client::Page;
use std::future::Future;

/// Page size and page bound for one walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Items requested per page
    pub page_size: u32,
    /// Maximum pages fetched; 0 behaves as 1
    pub max_pages: usize,
}

impl PageLimits {
    /// Create page limits
    pub fn new(page_size: u32, max_pages: usize) -> Self {
        Self { page_size, max_pages }
    }
}

/// Fetch up to `limits.max_pages` pages, keeping items for which `keep` holds
///
/// `page_fn` receives the cursor returned by the previous page (`None` for
/// the first) and the page size.
pub async fn fetch_all<T, E, F, Fut, K>(
    label: &str,
    limits: PageLimits,
    mut page_fn: F,
    mut keep: K,
) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    K: FnMut(&T) -> bool,
{
    let max_pages = limits.max_pages.max(1);
    let mut items = Vec::new();
    let mut cursor = None;
    let mut pages = 0;

    loop {
        let page = page_fn(cursor.take(), limits.page_size).await?;
        pages += 1;
        items.extend(page.items.into_iter().filter(|item| keep(item)));

        match page.cursor {
            None => break,
            Some(_) if pages >= max_pages => {
                tracing::debug!(%label, pages, items = items.len(), "pagination truncated");
                break;
            }
            next => cursor = next,
        }
    }

    tracing::debug!(%label, pages, items = items.len(), "pagination finished");
    Ok(items)
}
