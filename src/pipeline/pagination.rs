/// Next-page detection for live scrapes and slicing for index-backed lists
use crate::browser::PageSession;
use tracing::{debug, warn};

const NEXT_CONTROLS: &[&str] = &[".pagination .next", ".pagination a[rel=\"next\"]"];

pub struct PaginationTracker;

impl PaginationTracker {
    /// Whether another page follows `current_page`, and its number.
    ///
    /// Explicit "next" controls win; otherwise the first pagination link with
    /// a numeric label above the current page is used. Query failures count
    /// as "no next page".
    pub async fn detect(page: &dyn PageSession, current_page: u32) -> (bool, Option<u32>) {
        match Self::find_next(page, current_page).await {
            Ok(Some(next)) => {
                debug!("Next page detected: {}", next);
                (true, Some(next))
            }
            Ok(None) => (false, None),
            Err(e) => {
                warn!("⚠️ Error checking pagination: {:#}", e);
                (false, None)
            }
        }
    }

    async fn find_next(page: &dyn PageSession, current_page: u32) -> anyhow::Result<Option<u32>> {
        let labelled_next = page
            .query_all("a")
            .await?
            .iter()
            .any(|link| link.text().contains("Next"));
        let load_more = page
            .query_all("button")
            .await?
            .iter()
            .any(|button| button.text().contains("Load More"));
        if labelled_next || load_more {
            return Ok(current_page.checked_add(1));
        }

        for selector in NEXT_CONTROLS {
            if !page.query_all(selector).await?.is_empty() {
                return Ok(current_page.checked_add(1));
            }
        }

        let numbered = page
            .query_all(".pagination a")
            .await?
            .iter()
            .filter_map(|link| {
                let label = link.text();
                if label.is_empty() || !label.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                label.parse::<u32>().ok()
            })
            .find(|&number| number > current_page);
        Ok(numbered)
    }
}

/// One page of `items`, 1-based. Returns the slice with `has_next_page` and
/// `next_page` computed from the slice boundary.
pub fn paginate<T: Clone>(items: &[T], page: u32, page_size: usize) -> (Vec<T>, bool, Option<u32>) {
    let page = page.max(1);
    let start = (page as usize - 1).saturating_mul(page_size);
    let end = start.saturating_add(page_size);

    let slice = if start < items.len() {
        items[start..end.min(items.len())].to_vec()
    } else {
        Vec::new()
    };
    let has_next = end < items.len();
    (slice, has_next, has_next.then(|| page.saturating_add(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_boundaries() {
        let items: Vec<u32> = (1..=120).collect();

        let (first, has_next, next) = paginate(&items, 1, 50);
        assert_eq!(first.len(), 50);
        assert_eq!(first[0], 1);
        assert_eq!(first[49], 50);
        assert!(has_next);
        assert_eq!(next, Some(2));

        let (last, has_next, next) = paginate(&items, 3, 50);
        assert_eq!(last, (101..=120).collect::<Vec<_>>());
        assert!(!has_next);
        assert_eq!(next, None);

        let (beyond, has_next, _) = paginate(&items, 9, 50);
        assert!(beyond.is_empty());
        assert!(!has_next);
    }

    #[test]
    fn test_paginate_exact_multiple() {
        let items: Vec<u32> = (1..=100).collect();
        let (second, has_next, next) = paginate(&items, 2, 50);
        assert_eq!(second.len(), 50);
        assert!(!has_next);
        assert_eq!(next, None);
    }

    #[test]
    fn test_paginate_last_page_number() {
        let items: Vec<u32> = (1..=3).collect();
        let (slice, has_next, next) = paginate(&items, u32::MAX, 50);
        assert!(slice.is_empty());
        assert!(!has_next);
        assert_eq!(next, None);
    }
}
