use serde::Serialize;

/// A 1-based page request. Out-of-range inputs are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

/// One slice of an ordered listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
        }
    }

    /// Number of non-empty pages.
    pub fn pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.per_page))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) * u64::from(self.per_page) < self.total
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn next_num(&self) -> Option<u32> {
        self.has_next().then(|| self.page + 1)
    }

    pub fn prev_num(&self) -> Option<u32> {
        self.has_prev().then(|| self.page - 1)
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(page: u32, total: u64) -> Page<u32> {
        let request = PageRequest::new(page, 2);
        let start = request.offset() as u64;
        let items = (start..total.min(start + 2)).map(|i| i as u32).collect();
        Page::new(items, request, total)
    }

    #[test]
    fn first_page_has_next_only() {
        let page = page_of(1, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_next());
        assert!(!page.has_prev());
        assert_eq!(page.next_num(), Some(2));
        assert_eq!(page.prev_num(), None);
    }

    #[test]
    fn last_page_is_partial() {
        let page = page_of(3, 5);
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_next());
        assert!(page.has_prev());
        assert_eq!(page.pages(), 3);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = page_of(4, 5);
        assert!(page.items.is_empty());
        assert!(!page.has_next());
        assert!(page.has_prev());
    }

    #[test]
    fn zero_is_clamped_to_first_page() {
        let request = PageRequest::new(0, 0);
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, 1);
        assert_eq!(request.offset(), 0);
    }
}
