use serde::Deserialize;

const MAX_LIMIT: i64 = 100;
/// Deepest page served; anything past it is empty anyway.
const MAX_PAGE: i64 = 1_000_000;

/// `?page=&limit=` query; both optional.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl PageQuery {
    pub fn resolve(&self, default_limit: i64) -> Page {
        Page {
            page: self.page.filter(|p| *p >= 1).unwrap_or(1).min(MAX_PAGE),
            limit: self
                .limit
                .filter(|l| *l >= 1)
                .unwrap_or(default_limit)
                .min(MAX_LIMIT),
        }
    }
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.limit - 1) / self.limit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let p = PageQuery::default().resolve(10);
        assert_eq!(p, Page { page: 1, limit: 10 });

        let p = PageQuery { page: Some(0), limit: Some(-4) }.resolve(20);
        assert_eq!(p, Page { page: 1, limit: 20 });

        let p = PageQuery { page: Some(3), limit: Some(5000) }.resolve(10);
        assert_eq!(p, Page { page: 3, limit: MAX_LIMIT });
    }

    #[test]
    fn offset_and_total_pages() {
        let p = Page { page: 3, limit: 10 };
        assert_eq!(p.offset(), 20);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(21), 3);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let p = PageQuery { page: Some(i64::MAX), limit: Some(10) }.resolve(10);
        assert_eq!(p.page, MAX_PAGE);
        assert_eq!(p.offset(), (MAX_PAGE - 1) * 10);

        let p = Page { page: i64::MAX, limit: MAX_LIMIT };
        assert_eq!(p.offset(), i64::MAX);
    }
}
