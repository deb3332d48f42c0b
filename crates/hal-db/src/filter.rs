use rusqlite::types::ToSql;

/// Page window for list queries. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp user input: page >= 1, 1 <= limit <= MAX_LIMIT.
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit as i64 - 1) / self.limit as i64
    }
}

/// One page of rows plus the unpaged total.
#[derive(Debug)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Builds a `WHERE` clause out of optional conditions using anonymous `?`
/// placeholders, so parameters bind in push order.
#[derive(Default)]
pub struct Filter {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Condition without parameters.
    pub fn raw(&mut self, clause: &str) -> &mut Self {
        self.clauses.push(clause.to_string());
        self
    }

    /// Condition with exactly one `?`.
    pub fn push<T: ToSql + 'static>(&mut self, clause: &str, value: T) -> &mut Self {
        self.clauses.push(clause.to_string());
        self.params.push(Box::new(value));
        self
    }

    /// Condition whose `?` placeholders all take the same value.
    pub fn push_repeated<T: ToSql + Clone + 'static>(&mut self, clause: &str, value: T) -> &mut Self {
        let n = clause.matches('?').count();
        self.clauses.push(clause.to_string());
        for _ in 0..n {
            self.params.push(Box::new(value.clone()));
        }
        self
    }

    /// `(expr LIKE ? OR expr LIKE ? ...)`, one placeholder per pattern.
    /// No-op for an empty pattern list.
    pub fn any_like(&mut self, expr: &str, patterns: Vec<String>) -> &mut Self {
        if patterns.is_empty() {
            return self;
        }
        let ors = vec![format!("{expr} LIKE ? ESCAPE '\\'"); patterns.len()];
        self.clauses.push(format!("({})", ors.join(" OR ")));
        for p in patterns {
            self.params.push(Box::new(p));
        }
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Parameters followed by LIMIT and OFFSET values.
    pub fn paged_params<'a>(&'a self, page: &'a Page, offset: &'a i64) -> Vec<&'a dyn ToSql> {
        let mut params = self.params();
        params.push(&page.limit);
        params.push(offset);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_and_caps() {
        let page = Page::new(None, None, 10);
        assert_eq!((page.page, page.limit), (1, 10));
        assert_eq!(page.offset(), 0);

        let page = Page::new(Some(0), Some(500), 10);
        assert_eq!((page.page, page.limit), (1, Page::MAX_LIMIT));

        let page = Page::new(Some(3), Some(20), 10);
        assert_eq!(page.offset(), 40);
        assert_eq!(page.total_pages(41), 3);
        assert_eq!(page.total_pages(0), 0);
    }

    #[test]
    fn empty_filter_has_no_where() {
        assert_eq!(Filter::new().where_sql(), "");
    }

    #[test]
    fn clauses_join_with_and() {
        let mut filter = Filter::new();
        filter
            .raw("p.is_available = 1")
            .push("p.category = ?", "meyve".to_string())
            .push_repeated("(a LIKE ? OR b LIKE ?)", "%x%".to_string());
        assert_eq!(
            filter.where_sql(),
            " WHERE p.is_available = 1 AND p.category = ? AND (a LIKE ? OR b LIKE ?)"
        );
        assert_eq!(filter.params().len(), 3);
    }

    #[test]
    fn any_like_groups_alternatives() {
        let mut filter = Filter::new();
        filter.any_like("p.search_text", vec![]);
        assert_eq!(filter.where_sql(), "");

        filter.any_like("p.search_text", vec!["%a%".into(), "%b%".into()]);
        assert_eq!(
            filter.where_sql(),
            " WHERE (p.search_text LIKE ? ESCAPE '\\' OR p.search_text LIKE ? ESCAPE '\\')"
        );
        assert_eq!(filter.params().len(), 2);
    }
}
