//! Collection listing query
//!
//! Builds the `filter[field]=value&page=P&page_size=N` parameters accepted by
//! the collection endpoints.

/// Fluent builder for a collection listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    filters: Vec<(String, String)>,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter on a field
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    #[cfg(test)]
    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    pub fn current_page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    #[cfg(test)]
    pub fn requested_page_size(&self) -> Option<u32> {
        self.page_size
    }

    /// Query-string pairs, left unencoded for the HTTP client to escape
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(field, value)| (format!("filter[{}]", field), value.clone()))
            .collect();

        if let Some(page) = self.page {
            params.push(("page".to_string(), page.to_string()));
        }
        if let Some(size) = self.page_size {
            params.push(("page_size".to_string(), size.to_string()));
        }

        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_params() {
        let query = ListQuery::new().filter("sku", "AB-1").page_size(1);

        assert_eq!(
            query.to_params(),
            vec![
                ("filter[sku]".to_string(), "AB-1".to_string()),
                ("page_size".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_paging_params() {
        let query = ListQuery::new().page(3).page_size(100);

        assert_eq!(query.current_page(), 3);
        assert_eq!(
            query.to_params(),
            vec![
                ("page".to_string(), "3".to_string()),
                ("page_size".to_string(), "100".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_page_is_first() {
        assert_eq!(ListQuery::new().current_page(), 1);
        assert!(ListQuery::new().to_params().is_empty());
    }
}
