use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    #[serde(alias = "limit")]
    pub per_page: Option<i64>,
}

/// A normalized page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self { page, per_page }
    }

    pub fn normalize(&self) -> Page {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(6).clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);
        Page {
            page,
            per_page,
            offset,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SubscriptionQuery {
    pub page: Option<i64>,
    #[serde(alias = "limit")]
    pub per_page: Option<i64>,
    pub recipes_limit: Option<u64>,
}

impl SubscriptionQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.per_page)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SubscribeQuery {
    pub recipes_limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IngredientQuery {
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page() {
        let page = Pagination::default().normalize();
        assert_eq!(page, Page { page: 1, per_page: 6, offset: 0 });
    }

    #[test]
    fn clamps_out_of_range_values() {
        let page = Pagination::new(Some(-3), Some(1000)).normalize();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 100);

        let page = Pagination::new(Some(3), Some(10)).normalize();
        assert_eq!(page.offset, 20);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let page = Pagination::new(Some(i64::MAX), Some(6)).normalize();
        assert_eq!(page.page, i64::MAX);
        assert_eq!(page.offset, i64::MAX);

        let (_, pagination) =
            crate::filters::RecipeFilter::from_query(Some("page=9223372036854775807&limit=6"))
                .unwrap();
        assert!(pagination.normalize().offset >= 0);
    }

    #[test]
    fn limit_is_accepted_as_page_size() {
        let pagination: Pagination = serde_urlencoded::from_str("page=2&limit=5").unwrap();
        assert_eq!(pagination.normalize().offset, 5);
    }
}
