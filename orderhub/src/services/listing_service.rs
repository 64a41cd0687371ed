use std::{fmt, future::Future, time::Duration};

use serde::Serialize;
use tokio::time::{Instant, timeout_at};

use crate::{
    config::ListingConfig,
    database::{self, DatabaseError},
    date_window::{DateWindow, monthly_windows_for_year},
    models::{Order, OrderFilter},
    pagination::{PageLink, Pagination},
    search::Page,
    store::OrderStore,
};

#[derive(Debug)]
pub enum ListingError {
    Store(DatabaseError),
    DeadlineExceeded(Duration),
    InvalidYear(i32),
}

impl fmt::Display for ListingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingError::Store(err) => write!(f, "Failed to load orders: {}", err),
            ListingError::DeadlineExceeded(limit) => {
                write!(f, "Order store did not answer within {:?}", limit)
            }
            ListingError::InvalidYear(year) => write!(f, "Year {} is out of range", year),
        }
    }
}

impl std::error::Error for ListingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListingError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DatabaseError> for ListingError {
    fn from(err: DatabaseError) -> Self {
        ListingError::Store(err)
    }
}

/// What the viewer asked for: a window, an offset and, for searches, the
/// submitted filter.
#[derive(Debug, Clone)]
pub struct ListingRequest {
    pub window: DateWindow,
    pub start: i64,
    pub viewer: String,
    pub is_admin: bool,
    pub filter: Option<OrderFilter>,
}

/// Everything a listing page renders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderListing {
    pub orders: Vec<Order>,
    pub pagination_links: Vec<PageLink>,
    pub next_offset: i64,
    pub previous_offset: i64,
    pub next_disabled: bool,
    pub previous_disabled: bool,
    pub total_count: i64,
    pub window: DateWindow,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyCount {
    pub window: DateWindow,
    pub count: i64,
}

#[derive(Clone)]
pub struct ListingService<S> {
    store: S,
    config: ListingConfig,
}

impl<S: OrderStore> ListingService<S> {
    pub fn new(store: S, config: ListingConfig) -> Self {
        Self { store, config }
    }

    /// Loads one page of orders and the links around it.
    ///
    /// A plain listing shows a non-admin viewer only their own orders. A search
    /// covers every order and is paginated the same way as the plain listing.
    pub async fn list_orders(&self, request: &ListingRequest) -> Result<OrderListing, ListingError> {
        let deadline = Instant::now() + self.config.request_timeout;
        let start = request.start.max(0);
        let page = Page::new(self.config.page_size, start);
        let window = &request.window;

        let (total_count, orders) = match &request.filter {
            Some(filter) => {
                let total = self
                    .within(deadline, self.store.count_search_orders(window, filter))
                    .await?;
                let orders = self
                    .within(deadline, self.store.search_orders(window, filter, Some(page)))
                    .await?;
                (total, orders)
            }
            None => {
                let owner = (!request.is_admin).then_some(request.viewer.as_str());
                let total = self
                    .within(deadline, self.store.count_orders_in_window(window, owner))
                    .await?;
                let orders = self
                    .within(deadline, self.store.list_orders_page(window, page, owner))
                    .await?;
                (total, orders)
            }
        };

        let pagination = Pagination::compute(
            self.config.page_size,
            total_count,
            self.config.link_window,
            start,
        );

        tracing::debug!(
            viewer = request.viewer.as_str(),
            window = %window,
            start,
            total_count,
            search = request.filter.is_some(),
            "Listed orders"
        );

        Ok(OrderListing {
            orders,
            pagination_links: pagination.links,
            next_offset: pagination.next_offset,
            previous_offset: pagination.previous_offset,
            next_disabled: pagination.next_is_active,
            previous_disabled: pagination.previous_is_active,
            total_count,
            window: *window,
            is_admin: request.is_admin,
        })
    }

    /// Orders registered in each month of `year`.
    pub async fn monthly_counts(
        &self,
        year: i32,
        owner: Option<&str>,
    ) -> Result<Vec<MonthlyCount>, ListingError> {
        let windows = monthly_windows_for_year(year).ok_or(ListingError::InvalidYear(year))?;
        let deadline = Instant::now() + self.config.request_timeout;
        let mut counts = Vec::with_capacity(windows.len());

        for window in windows {
            let count = self
                .within(deadline, self.store.count_orders_in_window(&window, owner))
                .await?;
            counts.push(MonthlyCount { window, count });
        }

        Ok(counts)
    }

    async fn within<T>(
        &self,
        deadline: Instant,
        call: impl Future<Output = database::Result<T>>,
    ) -> Result<T, ListingError> {
        match timeout_at(deadline, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ListingError::DeadlineExceeded(self.config.request_timeout)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::date_window::full_year_window;

    /// In-memory `OrderStore` mirroring the SQLite semantics.
    #[derive(Clone, Default)]
    pub struct FakeStore {
        pub orders: Vec<Order>,
        pub delay: Option<Duration>,
    }

    impl FakeStore {
        async fn matching(
            &self,
            window: &DateWindow,
            owner: Option<&str>,
            filter: &OrderFilter,
        ) -> Vec<Order> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut orders: Vec<Order> = self
                .orders
                .iter()
                .filter(|o| window.contains(o.reg_date))
                .filter(|o| owner.is_none_or(|owner| o.author == owner))
                .filter(|o| filter.matches(o))
                .cloned()
                .collect();
            orders.sort_by(|a, b| b.reg_date.cmp(&a.reg_date).then(b.id.cmp(&a.id)));
            orders
        }
    }

    fn paged(orders: Vec<Order>, page: Option<Page>) -> Vec<Order> {
        match page {
            Some(page) => orders
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect(),
            None => orders,
        }
    }

    impl OrderStore for FakeStore {
        async fn count_orders_in_window(
            &self,
            window: &DateWindow,
            owner: Option<&str>,
        ) -> database::Result<i64> {
            Ok(self.matching(window, owner, &OrderFilter::default()).await.len() as i64)
        }

        async fn list_orders_page(
            &self,
            window: &DateWindow,
            page: Page,
            owner: Option<&str>,
        ) -> database::Result<Vec<Order>> {
            let orders = self.matching(window, owner, &OrderFilter::default()).await;
            Ok(paged(orders, Some(page)))
        }

        async fn search_orders(
            &self,
            window: &DateWindow,
            filter: &OrderFilter,
            page: Option<Page>,
        ) -> database::Result<Vec<Order>> {
            Ok(paged(self.matching(window, None, filter).await, page))
        }

        async fn count_search_orders(
            &self,
            window: &DateWindow,
            filter: &OrderFilter,
        ) -> database::Result<i64> {
            Ok(self.matching(window, None, filter).await.len() as i64)
        }
    }

    pub fn order(id: i64, reg_date: NaiveDate, author: &str, kind_of_doc: &str) -> Order {
        Order {
            id,
            doc_type: "приказ".to_string(),
            kind_of_doc: kind_of_doc.to_string(),
            doc_label: "ДСП".to_string(),
            reg_date,
            reg_number: id.to_string(),
            description: "О работе в ГИС ОГ".to_string(),
            author: author.to_string(),
            file_original: String::new(),
            file_copy: String::new(),
            current: true,
        }
    }

    /// 110 orders in 2023 (every third one by "petrov"), 5 in 2022.
    fn store() -> FakeStore {
        let mut orders = Vec::new();
        let first = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        for i in 0..110 {
            let author = if i % 3 == 0 { "petrov" } else { "ivanova" };
            let kind = if i % 2 == 0 { "По личному составу" } else { "По основной деятельности" };
            orders.push(order(i + 1, first + chrono::Days::new(i as u64 * 3), author, kind));
        }
        for i in 0..5 {
            let date = NaiveDate::from_ymd_opt(2022, 6, i + 1).unwrap();
            orders.push(order(200 + i as i64, date, "ivanova", "По личному составу"));
        }
        FakeStore { orders, delay: None }
    }

    fn request(start: i64, is_admin: bool, filter: Option<OrderFilter>) -> ListingRequest {
        ListingRequest {
            window: full_year_window(2023).unwrap(),
            start,
            viewer: "petrov".to_string(),
            is_admin,
            filter,
        }
    }

    #[tokio::test]
    async fn test_admin_listing_first_page() {
        let service = ListingService::new(store(), ListingConfig::default());
        let listing = service.list_orders(&request(0, true, None)).await.unwrap();

        assert_eq!(listing.total_count, 110);
        assert_eq!(listing.orders.len(), 7);
        assert!(listing.orders.windows(2).all(|w| w[0].reg_date >= w[1].reg_date));
        assert_eq!(
            listing.pagination_links.iter().map(|l| l.offset).collect::<Vec<_>>(),
            vec![0, 7, 14, 21, 28]
        );
        assert!(listing.previous_disabled);
        assert!(!listing.next_disabled);
        assert!(listing.is_admin);
    }

    #[tokio::test]
    async fn test_admin_listing_deep_page() {
        let service = ListingService::new(store(), ListingConfig::default());
        let listing = service.list_orders(&request(98, true, None)).await.unwrap();

        assert_eq!(
            listing.pagination_links.iter().map(|l| l.page_number).collect::<Vec<_>>(),
            vec![11, 12, 13, 14, 15]
        );
        assert_eq!(listing.next_offset, 105);
        assert_eq!(listing.previous_offset, 91);
        assert!(!listing.next_disabled);
        assert!(!listing.previous_disabled);
        assert_eq!(listing.orders.len(), 7);
    }

    #[tokio::test]
    async fn test_non_admin_sees_own_orders() {
        let service = ListingService::new(store(), ListingConfig::default());
        let listing = service.list_orders(&request(0, false, None)).await.unwrap();

        assert_eq!(listing.total_count, 37);
        assert!(listing.orders.iter().all(|o| o.author == "petrov"));
        assert_eq!(listing.pagination_links.len(), 5);
    }

    #[tokio::test]
    async fn test_search_is_paginated_and_filtered() {
        let service = ListingService::new(store(), ListingConfig::default());
        let filter = OrderFilter {
            kind_of_doc: "По личному составу".to_string(),
            ..Default::default()
        };
        let listing = service
            .list_orders(&request(49, false, Some(filter)))
            .await
            .unwrap();

        assert_eq!(listing.total_count, 55);
        assert_eq!(listing.orders.len(), 6);
        assert!(listing.orders.iter().all(|o| o.kind_of_doc == "По личному составу"
            && full_year_window(2023).unwrap().contains(o.reg_date)));
        assert!(listing.next_disabled);
        assert_eq!(listing.pagination_links.last().map(|l| l.page_number), Some(8));
    }

    #[tokio::test]
    async fn test_empty_filter_search_equals_plain_listing() {
        let service = ListingService::new(store(), ListingConfig::default());
        let plain = service.list_orders(&request(14, true, None)).await.unwrap();
        let search = service
            .list_orders(&request(14, true, Some(OrderFilter::default())))
            .await
            .unwrap();

        assert_eq!(plain.orders, search.orders);
        assert_eq!(plain.total_count, search.total_count);
    }

    #[tokio::test]
    async fn test_empty_window() {
        let service = ListingService::new(store(), ListingConfig::default());
        let mut req = request(0, true, None);
        req.window = full_year_window(2030).unwrap();
        let listing = service.list_orders(&req).await.unwrap();

        assert!(listing.orders.is_empty());
        assert!(listing.pagination_links.is_empty());
        assert!(listing.next_disabled);
        assert!(listing.previous_disabled);
    }

    #[tokio::test]
    async fn test_monthly_counts() {
        let service = ListingService::new(store(), ListingConfig::default());
        let counts = service.monthly_counts(2023, None).await.unwrap();

        assert_eq!(counts.len(), 12);
        assert_eq!(counts.iter().map(|c| c.count).sum::<i64>(), 110);
        assert_eq!(counts[0].count, 11);

        let counts = service.monthly_counts(2022, None).await.unwrap();
        assert_eq!(counts[5].count, 5);
    }

    #[tokio::test]
    async fn test_offset_past_the_end() {
        let service = ListingService::new(store(), ListingConfig::default());
        let listing = service
            .list_orders(&request(i64::MAX, true, None))
            .await
            .unwrap();

        assert!(listing.orders.is_empty());
        assert_eq!(listing.total_count, 110);
        assert_eq!(listing.pagination_links.first().map(|l| l.page_number), Some(1));
        assert!(listing.next_disabled);
    }

    #[tokio::test]
    async fn test_monthly_counts_rejects_unrepresentable_year() {
        let service = ListingService::new(store(), ListingConfig::default());

        for year in [i32::MAX, 300_000] {
            let result = service.monthly_counts(year, None).await;
            assert!(matches!(result, Err(ListingError::InvalidYear(y)) if y == year));
        }
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let mut slow = store();
        slow.delay = Some(Duration::from_millis(200));
        let config = ListingConfig {
            request_timeout: Duration::from_millis(10),
            ..ListingConfig::default()
        };
        let service = ListingService::new(slow, config);

        let result = service.list_orders(&request(0, true, None)).await;
        assert!(matches!(result, Err(ListingError::DeadlineExceeded(_))));
    }
}
