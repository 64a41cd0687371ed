//! Persistence port consumed by the listing service.

use std::future::Future;

use crate::{
    database::Result,
    date_window::DateWindow,
    models::{Order, OrderFilter},
    search::Page,
};

pub trait OrderStore: Send + Sync {
    fn count_orders_in_window(
        &self,
        window: &DateWindow,
        owner: Option<&str>,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// One page of orders, newest registration date first.
    fn list_orders_page(
        &self,
        window: &DateWindow,
        page: Page,
        owner: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Order>>> + Send;

    /// Orders in `window` matching every supplied field of `filter`, newest
    /// first. Unbounded when `page` is `None`.
    fn search_orders(
        &self,
        window: &DateWindow,
        filter: &OrderFilter,
        page: Option<Page>,
    ) -> impl Future<Output = Result<Vec<Order>>> + Send;

    fn count_search_orders(
        &self,
        window: &DateWindow,
        filter: &OrderFilter,
    ) -> impl Future<Output = Result<i64>> + Send;
}
