//! Registry of administrative orders: paginated listings per date window,
//! filtered search, monthly statistics and a small web UI over SQLite.

mod config;
mod database;
pub mod date_window;
mod models;
pub mod pagination;
mod search;
mod services;
mod store;
mod web;

pub use config::{Config, ListingConfig};
pub use database::{Database, DatabaseError};
pub use date_window::DateWindow;
pub use models::{
    CreateLookupRequest, CreateOrderRequest, CreateUserRequest, LookupEntry, LookupKind, Order,
    OrderFilter, UpdateOrderRequest, User,
};
pub use pagination::{PageLink, Pagination};
pub use search::{OrderQuery, Page};
pub use services::{ListingError, ListingRequest, ListingService, MonthlyCount, OrderListing};
pub use store::OrderStore;
pub use web::{AppState, app, routes};
