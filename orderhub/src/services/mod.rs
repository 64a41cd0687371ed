mod listing_service;

pub use listing_service::{
    ListingError, ListingRequest, ListingService, MonthlyCount, OrderListing,
};
