// Product catalog, requests for quotes and orders between businesses.

pub mod handlers;
pub mod models;
pub mod orders;
pub mod products;
pub mod rfqs;
