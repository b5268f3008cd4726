pub mod business;
pub mod connection;
pub mod job;
pub mod marketplace;
pub mod profile;
pub mod user;
