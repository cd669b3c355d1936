// Library exports for postfeed
// This allows integration tests to build the router and drive the services

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod routes;
pub mod state;
