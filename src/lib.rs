//! Civic Dispatch: notification dispatch and inbound correlation for
//! civic service requests.

pub mod channels;
pub mod config;
pub mod deps;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod inbound;
pub mod logging;
pub mod model;
pub mod requests;
pub mod store;
pub mod templates;
pub mod web;
