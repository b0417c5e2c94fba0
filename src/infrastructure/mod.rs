//! Infrastructure layer - admin API client, background polling and services

pub mod api_client;
pub mod logging;
pub mod polling;
pub mod services;
