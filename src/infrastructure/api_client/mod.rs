//! Admin API client

mod http_client;

pub use http_client::HttpAdminApi;
