pub mod health_checker;
pub mod http;
pub mod http_client;
pub mod http_handler;

pub use http_client::PooledHttpClient;
