//! Backend clients

mod http;

pub use http::HttpBackend;
