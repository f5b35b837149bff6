pub mod client;
pub mod http;
pub mod types;

pub use client::{GraphClient, GraphError};
pub use http::HttpGraphClient;
pub use types::{AppRole, BearerToken, UserIdentity};
