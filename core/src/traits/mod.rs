pub mod fetch;

pub use fetch::{Fetcher, HttpFetcher, RequestError};
