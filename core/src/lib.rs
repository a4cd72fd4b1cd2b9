pub mod config;
pub mod ext;
pub mod model;
pub mod store;
pub mod state;
pub mod policy;
pub mod cache;
pub mod traits;
pub mod queue;
pub mod context;
pub mod membership;
pub mod auth;
pub mod dispatch;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::Context;
pub use config::Config;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
