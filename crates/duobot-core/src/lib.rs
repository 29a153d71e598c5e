pub mod error;
pub mod types;
pub mod config;
pub mod session;
pub mod routing;
pub mod provider;
pub mod twiml;
pub mod service;
pub mod util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
