pub mod relay;
pub mod sweeper;
pub mod http;
