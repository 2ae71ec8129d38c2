//! Handlers 模块

pub mod metrics;
pub mod stream;

pub use metrics::*;
pub use stream::*;
