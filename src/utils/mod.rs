pub mod logging;
pub mod retry;

pub use retry::{retry_async, retry_async_if, RetryPolicy};
