mod chromium;
mod engine;
mod error;
mod pool;

pub use chromium::{ChromiumEngine, ChromiumHandle, ChromiumSession};
pub use engine::{BrowserEngine, BrowserHandle, PageSession};
pub use error::{BrowserError, BrowserResult};
pub use pool::BrowserPool;
