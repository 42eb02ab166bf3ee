use crate::console::ConsoleMessage;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Callback receiving every console message a page emits.
pub type ConsoleSink = Arc<dyn Fn(ConsoleMessage) + Send + Sync>;

/// The slice of a browser page the fixtures drive.
///
/// Implement this over whatever browser automation the suite uses. Driver
/// failures (selector not found, navigation error) should come back as
/// [`crate::FixtureError::Browser`].
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate to an absolute URL.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Type `value` into the element matching `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Register `sink` for all console messages from now on.
    fn on_console(&self, sink: ConsoleSink);
}
