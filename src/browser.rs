use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::Screenshot;

/// What the engine needs from a browser. One page/session, one caller.
///
/// Implementations return [`BackendError::Fatal`] once the session is
/// unusable; anything else is reported as [`BackendError::Action`].
#[async_trait]
pub trait BrowserBackend: Send {
    async fn screenshot(&mut self) -> Result<Screenshot, BackendError>;

    /// Click at absolute viewport coordinates.
    async fn click(&mut self, x: i32, y: i32) -> Result<(), BackendError>;

    /// Type into whatever element has focus.
    async fn type_text(&mut self, text: &str) -> Result<(), BackendError>;

    async fn press_key(&mut self, key: &str) -> Result<(), BackendError>;

    async fn scroll(&mut self, dx: i64, dy: i64) -> Result<(), BackendError>;

    async fn goto(&mut self, url: &str) -> Result<(), BackendError>;

    async fn go_back(&mut self) -> Result<(), BackendError>;

    async fn refresh(&mut self) -> Result<(), BackendError>;

    async fn wait_for_load(&mut self) -> Result<(), BackendError>;

    async fn current_url(&mut self) -> Result<String, BackendError>;

    /// Give the next task a clean page.
    async fn restart(&mut self) -> Result<(), BackendError>;

    /// Undo pointer movement after a click. Only backends that move the
    /// pointer relatively need this.
    async fn reset_pointer(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
