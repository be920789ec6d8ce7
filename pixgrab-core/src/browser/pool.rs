use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::engine::{BrowserEngine, BrowserHandle};
use super::error::BrowserResult;

/// Owns the single shared browser process. At most one live handle exists
/// at any time; create/destroy transitions are serialized by the mutex.
/// Ordinary page operations run outside the lock.
pub struct BrowserPool {
    engine: Box<dyn BrowserEngine>,
    handle: Mutex<Option<Arc<dyn BrowserHandle>>>,
}

impl BrowserPool {
    pub fn new(engine: Box<dyn BrowserEngine>) -> Self {
        Self {
            engine,
            handle: Mutex::new(None),
        }
    }

    /// Launches the shared browser eagerly. Intended to run once at
    /// service start so the first request does not pay the launch cost.
    pub async fn startup(&self) -> BrowserResult<()> {
        self.acquire().await.map(|_| ())
    }

    /// Returns a connected handle, launching or relaunching as needed.
    /// Launch failures propagate: retrying them is the supervisor's call.
    pub async fn acquire(&self) -> BrowserResult<Arc<dyn BrowserHandle>> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            if handle.is_connected() {
                return Ok(Arc::clone(handle));
            }
            warn!("shared browser disconnected; relaunching");
        }
        let handle = self.engine.launch().await?;
        info!("shared browser launched");
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Forcibly tears down the current browser and launches a fresh one.
    /// Used after a detected crash.
    pub async fn recreate(&self) -> BrowserResult<()> {
        let mut guard = self.handle.lock().await;
        if let Some(old) = guard.take() {
            if let Err(err) = old.close().await {
                warn!(error = %err, "failed to close crashed browser");
            }
        }
        let handle = self.engine.launch().await?;
        info!("shared browser recreated");
        *guard = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&self) -> BrowserResult<()> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            handle.close().await?;
            info!("shared browser shut down");
        }
        Ok(())
    }
}
