use crate::event::CallerInfo;
use std::sync::{Arc, RwLock};

/// Latest known foreground caller identity.
///
/// Written only from the controller's consumer loop; readers get an
/// immutable `Arc` snapshot and never a live handle.
#[derive(Clone, Default)]
pub struct CallerInfoCache {
    inner: Arc<RwLock<Option<Arc<CallerInfo>>>>,
}

impl CallerInfoCache {
    pub fn update(&self, snapshot: Arc<CallerInfo>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = Some(snapshot);
    }

    pub fn current(&self) -> Option<Arc<CallerInfo>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.take();
    }
}
