//! Application state shared across handlers

use std::sync::Arc;

use crate::cache::AvailabilityCache;
use crate::service::AllocationService;

/// Application state shared across handlers
pub struct AppState<S> {
    pub service: Arc<AllocationService<S>>,
    pub cache: Option<AvailabilityCache>,
}

impl<S> AppState<S> {
    pub fn new(service: AllocationService<S>, cache: Option<AvailabilityCache>) -> Self {
        Self {
            service: Arc::new(service),
            cache,
        }
    }
}

// Manual impl: the store itself need not be `Clone`.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache: self.cache.clone(),
        }
    }
}
