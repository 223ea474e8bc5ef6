//! Shared application state.

use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::System;

use crate::adapter::ModelAdapter;
use crate::limiter::RequestLimiter;

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<dyn ModelAdapter>,
    pub limiter: RequestLimiter,
    pub(crate) system: Arc<Mutex<System>>,
}

impl AppState {
    pub fn new(adapter: Arc<dyn ModelAdapter>, limiter: RequestLimiter) -> Self {
        Self {
            adapter,
            limiter,
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}
