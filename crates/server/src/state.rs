use std::sync::Arc;
use tiling::DetectionService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DetectionService>,
}

impl AppState {
    pub fn new(service: DetectionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
