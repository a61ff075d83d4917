pub mod types;
pub mod error;
pub mod config;
pub mod router;
pub mod request;
pub mod key;
pub mod store;
pub mod s3;
pub mod image_processing;
pub mod video_thumbnail;
pub mod delivery;
pub mod response;
pub mod pipeline;

use config::AppConfig;
use std::sync::Arc;
use store::BlobStore;
use video_thumbnail::FrameExtractor;

/// Shared application state, built once per cold start
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn BlobStore>,
    pub frames: Arc<dyn FrameExtractor>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn BlobStore>,
        frames: Arc<dyn FrameExtractor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            frames,
        })
    }
}
