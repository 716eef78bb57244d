use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mm_domain::config::Config;
use mm_store::FsMediaStore;

use crate::runtime::Pipeline;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    /// Serves `GET /media/*key`; the same store the pipeline writes to.
    pub media: Arc<FsMediaStore>,
    /// Channel secret for webhook signatures.  `None` = dev mode (no
    /// signature check).
    pub channel_secret: Option<Arc<[u8]>>,
    /// Cancelled on shutdown; every turn runs under a child token.
    pub shutdown: CancellationToken,
}
