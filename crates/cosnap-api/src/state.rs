use std::path::PathBuf;
use std::sync::Arc;

use cosnap_core::Services;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub services: Services,
    pub jwt_secret: String,
    /// Where uploaded images are written.
    pub upload_dir: PathBuf,
    /// Base for the URLs handed back by the upload endpoint, no trailing slash.
    pub public_url: String,
}
