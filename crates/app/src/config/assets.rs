//! Assets Config

use std::path::PathBuf;

use clap::Args;

/// Uploaded file storage settings.
#[derive(Debug, Args)]
pub(crate) struct AssetsConfig {
    /// Directory holding uploaded files
    #[arg(long, env = "ASSETS_ROOT", default_value = "uploads")]
    pub assets_root: PathBuf,
}
