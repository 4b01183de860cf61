pub mod list;
pub mod meet;
pub mod sources;

use crate::config::Config;
use crate::loader::{self, Loaded};
use crate::ui;
use anyhow::Result;

/// Load every configured source, warning about skipped files
pub fn load(config: &Config) -> Result<Loaded> {
    let loaded = loader::load_sources(&config.sources()?)?;
    for error in &loaded.errors {
        ui::warn(&error.to_string());
    }
    Ok(loaded)
}
