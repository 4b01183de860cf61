//! `tend sources`: show where deps are loaded from

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::config::Config;
use crate::ui;

pub fn run(_ctx: &Context, config: &Config) -> Result<()> {
    let loaded = super::load(config)?;

    ui::header("Sources");
    for (name, path, count) in &loaded.sources {
        let status = if path.is_dir() {
            "✓".green()
        } else {
            "✗".yellow()
        };
        println!(
            "  {} {} {}",
            status,
            name.bold(),
            format!("({count} deps)").dimmed()
        );
        println!("    {}", path.display().to_string().dimmed());
    }
    if !loaded.errors.is_empty() {
        println!();
        ui::kv("Skipped files", &loaded.errors.len().to_string());
    }
    Ok(())
}
