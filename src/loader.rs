//! Loads dep sources from disk into a registry
//!
//! Each source is a directory walked for `*.toml` dep files. A file that
//! can't be read, parsed or validated is reported and skipped; a dep name
//! defined twice in one source is a configuration error and stops loading.
//!
//! Hook commands run through `sh -c`. For met? an exit of 0 means met and
//! anything else unmet; for the other hooks anything but 0 is an error.
//! Exit 75 (`EX_TEMPFAIL`) from any hook marks the dep unmeetable, with
//! stderr as the reason.

use crate::config::SourceConfig;
use crate::schema::{DepFile, DepSpec};
use anyhow::{Context, Result};
use depkit::{
    CommandOptions, CommandOutput, DepDefinition, Hook, HookContext, HookKind, Outcome, Registry,
    Version, VersionSpec,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Exit status a hook command uses to say "can't be fixed automatically"
pub const EX_TEMPFAIL: i32 = 75;

/// A dep file that was skipped
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid dep in {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Result of loading every configured source
#[derive(Debug, Default)]
pub struct Loaded {
    pub registry: Registry,
    /// Files skipped because of errors
    pub errors: Vec<LoadError>,
    /// Source name, directory and number of deps loaded from it
    pub sources: Vec<(String, PathBuf, usize)>,
}

/// Load all sources, in order
pub fn load_sources(sources: &[SourceConfig]) -> Result<Loaded> {
    let mut loaded = Loaded::default();
    for source in sources {
        let dir = source.expanded_path();
        let count = load_source(&mut loaded.registry, &source.name, &dir, &mut loaded.errors)?;
        loaded.sources.push((source.name.clone(), dir, count));
    }
    Ok(loaded)
}

/// Load one source directory into `registry`, returning how many deps it added
pub fn load_source(
    registry: &mut Registry,
    name: &str,
    dir: &Path,
    errors: &mut Vec<LoadError>,
) -> Result<usize> {
    registry.add_source(name);
    if !dir.is_dir() {
        log::warn!("source '{}' has no directory at {}", name, dir.display());
        return Ok(0);
    }

    let mut count = 0;
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "toml"))
    {
        let definitions = match load_file(entry.path()) {
            Ok(definitions) => definitions,
            Err(e) => {
                log::warn!("skipping {}: {}", entry.path().display(), e);
                errors.push(e);
                continue;
            }
        };
        for definition in definitions {
            registry
                .register_in(name, definition)
                .with_context(|| format!("while loading {}", entry.path().display()))?;
            count += 1;
        }
    }

    log::info!("loaded {} dep(s) from source '{}'", count, name);
    Ok(count)
}

/// Parse and validate one dep file
pub fn load_file(path: &Path) -> Result<Vec<DepDefinition>, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: DepFile = toml::from_str(&content).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    file.dep
        .into_iter()
        .map(|(name, spec)| {
            spec.validate(&name).map_err(|e| LoadError::Invalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            Ok(definition(&name, &spec))
        })
        .collect()
}

/// Build a definition whose hooks run the dep's shell commands
pub fn definition(name: &str, spec: &DepSpec) -> DepDefinition {
    let mut builder = DepDefinition::builder(name);
    if let Some(description) = &spec.description {
        builder = builder.description(description.as_str());
    }
    if let Some(template) = &spec.template {
        builder = builder.template(template);
    }
    builder = builder.params(spec.params.iter().map(|p| p.to_spec()));
    for requirement in &spec.requires {
        builder = builder.requires(requirement.to_spec());
    }
    for requirement in &spec.requires_when_unmet {
        builder = builder.requires_when_unmet(requirement.to_spec());
    }

    let commands = [
        (HookKind::Setup, &spec.setup),
        (HookKind::Met, &spec.met),
        (HookKind::Prepare, &spec.prepare),
        (HookKind::Before, &spec.before),
        (HookKind::Meet, &spec.meet),
        (HookKind::After, &spec.after),
    ];
    for (kind, command) in commands {
        if let Some(command) = command {
            let sudo = spec.sudo && kind == HookKind::Meet;
            builder = builder.hook(kind, command_hook(kind, command.clone(), sudo));
        }
    }

    if let (Some(command), Some(version)) = (&spec.version_command, &spec.version) {
        builder = builder.hook(HookKind::Met, version_hook(command.clone(), version.clone()));
    }

    builder.build()
}

/// A hook that runs an interpolated shell command
fn command_hook(kind: HookKind, command: String, sudo: bool) -> Hook {
    Arc::new(move |ctx: &mut HookContext<'_, '_>| {
        let line = ctx.interpolate(&command)?;
        let options = CommandOptions {
            sudo,
            ..Default::default()
        };
        let output = ctx.run_with(&line, &options)?;
        Ok(classify(kind, &line, &output))
    })
}

/// A met? hook that compares the installed version against a requirement
fn version_hook(command: String, version: String) -> Hook {
    Arc::new(move |ctx: &mut HookContext<'_, '_>| {
        let wanted = VersionSpec::parse(&ctx.interpolate(&version)?)?;
        let line = ctx.interpolate(&command)?;
        let output = ctx.run(&line)?;
        if !output.success {
            return Ok(classify(HookKind::Met, &line, &output));
        }

        let text = format!("{}\n{}", output.stdout_str(), output.stderr_str());
        let Some(installed) = Version::extract(&text) else {
            ctx.log(&format!("no version found in output of `{line}`"));
            return Ok(Outcome::Unmet);
        };
        let ok = wanted.matches(&installed);
        log::debug!("{}: found {installed}, want {wanted}", ctx.dep_name());
        if !ok {
            ctx.log(&format!("found {installed}, want {wanted}"));
        }
        Ok(ok.into())
    })
}

/// Map a command's exit status to a hook outcome
fn classify(kind: HookKind, line: &str, output: &CommandOutput) -> Outcome {
    if output.success {
        return Outcome::Success;
    }
    let stderr = output.stderr_str();
    let stderr = stderr.trim();

    if output.code == Some(EX_TEMPFAIL) {
        return Outcome::unmeetable(if stderr.is_empty() {
            format!("`{line}` reported it can't be met")
        } else {
            stderr.to_string()
        });
    }
    if kind == HookKind::Met {
        return Outcome::Unmet;
    }

    let status = output
        .code
        .map_or_else(|| "a signal".to_string(), |c| format!("status {c}"));
    if stderr.is_empty() {
        Outcome::error(format!("`{line}` exited with {status}"))
    } else {
        Outcome::error(format!("`{line}` exited with {status}: {stderr}"))
    }
}
