use std::fs;
use std::path::{Component, Path};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

/// Archive extraction seam. Implementations must refuse archives whose
/// entries would land outside `dest_dir` (absolute paths or `..`
/// components); a slipped entry poisons the whole extraction.
pub trait ArchiveCodec: Send + Sync {
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;
}

/// [`ArchiveCodec`] that shells out to the system `unzip`/`tar` tools:
/// list entries first, validate every path, then extract.
#[derive(Debug, Default)]
pub struct SystemArchiveCodec;

impl ArchiveCodec for SystemArchiveCodec {
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let entries = list_entries(archive_path)?;
        for entry in &entries {
            validate_entry_path(entry).with_context(|| {
                format!("refusing to extract {}", archive_path.display())
            })?;
        }
        debug!(
            archive = %archive_path.display(),
            entries = entries.len(),
            "archive listing validated"
        );

        fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;
        extract_validated(archive_path, dest_dir)
    }
}

fn list_entries(archive_path: &Path) -> Result<Vec<String>> {
    let unzip_listing = run_command_capture(
        Command::new("unzip").arg("-Z1").arg(archive_path),
        "failed to list zip archive with unzip",
    );
    let raw = match unzip_listing {
        Ok(raw) => raw,
        Err(_) => run_command_capture(
            Command::new("tar").arg("-tf").arg(archive_path),
            "failed to list archive with tar fallback",
        )?,
    };
    Ok(raw
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn extract_validated(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let mut unzip_command = Command::new("unzip");
    unzip_command
        .arg("-q")
        .arg(archive_path)
        .arg("-d")
        .arg(dest_dir);
    if run_command(&mut unzip_command, "failed to extract archive with unzip").is_ok() {
        return Ok(());
    }

    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dest_dir),
        "failed to extract archive with tar fallback",
    )
}

pub(crate) fn validate_entry_path(entry: &str) -> Result<()> {
    let path = Path::new(entry);
    if path.is_absolute() {
        return Err(anyhow!("archive entry has an absolute path: {entry}"));
    }
    if path
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(anyhow!("archive entry escapes the target directory: {entry}"));
    }
    Ok(())
}

fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    run_command_capture(command, context_message).map(|_| ())
}

fn run_command_capture(command: &mut Command, context_message: &str) -> Result<String> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
