use std::collections::VecDeque;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::diff::apply_unified_diff;
use crate::manifest::PatchManifest;

/// Produces a complete target version tree from the currently installed
/// tree plus an extracted patch payload:
///
/// 1. copy every file from `source_dir` into `target_dir`;
/// 2. delete every `deleted_files` path from the target;
/// 3. copy every `new_files` path verbatim from `payload_dir`;
/// 4. apply each `patched_files` unified diff in place.
///
/// Any single failure aborts the whole application; the caller discards the
/// partially built target directory.
pub fn apply_patch(
    source_dir: &Path,
    payload_dir: &Path,
    target_dir: &Path,
    manifest: &PatchManifest,
) -> Result<()> {
    copy_dir_recursive(source_dir, target_dir)?;

    for deleted in &manifest.deleted_files {
        let rel = validated_relative_path(deleted)?;
        let path = target_dir.join(rel);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to delete patched-out file: {}", path.display()))?;
        } else {
            debug!(path = %path.display(), "deleted file already absent");
        }
    }

    for added in &manifest.new_files {
        let rel = validated_relative_path(added)?;
        let from = payload_dir.join(rel);
        if !from.is_file() {
            return Err(anyhow!(
                "patch payload missing declared new file: {}",
                from.display()
            ));
        }
        let to = target_dir.join(rel);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(&from, &to).with_context(|| {
            format!("failed to copy new file {} to {}", from.display(), to.display())
        })?;
    }

    for (patched, diff) in &manifest.patched_files {
        let rel = validated_relative_path(patched)?;
        let path = target_dir.join(rel);
        let original = fs::read_to_string(&path)
            .with_context(|| format!("failed to read file to patch: {}", path.display()))?;
        let updated = apply_unified_diff(&original, diff)
            .with_context(|| format!("failed to apply text patch to '{patched}'"))?;
        fs::write(&path, updated.as_bytes())
            .with_context(|| format!("failed to write patched file: {}", path.display()))?;
    }

    Ok(())
}

fn validated_relative_path(path: &str) -> Result<&Path> {
    let relative = Path::new(path);
    if path.is_empty() {
        return Err(anyhow!("patch manifest path must not be empty"));
    }
    if relative.is_absolute() {
        return Err(anyhow!("patch manifest path must be relative: {path}"));
    }
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(anyhow!("patch manifest path must not escape the tree: {path}"));
    }
    Ok(relative)
}

fn copy_dir_recursive(source_root: &Path, destination_root: &Path) -> Result<()> {
    if !source_root.is_dir() {
        return Err(anyhow!(
            "patch source is not a directory: {}",
            source_root.display()
        ));
    }
    fs::create_dir_all(destination_root).with_context(|| {
        format!(
            "failed creating patch target directory {}",
            destination_root.display()
        )
    })?;

    let mut queue: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
    queue.push_back((source_root.to_path_buf(), destination_root.to_path_buf()));

    while let Some((from_dir, to_dir)) = queue.pop_front() {
        for entry in fs::read_dir(&from_dir)
            .with_context(|| format!("failed reading source directory {}", from_dir.display()))?
        {
            let entry = entry?;
            let from_path = entry.path();
            let to_path = to_dir.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                fs::create_dir_all(&to_path)
                    .with_context(|| format!("failed creating directory {}", to_path.display()))?;
                queue.push_back((from_path, to_path));
            } else if file_type.is_file() {
                fs::copy(&from_path, &to_path).with_context(|| {
                    format!(
                        "failed copying file from {} to {}",
                        from_path.display(),
                        to_path.display()
                    )
                })?;
            }
        }
    }

    Ok(())
}
