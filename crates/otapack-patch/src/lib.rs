mod apply;
mod diff;
mod manifest;

pub use apply::apply_patch;
pub use diff::{apply_unified_diff, PatchError};
pub use manifest::PatchManifest;

#[cfg(test)]
mod tests;
