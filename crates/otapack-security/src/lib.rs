mod checksum;

pub use checksum::{digests_match, sha256_file_hex, sha256_hex, verify_sha256_file};

#[cfg(test)]
mod tests;
