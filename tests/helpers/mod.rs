#![allow(dead_code)]

pub mod app;

use std::fs;
use std::path::Path;

/// Writes `len` zero bytes to `path`, creating parent directories.
pub fn write_file(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![0u8; len]).unwrap();
}
