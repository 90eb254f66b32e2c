//! Payload argument handling.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// Resolves a payload argument.
///
/// `-` reads stdin, `@path` reads a file, anything else is taken verbatim.
pub fn read_payload(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read payload from stdin")?;
        return Ok(buf);
    }
    match arg.strip_prefix('@') {
        Some(path) => read_file(Path::new(path)),
        None => Ok(arg.to_string()),
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read payload file {}", path.display()))
}
