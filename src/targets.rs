// src/targets.rs

//! Products selected for a run

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read a newline-separated product list, ignoring blank lines and `#` comments
pub fn read_targets(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::NotFound(format!("Targets file {}: {e}", path.display()))
    })?;
    Ok(parse_targets(&content))
}

pub fn parse_targets(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Explicit names win over the targets file; an empty selection is an error
pub fn select(explicit: &[String], file: &Path) -> Result<Vec<String>> {
    let targets = if explicit.is_empty() {
        read_targets(file)?
    } else {
        explicit.to_vec()
    };
    if targets.is_empty() {
        return Err(Error::ConfigError("No products selected".to_string()));
    }
    Ok(targets)
}
