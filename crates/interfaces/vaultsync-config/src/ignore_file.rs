use camino::Utf8Path;

use crate::settings::ConfigError;
use crate::DEFAULT_EXCLUDES;

/// One pattern per line. Blank lines and `#` comments are dropped; patterns
/// are otherwise taken literally.
pub fn parse_ignore_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_ignore_file(path: &Utf8Path) -> Result<Vec<String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    Ok(parse_ignore_list(&text))
}

/// Defaults, then configured excludes, then the ignore file.
pub fn merged_patterns(
    excludes: &[String],
    ignore_file: Option<&Utf8Path>,
) -> Result<Vec<String>, ConfigError> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(excludes.iter().cloned());
    if let Some(path) = ignore_file {
        patterns.extend(load_ignore_file(path)?);
    }
    Ok(patterns)
}
