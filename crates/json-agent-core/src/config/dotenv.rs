//! `.env` file loading
//!
//! Format: one `KEY=value` per line. Blank lines and lines starting with `#`
//! are skipped, an optional leading `export ` is accepted, and values may be
//! wrapped in single or double quotes. Double-quoted values expand `\n`,
//! `\t` and `\r`.

use std::path::Path;

use super::ConfigError;

/// Parse `.env` content into ordered key/value pairs
pub fn parse_dotenv(path: &Path, content: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut entries = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some(eq_pos) = line.find('=') else {
            return Err(ConfigError::InvalidLine {
                path: path.to_path_buf(),
                line: index + 1,
                content: raw.to_string(),
            });
        };

        let key = line[..eq_pos].trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidLine {
                path: path.to_path_buf(),
                line: index + 1,
                content: raw.to_string(),
            });
        }

        entries.push((key.to_string(), unquote(line[eq_pos + 1..].trim())));
    }

    Ok(entries)
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value[1..value.len() - 1]
            .replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\r", "\r")
            .replace("\\\"", "\"");
    }

    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }

    // Trailing comments only on unquoted values
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

/// Load `path` into the process environment.
///
/// Variables that are already set are left untouched. A missing file is not
/// an error. Returns the number of variables that were set.
pub fn load_dotenv(path: &Path) -> Result<usize, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut applied = 0;
    for (key, value) in parse_dotenv(path, &content)? {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
            applied += 1;
        }
    }

    Ok(applied)
}
