//! Stateless filename helpers: sanitizing, collision avoidance, and the
//! basename template applied to downloaded OCR artifacts.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Maximum basename length applied when the caller does not override it.
pub const DEFAULT_MAX_BASENAME_LEN: usize = 150;

/// Characters rejected by at least one common filesystem.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Device names Windows refuses regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("failed to read rename map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse rename map {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Sanitize `name` with the default replacement (`_`) and length cap.
pub fn sanitize(name: &str) -> String {
    sanitize_with(name, "_", DEFAULT_MAX_BASENAME_LEN)
}

/// Turn an arbitrary string into a filesystem-safe basename.
///
/// Illegal and control characters are replaced, trailing whitespace and dots
/// are trimmed, an empty result becomes `untitled`, reserved device names are
/// prefixed with an underscore, and the result is truncated to `max_len`
/// characters while keeping the extension intact. Deterministic, no I/O.
pub fn sanitize_with(name: &str, replacement: &str, max_len: usize) -> String {
    let max_len = max_len.max(1);

    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        if ILLEGAL_CHARS.contains(&ch) || ch.is_control() {
            cleaned.push_str(replacement);
        } else {
            cleaned.push(ch);
        }
    }

    let mut result = trim_trailing(&cleaned);
    if result.is_empty() {
        result = "untitled".to_string();
    }

    if result.chars().count() > max_len {
        result = truncate_preserving_ext(&result, max_len);
        result = trim_trailing(&result);
        if result.is_empty() {
            result = truncate_chars("untitled", max_len);
        }
    }

    let (stem, _) = split_ext(&result);
    if RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        result.insert(0, '_');
        if result.chars().count() > max_len {
            result = truncate_preserving_ext(&result, max_len);
        }
    }

    result
}

/// Return `path` unchanged when free, otherwise append `_1`, `_2`, … before
/// the extension until an unused path is found. The check-then-create race is
/// accepted for single-operator use.
pub fn ensure_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string());
    let (stem, ext) = split_ext(&name);
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut counter = 1u64;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Render the output basename for one result identifier.
///
/// Priority: an explicit rename-map entry (trimmed, non-empty) wins over the
/// template; the template substitutes `{original}`, `{guid}`, and `{index}`
/// (index defaults to 1, original to `guid_<guid>`); an unusable rendering
/// falls back to `{original}_{guid}`. The result always passes through the
/// sanitizer.
pub fn render_basename(
    template: &str,
    guid: u64,
    original: Option<&str>,
    index: Option<usize>,
    rename_map: &RenameMap,
) -> String {
    if let Some(mapped) = rename_map.get(guid) {
        let trimmed = mapped.trim();
        if !trimmed.is_empty() {
            return sanitize(trimmed);
        }
    }

    let original = original
        .map(str::to_string)
        .unwrap_or_else(|| format!("guid_{guid}"));
    let index = index.unwrap_or(1);

    let rendered = template
        .replace("{original}", &original)
        .replace("{guid}", &guid.to_string())
        .replace("{index}", &index.to_string());

    let rendered = if rendered.trim().is_empty() {
        format!("{original}_{guid}")
    } else {
        rendered
    };

    sanitize(&rendered)
}

/// Operator-provided mapping from guid to desired basename, highest priority
/// when naming downloads.
#[derive(Debug, Default, Clone)]
pub struct RenameMap {
    entries: HashMap<String, String>,
}

impl RenameMap {
    /// Load the map from a JSON object file (`{"<guid>": "<basename>"}`).
    pub fn load(path: &Path) -> Result<Self, NamingError> {
        let raw = std::fs::read_to_string(path).map_err(|source| NamingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries = serde_json::from_str(&raw).map_err(|source| NamingError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { entries })
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, guid: u64) -> Option<&str> {
        self.entries.get(&guid.to_string()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `name` into `(stem, extension)` where the extension includes its dot.
/// A leading dot is not treated as an extension separator.
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn trim_trailing(name: &str) -> String {
    name.trim_end_matches(|ch: char| ch.is_whitespace() || ch == '.')
        .to_string()
}

fn truncate_chars(name: &str, max_len: usize) -> String {
    name.chars().take(max_len).collect()
}

fn truncate_preserving_ext(name: &str, max_len: usize) -> String {
    let (stem, ext) = split_ext(name);
    let ext_len = ext.chars().count();
    if ext_len >= max_len {
        return truncate_chars(name, max_len);
    }
    let mut result = truncate_chars(stem, max_len - ext_len);
    result.push_str(ext);
    result
}
