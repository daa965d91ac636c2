use crate::{EngineError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

static PATH_HOSTILE_RE: OnceLock<Regex> = OnceLock::new();
static DIGITS_RE: OnceLock<Regex> = OnceLock::new();

fn path_hostile_re() -> &'static Regex {
    PATH_HOSTILE_RE.get_or_init(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("path hostile regex"))
}

/// A normalized search query: the raw text the user typed (sent to the
/// search provider) plus a filesystem-safe identifier used as the storage
/// folder name and as the filename-prefix fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    raw: String,
    sanitized: String,
}

impl Query {
    /// Removes the characters `\ / * ? : " < > |` and nothing else;
    /// whitespace, case, and non-ASCII text are preserved as typed.
    pub fn normalize(raw: &str) -> Result<Self> {
        let sanitized = strip_path_hostile(raw);
        if sanitized.is_empty() {
            return Err(EngineError::InvalidQuery);
        }
        Ok(Self {
            raw: raw.to_string(),
            sanitized,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn sanitized(&self) -> &str {
        &self.sanitized
    }
}

pub fn strip_path_hostile(text: &str) -> String {
    path_hostile_re().replace_all(text, "").into_owned()
}

/// Next free index for `<query><n>.webp` fallback names: one past the
/// largest integer embedded in any existing `.webp` filename in the folder.
pub fn next_sequence_number(folder: &Path) -> usize {
    let digits = DIGITS_RE.get_or_init(|| Regex::new(r"\d+").expect("digits regex"));

    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(_) => return 1,
    };

    let mut max_seen = 0_usize;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.to_ascii_lowercase().ends_with(".webp") {
            continue;
        }
        for found in digits.find_iter(name) {
            if let Ok(value) = found.as_str().parse::<usize>() {
                max_seen = max_seen.max(value);
            }
        }
    }
    max_seen + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_only_path_hostile_characters() {
        let query = Query::normalize(r#"cute? cats/ "indoor" <2024>|*"#).expect("query");
        assert_eq!(query.sanitized(), "cute cats indoor 2024");
        assert_eq!(query.raw(), r#"cute? cats/ "indoor" <2024>|*"#);
    }

    #[test]
    fn normalize_preserves_case_whitespace_and_non_ascii() {
        let query = Query::normalize("Neko 猫  photos").expect("query");
        assert_eq!(query.sanitized(), "Neko 猫  photos");
    }

    #[test]
    fn normalize_rejects_queries_that_sanitize_to_nothing() {
        assert!(matches!(
            Query::normalize(r#"\/*?:"<>|"#),
            Err(EngineError::InvalidQuery)
        ));
        assert!(matches!(Query::normalize(""), Err(EngineError::InvalidQuery)));
    }

    #[test]
    fn next_sequence_number_continues_after_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cats1.webp"), b"x").expect("write");
        std::fs::write(dir.path().join("cats12.webp"), b"x").expect("write");
        std::fs::write(dir.path().join("cats3.png"), b"x").expect("write");
        assert_eq!(next_sequence_number(dir.path()), 13);
    }

    #[test]
    fn next_sequence_number_starts_at_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(next_sequence_number(dir.path()), 1);
        std::fs::write(dir.path().join("unnumbered.webp"), b"x").expect("write");
        assert_eq!(next_sequence_number(dir.path()), 1);
    }
}
