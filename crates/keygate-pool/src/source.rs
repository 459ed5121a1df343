use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::warn;

/// Ordered list of candidate key files, highest tier first. The first
/// candidate that exists and still has keys after comment/blank
/// filtering wins; lower tiers are never merged in.
#[derive(Debug, Clone)]
pub struct TieredKeySource {
    candidates: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedKeys {
    pub path: PathBuf,
    pub secrets: Vec<String>,
}

impl TieredKeySource {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Reads the highest-priority non-empty candidate. Missing files
    /// fall through to the next tier; unreadable files are logged and
    /// skipped the same way.
    pub async fn load(&self) -> Option<LoadedKeys> {
        for path in &self.candidates {
            let text = match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read key file");
                    continue;
                }
            };
            let secrets = parse_key_lines(&text);
            if secrets.is_empty() {
                continue;
            }
            return Some(LoadedKeys {
                path: path.clone(),
                secrets,
            });
        }
        None
    }
}

/// One secret per line; `#` comments and blank lines are ignored.
/// Duplicates are kept as independent rotation slots.
pub fn parse_key_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_and_filters_comments() {
        let text = "# header\nsk-one\n\n  sk-two  \n# trailing\nsk-one\n";
        assert_eq!(parse_key_lines(text), vec!["sk-one", "sk-two", "sk-one"]);
    }

    #[tokio::test]
    async fn prefers_highest_tier_non_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let premium = dir.path().join("keys-premium.txt");
        let standard = dir.path().join("keys-standard.txt");
        let fallback = dir.path().join("keys.txt");

        // Premium exists but only holds comments, so it is skipped.
        std::fs::write(&premium, "# reserved\n\n").unwrap();
        std::fs::write(&standard, "sk-std-1\nsk-std-2\n").unwrap();
        std::fs::write(&fallback, "sk-default\n").unwrap();

        let source = TieredKeySource::new(vec![premium, standard.clone(), fallback]);
        let loaded = source.load().await.unwrap();
        assert_eq!(loaded.path, standard);
        assert_eq!(loaded.secrets, vec!["sk-std-1", "sk-std-2"]);
    }

    #[tokio::test]
    async fn missing_candidates_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = TieredKeySource::new(vec![dir.path().join("absent.txt")]);
        assert!(source.load().await.is_none());
    }
}
