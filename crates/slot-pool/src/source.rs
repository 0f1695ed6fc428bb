//! Source resolution: caller-supplied strings to playable local files.

use std::path::PathBuf;

use crate::error::SlotError;

/// A source that passed resolution and points at an existing local file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Source string exactly as the caller supplied it.
    pub uri: String,
    /// Local path the engine should open.
    pub path: PathBuf,
}

impl ResolvedSource {
    /// Lowercased file extension, used as a decoder hint.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Turns a source string into a playable resource.
pub trait SourceResolver: Send + Sync {
    /// Fails with [`SlotError::InvalidSource`] when the source cannot be used.
    fn resolve(&self, source: &str) -> Result<ResolvedSource, SlotError>;
}

/// Resolves plain paths and `file://` URIs against the local filesystem.
#[derive(Clone, Debug, Default)]
pub struct FileSourceResolver {
    root: Option<PathBuf>,
}

impl FileSourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl SourceResolver for FileSourceResolver {
    fn resolve(&self, source: &str) -> Result<ResolvedSource, SlotError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SlotError::invalid_source(source, "empty source"));
        }

        let raw_path = match split_scheme(trimmed) {
            Some((scheme, rest)) if scheme == "file" => {
                let decoded = urlencoding::decode(rest)
                    .map_err(|e| SlotError::invalid_source(source, format!("bad file uri: {e}")))?;
                PathBuf::from(decoded.into_owned())
            }
            Some((scheme, _)) => {
                return Err(SlotError::invalid_source(
                    source,
                    format!("unsupported scheme '{scheme}'"),
                ));
            }
            None => PathBuf::from(trimmed),
        };

        let path = self.anchor(raw_path);
        if !path.is_file() {
            return Err(SlotError::invalid_source(source, "audio file does not exist"));
        }

        Ok(ResolvedSource {
            uri: source.to_string(),
            path,
        })
    }
}

impl FileSourceResolver {
    fn anchor(&self, path: PathBuf) -> PathBuf {
        match self.root.as_deref() {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

/// Split `scheme://rest`, returning the lowercased scheme.
fn split_scheme(source: &str) -> Option<(String, &str)> {
    let (scheme, rest) = source.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| (scheme.to_ascii_lowercase(), rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_clip(name: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"RIFF").unwrap();
        (dir, path)
    }

    #[test]
    fn resolves_existing_plain_path() {
        let (_dir, path) = temp_clip("rain.wav");
        let resolved = FileSourceResolver::new()
            .resolve(path.to_str().unwrap())
            .unwrap();
        assert_eq!(resolved.path, path);
        assert_eq!(resolved.extension().as_deref(), Some("wav"));
    }

    #[test]
    fn resolves_percent_encoded_file_uri() {
        let (_dir, path) = temp_clip("zone 3.flac");
        let encoded = path.to_str().unwrap().replace(' ', "%20");
        let resolved = FileSourceResolver::new()
            .resolve(&format!("file://{encoded}"))
            .unwrap();
        assert_eq!(resolved.path, path);
    }

    #[test]
    fn relative_paths_use_root() {
        let (dir, path) = temp_clip("wind.mp3");
        let resolved = FileSourceResolver::with_root(dir.path())
            .resolve("wind.mp3")
            .unwrap();
        assert_eq!(resolved.path, path);
    }

    #[test]
    fn missing_file_is_invalid_source() {
        let err = FileSourceResolver::new()
            .resolve("/definitely/not/here.wav")
            .unwrap_err();
        assert_eq!(
            err,
            SlotError::invalid_source("/definitely/not/here.wav", "audio file does not exist")
        );
    }

    #[test]
    fn empty_and_network_sources_are_rejected() {
        let resolver = FileSourceResolver::new();
        assert!(matches!(
            resolver.resolve("   "),
            Err(SlotError::InvalidSource { reason, .. }) if reason == "empty source"
        ));
        assert!(matches!(
            resolver.resolve("https://example.com/a.mp3"),
            Err(SlotError::InvalidSource { reason, .. }) if reason.contains("https")
        ));
    }

    #[test]
    fn directories_are_not_sources() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSourceResolver::new()
            .resolve(dir.path().to_str().unwrap())
            .is_err());
    }

    #[test]
    fn split_scheme_requires_a_valid_scheme() {
        assert_eq!(split_scheme("FILE:///a"), Some(("file".to_string(), "/a")));
        assert_eq!(split_scheme("/a/b://c"), None);
        assert_eq!(split_scheme("/plain/path.wav"), None);
    }
}
