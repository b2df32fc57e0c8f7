use std::path::{Path, PathBuf};

use crate::foundation::error::{ScrubError, ScrubResult};

/// Source of raw asset bytes addressed by relative path.
///
/// Implementations are shared with the background mask loader, hence `Send + Sync`.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, path: &str) -> ScrubResult<Vec<u8>>;
}

/// Reads assets from a directory on disk.
#[derive(Clone, Debug)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetFetcher for FsFetcher {
    fn fetch(&self, path: &str) -> ScrubResult<Vec<u8>> {
        let norm = normalize_rel_path(path)?;
        let p = self.root.join(Path::new(&norm));
        std::fs::read(&p)
            .map_err(|e| ScrubError::asset(format!("failed to read '{}': {e}", p.display())))
    }
}

/// Normalize and validate asset paths relative to the fetcher root.
///
/// The normalized result uses `/` separators, removes `.` segments, and rejects absolute paths or
/// parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> ScrubResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(ScrubError::validation("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(ScrubError::validation("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(ScrubError::validation("asset paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(ScrubError::validation("asset path must contain a file name"));
    }

    Ok(out.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_slash_normalization() {
        assert_eq!(normalize_rel_path("a/b.png").unwrap(), "a/b.png");
        assert_eq!(normalize_rel_path("a\\b.png").unwrap(), "a/b.png");
        assert_eq!(
            normalize_rel_path("./SOURCE//ELEMENT 3D/x.png").unwrap(),
            "SOURCE/ELEMENT 3D/x.png"
        );
        assert!(normalize_rel_path("../x.png").is_err());
        assert!(normalize_rel_path("/abs.png").is_err());
        assert!(normalize_rel_path("./").is_err());
    }

    #[test]
    fn fs_fetcher_reports_missing_file_as_asset_error() {
        let f = FsFetcher::new(std::env::temp_dir().join("logoscrub_missing_root"));
        let err = f.fetch("nope.png").unwrap_err();
        assert!(matches!(err, ScrubError::Asset(_)));
    }
}
