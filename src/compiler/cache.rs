//! Side-file cache of parsed syntax trees, `<source>.syntax_support`.
//!
//! A record is only reused while the source's modification time matches the
//! one it was written with.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::syn::SyntaxTree;

pub const CACHE_SUFFIX: &str = "syntax_support";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub source_path: PathBuf,
    pub modified_unix_secs: u64,
    pub tree: SyntaxTree,
}

pub fn cache_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".");
    name.push(CACHE_SUFFIX);
    PathBuf::from(name)
}

fn modified_unix_secs(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)
        .and_then(|x| x.modified())
        .with_context(|| format!("reading modification time of {}", path.display()))?;
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("{} predates the unix epoch: {}", path.display(), e))?
        .as_secs();
    Ok(secs)
}

/// Cached tree of `source`, `None` on a miss. A missing, stale or unreadable
/// record is a miss.
pub fn load(source: &Path) -> Result<Option<SyntaxTree>> {
    let path = cache_path(source);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(source = %source.display(), "syntax cache miss");
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let record: CacheRecord = match serde_json::from_str(&text) {
        Ok(record) => record,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding corrupt syntax cache");
            return Ok(None);
        }
    };
    let modified = modified_unix_secs(source)?;
    if record.modified_unix_secs != modified {
        debug!(
            source = %source.display(),
            cached = record.modified_unix_secs,
            modified,
            "syntax cache is stale"
        );
        return Ok(None);
    }
    debug!(source = %source.display(), "syntax cache hit");
    Ok(Some(record.tree))
}

pub fn store(source: &Path, tree: &SyntaxTree) -> Result<PathBuf> {
    let record = CacheRecord {
        source_path: source.to_owned(),
        modified_unix_secs: modified_unix_secs(source)?,
        tree: tree.clone(),
    };
    let path = cache_path(source);
    write_atomic(&path, serde_json::to_string(&record)?.as_bytes())?;
    Ok(path)
}

/// Writes `bytes` to a temporary file next to `path` and renames it into
/// place, so readers see either the old content or the new.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temporary file in {}", parent.display()))?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path)
        .map_err(|e| anyhow!("replacing {}: {}", path.display(), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lex::Lexer;
    use crate::compiler::syn::Parser;
    use pretty_assertions::assert_eq;

    fn tree(src: &str) -> SyntaxTree {
        Parser::apply(Lexer::from_text(src)).unwrap()
    }

    #[test]
    fn test_cache_path() {
        assert_eq!(
            cache_path(Path::new("a/Blur.cs.hlsl")),
            PathBuf::from("a/Blur.cs.hlsl.syntax_support")
        );
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Blur.cs.hlsl");
        fs::write(&source, "Texture2D a;").unwrap();
        assert_eq!(load(&source).unwrap(), None);

        let parsed = tree("Texture2D a;");
        let written = store(&source, &parsed).unwrap();
        assert!(written.exists());
        assert_eq!(load(&source).unwrap(), Some(parsed));
    }

    #[test]
    fn test_stale_record_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Blur.cs.hlsl");
        fs::write(&source, "Texture2D a;").unwrap();
        let record = CacheRecord {
            source_path: source.clone(),
            modified_unix_secs: 1,
            tree: tree("Texture2D a;"),
        };
        write_atomic(
            &cache_path(&source),
            serde_json::to_string(&record).unwrap().as_bytes(),
        )
        .unwrap();
        assert_eq!(load(&source).unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Blur.cs.hlsl");
        fs::write(&source, "").unwrap();
        fs::write(cache_path(&source), "{ not json").unwrap();
        assert_eq!(load(&source).unwrap(), None);
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.hlsl");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
