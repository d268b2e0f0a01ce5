use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

/// Opaque platform-specific file identity, used to detect that the file
/// behind a path has been replaced (typical of `logrotate`-style tools).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileId {
    #[cfg(unix)]
    Unix { ino: u64, dev: u64 },
    Generic { size: u64, mtime: i64 },
}

#[cfg(unix)]
pub async fn file_identity(path: &Path) -> std::io::Result<FileId> {
    use std::os::unix::fs::MetadataExt;
    let metadata = tokio::fs::metadata(path).await?;
    Ok(FileId::Unix {
        ino: metadata.ino(),
        dev: metadata.dev(),
    })
}

#[cfg(not(unix))]
pub async fn file_identity(path: &Path) -> std::io::Result<FileId> {
    let metadata = tokio::fs::metadata(path).await?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(FileId::Generic {
        size: metadata.len(),
        mtime,
    })
}

/// A monitored log file. `cursor` advances monotonically within a
/// generation (one `file_id`); on rotation the owning agent resets it to 0
/// and adopts the new identity.
#[derive(Debug, Clone)]
pub struct PathFile {
    pub name: String,
    pub path: PathBuf,
    pub cursor: u64,
    pub file_id: Option<FileId>,
}

impl PathFile {
    pub fn new(name: String, path: PathBuf, cursor: u64) -> Self {
        PathFile {
            name,
            path,
            cursor,
            file_id: None,
        }
    }

    /// Reads up to `buffer_rows` newline-terminated lines starting at
    /// `cursor`, advancing `cursor` only past fully terminated lines. A
    /// trailing partial line (no newline yet) is left unconsumed.
    pub async fn read_batch(&mut self, buffer_rows: usize) -> std::io::Result<Vec<String>> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        reader.seek(std::io::SeekFrom::Start(self.cursor)).await?;

        let mut lines = Vec::with_capacity(buffer_rows);
        let mut advanced = self.cursor;
        let mut raw = Vec::new();
        while lines.len() < buffer_rows {
            raw.clear();
            let read = reader.read_until(b'\n', &mut raw).await?;
            if read == 0 {
                break;
            }
            if raw.last() != Some(&b'\n') {
                break;
            }
            advanced += read as u64;
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            lines.push(line);
        }
        self.cursor = advanced;
        Ok(lines)
    }

    /// Reads everything from `cursor` to EOF of the (now rotated-away)
    /// file at `old_path`, without touching `self.cursor` — the caller
    /// resets it to 0 once the new file is adopted.
    pub async fn read_remainder(&self, old_path: &Path) -> std::io::Result<Vec<String>> {
        let file = tokio::fs::File::open(old_path).await?;
        let mut reader = BufReader::new(file);
        reader.seek(std::io::SeekFrom::Start(self.cursor)).await?;
        let mut lines = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                break;
            }
            lines.push(line.trim_end_matches('\n').to_string());
        }
        Ok(lines)
    }
}

/// Enumerates sibling files in `dir` whose names start with `prefix`,
/// sorted by modification time, excluding `current`. Used to locate the
/// rotated-away predecessor of a log file after its identity changes.
pub async fn find_rotation_candidates(
    dir: &Path,
    prefix: &str,
    current: &Path,
) -> std::io::Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path == current {
            continue;
        }
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !file_name.starts_with(prefix) {
            continue;
        }
        candidates.push(path);
    }

    let mut with_mtime = Vec::with_capacity(candidates.len());
    for path in candidates {
        let mtime = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .unwrap_or(std::time::UNIX_EPOCH);
        with_mtime.push((mtime, path));
    }
    with_mtime.sort_by_key(|(mtime, _)| *mtime);
    Ok(with_mtime.into_iter().map(|(_, path)| path).collect())
}
