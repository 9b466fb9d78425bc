//! Unpacks a submission archive into a fresh workspace and locates the
//! renderer binary inside it.

use anyhow::Context;
use std::path::{Path, PathBuf};

/// Scratch area owned by the caller for the duration of one test run.
///
/// The whole tree is wiped and recreated by [`prepare`], so nothing from a
/// previous run (or a previous test of the same run) can leak in. A future
/// parallel judge would hand each run its own workspace root.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// A relative root is pinned to the judge's current directory up
    /// front: the renderer runs with its own working directory, so the
    /// log and image paths handed to it must not depend on cwd.
    pub fn new(root: impl Into<PathBuf>) -> Workspace {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            match std::env::current_dir() {
                Ok(cwd) => cwd.join(root),
                Err(_) => root,
            }
        };
        Workspace { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the archive is extracted into.
    pub fn unpack_dir(&self) -> PathBuf {
        self.root.join("unpacked")
    }

    /// Combined stdout/stderr capture of the renderer.
    pub fn log_path(&self) -> PathBuf {
        self.root.join("output.txt")
    }

    /// Where the renderer is told to write its image.
    pub fn image_path(&self) -> PathBuf {
        self.root.join("output.png")
    }
}

/// Raised when an extracted submission contains nothing runnable.
#[derive(Debug, thiserror::Error)]
#[error("no runnable entry point found under {}", dir.display())]
pub struct EntryPointNotFound {
    pub dir: PathBuf,
}

/// How many levels of single-directory wrappers the entry point search
/// will descend through. Archives made with "zip the project folder"
/// typically need one level.
const MAX_DESCENT: usize = 8;

/// Wipes the workspace, extracts the archive into it and returns the path
/// of the renderer executable.
#[tracing::instrument(skip(workspace, archive), fields(archive = %archive.display()))]
pub async fn prepare(workspace: &Workspace, archive: &Path) -> anyhow::Result<PathBuf> {
    tokio::fs::remove_dir_all(workspace.root()).await.ok();
    let unpack_dir = workspace.unpack_dir();
    tokio::fs::create_dir_all(&unpack_dir)
        .await
        .with_context(|| format!("failed to create workspace at {}", unpack_dir.display()))?;

    extract(archive, &unpack_dir)
        .with_context(|| format!("failed to extract {}", archive.display()))?;

    let exe = find_entry_point(&unpack_dir)?;
    tracing::info!(exe = %exe.display(), "located submission entry point");
    Ok(exe)
}

fn extract(archive: &Path, dest: &Path) -> anyhow::Result<()> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = std::fs::File::open(archive).context("failed to open archive")?;
        let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
        tarball.unpack(dest).context("broken tar archive")?;
    } else {
        let file = std::fs::File::open(archive).context("failed to open archive")?;
        let mut zip = zip::ZipArchive::new(file).context("broken zip archive")?;
        zip.extract(dest).context("failed to unpack zip archive")?;
    }
    Ok(())
}

/// Scans for an executable, descending through single-directory wrappers.
///
/// Returns a typed [`EntryPointNotFound`] when no candidate exists at any
/// level; that failure is fatal for the current test case only.
fn find_entry_point(dir: &Path) -> anyhow::Result<PathBuf> {
    let mut current = dir.to_path_buf();
    for _ in 0..MAX_DESCENT {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&current)
            .with_context(|| format!("failed to read {}", current.display()))?
        {
            entries.push(entry.context("failed to read directory entry")?.path());
        }

        if entries.len() == 1 && entries[0].is_dir() {
            current = entries.remove(0);
            continue;
        }

        for path in entries {
            if path.is_file() && is_executable(&path) {
                return Ok(path);
            }
        }
        break;
    }
    Err(EntryPointNotFound {
        dir: dir.to_path_buf(),
    }
    .into())
}

fn is_executable(path: &Path) -> bool {
    if path.extension().map_or(false, |ext| ext == "exe") {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = path.metadata() {
            return meta.permissions().mode() & 0o111 != 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8], bool)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content, executable) in entries {
            let mut options = zip::write::FileOptions::default();
            if *executable {
                options = options.unix_permissions(0o755);
            }
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn finds_exe_at_extraction_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("sub.zip");
        write_zip(
            &archive,
            &[
                ("readme.txt", b"hi", false),
                ("render.exe", b"binary", false),
            ],
        );
        let ws = Workspace::new(tmp.path().join("work"));
        let exe = prepare(&ws, &archive).await.unwrap();
        assert_eq!(exe.file_name().unwrap(), "render.exe");
    }

    #[tokio::test]
    async fn descends_through_wrapper_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("sub.zip");
        write_zip(
            &archive,
            &[("project/bin/render.exe", b"binary", false)],
        );
        let ws = Workspace::new(tmp.path().join("work"));
        let exe = prepare(&ws, &archive).await.unwrap();
        assert!(exe.ends_with("project/bin/render.exe"));
    }

    #[tokio::test]
    async fn reports_missing_entry_point() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("sub.zip");
        write_zip(&archive, &[("notes.txt", b"no binary here", false)]);
        let ws = Workspace::new(tmp.path().join("work"));
        let err = prepare(&ws, &archive).await.unwrap_err();
        assert!(err.downcast_ref::<EntryPointNotFound>().is_some());
    }

    #[test]
    fn relative_workspace_roots_become_absolute() {
        let ws = Workspace::new("scratch-rel");
        assert!(ws.root().is_absolute());
        assert!(ws.image_path().is_absolute());
        assert!(ws.log_path().is_absolute());
        assert!(ws.root().ends_with("scratch-rel"));
    }

    #[tokio::test]
    async fn wipes_stale_files_between_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("sub.zip");
        write_zip(&archive, &[("render.exe", b"binary", false)]);
        let ws = Workspace::new(tmp.path().join("work"));
        prepare(&ws, &archive).await.unwrap();

        let stale = ws.unpack_dir().join("leftover.png");
        std::fs::write(&stale, b"junk").unwrap();
        prepare(&ws, &archive).await.unwrap();
        assert!(!stale.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recognizes_unix_executables() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("sub.zip");
        write_zip(
            &archive,
            &[
                ("run.sh", b"#!/bin/sh\n", true),
                ("scene.txt", b"data", false),
            ],
        );
        let ws = Workspace::new(tmp.path().join("work"));
        let exe = prepare(&ws, &archive).await.unwrap();
        assert_eq!(exe.file_name().unwrap(), "run.sh");
    }
}
