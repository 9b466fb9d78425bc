//! Capability interfaces for the remote stores the judge publishes to.
//!
//! The processor only ever talks to these traits; concrete clients for the
//! real services live in their own crates, and in-memory fakes back the
//! test suite and dry runs.

use async_trait::async_trait;

/// Mime types the judge uploads with.
pub mod mime {
    pub const PNG: &str = "image/png";
    pub const TEXT: &str = "text/plain";
    pub const ZIP: &str = "application/zip";
    pub const GZIP: &str = "application/gzip";
    pub const FOLDER: &str = "application/vnd.google-apps.folder";
}

/// A remote blob store holding named artifacts inside folders.
///
/// Names are not unique by themselves; `list` may return several ids for
/// the same name. Overwrite semantics (delete-then-create) are the
/// caller's job.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns the ids of every artifact called `name` inside `parent`.
    async fn list(&self, name: &str, parent: &str) -> anyhow::Result<Vec<String>>;

    async fn delete(&self, id: &str) -> anyhow::Result<()>;

    /// Uploads `content` as a new artifact and returns its id.
    async fn create(
        &self,
        name: &str,
        parent: &str,
        mime: &str,
        content: Vec<u8>,
    ) -> anyhow::Result<String>;

    /// Creates a sub-folder and returns its id.
    async fn create_folder(&self, name: &str, parent: &str) -> anyhow::Result<String>;

    /// Makes the artifact readable by anyone holding a link to it.
    async fn share_public(&self, id: &str) -> anyhow::Result<()>;

    /// Direct-download link for an artifact, suitable for `=image(..)`.
    fn download_url(&self, id: &str) -> String;

    /// Human-facing viewer link for an artifact.
    fn viewer_url(&self, id: &str) -> String;
}

/// A remote results table split into titled sheets.
#[async_trait]
pub trait ResultTable: Send + Sync {
    /// Returns the index of the sheet titled `title`, if one exists.
    async fn find_sheet(&self, title: &str) -> anyhow::Result<Option<i64>>;

    /// Fetches a single-column range of `sheet`, one value per row, in
    /// row order. Trailing empty rows may be omitted.
    async fn column(&self, sheet: &str, range: &str) -> anyhow::Result<Vec<String>>;

    /// Overwrites the three result cells of `row` (1-based) with
    /// `values`. This is a full overwrite of the range, not a merge.
    async fn update_row(&self, sheet: &str, row: usize, values: [String; 3])
        -> anyhow::Result<()>;
}
