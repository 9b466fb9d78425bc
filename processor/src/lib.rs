//! Processor drives a full grading run for one submission: for every
//! configured test case it prepares a clean workspace, executes the
//! contestant's renderer, and publishes the outcome to the shared stores.

mod exec;
pub mod fake;
mod prepare;
mod publish;

pub use exec::{run_test, RunOutcome, RunStatus};
pub use prepare::{prepare, EntryPointNotFound, Workspace};
pub use publish::publish;

use anyhow::Context;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use store_api::{mime, ArtifactStore, ResultTable};

/// One named scene/camera configuration to render. A singleton list gives
/// the plain single-render mode; the full matrix adds camera angles.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TestCase {
    /// Must match a row label in the author's sheet.
    pub name: String,
    /// Scene file handed to the renderer.
    pub scene: PathBuf,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub ambient: Option<f64>,
}

/// One contestant submission.
pub struct Submission {
    pub author: String,
    pub archive: PathBuf,
}

/// Remote capabilities the processor publishes through.
#[derive(Clone)]
pub struct Clients {
    pub store: Arc<dyn ArtifactStore>,
    pub table: Arc<dyn ResultTable>,
}

/// Settings are global rather than per test case.
#[derive(Clone)]
pub struct Settings {
    /// Scratch root, wiped before every test run.
    pub scratch_dir: PathBuf,
    /// Storage folder all rounds live under.
    pub drive_root: String,
    /// Round name; scopes the round storage folder.
    pub round: String,
    /// Wall-clock budget per test run.
    pub timeout: Duration,
    /// Height passed to the renderer via `--height`.
    pub render_height: u32,
}

/// Raised when the author has no sheet in the results table. Sheets are
/// provisioned out of band; the judge never creates them.
#[derive(Debug, thiserror::Error)]
#[error("author {author} has no sheet in the results table")]
pub struct AuthorNotFound {
    pub author: String,
}

/// Raised when a configured test has no row in the author's sheet.
#[derive(Debug, thiserror::Error)]
#[error("test {test} has no row in sheet {sheet}")]
pub struct RowNotFound {
    pub test: String,
    pub sheet: String,
}

/// Judges one submission against the whole test matrix.
///
/// Configuration problems (unknown author, unknown test row, missing round
/// folder) abort before any side effect. A preparation or execution
/// failure kills only its test case; publishing and remote-store failures
/// abort the invocation. Finally the submitted archive itself is stored as
/// a record artifact.
#[tracing::instrument(skip(submission, tests, clients, settings), fields(author = submission.author.as_str()))]
pub async fn judge(
    submission: &Submission,
    tests: &[TestCase],
    clients: &Clients,
    settings: &Settings,
) -> anyhow::Result<()> {
    let author = &submission.author;

    clients
        .table
        .find_sheet(author)
        .await
        .context("failed to query the results table")?
        .ok_or_else(|| AuthorNotFound {
            author: author.clone(),
        })?;
    tracing::info!("resolved author sheet");

    // One scan of the label column per invocation; every later lookup is a
    // map hit. Validating the whole matrix up front keeps a half-configured
    // sheet from being half-updated.
    let labels = clients
        .table
        .column(author, "A1:A")
        .await
        .context("failed to read test rows")?;
    let row_by_name: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.as_str(), i + 1))
        .collect();
    let mut planned = Vec::with_capacity(tests.len());
    for test in tests {
        let row = row_by_name
            .get(test.name.as_str())
            .copied()
            .ok_or_else(|| RowNotFound {
                test: test.name.clone(),
                sheet: author.clone(),
            })?;
        planned.push((test, row));
    }

    let round_folder = resolve_round_folder(clients.store.as_ref(), settings).await?;
    let author_folder =
        resolve_author_folder(clients.store.as_ref(), author, &round_folder).await?;
    tracing::info!(folder = author_folder.as_str(), "resolved author folder");

    let workspace = Workspace::new(&settings.scratch_dir);
    for (test, row) in planned {
        // Full wipe and re-extract per test, so one test cannot pollute
        // the next through the working directory.
        let exe = match prepare::prepare(&workspace, &submission.archive).await {
            Ok(exe) => exe,
            Err(err) => {
                tracing::warn!(
                    test = test.name.as_str(),
                    err = %format_args!("{:#}", err),
                    "failed to prepare submission, skipping test case"
                );
                continue;
            }
        };
        let outcome = match exec::run_test(&exe, test, &workspace, settings).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    test = test.name.as_str(),
                    err = %format_args!("{:#}", err),
                    "failed to execute test case, skipping it"
                );
                continue;
            }
        };
        publish::publish(
            clients.store.as_ref(),
            clients.table.as_ref(),
            author,
            test,
            &outcome,
            &author_folder,
            row,
        )
        .await
        .with_context(|| format!("failed to publish result for test {}", test.name))?;
    }

    upload_archive_record(clients.store.as_ref(), submission, &author_folder).await?;
    Ok(())
}

/// The round folder is provisioned out of band, like author sheets.
async fn resolve_round_folder(
    store: &dyn ArtifactStore,
    settings: &Settings,
) -> anyhow::Result<String> {
    let ids = store
        .list(&settings.round, &settings.drive_root)
        .await
        .context("failed to look up the round folder")?;
    ids.into_iter()
        .next()
        .with_context(|| format!("round folder {} does not exist", settings.round))
}

async fn resolve_author_folder(
    store: &dyn ArtifactStore,
    author: &str,
    round_folder: &str,
) -> anyhow::Result<String> {
    let ids = store
        .list(author, round_folder)
        .await
        .context("failed to look up the author folder")?;
    if let Some(id) = ids.into_iter().next() {
        return Ok(id);
    }
    tracing::info!("creating author folder");
    store
        .create_folder(author, round_folder)
        .await
        .context("failed to create the author folder")
}

/// Keeps the submitted archive itself next to the results, overwriting
/// any archive from a previous run.
async fn upload_archive_record(
    store: &dyn ArtifactStore,
    submission: &Submission,
    author_folder: &str,
) -> anyhow::Result<()> {
    let content = match tokio::fs::read(&submission.archive).await {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(
                archive = %submission.archive.display(),
                err = %err,
                "submission archive unreadable, skipping record upload"
            );
            return Ok(());
        }
    };
    let (name, mime_type) = record_name_and_mime(&submission.author, &submission.archive);
    publish::upload_artifact(store, &name, author_folder, mime_type, content)
        .await
        .context("failed to upload the archive record")?;
    Ok(())
}

/// The record keeps the submission's own archive format; everything that
/// is not a gzipped tarball is treated as a zip, matching `prepare`.
fn record_name_and_mime(author: &str, archive: &std::path::Path) -> (String, &'static str) {
    let file = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if file.ends_with(".tar.gz") || file.ends_with(".tgz") {
        (format!("{}.tar.gz", author), mime::GZIP)
    } else {
        (format!("{}.zip", author), mime::ZIP)
    }
}
