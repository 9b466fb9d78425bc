//! Turns one run outcome into table cell values and pushes them out,
//! uploading artifacts along the way.

use crate::{RunOutcome, RunStatus, TestCase};
use anyhow::Context;
use std::time::Duration;
use store_api::{mime, ArtifactStore, ResultTable};

/// Logs longer than this many lines are stored as artifacts and linked
/// instead of being inlined into the cell.
const INLINE_LOG_LIMIT: usize = 35;

/// Publishes the (duration, image, log) triple for one test to its row.
///
/// The row write is a full overwrite of the three result cells; re-judging
/// a submission replaces both the cells and the named artifacts.
#[tracing::instrument(skip(store, table, outcome), fields(test = test.name.as_str()))]
pub async fn publish(
    store: &dyn ArtifactStore,
    table: &dyn ResultTable,
    author: &str,
    test: &TestCase,
    outcome: &RunOutcome,
    folder: &str,
    row: usize,
) -> anyhow::Result<()> {
    let image_cell = image_cell(store, author, test, outcome, folder).await?;
    let log_cell = log_cell(store, author, test, outcome, folder).await?;
    let time_cell = format_duration(outcome.duration);

    tracing::info!(row, "updating cells in the table");
    table
        .update_row(author, row, [time_cell, image_cell, log_cell])
        .await
        .context("failed to update result row")?;
    Ok(())
}

/// Either a live `=image(..)` formula over a freshly uploaded, publicly
/// shared artifact, or a human-readable failure placeholder. Never both,
/// never neither.
async fn image_cell(
    store: &dyn ArtifactStore,
    author: &str,
    test: &TestCase,
    outcome: &RunOutcome,
    folder: &str,
) -> anyhow::Result<String> {
    let name = format!("{}_{}.png", author, test.name);
    // Stale copies go away even when this run produced nothing, so the
    // store always reflects the latest outcome.
    delete_stale(store, &name, folder).await?;
    if tokio::fs::metadata(&outcome.image_path).await.is_err() {
        return Ok(failure_placeholder(&outcome.status));
    }
    let content = tokio::fs::read(&outcome.image_path)
        .await
        .context("failed to read output image")?;
    let id = create_artifact(store, &name, folder, mime::PNG, content).await?;
    store
        .share_public(&id)
        .await
        .context("failed to share uploaded image")?;
    let uri = store.download_url(&id);
    tracing::info!(uri = uri.as_str(), "image published");
    Ok(format!("=image(\"{}\")", uri))
}

fn failure_placeholder(status: &RunStatus) -> String {
    match status {
        RunStatus::Exited(Some(code)) => {
            format!("Program produced no output image. Exit code = 0x{:x}", code)
        }
        RunStatus::Exited(None) => {
            "Program produced no output image. Terminated by a signal".to_string()
        }
        RunStatus::TimedOut => {
            "Program produced no output image. Timed out and was killed".to_string()
        }
        RunStatus::SpawnFailed(err) => format!("Program failed to start: {}", err),
    }
}

/// Short logs are inlined verbatim; long ones are uploaded and linked.
async fn log_cell(
    store: &dyn ArtifactStore,
    author: &str,
    test: &TestCase,
    outcome: &RunOutcome,
    folder: &str,
) -> anyhow::Result<String> {
    let name = format!("{}_{}.txt", author, test.name);
    delete_stale(store, &name, folder).await?;
    let raw = tokio::fs::read(&outcome.log_path)
        .await
        .with_context(|| format!("failed to read log at {}", outcome.log_path.display()))?;
    let text = String::from_utf8_lossy(&raw).into_owned();
    if line_count(&text) <= INLINE_LOG_LIMIT {
        return Ok(text);
    }
    let id = create_artifact(store, &name, folder, mime::TEXT, text.into_bytes()).await?;
    Ok(store.viewer_url(&id))
}

/// Counts lines accepting all three line-ending conventions. A trailing
/// newline counts as starting one more (empty) line, which matches how
/// the threshold was originally tuned.
fn line_count(text: &str) -> usize {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .count()
}

/// Renders a wall-clock duration like `1m 23s 456ms`.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h ", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m ", minutes));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push_str(&format!("{}s ", seconds));
    }
    out.push_str(&format!("{}ms", millis));
    out
}

/// Uploads under overwrite semantics: every artifact already carrying this
/// name in the folder is deleted first, so at most one survives.
pub(crate) async fn upload_artifact(
    store: &dyn ArtifactStore,
    name: &str,
    folder: &str,
    mime: &str,
    content: Vec<u8>,
) -> anyhow::Result<String> {
    delete_stale(store, name, folder).await?;
    create_artifact(store, name, folder, mime, content).await
}

/// Removes every artifact carrying this name in the folder. Runs whether
/// or not the current run has anything to upload in its place.
async fn delete_stale(store: &dyn ArtifactStore, name: &str, folder: &str) -> anyhow::Result<()> {
    let stale = store
        .list(name, folder)
        .await
        .with_context(|| format!("failed to list existing copies of {}", name))?;
    for id in stale {
        tracing::info!(name, id = id.as_str(), "deleting stale artifact");
        store
            .delete(&id)
            .await
            .with_context(|| format!("failed to delete stale artifact {}", id))?;
    }
    Ok(())
}

async fn create_artifact(
    store: &dyn ArtifactStore,
    name: &str,
    folder: &str,
    mime: &str,
    content: Vec<u8>,
) -> anyhow::Result<String> {
    tracing::info!(name, "uploading artifact");
    store
        .create(name, folder, mime, content)
        .await
        .with_context(|| format!("failed to upload {}", name))
}
