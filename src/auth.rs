//! Access-token loading. Token issuance and refresh happen out of band;
//! the judge only needs a bearer token that is valid for the run.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct TokenFile {
    access_token: String,
}

/// Reads the token from `GOOGLE_ACCESS_TOKEN` if set, falling back to the
/// token file.
pub async fn load_token(path: &Path) -> anyhow::Result<String> {
    if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
        if !token.is_empty() {
            return Ok(token);
        }
    }
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read token file at {}", path.display()))?;
    let token: TokenFile = serde_json::from_slice(&raw).context("invalid token file")?;
    Ok(token.access_token)
}
