//! Allows you to store judge artifacts in Google Drive.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use store_api::ArtifactStore;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Thin adapter over the Drive v3 REST surface.
///
/// Every method is a single blocking-from-the-caller's-view call; there
/// are no retries here, a transient failure surfaces as an error.
#[derive(Clone)]
pub struct DriveClient {
    transport: reqwest::Client,
    token: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileMeta>,
}

#[derive(Deserialize)]
struct FileMeta {
    id: String,
}

impl DriveClient {
    /// Creates a client using the given bearer access token. Token
    /// issuance and refresh happen out of band.
    pub fn new(token: String) -> DriveClient {
        DriveClient {
            transport: reqwest::Client::new(),
            token,
        }
    }
}

/// Builds a files-search expression. Values land inside single-quoted
/// string literals, so embedded quotes (author names like `o'brien`)
/// must be escaped.
fn search_query(name: &str, parent: &str) -> String {
    format!(
        "name='{}' and '{}' in parents",
        escape_query_value(name),
        escape_query_value(parent)
    )
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl ArtifactStore for DriveClient {
    async fn list(&self, name: &str, parent: &str) -> anyhow::Result<Vec<String>> {
        let query = search_query(name, parent);
        let resp: FileList = self
            .transport
            .get(format!("{}/files", API_BASE))
            .bearer_auth(&self.token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await
            .context("failed to send file list request")?
            .error_for_status()
            .context("file list request rejected")?
            .json()
            .await
            .context("failed to decode file list")?;
        Ok(resp.files.into_iter().map(|f| f.id).collect())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.transport
            .delete(format!("{}/files/{}", API_BASE, id))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to send delete request")?
            .error_for_status()
            .context("delete request rejected")?;
        Ok(())
    }

    async fn create(
        &self,
        name: &str,
        parent: &str,
        mime: &str,
        content: Vec<u8>,
    ) -> anyhow::Result<String> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent],
        });
        let meta_part = reqwest::multipart::Part::text(metadata.to_string())
            .mime_str("application/json")
            .context("invalid metadata mime")?;
        let media_part = reqwest::multipart::Part::bytes(content)
            .mime_str(mime)
            .with_context(|| format!("invalid artifact mime {}", mime))?;
        let form = reqwest::multipart::Form::new()
            .part("metadata", meta_part)
            .part("media", media_part);
        let resp: FileMeta = self
            .transport
            .post(format!(
                "{}/files?uploadType=multipart&fields=id",
                UPLOAD_BASE
            ))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .context("failed to send upload request")?
            .error_for_status()
            .context("upload request rejected")?
            .json()
            .await
            .context("failed to decode upload response")?;
        Ok(resp.id)
    }

    async fn create_folder(&self, name: &str, parent: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "name": name,
            "parents": [parent],
            "mimeType": store_api::mime::FOLDER,
        });
        let resp: FileMeta = self
            .transport
            .post(format!("{}/files?fields=id", API_BASE))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("failed to send folder create request")?
            .error_for_status()
            .context("folder create request rejected")?
            .json()
            .await
            .context("failed to decode folder create response")?;
        Ok(resp.id)
    }

    async fn share_public(&self, id: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "type": "anyone",
            "role": "reader",
        });
        self.transport
            .post(format!("{}/files/{}/permissions", API_BASE, id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("failed to send permission request")?
            .error_for_status()
            .context("permission request rejected")?;
        Ok(())
    }

    fn download_url(&self, id: &str) -> String {
        format!("https://drive.google.com/uc?export=download&id={}", id)
    }

    fn viewer_url(&self, id: &str) -> String {
        format!("https://drive.google.com/file/d/{}/view", id)
    }
}
