//! The judge configuration manifest: where the remote stores live and
//! which test cases every submission is graded against.

use anyhow::Context;
use processor::TestCase;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `judge.yaml` representation.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Spreadsheet holding this round's result sheets.
    pub spreadsheet_id: String,
    /// Storage folder all round folders live under.
    pub drive_root: String,
    /// Round name; both the round storage folder and the sheet layout
    /// are provisioned out of band under this name.
    pub round: String,
    /// Scratch directory, wiped before every test run.
    pub scratch_dir: PathBuf,
    #[serde(default = "Config::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "Config::default_render_height")]
    pub render_height: u32,
    /// The test matrix, in the order rows get graded.
    pub tests: Vec<TestCase>,
}

impl Config {
    fn default_timeout_secs() -> u64 {
        3600
    }

    fn default_render_height() -> u32 {
        1080
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = serde_yaml::from_slice(&raw).context("invalid config manifest")?;
        if config.tests.is_empty() {
            anyhow::bail!("config declares no test cases");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_a_full_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("judge.yaml");
        std::fs::write(
            &path,
            r#"
spreadsheet_id: sheet-id
drive_root: root-id
round: Round 0
scratch_dir: /tmp/render-judge
timeout_secs: 60
tests:
  - name: duck
    scene: models/Duck.glb
  - name: cam-front
    scene: models/Bistro.glb
    camera: front
    ambient: 0.1
"#,
        )
        .unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.round, "Round 0");
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.render_height, 1080);
        assert_eq!(config.tests.len(), 2);
        assert_eq!(config.tests[1].camera.as_deref(), Some("front"));
    }

    #[tokio::test]
    async fn rejects_an_empty_test_matrix() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("judge.yaml");
        std::fs::write(
            &path,
            "spreadsheet_id: s\ndrive_root: r\nround: Round 0\nscratch_dir: /tmp/x\ntests: []\n",
        )
        .unwrap();
        assert!(Config::load(&path).await.is_err());
    }
}
