//! In-memory store implementations backing the test suite and `--dry-run`
//! invocations. Behavior mirrors the real services closely enough for the
//! pipeline to run unmodified against them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use store_api::{ArtifactStore, ResultTable};

struct FakeFile {
    name: String,
    parent: String,
    mime: String,
    content: Vec<u8>,
}

#[derive(Default)]
struct FakeStoreState {
    next_id: u64,
    files: HashMap<String, FakeFile>,
    shared: Vec<String>,
}

/// Blob store living in a `HashMap`.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeStoreState>,
}

impl FakeStore {
    pub fn new() -> FakeStore {
        FakeStore::default()
    }

    /// Inserts a folder directly, bypassing the trait. Used to stand in
    /// for folders that are provisioned out of band in the real service.
    pub fn provision_folder(&self, name: &str, parent: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("fake-{}", state.next_id);
        state.next_id += 1;
        state.files.insert(
            id.clone(),
            FakeFile {
                name: name.to_string(),
                parent: parent.to_string(),
                mime: store_api::mime::FOLDER.to_string(),
                content: Vec::new(),
            },
        );
        id
    }

    /// Ids of every file called `name` under `parent`.
    pub fn files_named(&self, name: &str, parent: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state
            .files
            .iter()
            .filter(|(_, f)| f.name == name && f.parent == parent)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn file_content(&self, id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.files.get(id).map(|f| f.content.clone())
    }

    pub fn file_mime(&self, id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.files.get(id).map(|f| f.mime.clone())
    }

    pub fn is_shared(&self, id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.shared.iter().any(|s| s == id)
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn list(&self, name: &str, parent: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.files_named(name, parent))
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .files
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", id))
    }

    async fn create(
        &self,
        name: &str,
        parent: &str,
        mime: &str,
        content: Vec<u8>,
    ) -> anyhow::Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = format!("fake-{}", state.next_id);
        state.next_id += 1;
        state.files.insert(
            id.clone(),
            FakeFile {
                name: name.to_string(),
                parent: parent.to_string(),
                mime: mime.to_string(),
                content,
            },
        );
        Ok(id)
    }

    async fn create_folder(&self, name: &str, parent: &str) -> anyhow::Result<String> {
        Ok(self.provision_folder(name, parent))
    }

    async fn share_public(&self, id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.files.contains_key(id) {
            anyhow::bail!("no such file: {}", id);
        }
        state.shared.push(id.to_string());
        Ok(())
    }

    fn download_url(&self, id: &str) -> String {
        format!("fake://download/{}", id)
    }

    fn viewer_url(&self, id: &str) -> String {
        format!("fake://view/{}", id)
    }
}

/// One sheet: a title and rows of four columns (A through D).
struct FakeSheet {
    title: String,
    rows: Vec<[String; 4]>,
}

/// Results table living in a `Vec` of sheets, in insertion order.
#[derive(Default)]
pub struct FakeTable {
    sheets: Mutex<Vec<FakeSheet>>,
}

impl FakeTable {
    pub fn new() -> FakeTable {
        FakeTable::default()
    }

    /// Provisions a sheet with the given test names down column A, the
    /// way contest organizers set sheets up by hand.
    pub fn add_sheet(&self, title: &str, tests: &[&str]) {
        let rows = tests
            .iter()
            .map(|t| {
                [
                    t.to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                ]
            })
            .collect();
        self.sheets.lock().unwrap().push(FakeSheet {
            title: title.to_string(),
            rows,
        });
    }

    /// Returns columns B..D of the given 1-based row.
    pub fn row(&self, sheet: &str, row: usize) -> Option<[String; 3]> {
        let sheets = self.sheets.lock().unwrap();
        let sheet = sheets.iter().find(|s| s.title == sheet)?;
        let cells = sheet.rows.get(row - 1)?;
        Some([cells[1].clone(), cells[2].clone(), cells[3].clone()])
    }
}

#[async_trait]
impl ResultTable for FakeTable {
    async fn find_sheet(&self, title: &str) -> anyhow::Result<Option<i64>> {
        let sheets = self.sheets.lock().unwrap();
        Ok(sheets
            .iter()
            .position(|s| s.title == title)
            .map(|i| i as i64))
    }

    async fn column(&self, sheet: &str, _range: &str) -> anyhow::Result<Vec<String>> {
        let sheets = self.sheets.lock().unwrap();
        let sheet = sheets
            .iter()
            .find(|s| s.title == sheet)
            .ok_or_else(|| anyhow::anyhow!("no such sheet: {}", sheet))?;
        Ok(sheet.rows.iter().map(|r| r[0].clone()).collect())
    }

    async fn update_row(
        &self,
        sheet: &str,
        row: usize,
        values: [String; 3],
    ) -> anyhow::Result<()> {
        let mut sheets = self.sheets.lock().unwrap();
        let sheet = sheets
            .iter_mut()
            .find(|s| s.title == sheet)
            .ok_or_else(|| anyhow::anyhow!("no such sheet: {}", sheet))?;
        let cells = sheet
            .rows
            .get_mut(row - 1)
            .ok_or_else(|| anyhow::anyhow!("row {} out of range", row))?;
        let [time, image, log] = values;
        cells[1] = time;
        cells[2] = image;
        cells[3] = log;
        Ok(())
    }
}
