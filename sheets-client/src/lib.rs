//! Allows you to read and update the shared results spreadsheet.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use store_api::ResultTable;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Columns holding (duration, image, log) for every result row.
const RESULT_COLUMNS: (char, char) = ('B', 'D');

/// Thin adapter over the Sheets v4 REST surface, scoped to one
/// spreadsheet (one contest round).
#[derive(Clone)]
pub struct SheetsClient {
    transport: reqwest::Client,
    token: String,
    spreadsheet_id: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
    index: i64,
}

impl SheetsClient {
    pub fn new(token: String, spreadsheet_id: String) -> SheetsClient {
        SheetsClient {
            transport: reqwest::Client::new(),
            token,
            spreadsheet_id,
        }
    }

    fn values_url(&self, sheet: &str, range: &str) -> String {
        // Sheet titles may contain spaces; single quotes keep the A1
        // reference unambiguous.
        format!(
            "{}/{}/values/'{}'!{}",
            API_BASE, self.spreadsheet_id, sheet, range
        )
    }
}

#[async_trait]
impl ResultTable for SheetsClient {
    async fn find_sheet(&self, title: &str) -> anyhow::Result<Option<i64>> {
        let resp: Spreadsheet = self
            .transport
            .get(format!("{}/{}", API_BASE, self.spreadsheet_id))
            .bearer_auth(&self.token)
            .query(&[("fields", "sheets(properties(title,index))")])
            .send()
            .await
            .context("failed to send spreadsheet metadata request")?
            .error_for_status()
            .context("spreadsheet metadata request rejected")?
            .json()
            .await
            .context("failed to decode spreadsheet metadata")?;
        Ok(resp
            .sheets
            .into_iter()
            .find(|s| s.properties.title == title)
            .map(|s| s.properties.index))
    }

    async fn column(&self, sheet: &str, range: &str) -> anyhow::Result<Vec<String>> {
        let resp: ValueRange = self
            .transport
            .get(self.values_url(sheet, range))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to send values request")?
            .error_for_status()
            .context("values request rejected")?
            .json()
            .await
            .context("failed to decode values response")?;
        Ok(resp
            .values
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or_default())
            .collect())
    }

    async fn update_row(
        &self,
        sheet: &str,
        row: usize,
        values: [String; 3],
    ) -> anyhow::Result<()> {
        let (first, last) = RESULT_COLUMNS;
        let range = format!("{}{}:{}{}", first, row, last, row);
        let body = serde_json::json!({ "values": [values] });
        self.transport
            .put(self.values_url(sheet, &range))
            .bearer_auth(&self.token)
            // USER_ENTERED so that `=image(..)` formulas evaluate.
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await
            .context("failed to send row update request")?
            .error_for_status()
            .context("row update request rejected")?;
        Ok(())
    }
}
