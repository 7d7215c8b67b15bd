// Third Party
use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

// Local
use crate::reader::SheetSource;

pub const SHEETS_API_ENDPOINT: &str = "https://sheets.googleapis.com";

#[derive(Clone, Debug)]
pub enum Credentials {
    ApiKey(String),
    BearerToken(String),
}

/// Reads ranges through the Google Sheets v4 `spreadsheets.values.get` endpoint.
pub struct GoogleSheetsSource {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
}

/// Body of a `spreadsheets.values.get` response. `values` is omitted for an empty range.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsSource {
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self, anyhow::Error> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid sheets endpoint {}", endpoint))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            credentials,
        })
    }

    fn values_url(&self, spreadsheet_id: &str, cell_range: &str) -> Result<Url, anyhow::Error> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("sheets endpoint {} cannot be a base", self.endpoint))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", cell_range]);
        if let Credentials::ApiKey(key) = &self.credentials {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }
}

#[async_trait]
impl SheetSource for GoogleSheetsSource {
    async fn values(
        &self,
        spreadsheet_id: &str,
        cell_range: &str,
    ) -> Result<Vec<Vec<String>>, anyhow::Error> {
        let mut request = self.http.get(self.values_url(spreadsheet_id, cell_range)?);
        if let Credentials::BearerToken(token) = &self.credentials {
            request = request.bearer_auth(token);
        }
        let body: ValueRange = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("unexpected response from the sheets API")?;
        Ok(into_rows(body))
    }
}

fn into_rows(body: ValueRange) -> Vec<Vec<String>> {
    body.values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_url_with_api_key() {
        let source = GoogleSheetsSource::new(
            SHEETS_API_ENDPOINT,
            Credentials::ApiKey("secret".to_string()),
        )
        .unwrap();
        let url = source.values_url("abc123", "My Apps!A1:C").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/My%20Apps!A1:C?key=secret"
        );
    }

    #[test]
    fn test_values_url_with_token_and_path_prefix() {
        let source = GoogleSheetsSource::new(
            "http://localhost:8080/proxy/",
            Credentials::BearerToken("token".to_string()),
        )
        .unwrap();
        let url = source.values_url("abc123", "Sheet1!A1:C").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/proxy/v4/spreadsheets/abc123/values/Sheet1!A1:C"
        );
    }

    #[test]
    fn test_response_cells_become_strings() {
        let body: ValueRange = serde_json::from_str(
            r#"{
                "range": "Sheet1!A1:C3",
                "majorDimension": "ROWS",
                "values": [["App Name", "Image", "Replicas"], ["web", "img:v1", 3], ["api"]]
            }"#,
        )
        .unwrap();
        assert_eq!(
            into_rows(body),
            vec![
                vec!["App Name", "Image", "Replicas"],
                vec!["web", "img:v1", "3"],
                vec!["api"],
            ]
        );
    }

    #[test]
    fn test_empty_range_has_no_rows() {
        let body: ValueRange =
            serde_json::from_str(r#"{"range": "Sheet1!A1:C", "majorDimension": "ROWS"}"#).unwrap();
        assert!(into_rows(body).is_empty());
    }
}
