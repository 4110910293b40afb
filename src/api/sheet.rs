//! Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.

use crate::api::{Sheet, TokenProvider};
use crate::{Config, Result};
use anyhow::{ensure, Context};
use sheets::types::{DateTimeRenderOption, Dimension, ValueRenderOption};
use sheets::ClientError;
use tracing::trace;

/// Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet. It
/// takes a `TokenProvider`, on which it calls refresh to keep the token up-to-date between export
/// cycles.
pub(super) struct GoogleSheet {
    spreadsheet_id: String,
    token_provider: TokenProvider,
    client: sheets::Client,
}

impl GoogleSheet {
    pub(super) async fn new(config: &Config, mut token_provider: TokenProvider) -> Result<Self> {
        let client = create_sheets_client(&mut token_provider).await?;
        Ok(Self {
            spreadsheet_id: config.spreadsheet_id().to_string(),
            token_provider,
            client,
        })
    }

    /// Refreshes the sheets client with a new access token if needed
    async fn refresh_client(&mut self) -> Result<()> {
        self.client = create_sheets_client(&mut self.token_provider).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn sheet_titles(&mut self) -> Result<Vec<String>> {
        trace!("sheet_titles for {}", self.spreadsheet_id);
        self.refresh_client().await?;
        let response = self
            .client
            .spreadsheets()
            .get(&self.spreadsheet_id, false, &[])
            .await
            .map_err(map_client_error)
            .context("Failed to fetch the spreadsheet")?;
        Ok(response
            .body
            .sheets
            .into_iter()
            .filter_map(|sheet| sheet.properties)
            .map(|properties| properties.title)
            .collect())
    }

    async fn batch_get(&mut self, titles: &[String]) -> Result<Vec<Vec<Vec<String>>>> {
        trace!("batch_get for {titles:?}");
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        self.refresh_client().await?;
        let ranges: Vec<String> = titles.iter().map(|t| sheet_range(t)).collect();
        let response = self
            .client
            .spreadsheets()
            .values_batch_get(
                &self.spreadsheet_id,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                &ranges,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to fetch the values of {titles:?}"))?;

        let value_ranges = response.body.value_ranges;
        ensure!(
            value_ranges.len() == titles.len(),
            "Requested {} ranges but received {}",
            titles.len(),
            value_ranges.len()
        );
        Ok(value_ranges.into_iter().map(|vr| vr.values).collect())
    }
}

/// The A1 notation for every cell of the sheet named `title`.
fn sheet_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Creates a new sheets client with a refreshed access token.
async fn create_sheets_client(token_provider: &mut TokenProvider) -> Result<sheets::Client> {
    let access_token = token_provider.token_with_refresh().await?;

    // The sheets crate requires client_id, client_secret, and redirect_uri, but we don't need them
    // for API calls, only the access token
    Ok(sheets::Client::new(
        String::new(), // client_id
        String::new(), // client_secret
        String::new(), // redirect_uri
        access_token.to_string(),
        String::new(), // refresh_token, we handle refresh ourselves
    ))
}

fn map_client_error(e: sheets::ClientError) -> anyhow::Error {
    let error_name = match &e {
        ClientError::EmptyRefreshToken => "EmptyRefreshToken".to_string(),
        ClientError::FromUtf8Error(inner) => format!("FromUtf8Error {inner}"),
        ClientError::UrlParserError(inner) => format!("UrlParserError {inner}"),
        ClientError::SerdeJsonError(inner) => format!("SerdeJsonError {inner}"),
        ClientError::ReqwestError(inner) => format!("ReqwestError {inner}"),
        ClientError::InvalidHeaderValue(inner) => format!("InvalidHeaderValue {inner}"),
        ClientError::ReqwestMiddleWareError(inner) => format!("ReqwestMiddleWareError {inner}"),
        ClientError::HttpError { status, .. } => format!("HttpError {status}"),
        ClientError::Other(_) => "Other".to_string(),
    };
    anyhow::Error::new(e).context(error_name)
}
