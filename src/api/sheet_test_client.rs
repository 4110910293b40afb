//! Implements the `Sheet` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets.

use crate::api::Sheet;
use crate::model::DATE_FORMAT;
use crate::Result;
use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use std::io::Cursor;

/// An implementation of the `Sheet` trait that does not use Google sheets. It holds its sheets in
/// memory, in spreadsheet order.
pub(crate) struct TestSheet {
    data: Vec<(String, Vec<Vec<String>>)>,
}

impl TestSheet {
    /// Create a new `TestSheet` from `(title, rows)` pairs.
    pub(crate) fn new(data: Vec<(String, Vec<Vec<String>>)>) -> Self {
        Self { data }
    }

    /// A `TestSheet` seeded with the data from this module. Dates in the seed data are day offsets
    /// from today, so the seeded transactions stay inside the recency window.
    pub(crate) fn seeded() -> Result<Self> {
        let today = Utc::now().date_naive();
        let mut data = Vec::new();
        for (title, csv_data) in SEED {
            let rows = load_csv(csv_data)
                .with_context(|| format!("Unable to load the seed data for '{title}'"))?;
            data.push((title.to_string(), resolve_dates(rows, today)?));
        }
        Ok(Self::new(data))
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn sheet_titles(&mut self) -> Result<Vec<String>> {
        Ok(self.data.iter().map(|(title, _)| title.clone()).collect())
    }

    async fn batch_get(&mut self, titles: &[String]) -> Result<Vec<Vec<Vec<String>>>> {
        titles
            .iter()
            .map(|title| {
                self.data
                    .iter()
                    .find(|(t, _)| t == title)
                    .map(|(_, rows)| rows.clone())
                    .with_context(|| format!("Sheet '{title}' not found"))
            })
            .collect()
    }
}

/// Loads data from a CSV-formatted string.
fn load_csv(csv_data: &str) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

/// Replaces cells of the form `@-N` with the date `N` days before `today`.
fn resolve_dates(mut rows: Vec<Vec<String>>, today: NaiveDate) -> Result<Vec<Vec<String>>> {
    for cell in rows.iter_mut().flatten() {
        if let Some(offset) = cell.strip_prefix('@') {
            let days: i64 = offset
                .parse()
                .with_context(|| format!("Bad day offset '{cell}' in seed data"))?;
            *cell = (today + Duration::days(days))
                .format(DATE_FORMAT)
                .to_string();
        }
    }
    Ok(rows)
}

/// Seed data, one CSV document per sheet.
const SEED: [(&str, &str); 4] = [
    ("Checking", CHECKING_DATA),
    ("Credit Card", CREDIT_CARD_DATA),
    ("Template", TEMPLATE_DATA),
    ("Categories", CATEGORY_DATA),
];

const CHECKING_DATA: &str = r##"Date,Name,Amount,Effective Amount,Category,Effective Category,Ack,Note
@-2,Paycheck,"$2,450.00","$2,450.00",Income,Income,Yes,
@-3,Rent,"-$1,200.00","-$1,200.00",Housing,Housing,Yes,
@-5,Transfer to Savings,-$300.00,-$300.00,Transfer,Savings,Yes,
@-6,Electric Company,-$84.19,-$84.19,Utilities,Utilities,,pending review
@-12,Coffee,-$3.50,-$3.50,Food,Food,Yes,
@-45,Old Paycheck,"$2,450.00","$2,450.00",Income,Income,Yes,
"##;

const CREDIT_CARD_DATA: &str = r##"Ack,Date,Name,Amount,Effective Amount,Effective Category
Yes,@-1,Grocery Store,-$87.43,-$87.43,Groceries
Yes,@-4,Train Ticket,-$42.00,-$21.00,Travel
No,@-4,Bookshop,-$18.99,-$18.99,Books
Yes,@-9,Refund,$12.50,$12.50,Shopping
"##;

const TEMPLATE_DATA: &str = r##"Date,Name,Amount,Effective Amount,Category,Effective Category,Ack
@-1,Example,$1.00,$1.00,Misc,Misc,Yes
"##;

const CATEGORY_DATA: &str = r##"Category,Group,Type
Food,Living,Expense
Groceries,Living,Expense
Housing,Living,Expense
Income,Income,Income
"##;
