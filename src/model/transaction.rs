use crate::model::{Amount, Mapping};
use crate::Result;
use anyhow::{ensure, Context};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, trace};

pub(super) const NAME_STR: &str = "Name";
pub(super) const DATE_STR: &str = "Date";
pub(super) const EFFECTIVE_AMOUNT_STR: &str = "Effective Amount";
pub(super) const EFFECTIVE_CATEGORY_STR: &str = "Effective Category";
pub(super) const ACK_STR: &str = "Ack";

/// Only rows whose Ack cell holds exactly this value are exported.
pub(super) const ACK_YES: &str = "Yes";

/// The format of the ledger's Date column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Represents a single acknowledged row from one of the account sheets.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    account: String,
    name: String,
    date: NaiveDate,
    amount: Amount,
    category: String,
}

impl Transaction {
    pub fn new(
        account: impl Into<String>,
        name: impl Into<String>,
        date: NaiveDate,
        amount: Amount,
        category: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            name: name.into(),
            date,
            amount,
            category: category.into(),
        }
    }

    /// The title of the sheet that the row was found in.
    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// The date as a point in time: midnight UTC.
    pub fn date_time(&self) -> DateTime<Utc> {
        self.date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Seconds since the Unix epoch of `date_time`.
    pub fn timestamp(&self) -> i64 {
        self.date_time().timestamp()
    }
}

/// Turns the raw cell values of the account sheets into transactions.
///
/// `accounts[i]` is the title of the sheet whose rows are `value_ranges[i]`. The first row of each
/// sheet is its header row. Rows that are not acknowledged, and rows dated at or before
/// `now - window_days`, are dropped. The result is in sheet order, then row order.
///
/// # Errors
/// - The two slices differ in length.
/// - A sheet is missing one of the required headers (the error chain contains a
///   [`MissingColumn`](crate::model::MissingColumn)).
/// - An acknowledged row has a date or amount that cannot be parsed.
pub fn deserialize_sheets<A, S>(
    accounts: &[A],
    value_ranges: &[Vec<Vec<S>>],
    window_days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<Transaction>>
where
    A: AsRef<str>,
    S: AsRef<str>,
{
    ensure!(
        accounts.len() == value_ranges.len(),
        "Received {} value ranges for {} sheets",
        value_ranges.len(),
        accounts.len()
    );
    let cutoff = chrono::Duration::try_days(i64::from(window_days))
        .and_then(|window| now.checked_sub_signed(window))
        .with_context(|| {
            format!("A window of {window_days} days reaches before the earliest date")
        })?;
    let mut all = Vec::new();
    for (account, rows) in accounts.iter().zip(value_ranges) {
        let account = account.as_ref();
        let transactions = deserialize_sheet(account, rows)?;
        let before = transactions.len();
        all.extend(
            transactions
                .into_iter()
                .filter(|t| t.date_time() > cutoff),
        );
        trace!("{account}: {before} acknowledged rows");
    }
    debug!(
        "Deserialized {} transactions dated after {}",
        all.len(),
        cutoff.format(DATE_FORMAT)
    );
    Ok(all)
}

/// Parses every acknowledged row of one sheet, without any date filtering.
fn deserialize_sheet<S>(account: &str, rows: &[Vec<S>]) -> Result<Vec<Transaction>>
where
    S: AsRef<str>,
{
    let empty: &[S] = &[];
    let headers = rows.first().map(|r| r.as_slice()).unwrap_or(empty);
    let mapping = Mapping::new(account, headers)?;

    let mut transactions = Vec::new();
    for (ix, row) in rows.iter().enumerate().skip(1) {
        if mapping.ack(row) != ACK_YES {
            continue;
        }
        // 1-based like the sheet itself
        let row_number = ix + 1;
        let date = NaiveDate::parse_from_str(mapping.date(row), DATE_FORMAT).with_context(|| {
            format!(
                "Unable to parse date '{}' in row {row_number} of sheet '{account}'",
                mapping.date(row)
            )
        })?;
        let amount = Amount::from_str(mapping.amount(row)).with_context(|| {
            format!("Unable to parse the amount in row {row_number} of sheet '{account}'")
        })?;
        transactions.push(Transaction::new(
            account,
            mapping.name(row),
            date,
            amount,
            mapping.category(row),
        ));
    }
    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MissingColumn;
    use chrono::TimeZone;

    const HEADER: [&str; 5] = ["Name", "Date", "Effective Amount", "Effective Category", "Ack"];

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn sheet(rows: &[[&str; 5]]) -> Vec<Vec<String>> {
        std::iter::once(&HEADER)
            .chain(rows)
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_acknowledged_recent_row() {
        let ranges = vec![sheet(&[["Coffee", "2024-01-01", "3.50", "Food", "Yes"]])];
        let actual = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap();
        let expected = vec![Transaction::new(
            "Checking",
            "Coffee",
            date(2024, 1, 1),
            Amount::from_str("3.50").unwrap(),
            "Food",
        )];
        assert_eq!(actual, expected);
        assert_eq!(actual[0].timestamp(), 1704067200);
        assert_eq!(actual[0].amount().to_cents().unwrap(), 350);
    }

    #[test]
    fn test_unacknowledged_rows_are_dropped() {
        let ranges = vec![sheet(&[
            ["Coffee", "2024-01-01", "3.50", "Food", "No"],
            ["Tea", "2024-01-02", "2.00", "Food", "yes"],
            ["Cake", "2024-01-03", "4.00", "Food", "Yes "],
            ["Bagel", "2024-01-04", "1.00", "Food", ""],
        ])];
        let actual = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap();
        assert!(actual.is_empty());
    }

    #[test]
    fn test_unacknowledged_rows_are_not_parsed() {
        let ranges = vec![sheet(&[["Pending", "soon", "n/a", "", "No"]])];
        let actual = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap();
        assert!(actual.is_empty());
    }

    #[test]
    fn test_old_rows_are_dropped() {
        let ranges = vec![sheet(&[["Coffee", "2023-01-01", "3.50", "Food", "Yes"]])];
        let actual = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap();
        assert!(actual.is_empty());
    }

    #[test]
    fn test_window_is_strictly_after_cutoff() {
        // cutoff is 2023-12-16T00:00:00Z
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let ranges = vec![sheet(&[
            ["On", "2023-12-16", "1.00", "Food", "Yes"],
            ["After", "2023-12-17", "2.00", "Food", "Yes"],
        ])];
        let actual = deserialize_sheets(&["Checking"], &ranges, 30, now).unwrap();
        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].name(), "After");
    }

    #[test]
    fn test_window_too_large_is_an_error() {
        let ranges = vec![sheet(&[])];
        let err = deserialize_sheets(&["Checking"], &ranges, u32::MAX, now()).unwrap_err();
        assert!(err.to_string().contains("4294967295 days"));
    }

    #[test]
    fn test_window_days_is_respected() {
        let ranges = vec![sheet(&[
            ["A", "2024-01-14", "1.00", "Food", "Yes"],
            ["B", "2024-01-05", "2.00", "Food", "Yes"],
        ])];
        let actual = deserialize_sheets(&["Checking"], &ranges, 7, now()).unwrap();
        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].name(), "A");
    }

    #[test]
    fn test_sheet_order_then_row_order() {
        let ranges = vec![
            sheet(&[
                ["A1", "2024-01-10", "1.00", "Food", "Yes"],
                ["A2", "2024-01-02", "2.00", "Food", "Yes"],
            ]),
            sheet(&[["B1", "2024-01-05", "3.00", "Fun", "Yes"]]),
        ];
        let actual = deserialize_sheets(&["Checking", "Card"], &ranges, 30, now()).unwrap();
        let names: Vec<(&str, &str)> = actual.iter().map(|t| (t.account(), t.name())).collect();
        assert_eq!(names, vec![("Checking", "A1"), ("Checking", "A2"), ("Card", "B1")]);
    }

    #[test]
    fn test_accounts_follow_title_alignment() {
        let checking = sheet(&[["Coffee", "2024-01-10", "3.50", "Food", "Yes"]]);
        let card = sheet(&[["Fuel", "2024-01-11", "40.00", "Auto", "Yes"]]);

        let forward = deserialize_sheets(
            &["Checking", "Card"],
            &[checking.clone(), card.clone()],
            30,
            now(),
        )
        .unwrap();
        let reversed =
            deserialize_sheets(&["Card", "Checking"], &[card, checking], 30, now()).unwrap();

        assert_eq!(forward[0].account(), "Checking");
        assert_eq!(forward[0].name(), "Coffee");
        assert_eq!(reversed[0].account(), "Card");
        assert_eq!(reversed[0].name(), "Fuel");
        assert_eq!(reversed[1].account(), "Checking");
        assert_eq!(reversed[1].name(), "Coffee");
    }

    #[test]
    fn test_misaligned_input_fails() {
        let ranges = vec![sheet(&[])];
        assert!(deserialize_sheets(&["Checking", "Card"], &ranges, 30, now()).is_err());
    }

    #[test]
    fn test_header_only_sheet_is_empty() {
        let ranges = vec![sheet(&[])];
        let actual = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap();
        assert!(actual.is_empty());
    }

    #[test]
    fn test_missing_header_fails() {
        let ranges: Vec<Vec<Vec<&str>>> = vec![vec![
            vec!["Name", "Date", "Effective Amount", "Effective Category"],
            vec!["Coffee", "2024-01-01", "3.50", "Food"],
        ]];
        let err = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap_err();
        let missing = err.downcast_ref::<MissingColumn>().unwrap();
        assert_eq!(missing.header(), "Ack");
        assert_eq!(missing.sheet(), "Checking");
    }

    #[test]
    fn test_empty_sheet_fails() {
        let ranges: Vec<Vec<Vec<String>>> = vec![vec![]];
        let err = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap_err();
        assert!(err.downcast_ref::<MissingColumn>().is_some());
    }

    #[test]
    fn test_one_bad_sheet_fails_the_whole_batch() {
        let good = sheet(&[["Coffee", "2024-01-10", "3.50", "Food", "Yes"]]);
        let bad = vec![vec!["Name".to_string()]];
        assert!(deserialize_sheets(&["Checking", "Card"], &[good, bad], 30, now()).is_err());
    }

    #[test]
    fn test_bad_date_fails() {
        let ranges = vec![sheet(&[["Coffee", "01/01/2024", "3.50", "Food", "Yes"]])];
        let err = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("01/01/2024"));
        assert!(message.contains("row 2"));
    }

    #[test]
    fn test_bad_amount_fails() {
        let ranges = vec![sheet(&[["Coffee", "2024-01-10", "lots", "Food", "Yes"]])];
        assert!(deserialize_sheets(&["Checking"], &ranges, 30, now()).is_err());
    }

    #[test]
    fn test_columns_in_any_order() {
        let ranges: Vec<Vec<Vec<&str>>> = vec![vec![
            vec!["Ack", "Effective Category", "Memo", "Date", "Name", "Effective Amount"],
            vec!["Yes", "Food", "ignored", "2024-01-10", "Coffee", "-$4.25"],
        ]];
        let actual = deserialize_sheets(&["Checking"], &ranges, 30, now()).unwrap();
        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].category(), "Food");
        assert_eq!(actual[0].amount().to_cents().unwrap(), -425);
    }
}
