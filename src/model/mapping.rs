use crate::model::transaction::{
    ACK_STR, DATE_STR, EFFECTIVE_AMOUNT_STR, EFFECTIVE_CATEGORY_STR, NAME_STR,
};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

/// Returned when a sheet's header row lacks one of the columns that a transaction is built from.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MissingColumn {
    sheet: String,
    header: String,
}

impl MissingColumn {
    pub fn new(sheet: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            header: header.into(),
        }
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn header(&self) -> &str {
        &self.header
    }
}

impl Display for MissingColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "The header row of sheet '{}' has no '{}' column",
            self.sheet, self.header
        )
    }
}

impl StdError for MissingColumn {}

/// The column positions of the fields we read from an account sheet, located by exact match on
/// the header row. When a header appears more than once, the first occurrence is used.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Mapping {
    name: usize,
    date: usize,
    amount: usize,
    category: usize,
    ack: usize,
}

impl Mapping {
    pub fn new<S>(sheet: &str, headers: &[S]) -> Result<Self, MissingColumn>
    where
        S: AsRef<str>,
    {
        let find = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.as_ref() == wanted)
                .ok_or_else(|| MissingColumn::new(sheet, wanted))
        };
        Ok(Self {
            name: find(NAME_STR)?,
            date: find(DATE_STR)?,
            amount: find(EFFECTIVE_AMOUNT_STR)?,
            category: find(EFFECTIVE_CATEGORY_STR)?,
            ack: find(ACK_STR)?,
        })
    }

    pub fn name<'a, S: AsRef<str>>(&self, row: &'a [S]) -> &'a str {
        cell(row, self.name)
    }

    pub fn date<'a, S: AsRef<str>>(&self, row: &'a [S]) -> &'a str {
        cell(row, self.date)
    }

    pub fn amount<'a, S: AsRef<str>>(&self, row: &'a [S]) -> &'a str {
        cell(row, self.amount)
    }

    pub fn category<'a, S: AsRef<str>>(&self, row: &'a [S]) -> &'a str {
        cell(row, self.category)
    }

    pub fn ack<'a, S: AsRef<str>>(&self, row: &'a [S]) -> &'a str {
        cell(row, self.ack)
    }
}

/// The Sheets API drops trailing empty cells, so a short row reads as blank past its end.
fn cell<S: AsRef<str>>(row: &[S], ix: usize) -> &str {
    row.get(ix).map(|s| s.as_ref()).unwrap_or_default()
}
