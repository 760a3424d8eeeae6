//! Turns a delimited transactions feed into typed [`Transaction`]s.
//!
//! The first row names the fields. Every later row must parse completely;
//! the first bad row aborts the whole parse.
use chrono::DateTime;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Columns;
use crate::model::Transaction;

/// Row number of the first data row; the header is row 1.
const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file is empty")]
    Empty,
    #[error("couldn't read headers line: {0}")]
    Header(#[source] csv::Error),
    #[error("required field '{0}' is duplicated")]
    DuplicateRequiredField(String),
    #[error("duplicated field '{field}' at column {column}")]
    DuplicateField { field: String, column: usize },
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("row {row}: couldn't read record: {source}")]
    Record {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: couldn't parse date '{value}': {source}")]
    InvalidDate {
        row: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("row {row}: couldn't parse amount '{value}': {source}")]
    InvalidAmount {
        row: usize,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

pub trait TransactionParser: Send + Sync {
    fn parse(&self, reader: &mut dyn Read) -> Result<Vec<Transaction>, ParseError>;
}

/// Comma-separated parser with a header row.
#[derive(Debug, Clone, Default)]
pub struct CsvParser {
    required_fields: Vec<String>,
    columns: Columns,
}

/// Column positions of the consumed fields, resolved once from the header.
#[derive(Debug, Clone, Copy)]
struct FieldPositions {
    account_id: usize,
    date: usize,
    amount: usize,
}

impl CsvParser {
    pub fn new(required_fields: Vec<String>) -> Self {
        Self {
            required_fields,
            columns: Columns::default(),
        }
    }

    pub fn with_columns(mut self, columns: Columns) -> Self {
        self.columns = columns;
        self
    }

    /// Map the header row to column positions.
    ///
    /// The configured required fields and the three consumed columns must all
    /// be present; every absent one is reported together.
    fn map_field_positions(&self, headers: &StringRecord) -> Result<FieldPositions, ParseError> {
        let mut required: Vec<&str> = Vec::with_capacity(self.required_fields.len() + 3);
        for field in &self.required_fields {
            if required.contains(&field.as_str()) {
                return Err(ParseError::DuplicateRequiredField(field.clone()));
            }
            required.push(field);
        }
        for field in [&self.columns.account_id, &self.columns.date, &self.columns.amount] {
            if !required.contains(&field.as_str()) {
                required.push(field);
            }
        }

        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(headers.len());
        for (i, field) in headers.iter().enumerate() {
            if positions.insert(field, i).is_some() {
                return Err(ParseError::DuplicateField {
                    field: field.to_string(),
                    column: i + 1,
                });
            }
        }

        let missing: Vec<String> = required
            .into_iter()
            .filter(|f| !positions.contains_key(f))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingFields(missing));
        }

        Ok(FieldPositions {
            account_id: positions[self.columns.account_id.as_str()],
            date: positions[self.columns.date.as_str()],
            amount: positions[self.columns.amount.as_str()],
        })
    }
}

impl TransactionParser for CsvParser {
    #[instrument(skip_all)]
    fn parse(&self, reader: &mut dyn Read) -> Result<Vec<Transaction>, ParseError> {
        let mut csv = ReaderBuilder::new().has_headers(false).from_reader(reader);

        let mut headers = StringRecord::new();
        match csv.read_record(&mut headers) {
            Ok(true) => {}
            Ok(false) => return Err(ParseError::Empty),
            Err(err) => return Err(ParseError::Header(err)),
        }
        let positions = self.map_field_positions(&headers)?;

        let mut transactions = Vec::new();
        let mut record = StringRecord::new();
        let mut row = FIRST_DATA_ROW;
        loop {
            match csv.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(source) => return Err(ParseError::Record { row, source }),
            }
            transactions.push(map_record(&record, positions, row)?);
            row += 1;
        }

        debug!(count = transactions.len(), "parsed transactions file");
        Ok(transactions)
    }
}

fn map_record(
    record: &StringRecord,
    positions: FieldPositions,
    row: usize,
) -> Result<Transaction, ParseError> {
    let field = |i: usize| record.get(i).unwrap_or_default();

    let account_id = field(positions.account_id);

    let raw_date = field(positions.date);
    let date = DateTime::parse_from_rfc3339(raw_date).map_err(|source| ParseError::InvalidDate {
        row,
        value: raw_date.to_string(),
        source,
    })?;

    let raw_amount = field(positions.amount);
    let amount = raw_amount
        .parse::<i64>()
        .map_err(|source| ParseError::InvalidAmount {
            row,
            value: raw_amount.to_string(),
            source,
        })?;

    Ok(Transaction::new(account_id, date, amount))
}
