// used for the raw column values of a row
use rusqlite::types::Value as SqlValue;

use std::rc::Rc;

use crate::error::{Result, SismaError};

// ------------- Record -------------
/// One row of a result, with its values addressable by column name.
#[derive(Debug, Clone)]
pub struct Record {
    columns: Rc<[String]>,
    values: Vec<SqlValue>,
}

impl Record {
    pub fn new(columns: Rc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|index| self.values.get(index))
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

// ------------- ResultSet -------------
/// A random-access cursor over the rows of a select.
///
/// The rows are buffered when the statement is executed, so positioning is
/// absolute and the statement itself is finalized before the cursor is
/// handed out. Once released the cursor yields nothing.
#[derive(Debug)]
pub struct ResultSet {
    columns: Rc<[String]>,
    rows: Vec<Vec<SqlValue>>,
    current: usize,
    released: bool,
}

impl ResultSet {
    pub fn new(columns: Rc<[String]>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            current: 0,
            released: false,
        }
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn num_rows(&self) -> usize {
        if self.released { 0 } else { self.rows.len() }
    }
    /// Highest valid index, `-1` for an empty or released cursor.
    pub fn max_record(&self) -> i64 {
        self.num_rows() as i64 - 1
    }
    pub fn key(&self) -> usize {
        self.current
    }
    pub fn valid(&self) -> bool {
        !self.released && self.current < self.rows.len()
    }
    /// The record at the current position without moving.
    pub fn current(&self) -> Option<Record> {
        if !self.valid() {
            return None;
        }
        Some(Record::new(
            Rc::clone(&self.columns),
            self.rows[self.current].clone(),
        ))
    }
    /// The record at the current position, then advances.
    pub fn fetch(&mut self) -> Option<Record> {
        let record = self.current()?;
        self.current += 1;
        Some(record)
    }
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if self.released || position >= self.rows.len() {
            return Err(SismaError::InvalidArgument(format!(
                "cannot seek to {} in a result of {} rows",
                position,
                self.num_rows()
            )));
        }
        self.current = position;
        Ok(())
    }
    pub fn rewind(&mut self) {
        self.current = 0;
    }
    pub fn release(&mut self) {
        if !self.released {
            self.rows.clear();
            self.released = true;
        }
    }
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Iterator for ResultSet {
    type Item = Record;
    fn next(&mut self) -> Option<Record> {
        self.fetch()
    }
}
