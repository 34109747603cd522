//! Delimited-text tables used for the listening history and the enrichment state.
//!
//! Cells are kept as strings; an empty cell is the "absent" value, which is how
//! unresolved catalog identifiers survive a write/read cycle.

use std::io::Write;
use std::path::Path;

use crate::error::{EnrichError, Result};

/// In-memory table with a header row and equally wide data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Builds a table from string slices, padding or truncating rows to the header width.
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        let mut table = Self::new(headers.iter().map(|h| h.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|cell| cell.to_string()).collect());
        }
        table
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Returns the index of `name`, appending an empty column when it is missing.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|cells| cells.get_mut(column)) {
            *cell = value.into();
        }
    }

    /// Reads a delimited file whose first record is the header row.
    pub fn read(path: &Path, delimiter: char) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_byte(delimiter)?)
            .quote(b'"')
            .flexible(true)
            .from_path(path)
            .map_err(|err| EnrichError::csv(path, err))?;
        let headers = reader
            .headers()
            .map_err(|err| EnrichError::csv(path, err))?
            .iter()
            .map(ToOwned::to_owned)
            .collect();
        let mut table = Self::new(headers);
        for record in reader.records() {
            let record = record.map_err(|err| EnrichError::csv(path, err))?;
            table.push_row(record.iter().map(ToOwned::to_owned).collect());
        }
        Ok(table)
    }

    /// Reads the table at `path` if the file exists.
    pub fn read_if_exists(path: &Path, delimiter: char) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::read(path, delimiter).map(Some)
    }

    /// Replaces the file at `path` with this table.
    ///
    /// The table is written to a sibling temporary file and renamed into place, so
    /// readers observe either the previous or the new contents.
    pub fn write_atomic(&self, path: &Path, delimiter: char) -> Result<()> {
        let mut bytes = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(delimiter_byte(delimiter)?)
                .from_writer(&mut bytes);
            writer
                .write_record(&self.headers)
                .map_err(|err| EnrichError::csv(path, err))?;
            for row in &self.rows {
                writer
                    .write_record(row)
                    .map_err(|err| EnrichError::csv(path, err))?;
            }
            writer.flush().map_err(|err| EnrichError::io(path, err))?;
        }
        write_bytes_atomic(path, &bytes)
    }
}

/// Atomically replaces `path` with `bytes` via a temporary file in the same directory.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|err| EnrichError::io(parent, err))?;
    let mut staged =
        tempfile::NamedTempFile::new_in(parent).map_err(|err| EnrichError::io(parent, err))?;
    staged
        .write_all(bytes)
        .map_err(|err| EnrichError::io(path, err))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|err| EnrichError::io(path, err))?;
    staged
        .persist(path)
        .map_err(|err| EnrichError::io(path, err.error))?;
    Ok(())
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() && delimiter != '"' && delimiter != '\n' {
        Ok(delimiter as u8)
    } else {
        Err(EnrichError::Config(format!(
            "delimiter must be a single ASCII character other than quote or newline (got {delimiter:?})"
        )))
    }
}
