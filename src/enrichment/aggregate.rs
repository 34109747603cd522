//! Row-level preparation: required columns, play-count grouping, and the resume join.

use std::collections::HashMap;

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::Table;
use crate::error::{EnrichError, Result};

/// Column indices of the (artist, album, track) identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumns {
    pub artist: usize,
    pub album: usize,
    pub track: usize,
}

pub type GroupKey = (String, String, String);

impl KeyColumns {
    /// Locates the identity columns, reporting every missing one at once.
    pub fn require(table: &Table, settings: &PipelineConfig) -> Result<Self> {
        let names = [
            settings.artist_column.as_str(),
            settings.album_column.as_str(),
            settings.track_column.as_str(),
        ];
        let indices: Vec<Option<usize>> =
            names.iter().map(|name| table.column_index(name)).collect();
        match indices.as_slice() {
            [Some(artist), Some(album), Some(track)] => Ok(Self {
                artist: *artist,
                album: *album,
                track: *track,
            }),
            _ => Err(EnrichError::Schema {
                missing: names
                    .iter()
                    .zip(&indices)
                    .filter(|(_, index)| index.is_none())
                    .map(|(name, _)| name.to_string())
                    .collect(),
            }),
        }
    }

    /// Identity key of `row`, compared exactly as stored (no case or whitespace folding).
    pub fn key(&self, table: &Table, row: usize) -> GroupKey {
        (
            table.cell(row, self.artist).to_string(),
            table.cell(row, self.album).to_string(),
            table.cell(row, self.track).to_string(),
        )
    }
}

/// Counts rows per identity key and keeps the first row of every group played at
/// least `min_play_count` times, with its count written to the play-count column.
///
/// Groups keep the order in which they first appear in `history`.
pub fn group_by_play_count(
    history: &Table,
    keys: KeyColumns,
    min_play_count: u32,
    play_count_column: &str,
) -> Table {
    let mut first_row: Vec<usize> = Vec::new();
    let mut counts: HashMap<GroupKey, u32> = HashMap::new();
    for row in 0..history.len() {
        let count = counts.entry(keys.key(history, row)).or_insert_with(|| {
            first_row.push(row);
            0
        });
        *count += 1;
    }

    let mut grouped = Table::new(history.headers().to_vec());
    let count_column = grouped.ensure_column(play_count_column);
    for row in first_row {
        let play_count = counts
            .get(&keys.key(history, row))
            .copied()
            .unwrap_or_default();
        if play_count < min_play_count {
            continue;
        }
        grouped.push_row(history.rows()[row].clone());
        let inserted = grouped.len() - 1;
        grouped.set_cell(inserted, count_column, play_count.to_string());
    }
    info!(
        "Grouped {} history rows into {} tracks played at least {} times",
        history.len(),
        grouped.len(),
        min_play_count
    );
    grouped
}

/// Adds the catalog-id column to `grouped` and fills it from a previous run's output.
///
/// Only non-empty identifiers are carried over; rows that were left unresolved
/// stay empty and are looked up again. Returns the id column index.
pub fn restore_catalog_ids(
    grouped: &mut Table,
    keys: KeyColumns,
    prior: Option<&Table>,
    settings: &PipelineConfig,
) -> usize {
    let id_column = grouped.ensure_column(&settings.catalog_id_column);
    let Some(prior) = prior else {
        return id_column;
    };
    let prior_keys = match KeyColumns::require(prior, settings) {
        Ok(prior_keys) => prior_keys,
        Err(err) => {
            warn!("Ignoring previous output for resume: {err}");
            return id_column;
        }
    };
    let Some(prior_id_column) = prior.column_index(&settings.catalog_id_column) else {
        warn!(
            "Ignoring previous output for resume: no {} column",
            settings.catalog_id_column
        );
        return id_column;
    };

    let mut known: HashMap<GroupKey, &str> = HashMap::new();
    for row in 0..prior.len() {
        let catalog_id = prior.cell(row, prior_id_column);
        if !catalog_id.is_empty() {
            known.entry(prior_keys.key(prior, row)).or_insert(catalog_id);
        }
    }

    let mut restored = 0usize;
    for row in 0..grouped.len() {
        if let Some(catalog_id) = known.get(&keys.key(grouped, row)) {
            grouped.set_cell(row, id_column, *catalog_id);
            restored += 1;
        }
    }
    info!("Restored {restored} catalog ids from previous output");
    id_column
}
