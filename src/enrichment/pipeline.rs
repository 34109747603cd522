//! End-to-end enrichment run over a listening-history file.
//!
//! The output file is the only checkpoint: it is rewritten after every identifier
//! lookup and after every attribute batch, so an interrupted run resumes from
//! whatever the last write recorded.

use std::path::{Path, PathBuf};

use log::{error, info};

use crate::catalog_client::{AttributeRecord, TrackCatalog};
use crate::config::{PipelineConfig, MAX_ATTRIBUTE_BATCH};
use crate::dataset::Table;
use crate::error::Result;

use super::aggregate::{group_by_play_count, restore_catalog_ids, KeyColumns};
use super::attributes::{join_attributes, missing_tracks_table, partition_records};
use super::pacer::RequestPacer;

/// Counters describing one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tracks: usize,
    pub lookups: usize,
    pub unresolved: usize,
    pub attribute_batches: usize,
    pub missing_attributes: usize,
    pub output_written: bool,
}

pub struct EnrichmentPipeline {
    settings: PipelineConfig,
    output_path: PathBuf,
    missing_path: PathBuf,
    pacer: Box<dyn RequestPacer>,
}

impl EnrichmentPipeline {
    pub fn new(settings: PipelineConfig, pacer: Box<dyn RequestPacer>) -> Self {
        let output_path = PathBuf::from(&settings.output_path);
        let missing_path = PathBuf::from(&settings.missing_tracks_path);
        Self {
            settings,
            output_path,
            missing_path,
            pacer,
        }
    }

    pub fn run(
        &mut self,
        catalog: &mut dyn TrackCatalog,
        input_path: &Path,
    ) -> Result<RunSummary> {
        let history = Table::read(input_path, self.settings.input_delimiter)?;
        let keys = KeyColumns::require(&history, &self.settings)?;
        info!(
            "Loaded {} history rows from {}",
            history.len(),
            input_path.display()
        );

        let mut base = group_by_play_count(
            &history,
            keys,
            self.settings.min_play_count,
            &self.settings.play_count_column,
        );
        let prior = Table::read_if_exists(&self.output_path, self.settings.output_delimiter)?;
        let id_column = restore_catalog_ids(&mut base, keys, prior.as_ref(), &self.settings);

        let mut summary = RunSummary {
            tracks: base.len(),
            ..RunSummary::default()
        };
        self.resolve_missing_ids(catalog, &mut base, keys, id_column, &mut summary)?;
        self.fetch_and_merge(catalog, &base, keys, id_column, &mut summary)?;
        Ok(summary)
    }

    /// Looks up every row without an identifier, persisting after each lookup.
    fn resolve_missing_ids(
        &mut self,
        catalog: &mut dyn TrackCatalog,
        base: &mut Table,
        keys: KeyColumns,
        id_column: usize,
        summary: &mut RunSummary,
    ) -> Result<()> {
        for row in 0..base.len() {
            if !base.cell(row, id_column).is_empty() {
                continue;
            }
            let track = base.cell(row, keys.track).to_string();
            let artist = base.cell(row, keys.artist).to_string();
            self.pacer.wait_turn();
            let catalog_id = catalog.resolve_identifier(&track, &artist)?;
            summary.lookups += 1;
            match catalog_id.as_deref() {
                Some(catalog_id) => {
                    info!("Updated {track} - {artist} with catalog id {catalog_id}");
                    base.set_cell(row, id_column, catalog_id);
                }
                None => {
                    info!("Updated {track} - {artist} with catalog id none");
                    summary.unresolved += 1;
                }
            }
            base.write_atomic(&self.output_path, self.settings.output_delimiter)?;
        }
        Ok(())
    }

    /// Fetches attributes batch by batch and writes the joined result through
    /// after each batch once at least one record is usable.
    fn fetch_and_merge(
        &mut self,
        catalog: &mut dyn TrackCatalog,
        base: &Table,
        keys: KeyColumns,
        id_column: usize,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let catalog_ids = unique_catalog_ids(base, id_column);
        let batch_size = self.settings.batch_size.clamp(1, MAX_ATTRIBUTE_BATCH);
        let mut valid: Vec<AttributeRecord> = Vec::new();
        let mut missing: Vec<AttributeRecord> = Vec::new();

        for (batch_index, chunk) in catalog_ids.chunks(batch_size).enumerate() {
            let start = batch_index * batch_size;
            info!(
                "Batch {}: fetching identifiers {} - {}",
                batch_index + 1,
                start,
                start + chunk.len()
            );
            self.pacer.wait_turn();
            let records = catalog.fetch_attributes(chunk)?;
            summary.attribute_batches += 1;

            let (batch_valid, batch_missing) = partition_records(records);
            valid.extend(batch_valid);
            let missing_grew = !batch_missing.is_empty();
            missing.extend(batch_missing);

            if missing_grew {
                missing_tracks_table(base, keys, id_column, &missing)
                    .write_atomic(&self.missing_path, self.settings.output_delimiter)?;
            }
            if !valid.is_empty() {
                join_attributes(base, id_column, &valid)
                    .write_atomic(&self.output_path, self.settings.output_delimiter)?;
                summary.output_written = true;
            }
        }

        summary.missing_attributes = missing.len();
        if !missing.is_empty() {
            info!(
                "Stored {} missing tracks in {} for manual addition",
                missing.len(),
                self.missing_path.display()
            );
        }
        if valid.is_empty() {
            error!(
                "No valid audio attributes were returned; {} was left unchanged",
                self.output_path.display()
            );
            return Ok(());
        }
        info!(
            "Processed data saved to {} with {} songs.",
            self.output_path.display(),
            base.len()
        );
        Ok(())
    }
}

/// Non-empty identifiers in first-occurrence order, each listed once.
fn unique_catalog_ids(base: &Table, id_column: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    (0..base.len())
        .map(|row| base.cell(row, id_column))
        .filter(|catalog_id| !catalog_id.is_empty())
        .filter(|catalog_id| seen.insert(*catalog_id))
        .map(ToOwned::to_owned)
        .collect()
}
