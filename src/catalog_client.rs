//! Authenticated catalog lookups: identifier search and batched attribute fetch.

use log::debug;
use serde_json::{Map, Value};

use crate::auth::AuthManager;
use crate::backends::CatalogTransport;
use crate::config::MAX_ATTRIBUTE_BATCH;
use crate::error::{EnrichError, Result};

/// Attribute payload returned for one requested catalog identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    /// Identifier this record was requested for.
    pub requested_id: String,
    /// Identifier reported by the service; `None` for delisted or region-locked tracks.
    pub catalog_id: Option<String>,
    /// Flat descriptor map as returned by the service.
    pub fields: Map<String, Value>,
}

/// Lookups the enrichment pipeline needs from a catalog.
pub trait TrackCatalog {
    /// Returns the identifier of the first exact track+artist match, if any.
    fn resolve_identifier(&mut self, track_name: &str, artist_name: &str)
        -> Result<Option<String>>;
    /// Fetches attributes for at most 100 identifiers in a single request.
    fn fetch_attributes(&mut self, catalog_ids: &[String]) -> Result<Vec<AttributeRecord>>;
}

/// Thin request layer that asks the `AuthManager` for a token before every call.
pub struct CatalogClient<'a> {
    auth: &'a mut AuthManager,
    transport: &'a dyn CatalogTransport,
}

impl<'a> CatalogClient<'a> {
    pub fn new(auth: &'a mut AuthManager, transport: &'a dyn CatalogTransport) -> Self {
        Self { auth, transport }
    }

    fn search_query(track_name: &str, artist_name: &str) -> String {
        format!("track:\"{track_name}\" artist:\"{artist_name}\"")
    }

    fn first_track_id(payload: &Value) -> Result<Option<String>> {
        let Some(first) = payload
            .get("tracks")
            .and_then(|tracks| tracks.get("items"))
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            return Ok(None);
        };
        first
            .get("id")
            .and_then(Value::as_str)
            .map(|id| Some(id.to_string()))
            .ok_or_else(|| {
                EnrichError::MalformedResponse("search result item has no id".to_string())
            })
    }

    fn parse_attribute_records(
        catalog_ids: &[String],
        payload: &Value,
    ) -> Result<Vec<AttributeRecord>> {
        let entries = payload
            .get("audio_features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                EnrichError::MalformedResponse(
                    "attribute response has no audio_features array".to_string(),
                )
            })?;
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let requested_id = catalog_ids.get(index).cloned();
                match entry {
                    Value::Null => Ok(AttributeRecord {
                        requested_id: requested_id.unwrap_or_default(),
                        catalog_id: None,
                        fields: Map::new(),
                    }),
                    Value::Object(fields) => {
                        let catalog_id = fields
                            .get("id")
                            .and_then(Value::as_str)
                            .filter(|id| !id.is_empty())
                            .map(ToOwned::to_owned);
                        Ok(AttributeRecord {
                            requested_id: requested_id
                                .or_else(|| catalog_id.clone())
                                .unwrap_or_default(),
                            catalog_id,
                            fields: fields.clone(),
                        })
                    }
                    other => Err(EnrichError::MalformedResponse(format!(
                        "attribute entry {index} is neither an object nor null: {other}"
                    ))),
                }
            })
            .collect()
    }
}

impl TrackCatalog for CatalogClient<'_> {
    fn resolve_identifier(
        &mut self,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<String>> {
        let token = self.auth.get_valid_token()?;
        let query = Self::search_query(track_name, artist_name);
        debug!("Catalog search q={query}");
        let payload = self
            .transport
            .get_json("search", &[("q", query.as_str()), ("type", "track")], &token)?;
        Self::first_track_id(&payload)
    }

    fn fetch_attributes(&mut self, catalog_ids: &[String]) -> Result<Vec<AttributeRecord>> {
        if catalog_ids.is_empty() {
            return Ok(Vec::new());
        }
        if catalog_ids.len() > MAX_ATTRIBUTE_BATCH {
            return Err(EnrichError::Config(format!(
                "attribute requests take at most {MAX_ATTRIBUTE_BATCH} identifiers (got {})",
                catalog_ids.len()
            )));
        }
        let token = self.auth.get_valid_token()?;
        let joined = catalog_ids.join(",");
        let payload = self
            .transport
            .get_json("audio-features", &[("ids", joined.as_str())], &token)?;
        Self::parse_attribute_records(catalog_ids, &payload)
    }
}
