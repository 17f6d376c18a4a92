//! Foreign keys of a detection row: device, location and resolution ids looked
//! up by name (or size) in their own tables.

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use super::pg_client::PostgrestClient;
use crate::config::SchemaConfig;
use crate::settings::DatabaseSettings;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("lookup failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lookup {
    Device(String),
    Location(String),
    Resolution { width: u32, height: u32 },
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Device(name) => write!(f, "device `{}`", name),
            Lookup::Location(name) => write!(f, "location `{}`", name),
            Lookup::Resolution { width, height } => write!(f, "resolution {}x{}", width, height),
        }
    }
}

impl Lookup {
    /// Table, id column and PostgREST filters of the lookup.
    fn query<'a>(&self, schema: &'a SchemaConfig) -> (&'a str, &'a str, Vec<(String, String)>) {
        match self {
            Lookup::Device(name) => (
                schema.device_table.as_str(),
                schema.device_id_column.as_str(),
                vec![(schema.device_name_column.clone(), format!("like.{}", name))],
            ),
            Lookup::Location(name) => (
                schema.location_table.as_str(),
                schema.location_id_column.as_str(),
                vec![(schema.location_name_column.clone(), format!("like.{}", name))],
            ),
            Lookup::Resolution { width, height } => (
                schema.resolution_table.as_str(),
                schema.resolution_id_column.as_str(),
                vec![
                    (schema.resolution_width_column.clone(), format!("eq.{}", width)),
                    (schema.resolution_height_column.clone(), format!("eq.{}", height)),
                ],
            ),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Lookup::Device(name) | Lookup::Location(name) => name.is_empty(),
            Lookup::Resolution { .. } => false,
        }
    }
}

pub async fn fetch_id(
    client: &PostgrestClient,
    schema: &SchemaConfig,
    lookup: &Lookup,
) -> Result<i64, LookupError> {
    if lookup.is_blank() {
        return Err(LookupError::NotFound(format!("{} (no name set)", lookup)));
    }

    let (table, id_column, filters) = lookup.query(schema);
    let rows = client
        .select(table, id_column, &filters)
        .await
        .map_err(|e| LookupError::Request(e.to_string()))?;

    let id = rows
        .first()
        .and_then(|row| row.get(id_column))
        .and_then(Value::as_i64)
        .ok_or_else(|| LookupError::NotFound(lookup.to_string()))?;

    info!("Resolved {} to id {}", lookup, id);
    Ok(id)
}

/// Ids a detection row points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeys {
    pub device: i64,
    pub location: i64,
    pub resolution: i64,
}

/// Resolved ids, kept until the endpoint or the looked-up value changes.
#[derive(Debug, Default)]
pub struct ForeignKeyCache {
    endpoint: String,
    device: Option<(Lookup, i64)>,
    location: Option<(Lookup, i64)>,
    resolution: Option<(Lookup, i64)>,
}

impl ForeignKeyCache {
    pub fn clear(&mut self) {
        self.device = None;
        self.location = None;
        self.resolution = None;
    }

    pub async fn resolve(
        &mut self,
        client: &PostgrestClient,
        schema: &SchemaConfig,
        settings: &DatabaseSettings,
    ) -> Result<ForeignKeys, LookupError> {
        if self.endpoint != client.endpoint() {
            self.clear();
            self.endpoint = client.endpoint().to_string();
        }

        let device = Lookup::Device(settings.device_name.clone());
        let location = Lookup::Location(settings.location_name.clone());
        let resolution = Lookup::Resolution {
            width: settings.resolution_width,
            height: settings.resolution_height,
        };

        Ok(ForeignKeys {
            device: cached(&mut self.device, device, client, schema).await?,
            location: cached(&mut self.location, location, client, schema).await?,
            resolution: cached(&mut self.resolution, resolution, client, schema).await?,
        })
    }
}

async fn cached(
    slot: &mut Option<(Lookup, i64)>,
    lookup: Lookup,
    client: &PostgrestClient,
    schema: &SchemaConfig,
) -> Result<i64, LookupError> {
    if let Some((cached_lookup, id)) = slot {
        if *cached_lookup == lookup {
            return Ok(*id);
        }
    }

    let id = fetch_id(client, schema, &lookup).await?;
    *slot = Some((lookup, id));
    Ok(id)
}
