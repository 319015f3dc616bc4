use async_trait::async_trait;
use polio_models::{BoundaryRecord, CountryRecord, PolioError, SourcesConfig};
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub const WORDPRESS_SOURCE: &str = "wordpress";
pub const BOUNDARY_SOURCE: &str = "boundaries";

#[async_trait]
pub trait CountrySource: Send + Sync + 'static {
    async fn fetch_countries(&self) -> Result<Vec<CountryRecord>, PolioError>;
}

#[async_trait]
pub trait BoundarySource: Send + Sync + 'static {
    async fn fetch_boundaries(&self) -> Result<Vec<BoundaryRecord>, PolioError>;
}

pub fn build_client(config: &SourcesConfig) -> Result<Client, PolioError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| PolioError::InternalError { reason: e.to_string() })
}

/// Paginated reader for the WordPress REST `country` collection.
pub struct WordPressSource {
    client: Client,
    url: String,
    per_page: u32,
}

impl WordPressSource {
    pub fn new(client: Client, url: impl Into<String>, per_page: u32) -> Self {
        Self { client, url: url.into(), per_page }
    }

    pub fn from_config(client: Client, config: &SourcesConfig) -> Self {
        Self::new(client, config.wp_json_url.clone(), config.per_page)
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Value>, String> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("per_page", self.per_page), ("page", page)])
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        response.json::<Vec<Value>>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl CountrySource for WordPressSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_countries(&self) -> Result<Vec<CountryRecord>, PolioError> {
        let mut page = 1;
        let mut records = Vec::new();

        loop {
            let items = match self.fetch_page(page).await {
                Ok(items) => items,
                Err(reason) if records.is_empty() => {
                    error!("Request failed: {}", reason);
                    return Err(PolioError::UpstreamRequest {
                        source_name: WORDPRESS_SOURCE.to_string(),
                        reason,
                    });
                }
                Err(reason) => {
                    warn!(page, collected = records.len(), "Request failed, keeping earlier pages: {}", reason);
                    break;
                }
            };

            if items.is_empty() {
                break;
            }

            let short_page = items.len() < self.per_page as usize;
            records.extend(items.into_iter().map(|item| CountryRecord::new(flatten(item))));

            if short_page {
                break;
            }
            page += 1;
        }

        info!(records = records.len(), pages = page, "Fetched WordPress countries");
        Ok(records)
    }
}

/// Reader for a GeoJSON `FeatureCollection` of country boundaries.
pub struct GeoJsonBoundarySource {
    client: Client,
    url: String,
}

impl GeoJsonBoundarySource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    pub fn from_config(client: Client, config: &SourcesConfig) -> Self {
        Self::new(client, config.geojson_url.clone())
    }
}

#[async_trait]
impl BoundarySource for GeoJsonBoundarySource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_boundaries(&self) -> Result<Vec<BoundaryRecord>, PolioError> {
        let upstream_error = |reason: String| {
            error!("Request failed: {}", reason);
            PolioError::UpstreamRequest {
                source_name: BOUNDARY_SOURCE.to_string(),
                reason,
            }
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream_error(e.to_string()))?;
        let body: Value = response.json().await.map_err(|e| upstream_error(e.to_string()))?;

        let features = match body.get("features").and_then(Value::as_array) {
            Some(features) => features,
            None => {
                error!("No 'features' key in GeoJSON response");
                return Err(PolioError::MissingFeatures {
                    source_name: BOUNDARY_SOURCE.to_string(),
                });
            }
        };

        let mut records = Vec::with_capacity(features.len());
        for (index, feature) in features.iter().enumerate() {
            match boundary_from_feature(feature) {
                Some(record) => records.push(record),
                None => warn!(index, "Skipping boundary feature with missing fields"),
            }
        }

        debug!(records = records.len(), skipped = features.len() - records.len(), "Parsed boundary features");
        Ok(records)
    }
}

fn boundary_from_feature(feature: &Value) -> Option<BoundaryRecord> {
    let properties = feature.get("properties")?.as_object()?;
    let geometry = feature.get("geometry")?.as_object()?;

    Some(BoundaryRecord {
        adm0_name: properties.get("ADM0_NAME")?.clone(),
        iso_3_code: properties.get("ISO_3_CODE")?.clone(),
        center_lat: properties.get("CENTER_LAT")?.clone(),
        center_lon: properties.get("CENTER_LON")?.clone(),
        geometry_type: geometry.get("type")?.as_str()?.to_string(),
        coordinates: geometry.get("coordinates")?.clone(),
    })
}

/// Flattens nested objects into dotted keys (`{"acf":{"cases":3}}` becomes
/// `{"acf.cases":3}`). Arrays and scalars are left as they are, empty nested
/// objects disappear and a non-object record becomes an empty map.
pub fn flatten(value: Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(map) = value {
        flatten_into(&mut out, None, map);
    }
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&key), inner),
            other => {
                out.insert(key, other);
            }
        }
    }
}
