use polio_models::{BoundaryRecord, CountryRecord, Feature, FeatureCollection, Geometry};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

pub const ADM0_NAME: &str = "ADM0_NAME";
const COUNTRY_SUFFIX: &str = "_x";
const BOUNDARY_SUFFIX: &str = "_y";
const SENTINEL_ISO3: &str = "AFG";

/// A country matched with one boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub properties: Map<String, Value>,
    pub geometry: Geometry,
}

pub fn normalize_iso3(value: &Value) -> Option<String> {
    value.as_str().map(|code| code.trim().to_uppercase())
}

/// Inner join of countries and boundaries on normalised ISO3 code.
///
/// Rows follow the country order; a country matching several boundaries yields
/// one row per match. Every row carries the union of country columns (absent
/// ones as `null`) plus the boundary's `ADM0_NAME`.
pub fn inner_join(countries: &[CountryRecord], boundaries: &[BoundaryRecord]) -> Vec<JoinedRow> {
    let mut by_iso3: HashMap<String, Vec<&BoundaryRecord>> = HashMap::new();
    for boundary in boundaries {
        if let Some(code) = normalize_iso3(&boundary.iso_3_code) {
            by_iso3.entry(code).or_default().push(boundary);
        }
    }

    let columns: BTreeSet<&str> = countries
        .iter()
        .flat_map(|c| c.fields.keys().map(String::as_str))
        .collect();
    let name_collides = columns.contains(ADM0_NAME);

    let mut rows = Vec::new();
    for country in countries {
        let Some(code) = country.iso3().and_then(normalize_iso3) else {
            continue;
        };
        let Some(matches) = by_iso3.get(&code) else {
            continue;
        };

        for boundary in matches {
            let mut properties = Map::new();
            for column in &columns {
                let value = if *column == CountryRecord::ISO3_FIELD {
                    Value::String(code.clone())
                } else {
                    country.fields.get(*column).cloned().unwrap_or(Value::Null)
                };
                let key = if name_collides && *column == ADM0_NAME {
                    format!("{ADM0_NAME}{COUNTRY_SUFFIX}")
                } else {
                    (*column).to_string()
                };
                properties.insert(key, value);
            }

            let name_key = if name_collides {
                format!("{ADM0_NAME}{BOUNDARY_SUFFIX}")
            } else {
                ADM0_NAME.to_string()
            };
            properties.insert(name_key, boundary.adm0_name.clone());

            rows.push(JoinedRow {
                properties,
                geometry: Geometry {
                    coordinates: boundary.coordinates.clone(),
                    kind: boundary.geometry_type.clone(),
                },
            });
        }
    }

    let has_sentinel = rows
        .iter()
        .any(|row| row.properties.get(CountryRecord::ISO3_FIELD).and_then(Value::as_str) == Some(SENTINEL_ISO3));
    if has_sentinel {
        debug!("Afghanistan (ISO_3_CODE: AFG) is present in the merged data.");
    } else {
        warn!("Afghanistan (ISO_3_CODE: AFG) is missing in the merged data.");
    }

    debug!(countries = countries.len(), boundaries = boundaries.len(), rows = rows.len(), "Joined datasets");
    rows
}

pub fn to_feature_collection(rows: Vec<JoinedRow>) -> FeatureCollection {
    FeatureCollection::wgs84(
        rows.into_iter()
            .map(|row| Feature::new(row.geometry, row.properties))
            .collect(),
    )
}

pub fn merge(countries: &[CountryRecord], boundaries: &[BoundaryRecord]) -> FeatureCollection {
    to_feature_collection(inner_join(countries, boundaries))
}
