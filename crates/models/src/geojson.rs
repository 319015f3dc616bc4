use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FEATURE_COLLECTION: &str = "FeatureCollection";
pub const FEATURE: &str = "Feature";
pub const EPSG_4326: &str = "EPSG:4326";

// Field order is alphabetical so the serialized objects come out with sorted
// keys, like the property maps.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    pub crs: Crs,
    pub features: Vec<Feature>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Crs {
    pub properties: CrsProperties,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrsProperties {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Geometry {
    pub coordinates: Value,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Crs {
    pub fn named(name: &str) -> Self {
        Self {
            properties: CrsProperties { name: name.to_string() },
            kind: "name".to_string(),
        }
    }
}

impl FeatureCollection {
    pub fn wgs84(features: Vec<Feature>) -> Self {
        Self {
            crs: Crs::named(EPSG_4326),
            features,
            kind: FEATURE_COLLECTION.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            geometry,
            properties,
            kind: FEATURE.to_string(),
        }
    }
}

/// One WordPress `country` post with nested objects flattened to dotted keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryRecord {
    pub fields: Map<String, Value>,
}

impl CountryRecord {
    pub const ISO3_FIELD: &'static str = "iso_3_code";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn iso3(&self) -> Option<&Value> {
        self.fields.get(Self::ISO3_FIELD)
    }
}

/// The subset of a boundary feature the merge keeps.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub adm0_name: Value,
    pub iso_3_code: Value,
    pub center_lat: Value,
    pub center_lon: Value,
    pub geometry_type: String,
    pub coordinates: Value,
}
