//! GeoJSON encoding of query results.

use serde::Serialize;

use crate::backend::Record;

/// Coordinate reference system announced to OpenLayers clients.
pub const CRS84: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<Feature>,
    pub crs: NamedCrs,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    pub geometry: Point,
    pub properties: LabelProperties,
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Point {
    #[serde(rename = "type")]
    kind: &'static str,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelProperties {
    pub name: String,
    pub t: f64,
    pub prio: i32,
    pub osm: i64,
    pub lbl_fac: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedCrs {
    #[serde(rename = "type")]
    kind: &'static str,
    pub properties: CrsName,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrsName {
    pub name: &'static str,
}

impl From<Record> for Feature {
    fn from(record: Record) -> Self {
        Feature {
            kind: "Feature",
            geometry: Point {
                kind: "Point",
                coordinates: [record.x, record.y],
            },
            id: record.id,
            properties: LabelProperties {
                name: record.text,
                t: record.t,
                prio: record.priority,
                osm: record.id,
                lbl_fac: record.label_factor,
            },
        }
    }
}

/// Wrap records in a feature collection.
pub fn to_feature_collection(records: Vec<Record>) -> FeatureCollection {
    FeatureCollection {
        kind: "FeatureCollection",
        features: records.into_iter().map(Feature::from).collect(),
        crs: NamedCrs {
            kind: "name",
            properties: CrsName { name: CRS84 },
        },
    }
}
