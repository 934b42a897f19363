use crate::ViewerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque 128-bit marker identifier, carried as 32 lowercase hex characters.
///
/// Ids are minted client-side on marker creation, so an optimistic marker
/// keeps the same identity once the server confirms it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PoiId(String);

impl PoiId {
    pub fn generate() -> crate::Result<Self> {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| ViewerError::Id(format!("random source unavailable: {e}")))?;
        let mut hex = String::with_capacity(32);
        for byte in bytes {
            hex.push_str(&format!("{byte:02x}"));
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PoiId {
    type Error = ViewerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() == 32 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(Self(value))
        } else {
            Err(ViewerError::Id(format!("malformed marker id: {value:?}")))
        }
    }
}

impl From<PoiId> for String {
    fn from(id: PoiId) -> Self {
        id.0
    }
}

impl fmt::Display for PoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One point of interest. Coordinates are normalized `[0,1]` fractions of the
/// map dimensions, independent of pyramid resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiMarker {
    pub id: PoiId,
    #[serde(rename = "type")]
    pub marker_type: u32,
    pub x: f64,
    pub y: f64,
}

impl PoiMarker {
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && (0.0..=1.0).contains(&self.x)
            && (0.0..=1.0).contains(&self.y)
    }
}

/// One entry of the marker type catalog the toolbar is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerTypeInfo {
    pub id: u32,
    pub name: String,
}

/// Decodes the marker type catalog, dropping malformed rows
pub fn decode_types(data: &serde_json::Value) -> Vec<MarkerTypeInfo> {
    let Some(rows) = data.as_array() else {
        log::warn!("marker type payload is not an array");
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| match serde_json::from_value::<MarkerTypeInfo>(row.clone()) {
            Ok(info) => Some(info),
            Err(err) => {
                log::warn!("dropping malformed marker type record: {err}");
                None
            }
        })
        .collect()
}

/// Decodes a server marker list, dropping malformed rows instead of failing
/// the whole response.
pub fn decode_records(data: &serde_json::Value) -> Vec<PoiMarker> {
    let Some(rows) = data.as_array() else {
        log::warn!("marker list payload is not an array");
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| match serde_json::from_value::<PoiMarker>(row.clone()) {
            Ok(marker) if marker.is_valid() => Some(marker),
            Ok(marker) => {
                log::warn!("dropping marker {} with out-of-range coordinates", marker.id);
                None
            }
            Err(err) => {
                log::warn!("dropping malformed marker record: {err}");
                None
            }
        })
        .collect()
}
