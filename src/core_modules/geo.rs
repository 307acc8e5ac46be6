// THEORY:
// The `geo` module holds the "dumb" data containers shared by every layer of
// the engine: geographic coordinates, zoom-tagged regions, and the JSON wire
// types the device backend speaks. Keeping these as plain serde structs does
// two jobs at once:
// 1.  **Wire Fidelity**: The backend serializes camelCase JSON
//     (`topLeft`, `deviceCount`, `regionSummaries`); the serde attributes
//     here are the single place that contract is spelled out.
// 2.  **Read-Only Flow**: A `QueryResponse` is immutable once received. The
//     pipeline swaps the whole value on each query completion; consumers
//     only ever borrow it, so there is no per-field merging or partial
//     mutation anywhere downstream.

use serde::{Deserialize, Serialize};

/// A geographic coordinate in degrees. WGS84, latitude north-positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// An axis-aligned lat/lng rectangle tagged with the zoom level that
/// produced it. Invariant: `top_left.lat > bot_right.lat` and
/// `top_left.lng < bot_right.lng`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub zoom: u32,
    pub top_left: LatLng,
    pub bot_right: LatLng,
}

impl Region {
    pub fn new(zoom: u32, top_left: LatLng, bot_right: LatLng) -> Self {
        Self {
            zoom,
            top_left,
            bot_right,
        }
    }
}

/// Aggregated device/happy/sad counts for one region, as reported by the
/// backend. Immutable once received; `happy_count + sad_count` never
/// exceeds `device_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    pub region: Region,
    pub device_count: u64,
    pub happy_count: u64,
    pub sad_count: u64,
}

/// POST body for the backend `query-devices` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub zoom: u32,
    pub top_left: LatLng,
    pub bot_right: LatLng,
}

/// One complete answer from the `query-devices` endpoint: world totals plus
/// the per-region summaries visible in the queried extent. Replaces the
/// previous response wholesale; responses are never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub device_count: u64,
    #[serde(default)]
    pub happy_count: u64,
    #[serde(default)]
    pub sad_count: u64,
    #[serde(default)]
    pub region_summaries: Vec<RegionSummary>,
}

impl QueryResponse {
    /// The world totals carried by this response.
    pub fn totals(&self) -> CountTotals {
        CountTotals {
            device_count: self.device_count,
            happy_count: self.happy_count,
            sad_count: self.sad_count,
        }
    }
}

/// A plain device/happy/sad triple used for every count reduction in the
/// engine (under-cursor sums, in-view sums, activity baselines).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountTotals {
    pub device_count: u64,
    pub happy_count: u64,
    pub sad_count: u64,
}

impl CountTotals {
    /// Sums whole-region counts over a set of summaries.
    pub fn sum_of<'a>(summaries: impl IntoIterator<Item = &'a RegionSummary>) -> Self {
        summaries
            .into_iter()
            .fold(Self::default(), |mut acc, summary| {
                acc.device_count += summary.device_count;
                acc.happy_count += summary.happy_count;
                acc.sad_count += summary.sad_count;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(device: u64, happy: u64, sad: u64) -> RegionSummary {
        RegionSummary {
            region: Region::new(
                10,
                LatLng::new(1.0, 0.0),
                LatLng::new(0.0, 1.0),
            ),
            device_count: device,
            happy_count: happy,
            sad_count: sad,
        }
    }

    #[test]
    fn query_request_serializes_to_backend_field_names() {
        let request = QueryRequest {
            zoom: 12,
            top_left: LatLng::new(51.5, -0.25),
            bot_right: LatLng::new(51.25, 0.25),
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["zoom"], 12);
        assert_eq!(json["topLeft"]["lat"], 51.5);
        assert_eq!(json["topLeft"]["lng"], -0.25);
        assert_eq!(json["botRight"]["lat"], 51.25);
        assert_eq!(json["botRight"]["lng"], 0.25);
    }

    #[test]
    fn query_response_parses_backend_shape() {
        let raw = r#"{
            "deviceCount": 1200,
            "happyCount": 800,
            "sadCount": 300,
            "regionSummaries": [
                {
                    "region": {
                        "zoom": 14,
                        "topLeft": {"lat": 51.5, "lng": -0.25},
                        "botRight": {"lat": 51.49, "lng": -0.24}
                    },
                    "deviceCount": 64,
                    "happyCount": 64,
                    "sadCount": 0
                }
            ]
        }"#;
        let response: QueryResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(response.device_count, 1200);
        assert_eq!(response.region_summaries.len(), 1);
        assert_eq!(response.region_summaries[0].region.zoom, 14);
        assert_eq!(response.region_summaries[0].happy_count, 64);
    }

    #[test]
    fn empty_response_degrades_to_zero_totals() {
        let response: QueryResponse = serde_json::from_str("{}").unwrap();

        assert_eq!(response.totals(), CountTotals::default());
        assert!(response.region_summaries.is_empty());
    }

    #[test]
    fn sum_of_reduces_whole_region_counts() {
        let totals = CountTotals::sum_of(&[summary(100, 40, 10), summary(40, 0, 40)]);

        assert_eq!(totals.device_count, 140);
        assert_eq!(totals.happy_count, 40);
        assert_eq!(totals.sad_count, 50);
    }
}
