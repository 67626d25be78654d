use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Polygon boundary supplied by the caller, as an ordered list of `[x, y]` pairs.
///
/// Pairs are forwarded to Earth Engine untouched, which reads them as
/// `[longitude, latitude]`. Geometric validity is left to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(Vec<[f64; 2]>);

impl Region {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.0
    }

    /// GeoJSON polygon with this boundary as its outer ring, closed if the caller left it open.
    pub fn to_geojson(&self) -> serde_json::Value {
        let mut ring = self.0.clone();
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }
        json!({ "type": "Polygon", "coordinates": [ring] })
    }
}

/// Body of `POST /api/sentinel2`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SubmitRequest {
    #[garde(required, length(min = 1))]
    pub coordinates: Option<Vec<[f64; 2]>>,
}

impl SubmitRequest {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self {
            coordinates: Some(points),
        }
    }

    /// Presence check only: the region must exist and hold at least one point.
    pub fn into_region(self) -> Result<Region, garde::Report> {
        self.validate()?;
        Ok(Region::new(self.coordinates.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]
    }

    #[test]
    fn test_missing_coordinates_rejected() {
        let request: SubmitRequest = serde_json::from_str("{}").unwrap();
        assert!(request.into_region().is_err());
    }

    #[test]
    fn test_empty_coordinates_rejected() {
        let request: SubmitRequest = serde_json::from_str(r#"{"coordinates": []}"#).unwrap();
        assert!(request.into_region().is_err());
    }

    #[test]
    fn test_valid_region_accepted() {
        let region = SubmitRequest::new(square()).into_region().unwrap();
        assert_eq!(region.points().len(), 5);
    }

    #[test]
    fn test_geojson_keeps_closed_ring() {
        let region = Region::new(square());
        let geometry = region.to_geojson();
        assert_eq!(geometry["type"], "Polygon");
        assert_eq!(geometry["coordinates"][0].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_geojson_closes_open_ring() {
        let region = Region::new(vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let ring = region.to_geojson()["coordinates"][0].clone();
        assert_eq!(ring.as_array().unwrap().len(), 4);
        assert_eq!(ring[3], json!([0.0, 0.0]));
    }
}
