//! Geodesic primitives shared by clustering, fusion and the rule layer.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{GeoPoint, Geofence};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Distance from a point to each known fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceMatch {
    pub geofence_id: String,
    pub distance: f64,
    pub inside: bool,
}

fn validate_coord(lat: f64, lng: f64) -> CoreResult<()> {
    if !lat.is_finite() || !lng.is_finite() {
        return Err(CoreError::invalid("latitude/longitude must be finite"));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoreError::invalid(format!("latitude out of range: {lat}")));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(CoreError::invalid(format!("longitude out of range: {lng}")));
    }
    Ok(())
}

/// Great-circle distance in meters.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Checked variant for host-supplied coordinates.
pub fn checked_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> CoreResult<f64> {
    validate_coord(lat1, lng1)?;
    validate_coord(lat2, lng2)?;
    Ok(haversine_distance(lat1, lng1, lat2, lng2))
}

pub fn is_inside_geofence(lat: f64, lng: f64, fence: &Geofence) -> CoreResult<bool> {
    validate_coord(lat, lng)?;
    let dist = haversine_distance(lat, lng, fence.latitude, fence.longitude);
    Ok(dist <= fence.radius_meters)
}

/// Distance + membership for every fence, in input order.
pub fn geofences_at_location(
    lat: f64,
    lng: f64,
    fences: &[Geofence],
) -> CoreResult<Vec<GeofenceMatch>> {
    validate_coord(lat, lng)?;

    Ok(fences
        .iter()
        .map(|fence| {
            let distance = haversine_distance(lat, lng, fence.latitude, fence.longitude);
            GeofenceMatch {
                geofence_id: fence.id.clone(),
                distance,
                inside: distance <= fence.radius_meters,
            }
        })
        .collect())
}

/// Arithmetic centroid. `(0, 0)` for an empty set.
pub fn calculate_center(points: &[GeoPoint]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;
    (sum_lat / n, sum_lng / n)
}

/// Percentile distance from the center, clamped to [50, 500] m; a reasonable
/// default when there are no points.
pub fn calculate_percentile_radius(
    points: &[GeoPoint],
    center_lat: f64,
    center_lng: f64,
    percentile: f64,
) -> f64 {
    if points.is_empty() {
        return 100.0;
    }

    let mut distances: Vec<f64> = points
        .iter()
        .map(|p| haversine_distance(center_lat, center_lng, p.latitude, p.longitude))
        .collect();
    distances.sort_by(f64::total_cmp);

    let idx = ((distances.len() as f64 * percentile) as usize).min(distances.len() - 1);
    distances[idx].clamp(50.0, 500.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng, 0, 10.0)
    }

    #[test]
    fn haversine_known_distance() {
        // Beijing Tiananmen → Forbidden City, roughly 1 km.
        let d = haversine_distance(39.9087, 116.3975, 39.9163, 116.3972);
        assert!((d - 845.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn zero_distance_for_same_point() {
        assert!(haversine_distance(31.23, 121.47, 31.23, 121.47) < 1e-9);
    }

    #[test]
    fn rejects_out_of_domain_coordinates() {
        assert!(checked_distance(91.0, 0.0, 0.0, 0.0).is_err());
        assert!(checked_distance(0.0, 181.0, 0.0, 0.0).is_err());
        assert!(checked_distance(f64::NAN, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn geofence_membership() {
        let fence = Geofence {
            id: "gf_home".into(),
            name: "家".into(),
            latitude: 39.9042,
            longitude: 116.4074,
            radius_meters: 100.0,
            category: "home".into(),
        };
        assert!(is_inside_geofence(39.9042, 116.4074, &fence).unwrap());
        assert!(!is_inside_geofence(39.92, 116.4074, &fence).unwrap());

        let matches = geofences_at_location(39.9042, 116.4074, &[fence]).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].inside);
        assert!(matches[0].distance < 1.0);
    }

    #[test]
    fn centroid_and_radius() {
        let points = vec![
            point(39.9040, 116.4074),
            point(39.9044, 116.4074),
            point(39.9042, 116.4070),
            point(39.9042, 116.4078),
        ];
        let (lat, lng) = calculate_center(&points);
        assert!((lat - 39.9042).abs() < 1e-6);
        assert!((lng - 116.4074).abs() < 1e-6);

        // Tight cluster: clamp raises the radius to the 50 m floor.
        let radius = calculate_percentile_radius(&points, lat, lng, 0.95);
        assert_eq!(radius, 50.0);

        assert_eq!(calculate_percentile_radius(&[], 0.0, 0.0, 0.95), 100.0);
    }
}
