//! DBSCAN place discovery over accumulated GPS history: clusters become
//! named, categorized places with a time-usage pattern.

use serde::{Deserialize, Serialize};

use crate::config::ClusterConfig;
use crate::error::{CoreError, CoreResult};
use crate::geo::{calculate_center, calculate_percentile_radius, haversine_distance};
use crate::types::GeoPoint;

const UNCLASSIFIED: i32 = -1;
const NOISE: i32 = -2;

/// Hours-of-day a place is visited, split by weekday/weekend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePattern {
    pub weekday_hours: Vec<u32>,
    pub weekend_hours: Vec<u32>,
    pub night_count: u32,
    pub workday_count: u32,
    pub weekend_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_meters: f64,
    pub point_count: usize,
    pub first_seen: i64,
    pub last_seen: i64,
    pub total_stay_ms: i64,
    pub time_pattern: TimePattern,
    pub category: String,
    pub name: String,
    pub confidence: f64,
}

pub struct PlaceDiscovery {
    config: ClusterConfig,
}

impl PlaceDiscovery {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// Cluster a point set. Returns one `Cluster` per discovered place with
    /// at least `min_samples` members.
    pub fn cluster(&self, points: &[GeoPoint]) -> CoreResult<Vec<Cluster>> {
        for p in points {
            if !p.latitude.is_finite()
                || !p.longitude.is_finite()
                || !(-90.0..=90.0).contains(&p.latitude)
                || !(-180.0..=180.0).contains(&p.longitude)
            {
                return Err(CoreError::invalid(format!(
                    "point out of domain: ({}, {})",
                    p.latitude, p.longitude
                )));
            }
        }

        let mut results = Vec::new();
        if points.len() < self.config.min_samples {
            return Ok(results);
        }

        let mut labels = vec![UNCLASSIFIED; points.len()];
        let mut cluster_count: i32 = 0;

        for i in 0..points.len() {
            if labels[i] != UNCLASSIFIED {
                continue;
            }

            let neighbors = self.neighbors(points, i);
            if neighbors.len() < self.config.min_samples {
                labels[i] = NOISE;
                continue;
            }

            self.expand_cluster(points, i, neighbors, &mut labels, cluster_count);
            cluster_count += 1;
        }

        for cid in 0..cluster_count {
            let indices: Vec<usize> = (0..points.len()).filter(|&i| labels[i] == cid).collect();
            if indices.len() >= self.config.min_samples {
                results.push(self.build_cluster(points, &indices, cid));
            }
        }

        tracing::debug!(
            points = points.len(),
            clusters = results.len(),
            "place discovery pass complete"
        );
        Ok(results)
    }

    fn neighbors(&self, points: &[GeoPoint], idx: usize) -> Vec<usize> {
        let p = &points[idx];
        (0..points.len())
            .filter(|&i| i != idx)
            .filter(|&i| {
                haversine_distance(p.latitude, p.longitude, points[i].latitude, points[i].longitude)
                    <= self.config.epsilon_meters
            })
            .collect()
    }

    fn expand_cluster(
        &self,
        points: &[GeoPoint],
        idx: usize,
        neighbors: Vec<usize>,
        labels: &mut [i32],
        cluster_id: i32,
    ) {
        labels[idx] = cluster_id;

        let mut in_queue = vec![false; points.len()];
        let mut queue = neighbors;
        for &n in &queue {
            in_queue[n] = true;
        }

        let mut head = 0;
        while head < queue.len() {
            let current = queue[head];
            head += 1;

            if labels[current] == NOISE {
                // Density-reachable noise becomes a border point.
                labels[current] = cluster_id;
            }
            if labels[current] != UNCLASSIFIED {
                continue;
            }
            labels[current] = cluster_id;

            let current_neighbors = self.neighbors(points, current);
            if current_neighbors.len() >= self.config.min_samples {
                for n in current_neighbors {
                    if (labels[n] == UNCLASSIFIED || labels[n] == NOISE) && !in_queue[n] {
                        in_queue[n] = true;
                        queue.push(n);
                    }
                }
            }
        }
    }

    fn build_cluster(&self, points: &[GeoPoint], indices: &[usize], cluster_id: i32) -> Cluster {
        let members: Vec<GeoPoint> = indices.iter().map(|&i| points[i]).collect();

        let (center_lat, center_lng) = calculate_center(&members);
        let radius_meters = calculate_percentile_radius(&members, center_lat, center_lng, 0.95);

        let mut timestamps: Vec<i64> = members.iter().map(|p| p.timestamp).collect();
        timestamps.sort_unstable();

        let total_stay_ms = timestamps
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|gap| *gap < self.config.max_stay_gap_ms)
            .sum();

        let time_pattern = analyze_time_pattern(&members);
        let category = infer_category(&time_pattern, members.len());
        let name = category_name(&category).to_string();

        let mut cluster = Cluster {
            id: format!("cluster_{cluster_id}"),
            center_lat,
            center_lng,
            radius_meters,
            point_count: members.len(),
            first_seen: *timestamps.first().unwrap_or(&0),
            last_seen: *timestamps.last().unwrap_or(&0),
            total_stay_ms,
            time_pattern,
            category,
            name,
            confidence: 0.0,
        };
        cluster.confidence = calculate_confidence(&cluster);
        cluster
    }
}

/// Hour-of-day and weekday derived directly from the epoch timestamp.
fn hour_and_weekday(timestamp_ms: i64) -> (u32, u32) {
    let seconds = timestamp_ms / 1000;
    let hour = ((seconds / 3600) % 24) as u32;
    // 1970-01-01 was a Thursday; 0 = Sunday.
    let weekday = (((seconds / 86_400) + 4) % 7) as u32;
    (hour, weekday)
}

fn analyze_time_pattern(points: &[GeoPoint]) -> TimePattern {
    let mut pattern = TimePattern::default();

    for p in points {
        let (hour, weekday) = hour_and_weekday(p.timestamp);
        let is_weekend = weekday == 0 || weekday == 6;
        let is_night = hour >= 22 || hour < 6;
        let is_work_hour = (9..18).contains(&hour);

        if is_weekend {
            if !pattern.weekend_hours.contains(&hour) {
                pattern.weekend_hours.push(hour);
            }
            pattern.weekend_count += 1;
        } else {
            if !pattern.weekday_hours.contains(&hour) {
                pattern.weekday_hours.push(hour);
            }
            if is_work_hour {
                pattern.workday_count += 1;
            }
        }

        if is_night {
            pattern.night_count += 1;
        }
    }

    pattern
}

fn infer_category(pattern: &TimePattern, total_points: usize) -> String {
    let total = total_points as f64;
    let night_ratio = pattern.night_count as f64 / total;
    let workday_ratio = pattern.workday_count as f64 / total;
    let weekend_ratio = pattern.weekend_count as f64 / total;

    if night_ratio > 0.4 {
        return "home".to_string();
    }
    if workday_ratio > 0.5 && weekend_ratio < 0.2 {
        return "work".to_string();
    }
    if weekend_ratio > 0.4 {
        return "gym".to_string();
    }
    if pattern.weekday_hours.iter().any(|h| (11..=14).contains(h)) {
        return "restaurant".to_string();
    }

    "other".to_string()
}

/// Display names are a stable host contract; the bytes must not change.
fn category_name(category: &str) -> &'static str {
    match category {
        "home" => "家",
        "work" => "公司",
        "gym" => "健身房",
        "restaurant" => "常去餐厅",
        _ => "常去地点",
    }
}

fn calculate_confidence(cluster: &Cluster) -> f64 {
    let mut score = 0.0;

    score += (cluster.point_count as f64 / 100.0).min(0.3);
    score += (cluster.total_stay_ms as f64 / (86_400_000.0 * 7.0)).min(0.3);

    if !cluster.time_pattern.weekday_hours.is_empty() {
        score += 0.2;
    }
    if !cluster.time_pattern.weekend_hours.is_empty() {
        score += 0.2;
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ~1e-5 deg latitude ≈ 1.1 m.
    fn jitter(base: f64, i: usize) -> f64 {
        base + (i % 7) as f64 * 1.5e-5
    }

    fn dense_points(lat: f64, lng: f64, count: usize, start_ts: i64, step_ms: i64) -> Vec<GeoPoint> {
        (0..count)
            .map(|i| GeoPoint::new(jitter(lat, i), jitter(lng, i + 3), start_ts + i as i64 * step_ms, 10.0))
            .collect()
    }

    fn discovery() -> PlaceDiscovery {
        PlaceDiscovery::new(ClusterConfig::default())
    }

    #[test]
    fn too_few_points_yield_nothing() {
        let points = dense_points(39.9042, 116.4074, 5, 0, 60_000);
        assert!(discovery().cluster(&points).unwrap().is_empty());
    }

    #[test]
    fn single_dense_cluster_is_found() {
        let points = dense_points(39.9042, 116.4074, 30, 0, 60_000);
        let clusters = discovery().cluster(&points).unwrap();
        assert_eq!(clusters.len(), 1);

        let c = &clusters[0];
        assert_eq!(c.point_count, 30);
        assert_eq!(c.id, "cluster_0");
        assert!((c.center_lat - 39.9042).abs() < 1e-3);
        assert!((50.0..=500.0).contains(&c.radius_meters));
        assert_eq!(c.first_seen, 0);
        assert_eq!(c.last_seen, 29 * 60_000);
        // Every minute-gap counts toward the stay.
        assert_eq!(c.total_stay_ms, 29 * 60_000);
    }

    #[test]
    fn far_apart_groups_become_separate_clusters() {
        let mut points = dense_points(39.9042, 116.4074, 15, 0, 60_000);
        points.extend(dense_points(39.9500, 116.5000, 15, 10_000_000, 60_000));
        let clusters = discovery().cluster(&points).unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.point_count == 15));
    }

    #[test]
    fn sparse_points_are_noise() {
        // 30 points spread hundreds of meters apart: no neighborhood
        // reaches min_samples.
        let points: Vec<GeoPoint> = (0..30)
            .map(|i| GeoPoint::new(39.9 + i as f64 * 0.01, 116.4, i as i64 * 1000, 10.0))
            .collect();
        assert!(discovery().cluster(&points).unwrap().is_empty());
    }

    #[test]
    fn stay_gaps_longer_than_threshold_do_not_count() {
        let config = ClusterConfig::default();
        // Two visits separated by 10 hours.
        let mut points = dense_points(39.9042, 116.4074, 10, 0, 60_000);
        points.extend(dense_points(39.9042, 116.4074, 10, 36_000_000, 60_000));
        let clusters = PlaceDiscovery::new(config).cluster(&points).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].total_stay_ms, 18 * 60_000);
    }

    #[test]
    fn night_heavy_cluster_reads_as_home() {
        // Thursday 1970-01-01 22:00 UTC onwards, hourly fixes through the
        // night for five weekday nights.
        let mut points = Vec::new();
        let mut ts = 22 * 3_600_000i64;
        for _night in 0..5 {
            for h in 0..8 {
                points.push(GeoPoint::new(
                    jitter(39.9042, h),
                    jitter(116.4074, h + 2),
                    ts + h as i64 * 3_600_000,
                    10.0,
                ));
            }
            ts += 86_400_000;
        }
        let clusters = discovery().cluster(&points).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].category, "home");
        assert_eq!(clusters[0].name, "家");
    }

    #[test]
    fn workday_cluster_reads_as_work() {
        // Weekday working hours only: Mon 1970-01-05 onward, 10:00-16:00.
        let mut points = Vec::new();
        for day in 0..5 {
            let day_start = (4 + day) * 86_400_000i64;
            for h in 10..16 {
                points.push(GeoPoint::new(
                    jitter(31.2304, h as usize),
                    jitter(121.4737, h as usize + 1),
                    day_start + h * 3_600_000,
                    10.0,
                ));
            }
        }
        let clusters = discovery().cluster(&points).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].category, "work");
        assert_eq!(clusters[0].name, "公司");
    }

    #[test]
    fn rejects_out_of_domain_points() {
        let points = vec![GeoPoint::new(f64::NAN, 116.0, 0, 10.0); 12];
        assert!(discovery().cluster(&points).is_err());
    }
}
