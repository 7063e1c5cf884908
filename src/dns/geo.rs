//! The Geolocation Sorter (§4.4): stable-sorts multi-value A/AAAA records by
//! great-circle distance from the querying client.
//!
//! The haversine formula is carried over in shape from the donor's
//! `geodns.rs::haversine_distance`. The coordinate lookup wraps a
//! `maxminddb::Reader` the way the donor's `metrics/geoip.rs::GeoIpAnalyzer`
//! does: open-at-startup, `None` on a missing or invalid database path
//! rather than a hard error, so the rest of the system keeps running with
//! geo-sorting disabled (§6).

use std::cmp::Ordering;
use std::net::IpAddr;

use maxminddb::{geoip2, Reader};

use crate::dns::record::{Record, RecordType};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Great-circle distance between two points, per §4.4's formula:
/// `a = sin²(Δφ/2) + cos(φ₁)·cos(φ₂)·sin²(Δλ/2)`, `d = 2·R·asin(√a)`.
pub fn haversine_distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let dphi = (b.latitude - a.latitude).to_radians();
    let dlambda = (b.longitude - a.longitude).to_radians();

    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(0.0, 1.0).asin()
}

/// Resolves textual IP literals to coordinates. Implemented over a
/// MaxMind GeoLite2-City database; `None` from `lookup` places the value
/// last (§4.4 "coordinates cannot be resolved").
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: &str) -> Option<Coordinates>;
}

/// The production `GeoLookup`, backed by a read-only `maxminddb::Reader`
/// opened once at startup and shared across concurrent lookups (§5 "Shared
/// resources").
pub struct MaxMindGeoLookup {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeoLookup {
    /// Opens the database at `path`. Returns `None` (rather than an error)
    /// when the path is invalid, per §6: "if the path is invalid the
    /// Geolocation Sorter is disabled and the rest of the system
    /// continues."
    pub fn open(path: &str) -> Option<MaxMindGeoLookup> {
        match Reader::open_readfile(path) {
            Ok(reader) => Some(MaxMindGeoLookup { reader }),
            Err(e) => {
                log::warn!("failed to open geolocation database at {path}: {e}");
                None
            }
        }
    }
}

impl GeoLookup for MaxMindGeoLookup {
    fn lookup(&self, ip: &str) -> Option<Coordinates> {
        let addr: IpAddr = ip.parse().ok()?;
        let city: geoip2::City = self.reader.lookup(addr).ok()?;
        let location = city.location?;
        Some(Coordinates {
            latitude: location.latitude?,
            longitude: location.longitude?,
        })
    }
}

/// The Geolocation Sorter itself: an optional `GeoLookup` plus the sort
/// entry point. Absence of a lookup (disabled geo mode, or an invalid
/// database path) makes `sort` a no-op.
pub struct GeoSorter {
    lookup: Option<Box<dyn GeoLookup>>,
}

impl GeoSorter {
    pub fn new(lookup: Option<Box<dyn GeoLookup>>) -> GeoSorter {
        GeoSorter { lookup }
    }

    pub fn disabled() -> GeoSorter {
        GeoSorter { lookup: None }
    }

    /// Resolves a single client IP to coordinates, for callers that need
    /// the client's position before any records are in hand (the Query
    /// Frontend, to pass into `resolve`). `None` when geo-sorting is
    /// disabled or the address doesn't resolve.
    pub fn resolve_client(&self, ip: &str) -> Option<Coordinates> {
        self.lookup.as_ref().and_then(|lookup| lookup.lookup(ip))
    }

    /// In-place, stable sort of eligible records' `value` lists by
    /// ascending distance from `client`. Only A/AAAA records with ≥2
    /// values are touched; everything else (including a missing
    /// `client`/disabled lookup) is left untouched (§4.4).
    pub fn sort(&self, records: &mut [Record], client: Option<Coordinates>) {
        let (lookup, client) = match (&self.lookup, client) {
            (Some(lookup), Some(client)) => (lookup, client),
            _ => return,
        };

        for record in records.iter_mut() {
            if !matches!(record.rtype, RecordType::A | RecordType::Aaaa) {
                continue;
            }
            if record.value.len() < 2 {
                continue;
            }

            let mut indexed: Vec<(usize, f64)> = record
                .value
                .iter()
                .enumerate()
                .map(|(i, ip)| {
                    let dist = lookup
                        .lookup(ip)
                        .map(|coords| haversine_distance_km(client, coords))
                        .unwrap_or(f64::INFINITY);
                    (i, dist)
                })
                .collect();

            // sort_by is not guaranteed stable on ties across platforms;
            // sort_by_key/sort_by are stable in std, so equal distances
            // (including paired +infinity entries) preserve input order.
            indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

            record.value = indexed.into_iter().map(|(i, _)| record.value[i].clone()).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLookup(std::collections::HashMap<String, Coordinates>);

    impl GeoLookup for FixedLookup {
        fn lookup(&self, ip: &str) -> Option<Coordinates> {
            self.0.get(ip).copied()
        }
    }

    fn coords(lat: f64, lon: f64) -> Coordinates {
        Coordinates {
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn test_haversine_identical_points_is_zero() {
        let a = coords(37.7749, -122.4194);
        assert_eq!(haversine_distance_km(a, a), 0.0);
    }

    #[test]
    fn test_haversine_symmetry() {
        let a = coords(37.7749, -122.4194); // San Francisco
        let b = coords(40.7128, -74.0060); // New York
        let d_ab = haversine_distance_km(a, b);
        let d_ba = haversine_distance_km(b, a);
        assert!((d_ab - d_ba).abs() < 1e-9);
        // SF to NYC is ~4130km great-circle distance.
        assert!((d_ab - 4130.0).abs() < 50.0);
    }

    #[test]
    fn test_sort_orders_near_to_far() {
        let near = "10.0.0.1";
        let mid = "10.0.0.2";
        let far = "10.0.0.3";
        let mut db = std::collections::HashMap::new();
        db.insert(near.to_string(), coords(37.0, -122.0));
        db.insert(mid.to_string(), coords(39.0, -120.0));
        db.insert(far.to_string(), coords(40.7128, -74.0060));

        let sorter = GeoSorter::new(Some(Box::new(FixedLookup(db))));
        let mut records = vec![Record::new(
            "svc.ex.",
            RecordType::A,
            300,
            vec![far.to_string(), mid.to_string(), near.to_string()],
        )
        .unwrap()];

        sorter.sort(&mut records, Some(coords(37.7749, -122.4194)));
        assert_eq!(records[0].value, vec![near, mid, far]);
    }

    #[test]
    fn test_sort_is_noop_without_client_coords() {
        let sorter = GeoSorter::new(Some(Box::new(FixedLookup(Default::default()))));
        let mut records = vec![Record::new(
            "svc.ex.",
            RecordType::A,
            300,
            vec!["1.1.1.1".to_string(), "2.2.2.2".to_string()],
        )
        .unwrap()];
        let before = records.clone();

        sorter.sort(&mut records, None);
        assert_eq!(records, before);
    }

    #[test]
    fn test_sort_is_noop_on_single_value_or_other_types() {
        let sorter = GeoSorter::new(Some(Box::new(FixedLookup(Default::default()))));
        let mut records = vec![
            Record::new("svc.ex.", RecordType::A, 300, vec!["1.1.1.1".to_string()]).unwrap(),
            Record::new(
                "svc.ex.",
                RecordType::Txt,
                300,
                vec!["a".to_string(), "b".to_string()],
            )
            .unwrap(),
        ];
        let before = records.clone();
        sorter.sort(&mut records, Some(coords(0.0, 0.0)));
        assert_eq!(records, before);
    }

    #[test]
    fn test_resolve_client_delegates_to_lookup() {
        let mut db = std::collections::HashMap::new();
        db.insert("10.0.0.1".to_string(), coords(37.0, -122.0));
        let sorter = GeoSorter::new(Some(Box::new(FixedLookup(db))));

        assert_eq!(sorter.resolve_client("10.0.0.1"), Some(coords(37.0, -122.0)));
        assert_eq!(sorter.resolve_client("missing"), None);
        assert_eq!(GeoSorter::disabled().resolve_client("10.0.0.1"), None);
    }

    #[test]
    fn test_unresolvable_ip_sorts_last_and_is_idempotent() {
        let mut db = std::collections::HashMap::new();
        db.insert("10.0.0.1".to_string(), coords(37.0, -122.0));
        let sorter = GeoSorter::new(Some(Box::new(FixedLookup(db))));

        let mut records = vec![Record::new(
            "svc.ex.",
            RecordType::A,
            300,
            vec!["unresolvable".to_string(), "10.0.0.1".to_string()],
        )
        .unwrap()];

        sorter.sort(&mut records, Some(coords(37.7749, -122.4194)));
        assert_eq!(records[0].value, vec!["10.0.0.1", "unresolvable"]);

        let once = records.clone();
        sorter.sort(&mut records, Some(coords(37.7749, -122.4194)));
        assert_eq!(records, once);
    }
}
