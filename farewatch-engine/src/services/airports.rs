//! Embedded airport table and metro-area grouping.
//!
//! A compact CSV of the scannable airport network is compiled into the
//! binary. The matcher uses it to treat nearby airports (e.g. GRO and
//! BCN) as one destination area and the API uses it to resolve a
//! country filter to concrete IATA codes.

use std::collections::HashMap;

use once_cell::sync::Lazy;

const AIRPORTS_CSV: &str = include_str!("../../data/airports.csv");

#[derive(Debug, Clone, Copy)]
pub struct Airport {
    pub iata: &'static str,
    pub name: &'static str,
    /// ISO 3166-1 alpha-2
    pub country: &'static str,
    pub lat: f64,
    pub lon: f64,
}

static AIRPORTS: Lazy<HashMap<&'static str, Airport>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for line in AIRPORTS_CSV.lines().skip(1) {
        let mut fields = line.split(',');
        let (Some(iata), Some(name), Some(country), Some(lat), Some(lon)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let (Ok(lat), Ok(lon)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
            continue;
        };
        table.insert(
            iata,
            Airport {
                iata,
                name,
                country,
                lat,
                lon,
            },
        );
    }
    table
});

pub fn lookup(iata: &str) -> Option<&'static Airport> {
    AIRPORTS.get(iata)
}

/// ISO country code for an airport, if it is in the table.
pub fn country_of(iata: &str) -> Option<&'static str> {
    AIRPORTS.get(iata).map(|a| a.country)
}

/// All airports in a country, case-insensitive on the code. Sorted.
pub fn iatas_for_country(country: &str) -> Vec<String> {
    let mut iatas: Vec<String> = AIRPORTS
        .values()
        .filter(|a| a.country.eq_ignore_ascii_case(country))
        .map(|a| a.iata.to_string())
        .collect();
    iatas.sort();
    iatas
}

/// Great-circle distance in km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (rlat1, rlon1) = (lat1.to_radians(), lon1.to_radians());
    let (rlat2, rlon2) = (lat2.to_radians(), lon2.to_radians());
    let dlat = rlat2 - rlat1;
    let dlon = rlon2 - rlon1;
    let a = (dlat / 2.0).sin().powi(2) + rlat1.cos() * rlat2.cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Whether two airports are within `radius_km` of each other. An
/// airport is always near itself; unknown airports are near nothing
/// else.
pub fn are_nearby(iata_a: &str, iata_b: &str, radius_km: f64) -> bool {
    if iata_a == iata_b {
        return true;
    }
    if radius_km <= 0.0 {
        return false;
    }
    match (lookup(iata_a), lookup(iata_b)) {
        (Some(a), Some(b)) => haversine_km(a.lat, a.lon, b.lat, b.lon) <= radius_km,
        _ => false,
    }
}

/// IATA codes within `radius_km` of the given airport, the airport
/// itself first, others sorted. Unknown codes and non-positive radii
/// yield only the airport itself.
pub fn nearby_airports(iata: &str, radius_km: f64) -> Vec<String> {
    let mut result = vec![iata.to_string()];
    let Some(center) = lookup(iata) else {
        return result;
    };
    if radius_km <= 0.0 {
        return result;
    }

    let mut others: Vec<String> = AIRPORTS
        .values()
        .filter(|a| a.iata != iata)
        .filter(|a| haversine_km(center.lat, center.lon, a.lat, a.lon) <= radius_km)
        .map(|a| a.iata.to_string())
        .collect();
    others.sort();
    result.extend(others);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        assert_eq!(haversine_km(41.0, 2.0, 41.0, 2.0), 0.0);
    }

    #[test]
    fn test_haversine_bcn_gro() {
        // BCN to GRO is roughly 80-95 km
        let dist = haversine_km(41.2971, 2.07846, 41.904639, 2.761774);
        assert!((75.0..=100.0).contains(&dist), "got {dist}");
    }

    #[test]
    fn test_haversine_bcn_psa() {
        let dist = haversine_km(41.2971, 2.07846, 43.6839, 10.3927);
        assert!((700.0..=900.0).contains(&dist), "got {dist}");
    }

    #[test]
    fn test_haversine_antipodal() {
        // Half the circumference
        let dist = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((20000.0..=20100.0).contains(&dist), "got {dist}");
    }

    #[test]
    fn test_lookup_and_country() {
        assert_eq!(lookup("BCN").map(|a| a.name), Some("Barcelona"));
        assert_eq!(country_of("PSA"), Some("IT"));
        assert_eq!(country_of("ZZZ"), None);
    }

    #[test]
    fn test_iatas_for_country_case_insensitive() {
        let spain = iatas_for_country("es");
        assert!(spain.contains(&"BCN".to_string()));
        assert!(spain.contains(&"GRO".to_string()));
        assert!(!spain.contains(&"PSA".to_string()));
    }

    #[test]
    fn test_nearby_includes_self_and_finds_gro() {
        let result = nearby_airports("BCN", 100.0);
        assert_eq!(result[0], "BCN");
        assert!(result.contains(&"GRO".to_string()));
        assert!(result.contains(&"REU".to_string()));
    }

    #[test]
    fn test_nearby_zero_or_negative_radius_only_self() {
        assert_eq!(nearby_airports("BCN", 0.0), vec!["BCN"]);
        assert_eq!(nearby_airports("BCN", -1.0), vec!["BCN"]);
    }

    #[test]
    fn test_nearby_unknown_iata_only_self() {
        assert_eq!(nearby_airports("ZZZ", 100.0), vec!["ZZZ"]);
    }

    #[test]
    fn test_are_nearby_symmetric() {
        assert!(are_nearby("BCN", "BCN", 0.0));
        assert!(are_nearby("BCN", "GRO", 100.0));
        assert!(are_nearby("GRO", "BCN", 100.0));
        assert!(!are_nearby("BCN", "PSA", 100.0));
        assert!(!are_nearby("BCN", "ZZZ", 100.0));
    }
}
