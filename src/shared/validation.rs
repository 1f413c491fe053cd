use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for waste category slugs
    /// Must be lowercase alphanumeric with hyphens
    /// - Valid: "illegal-dumping", "overflowing-bin", "e-waste"
    /// - Invalid: "-dump", "dump-", "dump--site", "Dump", "dump_site"
    pub static ref CATEGORY_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();

    /// Regex for perceptual image hashes (hex digest, 16-128 chars)
    pub static ref IMAGE_HASH_REGEX: Regex = Regex::new(r"^[0-9a-f]{16,128}$").unwrap();
}

/// Latitude must be within [-90, 90]
pub fn valid_latitude(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

/// Longitude must be within [-180, 180]
pub fn valid_longitude(lng: f64) -> bool {
    lng.is_finite() && (-180.0..=180.0).contains(&lng)
}
