//! Deterministic, name-hashed identity for every Registry definition (§3, §4.1,
//! §8's `makeID` invariant).

use uuid::Uuid;

/// Fixed namespace every definition id is hashed under. Generated once and frozen —
/// changing it would change every id the registry has ever issued.
const MIRADOR_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6d, 0x69, 0x72, 0x61, 0x64, 0x6f, 0x72, 0x2d, 0x63, 0x6f, 0x72, 0x65, 0x2d, 0x6e, 0x73, 0x00,
]);

/// `id = UUIDv5(namespace=MIRADOR_NAMESPACE, name = class || "|" || natural-key-parts...)`
///
/// Calling this again with the same `class` and `parts` always yields the same id,
/// giving the Registry's `Ensure` at-most-once-creation semantics.
pub fn make_id(class: &str, parts: &[&str]) -> Uuid {
    let mut name = String::from(class);
    for part in parts {
        name.push('|');
        name.push_str(part);
    }
    Uuid::new_v5(&MIRADOR_NAMESPACE, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_id_is_deterministic() {
        let a = make_id("Metric", &["http_requests_total", "gateway"]);
        let b = make_id("Metric", &["http_requests_total", "gateway"]);
        assert_eq!(a, b);
    }

    #[test]
    fn make_id_distinguishes_natural_keys() {
        let a = make_id("Metric", &["http_requests_total", "gateway"]);
        let b = make_id("Metric", &["http_requests_total", "billing"]);
        let c = make_id("Label", &["http_requests_total", "gateway"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
