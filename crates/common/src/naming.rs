//! Randomized names for environments and test resources.
//!
//! Every scenario run gets a unique project tag so concurrent runs never
//! collide in the orchestration tool's namespace.

use uuid::Uuid;

/// A short lowercase tag, unique per call.
pub fn random_tag() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// A compose project name namespaced under the harness prefix,
/// e.g. `chaos_9f3ab01c`.
pub fn project_name() -> String {
    format!("chaos_{}", random_tag())
}

/// A random absolute zone name, e.g. `test-9f3ab01c.example.com.`.
pub fn random_zone() -> String {
    format!("test-{}.example.com.", random_tag())
}

/// A random record name under the given zone.
pub fn random_record(zone: &str) -> String {
    format!("rec-{}.{}", random_tag(), zone)
}

/// A random IPv4 address string for recordset data.
pub fn random_ipv4() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn tags_are_unique_and_lowercase() {
        let a = random_tag();
        let b = random_tag();
        assert_ne!(a, b);
        assert_eq!(a.len(), 8);
        assert_eq!(a, a.to_lowercase());
    }

    #[test]
    fn project_names_carry_the_prefix() {
        assert!(project_name().starts_with("chaos_"));
    }

    #[test]
    fn zones_are_absolute() {
        let zone = random_zone();
        assert!(zone.starts_with("test-"));
        assert!(zone.ends_with(".example.com."));
    }

    #[test]
    fn record_names_nest_under_the_zone() {
        let zone = random_zone();
        assert!(random_record(&zone).ends_with(&zone));
    }

    #[test]
    fn ipv4_has_four_octets() {
        let addr = random_ipv4();
        assert_eq!(addr.split('.').count(), 4);
        for octet in addr.split('.') {
            octet.parse::<u8>().expect("octet in range");
        }
    }
}
