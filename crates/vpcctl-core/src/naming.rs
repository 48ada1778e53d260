//! Deterministic names for every kernel object the control plane owns.
//!
//! Link names (bridges, veth endpoints, peering links) are capped at 15
//! bytes by the kernel (`IFNAMSIZ` minus the terminator). When a natural
//! name would overflow, the variable segment is replaced with the first
//! six hex chars of its SHA-256 digest, keeping the type tag so the
//! teardown sweep still recognizes the object. Namespace names are not
//! links and keep their natural form; with 32-char input names they stay
//! well under the namespace limit.

use sha2::{Digest, Sha256};

/// Kernel link-name limit.
pub const MAX_LINK_NAME: usize = 15;

/// Bridge for a VPC: `vpc-<vpc>-br`.
#[must_use]
pub fn bridge(vpc: &str) -> String {
    fit("vpc-", vpc, "-br")
}

/// Namespace for a subnet: `vpc-<vpc>-ns-<subnet>`.
#[must_use]
pub fn netns(vpc: &str, subnet: &str) -> String {
    format!("vpc-{vpc}-ns-{subnet}")
}

/// Bridge-side veth endpoint: `veth-<vpc>-<subnet>`.
#[must_use]
pub fn veth_host(vpc: &str, subnet: &str) -> String {
    fit("veth-", &format!("{vpc}-{subnet}"), "")
}

/// Namespace-side veth endpoint: `veth-ns-<subnet>`.
#[must_use]
pub fn veth_ns(subnet: &str) -> String {
    fit("veth-ns-", subnet, "")
}

/// Orders a peering pair canonically: lexicographically smaller first.
#[must_use]
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Peering endpoints for a canonical pair: the link named
/// `peer-<a>-<b>` attaches to `a`'s bridge, `peer-<b>-<a>` to `b`'s.
#[must_use]
pub fn peer_links(a: &str, b: &str) -> (String, String) {
    let (a, b) = canonical_pair(a, b);
    (
        fit("peer-", &format!("{a}-{b}"), ""),
        fit("peer-", &format!("{b}-{a}"), ""),
    )
}

fn fit(prefix: &str, var: &str, suffix: &str) -> String {
    let natural = format!("{prefix}{var}{suffix}");
    if natural.len() <= MAX_LINK_NAME {
        return natural;
    }
    format!("{prefix}{}{suffix}", digest6(var))
}

fn digest6(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(6);
    for byte in &digest[..3] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_names() {
        assert_eq!(bridge("testvpc"), "vpc-testvpc-br");
        assert_eq!(netns("testvpc", "public"), "vpc-testvpc-ns-public");
        assert_eq!(veth_host("a", "pub"), "veth-a-pub");
        assert_eq!(veth_ns("pub"), "veth-ns-pub");
    }

    #[test]
    fn test_peer_links_are_canonical() {
        let (x, y) = peer_links("tv", "ov");
        assert_eq!(x, "peer-ov-tv");
        assert_eq!(y, "peer-tv-ov");

        // order of arguments does not matter
        assert_eq!(peer_links("ov", "tv"), (x, y));
    }

    #[test]
    fn test_overflow_is_truncated_and_tagged() {
        let name = bridge("very-long-vpc-name-that-overflows");
        assert!(name.len() <= MAX_LINK_NAME, "{name}");
        assert!(name.starts_with("vpc-"));
        assert!(name.ends_with("-br"));
    }

    #[test]
    fn test_truncation_is_deterministic_and_distinct() {
        let a1 = veth_host("long-vpc-name-one", "long-subnet-name");
        let a2 = veth_host("long-vpc-name-one", "long-subnet-name");
        let b = veth_host("long-vpc-name-two", "long-subnet-name");

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(a1.len() <= MAX_LINK_NAME);
        assert!(a1.starts_with("veth-"));
    }

    #[test]
    fn test_every_link_kind_respects_limit() {
        let long = "a".repeat(32);
        for name in [
            bridge(&long),
            veth_host(&long, &long),
            veth_ns(&long),
            peer_links(&long, "b").0,
            peer_links(&long, "b").1,
        ] {
            assert!(name.len() <= MAX_LINK_NAME, "{name} exceeds the link-name limit");
        }
    }
}
