//! On-disk and in-memory records for VPCs, subnets, applications, and
//! peerings.
//!
//! These structs serialize verbatim into the per-VPC state files, so
//! field names are wire format. Collections are `BTreeMap`s to keep the
//! files byte-stable across rewrites.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum length of a VPC or subnet name.
pub const MAX_NAME_LEN: usize = 32;

/// A provisioned VPC and everything it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcRecord {
    /// User-chosen identifier, also the state file stem.
    pub name: String,
    /// Address block of the whole VPC.
    pub cidr: Ipv4Network,
    /// Upstream interface public subnets masquerade out of.
    pub internet_iface: String,
    /// Bridge device interconnecting the VPC's subnets.
    pub bridge: String,
    /// Subnets keyed by subnet name.
    #[serde(default)]
    pub subnets: BTreeMap<String, SubnetRecord>,
    /// Peerings keyed by the peer VPC's name.
    #[serde(default)]
    pub peerings: BTreeMap<String, PeeringRecord>,
    /// ISO-8601 creation timestamp.
    pub created: String,
}

/// Whether a subnet can reach the upstream network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    /// Masqueraded out of the VPC's upstream interface.
    Public,
    /// Intra-VPC (and peered) connectivity only.
    Private,
}

impl std::fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

impl std::str::FromStr for SubnetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(Error::Validation(format!(
                "subnet type must be `public` or `private`, got `{other}`"
            ))),
        }
    }
}

/// A subnet realized as a namespace bridged into its VPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetRecord {
    /// Address block, strictly inside the VPC block.
    pub cidr: Ipv4Network,
    #[serde(rename = "type")]
    pub kind: SubnetKind,
    /// Network namespace realizing the subnet.
    pub namespace: String,
    /// Bridge-side veth endpoint.
    pub veth_host: String,
    /// Namespace-side veth endpoint.
    pub veth_ns: String,
    /// First usable host address of the subnet block.
    pub gateway: Ipv4Addr,
    /// Second usable host address, prefix-annotated, assigned inside the
    /// namespace.
    pub host_ip: Ipv4Network,
    /// Applications deployed into the namespace.
    #[serde(default)]
    pub apps: Vec<AppRecord>,
}

/// A spawned application. The pid is best-effort and may be stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    pub name: String,
    pub command: String,
    pub pid: Option<i32>,
}

/// One side's view of a VPC peering. Both sides store identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringRecord {
    /// Lexicographically smaller VPC of the pair.
    pub vpc_a: String,
    /// Lexicographically larger VPC of the pair.
    pub vpc_b: String,
    /// Link attached to `vpc_a`'s bridge.
    pub link_a: String,
    /// Link attached to `vpc_b`'s bridge.
    pub link_b: String,
    /// CIDRs routed across the peering.
    pub allowed_cidrs: Vec<Ipv4Network>,
}

impl PeeringRecord {
    /// The name of the other VPC, from `this` side's point of view.
    #[must_use]
    pub fn peer_of(&self, this: &str) -> &str {
        if self.vpc_a == this {
            &self.vpc_b
        } else {
            &self.vpc_a
        }
    }
}

/// Validates a VPC or subnet name: 1–32 chars of `[a-z0-9-]`, not
/// starting with `-`.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let ok_len = !name.is_empty() && name.len() <= MAX_NAME_LEN;
    let ok_first = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let ok_rest = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if ok_len && ok_first && ok_rest {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid {kind} name `{name}`: must be 1-{MAX_NAME_LEN} chars of [a-z0-9-], starting with a letter or digit"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_accepts_plain_names() {
        validate_name("vpc", "testvpc").unwrap();
        validate_name("vpc", "a").unwrap();
        validate_name("subnet", "web-tier-2").unwrap();
        validate_name("vpc", "0starts-with-digit").unwrap();
    }

    #[test]
    fn test_validate_name_boundary_lengths() {
        let max = "a".repeat(32);
        validate_name("vpc", &max).unwrap();

        let over = "a".repeat(33);
        assert!(validate_name("vpc", &over).is_err());
        assert!(validate_name("vpc", "").is_err());
    }

    #[test]
    fn test_validate_name_rejects_bad_chars() {
        assert!(validate_name("vpc", "-leading-dash").is_err());
        assert!(validate_name("vpc", "Upper").is_err());
        assert!(validate_name("vpc", "under_score").is_err());
        assert!(validate_name("vpc", "dot.name").is_err());
    }

    #[test]
    fn test_subnet_kind_wire_format() {
        let json = serde_json::to_string(&SubnetKind::Public).unwrap();
        assert_eq!(json, "\"public\"");
        let kind: SubnetKind = serde_json::from_str("\"private\"").unwrap();
        assert_eq!(kind, SubnetKind::Private);
    }

    #[test]
    fn test_record_round_trip_keeps_layout() {
        let mut vpc = VpcRecord {
            name: "testvpc".into(),
            cidr: "10.20.0.0/16".parse().unwrap(),
            internet_iface: "eth0".into(),
            bridge: "vpc-testvpc-br".into(),
            subnets: BTreeMap::new(),
            peerings: BTreeMap::new(),
            created: "2024-05-01T00:00:00+00:00".into(),
        };
        vpc.subnets.insert(
            "public".into(),
            SubnetRecord {
                cidr: "10.20.1.0/24".parse().unwrap(),
                kind: SubnetKind::Public,
                namespace: "vpc-testvpc-ns-public".into(),
                veth_host: "veth-testvpc-public".into(),
                veth_ns: "veth-ns-public".into(),
                gateway: "10.20.1.1".parse().unwrap(),
                host_ip: "10.20.1.2/24".parse().unwrap(),
                apps: vec![],
            },
        );

        let json = serde_json::to_value(&vpc).unwrap();
        assert_eq!(json["cidr"], "10.20.0.0/16");
        assert_eq!(json["subnets"]["public"]["type"], "public");
        assert_eq!(json["subnets"]["public"]["host_ip"], "10.20.1.2/24");
        assert_eq!(json["subnets"]["public"]["gateway"], "10.20.1.1");

        let back: VpcRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.subnets["public"].kind, SubnetKind::Public);
        assert_eq!(back.cidr, "10.20.0.0/16".parse().unwrap());
    }

    #[test]
    fn test_peering_peer_of() {
        let peering = PeeringRecord {
            vpc_a: "othervpc".into(),
            vpc_b: "testvpc".into(),
            link_a: "peer-othervpc-t".into(),
            link_b: "peer-testvpc-ot".into(),
            allowed_cidrs: vec![],
        };
        assert_eq!(peering.peer_of("testvpc"), "othervpc");
        assert_eq!(peering.peer_of("othervpc"), "testvpc");
    }
}
