//! Address planning: CIDR validation, containment, overlap, and the
//! gateway/host allocation convention.
//!
//! The convention is fixed: the first usable host address of a block is
//! its gateway, the second is the one address handed to the namespace.
//! The bridge takes the first usable host address of the whole VPC
//! block.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use thiserror::Error;

/// Narrowest prefix a block may have.
pub const MIN_PREFIX: u8 = 8;
/// Widest prefix a block may have; /28 still leaves room for gateway and
/// host addresses.
pub const MAX_PREFIX: u8 = 28;

/// Address-plan rejections.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid CIDR `{cidr}`: {reason}")]
    CidrInvalid { cidr: String, reason: String },

    #[error("CIDR {0} is out of range: prefix must be between /{MIN_PREFIX} and /{MAX_PREFIX}")]
    CidrOutOfRange(Ipv4Network),

    #[error("CIDR {new} overlaps {owner} ({existing})")]
    CidrOverlap {
        new: Ipv4Network,
        existing: Ipv4Network,
        owner: String,
    },

    #[error("subnet CIDR {subnet} is not strictly contained in VPC CIDR {vpc}")]
    CidrNotContained { subnet: Ipv4Network, vpc: Ipv4Network },
}

/// Parses and validates a block: canonical form (no host bits set) and
/// prefix within /8../28.
pub fn validate_block(cidr: &str) -> Result<Ipv4Network, PlanError> {
    let net: Ipv4Network = cidr.parse().map_err(|e| PlanError::CidrInvalid {
        cidr: cidr.to_string(),
        reason: format!("{e}"),
    })?;
    if net.ip() != net.network() {
        return Err(PlanError::CidrInvalid {
            cidr: cidr.to_string(),
            reason: format!("host bits set; network address is {}", net.network()),
        });
    }
    if net.prefix() < MIN_PREFIX || net.prefix() > MAX_PREFIX {
        return Err(PlanError::CidrOutOfRange(net));
    }
    Ok(net)
}

/// Strict containment: `inner` lies inside `outer` and is smaller.
#[must_use]
pub fn contains(outer: Ipv4Network, inner: Ipv4Network) -> bool {
    inner.prefix() > outer.prefix() && outer.contains(inner.network())
}

/// Containment allowing equality, used when deciding whether a peering
/// route destination is already covered by a VPC's own block.
#[must_use]
pub fn contains_or_equal(outer: Ipv4Network, inner: Ipv4Network) -> bool {
    inner.prefix() >= outer.prefix() && outer.contains(inner.network())
}

/// Standard prefix overlap.
#[must_use]
pub fn overlaps(a: Ipv4Network, b: Ipv4Network) -> bool {
    a.overlaps(b)
}

/// First usable host address of a block.
pub fn gateway(block: Ipv4Network) -> Result<Ipv4Addr, PlanError> {
    block.nth(1).ok_or(PlanError::CidrOutOfRange(block))
}

/// First usable host address annotated with the block's prefix length,
/// as assigned to a device (the bridge, for a VPC block).
pub fn gateway_net(block: Ipv4Network) -> Result<Ipv4Network, PlanError> {
    let addr = gateway(block)?;
    Ipv4Network::new(addr, block.prefix()).map_err(|_| PlanError::CidrOutOfRange(block))
}

/// Second usable host address of a block, annotated with the block's
/// prefix length.
pub fn host_ip(block: Ipv4Network) -> Result<Ipv4Network, PlanError> {
    let addr = block.nth(2).ok_or(PlanError::CidrOutOfRange(block))?;
    Ipv4Network::new(addr, block.prefix()).map_err(|_| PlanError::CidrOutOfRange(block))
}

/// Validates a new VPC block against every existing VPC block.
pub fn plan_vpc(
    cidr: Ipv4Network,
    existing: &[(String, Ipv4Network)],
) -> Result<(), PlanError> {
    for (owner, other) in existing {
        if overlaps(cidr, *other) {
            return Err(PlanError::CidrOverlap {
                new: cidr,
                existing: *other,
                owner: format!("VPC {owner}"),
            });
        }
    }
    Ok(())
}

/// Validates a new subnet block against its VPC block and its siblings.
pub fn plan_subnet(
    vpc_cidr: Ipv4Network,
    subnet_cidr: Ipv4Network,
    siblings: &[(String, Ipv4Network)],
) -> Result<(), PlanError> {
    if !contains(vpc_cidr, subnet_cidr) {
        return Err(PlanError::CidrNotContained {
            subnet: subnet_cidr,
            vpc: vpc_cidr,
        });
    }
    for (owner, other) in siblings {
        if overlaps(subnet_cidr, *other) {
            return Err(PlanError::CidrOverlap {
                new: subnet_cidr,
                existing: *other,
                owner: format!("subnet {owner}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    #[test]
    fn test_validate_block_accepts_range() {
        validate_block("10.0.0.0/8").unwrap();
        validate_block("10.20.0.0/16").unwrap();
        validate_block("10.20.1.16/28").unwrap();
    }

    #[test]
    fn test_validate_block_rejects_out_of_range() {
        assert!(matches!(
            validate_block("10.0.0.0/7"),
            Err(PlanError::CidrOutOfRange(_))
        ));
        assert!(matches!(
            validate_block("10.0.0.0/29"),
            Err(PlanError::CidrOutOfRange(_))
        ));
    }

    #[test]
    fn test_validate_block_rejects_non_canonical() {
        assert!(matches!(
            validate_block("10.20.0.5/16"),
            Err(PlanError::CidrInvalid { .. })
        ));
        assert!(matches!(
            validate_block("not-a-cidr"),
            Err(PlanError::CidrInvalid { .. })
        ));
    }

    #[test]
    fn test_containment_is_strict() {
        assert!(contains(net("10.20.0.0/16"), net("10.20.1.0/24")));
        // equal blocks are not strictly contained
        assert!(!contains(net("10.20.0.0/16"), net("10.20.0.0/16")));
        assert!(!contains(net("10.20.0.0/16"), net("10.30.1.0/24")));

        assert!(contains_or_equal(net("10.20.0.0/16"), net("10.20.0.0/16")));
        assert!(!contains_or_equal(net("10.20.1.0/24"), net("10.20.0.0/16")));
    }

    #[test]
    fn test_gateway_and_host_allocation() {
        let block = net("10.20.1.0/24");
        assert_eq!(gateway(block).unwrap(), "10.20.1.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(host_ip(block).unwrap(), net("10.20.1.2/24"));
        assert_eq!(gateway_net(net("10.20.0.0/16")).unwrap(), net("10.20.0.1/16"));

        // /28 still has both addresses
        let small = net("10.20.1.16/28");
        assert_eq!(gateway(small).unwrap(), "10.20.1.17".parse::<Ipv4Addr>().unwrap());
        assert_eq!(host_ip(small).unwrap(), net("10.20.1.18/28"));
    }

    #[test]
    fn test_plan_vpc_detects_overlap() {
        let existing = vec![
            ("alpha".to_string(), net("10.20.0.0/16")),
            ("beta".to_string(), net("10.30.0.0/16")),
        ];
        plan_vpc(net("10.40.0.0/16"), &existing).unwrap();

        let err = plan_vpc(net("10.20.128.0/17"), &existing).unwrap_err();
        assert!(matches!(err, PlanError::CidrOverlap { .. }));
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_plan_subnet_containment_and_siblings() {
        let vpc = net("10.20.0.0/16");
        let siblings = vec![("public".to_string(), net("10.20.1.0/24"))];

        // adjacent but non-overlapping sibling is fine
        plan_subnet(vpc, net("10.20.2.0/24"), &siblings).unwrap();

        // subnet equal to the VPC block must fail
        assert!(matches!(
            plan_subnet(vpc, vpc, &siblings),
            Err(PlanError::CidrNotContained { .. })
        ));

        // outside the VPC block
        assert!(matches!(
            plan_subnet(vpc, net("10.30.1.0/24"), &siblings),
            Err(PlanError::CidrNotContained { .. })
        ));

        // overlapping a sibling
        assert!(matches!(
            plan_subnet(vpc, net("10.20.1.128/25"), &siblings),
            Err(PlanError::CidrOverlap { .. })
        ));
    }
}
