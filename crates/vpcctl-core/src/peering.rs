//! VPC peering: bridge-to-bridge links with allowlisted routes.
//!
//! A peering is a veth pair stitched between two VPC bridges plus one
//! device route per allowed CIDR. The pair is named canonically
//! (`peer-<a>-<b>` on `a`'s bridge, lexicographically smaller first), so
//! either argument order converges on the same objects. Routes go on the
//! side for which the destination is *remote*; the home side's
//! kernel-connected route already covers its own block, and a duplicate
//! static route there would collide with it.
//!
//! Peerings are bilateral: both VPC records carry identical peering
//! entries, written only after every kernel step succeeded. The
//! operation is idempotent and never rolled back; re-running it (also
//! with a changed allowlist) converges routes and records.

use ipnetwork::Ipv4Network;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::lock::LockMode;
use crate::model::{PeeringRecord, VpcRecord};
use crate::reconciler::Reconciler;
use crate::{naming, plan};

impl Reconciler {
    pub fn peer(&self, vpc_a: &str, vpc_b: &str, allowed_cidrs: &str) -> Result<PeeringRecord> {
        if vpc_a == vpc_b {
            return Err(Error::Validation(format!(
                "cannot peer VPC `{vpc_a}` with itself"
            )));
        }
        let allowed = parse_allowed(allowed_cidrs)?;

        let _global = self.lock_global(LockMode::Exclusive)?;

        let (name_a, name_b) = naming::canonical_pair(vpc_a, vpc_b);
        let mut rec_a = self.load_vpc(name_a)?;
        let mut rec_b = self.load_vpc(name_b)?;

        let (link_a, link_b) = naming::peer_links(name_a, name_b);
        let previous = rec_a.peerings.get(name_b).cloned();

        // link plumbing: create if absent, attach, bring up
        match self.host().veth_add(&link_a, &link_b) {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {}
            Err(err) => return Err(err.into()),
        }
        self.host().link_set_master(&link_a, &rec_a.bridge)?;
        self.host().link_set_master(&link_b, &rec_b.bridge)?;
        self.host().link_set_up(&link_a)?;
        self.host().link_set_up(&link_b)?;

        // allowlisted routes, remote side only
        for cidr in &allowed {
            for rec in [&rec_a, &rec_b] {
                if plan::contains_or_equal(rec.cidr, *cidr) {
                    continue;
                }
                match self.host().route_add(*cidr, &rec.bridge) {
                    Ok(()) => {}
                    Err(err) if err.is_already_exists() => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }

        // drop routes the previous allowlist carried but this one does not
        if let Some(previous) = &previous {
            for &cidr in &previous.allowed_cidrs {
                if allowed.contains(&cidr) {
                    continue;
                }
                for rec in [&rec_a, &rec_b] {
                    if plan::contains_or_equal(rec.cidr, cidr) {
                        continue;
                    }
                    if let Err(err) = self.host().route_del(cidr, &rec.bridge) {
                        if !err.is_not_found() {
                            warn!(%cidr, bridge = %rec.bridge, error = %err, "stale route removal failed");
                        }
                    }
                }
            }
        }

        let record = PeeringRecord {
            vpc_a: name_a.to_string(),
            vpc_b: name_b.to_string(),
            link_a,
            link_b,
            allowed_cidrs: allowed,
        };

        rec_a.peerings.insert(name_b.to_string(), record.clone());
        rec_b.peerings.insert(name_a.to_string(), record.clone());
        self.store().put(&rec_a)?;
        self.store().put(&rec_b)?;

        info!(vpc_a = name_a, vpc_b = name_b, "peering established");
        Ok(record)
    }

    /// Reverses one peering during VPC deletion: routes, link, and the
    /// *other* side's record entry. Entirely best-effort; the calling
    /// deletion keeps going regardless.
    pub(crate) fn teardown_peering(&self, record: &VpcRecord, peering: &PeeringRecord) {
        let peer_name = peering.peer_of(&record.name);
        let peer_rec = match self.store().get(peer_name) {
            Ok(rec) => rec,
            Err(err) => {
                warn!(peer = peer_name, error = %err, "cannot read peer record");
                None
            }
        };

        for cidr in &peering.allowed_cidrs {
            if !plan::contains_or_equal(record.cidr, *cidr) {
                self.quiet_route_del(*cidr, &record.bridge);
            }
            if let Some(peer) = &peer_rec {
                if !plan::contains_or_equal(peer.cidr, *cidr) {
                    self.quiet_route_del(*cidr, &peer.bridge);
                }
            }
        }

        // deleting one endpoint removes the pair
        if let Err(err) = self.host().link_del(&peering.link_a) {
            if !err.is_not_found() {
                warn!(link = %peering.link_a, error = %err, "peering link removal failed");
            }
        }

        if let Some(mut peer) = peer_rec {
            peer.peerings.remove(&record.name);
            if let Err(err) = self.store().put(&peer) {
                warn!(peer = peer_name, error = %err, "cannot update peer record");
            }
        }

        info!(vpc = %record.name, peer = peer_name, "peering removed");
    }

    fn quiet_route_del(&self, cidr: Ipv4Network, bridge: &str) {
        if let Err(err) = self.host().route_del(cidr, bridge) {
            if !err.is_not_found() {
                warn!(%cidr, bridge, error = %err, "route removal failed");
            }
        }
    }
}

fn parse_allowed(raw: &str) -> Result<Vec<Ipv4Network>> {
    let mut cidrs = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let cidr: Ipv4Network = part
            .parse()
            .map_err(|e| Error::Validation(format!("invalid allowed CIDR `{part}`: {e}")))?;
        if !cidrs.contains(&cidr) {
            cidrs.push(cidr);
        }
    }
    if cidrs.is_empty() {
        return Err(Error::Validation(
            "at least one allowed CIDR is required".into(),
        ));
    }
    Ok(cidrs)
}
