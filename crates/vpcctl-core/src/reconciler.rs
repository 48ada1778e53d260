//! The topology reconciler.
//!
//! One method per user verb. Each decomposes into an ordered sequence of
//! executor calls designed so that re-running from any prefix converges:
//! create steps tolerate *already-exists*, delete steps tolerate
//! *not-found*, and the state file is written only after every kernel
//! step of the operation has succeeded. A crash therefore never leaves
//! the store ahead of the kernel; the next invocation re-drives the
//! recorded intent.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::lock::{self, LockMode, OpLock};
use crate::model::{validate_name, AppRecord, SubnetKind, SubnetRecord, VpcRecord};
use crate::policy::{self, PolicyEntry, PolicySummary};
use crate::store::StateStore;
use crate::{naming, plan};
use vpcctl_net::HostExecutor;

/// Drives kernel state towards recorded intent.
pub struct Reconciler {
    host: HostExecutor,
    store: StateStore,
    lock_timeout: Duration,
}

impl Reconciler {
    #[must_use]
    pub fn new(host: HostExecutor, store: StateStore, lock_timeout: Duration) -> Self {
        Self {
            host,
            store,
            lock_timeout,
        }
    }

    pub(crate) fn host(&self) -> &HostExecutor {
        &self.host
    }

    pub(crate) fn store(&self) -> &StateStore {
        &self.store
    }

    // ------------------------------------------------------------------
    // create-vpc

    pub fn create_vpc(&self, name: &str, cidr: &str, internet_iface: &str) -> Result<VpcRecord> {
        validate_name("VPC", name)?;
        if internet_iface.is_empty() {
            return Err(Error::Validation("internet interface must not be empty".into()));
        }
        let cidr = plan::validate_block(cidr)?;

        let _global = self.lock_global(LockMode::Shared)?;
        let _vpc = self.lock_vpc(name)?;

        if let Some(existing) = self.store.get(name)? {
            if existing.cidr == cidr && existing.internet_iface == internet_iface {
                info!(vpc = name, "VPC already recorded with this configuration, re-driving");
                self.realize_vpc(&existing)?;
                return Ok(existing);
            }
            return Err(Error::Validation(format!(
                "VPC `{name}` already exists with a different configuration \
                 ({} via {})",
                existing.cidr, existing.internet_iface
            )));
        }

        let existing_blocks: Vec<(String, ipnetwork::Ipv4Network)> = self
            .store
            .list()?
            .into_iter()
            .map(|r| (r.name, r.cidr))
            .collect();
        plan::plan_vpc(cidr, &existing_blocks)?;

        let record = VpcRecord {
            name: name.to_string(),
            cidr,
            internet_iface: internet_iface.to_string(),
            bridge: naming::bridge(name),
            subnets: Default::default(),
            peerings: Default::default(),
            created: Utc::now().to_rfc3339(),
        };

        let created_bridge = self.realize_vpc(&record)?;

        if let Err(err) = self.store.put(&record) {
            // the record must never trail the kernel unobserved; undo
            // what this invocation created before surfacing the error
            if created_bridge {
                best_effort("rollback bridge", self.host.link_del(&record.bridge));
            }
            return Err(err.into());
        }

        info!(vpc = name, cidr = %cidr, bridge = %record.bridge, "VPC created");
        Ok(record)
    }

    /// Ensures the VPC's kernel objects exist and are configured.
    /// Returns whether this call created the bridge. On a hard failure,
    /// a bridge created here is rolled back before the error surfaces.
    fn realize_vpc(&self, record: &VpcRecord) -> Result<bool> {
        let created = match self.host.bridge_add(&record.bridge) {
            Ok(()) => true,
            Err(err) if err.is_already_exists() => false,
            Err(err) => return Err(err.into()),
        };

        let result = (|| -> Result<()> {
            let addr = plan::gateway_net(record.cidr)?;
            tolerate_exists(self.host.addr_add(&record.bridge, addr))?;
            self.host.link_set_up(&record.bridge)?;
            self.host.forwarding_enable(&record.bridge)?;
            self.host.ip_forward_enable()?;
            Ok(())
        })();

        if let Err(err) = result {
            warn!(vpc = %record.name, error = %err, "VPC realization failed, reversing");
            if created {
                best_effort("rollback bridge", self.host.link_del(&record.bridge));
            }
            return Err(err);
        }
        Ok(created)
    }

    // ------------------------------------------------------------------
    // add-subnet

    pub fn add_subnet(
        &self,
        vpc: &str,
        name: &str,
        cidr: &str,
        kind: SubnetKind,
    ) -> Result<VpcRecord> {
        validate_name("VPC", vpc)?;
        validate_name("subnet", name)?;
        let cidr = plan::validate_block(cidr)?;

        let _global = self.lock_global(LockMode::Shared)?;
        let _vpc = self.lock_vpc(vpc)?;

        let mut record = self.load_vpc(vpc)?;

        if let Some(existing) = record.subnets.get(name) {
            if existing.cidr == cidr && existing.kind == kind {
                info!(vpc, subnet = name, "subnet already recorded, re-driving");
                self.realize_subnet(&record, existing)?;
                return Ok(record);
            }
            return Err(Error::Validation(format!(
                "subnet `{name}` already exists in VPC `{vpc}` with a different configuration \
                 ({} {})",
                existing.cidr, existing.kind
            )));
        }

        let siblings: Vec<(String, ipnetwork::Ipv4Network)> = record
            .subnets
            .iter()
            .map(|(n, s)| (n.clone(), s.cidr))
            .collect();
        plan::plan_subnet(record.cidr, cidr, &siblings)?;

        let subnet = SubnetRecord {
            cidr,
            kind,
            namespace: naming::netns(vpc, name),
            veth_host: naming::veth_host(vpc, name),
            veth_ns: naming::veth_ns(name),
            gateway: plan::gateway(cidr)?,
            host_ip: plan::host_ip(cidr)?,
            apps: Vec::new(),
        };

        if let Err(err) = self.realize_subnet(&record, &subnet) {
            warn!(vpc, subnet = name, error = %err, "subnet realization failed, reversing");
            best_effort("rollback namespace", self.host.netns_del(&subnet.namespace));
            best_effort("rollback veth", self.host.link_del(&subnet.veth_host));
            return Err(err);
        }

        record.subnets.insert(name.to_string(), subnet);
        self.store.put(&record)?;

        info!(vpc, subnet = name, %cidr, "subnet added");
        Ok(record)
    }

    /// Ordered, re-runnable realization of one subnet: namespace before
    /// veth, veth in the namespace before addressing, NAT last.
    fn realize_subnet(&self, vpc: &VpcRecord, subnet: &SubnetRecord) -> Result<()> {
        tolerate_exists(self.host.netns_add(&subnet.namespace))?;
        tolerate_exists(self.host.veth_add(&subnet.veth_host, &subnet.veth_ns))?;

        self.host.link_set_master(&subnet.veth_host, &vpc.bridge)?;
        self.host.link_set_up(&subnet.veth_host)?;

        // on a re-run the endpoint may already live in the namespace
        match self.host.link_set_netns(&subnet.veth_ns, &subnet.namespace) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!(veth = %subnet.veth_ns, "endpoint already moved");
            }
            Err(err) => return Err(err.into()),
        }

        self.host.netns_link_set_up(&subnet.namespace, &subnet.veth_ns)?;
        self.host.netns_loopback_up(&subnet.namespace)?;
        tolerate_exists(self.host.netns_addr_add(
            &subnet.namespace,
            &subnet.veth_ns,
            subnet.host_ip,
        ))?;
        tolerate_exists(
            self.host
                .netns_route_add_default(&subnet.namespace, subnet.gateway),
        )?;

        if subnet.kind == SubnetKind::Public {
            self.host
                .masquerade_ensure(subnet.cidr, &vpc.internet_iface)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // deploy-app

    pub fn deploy_app(&self, vpc: &str, subnet: &str, name: &str, cmd: &str) -> Result<AppRecord> {
        validate_name("VPC", vpc)?;
        validate_name("subnet", subnet)?;
        if name.is_empty() {
            return Err(Error::Validation("application name must not be empty".into()));
        }
        if cmd.is_empty() {
            return Err(Error::Validation("application command must not be empty".into()));
        }

        let _global = self.lock_global(LockMode::Shared)?;
        let _vpc = self.lock_vpc(vpc)?;

        let mut record = self.load_vpc(vpc)?;
        let Some(subnet_rec) = record.subnets.get_mut(subnet) else {
            return Err(Error::Validation(format!(
                "subnet `{subnet}` not found in VPC `{vpc}`"
            )));
        };

        let pid = self.host.netns_spawn(&subnet_rec.namespace, cmd)?;
        let app = AppRecord {
            name: name.to_string(),
            command: cmd.to_string(),
            pid: Some(pid as i32),
        };

        subnet_rec.apps.retain(|a| a.name != name);
        subnet_rec.apps.push(app.clone());
        self.store.put(&record)?;

        info!(vpc, subnet, app = name, pid, "application deployed");
        Ok(app)
    }

    // ------------------------------------------------------------------
    // apply-policy

    pub fn apply_policy(&self, entries: &[PolicyEntry]) -> Result<PolicySummary> {
        let _global = self.lock_global(LockMode::Exclusive)?;
        let records = self.store.list()?;
        Ok(policy::apply(&self.host, &records, entries))
    }

    // ------------------------------------------------------------------
    // reads

    pub fn inspect(&self, vpc: &str) -> Result<VpcRecord> {
        self.store
            .get(vpc)?
            .ok_or_else(|| Error::Validation(format!("VPC `{vpc}` not found")))
    }

    pub fn list(&self) -> Result<Vec<VpcRecord>> {
        Ok(self.store.list()?)
    }

    // ------------------------------------------------------------------
    // delete-vpc

    pub fn delete_vpc(&self, name: &str) -> Result<()> {
        let _global = self.lock_global(LockMode::Exclusive)?;
        self.delete_vpc_locked(name)
    }

    /// Deletion body, shared with `teardown-all` (which already holds
    /// the global lock). Every removal is best-effort: *not-found* is
    /// success, anything else logs and continues. What must hold on
    /// return is that no recorded object survives, not that every
    /// removal succeeded on its first attempt.
    pub(crate) fn delete_vpc_locked(&self, name: &str) -> Result<()> {
        let Some(record) = self.store.get(name)? else {
            info!(vpc = name, "VPC not recorded, nothing to delete");
            return Ok(());
        };

        for peering in record.peerings.values() {
            self.teardown_peering(&record, peering);
        }

        for (subnet_name, subnet) in &record.subnets {
            for app in &subnet.apps {
                if let Some(pid) = app.pid {
                    terminate(pid, &app.name);
                }
            }
            if subnet.kind == SubnetKind::Public {
                best_effort(
                    "remove masquerade",
                    self.host
                        .masquerade_del(subnet.cidr, &record.internet_iface),
                );
            }
            best_effort("delete namespace", self.host.netns_del(&subnet.namespace));
            // deleting the namespace usually takes the veth pair with it
            best_effort("delete veth", self.host.link_del(&subnet.veth_host));
            info!(vpc = name, subnet = %subnet_name, "subnet removed");
        }

        best_effort("delete bridge", self.host.link_del(&record.bridge));
        self.store.delete(name)?;

        info!(vpc = name, "VPC deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // teardown-all

    /// Deletes every recorded VPC, then sweeps the host for orphans
    /// matching the naming scheme. Runs to completion even when
    /// individual removals fail; a store failure is reported last,
    /// after the sweep.
    pub fn teardown_all(&self) -> Result<()> {
        let _global = self.lock_global(LockMode::Exclusive)?;

        let (records, store_err) = match self.store.list() {
            Ok(records) => (records, None),
            Err(err) => {
                warn!(error = %err, "state store unreadable, proceeding with best-effort teardown");
                let (partial, _) = self.store.list_lossy();
                (partial, Some(err))
            }
        };

        // NAT rules are attributed by the CIDRs the store knew about
        // before any record is deleted
        let recorded_cidrs: Vec<ipnetwork::Ipv4Network> = records
            .iter()
            .flat_map(|r| r.subnets.values().map(|s| s.cidr))
            .collect();

        for record in &records {
            if let Err(err) = self.delete_vpc_locked(&record.name) {
                warn!(vpc = %record.name, error = %err, "delete failed during teardown, continuing");
            }
        }

        self.sweep_orphans(&recorded_cidrs);

        match store_err {
            Some(err) => Err(err.into()),
            None => {
                info!("teardown complete");
                Ok(())
            }
        }
    }

    fn sweep_orphans(&self, recorded_cidrs: &[ipnetwork::Ipv4Network]) {
        match self.host.netns_list() {
            Ok(names) => {
                for ns in names.iter().filter(|n| n.starts_with("vpc-")) {
                    best_effort("sweep namespace", self.host.netns_del(ns));
                }
            }
            Err(err) => warn!(error = %err, "cannot list namespaces for sweep"),
        }

        match self.host.link_names() {
            Ok(names) => {
                // peering and stray veth endpoints first, bridges last
                for link in names
                    .iter()
                    .filter(|n| n.starts_with("peer-") || n.starts_with("veth-"))
                {
                    best_effort("sweep link", self.host.link_del(link));
                }
                for bridge in names
                    .iter()
                    .filter(|n| n.starts_with("vpc-") && n.ends_with("-br"))
                {
                    best_effort("sweep bridge", self.host.link_del(bridge));
                }
            }
            Err(err) => warn!(error = %err, "cannot list links for sweep"),
        }

        match self.host.masquerade_rules() {
            Ok(rules) => {
                for rule in rules
                    .iter()
                    .filter(|r| recorded_cidrs.contains(&r.source))
                {
                    best_effort(
                        "sweep masquerade",
                        self.host.masquerade_del(rule.source, &rule.out_iface),
                    );
                }
            }
            Err(err) => warn!(error = %err, "cannot list masquerade rules for sweep"),
        }
    }

    // ------------------------------------------------------------------
    // shared plumbing

    pub(crate) fn load_vpc(&self, name: &str) -> Result<VpcRecord> {
        self.store
            .get(name)?
            .ok_or_else(|| Error::Validation(format!("VPC `{name}` not found")))
    }

    pub(crate) fn lock_global(&self, mode: LockMode) -> Result<OpLock> {
        lock::acquire(&self.store.global_lock_path(), mode, self.lock_timeout)
    }

    pub(crate) fn lock_vpc(&self, name: &str) -> Result<OpLock> {
        lock::acquire(
            &self.store.lock_path(name),
            LockMode::Exclusive,
            self.lock_timeout,
        )
    }
}

/// Maps *already-exists* to success; used on create-style steps.
fn tolerate_exists(result: vpcctl_net::Result<()>) -> Result<()> {
    match result {
        Err(err) if err.is_already_exists() => Ok(()),
        other => other.map_err(Error::from),
    }
}

/// Swallows the outcome of a removal step: *not-found* is the expected
/// common case, anything else is logged and the caller continues.
fn best_effort(what: &str, result: vpcctl_net::Result<()>) {
    if let Err(err) = result {
        if !err.is_not_found() {
            warn!(step = what, error = %err, "best-effort step failed");
        }
    }
}

/// Best-effort SIGTERM for a recorded application pid. Stale pids are
/// expected and ignored.
fn terminate(pid: i32, app: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => info!(app, pid, "sent SIGTERM"),
        Err(errno) => tracing::debug!(app, pid, %errno, "stale pid, skipping"),
    }
}

/// Checks that the process can mutate host network state.
pub fn ensure_root() -> Result<()> {
    if nix::unistd::Uid::effective().is_root() {
        Ok(())
    } else {
        Err(Error::Host(vpcctl_net::NetError::PermissionDenied(
            "this operation must run as root".into(),
        )))
    }
}
