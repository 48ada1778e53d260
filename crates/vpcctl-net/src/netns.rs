//! Network namespace management.
//!
//! Namespaces are created with `ip netns` so they appear under
//! `/var/run/netns` and remain visible to the standard tooling. In-place
//! configuration (addresses, routes, loopback) runs under
//! `ip netns exec`, which is also how deployed applications are entered
//! into their subnet.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::error::Result;
use crate::host::HostExecutor;
use crate::runner::CmdOutput;

impl HostExecutor {
    /// Creates a network namespace.
    pub fn netns_add(&self, name: &str) -> Result<()> {
        self.runner.run("ip", &["netns", "add", name])?;
        tracing::info!(netns = name, "namespace created");
        Ok(())
    }

    /// Deletes a network namespace (and with it, any veth endpoint
    /// inside, which destroys the whole pair).
    pub fn netns_del(&self, name: &str) -> Result<()> {
        self.runner.run("ip", &["netns", "delete", name])?;
        tracing::info!(netns = name, "namespace deleted");
        Ok(())
    }

    /// Lists namespace names known to `ip netns`.
    ///
    /// Lines look like `vpc-a-ns-pub (id: 0)`; only the first field is
    /// the name.
    pub fn netns_list(&self) -> Result<Vec<String>> {
        let out = self.runner.run("ip", &["netns", "list"])?;
        Ok(out
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }

    /// Runs a command inside a namespace and captures its output.
    pub fn netns_exec(&self, netns: &str, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let mut full: Vec<&str> = vec!["netns", "exec", netns, program];
        full.extend_from_slice(args);
        self.runner.run("ip", &full)
    }

    /// Brings a link inside a namespace up.
    pub fn netns_link_set_up(&self, netns: &str, name: &str) -> Result<()> {
        self.netns_exec(netns, "ip", &["link", "set", "dev", name, "up"])?;
        Ok(())
    }

    /// Brings the namespace loopback up.
    pub fn netns_loopback_up(&self, netns: &str) -> Result<()> {
        self.netns_link_set_up(netns, "lo")
    }

    /// Assigns an address to a link inside a namespace.
    pub fn netns_addr_add(&self, netns: &str, name: &str, addr: Ipv4Network) -> Result<()> {
        self.netns_exec(netns, "ip", &["addr", "add", &addr.to_string(), "dev", name])?;
        Ok(())
    }

    /// Installs the namespace default route via a gateway.
    pub fn netns_route_add_default(&self, netns: &str, gateway: Ipv4Addr) -> Result<()> {
        self.netns_exec(
            netns,
            "ip",
            &["route", "add", "default", "via", &gateway.to_string()],
        )?;
        Ok(())
    }

    /// Spawns a shell command inside a namespace, detached, and returns
    /// its pid. The process is never waited on or supervised.
    pub fn netns_spawn(&self, netns: &str, command: &str) -> Result<u32> {
        let pid = self
            .runner
            .spawn_detached("ip", &["netns", "exec", netns, "sh", "-c", command])?;
        tracing::info!(netns, pid, command, "application spawned");
        Ok(pid)
    }
}
