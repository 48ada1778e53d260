//! Link management: bridges, veth pairs, addresses, routes, forwarding.

use ipnetwork::Ipv4Network;

use crate::error::Result;
use crate::host::HostExecutor;

impl HostExecutor {
    /// Creates a bridge device.
    pub fn bridge_add(&self, name: &str) -> Result<()> {
        self.runner
            .run("ip", &["link", "add", "name", name, "type", "bridge"])?;
        tracing::info!(bridge = name, "bridge created");
        Ok(())
    }

    /// Deletes any link by name (bridge, veth endpoint, peering link).
    pub fn link_del(&self, name: &str) -> Result<()> {
        self.runner.run("ip", &["link", "delete", name])?;
        tracing::info!(link = name, "link deleted");
        Ok(())
    }

    /// Creates a veth pair.
    pub fn veth_add(&self, name: &str, peer: &str) -> Result<()> {
        self.runner
            .run("ip", &["link", "add", name, "type", "veth", "peer", "name", peer])?;
        tracing::info!(link = name, peer, "veth pair created");
        Ok(())
    }

    /// Attaches a link to a bridge.
    pub fn link_set_master(&self, name: &str, bridge: &str) -> Result<()> {
        self.runner
            .run("ip", &["link", "set", name, "master", bridge])?;
        Ok(())
    }

    /// Brings a link up.
    pub fn link_set_up(&self, name: &str) -> Result<()> {
        self.runner.run("ip", &["link", "set", "dev", name, "up"])?;
        Ok(())
    }

    /// Brings a link down.
    pub fn link_set_down(&self, name: &str) -> Result<()> {
        self.runner.run("ip", &["link", "set", "dev", name, "down"])?;
        Ok(())
    }

    /// Sets a link's MTU.
    pub fn link_set_mtu(&self, name: &str, mtu: u16) -> Result<()> {
        self.runner
            .run("ip", &["link", "set", "dev", name, "mtu", &mtu.to_string()])?;
        Ok(())
    }

    /// Assigns an address (with prefix length) to a link.
    pub fn addr_add(&self, name: &str, addr: Ipv4Network) -> Result<()> {
        self.runner
            .run("ip", &["addr", "add", &addr.to_string(), "dev", name])?;
        Ok(())
    }

    /// Moves a link into a network namespace.
    pub fn link_set_netns(&self, name: &str, netns: &str) -> Result<()> {
        self.runner
            .run("ip", &["link", "set", name, "netns", netns])?;
        Ok(())
    }

    /// Adds a device route in the host routing table.
    pub fn route_add(&self, dest: Ipv4Network, dev: &str) -> Result<()> {
        self.runner
            .run("ip", &["route", "add", &dest.to_string(), "dev", dev])?;
        Ok(())
    }

    /// Removes a device route from the host routing table.
    pub fn route_del(&self, dest: Ipv4Network, dev: &str) -> Result<()> {
        self.runner
            .run("ip", &["route", "del", &dest.to_string(), "dev", dev])?;
        Ok(())
    }

    /// Enables IPv4 forwarding on one interface.
    pub fn forwarding_enable(&self, iface: &str) -> Result<()> {
        let key = format!("net.ipv4.conf.{iface}.forwarding=1");
        self.runner.run("sysctl", &["-w", &key])?;
        Ok(())
    }

    /// Enables host-global IPv4 forwarding. Idempotent.
    pub fn ip_forward_enable(&self) -> Result<()> {
        self.runner.run("sysctl", &["-w", "net.ipv4.ip_forward=1"])?;
        Ok(())
    }

    /// Lists the names of all links in the root namespace.
    ///
    /// Parses `ip -o link show`, whose lines look like
    /// `3: vpc-a-br: <BROADCAST,...> mtu 1500 ...` (veth endpoints carry
    /// an `@peer` tail that is stripped).
    pub fn link_names(&self) -> Result<Vec<String>> {
        let out = self.runner.run("ip", &["-o", "link", "show"])?;
        let mut names = Vec::new();
        for line in out.stdout.lines() {
            let mut fields = line.split_whitespace();
            let _index = fields.next();
            if let Some(raw) = fields.next() {
                let name = raw.trim_end_matches(':');
                let name = name.split('@').next().unwrap_or(name);
                if !name.is_empty() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CmdOutput, CommandRunner};
    use crate::NetError;
    use std::sync::{Arc, Mutex};

    /// Runner that records every command and replays canned stdout.
    struct Recorder {
        calls: Mutex<Vec<String>>,
        stdout: String,
    }

    impl Recorder {
        fn new(stdout: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                stdout: stdout.to_string(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, program: &str, args: &[&str]) -> crate::Result<CmdOutput> {
            let mut line = program.to_string();
            for a in args {
                line.push(' ');
                line.push_str(a);
            }
            self.calls.lock().unwrap().push(line);
            Ok(CmdOutput {
                stdout: self.stdout.clone(),
            })
        }

        fn spawn_detached(&self, _program: &str, _args: &[&str]) -> crate::Result<u32> {
            Err(NetError::NotFound("spawn not scripted".into()))
        }
    }

    #[test]
    fn test_bridge_and_addr_command_lines() {
        let rec = Recorder::new("");
        let host = HostExecutor::with_runner(rec.clone());

        host.bridge_add("vpc-a-br").unwrap();
        host.addr_add("vpc-a-br", "10.20.0.1/16".parse().unwrap())
            .unwrap();
        host.link_set_up("vpc-a-br").unwrap();
        host.link_set_mtu("vpc-a-br", 9000).unwrap();
        host.forwarding_enable("vpc-a-br").unwrap();
        host.ip_forward_enable().unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                "ip link add name vpc-a-br type bridge",
                "ip addr add 10.20.0.1/16 dev vpc-a-br",
                "ip link set dev vpc-a-br up",
                "ip link set dev vpc-a-br mtu 9000",
                "sysctl -w net.ipv4.conf.vpc-a-br.forwarding=1",
                "sysctl -w net.ipv4.ip_forward=1",
            ]
        );
    }

    #[test]
    fn test_veth_and_route_command_lines() {
        let rec = Recorder::new("");
        let host = HostExecutor::with_runner(rec.clone());

        host.veth_add("veth-a-pub", "veth-ns-pub").unwrap();
        host.link_set_master("veth-a-pub", "vpc-a-br").unwrap();
        host.link_set_netns("veth-ns-pub", "vpc-a-ns-pub").unwrap();
        host.route_add("10.30.0.0/16".parse().unwrap(), "vpc-a-br")
            .unwrap();
        host.route_del("10.30.0.0/16".parse().unwrap(), "vpc-a-br")
            .unwrap();
        host.link_set_down("veth-a-pub").unwrap();
        host.link_del("veth-a-pub").unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                "ip link add veth-a-pub type veth peer name veth-ns-pub",
                "ip link set veth-a-pub master vpc-a-br",
                "ip link set veth-ns-pub netns vpc-a-ns-pub",
                "ip route add 10.30.0.0/16 dev vpc-a-br",
                "ip route del 10.30.0.0/16 dev vpc-a-br",
                "ip link set dev veth-a-pub down",
                "ip link delete veth-a-pub",
            ]
        );
    }

    #[test]
    fn test_link_names_parses_show_output() {
        let rec = Recorder::new(
            "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue\n\
             4: vpc-a-br: <BROADCAST,MULTICAST,UP> mtu 1500 qdisc noqueue\n\
             7: veth-a-pub@if6: <BROADCAST,MULTICAST,UP> mtu 1500\n",
        );
        let host = HostExecutor::with_runner(rec);

        let names = host.link_names().unwrap();
        assert_eq!(names, vec!["lo", "vpc-a-br", "veth-a-pub"]);
    }
}
