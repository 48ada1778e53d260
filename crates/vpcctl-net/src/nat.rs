//! Source NAT (masquerade) rule management.
//!
//! Public subnets get a `POSTROUTING` masquerade rule keyed on
//! (source CIDR, upstream interface). Rules are probed with `-C` before
//! insertion so repeated applies never stack duplicates.

use ipnetwork::Ipv4Network;

use crate::error::Result;
use crate::host::HostExecutor;

/// One parsed masquerade rule, as listed from the nat table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasqueradeRule {
    /// Source CIDR the rule matches.
    pub source: Ipv4Network,
    /// Upstream interface the rule masquerades out of.
    pub out_iface: String,
}

impl HostExecutor {
    fn masquerade_args<'a>(flag: &'a str, source: &'a str, out_iface: &'a str) -> [&'a str; 10] {
        [
            "-t",
            "nat",
            flag,
            "POSTROUTING",
            "-s",
            source,
            "-o",
            out_iface,
            "-j",
            "MASQUERADE",
        ]
    }

    /// Checks whether the masquerade rule is present.
    pub fn masquerade_exists(&self, source: Ipv4Network, out_iface: &str) -> Result<bool> {
        let src = source.to_string();
        match self
            .runner
            .run("iptables", &Self::masquerade_args("-C", &src, out_iface))
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Inserts the masquerade rule if it is not already present.
    pub fn masquerade_ensure(&self, source: Ipv4Network, out_iface: &str) -> Result<()> {
        if self.masquerade_exists(source, out_iface)? {
            tracing::debug!(%source, out_iface, "masquerade rule already present");
            return Ok(());
        }
        let src = source.to_string();
        self.runner
            .run("iptables", &Self::masquerade_args("-A", &src, out_iface))?;
        tracing::info!(%source, out_iface, "masquerade rule installed");
        Ok(())
    }

    /// Deletes the masquerade rule.
    pub fn masquerade_del(&self, source: Ipv4Network, out_iface: &str) -> Result<()> {
        let src = source.to_string();
        self.runner
            .run("iptables", &Self::masquerade_args("-D", &src, out_iface))?;
        tracing::info!(%source, out_iface, "masquerade rule removed");
        Ok(())
    }

    /// Lists the masquerade rules currently in `POSTROUTING`.
    ///
    /// Parses `iptables -t nat -S POSTROUTING` lines of the form
    /// `-A POSTROUTING -s 10.20.1.0/24 -o eth0 -j MASQUERADE`; rules
    /// that do not match that shape are ignored.
    pub fn masquerade_rules(&self) -> Result<Vec<MasqueradeRule>> {
        let out = self
            .runner
            .run("iptables", &["-t", "nat", "-S", "POSTROUTING"])?;

        let mut rules = Vec::new();
        for line in out.stdout.lines() {
            if !line.contains("-j MASQUERADE") {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let source = fields
                .iter()
                .position(|f| *f == "-s")
                .and_then(|i| fields.get(i + 1))
                .and_then(|s| s.parse::<Ipv4Network>().ok());
            let out_iface = fields
                .iter()
                .position(|f| *f == "-o")
                .and_then(|i| fields.get(i + 1))
                .map(|s| (*s).to_string());
            if let (Some(source), Some(out_iface)) = (source, out_iface) {
                rules.push(MasqueradeRule { source, out_iface });
            }
        }
        Ok(rules)
    }
}
