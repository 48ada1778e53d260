//! Packet-filter rules inside subnet namespaces.
//!
//! The policy engine compiles declarative rules down to [`FilterRule`]s;
//! this family installs them on the INPUT or OUTPUT chain of a
//! namespace's own iptables, with a `-C` probe first so re-applying a
//! policy never duplicates rules.

use crate::error::Result;
use crate::host::HostExecutor;

/// Chain a filter rule attaches to, from the namespace's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// Traffic addressed to the namespace.
    Input,
    /// Traffic originated by the namespace.
    Output,
}

impl Chain {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }
}

/// Terminal verdict of a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
}

impl Verdict {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Drop => "DROP",
        }
    }
}

/// One compiled filter rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub chain: Chain,
    /// Protocol match (`tcp`, `udp`, `icmp`); `None` matches all.
    pub protocol: Option<&'static str>,
    /// Destination port match; only valid with a port-bearing protocol.
    pub port: Option<u16>,
    pub verdict: Verdict,
}

impl FilterRule {
    fn args(&self, flag: &str) -> Vec<String> {
        let mut args = vec![flag.to_string(), self.chain.as_str().to_string()];
        if let Some(proto) = self.protocol {
            args.push("-p".to_string());
            args.push(proto.to_string());
        }
        if let Some(port) = self.port {
            args.push("--dport".to_string());
            args.push(port.to_string());
        }
        args.push("-j".to_string());
        args.push(self.verdict.as_str().to_string());
        args
    }
}

impl HostExecutor {
    fn run_filter(&self, netns: &str, rule: &FilterRule, flag: &str) -> Result<()> {
        let args = rule.args(flag);
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.netns_exec(netns, "iptables", &borrowed)?;
        Ok(())
    }

    /// Checks whether a rule is present on the namespace chain.
    pub fn ns_filter_exists(&self, netns: &str, rule: &FilterRule) -> Result<bool> {
        match self.run_filter(netns, rule, "-C") {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Appends a rule to the namespace chain if it is not already there.
    pub fn ns_filter_ensure(&self, netns: &str, rule: &FilterRule) -> Result<()> {
        if self.ns_filter_exists(netns, rule)? {
            tracing::debug!(netns, ?rule, "filter rule already present");
            return Ok(());
        }
        self.run_filter(netns, rule, "-A")?;
        tracing::info!(netns, ?rule, "filter rule installed");
        Ok(())
    }

    /// Deletes a rule from the namespace chain.
    pub fn ns_filter_del(&self, netns: &str, rule: &FilterRule) -> Result<()> {
        self.run_filter(netns, rule, "-D")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CmdOutput, CommandRunner};
    use crate::NetError;
    use std::sync::{Arc, Mutex};

    struct FilterFake {
        calls: Mutex<Vec<String>>,
        present: bool,
    }

    impl CommandRunner for FilterFake {
        fn run(&self, program: &str, args: &[&str]) -> crate::Result<CmdOutput> {
            let mut line = program.to_string();
            for a in args {
                line.push(' ');
                line.push_str(a);
            }
            self.calls.lock().unwrap().push(line.clone());
            if args.contains(&"-C") && !self.present {
                return Err(NetError::NotFound(line));
            }
            Ok(CmdOutput::default())
        }

        fn spawn_detached(&self, _program: &str, _args: &[&str]) -> crate::Result<u32> {
            unreachable!("filter family never spawns")
        }
    }

    #[test]
    fn test_ensure_full_rule_shape() {
        let rec = Arc::new(FilterFake {
            calls: Mutex::new(Vec::new()),
            present: false,
        });
        let host = HostExecutor::with_runner(rec.clone());

        let rule = FilterRule {
            chain: Chain::Input,
            protocol: Some("tcp"),
            port: Some(80),
            verdict: Verdict::Drop,
        };
        host.ns_filter_ensure("vpc-a-ns-priv", &rule).unwrap();

        assert_eq!(
            rec.calls.lock().unwrap().clone(),
            vec![
                "ip netns exec vpc-a-ns-priv iptables -C INPUT -p tcp --dport 80 -j DROP",
                "ip netns exec vpc-a-ns-priv iptables -A INPUT -p tcp --dport 80 -j DROP",
            ]
        );
    }

    #[test]
    fn test_wildcard_rule_has_no_qualifiers() {
        let rec = Arc::new(FilterFake {
            calls: Mutex::new(Vec::new()),
            present: false,
        });
        let host = HostExecutor::with_runner(rec.clone());

        let rule = FilterRule {
            chain: Chain::Output,
            protocol: None,
            port: None,
            verdict: Verdict::Accept,
        };
        host.ns_filter_ensure("vpc-a-ns-priv", &rule).unwrap();

        assert_eq!(
            rec.calls.lock().unwrap().clone(),
            vec![
                "ip netns exec vpc-a-ns-priv iptables -C OUTPUT -j ACCEPT",
                "ip netns exec vpc-a-ns-priv iptables -A OUTPUT -j ACCEPT",
            ]
        );
    }

    #[test]
    fn test_ensure_is_idempotent_when_present() {
        let rec = Arc::new(FilterFake {
            calls: Mutex::new(Vec::new()),
            present: true,
        });
        let host = HostExecutor::with_runner(rec.clone());

        let rule = FilterRule {
            chain: Chain::Input,
            protocol: Some("udp"),
            port: Some(53),
            verdict: Verdict::Accept,
        };
        host.ns_filter_ensure("vpc-a-ns-priv", &rule).unwrap();
        assert_eq!(rec.calls.lock().unwrap().len(), 1);
    }
}
