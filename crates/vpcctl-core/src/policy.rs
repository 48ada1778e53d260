//! Firewall policy engine.
//!
//! A policy document is an ordered list of entries, each targeting every
//! subnet (across all VPCs) whose CIDR equals the entry's `subnet`.
//! Rules compile to namespace INPUT/OUTPUT filter rules in listed order,
//! so iptables' first-match evaluation preserves the documented
//! precedence; with no match the chain policy (accept) applies.
//!
//! A rule that cannot be compiled (unknown protocol, or a numeric port
//! on a protocol without ports) is skipped with a warning. The batch
//! never aborts on a bad rule or an unreachable namespace.

use std::path::Path;

use ipnetwork::Ipv4Network;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::VpcRecord;
use vpcctl_net::{Chain, FilterRule, HostExecutor, Verdict};

/// One policy document entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyEntry {
    /// Target subnet CIDR; matched by equality against subnet records.
    pub subnet: Ipv4Network,
    #[serde(default)]
    pub ingress: Vec<PolicyRule>,
    #[serde(default)]
    pub egress: Vec<PolicyRule>,
}

/// One declarative rule.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRule {
    pub port: PortSpec,
    pub protocol: String,
    pub action: RuleAction,
}

/// A port match: a number or the wildcard `"any"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    Number(u16),
    Word(String),
}

/// Rule verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

/// Outcome of a policy application.
#[derive(Debug, Default)]
pub struct PolicySummary {
    /// Filter rules ensured on a namespace chain.
    pub applied: usize,
    /// Rules or entries skipped, each with a reported warning.
    pub skipped: usize,
    /// Human-readable warnings, in occurrence order.
    pub warnings: Vec<String>,
}

impl PolicySummary {
    fn skip(&mut self, message: String) {
        warn!("{message}");
        self.skipped += 1;
        self.warnings.push(message);
    }
}

/// Loads a policy document: a JSON array of entries, or a single entry
/// object (tolerated for compatibility).
pub fn load(path: &Path) -> Result<Vec<PolicyEntry>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<PolicyEntry>),
        One(Box<PolicyEntry>),
    }

    let json = std::fs::read_to_string(path)
        .map_err(|e| Error::Validation(format!("cannot read policy file {}: {e}", path.display())))?;
    let parsed: OneOrMany = serde_json::from_str(&json)
        .map_err(|e| Error::Validation(format!("invalid policy file {}: {e}", path.display())))?;

    Ok(match parsed {
        OneOrMany::Many(entries) => entries,
        OneOrMany::One(entry) => vec![*entry],
    })
}

/// Compiles one declarative rule for a chain.
///
/// Returns the filter rules to install (may be several: `protocol: any`
/// with a numeric port expands to one rule per port-bearing protocol),
/// or a warning describing why the rule is uncompilable.
fn compile(rule: &PolicyRule, chain: Chain) -> std::result::Result<Vec<FilterRule>, String> {
    let verdict = match rule.action {
        RuleAction::Allow => Verdict::Accept,
        RuleAction::Deny => Verdict::Drop,
    };

    let port = match &rule.port {
        PortSpec::Number(n) => Some(*n),
        PortSpec::Word(w) if w == "any" => None,
        PortSpec::Word(w) => return Err(format!("unknown port `{w}`")),
    };

    let protocols: &[&'static str] = match rule.protocol.as_str() {
        "tcp" => &["tcp"],
        "udp" => &["udp"],
        "icmp" if port.is_some() => {
            return Err("icmp rules cannot carry a port".to_string());
        }
        "icmp" => &["icmp"],
        "any" if port.is_some() => &["tcp", "udp"],
        "any" => {
            return Ok(vec![FilterRule {
                chain,
                protocol: None,
                port: None,
                verdict,
            }]);
        }
        other => return Err(format!("unknown protocol `{other}`")),
    };

    Ok(protocols
        .iter()
        .copied()
        .map(|proto| FilterRule {
            chain,
            protocol: Some(proto),
            port,
            verdict,
        })
        .collect())
}

/// Applies a policy document against every matching subnet namespace.
#[must_use]
pub fn apply(host: &HostExecutor, records: &[VpcRecord], entries: &[PolicyEntry]) -> PolicySummary {
    let mut summary = PolicySummary::default();

    for entry in entries {
        let targets: Vec<(&str, &str)> = records
            .iter()
            .flat_map(|vpc| {
                vpc.subnets
                    .values()
                    .filter(|s| s.cidr == entry.subnet)
                    .map(move |s| (vpc.name.as_str(), s.namespace.as_str()))
            })
            .collect();

        if targets.is_empty() {
            summary.skip(format!("no subnet with CIDR {} found", entry.subnet));
            continue;
        }

        for (vpc, netns) in targets {
            apply_direction(host, vpc, netns, &entry.ingress, Chain::Input, &mut summary);
            apply_direction(host, vpc, netns, &entry.egress, Chain::Output, &mut summary);
        }
    }

    summary
}

fn apply_direction(
    host: &HostExecutor,
    vpc: &str,
    netns: &str,
    rules: &[PolicyRule],
    chain: Chain,
    summary: &mut PolicySummary,
) {
    for rule in rules {
        let compiled = match compile(rule, chain) {
            Ok(compiled) => compiled,
            Err(reason) => {
                summary.skip(format!("skipping rule on {vpc}/{netns}: {reason}"));
                continue;
            }
        };
        for filter in compiled {
            match host.ns_filter_ensure(netns, &filter) {
                Ok(()) => summary.applied += 1,
                Err(err) => {
                    summary.skip(format!("cannot install rule in {netns}: {err}"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(port: PortSpec, protocol: &str, action: RuleAction) -> PolicyRule {
        PolicyRule {
            port,
            protocol: protocol.to_string(),
            action,
        }
    }

    #[test]
    fn test_compile_specific_rule() {
        let compiled = compile(
            &rule(PortSpec::Number(80), "tcp", RuleAction::Deny),
            Chain::Input,
        )
        .unwrap();
        assert_eq!(
            compiled,
            vec![FilterRule {
                chain: Chain::Input,
                protocol: Some("tcp"),
                port: Some(80),
                verdict: Verdict::Drop,
            }]
        );
    }

    #[test]
    fn test_compile_any_any_is_wildcard() {
        let compiled = compile(
            &rule(PortSpec::Word("any".into()), "any", RuleAction::Allow),
            Chain::Output,
        )
        .unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].protocol, None);
        assert_eq!(compiled[0].port, None);
        assert_eq!(compiled[0].verdict, Verdict::Accept);
    }

    #[test]
    fn test_compile_any_protocol_with_port_expands() {
        let compiled = compile(
            &rule(PortSpec::Number(53), "any", RuleAction::Allow),
            Chain::Input,
        )
        .unwrap();
        let protos: Vec<_> = compiled.iter().map(|r| r.protocol.unwrap()).collect();
        assert_eq!(protos, vec!["tcp", "udp"]);
        assert!(compiled.iter().all(|r| r.port == Some(53)));
    }

    #[test]
    fn test_compile_rejects_bad_combinations() {
        assert!(compile(
            &rule(PortSpec::Number(80), "icmp", RuleAction::Deny),
            Chain::Input
        )
        .is_err());
        assert!(compile(
            &rule(PortSpec::Word("any".into()), "gre", RuleAction::Deny),
            Chain::Input
        )
        .is_err());
        assert!(compile(
            &rule(PortSpec::Word("some".into()), "tcp", RuleAction::Deny),
            Chain::Input
        )
        .is_err());
    }

    #[test]
    fn test_compile_icmp_wildcard_port() {
        let compiled = compile(
            &rule(PortSpec::Word("any".into()), "icmp", RuleAction::Deny),
            Chain::Input,
        )
        .unwrap();
        assert_eq!(compiled[0].protocol, Some("icmp"));
        assert_eq!(compiled[0].port, None);
    }

    #[test]
    fn test_load_accepts_array_and_single_object() {
        let dir = tempfile::TempDir::new().unwrap();

        let array = dir.path().join("array.json");
        std::fs::write(
            &array,
            r#"[{"subnet":"10.20.2.0/24","ingress":[{"port":80,"protocol":"tcp","action":"deny"}]}]"#,
        )
        .unwrap();
        let entries = load(&array).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ingress.len(), 1);
        assert!(entries[0].egress.is_empty());

        let single = dir.path().join("single.json");
        std::fs::write(&single, r#"{"subnet":"10.20.2.0/24","egress":[]}"#).unwrap();
        assert_eq!(load(&single).unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[{\"subnet\": 42}]").unwrap();

        let err = load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let missing = load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(missing.exit_code(), 1);
    }
}
