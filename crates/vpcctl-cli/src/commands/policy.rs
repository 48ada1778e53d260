//! `apply-policy` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::Context;
use vpcctl_core::{ensure_root, policy};

/// Arguments for apply-policy.
#[derive(Args)]
pub struct ApplyPolicyArgs {
    /// JSON policy file: an array of {subnet, ingress[], egress[]}
    #[arg(long)]
    pub policy_file: PathBuf,
}

pub fn execute(ctx: &Context, args: ApplyPolicyArgs) -> Result<()> {
    ensure_root()?;
    let entries = policy::load(&args.policy_file)?;
    let summary = ctx.reconciler.apply_policy(&entries)?;

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({
                "applied": summary.applied,
                "skipped": summary.skipped,
                "warnings": summary.warnings,
            })
        );
    } else {
        println!(
            "policy applied: {} rules ensured, {} skipped",
            summary.applied, summary.skipped
        );
    }
    Ok(())
}
