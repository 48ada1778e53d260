//! `peer` command.

use anyhow::Result;
use clap::Args;

use super::Context;
use vpcctl_core::ensure_root;

/// Arguments for peer.
#[derive(Args)]
pub struct PeerArgs {
    /// First VPC
    #[arg(long)]
    pub vpc_a: String,

    /// Second VPC
    #[arg(long)]
    pub vpc_b: String,

    /// Comma-separated CIDRs routed across the peering
    #[arg(long)]
    pub allowed_cidrs: String,
}

pub fn execute(ctx: &Context, args: PeerArgs) -> Result<()> {
    ensure_root()?;
    let record = ctx
        .reconciler
        .peer(&args.vpc_a, &args.vpc_b, &args.allowed_cidrs)?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        let cidrs: Vec<String> = record.allowed_cidrs.iter().map(ToString::to_string).collect();
        println!(
            "peering {} <-> {} established ({} / {}), allowed: {}",
            record.vpc_a,
            record.vpc_b,
            record.link_a,
            record.link_b,
            cidrs.join(", ")
        );
    }
    Ok(())
}
