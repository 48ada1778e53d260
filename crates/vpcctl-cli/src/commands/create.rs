//! `create-vpc` command.

use anyhow::Result;
use clap::Args;

use super::Context;
use vpcctl_core::ensure_root;

/// Arguments for create-vpc.
#[derive(Args)]
pub struct CreateVpcArgs {
    /// VPC name
    #[arg(long)]
    pub name: String,

    /// Address block, e.g. 10.20.0.0/16
    #[arg(long)]
    pub cidr: String,

    /// Upstream interface public subnets masquerade out of
    #[arg(long)]
    pub internet_iface: String,
}

pub fn execute(ctx: &Context, args: CreateVpcArgs) -> Result<()> {
    ensure_root()?;
    let record = ctx
        .reconciler
        .create_vpc(&args.name, &args.cidr, &args.internet_iface)?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!(
            "VPC {} created: {} on bridge {} (upstream {})",
            record.name, record.cidr, record.bridge, record.internet_iface
        );
    }
    Ok(())
}
