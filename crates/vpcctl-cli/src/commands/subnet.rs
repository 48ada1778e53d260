//! `add-subnet` command.

use anyhow::Result;
use clap::{Args, ValueEnum};

use super::Context;
use vpcctl_core::{ensure_root, SubnetKind};

/// Arguments for add-subnet.
#[derive(Args)]
pub struct AddSubnetArgs {
    /// VPC to add the subnet to
    #[arg(long)]
    pub vpc: String,

    /// Subnet name, unique within the VPC
    #[arg(long)]
    pub name: String,

    /// Address block, strictly inside the VPC block
    #[arg(long)]
    pub cidr: String,

    /// Whether the subnet gets NAT to the upstream interface
    #[arg(long = "type", value_enum)]
    pub kind: SubnetKindArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SubnetKindArg {
    Public,
    Private,
}

impl From<SubnetKindArg> for SubnetKind {
    fn from(kind: SubnetKindArg) -> Self {
        match kind {
            SubnetKindArg::Public => Self::Public,
            SubnetKindArg::Private => Self::Private,
        }
    }
}

pub fn execute(ctx: &Context, args: AddSubnetArgs) -> Result<()> {
    ensure_root()?;
    let record =
        ctx.reconciler
            .add_subnet(&args.vpc, &args.name, &args.cidr, args.kind.into())?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        let subnet = &record.subnets[&args.name];
        println!(
            "subnet {} added to VPC {}: {} ({}), namespace {}, host {} via {}",
            args.name,
            record.name,
            subnet.cidr,
            subnet.kind,
            subnet.namespace,
            subnet.host_ip,
            subnet.gateway
        );
    }
    Ok(())
}
