//! `delete-vpc` command.

use anyhow::Result;
use clap::Args;

use super::Context;
use vpcctl_core::ensure_root;

/// Arguments for delete-vpc.
#[derive(Args)]
pub struct DeleteVpcArgs {
    /// VPC to delete
    #[arg(long)]
    pub name: String,
}

pub fn execute(ctx: &Context, args: DeleteVpcArgs) -> Result<()> {
    ensure_root()?;
    ctx.reconciler.delete_vpc(&args.name)?;

    if ctx.json {
        println!("{}", serde_json::json!({ "status": "ok", "deleted": args.name }));
    } else {
        println!("VPC {} deleted", args.name);
    }
    Ok(())
}
