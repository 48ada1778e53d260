//! `deploy-app` command.

use anyhow::Result;
use clap::Args;

use super::Context;
use vpcctl_core::ensure_root;

/// Arguments for deploy-app.
#[derive(Args)]
pub struct DeployAppArgs {
    /// VPC hosting the target subnet
    #[arg(long)]
    pub vpc: String,

    /// Subnet whose namespace runs the application
    #[arg(long)]
    pub subnet: String,

    /// Application name
    #[arg(long)]
    pub name: String,

    /// Shell command to run inside the namespace
    #[arg(long)]
    pub cmd: String,
}

pub fn execute(ctx: &Context, args: DeployAppArgs) -> Result<()> {
    ensure_root()?;
    let app = ctx
        .reconciler
        .deploy_app(&args.vpc, &args.subnet, &args.name, &args.cmd)?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&app)?);
    } else {
        let namespace = vpcctl_core::naming::netns(&args.vpc, &args.subnet);
        match app.pid {
            Some(pid) => println!("app {} deployed (pid {pid})", app.name),
            None => println!("app {} deployed", app.name),
        }
        println!("test with: ip netns exec {namespace} curl localhost");
    }
    Ok(())
}
