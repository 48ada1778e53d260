//! `inspect` command.

use anyhow::Result;
use clap::Args;

use super::Context;
use vpcctl_core::VpcRecord;

/// Arguments for inspect.
#[derive(Args)]
pub struct InspectArgs {
    /// VPC to inspect
    #[arg(long)]
    pub vpc: String,
}

pub fn execute(ctx: &Context, args: InspectArgs) -> Result<()> {
    let record = ctx.reconciler.inspect(&args.vpc)?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_human(&record);
    }
    Ok(())
}

fn print_human(record: &VpcRecord) {
    println!("VPC: {}", record.name);
    println!("CIDR: {}", record.cidr);
    println!("Bridge: {}", record.bridge);
    println!("Internet Interface: {}", record.internet_iface);
    println!("Created: {}", record.created);

    println!("\nSubnets:");
    if record.subnets.is_empty() {
        println!("  (none)");
    }
    for (name, subnet) in &record.subnets {
        println!("  {name}:");
        println!("    CIDR: {}", subnet.cidr);
        println!("    Type: {}", subnet.kind);
        println!("    Namespace: {}", subnet.namespace);
        println!("    Gateway: {}", subnet.gateway);
        println!("    Host IP: {}", subnet.host_ip);
        for app in &subnet.apps {
            match app.pid {
                Some(pid) => println!("    App: {} (pid {pid}): {}", app.name, app.command),
                None => println!("    App: {}: {}", app.name, app.command),
            }
        }
    }

    if !record.peerings.is_empty() {
        println!("\nPeerings:");
        for (peer, peering) in &record.peerings {
            let cidrs: Vec<String> = peering
                .allowed_cidrs
                .iter()
                .map(ToString::to_string)
                .collect();
            println!("  {peer}: allowed {}", cidrs.join(", "));
        }
    }
}
