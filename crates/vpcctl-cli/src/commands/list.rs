//! `list-vpcs` command.

use anyhow::Result;

use super::Context;

pub fn execute(ctx: &Context) -> Result<()> {
    let records = ctx.reconciler.list()?;

    if ctx.json {
        println!("{}", serde_json::json!({ "vpcs": records }));
        return Ok(());
    }

    if records.is_empty() {
        println!("No VPCs found");
        return Ok(());
    }

    println!("VPCs:");
    for record in &records {
        let subnets = record.subnets.len();
        let noun = if subnets == 1 { "subnet" } else { "subnets" };
        println!("  {} ({}) - {subnets} {noun}", record.name, record.cidr);
    }
    Ok(())
}
