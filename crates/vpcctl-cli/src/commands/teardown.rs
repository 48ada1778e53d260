//! `teardown-all` command.

use anyhow::Result;

use super::Context;
use vpcctl_core::ensure_root;

pub fn execute(ctx: &Context) -> Result<()> {
    ensure_root()?;
    ctx.reconciler.teardown_all()?;

    if ctx.json {
        println!("{}", serde_json::json!({ "status": "ok" }));
    } else {
        println!("all VPCs deleted, host swept");
    }
    Ok(())
}
