//! CLI verb table and shared command context.
//!
//! Verbs are bound through the [`Commands`] enum; each variant's handler
//! lives in its own module. Global flags apply anywhere on the command
//! line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vpcctl_core::Reconciler;

pub mod create;
pub mod delete;
pub mod deploy;
pub mod inspect;
pub mod list;
pub mod peer;
pub mod policy;
pub mod subnet;
pub mod teardown;

/// vpcctl - manage lightweight VPCs on a single Linux host
#[derive(Parser)]
#[command(name = "vpcctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit structured JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Directory holding per-VPC state files
    #[arg(long, global = true, default_value = "state")]
    pub state_dir: PathBuf,

    /// Seconds to wait for another invocation's lock before giving up
    #[arg(long, global = true, default_value_t = 10)]
    pub lock_timeout: u64,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new VPC
    CreateVpc(create::CreateVpcArgs),

    /// Add a subnet to a VPC
    AddSubnet(subnet::AddSubnetArgs),

    /// Deploy an application into a subnet namespace
    DeployApp(deploy::DeployAppArgs),

    /// Apply a firewall policy file
    ApplyPolicy(policy::ApplyPolicyArgs),

    /// Peer two VPCs
    Peer(peer::PeerArgs),

    /// Inspect one VPC
    Inspect(inspect::InspectArgs),

    /// List all VPCs
    ListVpcs,

    /// Delete a VPC and everything it owns
    DeleteVpc(delete::DeleteVpcArgs),

    /// Delete all VPCs and sweep orphaned objects
    TeardownAll,
}

/// Shared state handed to every command handler.
pub struct Context {
    pub reconciler: Reconciler,
    pub json: bool,
}
