//! # vpcctl-net
//!
//! Host network executor for vpcctl.
//!
//! This crate is the single seam between the control plane and the
//! operating system. It wraps four families of host operations:
//!
//! - **Links**: bridges, veth pairs, addresses, routes, forwarding
//! - **Namespaces**: create/delete/list/exec, detached in-namespace spawn
//! - **NAT**: masquerade rules with check-then-insert semantics
//! - **Filter**: accept/drop rules inside subnet namespaces
//!
//! All mutations run through a [`CommandRunner`], so the reconciler's
//! sequences can be exercised against a scripted runner in tests. Tool
//! failures come back as typed [`NetError`]s; *not-found* and
//! *already-exists* are first-class outcomes that callers may treat as
//! success.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod filter;
pub mod host;
pub mod link;
pub mod nat;
pub mod netns;
pub mod runner;

pub use error::{NetError, Result};
pub use filter::{Chain, FilterRule, Verdict};
pub use host::HostExecutor;
pub use nat::MasqueradeRule;
pub use runner::{CmdOutput, CommandRunner, SystemRunner};
