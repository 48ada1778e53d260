//! # vpcctl-core
//!
//! The VPC control plane: validates declarative intent against
//! address-plan and naming invariants, drives the host executor through
//! ordered, idempotent operation sequences, and keeps a durable per-VPC
//! state store that never runs ahead of the kernel.
//!
//! Components:
//!
//! - [`plan`]: CIDR validation, containment, overlap, address allocation
//! - [`naming`]: deterministic, length-safe kernel object names
//! - [`model`]: VPC/subnet/application/peering records (the wire format
//!   of the state files)
//! - [`store`]: atomic one-file-per-VPC JSON store
//! - [`lock`]: per-VPC and store-wide advisory flocks
//! - [`reconciler`]: one idempotent operation per user verb
//! - [`policy`]: declarative firewall rules compiled into namespaces
//! - peering lives on the reconciler (`Reconciler::peer`)

pub mod error;
pub mod lock;
pub mod model;
pub mod naming;
pub mod peering;
pub mod plan;
pub mod policy;
pub mod reconciler;
pub mod store;

pub use error::{Error, Result};
pub use model::{AppRecord, PeeringRecord, SubnetKind, SubnetRecord, VpcRecord};
pub use plan::PlanError;
pub use policy::{PolicyEntry, PolicyRule, PolicySummary};
pub use reconciler::{ensure_root, Reconciler};
pub use store::{StateStore, StoreError};
