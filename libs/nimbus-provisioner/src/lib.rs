//! The provisioner algebra (§4.2, §4.6–§4.9): a uniform `provision`/`deprovision` contract,
//! combinators to build trees out of it, and the two leaves (`ResourceProvisioner`,
//! `ApplicationProvisioner`) that actually talk to the Kubernetes API and the CD driver.

pub mod application;
pub mod combinators;
pub mod ctx;
pub mod error;
pub mod remote;
pub mod resource;

mod provisioner;

pub use application::{ApplicationCustomizer, ApplicationGenerator, ApplicationProvisioner};
pub use combinators::{Concurrent, Conditional, Serial};
pub use ctx::ProvisionCtx;
pub use error::Error;
pub use provisioner::{BackgroundDelete, InNamespace, OnRemote, Outcome, Provisioner, ProvisionerExt};
pub use remote::RemoteClusterProvisioner;
pub use resource::{ObjectName, ResourceProvisioner};
