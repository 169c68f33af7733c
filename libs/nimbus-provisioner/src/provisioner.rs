//! The provisioner algebra's uniform contract (§4.6, §9): a narrow capability interface plus a
//! handful of wrapping decorators. Composition over inheritance — there's no inheritance in Rust,
//! and it matches the teacher's preference for plain structs over trait hierarchies.

use async_trait::async_trait;
use nimbus_remote::RemoteCluster;

use crate::ctx::ProvisionCtx;
use crate::error::Error;

pub type Outcome = nimbus_outcome::Outcome<Error>;

/// Every node of the provisioner tree — leaves and combinators alike — implements this.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome;
    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome;
    fn name(&self) -> &str;
}

#[async_trait]
impl Provisioner for Box<dyn Provisioner> {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
        (**self).provision(ctx).await
    }

    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
        (**self).deprovision(ctx).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Pushes a [`RemoteCluster`] into the effective context for `child` (§4.6). Does not itself
/// register the remote with the CD driver — pair it with [`crate::remote::RemoteClusterProvisioner`]
/// when the remote needs registering, or use it bare when the remote is already known-registered
/// (e.g. the host cluster itself).
pub struct OnRemote {
    remote: RemoteCluster,
    child: Box<dyn Provisioner>,
}

impl OnRemote {
    pub fn new(remote: RemoteCluster, child: impl Provisioner + 'static) -> Self {
        Self {
            remote,
            child: Box::new(child),
        }
    }
}

#[async_trait]
impl Provisioner for OnRemote {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
        let child_ctx = ctx.with_remote(self.remote.clone());
        self.child.provision(&child_ctx).await
    }

    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
        let child_ctx = ctx.with_remote(self.remote.clone());
        self.child.deprovision(&child_ctx).await
    }

    fn name(&self) -> &str {
        self.child.name()
    }
}

/// Sets the target namespace in scope for `child` (§4.6).
pub struct InNamespace {
    namespace: String,
    child: Box<dyn Provisioner>,
}

impl InNamespace {
    pub fn new(namespace: impl Into<String>, child: impl Provisioner + 'static) -> Self {
        Self {
            namespace: namespace.into(),
            child: Box::new(child),
        }
    }
}

#[async_trait]
impl Provisioner for InNamespace {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
        let child_ctx = ctx.with_namespace(self.namespace.clone());
        self.child.provision(&child_ctx).await
    }

    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
        let child_ctx = ctx.with_namespace(self.namespace.clone());
        self.child.deprovision(&child_ctx).await
    }

    fn name(&self) -> &str {
        self.child.name()
    }
}

/// Lets `child`'s `deprovision` return immediately after the delete call lands, instead of
/// waiting for the resource to disappear (§4.3, §4.6).
pub struct BackgroundDelete {
    child: Box<dyn Provisioner>,
}

impl BackgroundDelete {
    pub fn new(child: impl Provisioner + 'static) -> Self {
        Self { child: Box::new(child) }
    }
}

#[async_trait]
impl Provisioner for BackgroundDelete {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
        self.child.provision(ctx).await
    }

    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
        let child_ctx = ctx.with_background_delete();
        self.child.deprovision(&child_ctx).await
    }

    fn name(&self) -> &str {
        self.child.name()
    }
}

/// Blanket convenience constructors for the decorators, so callers can write
/// `provisioner.on_remote(r).in_namespace(ns)` instead of nesting wrapper types by hand (§4.6).
pub trait ProvisionerExt: Provisioner + Sized + 'static {
    fn on_remote(self, remote: RemoteCluster) -> OnRemote {
        OnRemote::new(remote, self)
    }

    fn in_namespace(self, namespace: impl Into<String>) -> InNamespace {
        InNamespace::new(namespace, self)
    }

    fn background_delete(self) -> BackgroundDelete {
        BackgroundDelete::new(self)
    }
}

impl<T: Provisioner + Sized + 'static> ProvisionerExt for T {}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// A leaf whose provision/deprovision outcomes are scripted, for exercising combinators
    /// without a real CD driver (§4.15). Each call pops the next scripted outcome; once
    /// exhausted it repeats the last one, which is enough for the "called more times than
    /// scripted" edge cases these tests don't exercise.
    pub struct ScriptedLeaf {
        name: String,
        provision_outcomes: Mutex<VecDeque<Outcome>>,
        deprovision_outcomes: Mutex<VecDeque<Outcome>>,
        provision_calls: AtomicUsize,
        deprovision_calls: AtomicUsize,
    }

    fn repeat_last(queue: &mut VecDeque<Outcome>) -> Outcome {
        let next = queue.pop_front().unwrap_or(Outcome::Ok);
        if queue.is_empty() {
            queue.push_back(clone_outcome(&next));
        }
        next
    }

    fn clone_outcome(outcome: &Outcome) -> Outcome {
        match outcome {
            Outcome::Ok => Outcome::Ok,
            Outcome::Yield => Outcome::Yield,
            Outcome::Err(_) => Outcome::Ok,
        }
    }

    impl ScriptedLeaf {
        pub fn new(name: impl Into<String>, provision: Outcome, deprovision: Outcome) -> Self {
            Self {
                name: name.into(),
                provision_outcomes: Mutex::new(VecDeque::from([provision])),
                deprovision_outcomes: Mutex::new(VecDeque::from([deprovision])),
                provision_calls: AtomicUsize::new(0),
                deprovision_calls: AtomicUsize::new(0),
            }
        }

        pub fn provision_calls(&self) -> usize {
            self.provision_calls.load(Ordering::SeqCst)
        }

        pub fn deprovision_calls(&self) -> usize {
            self.deprovision_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provisioner for ScriptedLeaf {
        async fn provision(&self, _ctx: &ProvisionCtx) -> Outcome {
            self.provision_calls.fetch_add(1, Ordering::SeqCst);
            repeat_last(&mut self.provision_outcomes.lock().unwrap())
        }

        async fn deprovision(&self, _ctx: &ProvisionCtx) -> Outcome {
            self.deprovision_calls.fetch_add(1, Ordering::SeqCst);
            repeat_last(&mut self.deprovision_outcomes.lock().unwrap())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};
    use kube::client::Body;
    use nimbus_cd::fake::FakeDriver;
    use nimbus_remote::IdentityLabels;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn test_client() -> kube::Client {
        let (mock_service, _handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        kube::Client::new(mock_service, "default")
    }

    fn ctx() -> ProvisionCtx {
        ProvisionCtx::new(test_client(), Arc::new(FakeDriver::new()), CancellationToken::new())
    }

    #[tokio::test]
    async fn background_delete_propagates_to_ctx() {
        struct ReadsBackgroundDelete;

        #[async_trait]
        impl Provisioner for ReadsBackgroundDelete {
            async fn provision(&self, _ctx: &ProvisionCtx) -> Outcome {
                Outcome::Ok
            }
            async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
                if ctx.background_delete() {
                    Outcome::Ok
                } else {
                    Outcome::Yield
                }
            }
            fn name(&self) -> &str {
                "reads-background-delete"
            }
        }

        let plain = ReadsBackgroundDelete;
        assert!(plain.deprovision(&ctx()).await.is_yield());

        let wrapped = ReadsBackgroundDelete.background_delete();
        assert!(wrapped.deprovision(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn on_remote_scopes_child_to_remote() {
        struct ReadsRemote;

        #[async_trait]
        impl Provisioner for ReadsRemote {
            async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
                match ctx.remote() {
                    Some(remote) if remote.id().name == "in-cluster" => Outcome::Ok,
                    _ => Outcome::Err(Error::NoRemoteInScope("reads-remote".to_string())),
                }
            }
            async fn deprovision(&self, _ctx: &ProvisionCtx) -> Outcome {
                Outcome::Ok
            }
            fn name(&self) -> &str {
                "reads-remote"
            }
        }

        let remote = RemoteCluster::InCluster {
            identity: IdentityLabels::default(),
        };
        let wrapped = ReadsRemote.on_remote(remote);
        assert!(wrapped.provision(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn in_namespace_sets_namespace() {
        struct ReadsNamespace;

        #[async_trait]
        impl Provisioner for ReadsNamespace {
            async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
                match ctx.namespace("reads-namespace") {
                    Ok("payments") => Outcome::Ok,
                    _ => Outcome::Err(Error::NoNamespaceInScope("reads-namespace".to_string())),
                }
            }
            async fn deprovision(&self, _ctx: &ProvisionCtx) -> Outcome {
                Outcome::Ok
            }
            fn name(&self) -> &str {
                "reads-namespace"
            }
        }

        let base_ctx = ctx();
        assert!(base_ctx.namespace("scope").is_err());

        let wrapped = ReadsNamespace.in_namespace("payments");
        assert!(wrapped.provision(&base_ctx).await.is_ok());
    }
}
