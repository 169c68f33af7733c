//! Registers/deregisters a [`RemoteCluster`] with the CD driver, refcounted against however many
//! sibling provisioners target it (§4.6, §5, §9).

use async_trait::async_trait;
use nimbus_cd::Kubeconfig;
use nimbus_outcome::ValueOutcome;
use nimbus_remote::RemoteCluster;

use crate::ctx::ProvisionCtx;
use crate::provisioner::{Outcome, Provisioner};

/// Wraps a single [`RemoteCluster`] registration. `provision` resolves the remote's kubeconfig
/// and upserts the CD driver's cluster registration the first time any sibling acquires it in
/// this reconcile; `deprovision` deregisters only once every acquirer has released it (§4.6).
pub struct RemoteClusterProvisioner {
    remote: RemoteCluster,
}

impl RemoteClusterProvisioner {
    pub fn new(remote: RemoteCluster) -> Self {
        Self { remote }
    }

    async fn resolve_kubeconfig(&self, ctx: &ProvisionCtx) -> ValueOutcome<Kubeconfig, crate::error::Error> {
        match self.remote.config(ctx.host_client()).await {
            ValueOutcome::Ok(kubeconfig) => ValueOutcome::Ok(kubeconfig),
            ValueOutcome::Yield => ValueOutcome::Yield,
            ValueOutcome::Err(e) => ValueOutcome::Err(e.into()),
        }
    }
}

#[async_trait]
impl Provisioner for RemoteClusterProvisioner {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
        let id = self.remote.id();
        let first = ctx.registry().acquire(&id).await;
        if !first {
            return Outcome::Ok;
        }

        let kubeconfig = match self.resolve_kubeconfig(ctx).await {
            ValueOutcome::Ok(kubeconfig) => kubeconfig,
            ValueOutcome::Yield => return Outcome::Yield,
            ValueOutcome::Err(e) => return Outcome::Err(e),
        };

        ctx.cd_driver()
            .create_or_update_cluster(&id, &kubeconfig)
            .await
            .map_err(crate::error::Error::from)
    }

    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
        let id = self.remote.id();
        let last = ctx.registry().release(&id).await;
        if !last {
            return Outcome::Ok;
        }

        ctx.cd_driver()
            .delete_cluster(&id)
            .await
            .map_err(crate::error::Error::from)
    }

    fn name(&self) -> &str {
        "remote-cluster"
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

    fn in_cluster() -> RemoteCluster {
        RemoteCluster::InCluster {
            identity: IdentityLabels {
                organization: "acme".into(),
                project: "payments".into(),
                control_plane: None,
                cluster: None,
            },
        }
    }

    #[tokio::test]
    async fn registers_once_across_two_acquirers() {
        let driver = Arc::new(FakeDriver::new());
        let ctx = ProvisionCtx::new(test_client(), driver.clone(), CancellationToken::new());
        let a = RemoteClusterProvisioner::new(in_cluster());
        let b = RemoteClusterProvisioner::new(in_cluster());

        assert!(a.provision(&ctx).await.is_ok());
        assert!(b.provision(&ctx).await.is_ok());
        assert_eq!(driver.cluster_count(), 1);

        assert!(a.deprovision(&ctx).await.is_ok());
        assert_eq!(driver.cluster_count(), 1, "still referenced by b");
        assert!(b.deprovision(&ctx).await.is_ok());
        assert_eq!(driver.cluster_count(), 0);
    }
}
