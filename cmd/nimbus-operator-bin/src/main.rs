use std::sync::Arc;
use std::time::Duration;

use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use clap::{crate_authors, crate_description, crate_version, Parser, ValueEnum};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Config;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use nimbus_bundle::BundleProvider;
use nimbus_cd::CdDriver;
use nimbus_k8s_util::client::new_client_with_metrics;
use nimbus_operator::controller::{self, State};
use nimbus_operator::metrics::Metrics;
use nimbus_operator::telemetry;
use prometheus_client::registry::Registry;

#[get("/metrics")]
async fn metrics(state: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(state.metrics())
}

#[get("/health")]
async fn health(state: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json(state.diagnostics().await)
}

/// The only CD driver kind this build knows how to talk to (§4.14). Closed set so an operator
/// mistyping `--cd-driver` fails fast at startup instead of silently no-op'ing every reconcile.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
enum CdDriverKind {
    Argocd,
}

#[derive(Parser, Debug)]
#[command(
    name = "nimbus-operator",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port for `/health` and `/metrics`.
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`.
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format.
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint. If unset, tracing is disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// Continuous-delivery backend to drive (§4.3). Only `argocd` exists today.
    #[arg(long, value_enum, default_value_t = CdDriverKind::Argocd, env)]
    cd_driver: CdDriverKind,

    /// Namespace the CD driver's own resources (Applications, cluster secrets) live in.
    #[arg(long, default_value = "argocd", env)]
    cd_driver_namespace: String,

    /// Path to a kubeconfig file. Defaults to in-cluster config / `KUBECONFIG` inference.
    #[arg(long, env)]
    kubeconfig: Option<String>,

    /// kubeconfig context to use, when `--kubeconfig` is set.
    #[arg(long, env)]
    context: Option<String>,

    /// Path to the YAML file listing `ApplicationBundle`s this operator resolves units against
    /// (§4.4).
    #[arg(long, default_value = "bundles.yaml", env)]
    bundles_file: String,

    /// Enables lease-based leader election so only one replica runs the controllers at a time.
    #[arg(long, default_value_t = false, env)]
    leader_election: bool,

    /// Namespace the leader-election `Lease` object lives in.
    #[arg(long, default_value = "default", env)]
    leader_election_namespace: String,

    /// How long a held lease stays valid without renewal.
    #[arg(long, default_value_t = 15, env)]
    leader_election_lease_ttl_seconds: u64,
}

async fn build_client(args: &Args) -> anyhow::Result<(kube::Client, Registry)> {
    let config = match &args.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)?;
            Config::from_custom_kubeconfig(
                kubeconfig,
                &KubeConfigOptions {
                    context: args.context.clone(),
                    ..Default::default()
                },
            )
            .await?
        }
        None => Config::infer().await?,
    };

    let mut registry = Registry::with_prefix("nimbus_operator");
    let client = new_client_with_metrics(config, &mut registry).await?;
    Ok((client, registry))
}

/// Runs the controllers for as long as this process holds leadership, renewing the lease every
/// third of its TTL and aborting the controller task the moment leadership is lost or can't be
/// renewed — the acquire/renew/abort shape the pack's `kube_leader_election` usage follows.
async fn run_with_leader_election(
    args: &Args,
    client: kube::Client,
    cd_driver: Arc<dyn CdDriver>,
    bundles: Arc<dyn BundleProvider>,
    state: State,
) -> anyhow::Result<()> {
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("nimbus-operator-{}", uuid::Uuid::new_v4()));
    let lease_ttl = Duration::from_secs(args.leader_election_lease_ttl_seconds);
    let renew_every = lease_ttl / 3;

    let leadership = LeaseLock::new(
        client.clone(),
        &args.leader_election_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "nimbus-operator-lock".to_string(),
            lease_ttl,
        },
    );

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tick.tick().await;
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(lease) => lease,
            Err(e) => {
                tracing::warn!(error = %e, "leader election renew/acquire failed");
                if let Some(task) = controller_task.take() {
                    task.abort();
                }
                continue;
            }
        };

        if lease.acquired_lease {
            if controller_task.is_none() {
                tracing::info!("acquired leadership; starting controllers");
                let client = client.clone();
                let cd_driver = cd_driver.clone();
                let bundles = bundles.clone();
                let state = state.clone();
                controller_task = Some(tokio::spawn(async move {
                    controller::run(client, cd_driver, bundles, true, state).await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            tracing::warn!("lost leadership; stopping controllers");
            task.abort();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    telemetry::init(&args.log_filter, args.log_format.clone(), args.tracing_url.as_deref(), args.sample_ratio)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let (client, registry) = build_client(&args).await?;
    let bundles: Arc<dyn BundleProvider> =
        Arc::new(nimbus_operator::bundles::FileBundleProvider::load(std::path::Path::new(&args.bundles_file))?);

    let cd_driver: Arc<dyn CdDriver> = match args.cd_driver {
        CdDriverKind::Argocd => Arc::new(nimbus_cd::argocd::ArgoCdDriver::new(client.clone(), args.cd_driver_namespace.clone())),
    };

    let state = State::new(Metrics::new(registry));

    let server = HttpServer::new({
        let state = state.clone();
        move || {
            App::new()
                .app_data(Data::new(state.clone()))
                .wrap(middleware::Logger::default().exclude("/health"))
                .service(health)
                .service(metrics)
        }
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    if args.leader_election {
        tokio::select! {
            result = run_with_leader_election(&args, client, cd_driver, bundles, state) => result,
            result = server.run() => result.map_err(Into::into),
        }
    } else {
        let controllers = controller::run(client, cd_driver, bundles, true, state);
        tokio::join!(controllers, server.run()).1?;
        Ok(())
    }
}
