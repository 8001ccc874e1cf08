//! `gh-s3-deploy` entry point.
//!
//! This binary is the composition root for the whole system. It:
//!
//! 1. **Parses configuration** from flags and environment variables.
//! 2. **Wires observability**: a `tracing-subscriber` JSON or pretty layer,
//!    plus an OpenTelemetry OTLP exporter when
//!    `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! 3. **Constructs infrastructure** (`GitHubClient`, the S3, SNS, and
//!    DynamoDB adapters) and injects it into the `Listener` or `Deployer`.
//! 4. **Runs the selected subcommand**: one of the two HTTP services, a
//!    single deploy job, or operator tooling.
//!
//! Missing GitHub credentials do not stop the services from starting; each
//! invocation reports them instead.

mod args;
mod telemetry;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use deployer::{Deployer, DeployerState};
use github::{GitHubClient, WebhookRegistration};
use listener::{Listener, ListenerState};
use pipeline::signature::{self, SignatureAlgorithm};
use pipeline::{
    ConfigError, Credentials, ErrorReporter, ExecutionIdentity, FunctionName, InvocationContext,
    RepositoryName, RepositoryOwner, RepositoryRef,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::args::{Cli, Command, ListenArgs, SyncArgs, WorkerArgs};

const LAMBDA_FUNCTION_VAR: &str = "AWS_LAMBDA_FUNCTION_NAME";

/// When set, the execution identity is read from this ARN instead of STS.
const EXECUTION_ARN_VAR: &str = "EXECUTION_ARN";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let telemetry = telemetry::init(cli.log_format)?;
    let result = run(cli).await;
    telemetry.shutdown();
    result
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Sign { file, algorithm } => {
            let secret = Credentials::from_env()?.webhook_secret;
            let body = read_input(file.as_deref()).await?;
            let algorithm = SignatureAlgorithm::from(*algorithm);
            let value = signature::sign(algorithm, secret.expose_secret().as_bytes(), &body);
            println!("{}: {value}", algorithm.header_name());
            Ok(ExitCode::SUCCESS)
        }
        Command::CreateHook {
            owner,
            repo,
            url,
            events,
        } => {
            let credentials = Credentials::from_env()?;
            let client = GitHubClient::new(credentials.github_token.clone())?
                .with_api_url(cli.github_api_url.as_str());
            let repo = RepositoryRef::new(
                RepositoryOwner::new(owner.as_str()).context("owner must not be empty")?,
                RepositoryName::new(repo.as_str()).context("repo must not be empty")?,
            );
            let registration = WebhookRegistration {
                url: url.clone(),
                secret: credentials.webhook_secret.clone(),
                events: events.clone(),
            };
            let id = client.create_webhook(&repo, &registration).await?;
            println!("Created webhook {id} on {repo}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Listen(args) => {
            listen(&cli, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::DeployWorker(args) => {
            deploy_worker(&cli, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Deploy { file, sync } => deploy_once(&cli, file.as_deref(), sync).await,
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Infrastructure shared by both services.
struct Services {
    credentials: Result<Credentials, ConfigError>,
    sdk: aws::SdkConfig,
    github: Arc<GitHubClient>,
    function_name: FunctionName,
    identity: ExecutionIdentity,
    reporter: ErrorReporter,
}

impl Services {
    async fn load(cli: &Cli) -> anyhow::Result<Self> {
        let credentials = Credentials::from_env();
        if let Err(e) = &credentials {
            warn!(error = %e, "GitHub credentials are not configured; every invocation will be rejected");
        }

        let sdk = aws::load_config().await;
        let identity = match std::env::var(EXECUTION_ARN_VAR) {
            Ok(arn) => ExecutionIdentity::from_function_arn(&arn)
                .with_context(|| format!("{EXECUTION_ARN_VAR} is not an ARN: {arn}"))?,
            Err(_) => aws::resolve_execution_identity(&sdk).await?,
        };

        let token = credentials
            .as_ref()
            .map(|c| c.github_token.clone())
            .unwrap_or_else(|_| SecretString::from(String::new()));
        let github = GitHubClient::new(token)?.with_api_url(cli.github_api_url.as_str());

        let function_name = function_name(cli)?;
        let log = Arc::new(aws::DynamoErrorLog::new(&sdk, cli.error_table.as_str()));
        let reporter = ErrorReporter::new(log, function_name.clone())
            .with_retention(Duration::from_secs(cli.error_retention_days * 24 * 60 * 60));

        Ok(Self {
            credentials,
            sdk,
            github: Arc::new(github),
            function_name,
            identity,
            reporter,
        })
    }

    fn deployer(&self, sync: &SyncArgs) -> Deployer {
        let deployer = Deployer::new(
            self.credentials.clone(),
            self.github.clone(),
            Arc::new(aws::S3ObjectStore::new(&self.sdk)),
            self.reporter.clone(),
        )
        .with_sync_options(sync.options());
        match &sync.scratch_dir {
            Some(dir) => deployer.with_scratch_root(dir.clone()),
            None => deployer,
        }
    }
}

async fn listen(cli: &Cli, args: &ListenArgs) -> anyhow::Result<()> {
    let services = Services::load(cli).await?;
    let service = Listener::new(
        services.credentials.clone(),
        services.github.clone(),
        Arc::new(aws::SnsJobPublisher::new(&services.sdk)),
        services.reporter.clone(),
    )
    .with_policy(args.policy());
    info!(policy = ?service.policy(), "Listener configured");

    let router = listener::build_router(ListenerState::new(
        service,
        services.function_name,
        services.identity,
    ));
    serve(args.listen_addr, router).await
}

async fn deploy_worker(cli: &Cli, args: &WorkerArgs) -> anyhow::Result<()> {
    let services = Services::load(cli).await?;
    let service = services.deployer(&args.sync);
    info!(deployer = ?service, "Deployer configured");

    let router = deployer::build_router(DeployerState::new(
        service,
        services.function_name,
        services.identity,
    ));
    serve(args.listen_addr, router).await
}

async fn deploy_once(cli: &Cli, file: Option<&Path>, sync: &SyncArgs) -> anyhow::Result<ExitCode> {
    let services = Services::load(cli).await?;
    let message = String::from_utf8(read_input(file).await?).context("job message is not UTF-8")?;
    let ctx = InvocationContext::new(services.function_name.clone(), services.identity.clone());

    match services.deployer(sync).handle_message(&message, &ctx).await {
        Ok(resolution) => {
            println!("{resolution}");
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("{failure}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn serve(addr: SocketAddr, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(%addr, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not install the interrupt handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn function_name(cli: &Cli) -> anyhow::Result<FunctionName> {
    let name = cli
        .function_name
        .clone()
        .or_else(|| std::env::var(LAMBDA_FUNCTION_VAR).ok())
        .unwrap_or_else(|| cli.command.name().to_string());
    FunctionName::new(name).context("function name must not be empty")
}

/// Reads all of `file`, or stdin when no file is given.
async fn read_input(file: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display())),
        None => {
            let mut body = Vec::new();
            tokio::io::stdin().read_to_end(&mut body).await?;
            Ok(body)
        }
    }
}
