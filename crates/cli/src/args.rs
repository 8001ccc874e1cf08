//! Command-line and environment configuration.
//!
//! Every flag can also be set through the environment variable named in its
//! help text. The GitHub credentials are not flags: they are read from
//! `GITHUB_PERSONAL_ACCESS_TOKEN` and `GITHUB_WEBHOOK_SECRET`.

use std::net::SocketAddr;
use std::path::PathBuf;

use aws::DEFAULT_ERROR_TABLE;
use clap::{Args, Parser, Subcommand, ValueEnum};
use deployer::SyncOptions;
use github::DEFAULT_API_URL;
use listener::policy::DEFAULT_TOPIC_NAME;
use listener::ListenerPolicy;
use pipeline::signature::SignatureAlgorithm;

#[derive(Debug, Parser)]
#[command(name = "gh-s3-deploy", version, about = "Deploy GitHub pushes to S3 buckets")]
pub struct Cli {
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,

    /// Name written to error records. Falls back to AWS_LAMBDA_FUNCTION_NAME,
    /// then to the subcommand name.
    #[arg(long, env = "FUNCTION_NAME", global = true)]
    pub function_name: Option<String>,

    #[arg(long, env = "ERROR_TABLE", default_value = DEFAULT_ERROR_TABLE, global = true)]
    pub error_table: String,

    #[arg(long, env = "ERROR_RETENTION_DAYS", default_value_t = 30, global = true)]
    pub error_retention_days: u64,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub github_api_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the webhook listener.
    Listen(ListenArgs),

    /// Serve the deploy worker.
    DeployWorker(WorkerArgs),

    /// Run one deploy job read from FILE or stdin. Exits 1 when the job
    /// should be retried.
    Deploy {
        file: Option<PathBuf>,

        #[command(flatten)]
        sync: SyncArgs,
    },

    /// Print the signature header GitHub would send for a body.
    Sign {
        file: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Algorithm::Sha256)]
        algorithm: Algorithm,
    },

    /// Register a webhook on a repository using the configured secret.
    CreateHook {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        /// Address GitHub delivers to.
        #[arg(long)]
        url: String,

        #[arg(long = "event", default_values_t = [String::from("push")])]
        events: Vec<String>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Listen(_) => "listen",
            Self::DeployWorker(_) => "deploy-worker",
            Self::Deploy { .. } => "deploy",
            Self::Sign { .. } => "sign",
            Self::CreateHook { .. } => "create-hook",
        }
    }
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    #[arg(long, env = "ALLOWED_BRANCHES", value_delimiter = ',', default_value = "master,main,dev")]
    pub allowed_branches: Vec<String>,

    #[arg(long, env = "PUSH_EVENT", default_value = "push")]
    pub push_event: String,

    #[arg(long, env = "PING_EVENT", default_value = "ping")]
    pub ping_event: String,

    #[arg(long, env = "TOPIC_NAME", default_value = DEFAULT_TOPIC_NAME)]
    pub topic_name: String,
}

impl ListenArgs {
    pub fn policy(&self) -> ListenerPolicy {
        ListenerPolicy {
            push_event: self.push_event.clone(),
            ping_event: self.ping_event.clone(),
            topic_name: self.topic_name.clone(),
            ..ListenerPolicy::default()
        }
        .with_branches(&self.allowed_branches)
    }
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Parent of the per-job scratch directories. Defaults to the system
    /// temp dir.
    #[arg(long, env = "SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    #[arg(long, env = "MULTIPART_PART_SIZE_MB", default_value_t = 100)]
    pub multipart_part_size_mb: u64,

    #[arg(long, env = "SYNC_CONCURRENCY", default_value_t = 4)]
    pub sync_concurrency: usize,
}

impl SyncArgs {
    pub fn options(&self) -> SyncOptions {
        SyncOptions::default()
            .with_part_size_mib(self.multipart_part_size_mb)
            .with_concurrency(self.sync_concurrency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    Sha1,
    Sha256,
}

impl From<Algorithm> for SignatureAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha1 => SignatureAlgorithm::Sha1,
            Algorithm::Sha256 => SignatureAlgorithm::Sha256,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gh-s3-deploy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_listen_policy_from_flags() {
        let cli = parse(&["listen", "--allowed-branches", "main, staging,", "--topic-name", "deploys"]);
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        let policy = args.policy();
        assert_eq!(
            policy.allowed_branches.into_iter().collect::<Vec<_>>(),
            ["main", "staging"]
        );
        assert_eq!(policy.topic_name, "deploys");
        assert_eq!(policy.push_event, "push");
    }

    #[test]
    fn test_sync_options_from_flags() {
        let cli = parse(&["deploy", "job.json", "--multipart-part-size-mb", "8", "--sync-concurrency", "2"]);
        let Command::Deploy { file, sync } = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(file, Some(PathBuf::from("job.json")));
        let options = sync.options();
        assert_eq!(options.part_size, 8 * 1024 * 1024);
        assert_eq!(options.multipart_threshold, options.part_size);
        assert_eq!(options.concurrency, 2);
    }

    #[test]
    fn test_create_hook_defaults_to_push() {
        let cli = parse(&["create-hook", "--owner", "octo", "--repo", "site", "--url", "https://hooks.example/webhook"]);
        let Command::CreateHook { events, .. } = cli.command else {
            panic!("expected create-hook");
        };
        assert_eq!(events, ["push"]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["sign", "--algorithm", "sha1", "--log-format", "pretty"]);
        assert_eq!(cli.log_format, LogFormat::Pretty);
        assert_eq!(cli.command.name(), "sign");
    }
}
