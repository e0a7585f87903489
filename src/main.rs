use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod docker;
mod error;
mod image;
mod login;
mod project;
mod push;
mod registry;
mod settings;
mod telemetry;

use crate::api::ApiClient;
use crate::docker::DockerCli;
use crate::image::{BuildFlags, ProgressOutput};
use crate::login::TokenSource;
use crate::push::{PushOptions, Pusher};
use crate::settings::{Ecosystem, Settings};
use crate::telemetry::TracingTelemetry;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in to the Shengsuan container registry
    Login {
        /// Pass login token on stdin instead of opening a browser
        #[arg(long, conflicts_with = "browser")]
        token_stdin: bool,
        /// Open the registry's token page in a browser
        #[arg(long)]
        browser: bool,
        /// Registry host to log in to
        #[arg(long, hide = true)]
        registry: Option<String>,
    },
    /// Build and push model in current directory to a registry
    Push(PushArgs),
}

#[derive(clap::Args, Debug)]
struct PushArgs {
    /// Image name, e.g. `your-username/hotdog-detector`
    image: Option<String>,

    /// Secrets to pass to the build environment in the form 'id=foo,src=/path/to/file'
    #[arg(long = "secret")]
    secrets: Vec<String>,

    /// Do not use cache when building the image
    #[arg(long)]
    no_cache: bool,

    /// Separate model weights from code in image layers
    #[arg(long)]
    separate_weights: bool,

    /// Use Nvidia CUDA base image, 'true' (default), 'false' or 'auto'
    #[arg(long, default_value = "auto")]
    use_cuda_base_image: String,

    /// Set type of build progress output
    #[arg(long, value_enum, default_value_t = ProgressOutput::Auto)]
    progress: ProgressOutput,

    /// Load OpenAPI schema from a file
    #[arg(long = "openapi-schema")]
    schema_file: Option<PathBuf>,

    /// Path to a Dockerfile to build from
    #[arg(long)]
    dockerfile: Option<PathBuf>,

    /// Use pre-built base image for faster cold boots
    #[arg(long)]
    use_cog_base_image: Option<bool>,

    /// The name of the config file
    #[arg(short = 'f', long = "config", default_value = project::DEFAULT_CONFIG_FILENAME)]
    config_file: String,

    /// Use the fast push path
    #[arg(long = "x-fast", hide = true)]
    fast: bool,

    /// Push a locally built image model
    #[arg(long = "x-localimage", hide = true)]
    local_image: bool,

    /// Push as a pipeline
    #[arg(long = "x-pipeline", hide = true)]
    pipeline: bool,

    /// Strip shared libraries for faster inference times
    #[arg(long = "x-strip", hide = true)]
    strip: bool,

    /// Precompile python files for faster startup times
    #[arg(long = "x-precompile", hide = true)]
    precompile: bool,
}

impl PushArgs {
    fn into_options(self) -> PushOptions {
        PushOptions {
            image: self.image,
            config_file: self.config_file,
            build: BuildFlags {
                secrets: self.secrets,
                no_cache: self.no_cache,
                separate_weights: self.separate_weights,
                use_cuda_base_image: self.use_cuda_base_image,
                progress: self.progress,
                schema_file: self.schema_file,
                dockerfile: self.dockerfile,
                use_cog_base_image: self.use_cog_base_image,
                strip: self.strip,
                precompile: self.precompile,
            },
            fast: self.fast,
            local_image: self.local_image,
            pipeline: self.pipeline,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;
    let settings = Settings::from_env(&config);

    let http_client = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")?;
    let docker = DockerCli::new(settings.container_cli());

    match cli.command {
        Commands::Login {
            token_stdin,
            browser,
            registry,
        } => {
            let registry_host = registry
                .unwrap_or_else(|| settings.endpoint(Ecosystem::Shengsuan).host.clone());
            let source = if token_stdin {
                TokenSource::Stdin
            } else if browser {
                TokenSource::Browser
            } else {
                TokenSource::Prompt
            };

            let name = login::handle_login(
                &http_client,
                &settings,
                &docker,
                &registry_host,
                source,
                &mut std::io::stdin().lock(),
                |url| webbrowser::open(url),
            )
            .await?;
            println!(
                "You've successfully authenticated as {}! You can now use the '{}' registry.",
                name, registry_host
            );
        }
        Commands::Push(args) => {
            let work_dir = std::env::current_dir().context("Failed to get current directory")?;
            let registry = ApiClient::new(http_client.clone(), &settings);
            let telemetry = TracingTelemetry;

            let outcome = Pusher::new(&settings, &registry, &docker, &docker, &telemetry)
                .push(&args.into_options(), &work_dir)
                .await?;
            println!("{}", outcome);
        }
    }

    Ok(())
}
