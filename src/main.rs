use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use foldershare::common::config::{apply_overrides, load_config, ConfigOverrides, Transport};
use foldershare::common::config_commands::{
    run_config_defaults, run_config_path, run_config_show,
};
use foldershare::server::{self, InitialShare};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "foldershare")]
#[command(version, about = "Share a local folder over a public URL, behind a password and a quota")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (and the tunnel once a share is configured)
    Serve {
        /// Local port to listen on (0 picks a free port)
        #[arg(long)]
        port: Option<u16>,

        /// How the server is published
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,

        /// Preferred public name, for providers that support one
        #[arg(long)]
        subdomain: Option<String>,

        /// Folder to share immediately instead of waiting for /api/setup
        #[arg(long, requires_all = ["space", "password"])]
        folder: Option<String>,

        /// Reserved space in GB
        #[arg(long, requires = "folder")]
        space: Option<f64>,

        /// Password clients must present
        #[arg(long, requires = "folder")]
        password: Option<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config file location
    Path,
    /// Print the config file contents
    Show,
    /// Print the built-in defaults
    Defaults,
}

#[derive(ValueEnum, Clone, Copy)]
enum ProviderArg {
    Localtunnel,
    Cloudflare,
    Local,
}

impl From<ProviderArg> for Transport {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Localtunnel => Transport::Localtunnel,
            ProviderArg::Cloudflare => Transport::Cloudflare,
            ProviderArg::Local => Transport::Local,
        }
    }
}

fn init_tracing(verbose: bool) {
    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve {
            port,
            provider,
            subdomain,
            folder,
            space,
            password,
        } => {
            let overrides = ConfigOverrides {
                port,
                provider: provider.map(Transport::from),
                subdomain,
            };
            let config = apply_overrides(load_config()?, &overrides);
            config.validate()?;

            let initial = match (folder, space, password) {
                (Some(folder), Some(space_gb), Some(password)) => Some(InitialShare {
                    folder,
                    space_gb,
                    password,
                }),
                _ => None,
            };

            server::run(config, initial).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Path => run_config_path(),
            ConfigCommands::Show => run_config_show(),
            ConfigCommands::Defaults => run_config_defaults(),
        },
    }
}
