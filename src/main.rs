//! `devrel`: run the API server and administer tenants from the shell.

use anyhow::Context;
use clap::{Parser, Subcommand};
use devrel_core::DevRelConfig;
use devrel_gateway::AppState;
use devrel_platform::tokens::{NewApiToken, TokenScope};
use devrel_platform::PlatformDb;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "devrel", author, version, about = "Developer relationship management server")]
struct Cli {
    /// Config file (defaults to $DEVREL_CONFIG, then ~/.devrel/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create a tenant with its owner account and default activity types.
    Init {
        #[arg(long)]
        name: String,
        /// URL-safe tenant key; derived from the name when omitted.
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        email: String,
        #[arg(long, env = "DEVREL_OWNER_PASSWORD")]
        password: String,
    },
    /// Mint an API token and print it once.
    CreateToken {
        /// Tenant slug.
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        name: String,
        /// Comma-separated: read, write, ingest.
        #[arg(long, value_delimiter = ',', default_value = "read")]
        scopes: Vec<TokenScope>,
        /// RFC 3339 expiry.
        #[arg(long)]
        expires_at: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DevRelConfig> {
    let mut config = match path {
        Some(p) => DevRelConfig::load_from(p).with_context(|| format!("reading {}", p.display()))?,
        None => DevRelConfig::load()?,
    };
    if path.is_some() {
        config.apply_env(|key| std::env::var(key).ok())?;
    }
    Ok(config)
}

fn init_tracing(config: &DevRelConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if config.log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
}

fn open_db(config: &DevRelConfig) -> anyhow::Result<PlatformDb> {
    let path = Path::new(&config.database.path);
    if config.database.path == ":memory:" {
        tracing::warn!("Using an in-memory database; data is lost on exit");
        return Ok(PlatformDb::open_in_memory()?);
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    Ok(PlatformDb::open(path)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            let db = open_db(&config)?;
            tracing::info!("📂 Database: {}", config.database.path);
            devrel_gateway::start(AppState::new(db, config)).await?;
        }
        Command::Init {
            name,
            slug,
            email,
            password,
        } => {
            let db = open_db(&config)?;
            let slug = slug.unwrap_or_else(|| devrel_platform::db::slugify(&name));
            let (tenant, owner) = db.bootstrap_tenant(&name, &slug, &email, &password)?;
            println!("Created tenant '{}' ({}) with owner {}", tenant.name, tenant.slug, owner.email);
        }
        Command::CreateToken {
            tenant,
            name,
            scopes,
            expires_at,
        } => {
            let db = open_db(&config)?;
            let tenant = db.get_tenant_by_slug(&tenant)?;
            let input = NewApiToken {
                name,
                scopes,
                expires_at,
            };
            let created = db.create_api_token(&tenant.id, None, &input)?;
            println!("{}", created.token);
            eprintln!("Token {} for '{}'. Store it now; it is not shown again.", created.record.id, tenant.slug);
        }
    }
    Ok(())
}
