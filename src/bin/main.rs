use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use mt_gatekeeper::auth::token::DEFAULT_LEEWAY_SECONDS;
use mt_gatekeeper::{
    AuthConfig, BackendConnector, BackendKind, DataConfig, ResourceRegistry, build_state,
};

#[derive(Parser)]
#[command(name = "mt-gatekeeper")]
#[command(about = "Authenticated service front with named backend connections")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API behind the authentication layer
    Serve {
        /// Bind address, e.g. 0.0.0.0:8000
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
        /// Operations that bypass authentication (comma separated, `*` suffix for prefixes)
        #[arg(long, env = "GATEKEEPER_EXEMPT_OPERATIONS", value_delimiter = ',')]
        exempt: Vec<String>,
        /// HS256 secret used to verify access tokens
        #[arg(long, env = "GATEKEEPER_JWT_SECRET", hide_env_values = true)]
        jwt_secret: String,
        /// Expected token issuer
        #[arg(long, env = "GATEKEEPER_JWT_ISSUER")]
        jwt_issuer: Option<String>,
        /// Clock skew tolerated when checking token expiry, in seconds
        #[arg(long, env = "GATEKEEPER_JWT_LEEWAY", default_value_t = DEFAULT_LEEWAY_SECONDS)]
        jwt_leeway: u64,
    },
    /// Connect every configured backend and report which ones came up
    CheckBackends,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mt_gatekeeper=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let data = DataConfig::from_env().expanded();

    match cli.command {
        Commands::Serve {
            bind,
            exempt,
            jwt_secret,
            jwt_issuer,
            jwt_leeway,
        } => {
            let auth = AuthConfig {
                jwt_issuer,
                leeway_seconds: jwt_leeway,
                ..AuthConfig::with_secret(jwt_secret)
            }
            .exempting(exempt);

            if auth.exempt_operations.is_empty() {
                info!("Authentication required for every operation");
            } else {
                info!("Operations exempt from authentication: {:?}", auth.exempt_operations);
            }

            let state = build_state(&auth, &data).await?;
            if state.registry.is_empty() {
                warn!("No backend connections available");
            }

            let app = mt_gatekeeper::api::create_router(state);
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Listening on http://{}", bind);

            axum::serve(listener, app).await?;
        }
        Commands::CheckBackends => {
            let registry: ResourceRegistry =
                ResourceRegistry::initialize(&data, &BackendConnector).await;

            for kind in [BackendKind::Database, BackendKind::Cache] {
                let names = registry.names(kind);
                if names.is_empty() {
                    println!("{:<6} (none)", kind);
                }
                for name in names {
                    println!("{:<6} {}", kind, name);
                }
            }
            println!("{} connection(s) up", registry.len());
        }
    }

    Ok(())
}
