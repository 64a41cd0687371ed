use chrono::Datelike;
use clap::{Args, Parser, Subcommand};
use orderhub::{
    AppState, Config, CreateUserRequest, Database, DatabaseError, ListingService, LookupKind,
    date_window,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::seed;

#[derive(Debug)]
pub enum Error {
    Database(DatabaseError),
    Listing(orderhub::ListingError),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Database(err) => write!(f, "{}", err),
            Error::Listing(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Listing(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        Error::Database(err)
    }
}

impl From<orderhub::ListingError> for Error {
    fn from(err: orderhub::ListingError) -> Self {
        Error::Listing(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Registry of administrative orders
///
/// Every command reads its settings from the environment (`DATABASE_URL`,
/// `BIND_ADDRESS`, `PAGE_SIZE`, ...), flags override them.
#[derive(Debug, Parser)]
#[command(name = "orderdesk", version = "0.1.0")]
#[command(about = "Register, browse and search administrative orders")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// SQLite database, overrides DATABASE_URL
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub async fn handle() -> Result<(), Error> {
        let cli = Self::parse();
        init_tracing(cli.json);

        let mut config = Config::from_env();
        if let Some(database) = cli.database {
            config.database_url = database;
        }

        match cli.command {
            Commands::Serve(args) => {
                if let Some(bind) = args.bind {
                    config.bind_address = bind;
                }
                serve(config).await?;
            }

            Commands::AddUser(args) => {
                let db = Database::new(&config.database_url).await?;
                add_user(&db, args).await?;
            }

            Commands::Seed(args) => {
                let db = Database::new(&config.database_url).await?;
                let created = seed::seed(&db, &args.author, args.orders).await?;
                println!("Created {} orders for {}", created, args.author);
            }

            Commands::Stats(args) => {
                let db = Database::new(&config.database_url).await?;
                let year = args.year.unwrap_or_else(|| date_window::today().year());
                let listing = ListingService::new(db, config.listing);

                let months = listing.monthly_counts(year, None).await?;
                for month in &months {
                    println!("{}\t{}", month.window, month.count);
                }
                println!("Total\t{}", months.iter().map(|m| m.count).sum::<i64>());
            }
        };

        Ok(())
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web UI
    Serve(ServeArgs),

    /// Create a user, or update the one with this username
    AddUser(AddUserArgs),

    /// Fill the lookup tables and generate random orders
    Seed(SeedArgs),

    /// Print the number of orders per month
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Address to listen on, overrides BIND_ADDRESS
    #[arg(short, long)]
    bind: Option<String>,
}

#[derive(Debug, Args)]
struct AddUserArgs {
    #[arg(short, long)]
    username: String,

    #[arg(short, long)]
    email: String,

    #[arg(long)]
    admin: bool,

    /// Created in the department lookup table when missing
    #[arg(short, long)]
    department: Option<String>,
}

#[derive(Debug, Args)]
struct SeedArgs {
    /// Number of random orders
    #[arg(short, long, default_value_t = 100)]
    orders: usize,

    /// Username the orders are filed under
    #[arg(short, long, default_value = "admin")]
    author: String,
}

#[derive(Debug, Args)]
struct StatsArgs {
    /// Defaults to the current year
    #[arg(short, long)]
    year: Option<i32>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .flatten_event(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn serve(config: Config) -> Result<(), Error> {
    info!(
        database = config.database_url.as_str(),
        bind_address = config.bind_address.as_str(),
        page_size = config.listing.page_size,
        link_window = config.listing.link_window,
        "Starting order registry"
    );

    let db = Database::new(&config.database_url).await?;
    let state = AppState::new(db, &config);
    let app = orderhub::app(state);

    info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(signal())
        .await?;

    Ok(())
}

async fn signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install CTRL+C signal handler");
        return std::future::pending().await;
    }
    info!("Shutdown signal received, terminating...");
}

async fn add_user(db: &Database, args: AddUserArgs) -> Result<(), Error> {
    if let Some(department) = args.department.as_deref() {
        db.ensure_lookup(LookupKind::Department, department).await?;
    }

    let req = CreateUserRequest {
        username: args.username,
        email: args.email,
        is_admin: args.admin,
        department: args.department,
    };

    match db.get_user_by_username(&req.username).await {
        Ok(existing) => {
            db.update_user(existing.id, &req).await?;
            info!(username = req.username.as_str(), admin = req.is_admin, "User updated");
        }
        Err(DatabaseError::NotFound(_)) => {
            let id = db.create_user(&req).await?;
            info!(user_id = id, username = req.username.as_str(), admin = req.is_admin, "User created");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
