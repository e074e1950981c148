use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobscrape", about = "Template-driven job listing scraper")]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    /// Delay between page fetches, in milliseconds
    #[arg(long, env = "SCRAPE_RATE_LIMIT_MS", default_value = "1000")]
    pub rate_limit_ms: u64,

    /// Per-request timeout for third-party APIs, in seconds
    #[arg(long, env = "SCRAPE_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Log lines kept per user for polling clients
    #[arg(long, env = "SCRAPE_LOG_BUFFER", default_value = "500")]
    pub log_buffer: usize,

    /// JSON file with extra or replacement site definitions
    #[arg(long, env = "SITES_FILE")]
    pub sites_file: Option<PathBuf>,

    /// Page limit when a scrape request does not name one
    #[arg(long, env = "SCRAPE_MAX_PAGES", default_value = "10")]
    pub default_max_pages: u32,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the web server (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Run one scrape from a template file and exit
    Scrape {
        /// Listing page the template was captured from
        #[arg(long)]
        target_url: String,

        /// Site id stamped on saved jobs
        #[arg(long)]
        website_type: String,

        /// Request template JSON; missing fields are filled from the site catalog
        #[arg(long)]
        template: Option<PathBuf>,

        #[arg(long)]
        max_pages: Option<u32>,

        /// Target store; defaults to the main database
        #[arg(long, env = "STORE_DATABASE_URL")]
        store_url: Option<String>,

        /// User id the run is recorded under
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Create an API token for a user and print it
    IssueToken {
        #[arg(long)]
        user: String,

        #[arg(long, default_value = "default")]
        name: String,

        /// Mark the user as approved
        #[arg(long)]
        approved: bool,

        /// Days until the token expires
        #[arg(long)]
        expires_in_days: Option<i64>,
    },
}

impl Config {
    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}
