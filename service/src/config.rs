use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default base URL of the generation API.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model used for generation calls.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Default base URL of the remote drive that records are mirrored to.
pub const DEFAULT_DRIVE_BASE_URL: &str = "https://www.googleapis.com";

/// Default URL probed to decide whether the host is online.
pub const DEFAULT_CONNECTIVITY_PROBE_URL: &str = "https://www.googleapis.com/generate_204";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Directory holding the persisted credential, record and settings collections.
    #[arg(short, long, env, default_value = "./data")]
    data_dir: PathBuf,

    /// Number of consecutive failures after which a credential is no longer selected.
    #[arg(long, env, default_value_t = 3)]
    pub credential_failure_threshold: u32,

    /// Estimated cost in USD per one million tokens, used for usage metering.
    #[arg(long, env, default_value_t = 0.10)]
    pub cost_per_million_tokens: f64,

    /// How a credential is picked among the healthy ones.
    #[arg(
        long,
        env,
        default_value = "first-healthy",
        value_parser = clap::builder::PossibleValuesParser::new([
            "first-healthy", "round-robin", "least-recently-used"
        ]),
    )]
    pub credential_selection: String,

    /// 32-byte key as 64 hex characters. When set, credential secrets are encrypted at rest.
    #[arg(long, env)]
    credential_encryption_key: Option<String>,

    /// How many distinct credentials a single generation call may try before giving up.
    #[arg(long, env, default_value_t = 1)]
    pub max_credential_attempts: u32,

    /// Fallback credential used when no stored credential is healthy.
    #[arg(long, env)]
    gemini_api_key: Option<String>,

    /// The base URL of the generation API.
    /// Override in tests to point at a mock server.
    #[arg(long, env, default_value = DEFAULT_GEMINI_BASE_URL)]
    gemini_base_url: String,

    /// The model used for generation calls.
    #[arg(long, env, default_value = DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    /// The base URL of the drive API that records are uploaded to.
    #[arg(long, env, default_value = DEFAULT_DRIVE_BASE_URL)]
    drive_base_url: String,

    /// Bearer token used for drive uploads.
    #[arg(long, env)]
    drive_access_token: Option<String>,

    /// Parent folder of uploaded records.
    #[arg(long, env, default_value = "root")]
    drive_folder_id: String,

    /// Upper bound in seconds for a single record upload. Must be at least 1.
    #[arg(long, env, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub sync_timeout_secs: u64,

    /// URL probed to derive the online/offline signal.
    #[arg(long, env, default_value = DEFAULT_CONNECTIVITY_PROBE_URL)]
    connectivity_probe_url: String,

    /// Seconds between two connectivity probes. Must be at least 1.
    #[arg(long, env, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    pub connectivity_probe_interval_secs: u64,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn set_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    /// Returns the hex encoded at-rest encryption key, if configured.
    pub fn credential_encryption_key(&self) -> Option<String> {
        self.credential_encryption_key.clone()
    }

    /// Returns the fallback generation credential, if configured.
    pub fn gemini_api_key(&self) -> Option<String> {
        self.gemini_api_key.clone()
    }

    pub fn gemini_base_url(&self) -> &str {
        &self.gemini_base_url
    }

    pub fn gemini_model(&self) -> &str {
        &self.gemini_model
    }

    pub fn drive_base_url(&self) -> &str {
        &self.drive_base_url
    }

    /// Returns the drive bearer token, if configured.
    pub fn drive_access_token(&self) -> Option<String> {
        self.drive_access_token.clone()
    }

    pub fn drive_folder_id(&self) -> &str {
        &self.drive_folder_id
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn connectivity_probe_url(&self) -> &str {
        &self.connectivity_probe_url
    }

    pub fn connectivity_probe_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_probe_interval_secs)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}
