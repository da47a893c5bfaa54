use std::{
    collections::HashMap,
    error::Error,
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DOTENV_PATH: &str = ".env";
const DEFAULT_METRICS_PATH: &str = "metrics.csv";
const DEFAULT_PASSWORD: &str = "mypassword";

const SERVER_URI: &str = "SERVER_URI";
/// Accepted in place of `SERVER_URI`.
const SERVER_ADDR: &str = "SERVER_ADDR";

/// The participant's identity within a federated session.
///
/// An empty `client_id` means this participant hosts the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    pub number_of_clients: usize,
    pub client_id: String,
    #[serde(rename = "client_password")]
    pub password: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            number_of_clients: 1,
            client_id: String::new(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl ClientIdentity {
    pub fn is_host(&self) -> bool {
        self.client_id.is_empty()
    }
}

/// Failures while reading configuration.
#[derive(Debug)]
pub enum ConfigErr {
    Io { path: PathBuf, source: io::Error },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    Dotenv {
        path: PathBuf,
        source: dotenvy::Error,
    },
    MissingVar(&'static str),
    InvalidVar { key: &'static str, value: String },
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot access '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "invalid JSON in '{}': {source}", path.display())
            }
            Self::Dotenv { path, source } => {
                write!(f, "invalid env file '{}': {source}", path.display())
            }
            Self::MissingVar(key) => write!(f, "{key} not found in the environment or .env file"),
            Self::InvalidVar { key, value } => write!(f, "invalid value for {key}: {value:?}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Dotenv { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Where the participant's identity lives between runs.
pub trait IdentityStore {
    fn load_identity(&self) -> Result<ClientIdentity, ConfigErr>;

    /// Stores the identity the server assigned to a hosting participant.
    fn persist_assigned_client_id(&mut self, id: &str) -> Result<(), ConfigErr>;
}

/// An `IdentityStore` backed by a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonIdentityStore {
    path: PathBuf,
}

impl JsonIdentityStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Opens the store at `path`, writing a default identity first if the file doesn't exist.
    pub fn open_or_init<P: Into<PathBuf>>(path: P) -> Result<Self, ConfigErr> {
        let store = Self::new(path);

        if !store.path.exists() {
            store.write(&ClientIdentity::default())?;
        }

        Ok(store)
    }

    fn write(&self, identity: &ClientIdentity) -> Result<(), ConfigErr> {
        let json = serde_json::to_string_pretty(identity).map_err(|source| ConfigErr::Json {
            path: self.path.clone(),
            source,
        })?;

        fs::write(&self.path, json).map_err(|source| ConfigErr::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl IdentityStore for JsonIdentityStore {
    fn load_identity(&self) -> Result<ClientIdentity, ConfigErr> {
        let content = fs::read_to_string(&self.path).map_err(|source| ConfigErr::Io {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigErr::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn persist_assigned_client_id(&mut self, id: &str) -> Result<(), ConfigErr> {
        let mut identity = self.load_identity()?;
        identity.client_id = id.to_string();
        self.write(&identity)
    }
}

/// An identity kept only in memory, for tests and embedding.
impl IdentityStore for ClientIdentity {
    fn load_identity(&self) -> Result<ClientIdentity, ConfigErr> {
        Ok(self.clone())
    }

    fn persist_assigned_client_id(&mut self, id: &str) -> Result<(), ConfigErr> {
        self.client_id = id.to_string();
        Ok(())
    }
}

/// How parameters travel to the server each round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransferMode {
    /// One message per one-dimensional unit, each acknowledged before the next.
    #[default]
    Chunked,
    /// Every tensor in a single message.
    Whole,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunked => f.write_str("chunked"),
            Self::Whole => f.write_str("whole"),
        }
    }
}

impl FromStr for TransferMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chunked" => Ok(Self::Chunked),
            "whole" => Ok(Self::Whole),
            _ => Err(()),
        }
    }
}

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantConfig {
    /// The server's WebSocket address, e.g. `ws://localhost:8765`.
    pub server_uri: String,
    pub config_path: PathBuf,
    pub metrics_path: PathBuf,
    pub transfer_mode: TransferMode,
    pub max_frame_len: usize,
    pub max_rounds: Option<usize>,
    pub seed: Option<u64>,
}

impl ParticipantConfig {
    /// Reads the settings from the process environment and the `.env` file in the working
    /// directory, if there is one.
    pub fn from_env() -> Result<Self, ConfigErr> {
        Self::from_env_file(DOTENV_PATH)
    }

    /// Reads the settings from the process environment, falling back to the `KEY=value` lines
    /// of the file at `path`. A missing file counts as an empty one.
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigErr> {
        let path = path.as_ref();
        let dotenv_err = |source| ConfigErr::Dotenv {
            path: path.to_path_buf(),
            source,
        };

        let file: HashMap<String, String> = match dotenvy::from_path_iter(path) {
            Ok(lines) => lines.collect::<Result<_, _>>().map_err(dotenv_err)?,
            Err(e) if e.not_found() => HashMap::new(),
            Err(e) => return Err(dotenv_err(e)),
        };

        Self::from_vars(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Reads the settings through `var`, which maps a variable name to its value.
    ///
    /// # Arguments
    /// * `var` - The variable lookup.
    ///
    /// # Returns
    /// The settings, or an error if a required variable is missing or a value doesn't parse.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigErr>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_uri = var(SERVER_URI)
            .or_else(|| var(SERVER_ADDR))
            .ok_or(ConfigErr::MissingVar(SERVER_URI))?;

        Ok(Self {
            server_uri,
            config_path: var("CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            metrics_path: var("METRICS_PATH")
                .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string())
                .into(),
            transfer_mode: parse_var(&var, "TRANSFER_MODE")?.unwrap_or_default(),
            max_frame_len: parse_var(&var, "MAX_FRAME_LEN")?
                .unwrap_or(comms::DEFAULT_MAX_FRAME_LEN),
            max_rounds: parse_var(&var, "MAX_ROUNDS")?,
            seed: parse_var(&var, "SEED")?,
        })
    }
}

fn parse_var<F, T>(var: &F, key: &'static str) -> Result<Option<T>, ConfigErr>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    var(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigErr::InvalidVar { key, value })
        })
        .transpose()
}
