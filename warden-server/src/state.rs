//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use warden_core::{ChallengeStore, EntropySource, OsEntropy};

use crate::config::Config;
use crate::db::Directory;
use crate::identity::IdentityClient;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Users, organizations, providers and features
    pub directory: Arc<Directory>,
    /// Outstanding second-factor challenges (always in memory)
    pub challenges: Arc<ChallengeStore>,
    /// Source of challenge bytes and handshake state tokens
    pub entropy: Arc<dyn EntropySource>,
    /// OAuth2 code exchange client
    pub identity: Arc<IdentityClient>,
}

impl AppState {
    /// State with OS entropy, for production use.
    pub fn new(config: Config, directory: Directory) -> Self {
        Self::with_entropy(config, directory, Arc::new(OsEntropy))
    }

    /// State with a caller-supplied entropy source.
    pub fn with_entropy(
        config: Config,
        directory: Directory,
        entropy: Arc<dyn EntropySource>,
    ) -> Self {
        tracing::info!(source = %entropy.source_id(), "Entropy source configured");
        Self {
            config: Arc::new(config),
            directory: Arc::new(directory),
            challenges: Arc::new(ChallengeStore::new()),
            entropy,
            identity: Arc::new(IdentityClient::new()),
        }
    }
}
