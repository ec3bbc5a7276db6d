//! Process startup for the cipher layer.
//!
//! [`Runtime::start`] runs once, before the first connection is accepted.
//! Everything it builds is immutable or internally locked afterwards and
//! can be shared with every connection handler.

use crate::config::{CryptoConfig, Role};
use crate::crypto::Crypto;
use crate::replay::ReplayFilter;
use crate::{CryptoError, entropy, random};
use std::sync::Arc;

/// Started cipher layer: the method handle and, on a server, the replay
/// filter.
#[derive(Debug)]
pub struct Runtime {
    crypto: Arc<Crypto>,
    replay: Option<Arc<ReplayFilter>>,
}

impl Runtime {
    /// Check the environment and build the handles described by `config`.
    ///
    /// Startup order:
    /// 1. Warn if the kernel reports a starved entropy pool
    /// 2. Probe the OS generator
    /// 3. Build the replay filter for [`Role::Remote`]
    /// 4. Build the [`Crypto`] handle
    ///
    /// # Errors
    ///
    /// Fatal errors ([`CryptoError::is_fatal`]) come from steps 2 and 3;
    /// configuration errors come from step 4.
    pub fn start(config: &CryptoConfig) -> Result<Self, CryptoError> {
        entropy::check_startup_entropy();

        random::probe().inspect_err(|e| {
            tracing::error!(error = %e, "random number generator unusable");
        })?;

        let replay = match config.role {
            Role::Remote => {
                let filter = ReplayFilter::from_config(&config.replay).inspect_err(|e| {
                    tracing::error!(error = %e, "cannot build replay filter");
                })?;
                Some(Arc::new(filter))
            }
            Role::Local => None,
        };

        let crypto = Crypto::from_config(config)?;
        tracing::info!(
            method = %crypto.method(),
            role = ?config.role,
            "cipher layer started"
        );

        Ok(Self {
            crypto: Arc::new(crypto),
            replay,
        })
    }

    /// The configured method handle.
    #[must_use]
    pub fn crypto(&self) -> &Arc<Crypto> {
        &self.crypto
    }

    /// The replay filter, present for [`Role::Remote`].
    #[must_use]
    pub fn replay_filter(&self) -> Option<&Arc<ReplayFilter>> {
        self.replay.as_ref()
    }

    /// Close the replay filter and release its memory.
    ///
    /// Handlers still holding the filter see it as empty afterwards.
    pub fn shutdown(&self) {
        if let Some(filter) = &self.replay {
            filter.close();
        }
        tracing::info!("cipher layer stopped");
    }
}
