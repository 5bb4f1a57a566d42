//! Cloud provider session scoped to one invocation.
//!
//! The AWS SDK is asynchronous while the rest of the tool is a plain
//! sequential CLI, so the session owns a current-thread `tokio` runtime and
//! blocks on each SDK future. A session is built once in `main` and lent to
//! the components that need it.

use crate::error::{LamblayerError, Result};
use crate::region::validate_region;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use log::debug;
use std::future::Future;
use tokio::runtime::Runtime;

/// Options selecting credentials and region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Named profile from the shared credentials/config files.
    pub profile: Option<String>,
    /// Explicit region; the default provider chain is used when absent.
    pub region: Option<String>,
}

/// Loaded SDK configuration plus the runtime that drives it.
pub struct CloudSession {
    runtime: Runtime,
    config: SdkConfig,
}

impl std::fmt::Debug for CloudSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSession")
            .field("region", &self.region())
            .finish_non_exhaustive()
    }
}

impl CloudSession {
    /// Load SDK configuration for `options` and validate the region.
    ///
    /// An explicit region is checked before any configuration is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`LamblayerError::InvalidRegion`] when the explicit or resolved
    /// region is not a Lambda region (or none can be resolved), and
    /// [`LamblayerError::Session`] when the runtime cannot be started.
    pub fn connect(options: &SessionOptions) -> Result<Self> {
        if let Some(region) = options.region.as_deref() {
            validate_region(region)?;
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LamblayerError::Session {
                reason: format!("failed to start async runtime: {e}"),
            })?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = options.profile.as_deref() {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = options.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let config = runtime.block_on(loader.load());

        let resolved = config
            .region()
            .map(ToString::to_string)
            .ok_or_else(|| LamblayerError::InvalidRegion {
                region: "<unset>".to_owned(),
            })?;
        validate_region(&resolved)?;
        debug!("cloud session ready in {resolved}");

        Ok(Self { runtime, config })
    }

    /// The effective region.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.config.region().map(Region::as_ref)
    }

    /// Shared SDK configuration for building service clients.
    #[must_use]
    pub const fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Drive an SDK future to completion on the session runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
