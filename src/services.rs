//! Per-process collaborators: settings plus network clients created on first use.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::Settings;
use crate::sds::{SdsClient, SdsError};

/// Built once at startup and shared read-only afterwards.
///
/// Clients are initialised lazily and never replaced, so concurrent readers
/// need no locking beyond the one-time cell.
#[derive(Debug)]
pub struct Services {
    settings: Arc<Settings>,
    sds: OnceCell<SdsClient>,
}

impl Services {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            sds: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// The science data system session, created on first call.
    pub fn sds(&self) -> Result<&SdsClient, SdsError> {
        self.sds
            .get_or_try_init(|| SdsClient::from_settings(&self.settings))
    }
}
