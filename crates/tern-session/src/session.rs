//! A single browser session: a page controller plus its element registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::page::PageController;
use crate::registry::ElementRegistry;

/// Everything tracked per browser session. All facts about a session are
/// tagged with `id` as their first argument by convention used throughout
/// the reasoning engine's rules.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub(crate) page: Arc<dyn PageController>,
    pub registry: ElementRegistry,
}

impl Session {
    pub(crate) fn new(id: String, page: Arc<dyn PageController>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            page,
            registry: ElementRegistry::new(),
        }
    }

    pub fn page(&self) -> &Arc<dyn PageController> {
        &self.page
    }
}
