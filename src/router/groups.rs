//! Router group management
//!
//! Named routing profiles overlaying the base route table. The active
//! group can be switched at runtime; the merged view it produces is what
//! the decision engine consults.

use indexmap::IndexMap;

use crate::config::{ConfigDocument, RouteTable, RouterGroup};
use crate::error::{AppError, AppResult};

/// Group id preferred when the config does not pick one itself.
const DEFAULT_GROUP_ID: &str = "router1";

/// Holds the group set and the currently active group id
#[derive(Debug, Clone, Default)]
pub struct RouterGroupManager {
    base: RouteTable,
    groups: IndexMap<String, RouterGroup>,
    active: Option<String>,
}

impl RouterGroupManager {
    /// Build from a config document. The active group is taken from
    /// `Router.activeGroup` when it names a defined group, then
    /// `router1`, then the first defined group.
    pub fn from_config(config: &ConfigDocument) -> Self {
        Self::with_preferred_group(config, None)
    }

    /// Like `from_config`, but prefers `preferred` (a previously active
    /// group id) when the config itself does not pick one. Used so a
    /// runtime switch survives config updates that are silent on groups.
    pub fn with_preferred_group(config: &ConfigDocument, preferred: Option<&str>) -> Self {
        let groups = config.router_groups.clone().unwrap_or_default();

        let active = if groups.is_empty() {
            None
        } else {
            config
                .router
                .active_group
                .as_deref()
                .filter(|id| groups.contains_key(*id))
                .or_else(|| preferred.filter(|id| groups.contains_key(*id)))
                .or_else(|| {
                    if groups.contains_key(DEFAULT_GROUP_ID) {
                        Some(DEFAULT_GROUP_ID)
                    } else {
                        None
                    }
                })
                .map(str::to_string)
                .or_else(|| groups.keys().next().cloned())
        };

        Self {
            base: config.router.clone(),
            groups,
            active,
        }
    }

    pub fn groups(&self) -> &IndexMap<String, RouterGroup> {
        &self.groups
    }

    pub fn get(&self, id: &str) -> Option<&RouterGroup> {
        self.groups.get(id)
    }

    pub fn active_group_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Switch the active group. Unknown ids are refused and leave the
    /// current selection in place.
    pub fn switch_to(&mut self, id: &str) -> AppResult<()> {
        if !self.groups.contains_key(id) {
            return Err(AppError::Group(id.to_string()));
        }
        let previous = self.active.replace(id.to_string());
        tracing::info!(from = ?previous, to = %id, "Router group switched");
        Ok(())
    }

    /// The routing table requests are resolved against: the base table
    /// overlaid by the active group's fields. Without groups this is
    /// exactly the base table (minus the group marker).
    pub fn merged_view(&self) -> RouteTable {
        match self.active.as_deref().and_then(|id| self.groups.get(id)) {
            Some(group) => self.base.overlay(&group.routes),
            None => {
                let mut view = self.base.clone();
                view.active_group = None;
                view
            }
        }
    }
}
