//! Service configuration: defaults, optional JSON file, `AXPATH_*` environment overrides.

use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
    pub snapshot: SnapshotConfig,
    pub interaction: InteractionConfig,
    pub menu: MenuConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Overall budget for resolving one path
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub max_entries: usize,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 5_000,
            max_entries: 100,
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Depth used when a caller does not pass one
    pub default_depth: usize,
    /// Hard ceiling applied to every build
    pub depth_limit: usize,
    pub include_values: bool,
    pub include_actions: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_depth: 10,
            depth_limit: 50,
            include_values: true,
            include_actions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub double_click_interval_ms: u64,
    pub key_interval_ms: u64,
    pub scroll_step_delay_ms: u64,
    pub drag_steps: u32,
    pub drag_step_delay_ms: u64,
    pub pointer_settle_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            double_click_interval_ms: 50,
            key_interval_ms: 20,
            scroll_step_delay_ms: 50,
            drag_steps: 10,
            drag_step_delay_ms: 10,
            pointer_settle_ms: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuConfig {
    /// Wait after pressing a menu before re-reading the tree
    pub settle_ms: u64,
    /// Give up waiting for an opened menu after this long
    pub open_timeout_ms: u64,
    pub hierarchy_depth: usize,
    pub hierarchy_ttl_ms: u64,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            settle_ms: 150,
            open_timeout_ms: 2_000,
            hierarchy_depth: 3,
            hierarchy_ttl_ms: 300_000,
        }
    }
}

impl MenuConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn hierarchy_ttl(&self) -> Duration {
        Duration::from_millis(self.hierarchy_ttl_ms)
    }
}

const ENV_PREFIX: &str = "AXPATH_";

impl ServiceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::InvalidArgument(format!(
                "Cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AutomationError::InvalidArgument(format!(
                "Invalid config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Defaults, then `file` if given, then process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, AutomationError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars());
        Ok(config)
    }

    /// Apply `AXPATH_*` overrides. Unknown keys and unparsable values are ignored with a
    /// warning.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let applied = match name {
                "RESOLVE_TIMEOUT_MS" => parse_into(&value, &mut self.resolver.timeout_ms),
                "CACHE_TTL_MS" => parse_into(&value, &mut self.cache.ttl_ms),
                "CACHE_MAX_ENTRIES" => parse_into(&value, &mut self.cache.max_entries),
                "CACHE_ENABLED" => parse_into(&value, &mut self.cache.enabled),
                "SNAPSHOT_DEPTH" => parse_into(&value, &mut self.snapshot.default_depth),
                "SNAPSHOT_DEPTH_LIMIT" => parse_into(&value, &mut self.snapshot.depth_limit),
                "KEY_INTERVAL_MS" => parse_into(&value, &mut self.interaction.key_interval_ms),
                "DOUBLE_CLICK_INTERVAL_MS" => {
                    parse_into(&value, &mut self.interaction.double_click_interval_ms)
                }
                "SCROLL_STEP_DELAY_MS" => {
                    parse_into(&value, &mut self.interaction.scroll_step_delay_ms)
                }
                "MENU_SETTLE_MS" => parse_into(&value, &mut self.menu.settle_ms),
                "MENU_TIMEOUT_MS" => parse_into(&value, &mut self.menu.open_timeout_ms),
                "MENU_DEPTH" => parse_into(&value, &mut self.menu.hierarchy_depth),
                "MENU_CACHE_TTL_MS" => parse_into(&value, &mut self.menu.hierarchy_ttl_ms),
                "LOG" => true,
                _ => {
                    debug!("Ignoring unknown config variable {key}");
                    continue;
                }
            };
            if !applied {
                warn!("Ignoring {key}={value}: not a valid value");
            }
        }
    }
}

fn parse_into<T: std::str::FromStr>(raw: &str, slot: &mut T) -> bool {
    match raw.trim().parse::<T>() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}
