// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::OrderMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::targets::TRACING_TARGETS;
use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO);

/// Errors when applying a tracing configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TracingError {
    #[error("invalid syntax '{0}': expected name=level")]
    Syntax(String),
    #[error("invalid level '{0}'")]
    Level(String),
    #[error("unknown tracing target '{0}'")]
    UnknownTarget(String),
}

#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) custom: bool,
}

impl TargetCfg {
    /// The module path (or custom string) events are tagged with
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }
    /// The short name used to refer to this target in configurations
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

#[derive(Debug)]
pub(crate) struct TargetCfgDb {
    pub(crate) level: LevelFilter,
    pub(crate) targets: OrderMap<&'static str, TargetCfg>,
}

impl TargetCfgDb {
    fn new(level: LevelFilter) -> Self {
        let mut db = Self {
            level,
            targets: OrderMap::new(),
        };
        for target in TRACING_TARGETS {
            db.register(target.target, target.name, target.level, target.custom);
        }
        db
    }
    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        custom: bool,
    ) {
        let tconfig = TargetCfg {
            target,
            name,
            level,
            custom,
        };
        if let Some(exist) = self.targets.insert(target, tconfig) {
            warn!("Target {} has been multiply defined!", exist.target);
        }
    }
    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(self.level.to_string());
        for target in self.targets.values() {
            let directive = format!("{}={}", target.target, target.level);
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => error!("Bad tracing directive '{directive}': {e}"),
            }
        }
        filter
    }
    fn targets_named_mut(&mut self, name: &str) -> impl Iterator<Item = &mut TargetCfg> {
        self.targets
            .values_mut()
            .filter(move |target| target.name == name)
    }
    /// Render the current configuration in the syntax accepted by
    /// [`TracingControl::setup_from_string`].
    pub(crate) fn as_config_string(&self) -> String {
        let mut out = format!("default={}", self.level);
        for target in self.targets.values() {
            out += format!(",{}={}", target.name, target.level).as_str();
        }
        out
    }
}

impl Display for TargetCfgDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{:>40} │ {:>8} │ {:>6}", "TARGET", "LEVEL", "CUSTOM")?;
        for target in self.targets.values() {
            writeln!(
                f,
                "{:>40} │ {:>8} │ {:>6}",
                target.target, target.level, target.custom
            )?;
        }
        write!(f, "{:>40} │ {:>8} │", "(default)", self.level)
    }
}

/// Owner of the tracing subscriber and of the per-target levels
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetCfgDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetCfgDb::new(LevelFilter::INFO);
        let (filter, reload_filter) = reload::Layer::new(db.env_filter());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_level(true);

        // a subscriber may already exist (e.g. installed by a test harness)
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            eprintln!("Tracing subscriber already installed: {e}");
        }

        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TargetCfgDb> {
        // a poisoned db is still a consistent db: every mutation is a plain field store
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn reload(&self, filter: EnvFilter) {
        if let Err(e) = self.reload_filter.reload(filter) {
            error!("Failed to reload tracing filter: {e}");
        }
    }

    /// Make sure the tracing subscriber is installed
    pub fn init() {
        get_trace_ctl();
    }

    /// Set the level used for events of targets that were never declared
    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.lock();
        if db.level != level {
            db.level = level;
            info!("Set default log level to {level}");
            self.reload(db.env_filter());
        }
    }

    #[must_use]
    pub fn get_default_level(&self) -> LevelFilter {
        self.lock().level
    }

    /// Set the level of all declared targets
    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.lock();
        for target in db.targets.values_mut() {
            target.level = level;
        }
        self.reload(db.env_filter());
    }

    /// Set the level of the target(s) with the given short name.
    ///
    /// # Errors
    ///
    /// Fails if no declared target carries that name.
    pub fn set_target_level(&self, name: &str, level: LevelFilter) -> Result<(), TracingError> {
        let mut db = self.lock();
        let mut found = false;
        for target in db.targets_named_mut(name) {
            target.level = level;
            found = true;
        }
        if !found {
            return Err(TracingError::UnknownTarget(name.to_string()));
        }
        self.reload(db.env_filter());
        debug!("Changed log level for '{name}' to {level}");
        Ok(())
    }

    #[must_use]
    pub fn get_target(&self, name: &str) -> Option<TargetCfg> {
        self.lock()
            .targets
            .values()
            .find(|target| target.name == name)
            .cloned()
    }

    /// Parse a string made of comma-separated name=level items, where level is one of
    /// off, error, warn, info, debug, trace.
    fn parse_tracing_config(input: &str) -> Result<OrderMap<String, LevelFilter>, TracingError> {
        let mut result = OrderMap::new();
        for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let Some((name, level)) = item.split_once('=') else {
                return Err(TracingError::Syntax(item.to_string()));
            };
            let level = LevelFilter::from_str(level.trim())
                .map_err(|_| TracingError::Level(level.trim().to_string()))?;
            result.insert(name.trim().to_string(), level);
        }
        Ok(result)
    }

    /// Apply a configuration such as `default=warn,all=info,acl=debug`.
    ///
    /// `default` sets the default level, `all` sets every declared target; any other name
    /// overrides a single target, so `all` can be refined.
    ///
    /// # Errors
    ///
    /// Fails on bad syntax, bad levels or unknown targets. Items before the failing one are
    /// applied.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TracingError> {
        let config = Self::parse_tracing_config(input)?;
        if let Some(level) = config.get("default") {
            self.set_default_level(*level);
        }
        if let Some(level) = config.get("all") {
            self.set_level_all(*level);
        }
        for (name, level) in config
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "default" | "all"))
        {
            self.set_target_level(name, *level)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.lock().as_config_string()
    }

    /// Log the known targets and their levels
    pub fn dump(&self) {
        let db = self.lock();
        info!("{db}");
    }
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get a reference to the global [`TracingControl`], initializing it if needed
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}
