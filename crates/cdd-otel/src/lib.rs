//! Console tracing plus an optional rolling file for contract call logs.
//!
//! `RUST_LOG` drives the console filter (default `info`). Setting `CDD_LOG_ROLL=1` also writes
//! events under the [`ACCESS_TARGET`] target to a rolling file in `CDD_LOG_DIR` (default
//! `logs`), rotated per `CDD_LOG_ROTATION` (`daily`, `hourly` or `minutely`).

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used for per-call access records.
pub const ACCESS_TARGET: &str = "cdd.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    Minutely,
}

impl Rotation {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

/// Rolling access log settings, when enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessLog {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

impl AccessLog {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if lookup("CDD_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        Some(Self {
            dir: lookup("CDD_LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            prefix: lookup("CDD_LOG_PREFIX").unwrap_or_else(|| "contract-access".to_string()),
            rotation: lookup("CDD_LOG_ROTATION")
                .map(|raw| Rotation::parse(&raw))
                .unwrap_or_default(),
        })
    }
}

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter, AccessLog::from_env());
}

fn install(filter: EnvFilter, access: Option<AccessLog>) {
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));
    let Some(access) = access else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&access.dir).is_err() {
        tracing::warn!(directory = %access.dir, "failed to create access log directory");
    }
    let writer = match access.rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(&access.dir, &access.prefix),
        Rotation::Minutely => tracing_appender::rolling::minutely(&access.dir, &access.prefix),
        Rotation::Daily => tracing_appender::rolling::daily(&access.dir, &access.prefix),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = ACCESS_GUARD.set(guard);
    let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(nb)
        .with_filter(targets);
    let _ = registry.with(access_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn access_log_is_off_unless_enabled() {
        assert_eq!(AccessLog::from_lookup(lookup(&[])), None);
        assert_eq!(AccessLog::from_lookup(lookup(&[("CDD_LOG_ROLL", "0")])), None);
    }

    #[test]
    fn access_log_reads_overrides() {
        let access = AccessLog::from_lookup(lookup(&[
            ("CDD_LOG_ROLL", "1"),
            ("CDD_LOG_DIR", "/tmp/cdd"),
            ("CDD_LOG_ROTATION", "Hourly"),
        ]))
        .unwrap();
        assert_eq!(access.dir, "/tmp/cdd");
        assert_eq!(access.prefix, "contract-access");
        assert_eq!(access.rotation, Rotation::Hourly);
    }

    #[test]
    fn unknown_rotation_falls_back_to_daily() {
        assert_eq!(Rotation::parse("weekly"), Rotation::Daily);
        assert_eq!(Rotation::parse("minutely"), Rotation::Minutely);
    }
}
