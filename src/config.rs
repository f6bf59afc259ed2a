use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::actor_system::dispatcher::available_parallelism;

/// Which dispatcher the actor system runs workers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherKind {
    Serial,
    Pooled,
}

impl FromStr for DispatcherKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(DispatcherKind::Serial),
            "pooled" => Ok(DispatcherKind::Pooled),
            other => Err(format!("unknown dispatcher '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub dispatcher: DispatcherKind,
    pub pool_size: usize,
    pub idle_wait_ms: u64,
    pub promise_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherKind::Pooled,
            pool_size: available_parallelism(),
            idle_wait_ms: 50,
            promise_threads: 64,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dispatcher) = lookup("COURIER_DISPATCHER") {
            match dispatcher.parse() {
                Ok(kind) => config.dispatcher = kind,
                Err(error) => log::warn!("Ignoring COURIER_DISPATCHER: {error}"),
            }
        }

        if let Some(size) = lookup("COURIER_POOL_SIZE") {
            if let Ok(s) = size.parse::<usize>() {
                if s > 0 {
                    config.pool_size = s;
                }
            }
        }

        if let Some(wait) = lookup("COURIER_IDLE_WAIT_MS") {
            if let Ok(w) = wait.parse::<u64>() {
                if w > 0 {
                    config.idle_wait_ms = w;
                }
            }
        }

        if let Some(threads) = lookup("COURIER_PROMISE_THREADS") {
            if let Ok(t) = threads.parse::<usize>() {
                if t > 0 {
                    config.promise_threads = t;
                }
            }
        }

        config
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("COURIER_DISPATCHER", "Serial"),
            ("COURIER_POOL_SIZE", "3"),
            ("COURIER_IDLE_WAIT_MS", "5"),
            ("COURIER_PROMISE_THREADS", "8"),
        ]));
        assert_eq!(config.dispatcher, DispatcherKind::Serial);
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.idle_wait(), Duration::from_millis(5));
        assert_eq!(config.promise_threads, 8);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let defaults = RuntimeConfig::default();
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("COURIER_DISPATCHER", "threaded"),
            ("COURIER_POOL_SIZE", "0"),
            ("COURIER_IDLE_WAIT_MS", "soon"),
        ]));
        assert_eq!(config.dispatcher, defaults.dispatcher);
        assert_eq!(config.pool_size, defaults.pool_size);
        assert_eq!(config.idle_wait_ms, defaults.idle_wait_ms);
    }

    #[test]
    fn zero_idle_wait_keeps_default() {
        let config = RuntimeConfig::from_lookup(lookup(&[("COURIER_IDLE_WAIT_MS", "0")]));
        assert_eq!(config.idle_wait_ms, RuntimeConfig::default().idle_wait_ms);
    }
}
