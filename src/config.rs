/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/config.rs
*
* Configuration for the controller. Two layers live here:
*
* - Process settings (`Settings`), parsed once at startup from command line
*   flags with environment variable fallbacks.
* - Dynamic configuration (`ConfigProvider`), a synchronous key/value lookup
*   with last-known-value semantics. The production provider,
*   `ConfigMapConfig`, follows a single ConfigMap with a watcher and swaps
*   its data in whenever the ConfigMap changes. Readers never block on the
*   API server; they see whatever was last observed. `ready` lets startup wait
*   for the first observation so the first reconciliations do not run against
*   an empty configuration.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::telemetry::LogFormat;
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Namespace holding the shared WorkloadTemplates.
pub const KEY_PUBLIC_NAMESPACE: &str = "publicNamespace";

// --- Process settings ---

#[derive(Parser, Debug, Clone)]
#[command(name = "dockyards-rbac", about = "Keeps bootstrap RBAC workloads in sync with dockyards clusters")]
pub struct Settings {
    /// Name of the ConfigMap holding the dockyards configuration.
    #[arg(long, env = "DOCKYARDS_CONFIG_MAP", default_value = "dockyards-system")]
    pub config_map: String,

    /// Namespace of the dockyards configuration ConfigMap.
    #[arg(long, env = "DOCKYARDS_NAMESPACE", default_value = "dockyards-system")]
    pub dockyards_namespace: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Upper bound for a single reconciliation, in seconds.
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// Delay before a failed reconciliation is retried, in seconds.
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 60)]
    pub error_requeue_secs: u64,

    /// Listen address of the Prometheus `/metrics` endpoint.
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_addr: SocketAddr,
}

impl Settings {
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

// --- Dynamic configuration ---

pub trait ConfigProvider: Send + Sync {
    /// Last known value for `key`, or `default` when there is none.
    fn value_or_default(&self, key: &str, default: &str) -> String;
}

/// Fixed configuration, for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct StaticConfig {
    values: BTreeMap<String, String>,
}

impl StaticConfig {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ConfigProvider for StaticConfig {
    fn value_or_default(&self, key: &str, default: &str) -> String {
        self.values.get(key).cloned().unwrap_or_else(|| default.to_string())
    }
}

/// Configuration backed by a watched ConfigMap.
#[derive(Clone)]
pub struct ConfigMapConfig {
    values: Arc<RwLock<BTreeMap<String, String>>>,
    ready: Arc<watch::Sender<bool>>,
}

impl Default for ConfigMapConfig {
    fn default() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            values: Arc::default(),
            ready: Arc::new(ready),
        }
    }
}

impl ConfigMapConfig {
    /// Starts following `namespace/name` in the background and returns the
    /// provider immediately. Until the first event arrives every lookup
    /// yields its default.
    pub fn start(client: Client, namespace: &str, name: &str) -> Self {
        let config = Self::default();
        let api: Api<ConfigMap> = Api::namespaced(client, namespace);
        let wc = watcher::Config::default().fields(&format!("metadata.name={}", name));

        let follower = config.clone();
        let target = format!("{}/{}", namespace, name);
        tokio::spawn(async move {
            info!(config_map = %target, "watching dynamic configuration");
            let mut events = watcher(api, wc).default_backoff().boxed();
            let mut relist = None;
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => follower.apply(event, &mut relist),
                    Err(e) => warn!(config_map = %target, error = %e, "configuration watch failed"),
                }
            }
        });

        config
    }

    /// Resolves once the ConfigMap (or its absence) has been observed.
    pub async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // `self` holds the sender, so the channel never closes under us.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    fn replace(&self, data: BTreeMap<String, String>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        *values = data;
        drop(values);
        self.ready.send_replace(true);
    }

    // A relist delivers Init, InitApply*, InitDone; the data is only swapped in
    // once the relist is complete so a vanished ConfigMap is noticed.
    fn apply(&self, event: watcher::Event<ConfigMap>, relist: &mut Option<BTreeMap<String, String>>) {
        match event {
            watcher::Event::Apply(cm) => self.replace(cm.data.unwrap_or_default()),
            watcher::Event::Delete(_) => self.replace(BTreeMap::new()),
            watcher::Event::Init => *relist = Some(BTreeMap::new()),
            watcher::Event::InitApply(cm) => *relist = Some(cm.data.unwrap_or_default()),
            watcher::Event::InitDone => {
                if let Some(data) = relist.take() {
                    self.replace(data);
                }
            }
        }
    }
}

impl ConfigProvider for ConfigMapConfig {
    fn value_or_default(&self, key: &str, default: &str) -> String {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned().unwrap_or_else(|| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use kube::api::ObjectMeta;

    fn config_map(data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("dockyards-system".to_string()),
                namespace: Some("dockyards-system".to_string()),
                ..Default::default()
            },
            data: Some(data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn static_config_falls_back_to_default() {
        let config = StaticConfig::new([(KEY_PUBLIC_NAMESPACE, "dockyards-public")]);
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "dockyards-public");
        assert_eq!(config.value_or_default("missing", "fallback"), "fallback");
    }

    #[test]
    fn config_map_updates_are_visible_to_readers() {
        let config = ConfigMapConfig::default();
        let mut relist = None;
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "");

        config.apply(watcher::Event::Apply(config_map(&[(KEY_PUBLIC_NAMESPACE, "pub")])), &mut relist);
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "pub");

        config.apply(watcher::Event::Apply(config_map(&[(KEY_PUBLIC_NAMESPACE, "pub2")])), &mut relist);
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "pub2");

        config.apply(watcher::Event::Delete(config_map(&[])), &mut relist);
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, "none"), "none");
    }

    #[test]
    fn relist_keeps_last_value_until_complete() {
        let config = ConfigMapConfig::default();
        let mut relist = None;
        config.apply(watcher::Event::Apply(config_map(&[(KEY_PUBLIC_NAMESPACE, "pub")])), &mut relist);

        config.apply(watcher::Event::Init, &mut relist);
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "pub");

        config.apply(watcher::Event::InitApply(config_map(&[(KEY_PUBLIC_NAMESPACE, "new")])), &mut relist);
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "pub");

        config.apply(watcher::Event::InitDone, &mut relist);
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "new");
    }

    #[test]
    fn relist_without_the_config_map_clears_it() {
        let config = ConfigMapConfig::default();
        let mut relist = None;
        config.apply(watcher::Event::Apply(config_map(&[(KEY_PUBLIC_NAMESPACE, "pub")])), &mut relist);

        config.apply(watcher::Event::Init, &mut relist);
        config.apply(watcher::Event::InitDone, &mut relist);

        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "");
    }

    #[test]
    fn ready_waits_for_the_first_complete_observation() {
        let config = ConfigMapConfig::default();
        let mut relist = None;
        assert!(config.ready().now_or_never().is_none());

        config.apply(watcher::Event::Init, &mut relist);
        config.apply(watcher::Event::InitApply(config_map(&[(KEY_PUBLIC_NAMESPACE, "pub")])), &mut relist);
        assert!(config.ready().now_or_never().is_none());

        config.apply(watcher::Event::InitDone, &mut relist);
        assert!(config.ready().now_or_never().is_some());
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, ""), "pub");
    }

    #[test]
    fn missing_config_map_still_counts_as_observed() {
        let config = ConfigMapConfig::default();
        let mut relist = None;

        config.apply(watcher::Event::Init, &mut relist);
        config.apply(watcher::Event::InitDone, &mut relist);

        assert!(config.ready().now_or_never().is_some());
        assert_eq!(config.value_or_default(KEY_PUBLIC_NAMESPACE, "none"), "none");
    }

    #[test]
    fn settings_defaults_match_the_dockyards_install() {
        let settings = Settings::try_parse_from(["dockyards-rbac"]).unwrap();
        assert_eq!(settings.config_map, "dockyards-system");
        assert_eq!(settings.dockyards_namespace, "dockyards-system");
        assert_eq!(settings.reconcile_timeout(), Duration::from_secs(30));
        assert_eq!(settings.error_requeue(), Duration::from_secs(60));
        assert_eq!(settings.metrics_addr, "0.0.0.0:9090".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn settings_accept_flags() {
        let settings = Settings::try_parse_from([
            "dockyards-rbac",
            "--config-map",
            "cfg",
            "--dockyards-namespace",
            "dockyards",
            "--log-format",
            "text",
            "--reconcile-timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(settings.config_map, "cfg");
        assert_eq!(settings.dockyards_namespace, "dockyards");
        assert_eq!(settings.log_format, LogFormat::Text);
        assert_eq!(settings.reconcile_timeout(), Duration::from_secs(5));
    }
}
