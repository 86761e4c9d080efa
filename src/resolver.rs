use std::sync::Arc;

use chrono::Utc;

use crate::{
    configuration_store::ConfigurationStore, events::ServeEvent, resolve::resolve, Resolution,
    RequestContext, ResolverConfig, Result, Snapshot,
};

/// Resolves wrapper configuration for incoming requests against the current snapshot.
///
/// In order to create a resolver instance, first create [`ResolverConfig`].
///
/// # Examples
/// ```
/// # use prebid_config::{RequestContext, Resolution, Resolver, ResolverConfig, Snapshot};
/// let resolver = Resolver::new(ResolverConfig::new());
/// resolver.set_snapshot(Snapshot::from_json(br#"{
///     "configs": [{"id": "c1", "publisherId": "p1", "status": "active", "isDefault": true}]
/// }"#).unwrap());
///
/// let resolution = resolver
///     .resolve("p1", Some("site"), &RequestContext::new("visitor-1"))
///     .unwrap();
/// assert_eq!(resolution.resolved().unwrap().config_id, "c1");
/// ```
pub struct Resolver<'a> {
    configuration_store: Arc<ConfigurationStore>,
    config: ResolverConfig<'a>,
}

impl<'a> Resolver<'a> {
    /// Create a new `Resolver` using the specified configuration.
    pub fn new(config: ResolverConfig<'a>) -> Self {
        Resolver {
            configuration_store: Arc::new(ConfigurationStore::new()),
            config,
        }
    }

    /// Create a resolver reading from a store shared with whatever refreshes it.
    pub fn with_configuration_store(
        config: ResolverConfig<'a>,
        configuration_store: Arc<ConfigurationStore>,
    ) -> Self {
        Resolver {
            configuration_store,
            config,
        }
    }

    /// Replace the current snapshot. Loaded snapshots are validated once here so integrity
    /// problems are logged per refresh rather than per request.
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        for warning in snapshot.validate() {
            log::warn!(target: "prebid", warning:serde; "{warning}");
        }
        self.configuration_store.set_snapshot(snapshot);
    }

    /// Parse and install a JSON snapshot.
    pub fn load_json(&self, bytes: &[u8]) -> Result<()> {
        let snapshot = Snapshot::from_json(bytes).inspect_err(|err| {
            log::warn!(target: "prebid", "failed to load configuration snapshot: {err}");
        })?;
        self.set_snapshot(snapshot);
        Ok(())
    }

    /// Resolve the wrapper configuration for one request and report the serve.
    ///
    /// [`Resolution::Resolved`] and [`Resolution::Blocked`] are handed to the serve logger as a
    /// [`ServeEvent`].
    pub fn resolve(
        &self,
        publisher_id: &str,
        website_id: Option<&str>,
        context: &RequestContext,
    ) -> Result<Resolution> {
        let snapshot = self.configuration_store.get_snapshot();
        let now = Utc::now();

        let resolution = resolve(
            snapshot.as_deref(),
            publisher_id,
            website_id,
            context,
            now,
            self.config.max_experiment_depth,
        )?;

        let event = match &resolution {
            Resolution::Resolved(resolved) => Some(ServeEvent::resolved(
                resolved,
                website_id,
                &context.bucket_key,
                now,
            )),
            Resolution::Blocked(blocked) => Some(ServeEvent::blocked(
                blocked,
                website_id,
                &context.bucket_key,
                now,
            )),
            Resolution::NotConfigured => None,
        };
        if let Some(event) = event {
            log::trace!(target: "prebid",
                        event:serde;
                        "logging serve");
            self.config.serve_logger.log_serve(event);
        }

        Ok(resolution)
    }
}
