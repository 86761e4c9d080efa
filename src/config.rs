use crate::{events::NoopServeLogger, Resolver, ServeLogger};

/// Configuration for [`Resolver`].
pub struct ResolverConfig<'a> {
    pub(crate) max_experiment_depth: usize,
    pub(crate) serve_logger: Box<dyn ServeLogger + Send + Sync + 'a>,
}

impl<'a> ResolverConfig<'a> {
    /// Default bound on the depth of nested experiment chains.
    pub const DEFAULT_MAX_EXPERIMENT_DEPTH: usize = 8;

    /// Create a default configuration.
    ///
    /// ```
    /// # use prebid_config::ResolverConfig;
    /// ResolverConfig::new();
    /// ```
    pub fn new() -> Self {
        ResolverConfig {
            max_experiment_depth: ResolverConfig::DEFAULT_MAX_EXPERIMENT_DEPTH,
            serve_logger: Box::new(NoopServeLogger),
        }
    }

    /// Override the bound on nested experiment depth. Deeper chains fail resolution with
    /// [`ConfigError::DepthExceeded`](crate::ConfigError::DepthExceeded).
    pub fn max_experiment_depth(&mut self, max_experiment_depth: usize) -> &mut Self {
        self.max_experiment_depth = max_experiment_depth;
        self
    }

    /// Set serve logger to persist serve events and update impression counters.
    ///
    /// ```
    /// # use prebid_config::{ResolverConfig, ServeEvent};
    /// let mut config = ResolverConfig::new();
    /// config.serve_logger(|event: ServeEvent| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn serve_logger(&mut self, serve_logger: impl ServeLogger + Send + Sync + 'a) -> &mut Self {
        self.serve_logger = Box::new(serve_logger);
        self
    }

    /// Create a new [`Resolver`] using the specified configuration.
    ///
    /// ```
    /// # use prebid_config::{Resolver, ResolverConfig};
    /// let resolver: Resolver = ResolverConfig::new().to_resolver();
    /// ```
    pub fn to_resolver(self) -> Resolver<'a> {
        Resolver::new(self)
    }
}

impl Default for ResolverConfig<'_> {
    fn default() -> Self {
        Self::new()
    }
}
