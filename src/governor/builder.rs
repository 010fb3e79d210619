use crate::config::AdmissionConfig;
use crate::governor::core::ConcurrencyGovernor;
use crate::governor::limits::ServiceLimits;
use crate::{ErrorContext, Result};
use std::collections::HashMap;

/// Builder for creating governors with custom limits.
///
/// Keep this surface area small and predictable.
pub struct GovernorBuilder {
    default_limits: ServiceLimits,
    services: HashMap<String, ServiceLimits>,
}

impl GovernorBuilder {
    pub fn new() -> Self {
        Self {
            default_limits: ServiceLimits::default(),
            services: HashMap::new(),
        }
    }

    /// Start from a loaded configuration (defaults plus per-service limits).
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self {
            default_limits: config.default_limits.clone(),
            services: config.services.clone(),
        }
    }

    /// Limits used for services without an explicit entry.
    pub fn default_limits(mut self, limits: ServiceLimits) -> Self {
        self.default_limits = limits;
        self
    }

    /// Set limits for one service name.
    pub fn service(mut self, name: impl Into<String>, limits: ServiceLimits) -> Self {
        self.services.insert(name.into(), limits);
        self
    }

    /// Build the governor, validating every set of limits.
    pub fn build(self) -> Result<ConcurrencyGovernor> {
        self.default_limits.validate().map_err(|e| {
            e.with_context(
                ErrorContext::new()
                    .with_field_path("default_limits")
                    .with_source("governor_builder"),
            )
        })?;
        for (name, limits) in &self.services {
            limits.validate().map_err(|e| {
                e.with_context(
                    ErrorContext::new()
                        .with_field_path(format!("services.{}", name))
                        .with_source("governor_builder"),
                )
            })?;
        }
        Ok(ConcurrencyGovernor::from_parts(
            self.default_limits,
            self.services,
        ))
    }
}

impl Default for GovernorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
