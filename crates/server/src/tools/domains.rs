//! domain_register and domain_list tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pulso_core::{DomainPolicy, DomainSpec, Engine, Error};

use super::json_result;

/// Parameters for the domain_register tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DomainRegisterParams {
    /// Domain pattern: `example.com` (host and subdomains), `*.example.com`
    /// (subdomains only) or `*` (default policy).
    pub domain: String,

    /// Freshness window such as "12h", "5m", "30s" or "1h30m".
    pub ttl: String,

    /// "simple-http" (default) or "rendered-browser".
    #[serde(default)]
    pub driver: Option<String>,

    /// Retries after the first failed attempt (default: 0).
    #[serde(default)]
    pub max_retries: u32,

    /// Seconds to wait between attempts (default: 0).
    #[serde(default)]
    pub retry_delay: f64,

    /// "return_cached" (default), "return_none" or "raise_error".
    #[serde(default)]
    pub fallback_on_error: Option<String>,
}

/// A registered policy as shown to tool callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PolicyView {
    pub domain: String,
    pub ttl_seconds: u64,
    pub driver: String,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    pub fallback_on_error: String,
}

impl PolicyView {
    fn new(domain: &str, policy: &DomainPolicy) -> Self {
        Self {
            domain: domain.to_string(),
            ttl_seconds: policy.ttl_seconds(),
            driver: policy.driver.to_string(),
            max_retries: policy.max_retries,
            retry_delay_seconds: policy.retry_delay.as_secs_f64(),
            fallback_on_error: policy.fallback.to_string(),
        }
    }
}

/// Output from the domain_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DomainListOutput {
    pub domains: Vec<PolicyView>,
}

pub(crate) fn register_output(engine: &Engine, params: DomainRegisterParams) -> Result<PolicyView, Error> {
    let mut spec = DomainSpec::new(params.ttl)
        .max_retries(params.max_retries)
        .retry_delay(params.retry_delay);
    if let Some(driver) = params.driver {
        spec = spec.driver(driver);
    }
    if let Some(fallback) = params.fallback_on_error {
        spec = spec.fallback_on_error(fallback);
    }

    let policy = engine.register_domain(&params.domain, spec)?;
    Ok(PolicyView::new(params.domain.trim(), &policy))
}

pub(crate) fn list_output(engine: &Engine) -> DomainListOutput {
    let domains = engine
        .registered_domains()
        .iter()
        .map(|(pattern, policy)| PolicyView::new(pattern, policy))
        .collect();
    DomainListOutput { domains }
}

/// Implementation of the domain_register tool.
pub async fn register_impl(engine: &Engine, params: DomainRegisterParams) -> Result<CallToolResult, McpError> {
    let output = register_output(engine, params)?;
    json_result(&output)
}

/// Implementation of the domain_list tool.
pub async fn list_impl(engine: &Engine) -> Result<CallToolResult, McpError> {
    json_result(&list_output(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_engine;

    fn params(domain: &str, ttl: &str) -> DomainRegisterParams {
        DomainRegisterParams {
            domain: domain.into(),
            ttl: ttl.into(),
            driver: None,
            max_retries: 0,
            retry_delay: 0.0,
            fallback_on_error: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let (engine, _) = test_engine();
        let view = register_output(
            &engine,
            DomainRegisterParams {
                driver: Some("playwright".into()),
                max_retries: 2,
                retry_delay: 0.5,
                fallback_on_error: Some("raise_error".into()),
                ..params("spa.example.com", "6h")
            },
        )
        .unwrap();
        assert_eq!(view.ttl_seconds, 6 * 3600);
        assert_eq!(view.driver, "rendered-browser");
        assert_eq!(view.fallback_on_error, "raise_error");

        register_output(&engine, params("example.com", "12h")).unwrap();

        let listed = list_output(&engine);
        let names: Vec<_> = listed.domains.iter().map(|d| d.domain.as_str()).collect();
        assert_eq!(names, vec!["example.com", "spa.example.com"]);
        assert_eq!(listed.domains[1].retry_delay_seconds, 0.5);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_ttl() {
        let (engine, _) = test_engine();
        let err = register_impl(&engine, params("example.com", "whenever")).await.unwrap_err();
        assert_eq!(err.code.0, -32000);
        assert!(list_output(&engine).domains.is_empty());
    }
}
