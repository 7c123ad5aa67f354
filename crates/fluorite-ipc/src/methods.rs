//! Dashboard method bindings
//!
//! Exposes the orchestrator and service factory over JSON-RPC. Adapter and
//! orchestrator failures map to `SERVICE_ERROR` with the error kind in
//! `data.kind`.

use fluorite_core::{Capability, FluoriteError};
use fluorite_orchestrator::DashboardOrchestrator;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::protocol::RpcError;
use crate::server::{HandlerResult, MethodRegistry};

const FALLBACK_WATCH_INTERVAL_MS: u64 = 1000;
const MIN_WATCH_INTERVAL_MS: u64 = 10;
const MAX_WATCH_COUNT: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct ServiceParams {
    service: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WatchParams {
    interval_ms: Option<u64>,
    count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SupportedParams {
    capability: Option<String>,
}

/// Registry with every dashboard method bound to `orchestrator`
pub fn dashboard_methods(orchestrator: DashboardOrchestrator) -> MethodRegistry {
    let mut methods = MethodRegistry::new();
    register_dashboard_methods(&mut methods, orchestrator);
    methods
}

pub fn register_dashboard_methods(methods: &mut MethodRegistry, orchestrator: DashboardOrchestrator) {
    let orch = orchestrator.clone();
    methods.register("dashboard.getData", move |_, _| {
        let orch = orch.clone();
        async move {
            let snapshot = orch.multi_service_dashboard_data().await?;
            encode(&snapshot)
        }
    });

    let orch = orchestrator.clone();
    methods.register("dashboard.getServiceData", move |params, _| {
        let orch = orch.clone();
        async move {
            let ServiceParams { service } = parse_params(params)?;
            let data = orch.service_dashboard_data(&service).await?;
            encode(&data)
        }
    });

    let orch = orchestrator.clone();
    methods.register("dashboard.listServices", move |_, _| {
        let orch = orch.clone();
        async move { Ok(json!({ "services": orch.registered_services().await })) }
    });

    let orch = orchestrator.clone();
    methods.register("dashboard.watch", move |params, ctx| {
        let orch = orch.clone();
        async move {
            let params: WatchParams = parse_params(params)?;
            let configured = orch.config().refresh_interval;
            let interval_ms = params
                .interval_ms
                .unwrap_or(if configured > 0 { configured } else { FALLBACK_WATCH_INTERVAL_MS })
                .max(MIN_WATCH_INTERVAL_MS);
            let count = params.count.unwrap_or(1).clamp(1, MAX_WATCH_COUNT);

            let mut sent = 0u32;
            for n in 0..count {
                if n > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
                let snapshot = orch.refresh().await?;
                if !ctx.send_chunk(encode(&snapshot)?).await {
                    debug!(connection = ctx.connection_id(), "Watcher went away after {} snapshots", sent);
                    break;
                }
                sent += 1;
            }
            Ok(json!({ "snapshots": sent }))
        }
    });

    let factory = orchestrator.factory().clone();
    methods.register("services.supported", move |params, _| {
        let factory = factory.clone();
        async move {
            let SupportedParams { capability } = parse_params(params)?;
            let infos = match capability {
                Some(raw) => {
                    let capability: Capability = raw.parse().map_err(RpcError::invalid_params)?;
                    factory
                        .services_by_capability(capability)
                        .iter()
                        .filter_map(|name| factory.service_info(name))
                        .collect()
                }
                None => factory.all_service_info(),
            };
            Ok(json!({ "services": encode(&infos)? }))
        }
    });

    let factory = orchestrator.factory().clone();
    methods.register("services.info", move |params, _| {
        let factory = factory.clone();
        async move {
            let ServiceParams { service } = parse_params(params)?;
            let info = factory
                .service_info(&service)
                .ok_or(FluoriteError::UnsupportedServiceType(service))?;
            encode(&info)
        }
    });
}

/// Missing params decode like an empty object so optional fields default
fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = match params {
        None | Some(Value::Null) => json!({}),
        Some(params) => params,
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INVALID_PARAMS;

    #[test]
    fn test_parse_params_defaults() {
        let watch: WatchParams = parse_params(None).unwrap();
        assert!(watch.interval_ms.is_none());

        let watch: WatchParams = parse_params(Some(json!({"intervalMs": 50, "count": 3}))).unwrap();
        assert_eq!(watch.interval_ms, Some(50));
        assert_eq!(watch.count, Some(3));
    }

    #[test]
    fn test_missing_service_param() {
        let err = parse_params::<ServiceParams>(Some(json!({}))).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.contains("service"));
    }
}
