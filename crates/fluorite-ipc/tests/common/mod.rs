#![allow(dead_code)]

use fluorite_core::DashboardConfig;
use fluorite_ipc::{
    dashboard_methods, ClientConfig, Endpoint, IpcServer, RpcError, ServerConfig,
};
use fluorite_orchestrator::DashboardOrchestrator;
use fluorite_services::testing::{mock_registry, MockAdapter};
use fluorite_services::{ServiceAdapter, ServiceFactory};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Orchestrator with every adapter registered and added
pub async fn orchestrator_with(adapters: Vec<MockAdapter>) -> DashboardOrchestrator {
    let names: Vec<String> = adapters.iter().map(|a| a.info().name.clone()).collect();
    let factory = Arc::new(ServiceFactory::with_registry(mock_registry(adapters)));
    let orchestrator = DashboardOrchestrator::new(
        DashboardConfig {
            refresh_interval: 0,
            ..DashboardConfig::default()
        },
        factory,
    );
    orchestrator.initialize().await.unwrap();
    for name in names {
        orchestrator.add_service(&name, None, None).await.unwrap();
    }
    orchestrator
}

pub fn server_config(token: Option<&str>) -> ServerConfig {
    let config = ServerConfig::new(Endpoint::tcp("127.0.0.1", 0));
    match token {
        Some(token) => config.with_auth_token(token),
        None => config,
    }
}

/// Dashboard methods plus `test.sleep {ms, tag}` which answers with `tag`
pub async fn start_server(orchestrator: DashboardOrchestrator, token: Option<&str>) -> (IpcServer, u16) {
    let mut methods = dashboard_methods(orchestrator);
    methods.register("test.sleep", |params, _| async move {
        let params = params.unwrap_or(Value::Null);
        let ms = params["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<Value, RpcError>(json!({ "tag": params["tag"].clone() }))
    });

    let server = IpcServer::new(server_config(token), methods);
    let address = server.start().await.unwrap();
    (server, port_of(&address))
}

pub fn port_of(address: &str) -> u16 {
    address.rsplit(':').next().unwrap().parse().unwrap()
}

pub fn client_config(port: u16) -> ClientConfig {
    ClientConfig::new(Endpoint::tcp("127.0.0.1", port))
}

/// Next event matching `pred`, failing the test after five seconds
pub async fn wait_for<T, F>(events: &mut broadcast::Receiver<T>, mut pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
