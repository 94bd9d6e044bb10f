//! Deploy, undeploy and refresh tests

mod support;

use std::sync::Arc;

use tokio_test::assert_ok;

use remote_servers::connection::{ConnectionEvent, ConnectionStatus};
use remote_servers::deploy::fsm::DeploymentStatus;
use remote_servers::errors::ServerError;
use remote_servers::models::deployment::ExecutionEnvironment;
use remote_servers::runtime::DeploymentRuntime;

use support::{
    connection, drain, task, wait_for, MockConnector, MockDebugConnector, MockInstance, MockLauncher,
    MockRuntime,
};

fn names(conn: &remote_servers::ServerConnection) -> Vec<String> {
    conn.get_deployments()
        .iter()
        .map(|r| r.name().to_string())
        .collect()
}

fn deployments_changed(events: &[ConnectionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ConnectionEvent::DeploymentsChanged { .. }))
        .count()
}

fn main_log(conn: &remote_servers::ServerConnection, name: &str) -> String {
    conn.log_manager(name).unwrap().main_handler().text()
}

// ================================ DEPLOY ================================== //

#[tokio::test]
async fn test_deploy_success() {
    let instance = MockInstance::new();
    let (conn, mut rx) = connection(MockConnector::new(instance.clone()));

    let started = conn.deploy(task("app.war")).await.unwrap();
    assert_eq!(started.deployment_name, "app.war");
    started.completion.await.unwrap();

    let record = conn.deployment("app.war").unwrap();
    assert_eq!(record.status(), DeploymentStatus::Deployed);
    assert!(record.error_message().is_none());
    assert!(record.task().is_some());
    let runtime = record.runtime().unwrap();
    assert!(std::ptr::addr_eq(Arc::as_ptr(&runtime), Arc::as_ptr(&instance.runtime("app.war"))));

    assert_eq!(
        main_log(&conn, "app.war"),
        "Deploying 'app.war'...\nuploading\n'app.war' has been deployed successfully.\n"
    );
    assert!(deployments_changed(&drain(&mut rx)) >= 2);
}

#[tokio::test]
async fn test_deploy_returns_before_server_answers() {
    let instance = MockInstance::new();
    let answer = instance.hold_deploy("app.war");
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));

    let started = conn.deploy(task("app.war")).await.unwrap();
    let record = conn.deployment("app.war").unwrap();
    assert_eq!(record.status(), DeploymentStatus::Deploying);
    assert!(record.runtime().is_none());

    answer.send(Ok(())).unwrap();
    started.completion.await.unwrap();
    assert_eq!(record.status(), DeploymentStatus::Deployed);
}

#[tokio::test]
async fn test_deploy_uses_configured_name() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance));

    let mut task = task("target/app-1.0.war");
    task.configuration.deployment_name = Some("app".to_string());
    let started = conn.deploy(task).await.unwrap();
    started.completion.await.unwrap();

    assert_eq!(started.deployment_name, "app");
    assert_eq!(names(&conn), vec!["app"]);
}

#[tokio::test]
async fn test_deploy_failure_keeps_record_with_error() {
    let instance = MockInstance::new();
    instance.fail_deploy("app.war", "disk full");
    let (conn, _rx) = connection(MockConnector::new(instance));

    let started = conn.deploy(task("app.war")).await.unwrap();
    started.completion.await.unwrap();

    let record = conn.deployment("app.war").unwrap();
    assert_eq!(record.status(), DeploymentStatus::NotDeployed);
    assert_eq!(record.error_message().as_deref(), Some("disk full"));
    assert!(record.runtime().is_none());
    assert!(main_log(&conn, "app.war").ends_with("Failed to deploy 'app.war': disk full\n"));
    assert_eq!(conn.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_deploy_starts_debug_session() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance));
    let launcher = Arc::new(MockLauncher::default());
    let debugger = Arc::new(MockDebugConnector {
        port: Some(5005),
        launcher: launcher.clone(),
    });
    let environment = ExecutionEnvironment {
        executor_id: "debug".to_string(),
        profile_name: "App on Staging".to_string(),
    };

    let task = task("app.war").with_debugger(debugger, environment);
    let started = conn.deploy(task).await.unwrap();
    started.completion.await.unwrap();

    assert_eq!(
        *launcher.sessions.lock().unwrap(),
        vec![(5005, "debug".to_string(), "srv-1".to_string())]
    );
}

#[tokio::test]
async fn test_debug_failure_is_logged_and_deployment_stays() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance));
    let launcher = Arc::new(MockLauncher::default());
    let debugger = Arc::new(MockDebugConnector {
        port: None,
        launcher: launcher.clone(),
    });

    let task = task("app.war").with_debugger(debugger, ExecutionEnvironment::default());
    let started = conn.deploy(task).await.unwrap();
    started.completion.await.unwrap();

    assert!(launcher.sessions.lock().unwrap().is_empty());
    assert!(main_log(&conn, "app.war")
        .ends_with("Cannot retrieve debug connection: app.war has no debug port\n"));
    assert_eq!(conn.deployment("app.war").unwrap().status(), DeploymentStatus::Deployed);
}

#[tokio::test]
async fn test_additional_log_announces_change() {
    let (conn, mut rx) = connection(MockConnector::new(MockInstance::new()));
    let started = conn.deploy(task("app.war")).await.unwrap();
    started.completion.await.unwrap();
    drain(&mut rx);

    let manager = conn.log_manager("app.war").unwrap();
    manager.add_additional_log("access");
    manager.add_additional_log("access");

    assert_eq!(deployments_changed(&drain(&mut rx)), 1);
    assert_eq!(manager.additional_logs().len(), 1);
}

// =============================== UNDEPLOY ================================= //

#[tokio::test]
async fn test_deploy_then_undeploy_leaves_nothing_behind() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));

    let started = conn.deploy(task("app1")).await.unwrap();
    started.completion.await.unwrap();
    let runtime = conn.deployment("app1").unwrap().runtime().unwrap();

    let handle = conn.undeploy("app1", runtime);
    assert_eq!(conn.deployment("app1").unwrap().status(), DeploymentStatus::Undeploying);
    handle.await.unwrap();

    assert!(conn.deployment("app1").is_none());
    assert!(conn.log_manager("app1").is_none());

    // A refresh follows a successful undeploy
    wait_for(|| instance.refresh_calls() == 1).await;
    assert!(conn.get_deployments().is_empty());
}

#[tokio::test]
async fn test_undeploy_failure_restores_deployment() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));
    let started = conn.deploy(task("app.war")).await.unwrap();
    started.completion.await.unwrap();

    let mock = instance.runtime("app.war");
    let answer = mock.hold_undeploy();
    let runtime: Arc<dyn DeploymentRuntime> = mock.clone();
    let handle = conn.undeploy("app.war", runtime.clone());

    answer.send(Err("access denied".to_string())).unwrap();
    handle.await.unwrap();

    let record = conn.deployment("app.war").unwrap();
    assert_eq!(record.status(), DeploymentStatus::Deployed);
    assert_eq!(record.error_message().as_deref(), Some("access denied"));
    assert!(Arc::ptr_eq(&record.runtime().unwrap(), &runtime));
    assert!(main_log(&conn, "app.war").ends_with("Failed to undeploy 'app.war': access denied\n"));
    assert_eq!(instance.refresh_calls(), 0);
}

#[tokio::test]
async fn test_overlapping_undeploys_do_not_resurrect() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));
    let started = conn.deploy(task("app.war")).await.unwrap();
    started.completion.await.unwrap();

    let mock = instance.runtime("app.war");
    let first = mock.hold_undeploy();
    let second = mock.hold_undeploy();
    let runtime: Arc<dyn DeploymentRuntime> = mock.clone();

    let h1 = conn.undeploy("app.war", runtime.clone());
    let h2 = conn.undeploy("app.war", runtime);

    first.send(Ok(())).unwrap();
    wait_for(|| conn.deployment("app.war").is_none()).await;

    // The late failure finds nothing to roll back
    second.send(Err("already gone".to_string())).unwrap();
    h1.await.unwrap();
    h2.await.unwrap();

    assert!(conn.deployment("app.war").is_none());
    assert_eq!(mock.undeploy_calls(), 2);
}

#[tokio::test]
async fn test_undeploy_of_discovered_deployment() {
    let instance = MockInstance::new();
    instance.report(&["remote.war"]);
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));
    assert_ok!(conn.compute_deployments().await);

    let runtime = conn.deployment("remote.war").unwrap().runtime().unwrap();
    instance.report(&[]);
    conn.undeploy("remote.war", runtime).await.unwrap();

    assert!(conn.deployment_registry().get_remote("remote.war").is_none());
    wait_for(|| instance.refresh_calls() == 2).await;
    assert!(conn.get_deployments().is_empty());
}

#[tokio::test]
async fn test_undeploy_of_unknown_deployment() {
    let (conn, mut rx) = connection(MockConnector::new(MockInstance::new()));
    let runtime = MockRuntime::new("ghost");

    conn.undeploy("ghost", runtime.clone()).await.unwrap();

    assert_eq!(runtime.undeploy_calls(), 1);
    assert!(conn.get_deployments().is_empty());
    assert!(deployments_changed(&drain(&mut rx)) >= 2);
}

// ================================ REFRESH ================================= //

#[tokio::test]
async fn test_refresh_replaces_remote_view() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));

    instance.report(&["a", "b"]);
    assert_ok!(conn.compute_deployments().await);
    assert_eq!(names(&conn), vec!["a", "b"]);

    instance.report(&["b", "c"]);
    assert_ok!(conn.compute_deployments().await);
    assert_eq!(names(&conn), vec!["b", "c"]);

    for record in conn.get_deployments() {
        assert_eq!(record.status(), DeploymentStatus::Deployed);
        assert!(record.task().is_none());
        assert!(record.runtime().is_some());
    }
}

#[tokio::test]
async fn test_local_deployment_shadows_reported_one() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));
    let started = conn.deploy(task("app.war")).await.unwrap();
    started.completion.await.unwrap();

    instance.report(&["app.war", "other.war"]);
    assert_ok!(conn.compute_deployments().await);

    let view = conn.get_deployments();
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].name(), "app.war");
    assert!(view[0].task().is_some());
    assert!(view[1].task().is_none());
}

#[tokio::test]
async fn test_refresh_failure_clears_remote_view() {
    let instance = MockInstance::new();
    let (conn, mut rx) = connection(MockConnector::new(instance.clone()));
    instance.report(&["a"]);
    assert_ok!(conn.compute_deployments().await);
    drain(&mut rx);

    instance.fail_refresh("forbidden");
    let err = conn.compute_deployments().await.unwrap_err();

    assert!(matches!(err, ServerError::Operation(ref m) if m == "forbidden"));
    assert!(conn.get_deployments().is_empty());
    assert_eq!(conn.status(), ConnectionStatus::Connected);
    assert_eq!(conn.status_text(), "Cannot obtain deployments: forbidden");
    assert_eq!(deployments_changed(&drain(&mut rx)), 1);
}

#[tokio::test]
async fn test_refresh_without_connection_keeps_remote_view() {
    let instance = MockInstance::new();
    let connector = MockConnector::new(instance.clone());
    let (conn, _rx) = connection(connector.clone());
    instance.report(&["a"]);
    assert_ok!(conn.compute_deployments().await);

    connector.fail_with("network unreachable");
    conn.connect().await;
    let err = conn.compute_deployments().await.unwrap_err();

    assert!(matches!(err, ServerError::Connect(_)));
    assert_eq!(names(&conn), vec!["a"]);
    assert_eq!(instance.refresh_calls(), 1);
}

#[tokio::test]
async fn test_successful_refresh_clears_refresh_error() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));

    instance.fail_refresh("forbidden");
    assert!(conn.compute_deployments().await.is_err());
    assert_eq!(conn.status_text(), "Cannot obtain deployments: forbidden");

    instance.report(&["a"]);
    assert_ok!(conn.compute_deployments().await);
    assert_eq!(conn.status_text(), "Connected");
    assert_eq!(names(&conn), vec!["a"]);
}

#[tokio::test]
async fn test_panicking_refresh_is_a_refresh_failure() {
    let instance = MockInstance::new();
    let (conn, _rx) = connection(MockConnector::new(instance.clone()));
    instance.report(&["a"]);
    assert_ok!(conn.compute_deployments().await);

    instance.panic_on_refresh();
    let err = conn.compute_deployments().await.unwrap_err();

    assert!(matches!(err, ServerError::Operation(ref m) if m == "remote call panicked"));
    assert!(conn.get_deployments().is_empty());
    assert_eq!(conn.status(), ConnectionStatus::Connected);
    assert_eq!(conn.status_text(), "Cannot obtain deployments: remote call panicked");
}
