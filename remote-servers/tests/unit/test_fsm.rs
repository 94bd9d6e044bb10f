//! Deployment record state machine tests

mod support;

use std::sync::Arc;
use std::thread;

use remote_servers::deploy::fsm::{DeploymentRecord, DeploymentStatus};
use remote_servers::runtime::DeploymentRuntime;

use support::{mock_runtime, task, MockRuntime};

fn runtime(name: &str) -> Arc<dyn DeploymentRuntime> {
    MockRuntime::new(name)
}

#[test]
fn test_deploy_then_undeploy_lifecycle() {
    let record = DeploymentRecord::new(
        "app",
        DeploymentStatus::Deploying,
        None,
        None,
        Some(Arc::new(task("app"))),
    );
    assert!(record.task().is_some());
    assert!(record.runtime().is_none());

    // Deploying -> Deployed
    assert!(record.change_state(
        DeploymentStatus::Deploying,
        DeploymentStatus::Deployed,
        None,
        Some(runtime("app")),
    ));
    assert_eq!(record.status(), DeploymentStatus::Deployed);
    assert!(record.runtime().is_some());

    // Deployed -> Undeploying drops the handle
    assert!(record.change_state(
        DeploymentStatus::Deployed,
        DeploymentStatus::Undeploying,
        None,
        None,
    ));
    assert!(record.runtime().is_none());

    // Undeploying -> NotDeployed
    assert!(record.change_state(
        DeploymentStatus::Undeploying,
        DeploymentStatus::NotDeployed,
        None,
        None,
    ));
    assert_eq!(record.status(), DeploymentStatus::NotDeployed);
}

#[test]
fn test_failed_undeploy_rolls_back_with_error_and_handle() {
    let record = DeploymentRecord::discovered("app", None);
    record.change_state(DeploymentStatus::Deployed, DeploymentStatus::Undeploying, None, None);

    let handle = runtime("app");
    assert!(record.change_state(
        DeploymentStatus::Undeploying,
        DeploymentStatus::Deployed,
        Some("access denied".to_string()),
        Some(handle.clone()),
    ));

    let snapshot = record.snapshot();
    assert_eq!(snapshot.status, DeploymentStatus::Deployed);
    assert_eq!(snapshot.error_message.as_deref(), Some("access denied"));
    assert!(Arc::ptr_eq(&snapshot.runtime.unwrap(), &handle));
}

#[test]
fn test_mismatched_expectation_leaves_record_untouched() {
    let handle = runtime("app");
    let record = DeploymentRecord::new(
        "app",
        DeploymentStatus::NotDeployed,
        Some("earlier failure".to_string()),
        Some(handle.clone()),
        None,
    );
    let before = record.snapshot();

    assert!(!record.change_state(
        DeploymentStatus::Undeploying,
        DeploymentStatus::Deployed,
        Some("late answer".to_string()),
        None,
    ));

    let after = record.snapshot();
    assert_eq!(after.status, DeploymentStatus::NotDeployed);
    assert_eq!(after.error_message.as_deref(), Some("earlier failure"));
    assert_eq!(mock_runtime(&after.runtime.unwrap()).name, "app");
    assert_eq!(after.updated_at, before.updated_at);
}

#[test]
fn test_discovered_record_is_deployed_without_task() {
    let record = DeploymentRecord::discovered("remote.war", Some(runtime("remote.war")));
    assert_eq!(record.name(), "remote.war");
    assert_eq!(record.status(), DeploymentStatus::Deployed);
    assert!(record.task().is_none());
    assert!(record.error_message().is_none());
}

#[test]
fn test_only_one_of_racing_transitions_wins() {
    for _ in 0..50 {
        let record = Arc::new(DeploymentRecord::discovered("app", None));

        let handles: Vec<_> = [DeploymentStatus::Undeploying, DeploymentStatus::NotDeployed]
            .into_iter()
            .map(|target| {
                let record = record.clone();
                thread::spawn(move || {
                    record.change_state(DeploymentStatus::Deployed, target, None, None)
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();
        assert_eq!(wins, 1);
        assert_ne!(record.status(), DeploymentStatus::Deployed);
    }
}

#[test]
fn test_status_presentation() {
    assert_eq!(DeploymentStatus::NotDeployed.to_string(), "Not deployed");
    assert!(DeploymentStatus::Deploying.is_transition());
    assert!(DeploymentStatus::Undeploying.is_transition());
    assert!(!DeploymentStatus::Deployed.is_transition());
    assert_eq!(
        serde_json::to_string(&DeploymentStatus::NotDeployed).unwrap(),
        "\"not_deployed\""
    );
}
