use std::sync::Arc;

use chrono::Utc;
use testbed_core::mocks::{GatewayCall, MockGateway};
use testbed_core::{ContainerState, EngineInfo, Error, OutputFrame, Result};
use testbed_engine::{EngineCapabilities, ExecOrchestrator};

#[tokio::test]
async fn test_echo_in_running_container() -> Result<()> {
    let gateway = Arc::new(
        MockGateway::new()
            .with_running_container("c1")
            .with_exec("e1", vec![OutputFrame::stdout("hi\n")], 0),
    );
    let exec = ExecOrchestrator::new(gateway.clone());

    let result = exec.exec_in_container("c1", &["echo", "hi"]).await?;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.stderr, "");
    assert!(result.success());

    let calls = gateway.calls();
    let request = calls
        .iter()
        .find_map(|c| match c {
            GatewayCall::CreateExec(req) => Some(req.clone()),
            _ => None,
        })
        .expect("exec created");
    assert_eq!(request.container_id, "c1");
    assert_eq!(request.cmd, vec!["echo", "hi"]);
    assert!(request.attach_stdout && request.attach_stderr);
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::StartExec(id) if id == "e1")), 1);
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::InspectExec(id) if id == "e1")), 1);
    Ok(())
}

#[tokio::test]
async fn test_stopped_container_is_rejected() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_container_states("c1", vec![ContainerState::exited(0, Utc::now())])
            .with_exec("e1", vec![], 0),
    );
    let err = ExecOrchestrator::new(gateway.clone())
        .exec_in_container("c1", &["ls"])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::CreateExec(_))), 0);
}

#[tokio::test]
async fn test_lxc_engine_is_unsupported() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_info(EngineInfo {
                execution_driver: Some("lxc-0.9".into()),
                ..Default::default()
            })
            .with_running_container("c1"),
    );
    let err = ExecOrchestrator::new(gateway.clone())
        .exec_in_container("c1", &["ls"])
        .await
        .unwrap_err();

    assert!(err.is_unsupported());
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::InspectContainer(_))), 0);
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::CreateExec(_))), 0);
}

#[tokio::test]
async fn test_capability_check_shared_across_execs() -> Result<()> {
    let gateway = Arc::new(
        MockGateway::new()
            .with_running_container("c1")
            .with_exec("e1", vec![OutputFrame::stderr("warn\n")], 2),
    );
    let capabilities = Arc::new(EngineCapabilities::new(gateway.clone()));
    let exec = ExecOrchestrator::new(gateway.clone()).with_capabilities(capabilities.clone());

    let first = exec.exec_in_container("c1", &["false"]).await?;
    let second = exec.exec_in_container("c1", &["false"]).await?;
    assert_eq!(first, second);
    assert_eq!(first.stderr, "warn\n");
    assert_eq!(first.exit_code, 2);
    assert!(capabilities.supports_exec().await?);
    assert_eq!(gateway.count(|c| matches!(c, GatewayCall::Info)), 1);
    Ok(())
}
