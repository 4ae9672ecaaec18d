mod common;

use common::*;
use dashkeeper::deploy::RecordStatus;
use dashkeeper::error::VersionError;
use dashkeeper::prelude::*;
use dashkeeper::remote::{VersionDescription, VersionStatus};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const DASHBOARD_VERSION_3: &str =
    "arn:aws:quicksight:eu-west-1:222222222222:dashboard/sales-dash/version/3";

fn dashboard_spec() -> DeploymentSpec {
    let spec = json!({
        "asset_id": "sales-dash",
        "kind": "dashboard",
        "source": {"inline": {"Name": "Sales", "Definition": two_dataset_dashboard()}},
        "destination": {"account_id": "222222222222", "region": "eu-west-1"}
    });
    DeploymentSpec::from_json(&spec.to_string()).unwrap()
}

fn dataset_spec() -> DeploymentSpec {
    let spec = json!({
        "asset_id": "orders",
        "kind": "data_set",
        "source": {"inline": dataset_fields(SOURCE_ARN)},
        "destination": {"account_id": "222222222222", "region": "eu-west-1"}
    });
    DeploymentSpec::from_json(&spec.to_string()).unwrap()
}

fn deployer(client: &Arc<ScriptedClient>, poll_attempts: u32) -> Deployer {
    Deployer::new(client.clone().into_provider(), fast_config(poll_attempts))
}

fn submitted_body(client: &ScriptedClient, index: usize) -> Value {
    Value::from(client.submitted()[index].1.body.clone())
}

#[tokio::test(start_paused = true)]
async fn test_new_dashboard_is_created_polled_and_published() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Dashboard, "sales-dash"))
            .respond_json("create_asset", json!({"VersionArn": DASHBOARD_VERSION_3}))
            .version(Ok(version(3, VersionStatus::CreationInProgress)))
            .version(Ok(version(3, VersionStatus::CreationSuccessful))),
    );

    let deployed = assert_ok!(deployer(&client, 5).deploy(&dashboard_spec()).await);

    assert_eq!(deployed.action, Action::Created);
    assert_eq!(deployed.version, Some(3));
    let record = deployed.record.unwrap();
    assert_eq!(record.status, RecordStatus::Successful);
    assert_eq!(record.polls, 2);

    assert_eq!(client.count("describe_version"), 2);
    assert_eq!(client.count("publish_version"), 1);
    assert_eq!(client.count("delete_asset"), 0);

    let submitted = client.submitted();
    let (operation, request) = &submitted[0];
    assert_eq!(*operation, "create_asset");
    assert_eq!(request.name, "Sales");
    assert_eq!(submitted_body(&client, 0), json!({"Definition": two_dataset_dashboard()}));
}

#[tokio::test(start_paused = true)]
async fn test_version_not_visible_yet_consumes_a_poll() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Dashboard, "sales-dash"))
            .respond_json("create_asset", json!({"Version": {"VersionNumber": 3}}))
            .version(Err(not_found(AssetKind::Dashboard, "sales-dash/version/3")))
            .version(Ok(version(3, VersionStatus::CreationSuccessful))),
    );

    let deployed = assert_ok!(deployer(&client, 2).deploy(&dashboard_spec()).await);
    assert_eq!(deployed.record.map(|r| r.polls), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_polling_timeout_rolls_back_without_publishing() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Dashboard, "sales-dash"))
            .respond_json("create_asset", json!({"VersionArn": DASHBOARD_VERSION_3}))
            .version(Ok(version(3, VersionStatus::CreationInProgress)))
            .version(Ok(version(3, VersionStatus::CreationInProgress)))
            .version(Ok(version(3, VersionStatus::CreationInProgress))),
    );

    let failure = assert_err!(deployer(&client, 3).deploy(&dashboard_spec()).await);

    assert_eq!(
        failure.error,
        DeployError::PollingTimeout {
            asset_id: "sales-dash".to_string(),
            version: 3,
            attempts: 3,
        }
    );
    assert_eq!(failure.rollback, RollbackStatus::Deleted);
    assert_eq!(client.count("describe_version"), 3);
    assert_eq!(client.count("publish_version"), 0);
    assert_eq!(client.count("delete_asset"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_update_restores_the_previous_definition() {
    let previous = json!({"Definition": {"DataSetIdentifierDeclarations": [], "Sheets": []}});
    let mut described = previous.clone();
    described["DashboardId"] = json!("sales-dash");
    described["Name"] = json!("Sales (old)");

    let client = Arc::new(
        ScriptedClient::new()
            .respond_json("describe_definition", described)
            .respond_json(
                "update_asset",
                json!({"VersionArn": "arn:aws:quicksight:eu-west-1:222222222222:dashboard/sales-dash/version/4"}),
            )
            .respond_json("update_asset", json!({"Status": 202}))
            .version(Ok(VersionDescription {
                version: 4,
                status: VersionStatus::CreationFailed,
                errors: vec![VersionError {
                    error_type: "DATA_SET_NOT_FOUND".to_string(),
                    message: "Dataset A is missing".to_string(),
                }],
            })),
    );

    let failure = assert_err!(deployer(&client, 5).deploy(&dashboard_spec()).await);

    match &failure.error {
        DeployError::CreationFailed { version, errors, .. } => {
            assert_eq!(*version, 4);
            assert_eq!(errors.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(failure.rollback, RollbackStatus::Restored);
    assert_eq!(client.count("publish_version"), 0);

    let submitted = client.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[1].0, "update_asset");
    assert_eq!(submitted[1].1.name, "Sales (old)");
    assert_eq!(submitted_body(&client, 1), previous);
}

#[tokio::test]
async fn test_dataset_mismatch_rolls_back_to_the_captured_definition() {
    let mut described = dataset_fields(OTHER_SOURCE_ARN);
    described["DataSetId"] = json!("orders");
    described["Name"] = json!("Orders");
    described["Arn"] = json!("arn:aws:quicksight:eu-west-1:222222222222:dataset/orders");

    let client = Arc::new(
        ScriptedClient::new()
            .respond_json("describe_definition", described.clone())
            .respond_json("update_asset", json!({"Status": 200}))
            .respond_json("describe_definition", described)
            .respond_json("update_asset", json!({"Status": 200})),
    );

    let failure = assert_err!(deployer(&client, 5).deploy(&dataset_spec()).await);

    assert_eq!(
        failure.error,
        DeployError::ValidationMismatch {
            asset_id: "orders".to_string(),
            field: "PhysicalTableMap.*.DataSourceArn".to_string(),
            expected: vec![SOURCE_ARN.to_string()],
            actual: vec![OTHER_SOURCE_ARN.to_string()],
        }
    );
    assert_eq!(failure.rollback, RollbackStatus::Restored);
    assert_eq!(submitted_body(&client, 0), dataset_fields(SOURCE_ARN));
    assert_eq!(submitted_body(&client, 1), dataset_fields(OTHER_SOURCE_ARN));
}

#[tokio::test]
async fn test_matching_dataset_is_validated_and_granted() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::DataSet, "orders"))
            .respond_json("create_asset", json!({"Status": 201}))
            .respond_json("describe_definition", dataset_fields(SOURCE_ARN)),
    );
    let mut spec = dataset_spec();
    spec.permissions = vec![PermissionGrant {
        principal: "arn:aws:quicksight:eu-west-1:222222222222:group/default/analysts".to_string(),
        actions: vec!["quicksight:DescribeDataSet".to_string()],
    }];
    spec.tags.insert("team".to_string(), "finance".to_string());

    let deployed = assert_ok!(deployer(&client, 5).deploy(&spec).await);
    assert_eq!(deployed.action, Action::Created);
    assert_eq!(deployed.version, None);
    assert_eq!(client.count("update_permissions"), 1);
    assert_eq!(client.count("tag_resource"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_failure_is_reported_next_to_the_original_error() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Dashboard, "sales-dash"))
            .respond_json("create_asset", json!({"VersionArn": DASHBOARD_VERSION_3}))
            .version(Ok(version(3, VersionStatus::CreationFailed)))
            .fail("delete_asset", RemoteError::Transport("connection reset".to_string())),
    );

    let failure = assert_err!(deployer(&client, 5).deploy(&dashboard_spec()).await);

    assert!(matches!(failure.error, DeployError::CreationFailed { version: 3, .. }));
    match failure.rollback {
        RollbackStatus::Failed(DeployError::RollbackFailed { action, .. }) => {
            assert_eq!(action, "delete")
        }
        other => panic!("unexpected rollback status: {other}"),
    }
}

#[tokio::test]
async fn test_missing_version_reference_rolls_back() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Dashboard, "sales-dash"))
            .respond_json("create_asset", json!({"Arn": "arn:x", "Status": 202})),
    );

    let failure = assert_err!(deployer(&client, 5).deploy(&dashboard_spec()).await);
    assert!(matches!(failure.error, DeployError::VersionExtraction { .. }));
    assert_eq!(failure.rollback, RollbackStatus::Deleted);
    assert_eq!(client.count("describe_version"), 0);
}

#[tokio::test]
async fn test_submit_and_probe_errors_leave_the_destination_alone() {
    let rejected = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Dashboard, "sales-dash"))
            .fail("create_asset", RemoteError::InvalidRequest("bad definition".to_string())),
    );
    let failure = assert_err!(deployer(&rejected, 5).deploy(&dashboard_spec()).await);
    assert!(matches!(failure.error, DeployError::Submit { .. }));
    assert_eq!(failure.rollback, RollbackStatus::NotRequired);
    assert_eq!(rejected.count("delete_asset"), 0);

    let unreachable = Arc::new(
        ScriptedClient::new().fail("describe_definition", RemoteError::Transport("timeout".to_string())),
    );
    let failure = assert_err!(deployer(&unreachable, 5).deploy(&dashboard_spec()).await);
    assert!(matches!(failure.error, DeployError::Probe { .. }));
    assert!(unreachable.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_throttled_probe_is_retried() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail(
                "describe_definition",
                RemoteError::Throttled {
                    operation: "DescribeAnalysisDefinition".to_string(),
                    message: "Rate exceeded".to_string(),
                },
            )
            .fail("describe_definition", not_found(AssetKind::Analysis, "sales-analysis"))
            .respond_json("create_asset", json!({"Status": 202})),
    );
    let spec = DeploymentSpec::from_json(
        &json!({
            "asset_id": "sales-analysis",
            "kind": "analysis",
            "source": {"inline": {"Definition": broken_analysis()}},
            "destination": {"account_id": "222222222222", "region": "eu-west-1"}
        })
        .to_string(),
    )
    .unwrap();

    let deployed = assert_ok!(deployer(&client, 5).deploy(&spec).await);
    assert_eq!(deployed.action, Action::Created);
    assert_eq!(client.count("describe_definition"), 2);

    // The dangling `legacy` references were stripped before submitting.
    let body = Node::from(submitted_body(&client, 0));
    assert!(Diagnosis::of(&body).dangling().is_empty());
}

#[tokio::test]
async fn test_spec_errors_surface_before_any_remote_call() {
    let client = Arc::new(ScriptedClient::new());
    let spec = DeploymentSpec::from_json(
        &json!({
            "asset_id": "orders",
            "kind": "dataset",
            "source": {"inline": {"ImportMode": "SPICE"}},
            "destination": {"account_id": "222222222222", "region": "eu-west-1"}
        })
        .to_string(),
    )
    .unwrap();

    let failure = assert_err!(deployer(&client, 5).deploy(&spec).await);
    assert_eq!(
        failure.error,
        DeployError::Spec(SpecError::MissingField {
            asset_id: "orders".to_string(),
            field: "PhysicalTableMap",
        })
    );
    assert!(client.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_rolls_back_the_new_dashboard() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Dashboard, "sales-dash"))
            .respond_json("create_asset", json!({"VersionArn": DASHBOARD_VERSION_3}))
            .version(Ok(version(3, VersionStatus::CreationSuccessful)))
            .fail("publish_version", RemoteError::InvalidRequest("version is locked".to_string())),
    );

    let failure = assert_err!(deployer(&client, 5).deploy(&dashboard_spec()).await);

    assert_eq!(
        failure.error,
        DeployError::Publish {
            asset_id: "sales-dash".to_string(),
            version: 3,
            source: RemoteError::InvalidRequest("version is locked".to_string()),
        }
    );
    assert_eq!(failure.rollback, RollbackStatus::Deleted);
    assert_eq!(client.count("publish_version"), 1);
    assert_eq!(client.count("delete_asset"), 1);
    assert_eq!(client.count("update_permissions"), 0);
}

#[tokio::test]
async fn test_grant_failure_keeps_the_deployed_asset() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::DataSet, "orders"))
            .respond_json("create_asset", json!({"Status": 201}))
            .respond_json("describe_definition", dataset_fields(SOURCE_ARN))
            .fail("update_permissions", RemoteError::InvalidRequest("unknown principal".to_string())),
    );
    let mut spec = dataset_spec();
    spec.permissions = vec![PermissionGrant {
        principal: "arn:aws:quicksight:eu-west-1:222222222222:group/default/nobody".to_string(),
        actions: vec!["quicksight:DescribeDataSet".to_string()],
    }];
    spec.tags.insert("team".to_string(), "finance".to_string());

    let failure = assert_err!(deployer(&client, 5).deploy(&spec).await);

    assert_eq!(
        failure.error,
        DeployError::Grant {
            asset_id: "orders".to_string(),
            source: RemoteError::InvalidRequest("unknown principal".to_string()),
        }
    );
    assert_eq!(failure.rollback, RollbackStatus::NotRequired);
    assert_eq!(client.count("delete_asset"), 0);
    assert_eq!(client.count("tag_resource"), 0);
    assert_eq!(client.submitted().len(), 1);
}

fn analysis_spec(asset_id: &str) -> DeploymentSpec {
    let spec = json!({
        "asset_id": asset_id,
        "kind": "analysis",
        "source": {"inline": {"Definition": two_dataset_dashboard()}},
        "destination": {"account_id": "222222222222", "region": "eu-west-1"}
    });
    DeploymentSpec::from_json(&spec.to_string()).unwrap()
}

fn slow_analysis_client(count: usize) -> Arc<ScriptedClient> {
    let mut client = ScriptedClient::new().submit_delay(std::time::Duration::from_millis(50));
    for index in 0..count {
        client = client
            .fail("describe_definition", not_found(AssetKind::Analysis, &format!("a-{}", index)))
            .respond_json("create_asset", json!({"Status": 202}));
    }
    Arc::new(client)
}

#[tokio::test(start_paused = true)]
async fn test_deploy_all_respects_the_concurrency_bound() {
    let specs: Vec<_> = (0..4).map(|i| analysis_spec(&format!("a-{}", i))).collect();

    let serial = slow_analysis_client(specs.len());
    let mut config = fast_config(5);
    config.concurrency = 1;
    let results = Deployer::new(serial.clone().into_provider(), config)
        .deploy_all(&specs)
        .await;
    assert!(results.iter().all(std::result::Result::is_ok), "{:?}", results);
    assert_eq!(serial.peak_in_flight(), 1);
    assert_eq!(serial.count("create_asset"), 4);

    let parallel = slow_analysis_client(specs.len());
    let mut config = fast_config(5);
    config.concurrency = 4;
    let results = Deployer::new(parallel.clone().into_provider(), config)
        .deploy_all(&specs)
        .await;
    assert!(results.iter().all(std::result::Result::is_ok), "{:?}", results);
    assert!(parallel.peak_in_flight() > 1);
}

#[tokio::test]
async fn test_declaration_override_rewrites_references_before_submit() {
    let client = Arc::new(
        ScriptedClient::new()
            .fail("describe_definition", not_found(AssetKind::Analysis, "sales-analysis"))
            .respond_json("create_asset", json!({"Status": 202})),
    );
    let spec = DeploymentSpec::from_json(
        &json!({
            "asset_id": "sales-analysis",
            "kind": "analysis",
            "source": {"inline": {"Definition": two_dataset_dashboard()}},
            "destination": {"account_id": "222222222222", "region": "eu-west-1"},
            "declarations": [
                {"Identifier": "sales-prod", "DataSetArn": "arn:aws:quicksight:eu-west-1:222222222222:dataset/sales"},
                {"Identifier": "returns-prod", "DataSetArn": "arn:aws:quicksight:eu-west-1:222222222222:dataset/returns"}
            ]
        })
        .to_string(),
    )
    .unwrap();

    assert_ok!(deployer(&client, 5).deploy(&spec).await);

    let body = Node::from(submitted_body(&client, 0));
    let diagnosis = Diagnosis::of(&body);
    assert_eq!(diagnosis.references, ids(&["sales-prod", "returns-prod"]));
    assert_eq!(diagnosis.declared, ids(&["sales-prod", "returns-prod"]));
    let value = Value::from(body);
    assert_eq!(
        value["Definition"]["DataSetIdentifierDeclarations"][1]["DataSetArn"],
        json!("arn:aws:quicksight:eu-west-1:222222222222:dataset/returns")
    );
}

#[tokio::test]
async fn test_wrapped_dataset_response_is_restored_on_rollback() {
    let mut fields = dataset_fields(OTHER_SOURCE_ARN);
    fields["DataSetId"] = json!("orders");
    fields["Name"] = json!("Orders");
    let described = json!({"DataSet": fields, "RequestId": "req-1", "Status": 200});

    let client = Arc::new(
        ScriptedClient::new()
            .respond_json("describe_definition", described.clone())
            .respond_json("update_asset", json!({"Status": 200}))
            .respond_json("describe_definition", described)
            .respond_json("update_asset", json!({"Status": 200})),
    );

    let failure = assert_err!(deployer(&client, 5).deploy(&dataset_spec()).await);

    assert!(matches!(failure.error, DeployError::ValidationMismatch { .. }));
    assert_eq!(failure.rollback, RollbackStatus::Restored);
    let submitted = client.submitted();
    assert_eq!(submitted[1].1.name, "Orders");
    assert_eq!(submitted_body(&client, 1), dataset_fields(OTHER_SOURCE_ARN));
    assert_eq!(client.count("describe_asset"), 0);
}
