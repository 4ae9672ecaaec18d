//! Common test utilities: definition fixtures and a scripted analytics client.
use ahash::AHashMap;
use async_trait::async_trait;
use dashkeeper::prelude::*;
use dashkeeper::remote::{AssetRequest, AssetSummary, VersionDescription, VersionStatus};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::result::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SALES_ARN: &str = "arn:aws:quicksight:us-east-1:111111111111:dataset/sales-ds";
pub const RETURNS_ARN: &str = "arn:aws:quicksight:us-east-1:111111111111:dataset/returns-ds";
pub const SOURCE_ARN: &str = "arn:aws:quicksight:us-east-1:111111111111:datasource/warehouse";
pub const OTHER_SOURCE_ARN: &str = "arn:aws:quicksight:us-east-1:111111111111:datasource/staging";

/// An analysis definition declaring `sales` and `returns` but also referencing
/// the undeclared `legacy` dataset from filters, a control and a field well.
///
/// - `fg-sales` keeps `f-region` and loses `f-stale`.
/// - `fg-legacy` loses its only filter, so the group goes too.
/// - `c-date` points at `f-date` and is removed; `c-region` stays.
/// - The bar chart loses its `Values` field but keeps the slot.
#[allow(dead_code)]
pub fn broken_analysis() -> Value {
    json!({
        "DataSetIdentifierDeclarations": [
            {"Identifier": "sales", "DataSetArn": SALES_ARN},
            {"Identifier": "returns", "DataSetArn": RETURNS_ARN}
        ],
        "FilterGroups": [
            {
                "FilterGroupId": "fg-sales",
                "Filters": [
                    {"CategoryFilter": {"FilterId": "f-region", "Column": {"DataSetIdentifier": "sales", "ColumnName": "Region"}}},
                    {"NumericRangeFilter": {"FilterId": "f-stale", "Column": {"DataSetIdentifier": "legacy", "ColumnName": "Amount"}}}
                ]
            },
            {
                "FilterGroupId": "fg-legacy",
                "Filters": [
                    {"TimeRangeFilter": {"FilterId": "f-date", "Column": {"DataSetIdentifier": "legacy", "ColumnName": "OrderDate"}}}
                ]
            }
        ],
        "Sheets": [
            {
                "SheetId": "overview",
                "FilterControls": [
                    {"Dropdown": {"FilterControlId": "c-region", "SourceFilterId": "f-region", "Title": "Region"}},
                    {"DateTimePicker": {"FilterControlId": "c-date", "SourceFilterId": "f-date", "Title": "Date"}}
                ],
                "Visuals": [
                    {"BarChartVisual": {
                        "VisualId": "revenue",
                        "ChartConfiguration": {"FieldWells": {"BarChartAggregatedFieldWells": {
                            "Category": [
                                {"CategoricalDimensionField": {"FieldId": "region", "Column": {"DataSetIdentifier": "sales", "ColumnName": "Region"}}}
                            ],
                            "Values": [
                                {"NumericalMeasureField": {"FieldId": "amount", "Column": {"DataSetIdentifier": "legacy", "ColumnName": "Amount"}}}
                            ]
                        }}}
                    }}
                ]
            }
        ]
    })
}

/// A definition whose every filter and control depends on `legacy`.
#[allow(dead_code)]
pub fn fully_broken_filters() -> Value {
    json!({
        "DataSetIdentifierDeclarations": [{"Identifier": "sales", "DataSetArn": SALES_ARN}],
        "FilterGroups": [
            {"FilterGroupId": "fg-1", "Filters": [
                {"CategoryFilter": {"FilterId": "f-1", "Column": {"DataSetIdentifier": "legacy", "ColumnName": "A"}}}
            ]},
            {"FilterGroupId": "fg-2", "Filters": [
                {"TopBottomFilter": {"FilterId": "f-2", "Column": {"DataSetIdentifier": "legacy", "ColumnName": "B"}}}
            ]}
        ],
        "Sheets": [
            {"SheetId": "s1", "FilterControls": [
                {"List": {"FilterControlId": "c-1", "SourceFilterId": "f-1"}},
                {"Slider": {"FilterControlId": "c-2", "SourceFilterId": "f-2"}}
            ]}
        ]
    })
}

/// A clean dashboard definition referencing declarations `A` and `B`.
#[allow(dead_code)]
pub fn two_dataset_dashboard() -> Value {
    json!({
        "DataSetIdentifierDeclarations": [
            {"Identifier": "A", "DataSetArn": SALES_ARN},
            {"Identifier": "B", "DataSetArn": RETURNS_ARN}
        ],
        "Sheets": [
            {"SheetId": "s1", "Visuals": [
                {"TableVisual": {"VisualId": "t", "ChartConfiguration": {"FieldWells": {"TableAggregatedFieldWells": {
                    "GroupBy": [{"CategoricalDimensionField": {"FieldId": "g", "Column": {"DataSetIdentifier": "A", "ColumnName": "Region"}}}],
                    "Values": [{"NumericalMeasureField": {"FieldId": "v", "Column": {"DataSetIdentifier": "B", "ColumnName": "Qty"}}}]
                }}}}}
            ]}
        ]
    })
}

/// Dataset fields with one relational table pointing at `data_source`.
#[allow(dead_code)]
pub fn dataset_fields(data_source: &str) -> Value {
    json!({
        "PhysicalTableMap": {
            "orders": {"RelationalTable": {
                "DataSourceArn": data_source,
                "Schema": "public",
                "Name": "orders",
                "InputColumns": [{"Name": "id", "Type": "INTEGER"}]
            }}
        },
        "ImportMode": "SPICE"
    })
}

#[allow(dead_code)]
pub fn ids(values: &[&str]) -> IdSet {
    values.iter().map(|v| v.to_string()).collect()
}

#[allow(dead_code)]
pub fn destination() -> Destination {
    Destination::new("222222222222", "eu-west-1")
}

#[allow(dead_code)]
pub fn not_found(kind: AssetKind, asset_id: &str) -> RemoteError {
    RemoteError::NotFound {
        kind,
        asset_id: asset_id.to_string(),
    }
}

#[allow(dead_code)]
pub fn version(number: u64, status: VersionStatus) -> VersionDescription {
    VersionDescription {
        version: number,
        status,
        errors: Vec::new(),
    }
}

/// A config that never sleeps for long, for paused-clock tests.
#[allow(dead_code)]
pub fn fast_config(poll_attempts: u32) -> Config {
    Config {
        max_attempts: 3,
        base_delay_ms: 1,
        poll_attempts,
        poll_delay_ms: 10,
        concurrency: 2,
    }
}

/// An `AnalyticsClient` answering from per-operation queues.
///
/// Operations returning `()` succeed when their queue is empty; the others fail
/// with a transport error so a missing script shows up in the assertion.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<AHashMap<&'static str, VecDeque<Result<Node, RemoteError>>>>,
    versions: Mutex<VecDeque<Result<VersionDescription, RemoteError>>>,
    calls: Mutex<Vec<&'static str>>,
    submitted: Mutex<Vec<(&'static str, AssetRequest)>>,
    submit_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next answer for `operation`.
    pub fn respond(self, operation: &'static str, result: Result<Node, RemoteError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(result);
        self
    }

    pub fn respond_json(self, operation: &'static str, value: Value) -> Self {
        self.respond(operation, Ok(Node::from(value)))
    }

    pub fn fail(self, operation: &'static str, error: RemoteError) -> Self {
        self.respond(operation, Err(error))
    }

    pub fn version(self, result: Result<VersionDescription, RemoteError>) -> Self {
        self.versions.lock().unwrap().push_back(result);
        self
    }

    /// Makes every create/update take `delay`, so overlapping submits are visible.
    pub fn submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// The most submits that were ever running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| **c == operation).count()
    }

    pub fn submitted(&self) -> Vec<(&'static str, AssetRequest)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn into_provider(self: Arc<Self>) -> impl ClientProvider {
        move |_: &Destination| -> Result<Arc<dyn AnalyticsClient>, RemoteError> {
            Ok(self.clone())
        }
    }

    async fn submit(&self, operation: &'static str, request: &AssetRequest) -> Result<Node, RemoteError> {
        self.submitted
            .lock()
            .unwrap()
            .push((operation, request.clone()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.next(operation)
    }

    fn next(&self, operation: &'static str) -> Result<Node, RemoteError> {
        self.calls.lock().unwrap().push(operation);
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| match operation {
            "delete_asset" | "publish_version" | "update_permissions" | "tag_resource" => {
                Ok(Node::default())
            }
            _ => Err(RemoteError::Transport(format!(
                "no scripted response for {}",
                operation
            ))),
        })
    }
}

#[async_trait]
impl AnalyticsClient for ScriptedClient {
    async fn describe_asset(
        &self,
        kind: AssetKind,
        asset_id: &str,
    ) -> Result<AssetSummary, RemoteError> {
        self.calls.lock().unwrap().push("describe_asset");
        Ok(AssetSummary {
            name: format!("{} name", asset_id),
            arn: destination().arn(kind, asset_id),
        })
    }

    async fn describe_definition(
        &self,
        _kind: AssetKind,
        _asset_id: &str,
    ) -> Result<Node, RemoteError> {
        self.next("describe_definition")
    }

    async fn create_asset(
        &self,
        _kind: AssetKind,
        request: &AssetRequest,
    ) -> Result<Node, RemoteError> {
        self.submit("create_asset", request).await
    }

    async fn update_asset(
        &self,
        _kind: AssetKind,
        request: &AssetRequest,
    ) -> Result<Node, RemoteError> {
        self.submit("update_asset", request).await
    }

    async fn delete_asset(&self, _kind: AssetKind, _asset_id: &str) -> Result<(), RemoteError> {
        self.next("delete_asset").map(|_| ())
    }

    async fn describe_version(
        &self,
        asset_id: &str,
        version: u64,
    ) -> Result<VersionDescription, RemoteError> {
        self.calls.lock().unwrap().push("describe_version");
        self.versions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_found(AssetKind::Dashboard, &format!("{}/{}", asset_id, version))))
    }

    async fn publish_version(&self, _asset_id: &str, _version: u64) -> Result<(), RemoteError> {
        self.next("publish_version").map(|_| ())
    }

    async fn update_permissions(
        &self,
        _kind: AssetKind,
        _asset_id: &str,
        _grants: &[PermissionGrant],
    ) -> Result<(), RemoteError> {
        self.next("update_permissions").map(|_| ())
    }

    async fn tag_resource(&self, _arn: &str, _tags: &[(String, String)]) -> Result<(), RemoteError> {
        self.next("tag_resource").map(|_| ())
    }
}
