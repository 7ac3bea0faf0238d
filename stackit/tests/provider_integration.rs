//! Drives the provider through the gRPC service against a mocked STACKIT API

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use mockito::{Matcher, Server};
use stackit::StackitProvider;
use tfplug::grpc::GrpcProviderServer;
use tfplug::proto::{self, ProviderService};
use tfplug::types::{AttributePath, Dynamic, DynamicValue};
use tonic::Request;

const PROJECT_ID: &str = "4b0c7c2e-5d1e-4a4f-9a53-1c2d3e4f5a6b";
const GROUP_ID: &str = "9f8e7d6c-5b4a-4321-8fed-cba987654321";

fn wire(value: &DynamicValue) -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: value.encode_msgpack().unwrap(),
        json: vec![],
    })
}

fn unwire(value: Option<proto::DynamicValue>) -> DynamicValue {
    DynamicValue::decode_msgpack(&value.unwrap().msgpack).unwrap()
}

fn provider_config(url: &str) -> DynamicValue {
    DynamicValue::new(Dynamic::object([
        ("service_account_token", "test-token".into()),
        ("default_region", "eu01".into()),
        ("enable_beta_resources", false.into()),
        ("iaas_custom_endpoint", url.into()),
        ("postgresflex_custom_endpoint", url.into()),
        ("ske_custom_endpoint", url.into()),
    ]))
}

async fn configured_server(url: &str) -> GrpcProviderServer<StackitProvider> {
    let server = GrpcProviderServer::new(StackitProvider::new());
    let response = server
        .configure_provider(Request::new(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: wire(&provider_config(url)),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    server
}

fn affinity_group(name: &str, group_id: Dynamic) -> DynamicValue {
    DynamicValue::new(Dynamic::object([
        ("id", Dynamic::Null),
        ("project_id", PROJECT_ID.into()),
        ("region", Dynamic::Null),
        ("affinity_group_id", group_id),
        ("name", name.into()),
        ("policy", "soft-affinity".into()),
        ("members", Dynamic::Null),
    ]))
}

#[tokio::test]
async fn schema_lists_every_type() {
    let server = GrpcProviderServer::new(StackitProvider::new());

    let response = server
        .get_provider_schema(Request::new(proto::get_provider_schema::Request {}))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.resource_schemas.len(), 7);
    assert!(response.resource_schemas.contains_key("stackit_ske_cluster"));
    assert_eq!(response.data_source_schemas.len(), 4);
    assert!(response.data_source_schemas.contains_key("stackit_machine_type"));
}

#[tokio::test]
async fn affinity_group_create_and_replace_plan() {
    let mut api = Server::new_async().await;
    let create = api
        .mock(
            "POST",
            format!("/v2/projects/{}/regions/eu01/affinity-groups", PROJECT_ID).as_str(),
        )
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "name": "group",
            "policy": "soft-affinity"
        })))
        .with_body(format!(
            r#"{{"id":"{}","name":"group","policy":"soft-affinity","members":[]}}"#,
            GROUP_ID
        ))
        .create_async()
        .await;

    let server = configured_server(&api.url()).await;
    let config = affinity_group("group", Dynamic::Null);

    let plan = server
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "stackit_affinity_group".to_string(),
            prior_state: wire(&DynamicValue::null()),
            proposed_new_state: wire(&config),
            config: wire(&config),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);

    let planned = unwire(plan.planned_state.clone());
    assert_eq!(
        planned.optional_string(&AttributePath::new("region")).as_deref(),
        Some("eu01")
    );
    assert!(planned
        .get(&AttributePath::new("affinity_group_id"))
        .unwrap()
        .is_unknown());

    let applied = server
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "stackit_affinity_group".to_string(),
            prior_state: wire(&DynamicValue::null()),
            planned_state: plan.planned_state,
            config: wire(&config),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(applied.diagnostics.is_empty(), "{:?}", applied.diagnostics);
    create.assert_async().await;

    let state = unwire(applied.new_state);
    assert_eq!(
        state.optional_string(&AttributePath::new("id")),
        Some(format!("{},eu01,{}", PROJECT_ID, GROUP_ID))
    );
    assert_eq!(
        state.optional_string_list(&AttributePath::new("members")),
        Some(vec![])
    );

    let renamed = affinity_group("renamed", Dynamic::Null);
    let mut proposed = state.clone();
    proposed.set(&AttributePath::new("name"), "renamed").unwrap();
    let replan = server
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "stackit_affinity_group".to_string(),
            prior_state: wire(&state),
            proposed_new_state: wire(&proposed),
            config: wire(&renamed),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(!replan.requires_replace.is_empty());
}

#[tokio::test]
async fn routing_table_import_requires_beta_opt_in() {
    let api = Server::new_async().await;
    let server = configured_server(&api.url()).await;

    let imported = server
        .import_resource_state(Request::new(proto::import_resource_state::Request {
            type_name: "stackit_routing_table".to_string(),
            id: "org,na,eu01,rtid".to_string(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    // Configuring a beta resource without the opt-in fails before any API call
    assert!(imported
        .diagnostics
        .iter()
        .any(|d| d.summary.contains("beta")));
}

#[tokio::test]
async fn machine_type_data_source_picks_first_match() {
    let mut api = Server::new_async().await;
    api.mock(
        "GET",
        format!("/v2/projects/{}/regions/eu01/machine-types", PROJECT_ID).as_str(),
    )
    .with_body(
        r#"{"items":[
            {"name":"c1.2","vcpus":2,"ram":4096,"disk":20},
            {"name":"c1.4","vcpus":4,"ram":8192,"disk":20},
            {"name":"g1.4","vcpus":4,"ram":16384,"disk":20}
        ]}"#,
    )
    .create_async()
    .await;

    let server = configured_server(&api.url()).await;
    let config = DynamicValue::new(Dynamic::object([
        ("id", Dynamic::Null),
        ("project_id", PROJECT_ID.into()),
        ("region", Dynamic::Null),
        ("name_regex", r"^c1\.".into()),
        ("min_vcpus", 4i64.into()),
        ("min_ram", Dynamic::Null),
        ("sort_ascending", true.into()),
        ("name", Dynamic::Null),
        ("description", Dynamic::Null),
        ("vcpus", Dynamic::Null),
        ("ram", Dynamic::Null),
        ("disk", Dynamic::Null),
        ("extra_specs", Dynamic::Null),
    ]));

    let response = server
        .read_data_source(Request::new(proto::read_data_source::Request {
            type_name: "stackit_machine_type".to_string(),
            config: wire(&config),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    let state = unwire(response.state);
    assert_eq!(
        state.optional_string(&AttributePath::new("name")).as_deref(),
        Some("c1.4")
    );
    assert_eq!(state.optional_int(&AttributePath::new("ram")), Some(8192));
}

#[tokio::test]
async fn data_source_reports_missing_object() {
    let mut api = Server::new_async().await;
    api.mock(
        "GET",
        format!("/v2/projects/{}/regions/eu01/affinity-groups/{}", PROJECT_ID, GROUP_ID).as_str(),
    )
    .with_status(404)
    .with_body(r#"{"message":"not found"}"#)
    .create_async()
    .await;

    let server = configured_server(&api.url()).await;
    let response = server
        .read_data_source(Request::new(proto::read_data_source::Request {
            type_name: "stackit_affinity_group".to_string(),
            config: wire(&affinity_group("group", GROUP_ID.into())),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].summary, "affinity group not found");
}
