//! SKE cluster resource
//!
//! Creating and updating a cluster is the same idempotent PUT. The Kubernetes
//! and machine image versions are picked from the region's provider options,
//! starting at the configured minimum and never going below what the cluster
//! already runs.

use crate::api::ske::clusters::{
    AutoUpdate, Cluster, ClusterPayload, Hibernation, HibernationSchedule, Image, Kubernetes, Machine,
    Maintenance, Nodepool, ProviderOptions, TimeWindow, VersionInfo, Volume, STATE_UNHEALTHY,
};
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{self, build_internal_id, error_diagnostic, map_labels, reconcile_string_lists};
use async_trait::async_trait;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::*;
use tfplug::schema::{AttributeBuilder, AttributeType, ObjectNestingMode, Schema, SchemaBuilder};
use tfplug::validator::{
    ListLengthValidator, NumberRangeValidator, StringLengthValidator, StringPatternValidator, UuidValidator,
};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_ske_cluster";
const ID_FIELDS: &[&str] = &["project_id", "region", "name"];

pub const DEFAULT_OS_NAME: &str = "flatcar";
pub const DEFAULT_VOLUME_TYPE: &str = "storage_premium_perf1";
pub const DEFAULT_VOLUME_SIZE: i64 = 20;

const CREATE_TIMEOUT: Duration = Duration::from_secs(90 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(45 * 60);

/// The date part the API puts in front of maintenance window times
const TIME_WINDOW_DATE: &str = "0000-01-01T";

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?$").expect("version pattern is valid"));
static TIME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}:\d{2}:\d{2}(Z|[+-]\d{2}:\d{2})$").expect("time pattern is valid")
});
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("name pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePoolModel {
    pub name: String,
    pub machine_type: String,
    pub minimum: i64,
    pub maximum: i64,
    pub max_surge: Option<i64>,
    pub max_unavailable: Option<i64>,
    pub os_name: Option<String>,
    pub os_version_min: Option<String>,
    pub os_version_used: Option<String>,
    pub volume_type: Option<String>,
    pub volume_size: Option<i64>,
    pub availability_zones: Vec<String>,
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceModel {
    pub enable_kubernetes_version_updates: bool,
    pub enable_machine_image_version_updates: bool,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HibernationModel {
    pub start: String,
    pub end: String,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub project_id: String,
    pub region: Option<String>,
    pub name: String,
    pub kubernetes_version_min: Option<String>,
    pub kubernetes_version_used: Option<String>,
    pub node_pools: Vec<NodePoolModel>,
    pub maintenance: Option<MaintenanceModel>,
    pub hibernations: Option<Vec<HibernationModel>>,
    pub egress_address_ranges: Option<Vec<String>>,
}

/// Typed access to the attributes of a nested object
struct Object<'a>(&'a HashMap<String, Dynamic>);

impl<'a> Object<'a> {
    fn of(value: &'a Dynamic) -> Option<Self> {
        value.as_map().map(Object)
    }

    fn string(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(Dynamic::as_string).map(str::to_string)
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Dynamic::as_number).map(|n| n as i64)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Dynamic::as_bool)
    }

    fn strings(&self, key: &str) -> Option<Vec<String>> {
        self.0.get(key).and_then(Dynamic::as_list).map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_string().map(str::to_string))
                .collect()
        })
    }

    fn string_map(&self, key: &str) -> Option<HashMap<String, String>> {
        self.0.get(key).and_then(Dynamic::as_map).map(|entries| {
            entries
                .iter()
                .filter_map(|(k, v)| v.as_string().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
    }
}

impl NodePoolModel {
    fn from_object(object: &Object) -> Self {
        Self {
            name: object.string("name").unwrap_or_default(),
            machine_type: object.string("machine_type").unwrap_or_default(),
            minimum: object.int("minimum").unwrap_or_default(),
            maximum: object.int("maximum").unwrap_or_default(),
            max_surge: object.int("max_surge"),
            max_unavailable: object.int("max_unavailable"),
            os_name: object.string("os_name"),
            os_version_min: object.string("os_version_min"),
            os_version_used: object.string("os_version_used"),
            volume_type: object.string("volume_type"),
            volume_size: object.int("volume_size"),
            availability_zones: object.strings("availability_zones").unwrap_or_default(),
            labels: object.string_map("labels"),
        }
    }

    fn to_dynamic(&self) -> Dynamic {
        Dynamic::object([
            ("name", self.name.clone().into()),
            ("machine_type", self.machine_type.clone().into()),
            ("minimum", self.minimum.into()),
            ("maximum", self.maximum.into()),
            ("max_surge", self.max_surge.into()),
            ("max_unavailable", self.max_unavailable.into()),
            ("os_name", self.os_name.clone().into()),
            ("os_version_min", self.os_version_min.clone().into()),
            ("os_version_used", self.os_version_used.clone().into()),
            ("volume_type", self.volume_type.clone().into()),
            ("volume_size", self.volume_size.into()),
            ("availability_zones", self.availability_zones.clone().into()),
            ("labels", self.labels.clone().into()),
        ])
    }
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let path = AttributePath::new;
        let get = |name: &str| value.optional_string(&path(name));

        let node_pools = value
            .get(&path("node_pools"))
            .and_then(Dynamic::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Object::of)
                    .map(|object| NodePoolModel::from_object(&object))
                    .collect()
            })
            .unwrap_or_default();

        let maintenance = value
            .get(&path("maintenance"))
            .and_then(Object::of)
            .map(|object| MaintenanceModel {
                enable_kubernetes_version_updates: object
                    .bool("enable_kubernetes_version_updates")
                    .unwrap_or_default(),
                enable_machine_image_version_updates: object
                    .bool("enable_machine_image_version_updates")
                    .unwrap_or_default(),
                start: object.string("start").unwrap_or_default(),
                end: object.string("end").unwrap_or_default(),
            });

        let hibernations = value
            .get(&path("hibernations"))
            .and_then(Dynamic::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Object::of)
                    .map(|object| HibernationModel {
                        start: object.string("start").unwrap_or_default(),
                        end: object.string("end").unwrap_or_default(),
                        timezone: object.string("timezone"),
                    })
                    .collect()
            });

        Self {
            id: get("id"),
            project_id: get("project_id").unwrap_or_default(),
            region: get("region"),
            name: get("name").unwrap_or_default(),
            kubernetes_version_min: get("kubernetes_version_min"),
            kubernetes_version_used: get("kubernetes_version_used"),
            node_pools,
            maintenance,
            hibernations,
            egress_address_ranges: value.optional_string_list(&path("egress_address_ranges")),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        let node_pools: Vec<Dynamic> = self.node_pools.iter().map(NodePoolModel::to_dynamic).collect();
        let maintenance = match &self.maintenance {
            Some(m) => Dynamic::object([
                ("enable_kubernetes_version_updates", m.enable_kubernetes_version_updates.into()),
                ("enable_machine_image_version_updates", m.enable_machine_image_version_updates.into()),
                ("start", m.start.clone().into()),
                ("end", m.end.clone().into()),
            ]),
            None => Dynamic::Null,
        };
        let hibernations = match &self.hibernations {
            Some(items) => Dynamic::List(
                items
                    .iter()
                    .map(|h| {
                        Dynamic::object([
                            ("start", h.start.clone().into()),
                            ("end", h.end.clone().into()),
                            ("timezone", h.timezone.clone().into()),
                        ])
                    })
                    .collect(),
            ),
            None => Dynamic::Null,
        };

        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("project_id", self.project_id.clone().into()),
            ("region", self.region.clone().into()),
            ("name", self.name.clone().into()),
            ("kubernetes_version_min", self.kubernetes_version_min.clone().into()),
            ("kubernetes_version_used", self.kubernetes_version_used.clone().into()),
            ("node_pools", Dynamic::List(node_pools)),
            ("maintenance", maintenance),
            ("hibernations", hibernations),
            ("egress_address_ranges", self.egress_address_ranges.clone().into()),
        ]))
    }
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    version
        .trim_start_matches('v')
        .split('.')
        .map(|part| part.parse().ok())
        .collect()
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    parse_version(a).cmp(&parse_version(b))
}

/// Picks the version to deploy.
///
/// A full `major.minor.patch` minimum is taken as is when offered, a
/// `major.minor` minimum resolves to the newest supported patch of that minor.
/// Without a minimum the newest supported version is used. A version currently
/// in use that is newer than the pick is kept, so that automatic updates are
/// never rolled back.
pub fn select_version(
    available: &[VersionInfo],
    minimum: Option<&str>,
    current: Option<&str>,
) -> Result<String, String> {
    let newest_supported = |matches: &dyn Fn(&str) -> bool| {
        available
            .iter()
            .filter(|v| v.is_supported() && matches(&v.version))
            .map(|v| v.version.as_str())
            .max_by(|a, b| compare_versions(a, b))
            .map(str::to_string)
    };

    let picked = match minimum {
        None => match current {
            Some(current) => return Ok(current.to_string()),
            None => newest_supported(&|_| true).ok_or("no supported version available")?,
        },
        Some(minimum) => {
            let parts = parse_version(minimum).ok_or_else(|| format!("invalid version {:?}", minimum))?;
            if parts.len() >= 3 {
                available
                    .iter()
                    .find(|v| v.version == minimum)
                    .map(|v| v.version.clone())
                    .ok_or_else(|| format!("version {} is not available", minimum))?
            } else {
                let prefix = format!("{}.", minimum);
                newest_supported(&|version| version.starts_with(&prefix))
                    .ok_or_else(|| format!("no supported version matches {}", minimum))?
            }
        }
    };

    match current {
        Some(current) if compare_versions(current, &picked) == Ordering::Greater => Ok(current.to_string()),
        _ => Ok(picked),
    }
}

fn to_api_time(time: &str) -> String {
    format!("{}{}", TIME_WINDOW_DATE, time)
}

fn from_api_time(time: &str) -> String {
    match time.split_once('T') {
        Some((_, time)) => time.to_string(),
        None => time.to_string(),
    }
}

/// Builds the PUT body, with versions already resolved into the model
pub fn to_payload(model: &Model) -> Result<ClusterPayload, String> {
    let version = model
        .kubernetes_version_used
        .clone()
        .ok_or("kubernetes version is not resolved")?;

    let nodepools = model
        .node_pools
        .iter()
        .map(|pool| {
            Ok(Nodepool {
                name: pool.name.clone(),
                machine: Machine {
                    machine_type: pool.machine_type.clone(),
                    image: Image {
                        name: pool.os_name.clone().unwrap_or_else(|| DEFAULT_OS_NAME.to_string()),
                        version: pool
                            .os_version_used
                            .clone()
                            .ok_or_else(|| format!("os version of node pool {} is not resolved", pool.name))?,
                    },
                },
                minimum: pool.minimum,
                maximum: pool.maximum,
                max_surge: pool.max_surge,
                max_unavailable: pool.max_unavailable,
                volume: Volume {
                    volume_type: Some(pool.volume_type.clone().unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_string())),
                    size: pool.volume_size.unwrap_or(DEFAULT_VOLUME_SIZE),
                },
                availability_zones: pool.availability_zones.clone(),
                labels: pool.labels.clone(),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    let maintenance = model.maintenance.as_ref().map(|m| Maintenance {
        auto_update: AutoUpdate {
            kubernetes_version: m.enable_kubernetes_version_updates,
            machine_image_version: m.enable_machine_image_version_updates,
        },
        time_window: TimeWindow {
            start: to_api_time(&m.start),
            end: to_api_time(&m.end),
        },
    });

    let hibernation = model.hibernations.as_ref().map(|items| Hibernation {
        schedules: items
            .iter()
            .map(|h| HibernationSchedule {
                start: h.start.clone(),
                end: h.end.clone(),
                timezone: h.timezone.clone(),
            })
            .collect(),
    });

    Ok(ClusterPayload {
        kubernetes: Kubernetes { version },
        nodepools,
        maintenance,
        hibernation,
    })
}

/// Resolves the Kubernetes version and every node pool's image version.
/// `prior` is the state before this change, null on create.
pub fn resolve_versions(options: &ProviderOptions, model: &mut Model, prior: &Model) -> Result<(), String> {
    model.kubernetes_version_used = Some(
        select_version(
            &options.kubernetes_versions,
            model.kubernetes_version_min.as_deref(),
            prior.kubernetes_version_used.as_deref(),
        )
        .map_err(|e| format!("Kubernetes version: {}", e))?,
    );

    for pool in &mut model.node_pools {
        let os_name = pool.os_name.clone().unwrap_or_else(|| DEFAULT_OS_NAME.to_string());
        let image = options
            .machine_images
            .iter()
            .find(|image| image.name == os_name)
            .ok_or_else(|| format!("machine image {} is not available", os_name))?;
        let current = prior
            .node_pools
            .iter()
            .find(|p| p.name == pool.name && p.os_name.as_deref().unwrap_or(DEFAULT_OS_NAME) == os_name)
            .and_then(|p| p.os_version_used.clone());

        pool.os_version_used = Some(
            select_version(&image.versions, pool.os_version_min.as_deref(), current.as_deref())
                .map_err(|e| format!("node pool {}: {}", pool.name, e))?,
        );
    }
    Ok(())
}

pub fn map_fields(cluster: &Cluster, model: &mut Model, region: &str) -> Result<(), String> {
    let name = cluster
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| model.name.clone());
    if name.is_empty() {
        return Err("cluster name not present".to_string());
    }

    model.id = Some(build_internal_id(&[&model.project_id, region, &name]));
    model.region = Some(region.to_string());
    model.name = name;
    model.kubernetes_version_used = cluster.kubernetes.as_ref().map(|k| k.version.clone());

    let prior_pools = std::mem::take(&mut model.node_pools);
    model.node_pools = cluster
        .nodepools
        .iter()
        .flatten()
        .map(|pool| {
            let prior = prior_pools.iter().find(|p| p.name == pool.name);
            NodePoolModel {
                name: pool.name.clone(),
                machine_type: pool.machine.machine_type.clone(),
                minimum: pool.minimum,
                maximum: pool.maximum,
                max_surge: pool.max_surge,
                max_unavailable: pool.max_unavailable,
                os_name: Some(pool.machine.image.name.clone()),
                os_version_min: prior.and_then(|p| p.os_version_min.clone()),
                os_version_used: Some(pool.machine.image.version.clone()),
                volume_type: pool.volume.volume_type.clone(),
                volume_size: Some(pool.volume.size),
                availability_zones: reconcile_string_lists(
                    prior.map(|p| p.availability_zones.as_slice()).unwrap_or_default(),
                    &pool.availability_zones,
                ),
                labels: map_labels(pool.labels.as_ref(), prior.and_then(|p| p.labels.as_ref())),
            }
        })
        .collect();

    model.maintenance = cluster.maintenance.as_ref().map(|m| MaintenanceModel {
        enable_kubernetes_version_updates: m.auto_update.kubernetes_version,
        enable_machine_image_version_updates: m.auto_update.machine_image_version,
        start: from_api_time(&m.time_window.start),
        end: from_api_time(&m.time_window.end),
    });

    let schedules = cluster
        .hibernation
        .as_ref()
        .map(|h| h.schedules.as_slice())
        .unwrap_or_default();
    model.hibernations = if schedules.is_empty() {
        model.hibernations.as_ref().map(|_| vec![])
    } else {
        Some(
            schedules
                .iter()
                .map(|s| HibernationModel {
                    start: s.start.clone(),
                    end: s.end.clone(),
                    timezone: s.timezone.clone(),
                })
                .collect(),
        )
    };

    model.egress_address_ranges = Some(
        cluster
            .status
            .as_ref()
            .and_then(|s| s.egress_address_ranges.clone())
            .unwrap_or_default(),
    );
    Ok(())
}

/// Carries computed values of the prior state into the plan where nothing
/// that drives them has changed
pub fn keep_computed(prior: &DynamicValue, planned: &mut DynamicValue) {
    let Some(prior_object) = prior.value.as_map() else {
        return;
    };
    let Dynamic::Map(planned_object) = &mut planned.value else {
        return;
    };

    if same("kubernetes_version_min", prior_object, planned_object) {
        copy_if_unknown(prior_object, planned_object, "kubernetes_version_used");
    }

    let prior_pools = prior_object
        .get("node_pools")
        .and_then(Dynamic::as_list)
        .unwrap_or_default();
    let Some(Dynamic::List(planned_pools)) = planned_object.get_mut("node_pools") else {
        return;
    };

    for planned_pool in planned_pools.iter_mut() {
        let Dynamic::Map(planned_pool) = planned_pool else {
            continue;
        };
        let prior_pool = prior_pools
            .iter()
            .filter_map(Dynamic::as_map)
            .find(|p| same("name", p, planned_pool));
        let Some(prior_pool) = prior_pool else {
            continue;
        };

        for key in ["max_surge", "max_unavailable", "os_name", "volume_type", "volume_size"] {
            copy_if_unknown(prior_pool, planned_pool, key);
        }
        if same("os_name", prior_pool, planned_pool) && same("os_version_min", prior_pool, planned_pool) {
            copy_if_unknown(prior_pool, planned_pool, "os_version_used");
        }
    }
}

fn same(key: &str, a: &HashMap<String, Dynamic>, b: &HashMap<String, Dynamic>) -> bool {
    a.get(key).unwrap_or(&Dynamic::Null) == b.get(key).unwrap_or(&Dynamic::Null)
}

fn copy_if_unknown(prior: &HashMap<String, Dynamic>, planned: &mut HashMap<String, Dynamic>, key: &str) {
    if planned.get(key).is_some_and(Dynamic::is_unknown) {
        if let Some(value) = prior.get(key) {
            planned.insert(key.to_string(), value.clone());
        }
    }
}

fn node_pool_attributes() -> Vec<tfplug::schema::Attribute> {
    vec![
        AttributeBuilder::new("name", AttributeType::String)
            .description("Specifies the name of the node pool.")
            .required()
            .validator(StringLengthValidator::between(1, 15))
            .build(),
        AttributeBuilder::new("machine_type", AttributeType::String)
            .description("The machine type.")
            .required()
            .build(),
        AttributeBuilder::new("minimum", AttributeType::Number)
            .description("Minimum number of nodes in the pool.")
            .required()
            .validator(NumberRangeValidator::between(1.0, 1000.0))
            .build(),
        AttributeBuilder::new("maximum", AttributeType::Number)
            .description("Maximum number of nodes in the pool.")
            .required()
            .validator(NumberRangeValidator::between(1.0, 1000.0))
            .build(),
        AttributeBuilder::new("max_surge", AttributeType::Number)
            .description("Maximum number of additional VMs that are created during an update.")
            .optional()
            .computed()
            .build(),
        AttributeBuilder::new("max_unavailable", AttributeType::Number)
            .description("Maximum number of VMs that can be unavailable during an update.")
            .optional()
            .computed()
            .build(),
        AttributeBuilder::new("os_name", AttributeType::String)
            .description("The name of the OS image. Defaults to `flatcar`.")
            .optional()
            .computed()
            .build(),
        AttributeBuilder::new("os_version_min", AttributeType::String)
            .description("The minimum OS image version. If unset, the latest supported version of the OS image is used.")
            .optional()
            .build(),
        AttributeBuilder::new("os_version_used", AttributeType::String)
            .description("Full OS image version used.")
            .computed()
            .build(),
        AttributeBuilder::new("volume_type", AttributeType::String)
            .description("Specifies the volume type. Defaults to `storage_premium_perf1`.")
            .optional()
            .computed()
            .build(),
        AttributeBuilder::new("volume_size", AttributeType::Number)
            .description("The volume size in GB. Defaults to `20`.")
            .optional()
            .computed()
            .build(),
        AttributeBuilder::new("availability_zones", AttributeType::list(AttributeType::String))
            .description("Specify a list of availability zones. E.g. `eu01-m`")
            .required()
            .build(),
        AttributeBuilder::new("labels", AttributeType::map(AttributeType::String))
            .description("Labels to add to each node.")
            .optional()
            .build(),
    ]
}

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("SKE Cluster Resource schema. Must have a `region` specified in the provider configuration.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal resource ID. It is structured as \"`project_id`,`region`,`name`\".")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("project_id", AttributeType::String)
                .description("STACKIT project ID to which the cluster is associated.")
                .required()
                .validator(UuidValidator)
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("region", AttributeType::String)
                .description("The resource region. If not defined, the provider region is used.")
                .optional()
                .computed()
                .plan_modifier(RequiresReplace)
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .description("The cluster name.")
                .required()
                .validator(StringLengthValidator::between(1, 11))
                .validator(StringPatternValidator::new(
                    NAME_REGEX.clone(),
                    "lowercase alphanumerics and dashes",
                ))
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("kubernetes_version_min", AttributeType::String)
                .description("The minimum Kubernetes version, `major.minor` or `major.minor.patch`. If unset, the latest supported Kubernetes version is used.")
                .optional()
                .validator(StringPatternValidator::new(VERSION_REGEX.clone(), "a version like 1.31 or 1.31.2"))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("kubernetes_version_used", AttributeType::String)
                .description("Full Kubernetes version used. For example, if 1.22 was set in `kubernetes_version_min`, this value may result to 1.22.15.")
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::nested("node_pools", ObjectNestingMode::List, node_pool_attributes())
                .description("One or more `node_pool` block as defined below.")
                .required()
                .validator(ListLengthValidator::at_least(1))
                .build(),
        )
        .attribute(
            AttributeBuilder::nested(
                "maintenance",
                ObjectNestingMode::Single,
                vec![
                    AttributeBuilder::new("enable_kubernetes_version_updates", AttributeType::Bool)
                        .description("Flag to enable/disable auto-updates of the Kubernetes version.")
                        .required()
                        .build(),
                    AttributeBuilder::new("enable_machine_image_version_updates", AttributeType::Bool)
                        .description("Flag to enable/disable auto-updates of the OS image version.")
                        .required()
                        .build(),
                    AttributeBuilder::new("start", AttributeType::String)
                        .description("Time for maintenance window start. E.g. `01:23:45Z`, `05:00:00+02:00`.")
                        .required()
                        .validator(StringPatternValidator::new(TIME_REGEX.clone(), "a time like 01:23:45Z"))
                        .build(),
                    AttributeBuilder::new("end", AttributeType::String)
                        .description("Time for maintenance window end. E.g. `01:23:45Z`, `05:00:00+02:00`.")
                        .required()
                        .validator(StringPatternValidator::new(TIME_REGEX.clone(), "a time like 01:23:45Z"))
                        .build(),
                ],
            )
            .description("A single maintenance block as defined below.")
            .optional()
            .computed()
            .plan_modifier(UseStateForUnknown)
            .build(),
        )
        .attribute(
            AttributeBuilder::nested(
                "hibernations",
                ObjectNestingMode::List,
                vec![
                    AttributeBuilder::new("start", AttributeType::String)
                        .description("Start time of cluster hibernation in crontab syntax. E.g. `0 18 * * *` for starting everyday at 6pm.")
                        .required()
                        .build(),
                    AttributeBuilder::new("end", AttributeType::String)
                        .description("End time of hibernation in crontab syntax. E.g. `0 8 * * *` for waking up the cluster at 8am.")
                        .required()
                        .build(),
                    AttributeBuilder::new("timezone", AttributeType::String)
                        .description("Timezone name corresponding to a file in the IANA Time Zone database. i.e. `Europe/Berlin`.")
                        .optional()
                        .computed()
                        .build(),
                ],
            )
            .description("One or more hibernation block as defined below.")
            .optional()
            .build(),
        )
        .attribute(
            AttributeBuilder::new("egress_address_ranges", AttributeType::list(AttributeType::String))
                .description("The outgoing network ranges (in CIDR notation) of traffic originating from workload on the cluster.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .build()
}

#[derive(Default)]
pub struct SkeClusterResource {
    provider_data: Option<StackitProviderData>,
}

impl SkeClusterResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<&StackitProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(super::not_configured)
    }

    /// Resolves versions, sends the PUT and waits for the cluster to settle.
    /// Returns the warnings to surface on success.
    async fn create_or_update(
        &self,
        ctx: &Context,
        data: &StackitProviderData,
        model: &mut Model,
        prior: &Model,
        region: &str,
    ) -> Result<Vec<Diagnostic>, Failure> {
        let api = data.client.ske().clusters();

        let options = api
            .provider_options(region)
            .await
            .map_err(|e| Failure::before_put(format!("Loading provider options: {}", e)))?;
        resolve_versions(&options, model, prior).map_err(Failure::before_put)?;
        let payload =
            to_payload(model).map_err(|e| Failure::before_put(format!("Creating API payload: {}", e)))?;

        api.create_or_update(&model.project_id, region, &model.name, &payload)
            .await
            .map_err(|e| Failure::before_put(e.to_string()))?;
        tracing::info!(cluster = %model.name, version = ?model.kubernetes_version_used, "cluster put, waiting");

        let cluster = api
            .wait_until_ready(ctx, &data.wait_config(CREATE_TIMEOUT), &model.project_id, region, &model.name)
            .await
            .map_err(|e| Failure::after_put(format!("Cluster creation waiting: {}", e)))?;
        map_fields(&cluster, model, region).map_err(Failure::after_put)?;

        let mut warnings = vec![];
        if cluster.aggregated_state() == STATE_UNHEALTHY {
            tracing::warn!(cluster = %model.name, "cluster is unhealthy");
            warnings.push(Diagnostic::warning(
                "Cluster is unhealthy",
                format!(
                    "Cluster {} was created or updated but is in state {}. Check the cluster status for details.",
                    model.name, STATE_UNHEALTHY
                ),
            ));
        }
        Ok(warnings)
    }
}

/// A failed create or update, `applied` once the API accepted the PUT
struct Failure {
    message: String,
    applied: bool,
}

impl Failure {
    fn before_put(message: String) -> Self {
        Self { message, applied: false }
    }

    fn after_put(message: String) -> Self {
        Self { message, applied: true }
    }
}

#[async_trait]
impl Resource for SkeClusterResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(&self, _ctx: Context, request: ValidateResourceConfigRequest) -> ValidateResourceConfigResponse {
        let model = Model::from_value(&request.config);
        let diagnostics = model
            .node_pools
            .iter()
            .enumerate()
            .filter(|(_, pool)| pool.maximum > 0 && pool.minimum > pool.maximum)
            .map(|(index, pool)| {
                Diagnostic::error(
                    "Invalid node pool",
                    format!("Node pool {}: minimum must not exceed maximum", pool.name),
                )
                .with_attribute(AttributePath::new("node_pools").index(index as i64).attribute("minimum"))
            })
            .collect();
        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics: vec![diag],
                }
            }
        };

        let mut model = Model::from_value(&request.planned_state);
        let region = data.region_with_override(model.region.clone());

        match self.create_or_update(&ctx, data, &mut model, &Model::default(), &region).await {
            Ok(warnings) => {
                tracing::info!(id = ?model.id, "ske cluster created");
                CreateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: warnings,
                }
            }
            Err(failure) => {
                // Once the PUT went through the cluster exists, keep it in
                // state so that it is tainted rather than orphaned
                let new_state = if failure.applied {
                    model.id = Some(build_internal_id(&[&model.project_id, &region, &model.name]));
                    model.region = Some(region.clone());
                    model.to_value()
                } else {
                    DynamicValue::null()
                };
                CreateResourceResponse {
                    new_state,
                    private: vec![],
                    diagnostics: vec![error_diagnostic("Error creating cluster", failure.message)],
                }
            }
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                    private: request.private,
                }
            }
        };

        let mut model = Model::from_value(&request.current_state);
        let region = data.region_with_override(model.region.clone());

        let result = data
            .client
            .ske()
            .clusters()
            .get(&model.project_id, &region, &model.name)
            .await;

        let (new_state, diagnostics) = match result {
            Ok(cluster) => match map_fields(&cluster, &mut model, &region) {
                Ok(()) => (Some(model.to_value()), vec![]),
                Err(e) => (
                    Some(request.current_state),
                    vec![error_diagnostic("Error reading cluster", e)],
                ),
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(cluster = %model.name, "cluster not found, removing from state");
                (None, vec![])
            }
            Err(e) => (
                Some(request.current_state),
                vec![error_diagnostic("Error reading cluster", e)],
            ),
        };

        ReadResourceResponse {
            new_state,
            diagnostics,
            private: request.private,
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics: vec![diag],
                }
            }
        };

        let prior = Model::from_value(&request.prior_state);
        let mut model = Model::from_value(&request.planned_state);
        let region = data.region_with_override(model.region.clone());

        match self.create_or_update(&ctx, data, &mut model, &prior, &region).await {
            Ok(warnings) => {
                tracing::info!(id = ?model.id, "ske cluster updated");
                UpdateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: warnings,
                }
            }
            Err(failure) => UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![error_diagnostic("Error updating cluster", failure.message)],
            },
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };

        let model = Model::from_value(&request.prior_state);
        let region = data.region_with_override(model.region.clone());
        let api = data.client.ske().clusters();

        let result = match api.delete(&model.project_id, &region, &model.name).await {
            Ok(()) => api
                .wait_until_deleted(&ctx, &data.wait_config(DELETE_TIMEOUT), &model.project_id, &region, &model.name)
                .await
                .map_err(|e| format!("Cluster deletion waiting: {}", e)),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.to_string()),
        };

        let mut diagnostics = vec![];
        match result {
            Ok(()) => tracing::info!(cluster = %model.name, "ske cluster deleted"),
            Err(e) => diagnostics.push(error_diagnostic("Error deleting cluster", e)),
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_modify_plan(&self) -> Option<&dyn ResourceWithModifyPlan> {
        Some(self)
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for SkeClusterResource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureResourceRequest) -> ConfigureResourceResponse {
        match provider_data::from_any(request.provider_data) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureResourceResponse { diagnostics: vec![] }
            }
            Err(diag) => ConfigureResourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[async_trait]
impl ResourceWithModifyPlan for SkeClusterResource {
    async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
        let mut response = ModifyPlanResponse {
            planned_state: request.planned_state.clone(),
            requires_replace: vec![],
            diagnostics: vec![],
        };
        keep_computed(&request.prior_state, &mut response.planned_state);
        if let Some(data) = &self.provider_data {
            utils::adapt_region(&request, &data.default_region, &mut response);
        }
        response
    }
}

#[async_trait]
impl ResourceWithImportState for SkeClusterResource {
    async fn import_state(&self, _ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        utils::import_composite_id(&request, ID_FIELDS, &mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ske::clusters::{ClusterStatus, MachineImage};
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    fn version(version: &str, state: &str) -> VersionInfo {
        VersionInfo {
            version: version.to_string(),
            state: Some(state.to_string()),
        }
    }

    fn versions() -> Vec<VersionInfo> {
        vec![
            version("1.30.6", "supported"),
            version("1.31.1", "supported"),
            version("1.31.4", "supported"),
            version("1.32.0", "preview"),
            version("1.29.10", "deprecated"),
        ]
    }

    fn pool() -> NodePoolModel {
        NodePoolModel {
            name: "np".to_string(),
            machine_type: "c1.2".to_string(),
            minimum: 1,
            maximum: 3,
            availability_zones: vec!["eu01-1".to_string()],
            ..Default::default()
        }
    }

    fn planned() -> Model {
        Model {
            project_id: "pid".to_string(),
            name: "cl".to_string(),
            kubernetes_version_min: Some("1.31".to_string()),
            node_pools: vec![pool()],
            ..Default::default()
        }
    }

    fn options() -> ProviderOptions {
        ProviderOptions {
            kubernetes_versions: versions(),
            machine_images: vec![MachineImage {
                name: "flatcar".to_string(),
                versions: vec![version("3815.2.5", "supported"), version("4081.2.0", "supported")],
            }],
        }
    }

    #[test]
    fn select_version_picks_newest_patch_of_minor() {
        assert_eq!(select_version(&versions(), Some("1.31"), None).unwrap(), "1.31.4");
    }

    #[test]
    fn select_version_without_minimum() {
        assert_eq!(select_version(&versions(), None, None).unwrap(), "1.31.4");
        assert_eq!(select_version(&versions(), None, Some("1.30.6")).unwrap(), "1.30.6");
    }

    #[test]
    fn select_version_exact_minimum_may_be_any_state() {
        assert_eq!(select_version(&versions(), Some("1.29.10"), None).unwrap(), "1.29.10");
        assert!(select_version(&versions(), Some("1.28.1"), None).is_err());
    }

    #[test]
    fn select_version_never_downgrades() {
        assert_eq!(
            select_version(&versions(), Some("1.30"), Some("1.31.1")).unwrap(),
            "1.31.1"
        );
    }

    #[test]
    fn select_version_compares_numerically() {
        let available = vec![version("1.9.0", "supported"), version("1.10.0", "supported")];
        assert_eq!(select_version(&available, None, None).unwrap(), "1.10.0");
    }

    #[test]
    fn resolve_versions_keeps_used_os_version() {
        let mut prior = planned();
        prior.node_pools[0].os_version_used = Some("4081.2.0".to_string());
        let mut model = planned();
        model.node_pools[0].os_version_min = Some("3815.2.5".to_string());

        resolve_versions(&options(), &mut model, &prior).unwrap();

        assert_eq!(model.kubernetes_version_used.as_deref(), Some("1.31.4"));
        assert_eq!(model.node_pools[0].os_version_used.as_deref(), Some("4081.2.0"));
    }

    #[test]
    fn payload_fills_node_pool_defaults() {
        let mut model = planned();
        resolve_versions(&options(), &mut model, &Model::default()).unwrap();
        model.maintenance = Some(MaintenanceModel {
            enable_kubernetes_version_updates: true,
            enable_machine_image_version_updates: false,
            start: "01:00:00Z".to_string(),
            end: "02:00:00Z".to_string(),
        });

        let payload = to_payload(&model).unwrap();

        let pool = &payload.nodepools[0];
        assert_eq!(pool.machine.image.name, DEFAULT_OS_NAME);
        assert_eq!(pool.machine.image.version, "4081.2.0");
        assert_eq!(pool.volume.size, DEFAULT_VOLUME_SIZE);
        assert_eq!(pool.volume.volume_type.as_deref(), Some(DEFAULT_VOLUME_TYPE));
        assert_eq!(
            payload.maintenance.unwrap().time_window.start,
            "0000-01-01T01:00:00Z"
        );
    }

    #[test]
    fn map_fields_keeps_configured_minimums() {
        let mut model = planned();
        model.node_pools[0].os_version_min = Some("3815".to_string());
        let cluster = Cluster {
            name: Some("cl".to_string()),
            kubernetes: Some(Kubernetes {
                version: "1.31.4".to_string(),
            }),
            nodepools: Some(vec![Nodepool {
                name: "np".to_string(),
                machine: Machine {
                    machine_type: "c1.2".to_string(),
                    image: Image {
                        name: "flatcar".to_string(),
                        version: "3815.2.5".to_string(),
                    },
                },
                minimum: 1,
                maximum: 3,
                volume: Volume {
                    volume_type: Some("storage_premium_perf1".to_string()),
                    size: 40,
                },
                availability_zones: vec!["eu01-1".to_string()],
                ..Default::default()
            }]),
            maintenance: Some(Maintenance {
                auto_update: AutoUpdate {
                    kubernetes_version: true,
                    machine_image_version: true,
                },
                time_window: TimeWindow {
                    start: "0000-01-01T01:00:00Z".to_string(),
                    end: "0000-01-01T02:00:00Z".to_string(),
                },
            }),
            hibernation: None,
            status: Some(ClusterStatus {
                aggregated: Some("STATE_HEALTHY".to_string()),
                egress_address_ranges: Some(vec!["192.0.2.0/32".to_string()]),
            }),
        };

        map_fields(&cluster, &mut model, "eu01").unwrap();

        assert_eq!(model.id.as_deref(), Some("pid,eu01,cl"));
        assert_eq!(model.kubernetes_version_min.as_deref(), Some("1.31"));
        assert_eq!(model.kubernetes_version_used.as_deref(), Some("1.31.4"));
        assert_eq!(model.node_pools[0].os_version_min.as_deref(), Some("3815"));
        assert_eq!(model.node_pools[0].volume_size, Some(40));
        assert_eq!(model.node_pools[0].labels, None);
        assert_eq!(model.maintenance.unwrap().start, "01:00:00Z");
        assert_eq!(model.hibernations, None);
        assert_eq!(model.egress_address_ranges, Some(vec!["192.0.2.0/32".to_string()]));
    }

    #[test]
    fn map_fields_keeps_configured_zone_order() {
        let mut model = planned();
        model.node_pools[0].availability_zones = vec!["eu01-2".to_string(), "eu01-1".to_string()];
        let cluster = Cluster {
            name: Some("cl".to_string()),
            nodepools: Some(vec![Nodepool {
                name: "np".to_string(),
                availability_zones: vec![
                    "eu01-1".to_string(),
                    "eu01-3".to_string(),
                    "eu01-2".to_string(),
                ],
                ..Default::default()
            }]),
            ..Default::default()
        };

        map_fields(&cluster, &mut model, "eu01").unwrap();

        assert_eq!(
            model.node_pools[0].availability_zones,
            vec!["eu01-2".to_string(), "eu01-1".to_string(), "eu01-3".to_string()]
        );

        let cluster = Cluster {
            name: Some("cl".to_string()),
            nodepools: Some(vec![Nodepool {
                name: "np".to_string(),
                availability_zones: vec!["eu01-1".to_string()],
                ..Default::default()
            }]),
            ..Default::default()
        };

        map_fields(&cluster, &mut model, "eu01").unwrap();

        assert_eq!(model.node_pools[0].availability_zones, vec!["eu01-1".to_string()]);
    }

    #[test]
    fn keep_computed_restores_versions_when_minimum_is_unchanged() {
        let mut prior = planned();
        prior.kubernetes_version_used = Some("1.31.4".to_string());
        prior.node_pools[0].os_name = Some("flatcar".to_string());
        prior.node_pools[0].os_version_used = Some("4081.2.0".to_string());
        prior.node_pools[0].volume_size = Some(20);

        let mut planned_value = prior.to_value();
        if let Dynamic::Map(object) = &mut planned_value.value {
            object.insert("kubernetes_version_used".to_string(), Dynamic::Unknown);
            if let Some(Dynamic::List(pools)) = object.get_mut("node_pools") {
                if let Some(Dynamic::Map(pool)) = pools.get_mut(0) {
                    pool.insert("os_version_used".to_string(), Dynamic::Unknown);
                    pool.insert("volume_size".to_string(), Dynamic::Unknown);
                    pool.insert("maximum".to_string(), Dynamic::Number(5.0));
                }
            }
        }

        keep_computed(&prior.to_value(), &mut planned_value);

        let model = Model::from_value(&planned_value);
        assert_eq!(model.kubernetes_version_used.as_deref(), Some("1.31.4"));
        assert_eq!(model.node_pools[0].os_version_used.as_deref(), Some("4081.2.0"));
        assert_eq!(model.node_pools[0].volume_size, Some(20));
        assert_eq!(model.node_pools[0].maximum, 5);
    }

    #[test]
    fn keep_computed_leaves_version_unknown_when_minimum_changes() {
        let mut prior = planned();
        prior.kubernetes_version_used = Some("1.31.4".to_string());
        let mut planned_value = prior.to_value();
        planned_value
            .set(&AttributePath::new("kubernetes_version_min"), "1.32")
            .unwrap();
        planned_value
            .set(&AttributePath::new("kubernetes_version_used"), Dynamic::Unknown)
            .unwrap();

        keep_computed(&prior.to_value(), &mut planned_value);

        assert!(planned_value
            .get(&AttributePath::new("kubernetes_version_used"))
            .unwrap()
            .is_unknown());
    }

    #[test]
    fn model_round_trips_through_state() {
        let mut model = planned();
        model.hibernations = Some(vec![HibernationModel {
            start: "0 18 * * *".to_string(),
            end: "0 8 * * *".to_string(),
            timezone: Some("Europe/Berlin".to_string()),
        }]);
        model.node_pools[0].labels = Some(HashMap::from([("a".to_string(), "b".to_string())]));
        assert_eq!(Model::from_value(&model.to_value()), model);
    }

    #[tokio::test]
    async fn create_puts_resolved_versions_and_warns_when_unhealthy() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/regions/eu01/provider-options")
            .with_body(
                r#"{"kubernetesVersions":[{"version":"1.31.4","state":"supported"}],
                    "machineImages":[{"name":"flatcar","versions":[{"version":"4081.2.0","state":"supported"}]}]}"#,
            )
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/v2/projects/pid/regions/eu01/clusters/cl")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "kubernetes": {"version": "1.31.4"}
            })))
            .with_body(r#"{"name":"cl"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v2/projects/pid/regions/eu01/clusters/cl")
            .with_body(
                r#"{"name":"cl","kubernetes":{"version":"1.31.4"},
                    "nodepools":[{"name":"np","machine":{"type":"c1.2","image":{"name":"flatcar","version":"4081.2.0"}},
                    "minimum":1,"maximum":3,"volume":{"type":"storage_premium_perf1","size":20},
                    "availabilityZones":["eu01-1"]}],
                    "status":{"aggregated":"STATE_UNHEALTHY"}}"#,
            )
            .create_async()
            .await;

        let resource = SkeClusterResource {
            provider_data: Some(
                StackitProviderData::new(create_test_client(&server.url()), "eu01".to_string(), false)
                    .with_wait_interval(Duration::from_millis(1), Duration::from_millis(5)),
            ),
        };
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    planned_state: planned().to_value(),
                    config: planned().to_value(),
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(!response.diagnostics[0].is_error());
        let state = Model::from_value(&response.new_state);
        assert_eq!(state.id.as_deref(), Some("pid,eu01,cl"));
        assert_eq!(state.egress_address_ranges, Some(vec![]));
        put.assert_async().await;
    }
}
