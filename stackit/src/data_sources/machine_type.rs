//! Machine type data source
//!
//! Picks one machine type of a project out of the region's catalogue. Filters
//! narrow the list, the remaining types are sorted by name and the first one
//! wins.

use super::{failed, unconfigured};
use crate::api::iaas::machine_types::MachineType;
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{build_internal_id, error_diagnostic};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
    ValidateDataSourceConfigRequest, ValidateDataSourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::{NumberRangeValidator, UuidValidator};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_machine_type";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub project_id: String,
    pub region: Option<String>,
    pub name_regex: Option<String>,
    pub min_vcpus: Option<i64>,
    pub min_ram: Option<i64>,
    pub sort_ascending: Option<bool>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub vcpus: Option<i64>,
    pub ram: Option<i64>,
    pub disk: Option<i64>,
    pub extra_specs: Option<HashMap<String, String>>,
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let path = AttributePath::new;
        Self {
            id: value.optional_string(&path("id")),
            project_id: value.optional_string(&path("project_id")).unwrap_or_default(),
            region: value.optional_string(&path("region")),
            name_regex: value.optional_string(&path("name_regex")),
            min_vcpus: value.optional_int(&path("min_vcpus")),
            min_ram: value.optional_int(&path("min_ram")),
            sort_ascending: value.optional_bool(&path("sort_ascending")),
            name: value.optional_string(&path("name")),
            description: value.optional_string(&path("description")),
            vcpus: value.optional_int(&path("vcpus")),
            ram: value.optional_int(&path("ram")),
            disk: value.optional_int(&path("disk")),
            extra_specs: value.optional_string_map(&path("extra_specs")),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("project_id", self.project_id.clone().into()),
            ("region", self.region.clone().into()),
            ("name_regex", self.name_regex.clone().into()),
            ("min_vcpus", self.min_vcpus.into()),
            ("min_ram", self.min_ram.into()),
            ("sort_ascending", self.sort_ascending.into()),
            ("name", self.name.clone().into()),
            ("description", self.description.clone().into()),
            ("vcpus", self.vcpus.into()),
            ("ram", self.ram.into()),
            ("disk", self.disk.into()),
            ("extra_specs", self.extra_specs.clone().into()),
        ]))
    }
}

/// Filter criteria taken from the configuration
#[derive(Debug, Default)]
pub struct Filter {
    pub name_regex: Option<Regex>,
    pub min_vcpus: Option<i64>,
    pub min_ram: Option<i64>,
    pub sort_ascending: bool,
}

impl Filter {
    pub fn from_model(model: &Model) -> Result<Self, regex::Error> {
        Ok(Self {
            name_regex: model.name_regex.as_deref().map(Regex::new).transpose()?,
            min_vcpus: model.min_vcpus,
            min_ram: model.min_ram,
            sort_ascending: model.sort_ascending.unwrap_or(false),
        })
    }

    fn matches(&self, machine_type: &MachineType) -> bool {
        let at_least = |value: Option<i64>, minimum: Option<i64>| match minimum {
            Some(minimum) => value.is_some_and(|v| v >= minimum),
            None => true,
        };

        self.name_regex
            .as_ref()
            .is_none_or(|regex| regex.is_match(&machine_type.name))
            && at_least(machine_type.vcpus, self.min_vcpus)
            && at_least(machine_type.ram, self.min_ram)
    }

    /// The first matching machine type in name order, descending unless
    /// `sort_ascending` is set
    pub fn select<'a>(&self, machine_types: &'a [MachineType]) -> Option<&'a MachineType> {
        let mut matching: Vec<&MachineType> = machine_types.iter().filter(|t| self.matches(t)).collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        if !self.sort_ascending {
            matching.reverse();
        }
        matching.into_iter().next()
    }
}

fn extra_spec_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn map_fields(machine_type: &MachineType, model: &mut Model, region: &str) {
    model.id = Some(build_internal_id(&[&model.project_id, region, &machine_type.name]));
    model.region = Some(region.to_string());
    model.name = Some(machine_type.name.clone());
    model.description = machine_type.description.clone();
    model.vcpus = machine_type.vcpus;
    model.ram = machine_type.ram;
    model.disk = machine_type.disk;
    model.extra_specs = Some(
        machine_type
            .extra_specs
            .iter()
            .flatten()
            .map(|(key, value)| (key.clone(), extra_spec_string(value)))
            .collect(),
    );
}

pub fn schema() -> Schema {
    let computed = |name: &str, kind: AttributeType, description: &str| {
        AttributeBuilder::new(name, kind)
            .description(description)
            .computed()
            .build()
    };

    SchemaBuilder::new()
        .description("Machine type data source. Selects a single machine type matching the given filters.")
        .attribute(computed(
            "id",
            AttributeType::String,
            "Terraform's internal data source ID. It is structured as \"`project_id`,`region`,`name`\".",
        ))
        .attribute(
            AttributeBuilder::new("project_id", AttributeType::String)
                .description("STACKIT project ID.")
                .required()
                .validator(UuidValidator)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("region", AttributeType::String)
                .description("The resource region. If not defined, the provider region is used.")
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name_regex", AttributeType::String)
                .description("Regular expression the machine type name must match, e.g. `^c1\\.`.")
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("min_vcpus", AttributeType::Number)
                .description("Minimum number of vCPUs.")
                .optional()
                .validator(NumberRangeValidator::at_least(1.0))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("min_ram", AttributeType::Number)
                .description("Minimum memory in MB.")
                .optional()
                .validator(NumberRangeValidator::at_least(1.0))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("sort_ascending", AttributeType::Bool)
                .description("Sort machine types by name ascending. Defaults to `false`, i.e. descending.")
                .optional()
                .build(),
        )
        .attribute(computed("name", AttributeType::String, "Name of the machine type, e.g. `c1.2`."))
        .attribute(computed("description", AttributeType::String, "Machine type description."))
        .attribute(computed("vcpus", AttributeType::Number, "Number of vCPUs."))
        .attribute(computed("ram", AttributeType::Number, "RAM in MB."))
        .attribute(computed("disk", AttributeType::Number, "Disk size in GB."))
        .attribute(computed(
            "extra_specs",
            AttributeType::map(AttributeType::String),
            "Extra specs, e.g. CPU type and overcommit ratio.",
        ))
        .build()
}

#[derive(Default)]
pub struct MachineTypeDataSource {
    provider_data: Option<StackitProviderData>,
}

#[async_trait]
impl DataSource for MachineTypeDataSource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: DataSourceSchemaRequest) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(&self, _ctx: Context, request: ValidateDataSourceConfigRequest) -> ValidateDataSourceConfigResponse {
        let model = Model::from_value(&request.config);
        let diagnostics = match Filter::from_model(&model) {
            Ok(_) => vec![],
            Err(e) => vec![Diagnostic::error("Invalid name_regex", e.to_string())
                .with_attribute(AttributePath::new("name_regex"))],
        };
        ValidateDataSourceConfigResponse { diagnostics }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let Some(data) = &self.provider_data else {
            return unconfigured();
        };

        let mut model = Model::from_value(&request.config);
        let region = data.region_with_override(model.region.clone());
        let filter = match Filter::from_model(&model) {
            Ok(filter) => filter,
            Err(e) => {
                return failed(
                    Diagnostic::error("Invalid name_regex", e.to_string())
                        .with_attribute(AttributePath::new("name_regex")),
                )
            }
        };

        let machine_types = match data
            .client
            .iaas()
            .machine_types()
            .list(&model.project_id, &region)
            .await
        {
            Ok(machine_types) => machine_types,
            Err(e) => return failed(error_diagnostic("Error reading machine types", e)),
        };
        tracing::debug!(count = machine_types.len(), %region, "machine types listed");

        let Some(machine_type) = filter.select(&machine_types) else {
            return failed(Diagnostic::error(
                "No matching machine type",
                format!(
                    "None of the {} machine types in region {} matches the filter.",
                    machine_types.len(),
                    region
                ),
            ));
        };

        map_fields(machine_type, &mut model, &region);
        ReadDataSourceResponse {
            state: model.to_value(),
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for MachineTypeDataSource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureDataSourceRequest) -> ConfigureDataSourceResponse {
        match provider_data::from_any(request.provider_data) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureDataSourceResponse { diagnostics: vec![] }
            }
            Err(diag) => ConfigureDataSourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}
