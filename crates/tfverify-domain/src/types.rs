use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::OutputError;

/// Region name → expected value (resource name, resource group, ...).
pub type RegionMap = BTreeMap<String, String>;

// ── Outputs ───────────────────────────────────────────────────────────────────

/// One declared output, flattened to strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Scalar(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl OutputValue {
    pub fn shape(&self) -> &'static str {
        match self {
            OutputValue::Scalar(_) => "scalar",
            OutputValue::List(_) => "list",
            OutputValue::Map(_) => "map",
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Array(items) => OutputValue::List(items.iter().map(scalar_string).collect()),
            Value::Object(entries) => OutputValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), scalar_string(v)))
                    .collect(),
            ),
            other => OutputValue::Scalar(scalar_string(other)),
        }
    }
}

/// Render a JSON value the way it would be printed by `terraform output -raw`.
/// Nested collections are kept as compact JSON.
fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

/// The frozen set of outputs captured from a single successful apply.
///
/// There are no mutating methods: once built, the set is only read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSet {
    values: BTreeMap<String, OutputValue>,
}

impl OutputSet {
    pub fn new(values: BTreeMap<String, OutputValue>) -> Self {
        Self { values }
    }

    /// Parse the document printed by `terraform output -json`.
    ///
    /// Each top-level key maps to `{ "sensitive": .., "type": .., "value": .. }`.
    pub fn from_terraform_json(doc: &Value) -> Result<Self, OutputError> {
        let entries = doc
            .as_object()
            .ok_or_else(|| OutputError::Malformed("expected a JSON object at top level".into()))?;

        let mut values = BTreeMap::new();
        for (name, entry) in entries {
            let value = entry.get("value").ok_or_else(|| {
                OutputError::Malformed(format!("output '{}' has no 'value' field", name))
            })?;
            values.insert(name.clone(), OutputValue::from_json(value));
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get(&self, name: &str) -> Result<&OutputValue, OutputError> {
        self.values.get(name).ok_or_else(|| OutputError::MissingOutput {
            name: name.to_string(),
        })
    }

    /// Read a scalar output.
    pub fn scalar(&self, name: &str) -> Result<&str, OutputError> {
        match self.get(name)? {
            OutputValue::Scalar(s) => Ok(s),
            other => Err(mismatch(name, "scalar", other)),
        }
    }

    /// Read a map output.
    pub fn map(&self, name: &str) -> Result<&BTreeMap<String, String>, OutputError> {
        match self.get(name)? {
            OutputValue::Map(m) => Ok(m),
            other => Err(mismatch(name, "map", other)),
        }
    }

    /// Read a list output.
    pub fn list(&self, name: &str) -> Result<&[String], OutputError> {
        match self.get(name)? {
            OutputValue::List(l) => Ok(l),
            other => Err(mismatch(name, "list", other)),
        }
    }
}

fn mismatch(name: &str, expected: &'static str, actual: &OutputValue) -> OutputError {
    OutputError::TypeMismatch {
        name: name.to_string(),
        expected,
        actual: actual.shape(),
    }
}

/// A region present on both sides of a region-keyed comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPair<'a> {
    pub region: &'a str,
    pub expected: &'a str,
    pub actual: &'a str,
}

/// Pair every expected region with its entry in the `output` map.
///
/// The key sets must be identical. A region missing from the output is
/// reported before any region the output has but the expectation lacks.
pub fn pair_regions<'a>(
    output: &str,
    expected: &'a RegionMap,
    actual: &'a BTreeMap<String, String>,
) -> Result<Vec<RegionPair<'a>>, OutputError> {
    let mut pairs = Vec::with_capacity(expected.len());
    for (region, want) in expected {
        let got = actual.get(region).ok_or_else(|| OutputError::MissingKey {
            output: output.to_string(),
            key: region.clone(),
        })?;
        pairs.push(RegionPair { region, expected: want, actual: got });
    }
    if let Some(extra) = actual.keys().find(|k| !expected.contains_key(*k)) {
        return Err(OutputError::UnexpectedKey {
            output: output.to_string(),
            key: extra.clone(),
        });
    }
    Ok(pairs)
}

// ── Resources ─────────────────────────────────────────────────────────────────

/// The closed set of resource kinds the verifier knows how to look up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    FrontDoor,
    /// A frontend endpoint nested under the named front door.
    FrontDoorFrontendEndpoint { front_door: String },
    StorageAccount,
    KeyVault,
    WebApp,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ResourceGroup => write!(f, "resource group"),
            ResourceKind::FrontDoor => write!(f, "front door"),
            ResourceKind::FrontDoorFrontendEndpoint { front_door } => {
                write!(f, "frontend endpoint of front door {}", front_door)
            }
            ResourceKind::StorageAccount => write!(f, "storage account"),
            ResourceKind::KeyVault => write!(f, "key vault"),
            ResourceKind::WebApp => write!(f, "web app"),
        }
    }
}

/// The minimal key needed to ask the provider whether a resource exists.
///
/// An empty `subscription` means "use the ambient default subscription".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub kind: ResourceKind,
    pub name: String,
    /// Empty for resource groups, which are addressed by `name` alone.
    pub resource_group: String,
    pub subscription: String,
}

impl ResourceIdentity {
    pub fn resource_group(name: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::ResourceGroup,
            name: name.into(),
            resource_group: String::new(),
            subscription: subscription.into(),
        }
    }

    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        resource_group: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            resource_group: resource_group.into(),
            subscription: subscription.into(),
        }
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.resource_group.is_empty() {
            write!(f, "{} '{}'", self.kind, self.name)
        } else {
            write!(f, "{} '{}' in resource group '{}'", self.kind, self.name, self.resource_group)
        }
    }
}

// ── Assertions ────────────────────────────────────────────────────────────────

/// One evaluated expectation. `passed` is computed when the record is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub actual: String,
    pub expected: String,
    pub message: String,
    pub passed: bool,
}
