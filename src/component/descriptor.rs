//! Self-description document printed by `--json`.

use serde::{Deserialize, Serialize};

use super::ComponentSpec;

/// One declared port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
    pub required: bool,
}

/// A component's name, purpose and ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub description: String,
    pub inports: Vec<PortDescriptor>,
    pub outports: Vec<PortDescriptor>,
}

impl Descriptor {
    pub fn from_spec(spec: &ComponentSpec) -> Self {
        let (inports, outports): (Vec<_>, Vec<_>) =
            spec.ports().iter().partition(|port| port.role.is_input());
        let describe = |ports: Vec<&super::PortSpec>| {
            ports
                .into_iter()
                .map(|port| PortDescriptor {
                    name: port.name.clone(),
                    type_name: port.type_name.clone(),
                    description: port.description.clone(),
                    required: port.required,
                })
                .collect()
        };

        Self {
            name: spec.name().to_string(),
            description: spec.description().to_string(),
            inports: describe(inports),
            outports: describe(outports),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
