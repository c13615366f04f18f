//! YAML device profiles

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use super::{ProfileDevice, TransformSpec};
use crate::codec::{HeaderLayout, PacketCodec};
use crate::layout::{FieldLayout, FieldSpec, LayoutRegistry, TaggedSchema};
use crate::projection::FieldProjection;
use crate::routing::{RecordRouter, RoutePattern};
use crate::{ProtocolError, Result};

fn default_version() -> u8 {
    2
}

fn default_src() -> u8 {
    0x21
}

/// Complete declarative description of one device family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceProfile {
    pub name: String,
    #[serde(default)]
    pub codec: PacketCodec,
    /// Header version for outbound commands
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default)]
    pub layouts: Vec<LayoutSpec>,
    #[serde(default)]
    pub tagged: Vec<TaggedSpec>,
    #[serde(default)]
    pub mappings: Vec<MappingSpec>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

/// A fixed layout and the extra record keys sharing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutSpec {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaggedSpec {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Field number to field name
    pub fields: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingSpec {
    pub property: String,
    pub record: String,
    pub field: String,
    #[serde(default, with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub transform: Vec<TransformSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(flatten)]
    pub pattern: RoutePattern,
    pub record: String,
}

/// An outbound command taking one integer argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default = "default_src")]
    pub src: u8,
    pub dst: u8,
    pub cmd_set: u8,
    pub cmd_id: u8,
    /// Overrides the profile's outbound version
    #[serde(default)]
    pub version: Option<u8>,
    /// Inclusive bounds the argument is clamped to
    #[serde(default)]
    pub range: Option<(i64, i64)>,
    #[serde(default, with = "serde_yaml_ng::with::singleton_map")]
    pub payload: PayloadSpec,
}

/// How a command argument is written into the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSpec {
    #[default]
    Byte,
    U16,
    /// A single tagged varint entry with this field number
    Tagged(u32),
}

impl DeviceProfile {
    /// Parse and validate a profile.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let profile: DeviceProfile = serde_yaml_ng::from_str(yaml)?;
        profile.build()?;
        info!(
            profile = %profile.name,
            layouts = profile.layouts.len(),
            mappings = profile.mappings.len(),
            routes = profile.routes.len(),
            "Loaded device profile"
        );
        Ok(profile)
    }

    /// Build the adapter this profile describes.
    pub fn build(&self) -> Result<ProfileDevice> {
        let context = format!("profile '{}'", self.name);
        HeaderLayout::for_version(self.version)?;

        let mut registry = LayoutRegistry::new();
        let mut names = HashSet::new();
        let mut claim = |name: &str| {
            if names.insert(name.to_string()) {
                Ok(())
            } else {
                Err(ProtocolError::config_error(&context, format!("record '{}' declared twice", name)))
            }
        };

        for spec in &self.layouts {
            claim(&spec.name)?;
            registry.register(spec.name.as_str(), FieldLayout::new(&spec.name, spec.fields.clone())?);
            for alias in &spec.aliases {
                claim(alias)?;
                registry.alias(alias.as_str(), &spec.name)?;
            }
        }
        for spec in &self.tagged {
            claim(&spec.name)?;
            let fields = spec.fields.iter().map(|(number, field)| (*number, field.clone()));
            registry.register(spec.name.as_str(), TaggedSchema::new(&spec.name, fields)?);
            for alias in &spec.aliases {
                claim(alias)?;
                registry.alias(alias.as_str(), &spec.name)?;
            }
        }

        let mut projection = FieldProjection::new();
        for mapping in &self.mappings {
            projection.register_mapping(
                mapping.property.as_str(),
                mapping.record.as_str(),
                mapping.field.as_str(),
                TransformSpec::chain(&mapping.transform),
            );
        }
        projection.validate(&registry)?;

        let mut router = RecordRouter::new(registry);
        for route in &self.routes {
            router.route(route.pattern, route.record.as_str())?;
        }

        let mut command_names = HashSet::new();
        for command in &self.commands {
            if !command_names.insert(command.name.as_str()) {
                return Err(ProtocolError::config_error(
                    &context,
                    format!("command '{}' declared twice", command.name),
                ));
            }
            HeaderLayout::for_version(command.version.unwrap_or(self.version))?;
            if let Some((min, max)) = command.range
                && min > max
            {
                return Err(ProtocolError::config_error(
                    &context,
                    format!("command '{}' has range [{}, {}]", command.name, min, max),
                ));
            }
        }

        debug!(profile = %self.name, "Built profile device");
        Ok(ProfileDevice::new(
            self.name.clone(),
            self.codec,
            self.version,
            router,
            projection,
            self.commands.clone(),
        ))
    }
}
