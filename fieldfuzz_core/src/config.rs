use crate::error::{FuzzError, FuzzResult};
use crate::traits::Registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Name to value mapping of protocol and I/O interface settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolConfig(BTreeMap<String, Value>);

impl ProtocolConfig {
    /// Empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder style `set`
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Value of `name`. `null` and empty strings count as not set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.0.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }

    /// True if `name` holds a usable value
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Text value, numbers are formatted
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.trim().to_owned()),
            other => Some(other.to_string()),
        }
    }

    /// Unsigned integer value, numeric strings are accepted
    /// # Errors
    /// Fails if the value is set but not an unsigned integer.
    pub fn get_u64(&self, name: &str) -> FuzzResult<Option<u64>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| FuzzError::invalid_config(format!("`{name}` must be an unsigned integer")))
    }

    /// Float value, numeric strings are accepted
    /// # Errors
    /// Fails if the value is set but not a number.
    pub fn get_f64(&self, name: &str) -> FuzzResult<Option<f64>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| FuzzError::invalid_config(format!("`{name}` must be a number")))
    }

    /// Duration given in (fractional) seconds
    /// # Errors
    /// Fails on negative or non finite values.
    pub fn get_duration(&self, name: &str) -> FuzzResult<Option<Duration>> {
        let Some(secs) = self.get_f64(name)? else {
            return Ok(None);
        };
        Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|_| FuzzError::invalid_config(format!("`{name}` is not a valid duration")))
    }
}

/// Value type of a configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigKind {
    /// free text
    Text,
    /// unsigned integer
    Int,
    /// floating point number
    Float,
}

/// A single configuration field a protocol/transport combination understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    /// field name, key in `ProtocolConfig`
    pub name: String,
    /// value type
    pub kind: ConfigKind,
    /// pre-filled value
    pub default: Option<Value>,
    /// the job cannot start without it
    pub required: bool,
    /// one line description
    pub help: String,
    /// inclusive bounds of numeric values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
}

impl ConfigField {
    fn new(name: &str, kind: ConfigKind, help: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            default: None,
            required: true,
            help: help.to_owned(),
            range: None,
        }
    }

    /// Required text field
    #[must_use]
    pub fn text(name: &str, help: &str) -> Self {
        Self::new(name, ConfigKind::Text, help)
    }

    /// Required integer field
    #[must_use]
    pub fn int(name: &str, help: &str) -> Self {
        Self::new(name, ConfigKind::Int, help)
    }

    /// Required float field
    #[must_use]
    pub fn float(name: &str, help: &str) -> Self {
        Self::new(name, ConfigKind::Float, help)
    }

    /// Sets the default value
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Marks the field as optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Restricts numeric values to `min..=max`
    #[must_use]
    pub fn with_range(mut self, min: impl Into<f64>, max: impl Into<f64>) -> Self {
        self.range = Some((min.into(), max.into()));
        self
    }

    fn check(&self, config: &ProtocolConfig) -> FuzzResult<()> {
        if !config.contains(&self.name) {
            if self.required {
                return Err(FuzzError::invalid_config(format!(
                    "missing value for `{}`",
                    self.name
                )));
            }
            return Ok(());
        }
        let value = match self.kind {
            ConfigKind::Text => return Ok(()),
            #[allow(clippy::cast_precision_loss)]
            ConfigKind::Int => config.get_u64(&self.name)?.map(|v| v as f64),
            ConfigKind::Float => config.get_f64(&self.name)?,
        };
        match (value, self.range) {
            (Some(value), Some((min, max))) if !(min..=max).contains(&value) => {
                Err(FuzzError::invalid_config(format!(
                    "{} {value} is not in {min}..={max}",
                    self.name
                )))
            }
            (Some(value), _) if !value.is_finite() => Err(FuzzError::invalid_config(format!(
                "`{}` must be finite",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// The configuration fields of one protocol/transport combination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    /// Creates a schema
    /// # Errors
    /// Fails if two fields share a name.
    pub fn new(fields: Vec<ConfigField>) -> FuzzResult<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(FuzzError::invalid_config(format!(
                    "duplicate config field `{}`",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// All fields in display order
    #[must_use]
    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    /// Configuration pre-filled with every default, fields without a default are set to null
    #[must_use]
    pub fn defaults(&self) -> ProtocolConfig {
        let mut config = ProtocolConfig::new();
        for field in &self.fields {
            config.set(field.name.clone(), field.default.clone().unwrap_or(Value::Null));
        }
        config
    }

    /// Checks that every required field is present and every value has the right type
    /// # Errors
    pub fn check(&self, config: &ProtocolConfig) -> FuzzResult<()> {
        self.fields.iter().try_for_each(|field| field.check(config))
    }
}

/// Everything needed to start a job. This is also what is written to `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// registered protocol name
    pub protocol: String,
    /// registered I/O interface name
    pub io_interface: String,
    /// registered device name
    pub device: String,
    /// regenerate messages until the protocol validator accepts them
    pub validate: bool,
    /// message types to pick from
    pub msg_types: Vec<String>,
    /// protocol and I/O interface settings
    pub protocol_config: ProtocolConfig,
    /// free text
    pub comment: String,
    /// stop after this many messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<u64>,
}

impl JobConfig {
    /// Parses a configuration
    /// # Errors
    pub fn from_json(json: &str) -> FuzzResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty printed JSON
    /// # Errors
    pub fn to_json(&self) -> FuzzResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a configuration file
    /// # Errors
    pub fn load(path: &Path) -> FuzzResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Writes the configuration to `path`
    /// # Errors
    pub fn save(&self, path: &Path) -> FuzzResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Checks the configuration against the registered protocols, I/O interfaces and
    /// devices. Nothing is applied unless every check passes.
    /// # Errors
    /// The first problem found.
    pub fn check<R: Registry>(&self, registry: &R) -> FuzzResult<()> {
        let protocol =
            registry
                .protocol(&self.protocol)
                .ok_or_else(|| FuzzError::UnknownProtocol {
                    name: self.protocol.clone(),
                })?;
        let kind = registry.io_interface_kind(&self.io_interface).ok_or_else(|| {
            FuzzError::UnknownIoInterface {
                name: self.io_interface.clone(),
            }
        })?;
        if !registry.device_names().iter().any(|d| *d == self.device) {
            return Err(FuzzError::UnknownDevice {
                name: self.device.clone(),
            });
        }
        if self.msg_types.is_empty() {
            return Err(FuzzError::invalid_config("no message types selected"));
        }
        let known = protocol.msg_names(None);
        if let Some(unknown) = self
            .msg_types
            .iter()
            .find(|name| !known.iter().any(|entry| entry.name == name.as_str()))
        {
            return Err(FuzzError::UnknownMessage {
                protocol: self.protocol.clone(),
                name: unknown.clone(),
            });
        }
        protocol
            .config(&self.msg_types, kind)?
            .check(&self.protocol_config)
    }
}
