//! TOML-based scenario configuration and preset definitions.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::esi::MAX_ESI_TABLE_SIZE;

/// Top-level scenario configuration parsed from TOML.
///
/// All sections have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulated time span and seed.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Client endpoints and event table size.
    #[serde(default)]
    pub client: ClientConfig,
    /// DRLC attributes of every client endpoint.
    #[serde(default)]
    pub attributes: AttributesConfig,
    /// ESI directory sizing.
    #[serde(default)]
    pub esi: EsiConfig,
    /// ESI peers that send commands.
    #[serde(default)]
    pub esis: Vec<EsiPeerConfig>,
    /// Scripted commands and user actions.
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// Simulated time span and seed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Seconds since epoch at the first tick.
    pub start_time: u32,
    /// Number of one-second ticks after the first.
    pub seconds: u32,
    /// Seed of the randomization source.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 1_000_000,
            seconds: 900,
            seed: 42,
        }
    }
}

/// Client endpoints and event table size.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Endpoints hosting a DRLC client.
    pub endpoints: Vec<u8>,
    /// Event slots per endpoint.
    pub table_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![1],
            table_size: 3,
        }
    }
}

/// DRLC attribute values written on every client endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributesConfig {
    pub utility_enrollment_group: u8,
    /// Upper bound of the start offset, minutes (0 disables).
    pub start_randomization_minutes: u8,
    /// Upper bound of the duration offset, minutes (0 disables).
    pub duration_randomization_minutes: u8,
    pub device_class: u16,
}

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            utility_enrollment_group: 0,
            start_randomization_minutes: 0,
            duration_randomization_minutes: 0,
            device_class: 0x0001,
        }
    }
}

/// ESI directory sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EsiConfig {
    /// Directory slots (1 to 32).
    pub table_size: usize,
    /// Newer admissions after which an entry may be evicted.
    pub min_erasing_age: u8,
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            table_size: 4,
            min_erasing_age: 2,
        }
    }
}

/// Identity of an ESI peer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EsiPeerConfig {
    pub eui64: u64,
    pub node_id: u16,
    #[serde(default = "default_endpoint")]
    pub endpoint: u8,
    #[serde(default)]
    pub network_index: u8,
}

/// One scripted action, applied `at` seconds after the simulation start.
///
/// `esi` fields index [`ScenarioConfig::esis`]; `index` fields are ESI
/// directory slots.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ActionConfig {
    LoadControlEvent {
        at: u32,
        esi: usize,
        #[serde(default = "default_endpoint")]
        endpoint: u8,
        event_id: u32,
        /// Start offset from simulation start; absent means "now".
        #[serde(default)]
        start: Option<u32>,
        duration: u16,
        #[serde(default = "default_criticality")]
        criticality: u8,
        #[serde(default = "default_device_class")]
        device_class: u16,
        #[serde(default)]
        utility_enrollment_group: u8,
        #[serde(default)]
        randomize_start: bool,
        #[serde(default)]
        randomize_duration: bool,
    },
    Cancel {
        at: u32,
        esi: usize,
        #[serde(default = "default_endpoint")]
        endpoint: u8,
        event_id: u32,
        #[serde(default = "default_device_class")]
        device_class: u16,
        #[serde(default)]
        utility_enrollment_group: u8,
        #[serde(default)]
        randomize: bool,
        /// Effective offset from simulation start; absent means "now".
        #[serde(default)]
        effective: Option<u32>,
    },
    CancelAll {
        at: u32,
        esi: usize,
        #[serde(default = "default_endpoint")]
        endpoint: u8,
        #[serde(default)]
        randomize: bool,
    },
    OptIn {
        at: u32,
        #[serde(default = "default_endpoint")]
        endpoint: u8,
        event_id: u32,
    },
    OptOut {
        at: u32,
        #[serde(default = "default_endpoint")]
        endpoint: u8,
        event_id: u32,
    },
    EvictEsi {
        at: u32,
        index: u8,
    },
    RequestScheduledEvents {
        at: u32,
        index: u8,
        #[serde(default)]
        number_of_events: u8,
    },
}

impl ActionConfig {
    /// Seconds after simulation start.
    pub fn at(&self) -> u32 {
        match self {
            Self::LoadControlEvent { at, .. }
            | Self::Cancel { at, .. }
            | Self::CancelAll { at, .. }
            | Self::OptIn { at, .. }
            | Self::OptOut { at, .. }
            | Self::EvictEsi { at, .. }
            | Self::RequestScheduledEvents { at, .. } => *at,
        }
    }

    /// Sending peer, for commands that come from an ESI.
    pub fn esi(&self) -> Option<usize> {
        match self {
            Self::LoadControlEvent { esi, .. } | Self::Cancel { esi, .. } | Self::CancelAll { esi, .. } => {
                Some(*esi)
            }
            _ => None,
        }
    }

    /// Client endpoint the action addresses, if any.
    pub fn endpoint(&self) -> Option<u8> {
        match self {
            Self::LoadControlEvent { endpoint, .. }
            | Self::Cancel { endpoint, .. }
            | Self::CancelAll { endpoint, .. }
            | Self::OptIn { endpoint, .. }
            | Self::OptOut { endpoint, .. } => Some(*endpoint),
            Self::EvictEsi { .. } | Self::RequestScheduledEvents { .. } => None,
        }
    }
}

fn default_endpoint() -> u8 {
    1
}

fn default_criticality() -> u8 {
    1
}

fn default_device_class() -> u16 {
    0x0001
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"client.table_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ScenarioConfig {
    /// One ESI, one immediate five-minute event that runs to completion.
    pub fn baseline() -> Self {
        Self {
            esis: vec![utility_esi()],
            actions: vec![ActionConfig::LoadControlEvent {
                at: 5,
                esi: 0,
                endpoint: 1,
                event_id: 0x0000_1001,
                start: None,
                duration: 5,
                criticality: 3,
                device_class: 0x0001,
                utility_enrollment_group: 0,
                randomize_start: false,
                randomize_duration: false,
            }],
            ..Self::default()
        }
    }

    /// Overlapping events: a running event is superseded, a pending one is
    /// cancelled with randomization, and the user opts out of a third.
    pub fn supersede() -> Self {
        Self {
            attributes: AttributesConfig {
                start_randomization_minutes: 1,
                duration_randomization_minutes: 1,
                ..AttributesConfig::default()
            },
            esis: vec![utility_esi()],
            actions: vec![
                ActionConfig::LoadControlEvent {
                    at: 0,
                    esi: 0,
                    endpoint: 1,
                    event_id: 0x0000_2001,
                    start: Some(60),
                    duration: 10,
                    criticality: 2,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize_start: false,
                    randomize_duration: false,
                },
                ActionConfig::LoadControlEvent {
                    at: 120,
                    esi: 0,
                    endpoint: 1,
                    event_id: 0x0000_2002,
                    start: Some(300),
                    duration: 5,
                    criticality: 4,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize_start: true,
                    randomize_duration: false,
                },
                ActionConfig::OptOut {
                    at: 400,
                    endpoint: 1,
                    event_id: 0x0000_2002,
                },
                ActionConfig::LoadControlEvent {
                    at: 450,
                    esi: 0,
                    endpoint: 1,
                    event_id: 0x0000_2003,
                    start: Some(800),
                    duration: 2,
                    criticality: 1,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize_start: false,
                    randomize_duration: true,
                },
                ActionConfig::Cancel {
                    at: 500,
                    esi: 0,
                    endpoint: 1,
                    event_id: 0x0000_2003,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize: true,
                    effective: None,
                },
                ActionConfig::Cancel {
                    at: 510,
                    esi: 0,
                    endpoint: 1,
                    event_id: 0x0000_2099,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize: false,
                    effective: None,
                },
            ],
            ..Self::default()
        }
    }

    /// Two ESIs share an event on two endpoints; one ESI is evicted and the
    /// other cancels everything.
    pub fn multi_esi() -> Self {
        Self {
            client: ClientConfig {
                endpoints: vec![1, 2],
                table_size: 2,
            },
            esi: EsiConfig {
                table_size: 2,
                min_erasing_age: 1,
            },
            esis: vec![
                utility_esi(),
                EsiPeerConfig {
                    eui64: 0x0022_3344_5566_7788,
                    node_id: 0x0002,
                    endpoint: 1,
                    network_index: 0,
                },
            ],
            actions: vec![
                ActionConfig::LoadControlEvent {
                    at: 0,
                    esi: 0,
                    endpoint: 1,
                    event_id: 0x0000_3001,
                    start: Some(30),
                    duration: 5,
                    criticality: 5,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize_start: false,
                    randomize_duration: false,
                },
                ActionConfig::LoadControlEvent {
                    at: 1,
                    esi: 1,
                    endpoint: 1,
                    event_id: 0x0000_3001,
                    start: Some(30),
                    duration: 5,
                    criticality: 5,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize_start: false,
                    randomize_duration: false,
                },
                ActionConfig::LoadControlEvent {
                    at: 2,
                    esi: 1,
                    endpoint: 2,
                    event_id: 0x0000_3002,
                    start: Some(600),
                    duration: 5,
                    criticality: 5,
                    device_class: 0x0001,
                    utility_enrollment_group: 0,
                    randomize_start: false,
                    randomize_duration: false,
                },
                ActionConfig::EvictEsi { at: 60, index: 0 },
                ActionConfig::RequestScheduledEvents {
                    at: 90,
                    index: 1,
                    number_of_events: 0,
                },
                ActionConfig::CancelAll {
                    at: 120,
                    esi: 1,
                    endpoint: 1,
                    randomize: false,
                },
                ActionConfig::CancelAll {
                    at: 130,
                    esi: 1,
                    endpoint: 1,
                    randomize: false,
                },
            ],
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "supersede", "multi_esi"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "supersede" => Ok(Self::supersede()),
            "multi_esi" => Ok(Self::multi_esi()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Protocol-level
    /// values (durations, criticality, start times) are not checked here;
    /// scenarios may send invalid commands on purpose.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.simulation.seconds == 0 {
            errors.push(ConfigError {
                field: "simulation.seconds".into(),
                message: "must be > 0".into(),
            });
        }

        let c = &self.client;
        if c.endpoints.is_empty() {
            errors.push(ConfigError {
                field: "client.endpoints".into(),
                message: "must list at least one endpoint".into(),
            });
        }
        if let Some(ep) = c.endpoints.iter().find(|ep| !(1..=240).contains(*ep)) {
            errors.push(ConfigError {
                field: "client.endpoints".into(),
                message: format!("endpoint {ep} outside 1..=240"),
            });
        }
        if c.endpoints.iter().collect::<BTreeSet<_>>().len() != c.endpoints.len() {
            errors.push(ConfigError {
                field: "client.endpoints".into(),
                message: "must not repeat an endpoint".into(),
            });
        }
        if c.table_size == 0 {
            errors.push(ConfigError {
                field: "client.table_size".into(),
                message: "must be > 0".into(),
            });
        }

        if !(1..=MAX_ESI_TABLE_SIZE).contains(&self.esi.table_size) {
            errors.push(ConfigError {
                field: "esi.table_size".into(),
                message: format!("must be in 1..={MAX_ESI_TABLE_SIZE}"),
            });
        }

        for (i, action) in self.actions.iter().enumerate() {
            if action.at() > self.simulation.seconds {
                errors.push(ConfigError {
                    field: format!("actions[{i}].at"),
                    message: "must be <= simulation.seconds".into(),
                });
            }
            if let Some(esi) = action.esi().filter(|esi| *esi >= self.esis.len()) {
                errors.push(ConfigError {
                    field: format!("actions[{i}].esi"),
                    message: format!("no ESI peer {esi}, {} configured", self.esis.len()),
                });
            }
            if let Some(ep) = action.endpoint().filter(|ep| !c.endpoints.contains(ep)) {
                errors.push(ConfigError {
                    field: format!("actions[{i}].endpoint"),
                    message: format!("endpoint {ep} is not a client endpoint"),
                });
            }
        }

        errors
    }
}

fn utility_esi() -> EsiPeerConfig {
    EsiPeerConfig {
        eui64: 0x0011_2233_4455_6677,
        node_id: 0x0001,
        endpoint: 1,
        network_index: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_preset_valid() {
        let cfg = ScenarioConfig::baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
start_time = 5000
seconds = 120
seed = 7

[client]
endpoints = [1, 3]
table_size = 4

[attributes]
utility_enrollment_group = 2
start_randomization_minutes = 1
device_class = 0x0003

[esi]
table_size = 8
min_erasing_age = 3

[[esis]]
eui64 = 0x0011223344556677
node_id = 0x1234

[[actions]]
kind = "load_control_event"
at = 0
esi = 0
endpoint = 3
event_id = 42
start = 30
duration = 1
randomize_start = true

[[actions]]
kind = "opt_out"
at = 10
endpoint = 3
event_id = 42

[[actions]]
kind = "cancel_all"
at = 20
esi = 0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.unwrap();
        assert_eq!(cfg.simulation.start_time, 5000);
        assert_eq!(cfg.client.endpoints, vec![1, 3]);
        assert_eq!(cfg.attributes.device_class, 0x0003);
        assert_eq!(cfg.esis[0].endpoint, 1);
        assert_eq!(cfg.actions.len(), 3);
        assert!(matches!(
            cfg.actions[0],
            ActionConfig::LoadControlEvent {
                start: Some(30),
                criticality: 1,
                randomize_start: true,
                ..
            }
        ));
        assert_eq!(cfg.actions[2].endpoint(), Some(1));
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[client]
table_size = 2
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn unknown_action_kind_is_rejected() {
        let toml = r#"
[[actions]]
kind = "reboot"
at = 0
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_oversized_esi_table() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.esi.table_size = 33;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "esi.table_size"));
    }

    #[test]
    fn validation_catches_dangling_references() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.actions.push(ActionConfig::CancelAll {
            at: 10_000,
            esi: 4,
            endpoint: 9,
            randomize: false,
        });
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["actions[1].at", "actions[1].esi", "actions[1].endpoint"]
        );
    }

    #[test]
    fn validation_catches_duplicate_endpoints() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.client.endpoints = vec![1, 1];
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "client.endpoints"));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[simulation]
seed = 99
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.simulation.seed, 99);
        assert_eq!(cfg.simulation.seconds, 900);
        assert_eq!(cfg.client.table_size, 3);
        assert!(cfg.actions.is_empty());
    }
}
