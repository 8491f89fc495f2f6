use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BusError;
use crate::fingerprint::Fingerprint;

/// What a render request is asking the executor to do.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Render,
    Parameters,
    Capability,
}

/// Created by the coordinator, owned by the bus until resolution, and
/// destroyed on completion or timeout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderRequest {
    pub id: Uuid,
    pub kind: RequestKind,
    pub scad: String,
    pub fingerprint: Fingerprint,
    #[serde(with = "duration_millis")]
    pub deadline: Duration,
}

impl RenderRequest {
    pub fn new(kind: RequestKind, scad: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            scad: scad.into(),
            fingerprint,
            deadline: Duration::from_secs(10),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// High-level disposition of a [`RenderResponse`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
    Progress,
}

/// Created by the remote executor, consumed once by the bus, and
/// delivered to exactly one awaiter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderResponse {
    pub id: Uuid,
    pub status: ResponseStatus,
    pub stl: Option<Vec<u8>>,
    pub error: Option<ResponseError>,
    pub timings: Timings,
}

impl RenderResponse {
    pub fn success(id: Uuid, stl: Vec<u8>, timings: Timings) -> Self {
        Self {
            id,
            status: ResponseStatus::Success,
            stl: Some(stl),
            error: None,
            timings,
        }
    }

    pub fn error(id: Uuid, error: ResponseError) -> Self {
        Self {
            id,
            status: ResponseStatus::Error,
            stl: None,
            error: Some(error),
            timings: Timings::default(),
        }
    }
}

/// Serializable counterpart to [`BusError`] for wire transport; the bus
/// converts one into the other at the awaiter boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseError {
    Timeout,
    Memory,
    SyntaxError { message: String },
    GeometryError { message: String },
    Unknown { backend: String, message: String },
}

impl From<ResponseError> for BusError {
    fn from(value: ResponseError) -> Self {
        match value {
            ResponseError::Timeout => BusError::Timeout(Duration::ZERO),
            ResponseError::Memory => BusError::Memory,
            ResponseError::SyntaxError { message } => BusError::SyntaxError { message },
            ResponseError::GeometryError { message } => BusError::GeometryError { message },
            ResponseError::Unknown { backend, message } => BusError::Unknown { backend, message },
        }
    }
}

/// Per-request timing breakdown echoed back by the executor; purely
/// informational telemetry, never used for correctness decisions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Timings {
    #[serde(with = "duration_millis_opt", default)]
    pub queue: Option<Duration>,
    #[serde(with = "duration_millis_opt", default)]
    pub execute: Option<Duration>,
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod duration_millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
