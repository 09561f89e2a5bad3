//! Shared admission plumbing: kind matching, decoding and responses.
//!
//! Handlers return a [`Verdict`]; the server turns it into the
//! `AdmissionResponse` for the request. Keeping the verdict separate lets
//! tests assert on denials and patches without going through the wire format.

use std::fmt;

use kube::Resource;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

/// Admission request as received from the API server.
pub type Request = AdmissionRequest<DynamicObject>;

/// Message returned for operations a webhook does not act on.
pub const ACTION_NOT_TAKEN: &str = "action not taken";

/// Outcome of an admission handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Request admitted unchanged
    Allowed(String),
    /// Request rejected by policy (HTTP 403 in the status)
    Denied(String),
    /// Request could not be evaluated
    Errored { code: u16, message: String },
    /// Request admitted with a JSON patch applied
    Patched(json_patch::Patch),
}

impl Verdict {
    pub fn allowed(message: impl Into<String>) -> Self {
        Verdict::Allowed(message.into())
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Verdict::Denied(message.into())
    }

    pub fn errored(code: u16, message: impl Into<String>) -> Self {
        Verdict::Errored {
            code,
            message: message.into(),
        }
    }

    /// Patch turning `original` into `mutated`.
    ///
    /// Both sides are serialized from the typed resource, so fields the
    /// types do not model never show up as spurious removals.
    pub fn patched<K: Serialize>(original: &K, mutated: &K) -> Self {
        match (serde_json::to_value(original), serde_json::to_value(mutated)) {
            (Ok(original), Ok(mutated)) => Verdict::Patched(json_patch::diff(&original, &mutated)),
            (Err(e), _) | (_, Err(e)) => Verdict::errored(500, e.to_string()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed(_) | Verdict::Patched(_))
    }

    /// Short label used for metrics
    pub fn result_label(&self) -> &'static str {
        match self {
            Verdict::Allowed(_) => "allowed",
            Verdict::Patched(_) => "patched",
            Verdict::Denied(_) => "denied",
            Verdict::Errored { .. } => "errored",
        }
    }

    /// Build the response for `request`.
    pub fn into_response(self, request: &Request) -> AdmissionResponse {
        match self {
            Verdict::Allowed(message) => {
                let mut response = AdmissionResponse::from(request);
                response.result.code = 200;
                response.result.message = message;
                response
            }
            Verdict::Denied(message) => {
                let mut response = AdmissionResponse::from(request).deny(message);
                response.result.code = 403;
                response.result.reason = "Forbidden".to_string();
                response
            }
            Verdict::Errored { code, message } => {
                let mut response = AdmissionResponse::from(request).deny(message);
                response.result.code = code;
                response
            }
            Verdict::Patched(patch) if patch.0.is_empty() => {
                Verdict::allowed("").into_response(request)
            }
            Verdict::Patched(patch) => match AdmissionResponse::from(request).with_patch(patch) {
                Ok(response) => response,
                Err(e) => {
                    error!(uid = %request.uid, error = %e, "Failed to serialize patch");
                    Verdict::errored(500, e.to_string()).into_response(request)
                }
            },
        }
    }
}

/// Wire name of an admission operation (`CREATE`, `UPDATE`, ...).
pub fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Group/version/kind rendered the way API machinery prints it.
struct Gvk<'a>(&'a str, &'a str, &'a str);

impl fmt::Display for Gvk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Kind={}", self.0, self.1, self.2)
    }
}

/// Reject requests routed to a handler for a different kind.
pub fn match_kind<K: Resource<DynamicType = ()>>(request: &Request) -> Result<(), Verdict> {
    let (group, version, kind) = (K::group(&()), K::version(&()), K::kind(&()));
    let got = &request.kind;
    if got.group == group && got.version == version && got.kind == kind {
        return Ok(());
    }
    Err(Verdict::errored(
        400,
        format!(
            "type mismatch: want: {} got: {}",
            Gvk(&group, &version, &kind),
            Gvk(&got.group, &got.version, &got.kind)
        ),
    ))
}

fn decode_object<K: DeserializeOwned>(object: Option<&DynamicObject>, field: &str) -> Result<K, Verdict> {
    let object =
        object.ok_or_else(|| Verdict::errored(400, format!("admission request has no {}", field)))?;
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| Verdict::errored(400, format!("could not decode {}: {}", field, e)))
}

/// Match the kind and decode `object` into the typed resource.
pub fn decode<K>(request: &Request) -> Result<K, Verdict>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    match_kind::<K>(request)?;
    decode_object(request.object.as_ref(), "object")
}

/// Decode `oldObject` into the typed resource.
pub fn decode_old<K>(request: &Request) -> Result<K, Verdict>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    decode_object(request.old_object.as_ref(), "oldObject")
}

/// Collection of errors reported together, joined with `"; "`.
#[derive(Debug, Default)]
pub struct MultiError(Vec<String>);

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl fmt::Display) {
        self.0.push(error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

impl std::error::Error for MultiError {}

/// Source of external IDs for new instances and bindings.
pub trait UuidGenerator: Send + Sync {
    fn new_uuid(&self) -> String;
}

/// Random (v4) UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomUuid;

impl UuidGenerator for RandomUuid {
    fn new_uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
