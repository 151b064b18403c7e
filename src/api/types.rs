//! Wire types for the attendance endpoints.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::overlay::DetectionStatus;

/// Server-assigned session identifier.
///
/// The server issues integers; they are kept as text locally and sent back
/// as numbers whenever they parse as one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<i64>() {
            Ok(number) => serializer.serialize_i64(number),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        text_of(value)
            .map(SessionId)
            .ok_or_else(|| serde::de::Error::custom("session id must be a string or number"))
    }
}

/// `GET /api/session_status`
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SessionStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub subject_id: Option<String>,
    /// `Active` or `Reopened` while `active` is true.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub remaining_minutes: f64,
}

impl SessionStatus {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// `POST /api/start_session`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StartSessionRequest {
    pub class_name: String,
    pub subject_id: String,
    pub duration_minutes: u32,
    /// Same value as `duration_minutes`; the deployed server reads this key.
    pub duration: u32,
}

impl StartSessionRequest {
    pub fn new(class_name: &str, subject_id: &str, duration_minutes: u32) -> Self {
        Self {
            class_name: class_name.to_string(),
            subject_id: subject_id.to_string(),
            duration_minutes,
            duration: duration_minutes,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct StartSessionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Acknowledgement for `end_session` and `reopen_session`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct SessionRef<'a> {
    pub session_id: &'a SessionId,
}

/// `POST /api/recognize_face`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecognizeRequest {
    /// `data:image/jpeg;base64,…`
    pub image: String,
    pub class_name: String,
    pub subject_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<RecognitionResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One face returned by the recognizer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RecognitionResult {
    #[serde(default, deserialize_with = "optional_text")]
    pub enrollment: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// `[top, right, bottom, left]` in the submitted image's pixel space.
    #[serde(default)]
    pub location: Option<[f32; 4]>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RecognitionResult {
    pub fn detection_status(&self) -> Option<DetectionStatus> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(DetectionStatus::from_wire)
    }

    pub fn enrollment(&self) -> Option<&str> {
        self.enrollment.as_deref().filter(|e| !e.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// One row of `GET /api/get_attendance`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "text_or_dash")]
    pub lecture_number: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default, deserialize_with = "text_or_dash")]
    pub enrollment_number: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub faculty_name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl AttendanceRecord {
    pub fn is_present(&self) -> bool {
        self.status == "Present"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct AttendanceReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<AttendanceRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

fn text_of(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(text_of))
}

fn text_or_dash<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(text_of).unwrap_or_else(|| "-".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_session_ids_round_trip_as_numbers() {
        let status: SessionStatus = serde_json::from_str(
            r#"{"active": true, "session_id": 42, "class_name": "CS-A",
                "subject_id": 7, "status": "Active", "remaining_minutes": 9}"#,
        )
        .unwrap();
        let id = status.session_id.clone().unwrap();
        assert_eq!(id.as_str(), "42");
        assert_eq!(status.subject_id.as_deref(), Some("7"));
        assert_eq!(status.remaining_minutes, 9.0);

        let body = serde_json::to_string(&SessionRef { session_id: &id }).unwrap();
        assert_eq!(body, r#"{"session_id":42}"#);
    }

    #[test]
    fn inactive_status_has_defaults() {
        let status: SessionStatus = serde_json::from_str(r#"{"active": false}"#).unwrap();
        assert_eq!(status, SessionStatus::inactive());
    }

    #[test]
    fn start_request_carries_both_duration_keys() {
        let body = serde_json::to_value(StartSessionRequest::new("CS-A", "12", 15)).unwrap();
        assert_eq!(body["duration_minutes"], 15);
        assert_eq!(body["duration"], 15);
    }

    #[test]
    fn recognition_result_without_identity_is_unknown() {
        let res: RecognizeResponse = serde_json::from_str(
            r#"{"success": true, "results": [
                {"status": "unknown", "message": "Unknown Face", "location": [1, 2, 3, 4]}
            ]}"#,
        )
        .unwrap();
        let face = &res.results[0];
        assert_eq!(face.enrollment(), None);
        assert_eq!(face.detection_status(), Some(DetectionStatus::Unknown));
        assert_eq!(face.location, Some([1.0, 2.0, 3.0, 4.0]));
    }
}
