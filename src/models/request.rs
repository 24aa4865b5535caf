use base64::Engine;
use garde::Validate;
use serde::Deserialize;

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[garde(length(min = 1, max = 1024))]
    pub source_key: String,

    #[garde(length(min = 1, max = 1024))]
    pub target_key: Option<String>,

    #[garde(range(min = 2, max = 4320))]
    pub height: Option<u32>,

    #[garde(skip)]
    pub make_public: Option<bool>,
}

/// Pub/Sub push envelope delivered to `POST /process-video`.
#[derive(Debug, Deserialize, Validate)]
pub struct PubSubPushRequest {
    #[garde(dive)]
    pub message: PubSubMessage,

    #[garde(skip)]
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PubSubMessage {
    /// Base64-encoded JSON payload.
    #[garde(length(min = 1))]
    pub data: String,

    #[garde(skip)]
    #[serde(default, rename = "messageId", alias = "message_id")]
    pub message_id: Option<String>,
}

/// Payload carried in a storage upload notification.
#[derive(Debug, Deserialize)]
pub struct UploadNotification {
    pub name: String,
}

impl PubSubPushRequest {
    /// Decode the notification carried in the message data.
    pub fn notification(&self) -> Result<UploadNotification, RequestError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(self.message.data.trim())
            .map_err(|e| RequestError::Encoding(e.to_string()))?;
        let notification: UploadNotification = serde_json::from_slice(&raw)?;
        if notification.name.is_empty() {
            return Err(RequestError::MissingName);
        }
        Ok(notification)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Message data is not valid base64: {0}")]
    Encoding(String),

    #[error("Message payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Message payload has no object name")]
    MissingName,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(payload: &str) -> PubSubPushRequest {
        PubSubPushRequest {
            message: PubSubMessage {
                data: base64::engine::general_purpose::STANDARD.encode(payload),
                message_id: Some("1".to_string()),
            },
            subscription: None,
        }
    }

    #[test]
    fn test_decode_notification() {
        let request = envelope(r#"{"name":"clip.mp4","bucket":"raw-videos"}"#);
        assert_eq!(request.notification().unwrap().name, "clip.mp4");
    }

    #[test]
    fn test_decode_rejects_empty_name() {
        let request = envelope(r#"{"name":""}"#);
        assert!(matches!(request.notification(), Err(RequestError::MissingName)));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let mut request = envelope("{}");
        request.message.data = "***".to_string();
        assert!(matches!(request.notification(), Err(RequestError::Encoding(_))));
    }

    #[test]
    fn test_envelope_from_json() {
        let body = r#"{"message":{"data":"eyJuYW1lIjoiY2xpcC5tcDQifQ==","messageId":"42"},"subscription":"projects/p/subscriptions/s"}"#;
        let request: PubSubPushRequest = serde_json::from_str(body).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.message.message_id.as_deref(), Some("42"));
        assert_eq!(request.notification().unwrap().name, "clip.mp4");
    }

    #[test]
    fn test_submit_request_validation() {
        let request = SubmitJobRequest {
            source_key: String::new(),
            target_key: None,
            height: Some(1),
            make_public: None,
        };
        assert!(request.validate().is_err());
    }
}
