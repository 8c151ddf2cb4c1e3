//! The contact form: validate, then POST as JSON to `/contact/`.

use crate::error::SessionError;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONTACT_ENDPOINT: &str = "/contact/";

/// A message for the service operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactMessage {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            message: message.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        for (field, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("message", &self.message),
        ] {
            if value.trim().is_empty() {
                return Err(SessionError::InvalidOptions(format!("{field} is required")));
            }
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(SessionError::InvalidOptions(format!(
                "'{email}' is not an email address"
            ))),
        }
    }

    /// Validate and send. The backend answers `201 Created`; `200` is
    /// accepted too.
    pub async fn send(&self, transport: &dyn Transport) -> Result<(), SessionError> {
        self.validate()?;
        let body = serde_json::to_value(self).map_err(|e| SessionError::Internal(e.to_string()))?;
        let response = transport.post_json(CONTACT_ENDPOINT, body).await?;
        match response.status {
            200 | 201 => {
                info!("Contact message from {} delivered", self.email);
                Ok(())
            }
            status => Err(SessionError::HttpStatus {
                status,
                endpoint: CONTACT_ENDPOINT.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::transport::{MockTransport, Recorded};

    fn message() -> ContactMessage {
        ContactMessage::new("Ada", "ada@example.org", "The merge tool is great")
    }

    #[test]
    fn validation_rules() {
        assert!(message().validate().is_ok());
        let mut m = message();
        m.name = "  ".into();
        assert!(m.validate().is_err());
        let mut m = message();
        m.email = "ada.example.org".into();
        assert!(m.validate().is_err());
        let mut m = message();
        m.email = "@example.org".into();
        assert!(m.validate().is_err());
    }

    #[tokio::test]
    async fn created_counts_as_success() {
        let mock = MockTransport::new();
        mock.respond_status(201);
        message().send(&mock).await.unwrap();
        match &mock.requests()[0] {
            Recorded::PostJson { endpoint, body } => {
                assert_eq!(endpoint, CONTACT_ENDPOINT);
                assert_eq!(body["email"], "ada@example.org");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_message_is_never_sent() {
        let mock = MockTransport::new();
        let err = ContactMessage::new("", "", "").send(&mock).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let mock = MockTransport::new();
        mock.respond_status(400);
        let err = message().send(&mock).await.unwrap_err();
        assert!(matches!(err, SessionError::HttpStatus { status: 400, .. }));
    }
}
