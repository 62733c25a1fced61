//! Recorded calls and programmable failures.

use guardian_core::AlertStatus;
use safety_api::{ApiError, ContactPayload, LocationUpdate, NewAlert};

/// Backend operations, used to target failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAlert,
    UpdateAlertStatus,
    AlertHistory,
    AddContact,
    UpdateContact,
    DeleteContact,
    Contacts,
    UpdateLocation,
    HealthCheck,
}

/// One call received by the mock, with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateAlert { user_id: String, alert: NewAlert },
    UpdateAlertStatus { alert_id: String, status: AlertStatus },
    AlertHistory { user_id: String },
    AddContact(ContactPayload),
    UpdateContact { contact_id: String, contact: ContactPayload },
    DeleteContact { contact_id: String },
    Contacts,
    UpdateLocation(LocationUpdate),
    HealthCheck,
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::CreateAlert { .. } => Operation::CreateAlert,
            Call::UpdateAlertStatus { .. } => Operation::UpdateAlertStatus,
            Call::AlertHistory { .. } => Operation::AlertHistory,
            Call::AddContact(_) => Operation::AddContact,
            Call::UpdateContact { .. } => Operation::UpdateContact,
            Call::DeleteContact { .. } => Operation::DeleteContact,
            Call::Contacts => Operation::Contacts,
            Call::UpdateLocation(_) => Operation::UpdateLocation,
            Call::HealthCheck => Operation::HealthCheck,
        }
    }
}

/// How a programmed failure presents to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Backend unavailable (HTTP 503), a transient failure.
    Unavailable,
    /// Backend answered `success: false` with this message.
    Rejected(String),
}

impl Failure {
    pub(crate) fn to_error(&self) -> ApiError {
        match self {
            Failure::Unavailable => ApiError::Status {
                code: 503,
                body: "service unavailable".to_string(),
            },
            Failure::Rejected(message) => ApiError::Rejected {
                message: message.clone(),
            },
        }
    }
}
