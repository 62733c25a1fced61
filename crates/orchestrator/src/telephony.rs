//! Telephony trait and implementations.

use async_trait::async_trait;
use tracing::info;

use crate::error::TelephonyError;

/// Longest body sent as a single text.
pub const SINGLE_SEGMENT_LEN: usize = 160;

/// Segment length once a body has to be split (room for the part header).
pub const MULTIPART_SEGMENT_LEN: usize = 153;

/// Split a text body into the segments it is sent as.
pub fn split_message(body: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    if chars.len() <= SINGLE_SEGMENT_LEN {
        return vec![body.to_string()];
    }
    chars
        .chunks(MULTIPART_SEGMENT_LEN)
        .map(|segment| segment.iter().collect())
        .collect()
}

/// Trait for sending texts and placing calls.
///
/// Abstracted to support different carriers (device modem, SMS gateway, tests).
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Whether texts may be sent.
    fn can_send_sms(&self) -> bool;

    /// Whether calls may be placed.
    fn can_place_calls(&self) -> bool;

    /// Send an already segmented text as one (possibly multipart) message.
    async fn send_segments(&self, phone: &str, segments: &[String]) -> Result<(), TelephonyError>;

    /// Place a voice call.
    async fn place_call(&self, phone: &str) -> Result<(), TelephonyError>;

    /// Send a text, splitting it into parts above [`SINGLE_SEGMENT_LEN`] characters.
    async fn send_text(&self, phone: &str, body: &str) -> Result<(), TelephonyError> {
        if !self.can_send_sms() {
            return Err(TelephonyError::PermissionDenied("SMS"));
        }
        let segments = split_message(body);
        self.send_segments(phone, &segments).await
    }
}

/// A telephony that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpTelephony;

#[async_trait]
impl Telephony for NoOpTelephony {
    fn can_send_sms(&self) -> bool {
        true
    }

    fn can_place_calls(&self) -> bool {
        true
    }

    async fn send_segments(&self, _phone: &str, _segments: &[String]) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn place_call(&self, _phone: &str) -> Result<(), TelephonyError> {
        Ok(())
    }
}

/// A telephony that logs what it would send.
#[derive(Debug, Clone)]
pub struct LoggingTelephony {
    sms_permission: bool,
    call_permission: bool,
}

impl LoggingTelephony {
    pub fn new(sms_permission: bool, call_permission: bool) -> Self {
        Self {
            sms_permission,
            call_permission,
        }
    }
}

impl Default for LoggingTelephony {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[async_trait]
impl Telephony for LoggingTelephony {
    fn can_send_sms(&self) -> bool {
        self.sms_permission
    }

    fn can_place_calls(&self) -> bool {
        self.call_permission
    }

    async fn send_segments(&self, phone: &str, segments: &[String]) -> Result<(), TelephonyError> {
        for (index, segment) in segments.iter().enumerate() {
            info!(
                phone = phone,
                part = index + 1,
                parts = segments.len(),
                "[sms] {}",
                segment
            );
        }
        Ok(())
    }

    async fn place_call(&self, phone: &str) -> Result<(), TelephonyError> {
        info!(phone = phone, "[call] Dialing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_body_is_one_segment() {
        let body = "x".repeat(SINGLE_SEGMENT_LEN);
        assert_eq!(split_message(&body), vec![body.clone()]);
    }

    #[test]
    fn test_long_body_is_split_into_parts() {
        let body = "y".repeat(SINGLE_SEGMENT_LEN + 1);
        let parts = split_message(&body);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), MULTIPART_SEGMENT_LEN);
        assert_eq!(parts[1].len(), SINGLE_SEGMENT_LEN + 1 - MULTIPART_SEGMENT_LEN);
        assert_eq!(parts.concat(), body);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let body = "é".repeat(200);
        let parts = split_message(&body);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), MULTIPART_SEGMENT_LEN);
    }

    #[tokio::test]
    async fn test_send_text_requires_permission() {
        let telephony = LoggingTelephony::new(false, true);
        let result = telephony.send_text("+15551234567", "help").await;
        assert!(matches!(result, Err(TelephonyError::PermissionDenied("SMS"))));

        let telephony = LoggingTelephony::default();
        telephony.send_text("+15551234567", "help").await.unwrap();
        telephony.place_call("+15551234567").await.unwrap();
    }
}
