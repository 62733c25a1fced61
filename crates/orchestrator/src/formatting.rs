//! Distress message text.

use database::LocationSample;
use guardian_core::TriggerMethod;
use repositories::AlertHandle;

/// Build the text sent to every emergency contact.
///
/// The location part prefers the street address and falls back to
/// coordinates; a maps link is added whenever a position is known. The alert
/// id is only included once the backend has assigned one.
pub fn distress_message(
    method: TriggerMethod,
    location: Option<&LocationSample>,
    alert: Option<&AlertHandle>,
) -> String {
    let mut message = String::from("EMERGENCY: I need help!");
    message.push_str(&format!(" Reason: {}.", method.describe()));

    if let Some(location) = location {
        message.push_str(" My current location: ");
        match location.address.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(address) => message.push_str(address),
            None => message.push_str(&format!(
                "Lat: {}, Long: {}",
                location.latitude, location.longitude
            )),
        }
        message.push(' ');
        message.push_str(&location.point().maps_link());
    }

    if let Some(id) = alert.and_then(AlertHandle::remote_id) {
        message.push_str(" Alert ID: ");
        message.push_str(id);
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(address: Option<&str>) -> LocationSample {
        LocationSample {
            id: "loc-1".to_string(),
            latitude: 28.6139,
            longitude: 77.209,
            address: address.map(str::to_string),
            timestamp: 0,
            accuracy: 5.0,
        }
    }

    #[test]
    fn test_message_with_address_and_alert() {
        let text = distress_message(
            TriggerMethod::Shake,
            Some(&sample(Some("Connaught Place, New Delhi"))),
            Some(&AlertHandle::Remote("A1".to_string())),
        );
        assert_eq!(
            text,
            "EMERGENCY: I need help! Reason: shake alert. My current location: \
             Connaught Place, New Delhi https://maps.google.com/?q=28.6139,77.209 Alert ID: A1"
        );
    }

    #[test]
    fn test_message_falls_back_to_coordinates() {
        let text = distress_message(TriggerMethod::Voice, Some(&sample(Some("  "))), None);
        assert!(text.contains("Lat: 28.6139, Long: 77.209"));
        assert!(text.contains("https://maps.google.com/?q=28.6139,77.209"));
        assert!(!text.contains("Alert ID"));
    }

    #[test]
    fn test_queued_alert_id_is_not_shared() {
        let text = distress_message(
            TriggerMethod::FallAutomatic,
            None,
            Some(&AlertHandle::Queued("local_abc".to_string())),
        );
        assert_eq!(
            text,
            "EMERGENCY: I need help! Reason: fall detected, no response from user."
        );
    }
}
