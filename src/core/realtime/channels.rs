// src/core/realtime/channels.rs

//! Channel key formatting for the platform's named realtime streams.

pub const ALERTS: &str = "alerts";
pub const DETECTIONS: &str = "detections";
pub const SYSTEM: &str = "system";

/// Key for the alerts stream.
pub fn alerts() -> String {
    ALERTS.to_string()
}

/// Key for detections, optionally narrowed to a single camera.
pub fn detections(camera_id: Option<&str>) -> String {
    match camera_id {
        Some(id) => format!("{DETECTIONS}?camera_id={id}"),
        None => DETECTIONS.to_string(),
    }
}

/// Key for one camera's live stream.
pub fn camera_stream(camera_id: &str) -> String {
    format!("cameras/{camera_id}/stream")
}

/// Key for system-wide events.
pub fn system() -> String {
    SYSTEM.to_string()
}
