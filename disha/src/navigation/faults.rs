//! Known engine fault codes.
//!
//! Failure reports from the engine carry a numeric code. When the engine
//! supplies no description, [`describe_fault`] provides the robot's standard
//! text for the codes relevant to mapping and navigation.

/// No fault.
pub const NO_FAULT: i32 = 0x0000;
/// Service invocation failed.
pub const SERVICE_INVOCATION_FAILED: i32 = 0x1101;
/// SLAM node lost.
pub const SLAM_NODE_LOST: i32 = 0x1306;
/// Navigation node lost.
pub const NAVIGATION_NODE_LOST: i32 = 0x1307;
/// No navigation TF data.
pub const NAV_NO_TF: i32 = 0x5201;
/// No navigation map data.
pub const NAV_NO_MAP: i32 = 0x5202;
/// No navigation localization data.
pub const NAV_NO_LOCALIZATION: i32 = 0x5203;
/// SLAM localization error.
pub const SLAM_LOCALIZATION_ERROR: i32 = 0x6201;
/// SLAM map data error.
pub const SLAM_MAP_DATA_ERROR: i32 = 0x6104;

/// Standard description of a fault code, if known.
pub fn describe_fault(code: i32) -> Option<&'static str> {
    let text = match code {
        0x0000 => "No fault",
        0x1101 => "Service invocation failed",
        0x1301 => "Central control node lost",
        0x1305 => "LIDAR node lost",
        0x1306 => "SLAM node lost",
        0x1307 => "Navigation node lost",
        0x130A => "Point cloud node lost",
        0x2201 => "No LIDAR data received",
        0x220B => "No odometry data received",
        0x220C => "No IMU data received",
        0x5201 => "No navigation TF data",
        0x5202 => "No navigation map data",
        0x5203 => "No navigation localization data",
        0x5204 => "No navigation LIDAR data",
        0x5205 => "No navigation depth camera data",
        0x5206 => "No navigation multi-line LIDAR data",
        0x5207 => "No navigation odometry data",
        0x6102 => "No SLAM LIDAR data",
        0x6103 => "No SLAM odometry data",
        0x6104 => "SLAM map data error",
        0x6201 => "SLAM localization error",
        _ => return None,
    };
    Some(text)
}

/// Description for a failure report, falling back to the fault table and
/// then to a generic message.
pub fn failure_description(code: i32, engine_desc: &str) -> String {
    if !engine_desc.is_empty() {
        return engine_desc.to_string();
    }
    match describe_fault(code) {
        Some(text) => text.to_string(),
        None => format!("navigation failed (code 0x{:04X})", code),
    }
}
