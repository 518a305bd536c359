//! Bearing to a home marker from the homing collaborator's report.

use courier_types::MarkerDetection;

/// Signed bearing in degrees of a pixel column, negative = left of center.
///
/// `(center_x - width / 2) / width * fov_deg`, so the frame edges map to
/// `±fov_deg / 2`. A zero width yields 0.
pub fn pixel_offset_bearing(center_x: i32, width: u32, fov_deg: f64) -> f64 {
    if width == 0 {
        return 0.0;
    }
    let offset = f64::from(center_x) - f64::from(width / 2);
    offset / f64::from(width) * fov_deg
}

/// The collaborator's solved angle when it has one, the pixel-offset
/// estimate otherwise. Not clamped.
pub fn marker_bearing(marker: &MarkerDetection, width: u32, fov_deg: f64) -> f64 {
    marker
        .angle
        .unwrap_or_else(|| pixel_offset_bearing(marker.center_x, width, fov_deg))
}
