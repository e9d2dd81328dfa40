//! Output formatting helpers.

use trailmesh_core::types::NodeId;

/// Format a byte count as a human-readable string.
pub fn size_str(num: u64) -> String {
    if num < 1000 {
        return format!("{} B", num);
    }
    let units = ["B", "KB", "MB", "GB"];
    let mut val = num as f64;
    let mut unit_idx = 0;
    while val >= 1000.0 && unit_idx < units.len() - 1 {
        val /= 1000.0;
        unit_idx += 1;
    }
    format!("{:.2} {}", val, units[unit_idx])
}

/// Render a motion alert path as `3 -> 4 -> 1`.
pub fn path_str(path: &[NodeId]) -> String {
    if path.is_empty() {
        return "(no path)".into();
    }
    path.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
