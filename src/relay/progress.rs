//! Transfer progress rendering.

const MIB: f64 = 1024.0 * 1024.0;

/// Render the boxed progress block shown in batch status messages.
///
/// `speed` is in bytes per second.
pub fn format_progress(current: u64, total: u64, speed: f64) -> String {
    let percentage = if total > 0 {
        current as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let current_mb = current as f64 / MIB;
    let total_mb = total as f64 / MIB;
    let speed_kb = speed / 1024.0;

    let eta = if speed > 0.0 {
        total.saturating_sub(current) as f64 / speed
    } else {
        0.0
    };
    let eta_min = (eta / 60.0) as u64;
    let eta_sec = (eta % 60.0) as u64;

    let bars = ((percentage / 10.0) as usize).min(10);
    let bar: String = "♦".repeat(bars) + &"◇".repeat(10 - bars);

    format!(
        "╭─────────────────────╮\n\
         │      Downloading...\n\
         ├─────────────────────\n\
         │ {bar}\n\
         │ \n\
         │ Completed: {current_mb:.1} MB/{total_mb:.2} MB\n\
         │ Bytes: {percentage:.2}%\n\
         │ Speed: {speed_kb:.2} KB/s\n\
         │ ETA: {eta_min}m, {eta_sec}s\n\
         ╰─────────────────────╯"
    )
}
