use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::aggregate::device_totals;
use crate::models::SummaryRow;

const HOUR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fixed-width preview of the first `limit` rows, for the log.
pub fn render_table(rows: &[SummaryRow], limit: usize) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{:<16} {:<19} {:>15} {:>12} {:>17}",
        "device_id", "hour_start", "max_temperature", "sample_count", "total_distance_km"
    );

    for row in rows.iter().take(limit) {
        let _ = writeln!(
            output,
            "{:<16} {:<19} {:>15} {:>12} {:>17.3}",
            row.device_id,
            row.hour_start.format(HOUR_FORMAT),
            row.max_temperature,
            row.sample_count,
            row.total_distance_km
        );
    }

    if rows.len() > limit {
        let _ = writeln!(output, "... {} more rows", rows.len() - limit);
    }
    let _ = write!(output, "[{} rows]", rows.len());

    output
}

pub fn build_report(table: &str, generated_at: DateTime<Utc>, rows: &[SummaryRow]) -> String {
    let totals = device_totals(rows);
    let mut output = String::new();

    let _ = writeln!(output, "# Device Statistics Report");
    let _ = writeln!(
        output,
        "Generated {} from `{}` ({} hourly rows)",
        generated_at.format(HOUR_FORMAT),
        table,
        rows.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Devices");

    if totals.is_empty() {
        let _ = writeln!(output, "No device data was aggregated in this run.");
    } else {
        for device in totals.iter() {
            let _ = writeln!(
                output,
                "- {}: {} samples over {} hours, peak {} degrees, {:.3} km travelled",
                device.device_id,
                device.samples,
                device.hours,
                device.peak_temperature,
                device.distance_km
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hourly Summary");

    if rows.is_empty() {
        let _ = writeln!(output, "No hourly rows stored.");
    } else {
        let _ = writeln!(
            output,
            "| device_id | hour_start | max_temperature | sample_count | total_distance_km |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|");
        for row in rows {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {:.3} |",
                row.device_id,
                row.hour_start.format(HOUR_FORMAT),
                row.max_temperature,
                row.sample_count,
                row.total_distance_km
            );
        }
    }

    output
}
