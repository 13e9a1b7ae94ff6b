//! Plain-text tables for terminal output.

use std::fmt::Write as _;

use saferplace_incident_models::Incident;
use saferplace_region_models::Region;

const DESCRIPTION_WIDTH: usize = 48;

/// One line per region, north to south then west to east.
pub fn regions_table(regions: &[Region]) -> String {
    let mut out = format!(
        "{:>10} {:>10} {:>11} {:>11}\n{}\n",
        "NORTH",
        "SOUTH",
        "WEST",
        "EAST",
        "-".repeat(45)
    );
    for region in regions {
        let _ = writeln!(
            out,
            "{:>10} {:>10} {:>11} {:>11}",
            region.north, region.south, region.west, region.east
        );
    }
    out
}

/// One line per incident with its position, status and a shortened
/// description.
pub fn incidents_table(incidents: &[Incident]) -> String {
    let mut out = format!(
        "{:<24} {:>10} {:>11} {:<10} DESCRIPTION\n{}\n",
        "ID",
        "LAT",
        "LON",
        "STATUS",
        "-".repeat(80)
    );
    for incident in incidents {
        let _ = writeln!(
            out,
            "{:<24} {:>10.5} {:>11.5} {:<10} {}",
            incident.id,
            incident.coordinates.lat,
            incident.coordinates.lon,
            incident.resolution.to_string(),
            truncate(incident.description.lines().next().unwrap_or_default())
        );
    }
    out
}

/// Every field of one incident.
pub fn incident_details(incident: &Incident) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "id:          {}", incident.id);
    if let Some(timestamp) = incident.timestamp {
        let _ = writeln!(out, "reported:    {}", timestamp.to_rfc3339());
    }
    let _ = writeln!(
        out,
        "position:    {}, {}",
        incident.coordinates.lat, incident.coordinates.lon
    );
    let _ = writeln!(out, "status:      {}", incident.resolution);
    if let Some(image_id) = &incident.image_id {
        let _ = writeln!(out, "image:       {image_id}");
    }
    let _ = writeln!(out, "description: {}", incident.description);
    for comment in &incident.reviewer_comments {
        let when = comment
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let _ = writeln!(out, "  [{when}] {}: {}", comment.author_id, comment.message);
    }
    out
}

fn truncate(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_WIDTH {
        let short: String = text.chars().take(DESCRIPTION_WIDTH - 3).collect();
        format!("{short}...")
    } else {
        text.to_string()
    }
}
