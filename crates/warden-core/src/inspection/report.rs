use chrono::{DateTime, Utc};

use crate::{
    domain::{ServerId, User},
    inspection::{AccountAge, Inspection},
};

/// Why an inspection report was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InspectReason {
    Manual,
    Joined,
    BannedElsewhere,
}

pub fn progress_text(user: &User, done: usize, total: usize) -> String {
    format!(
        "**Inspecting `{}`** (#{})\nChecking servers... {done}/{total}",
        user.name, user.id
    )
}

/// Final plain-text report.
///
/// `current_server` is where the report is shown; a failed ban lookup there gets
/// an extra hint since it is the one server an admin can fix.
pub fn render(
    user: &User,
    inspection: &Inspection,
    current_server: ServerId,
    reason: InspectReason,
    now: DateTime<Utc>,
) -> String {
    let result = &inspection.result;
    let mut out = format!("**Inspection of `{}`** (#{})\nInspection done.", user.name, user.id);

    match reason {
        InspectReason::Manual => {}
        InspectReason::Joined => out.push_str("\n_inspected because User joined this Server._"),
        InspectReason::BannedElsewhere => {
            out.push_str("\n_inspected because User got banned on a different Server._")
        }
    }

    if result.failed.contains(&current_server) {
        out.push_str(
            "\n⚠ I wasn't able to gather the ban list for this server!\n\
             Please give me the permission `Ban Members` to help other servers.",
        );
    }

    let checked = result.checked(inspection.total_servers);
    out.push_str("\n\n**Bans**\n");
    if result.banned_on.is_empty() {
        out.push_str(&format!(
            "✅ User is banned on none servers.\n▪Checked {checked} servers."
        ));
    } else {
        out.push_str(&format!(
            "⚠ User is banned on **{}** servers.\n▪Checked {checked} servers.",
            result.banned_on.len()
        ));
    }

    out.push_str("\n\n**Common Servers**\n");
    let others = result.other_common_servers();
    if others > 0 {
        out.push_str(&format!("✅ User is on **{others}** other servers with me."));
    } else {
        out.push_str("❓ User is on **none** other servers with me.");
    }

    out.push_str("\n\n**Account Age**\n");
    let joined = inspection.created_at.format("%a %b %e %H:%M:%S %Y");
    match inspection.account_age {
        AccountAge::Established => out.push_str(&format!(
            "✅ User Account got created {}.\n▪Joined at {joined}.",
            since_in_days(inspection.created_at, now)
        )),
        AccountAge::Recent => out.push_str(&format!(
            "❓ User Account is less than one Week old.\n▪Joined at {joined}."
        )),
        AccountAge::NewlyCreated => out.push_str(&format!(
            "⚠ User Account is less than one Day old.\n▪Joined at {joined}."
        )),
    }

    out.push_str(&format!(
        "\n\nUser ID: {} | Servers: {}",
        user.id, inspection.total_servers
    ));
    out
}

fn since_in_days(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match now.signed_duration_since(then).num_days() {
        d if d <= 0 => "today".to_string(),
        1 => "1 day ago".to_string(),
        d => format!("{d} days ago"),
    }
}
