//! `librarian status`: the latest heartbeat and recent history, as the
//! monitoring dashboard sees them.

use librarian_ledger::ServiceStatus;
use std::fmt::Write;
use time::UtcDateTime;
use time::format_description::well_known::Rfc3339;

pub fn render(service_name: &str, latest: Option<&ServiceStatus>, history: &[ServiceStatus]) -> String {
    let Some(latest) = latest else {
        return format!("{service_name} has never reported a heartbeat\n");
    };
    let mut out = format!(
        "{service_name}: {} ({}) at {}\n",
        latest.status.as_str(),
        task(latest),
        timestamp(latest.last_heartbeat)
    );
    if !history.is_empty() {
        out.push_str("Recent heartbeats:\n");
    }
    for beat in history {
        _ = writeln!(out, "  {}  {:<7}  {}", timestamp(beat.last_heartbeat), beat.status.as_str(), task(beat));
    }
    out
}

fn task(beat: &ServiceStatus) -> &str {
    beat.current_task.as_deref().unwrap_or("idle")
}

fn timestamp(at: UtcDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}
