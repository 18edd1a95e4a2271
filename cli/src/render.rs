//! Plain-text rendering for terminal output.

use std::fmt::Write as _;

use ticketing::{Desk, Location, Selection, Ticket, available_actions};

/// Ticket list as an aligned table, in-call ticket first and marked `*`.
pub fn ticket_table(tickets: &[Ticket]) -> String {
    if tickets.is_empty() {
        return "No waiting tickets.\n".to_owned();
    }
    let mut ordered = tickets.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|t| !t.in_call);

    let mut out = format!("  {:<6} {:<20} {:<10} {:<8} {}\n", "CODE", "QUEUE", "STATUS", "ISSUED", "ACTIONS");
    for ticket in ordered {
        let marker = if ticket.in_call { '*' } else { ' ' };
        let queue = ticket.queue_name.as_deref().unwrap_or(&ticket.queue_id);
        let actions = available_actions(ticket)
            .iter()
            .map(|a| a.verb())
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(
            out,
            "{marker} {:<6} {:<20} {:<10} {:<8} {actions}  [{}]",
            ticket.code(),
            truncate(queue, 20),
            ticket.status.label(),
            ticket.issued_at(),
            ticket.id,
        );
    }
    out
}

pub fn location_line(location: &Location) -> String {
    let address = location.address_line();
    if address.is_empty() {
        format!("{}  {}", location.id, location.name)
    } else {
        format!("{}  {}  ({address})", location.id, location.name)
    }
}

pub fn desk_line(desk: &Desk) -> String {
    format!("{}  {} (#{})", desk.id, desk.name, desk.number)
}

pub fn selection_summary(selection: &Selection) -> String {
    let location = selection
        .location
        .as_ref()
        .map_or_else(|| "none".to_owned(), |l| format!("{} [{}]", l.name, l.id));
    let desk = selection
        .desk
        .as_ref()
        .map_or_else(|| "none".to_owned(), |d| format!("{} [{}]", d.name, d.id));
    format!("location: {location}\ndesk:     {desk}")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        let mut cut = s.chars().take(max.saturating_sub(1)).collect::<String>();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
