//! Fixed-width status table for listing routines.

use super::RoutineSnapshot;

const ID_WIDTH: usize = 8;
const CHANNEL_WIDTH: usize = 16;
const STATUS_WIDTH: usize = 30;

/// Render one page of the routine table. Pages are 1-based; out-of-range
/// pages are clamped.
pub fn render_page(routines: &[RoutineSnapshot], page: usize, per_page: usize) -> String {
    if routines.is_empty() {
        return "No active deletion routines.".to_string();
    }

    let per_page = per_page.max(1);
    let pages = routines.len().div_ceil(per_page);
    let page = page.clamp(1, pages);

    let mut out = row("ID", "CHANNEL", "STATUS", "DELETED", "CYCLES", "WINDOW");
    for routine in routines.iter().skip((page - 1) * per_page).take(per_page) {
        out.push_str(&row(
            &routine.id.short(),
            &routine.channel_name,
            &routine.status.to_string(),
            &routine.deleted_count.to_string(),
            &routine.cycle_count.to_string(),
            &routine.window,
        ));
    }
    out.push_str(&format!(
        "Page {page}/{pages} ({} routines)",
        routines.len()
    ));
    out
}

fn row(id: &str, channel: &str, status: &str, deleted: &str, cycles: &str, window: &str) -> String {
    format!(
        "{:<ID_WIDTH$}  {:<CHANNEL_WIDTH$}  {:<STATUS_WIDTH$}  {:>7}  {:>6}  {}\n",
        truncate(id, ID_WIDTH),
        truncate(channel, CHANNEL_WIDTH),
        truncate(status, STATUS_WIDTH),
        deleted,
        cycles,
        window
    )
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width - 1).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{NewRoutine, Routine, Threshold},
        store::{ChannelId, ChannelInfo, ChannelKind},
    };

    fn snapshots(count: usize) -> Vec<RoutineSnapshot> {
        (0..count)
            .map(|i| {
                Routine::new(NewRoutine {
                    channel: ChannelInfo {
                        id: ChannelId::new(i.to_string()),
                        name: format!("channel-{i}"),
                        kind: ChannelKind::Text,
                    },
                    report_to: ChannelId::new("requests"),
                    threshold: Threshold::max_age(30).unwrap(),
                })
                .snapshot()
            })
            .collect()
    }

    #[test]
    fn test_empty() {
        assert_eq!(render_page(&[], 1, 10), "No active deletion routines.");
    }

    #[test]
    fn test_pagination() {
        let routines = snapshots(12);

        let first = render_page(&routines, 1, 10);
        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 12);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("channel-0"));
        assert!(lines[1].contains("older than 30 days"));
        assert_eq!(lines[11], "Page 1/2 (12 routines)");

        let second = render_page(&routines, 2, 10);
        assert_eq!(second.lines().count(), 4);
        assert!(second.contains("channel-11"));

        assert_eq!(render_page(&routines, 9, 10), second);
        assert_eq!(render_page(&routines, 0, 10), first);
    }

    #[test]
    fn test_columns_are_aligned() {
        let routines = snapshots(3);
        let table = render_page(&routines, 1, 10);
        let offsets: Vec<Option<usize>> = table
            .lines()
            .take(4)
            .map(|line| line.find("older than").or_else(|| line.find("WINDOW")))
            .collect();
        assert!(offsets.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("general", 16), "general");
        assert_eq!(truncate("a-very-long-channel-name", 8), "a-very-…");
    }
}
