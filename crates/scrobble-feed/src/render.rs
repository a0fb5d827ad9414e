//! Plain-text renderings of the feed for the terminal.

use chrono::{DateTime, Local, TimeZone, Utc};
use scrobble_proto::feed::{ArtistSummary, FeedPage};
use scrobble_proto::model::AggregationStage;
use scrobble_proto::{FetchProgress, Scrobble};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// "just now", "5 minutes ago", "3 hours ago", "2 days ago".
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds().max(0);
    let (n, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3599 => (secs / 60, "minute"),
        3600..=86_399 => (secs / 3600, "hour"),
        _ => (secs / 86_400, "day"),
    };
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// Clip to `width` display columns, marking the cut with an ellipsis.
fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('\u{2026}');
    out
}

fn pad_right(s: &str, width: usize) -> String {
    let s = truncate(s, width);
    let fill = width.saturating_sub(s.width());
    format!("{}{}", s, " ".repeat(fill))
}

/// Two-line card: who played what, then album and when.
pub fn card(s: &Scrobble, now: DateTime<Utc>) -> String {
    let mut out = format!("{}  {} \u{2013} {}", s.handle, s.artist, s.track);
    out.push_str("\n    ");
    if let Some(album) = &s.album {
        out.push_str(album);
        out.push_str(" \u{b7} ");
    }
    out.push_str(&relative_time(s.timestamp, now));
    out
}

pub fn cards(page: &FeedPage<'_>, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for s in page.scrobbles {
        out.push_str(&card(s, now));
        out.push('\n');
    }
    out.push_str(&footer(page));
    out
}

const COLUMNS: [(&str, usize); 5] = [
    ("USER", 16),
    ("ARTIST", 24),
    ("TRACK", 30),
    ("ALBUM", 24),
    ("WHEN", 16),
];

pub fn table(page: &FeedPage<'_>, now: DateTime<Utc>) -> String {
    let mut out = row(COLUMNS.map(|(name, _)| name.to_string()));
    for s in page.scrobbles {
        out.push_str(&row([
            s.handle.clone(),
            s.artist.clone(),
            s.track.clone(),
            s.album.clone().unwrap_or_default(),
            relative_time(s.timestamp, now),
        ]));
    }
    out.push_str(&footer(page));
    out
}

fn row(cells: [String; 5]) -> String {
    let mut line = cells
        .iter()
        .zip(COLUMNS)
        .map(|(cell, (_, width))| pad_right(cell, width))
        .collect::<Vec<_>>()
        .join(" ");
    line.truncate(line.trim_end().len());
    line.push('\n');
    line
}

fn footer(page: &FeedPage<'_>) -> String {
    if page.total == 0 {
        return "No scrobbles from you or your friends in the last 24 hours.\n".to_string();
    }
    let mut out = format!("Showing {} of {}", page.scrobbles.len(), page.total);
    if page.has_more {
        out.push_str(&format!(" (--page {} for more)", page.page + 1));
    }
    out.push('\n');
    out
}

/// Wall-clock time of `ts` in `tz`, as HH:MM:SS.
pub fn clock_time<Tz: TimeZone>(ts: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.with_timezone(tz).format("%H:%M:%S").to_string()
}

/// Artist table with the local time of each artist's last play.
pub fn artists(summary: &[ArtistSummary]) -> String {
    artists_in(summary, &Local)
}

fn artists_in<Tz: TimeZone>(summary: &[ArtistSummary], tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = format!(
        "{} {:>5} {} {}\n",
        pad_right("ARTIST", 28),
        "PLAYS",
        pad_right("LAST", 8),
        "LISTENERS"
    );
    for a in summary {
        out.push_str(&format!(
            "{} {:>5} {} {}\n",
            pad_right(&a.artist, 28),
            a.play_count,
            pad_right(&clock_time(a.last_played, tz), 8),
            a.listeners.join(", ")
        ));
    }
    out
}

/// One status line for stderr while a feed is loading.
pub fn progress_line(p: &FetchProgress) -> String {
    match p.stage {
        AggregationStage::FetchingFriendsPaged if p.users_total > 0 => format!(
            "{} ({}/{} users)",
            p.status, p.users_processed, p.users_total
        ),
        _ => p.status.clone(),
    }
}
