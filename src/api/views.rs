//! HTML rendering for the status page

use std::fmt::Write;

use super::models::StatusView;
use crate::schedule::Command;

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;margin-bottom:1.5em}\
td,th{border:1px solid #ccc;padding:.25em .75em;text-align:left}\
tr.current{background:#ffe9a8;font-weight:bold}\
td.high{color:#b00}td.low{color:#06c}.muted{color:#888}";

pub fn render_status(view: &StatusView) -> String {
    let mut html = String::with_capacity(8 * 1024);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta http-equiv=\"refresh\" content=\"300\">\n");
    html.push_str("<title>Spa control</title>\n");
    let _ = writeln!(html, "<style>{}</style>\n</head>\n<body>", STYLE);
    let _ = writeln!(
        html,
        "<h1>Spa control</h1>\n<p class=\"muted\">{} (hour {})</p>",
        view.now.format("%Y-%m-%d %H:%M %Z"),
        view.current_hour
    );

    render_spa(&mut html, view);
    render_schedule(&mut html, view);
    render_history(&mut html, view);

    html.push_str("</body>\n</html>\n");
    html
}

fn render_spa(html: &mut String, view: &StatusView) {
    html.push_str("<h2>Spa</h2>\n<table>\n");
    match view.spa {
        Some(spa) => {
            let _ = writeln!(
                html,
                "<tr><th>Current temperature</th><td>{}</td></tr>",
                temp(spa.current_temp)
            );
            let _ = writeln!(
                html,
                "<tr><th>Desired temperature</th><td>{}</td></tr>",
                temp(spa.desired_temp)
            );
        }
        None => html.push_str("<tr><th>Status</th><td>unavailable</td></tr>\n"),
    }

    let manual = match view.override_until {
        Some(until) if until > view.now => {
            format!("active until {}", until.format("%Y-%m-%d %H:%M"))
        }
        Some(until) => format!("expired at {}", until.format("%Y-%m-%d %H:%M")),
        None => "inactive".to_string(),
    };
    let _ = writeln!(html, "<tr><th>Manual override</th><td>{}</td></tr>", manual);

    let _ = writeln!(
        html,
        "<tr><th>Low / high</th><td>{} / {}</td></tr>",
        temp(view.temp_low),
        temp(view.temp_high)
    );
    if let Some(fixed) = view.temp_override {
        let _ = writeln!(
            html,
            "<tr><th>Fixed temperature</th><td>{} (schedule ignored)</td></tr>",
            temp(fixed)
        );
    }
    html.push_str("</table>\n");
}

fn render_schedule(html: &mut String, view: &StatusView) {
    html.push_str("<h2>Schedule</h2>\n");
    let Some(schedule) = &view.schedule else {
        html.push_str("<p>No schedule fetched from porssari.fi yet.</p>\n");
        return;
    };

    let published = match (&schedule.date, &schedule.time) {
        (Some(date), Some(time)) => format!("{} {}", escape(date), escape(time)),
        (Some(date), None) => escape(date),
        _ => "unknown".to_string(),
    };
    let _ = writeln!(
        html,
        "<p class=\"muted\">Published {}, fetched {}</p>",
        published,
        schedule.fetched_at.format("%Y-%m-%d %H:%M")
    );

    html.push_str("<table>\n<tr><th>Hour</th><th>Command</th><th>Target</th></tr>\n");
    for row in &schedule.hours {
        let (class, label) = match row.command {
            Command::High => ("high", "high"),
            Command::Low => ("low", "low"),
        };
        let label = if row.scheduled {
            label.to_string()
        } else {
            format!("{} <span class=\"muted\">(default)</span>", label)
        };
        let _ = writeln!(
            html,
            "<tr{}><td>{:02}:00</td><td class=\"{}\">{}</td><td>{}</td></tr>",
            if row.current { " class=\"current\"" } else { "" },
            row.hour,
            class,
            label,
            temp(row.target)
        );
    }
    html.push_str("</table>\n");
}

fn render_history(html: &mut String, view: &StatusView) {
    if view.history.is_empty() {
        return;
    }

    html.push_str("<h2>Recent control runs</h2>\n<table>\n");
    html.push_str(
        "<tr><th>Time</th><th>Hour</th><th>Command</th><th>Target</th><th>Spa setpoint</th><th>Action</th></tr>\n",
    );
    for row in &view.history {
        let action = match &row.detail {
            Some(detail) => format!("{}: {}", escape(&row.action), escape(detail)),
            None => escape(&row.action),
        };
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{:02}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.at.format("%m-%d %H:%M"),
            row.hour,
            row.command.map_or("-", |c| c.as_str()),
            row.target.map_or_else(|| "-".to_string(), temp),
            row.observed.map_or_else(|| "-".to_string(), temp),
            action
        );
    }
    html.push_str("</table>\n");
}

fn temp(value: f64) -> String {
    format!("{:.1}&nbsp;&deg;", value)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
