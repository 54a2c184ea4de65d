//! Small formatting helpers.

/// Human-readable duration: `1 day 2 hours 5 seconds`.
///
/// Zero components are left out; a zero or negative duration reads
/// `0 seconds`.
pub fn human_time(secs: i64) -> String {
    if secs <= 0 {
        return "0 seconds".to_string();
    }

    let parts = [
        (secs / 86_400, "day"),
        ((secs % 86_400) / 3_600, "hour"),
        ((secs % 3_600) / 60, "minute"),
        (secs % 60, "second"),
    ];

    parts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n} {unit}{}", if *n == 1 { "" } else { "s" }))
        .collect::<Vec<_>>()
        .join(" ")
}
