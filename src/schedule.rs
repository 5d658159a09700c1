//! Publication slots for a batch of uploads.

use anyhow::{Context, Result};
use chrono::{DateTime, Days, FixedOffset, Local, NaiveTime};

pub fn parse_slots(slots: &[String]) -> Result<Vec<NaiveTime>> {
    let mut parsed = slots
        .iter()
        .map(|s| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .with_context(|| format!("invalid schedule slot '{}', expected HH:MM", s))
        })
        .collect::<Result<Vec<_>>>()?;
    parsed.sort();
    parsed.dedup();
    Ok(parsed)
}

pub fn local_now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// Where a new batch starts booking: after `now`, or after the last slot
/// already booked if that lies further ahead. The result keeps `now`'s offset.
pub fn schedule_start(now: DateTime<FixedOffset>, last_booked: Option<DateTime<FixedOffset>>) -> DateTime<FixedOffset> {
    match last_booked {
        Some(last) if last > now => last.with_timezone(now.offset()),
        _ => now,
    }
}

/// The next `count` slot times strictly after `now`, walking forward day by
/// day in `now`'s offset.
pub fn generate_schedule(count: usize, now: DateTime<FixedOffset>, slots: &[NaiveTime]) -> Vec<DateTime<FixedOffset>> {
    let mut out = Vec::with_capacity(count);
    if slots.is_empty() {
        return out;
    }

    let offset = *now.offset();
    let mut day = now.date_naive();
    while out.len() < count {
        for slot in slots {
            let Some(at) = day.and_time(*slot).and_local_timezone(offset).single() else {
                continue;
            };
            if at > now {
                out.push(at);
                if out.len() == count {
                    break;
                }
            }
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    out
}
