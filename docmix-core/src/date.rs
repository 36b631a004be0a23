//! PDF date strings
//!
//! Dates in the Info dictionary use the form `D:YYYYMMDDHHmmSSOHH'mm'`,
//! where every component after the year may be omitted and `O` is one of
//! `+`, `-` or `Z`. A missing offset is read as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

use crate::error::{DocMixError, Result};

/// Decode a raw PDF date string.
pub fn decode(raw: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    let text = trimmed.strip_prefix("D:").unwrap_or(trimmed);
    let bytes = text.as_bytes();
    let mut pos = 0;

    let year = read_component(bytes, &mut pos, 4, None, raw)?;
    let month = read_component(bytes, &mut pos, 2, Some(1), raw)?;
    let day = read_component(bytes, &mut pos, 2, Some(1), raw)?;
    let hour = read_component(bytes, &mut pos, 2, Some(0), raw)?;
    let minute = read_component(bytes, &mut pos, 2, Some(0), raw)?;
    let second = read_component(bytes, &mut pos, 2, Some(0), raw)?;
    let offset = read_offset(bytes, &mut pos, raw)?;

    if pos != bytes.len() {
        return Err(malformed(raw, "trailing characters"));
    }

    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(|| malformed(raw, "component out of range"))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| malformed(raw, "ambiguous local time"))
}

/// Encode a date in the PDF date format, always with an explicit offset.
pub fn encode(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.abs() / 60;
    format!(
        "{}{}{:02}'{:02}'",
        date.format("D:%Y%m%d%H%M%S"),
        sign,
        minutes / 60,
        minutes % 60
    )
}

fn read_component(
    bytes: &[u8],
    pos: &mut usize,
    width: usize,
    default: Option<u32>,
    raw: &str,
) -> Result<u32> {
    let starts_with_digit = bytes.get(*pos).is_some_and(u8::is_ascii_digit);
    if !starts_with_digit {
        return default.ok_or_else(|| malformed(raw, "missing year"));
    }

    let end = *pos + width;
    let digits = bytes
        .get(*pos..end)
        .filter(|d| d.iter().all(u8::is_ascii_digit))
        .ok_or_else(|| malformed(raw, "truncated component"))?;

    *pos = end;
    Ok(digits
        .iter()
        .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0')))
}

fn read_offset(bytes: &[u8], pos: &mut usize, raw: &str) -> Result<FixedOffset> {
    let utc = FixedOffset::east_opt(0).ok_or_else(|| malformed(raw, "offset"))?;

    let sign = match bytes.get(*pos) {
        None => return Ok(utc),
        Some(b'Z') => {
            // Some writers emit `Z00'00'`; the digits carry no information.
            *pos = bytes.len();
            return Ok(utc);
        }
        Some(b'+') => 1,
        Some(b'-') => -1,
        Some(_) => return Err(malformed(raw, "unexpected offset marker")),
    };
    *pos += 1;

    let hours = read_component(bytes, pos, 2, Some(0), raw)?;
    if bytes.get(*pos) == Some(&b'\'') {
        *pos += 1;
    }
    let minutes = read_component(bytes, pos, 2, Some(0), raw)?;
    if bytes.get(*pos) == Some(&b'\'') {
        *pos += 1;
    }

    if hours > 23 || minutes > 59 {
        return Err(malformed(raw, "offset out of range"));
    }

    let seconds = sign * (hours as i32 * 3600 + minutes as i32 * 60);
    FixedOffset::east_opt(seconds).ok_or_else(|| malformed(raw, "offset out of range"))
}

fn malformed(raw: &str, reason: &str) -> DocMixError {
    DocMixError::Decode(format!("'{raw}': {reason}"))
}
