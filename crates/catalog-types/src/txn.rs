//! Transaction metadata: log positions and commit times.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Timelike};

use crate::TypesError;

/// Log sequence number, a byte position in the write-ahead log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(pub u64);

impl fmt::Display for Lsn {
    /// Formats as `%X/%X` (high and low 32 bits)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| TypesError::InvalidLsn(s.to_string()))?;
        let hi = u32::from_str_radix(hi, 16).map_err(|_| TypesError::InvalidLsn(s.to_string()))?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| TypesError::InvalidLsn(s.to_string()))?;
        Ok(Lsn(((hi as u64) << 32) | lo as u64))
    }
}

/// Metadata of the transaction being decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnInfo {
    /// Transaction id
    pub xid: u32,
    /// Position just past the transaction's commit record
    pub end_lsn: Lsn,
    /// Commit time
    pub commit_time: DateTime<FixedOffset>,
}

/// Format a commit time the way the server renders `timestamptz` values:
/// `YYYY-MM-DD HH:MM:SS[.ffffff]+HH[:MM]`, microsecond precision with
/// trailing zeros trimmed.
pub fn format_timestamptz(ts: &DateTime<FixedOffset>) -> String {
    let mut out = ts.format("%Y-%m-%d %H:%M:%S").to_string();

    let micros = ts.nanosecond() / 1_000 % 1_000_000;
    if micros > 0 {
        let frac = format!("{micros:06}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }

    let offset = ts.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    let (hours, minutes, seconds) = (offset / 3600, offset / 60 % 60, offset % 60);
    out.push_str(&format!("{sign}{hours:02}"));
    if minutes != 0 || seconds != 0 {
        out.push_str(&format!(":{minutes:02}"));
    }
    if seconds != 0 {
        out.push_str(&format!(":{seconds:02}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsn_display_and_parse() {
        let lsn: Lsn = "0/16B3748".parse().unwrap();
        assert_eq!(lsn, Lsn(0x16B3748));
        assert_eq!(lsn.to_string(), "0/16B3748");

        let high = Lsn((1u64 << 32) | 0xAB);
        assert_eq!(high.to_string(), "1/AB");
        assert_eq!("1/AB".parse::<Lsn>().unwrap(), high);
    }

    #[test]
    fn test_lsn_parse_rejects_garbage() {
        assert!("16B3748".parse::<Lsn>().is_err());
        assert!("0/xyz".parse::<Lsn>().is_err());
    }

    #[test]
    fn test_format_timestamptz() {
        let ts = DateTime::parse_from_rfc3339("2017-01-01T10:11:12.345600+00:00").unwrap();
        assert_eq!(format_timestamptz(&ts), "2017-01-01 10:11:12.3456+00");

        let ts = DateTime::parse_from_rfc3339("2017-01-01T10:11:12+05:30").unwrap();
        assert_eq!(format_timestamptz(&ts), "2017-01-01 10:11:12+05:30");

        let ts = DateTime::parse_from_rfc3339("2017-06-30T23:59:59-07:00").unwrap();
        assert_eq!(format_timestamptz(&ts), "2017-06-30 23:59:59-07");
    }
}
