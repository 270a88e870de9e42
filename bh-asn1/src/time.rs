// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use chrono::{DateTime, Datelike as _, NaiveDate, Timelike as _, Utc};

use crate::{error::format_error, Result};

/// Which of the two ASN.1 time types a [`Asn1Object::Time`][crate::Asn1Object::Time] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeTag {
    /// `UTCTime`, two digit years in [1950, 2050) and whole seconds only.
    UtcTime,
    /// `GeneralizedTime`, four digit years with optional fractional seconds.
    GeneralizedTime,
}

impl TimeTag {
    /// The tag RFC 5280 mandates for `instant`: `UTCTime` through 2049, `GeneralizedTime`
    /// otherwise.
    ///
    /// Instants with fractional seconds always get `GeneralizedTime`, the only type able to carry
    /// them.
    pub fn for_instant(instant: &DateTime<Utc>) -> Self {
        if (1950..2050).contains(&instant.year()) && instant.nanosecond() == 0 {
            Self::UtcTime
        } else {
            Self::GeneralizedTime
        }
    }
}

pub(crate) fn encode_time(tag: TimeTag, instant: &DateTime<Utc>) -> Vec<u8> {
    let text = match tag {
        TimeTag::UtcTime => instant.format("%y%m%d%H%M%SZ").to_string(),
        TimeTag::GeneralizedTime => {
            let mut text = instant.format("%Y%m%d%H%M%S").to_string();
            let nanos = instant.nanosecond() % 1_000_000_000;
            if nanos != 0 {
                let fraction = format!("{nanos:09}");
                text.push('.');
                text.push_str(fraction.trim_end_matches('0'));
            }
            text.push('Z');
            text
        }
    };
    text.into_bytes()
}

pub(crate) fn decode_time(tag: TimeTag, bytes: &[u8]) -> Result<DateTime<Utc>> {
    let text =
        std::str::from_utf8(bytes).map_err(|_| format_error("time value is not ASCII text"))?;
    let body = text
        .strip_suffix('Z')
        .ok_or_else(|| format_error(format!("time {text:?} is not in UTC")))?;

    let (digits, fraction) = match body.split_once('.') {
        Some((digits, fraction)) if tag == TimeTag::GeneralizedTime => (digits, Some(fraction)),
        Some(_) => return Err(format_error("UTCTime cannot carry fractional seconds")),
        None => (body, None),
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format_error(format!("time {text:?} contains non-digits")));
    }

    let (year, rest) = match tag {
        TimeTag::UtcTime => {
            let (yy, rest) = split_number(digits, 2)?;
            let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
            (year, rest)
        }
        TimeTag::GeneralizedTime => split_number(digits, 4)?,
    };
    let (month, rest) = split_number(rest, 2)?;
    let (day, rest) = split_number(rest, 2)?;
    let (hour, rest) = split_number(rest, 2)?;
    let (minute, rest) = split_number(rest, 2)?;
    let (second, rest) = split_number(rest, 2)?;
    if !rest.is_empty() {
        return Err(format_error(format!("time {text:?} has trailing digits")));
    }

    let nanos = match fraction {
        None => 0,
        Some(fraction)
            if !fraction.is_empty()
                && fraction.len() <= 9
                && fraction.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let padded = format!("{fraction:0<9}");
            padded
                .parse::<u32>()
                .map_err(|_| format_error("invalid fractional seconds"))?
        }
        Some(_) => return Err(format_error("invalid fractional seconds")),
    };

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| format_error(format!("time {text:?} is not a valid date")))?;
    let time = date
        .and_hms_nano_opt(hour, minute, second, nanos)
        .ok_or_else(|| format_error(format!("time {text:?} is not a valid time of day")))?;

    Ok(time.and_utc())
}

fn split_number(text: &str, width: usize) -> Result<(u32, &str)> {
    if text.len() < width {
        return Err(format_error("time value is truncated"));
    }
    let (number, rest) = text.split_at(width);
    let number = number
        .parse()
        .map_err(|_| format_error("time value is not numeric"))?;
    Ok((number, rest))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone as _;

    use super::*;
    use crate::Asn1Error;

    #[test]
    fn tag_selection_by_year() {
        let cases = [
            (1949, TimeTag::GeneralizedTime),
            (1950, TimeTag::UtcTime),
            (2049, TimeTag::UtcTime),
            (2050, TimeTag::GeneralizedTime),
        ];
        for (year, expected) in cases {
            let instant = Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap();
            assert_eq!(TimeTag::for_instant(&instant), expected, "{year}");
        }

        let fractional =
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::milliseconds(1);
        assert_eq!(
            TimeTag::for_instant(&fractional),
            TimeTag::GeneralizedTime
        );
    }

    #[test]
    fn utc_time_round_trip() {
        let instant = Utc.with_ymd_and_hms(2024, 12, 3, 11, 34, 52).unwrap();
        let bytes = encode_time(TimeTag::UtcTime, &instant);

        assert_eq!(bytes, b"241203113452Z");
        assert_eq!(decode_time(TimeTag::UtcTime, &bytes).unwrap(), instant);

        let last_century = decode_time(TimeTag::UtcTime, b"991231235959Z").unwrap();
        assert_eq!(last_century.year(), 1999);
    }

    #[test]
    fn generalized_time_drops_trailing_zeros() {
        let whole = Utc.with_ymd_and_hms(2050, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            encode_time(TimeTag::GeneralizedTime, &whole),
            b"20500101000000Z"
        );

        let fractional = whole + chrono::Duration::milliseconds(500);
        let bytes = encode_time(TimeTag::GeneralizedTime, &fractional);
        assert_eq!(bytes, b"20500101000000.5Z");
        assert_eq!(
            decode_time(TimeTag::GeneralizedTime, &bytes).unwrap(),
            fractional
        );
    }

    #[test]
    fn malformed_times_are_rejected() {
        for input in [
            &b"2412031134Z"[..],
            b"241203113452",
            b"241203113452+0100",
            b"241303113452Z",
            b"241203113452.5Z",
        ] {
            let err = decode_time(TimeTag::UtcTime, input).unwrap_err();
            assert_matches!(err.error, Asn1Error::Format(_));
        }
    }
}
