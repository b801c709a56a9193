use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::macros::format_description;
use time::{Date, Month};

use crate::ValidationError;

/// Calendar day at which a record is dated.
///
/// Parses plain ISO-8601 dates (`2024-03-01`) as well as timestamps whose
/// first ten characters are a date (`2024-03-01T14:30:00Z`); the time part
/// is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Day(Date);

impl Day {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let invalid = || ValidationError::InvalidDay {
            value: input.to_owned(),
        };

        let date_part = match trimmed.get(..10) {
            Some(head) => {
                let rest = &trimmed[10..];
                if !(rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ')) {
                    return Err(invalid());
                }
                head
            }
            None => return Err(invalid()),
        };

        Date::parse(date_part, format_description!("[year]-[month]-[day]"))
            .map(Self)
            .map_err(|_| invalid())
    }

    pub fn from_calendar_date(year: i32, month: u8, day: u8) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDay {
            value: format!("{year:04}-{month:02}-{day:02}"),
        };
        let month = Month::try_from(month).map_err(|_| invalid())?;
        Date::from_calendar_date(year, month, day)
            .map(Self)
            .map_err(|_| invalid())
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub const fn into_inner(self) -> Date {
        self.0
    }

    /// Days since 1970-01-01, the physical representation of a polars `Date`.
    pub fn days_since_epoch(self) -> i32 {
        (self.0 - Date::from_julian_day(UNIX_EPOCH_JULIAN_DAY).unwrap_or(Date::MIN)).whole_days()
            as i32
    }
}

const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

impl Display for Day {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl Serialize for Day {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

impl TryFrom<&str> for Day {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Date or timestamp text exactly as the provider sent it, with its calendar day.
///
/// News and filings carry a time of day; the record keeps it while keys and
/// pagination cursors use [`DayStamp::day`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DayStamp {
    raw: String,
    day: Day,
}

impl DayStamp {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let day = Day::parse(input)?;
        Ok(Self {
            raw: input.trim().to_owned(),
            day,
        })
    }

    pub fn day(&self) -> Day {
        self.day
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl From<Day> for DayStamp {
    fn from(day: Day) -> Self {
        Self {
            raw: day.to_string(),
            day,
        }
    }
}

impl PartialOrd for DayStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DayStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.day
            .cmp(&other.day)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl Display for DayStamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for DayStamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for DayStamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
