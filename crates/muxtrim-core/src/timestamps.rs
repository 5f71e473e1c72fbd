//! Timestamp policy shared by extraction, trimming and repackaging.
//!
//! Zip entries carry naive DOS date/time fields with no zone. Extraction turns
//! them into filesystem mtimes and repackaging turns mtimes back into DOS
//! fields; both directions go through the same [`ArchiveClock`] so a file that
//! passes through the pipeline untouched keeps its original entry timestamp.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Zone used to interpret naive archive timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveClock {
    /// The host's local zone (what `mktime`/`localtime` would do).
    #[default]
    Local,
    /// Coordinated universal time. Reproducible across hosts.
    Utc,
    /// A fixed offset east of UTC, in minutes.
    Offset(i32),
}

impl ArchiveClock {
    /// Interpret a naive archive timestamp as an absolute point in time.
    pub fn to_system_time(self, naive: NaiveDateTime) -> SystemTime {
        let utc = match self {
            Self::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map_or_else(|| naive.and_utc(), |dt| dt.with_timezone(&Utc)),
            Self::Utc => naive.and_utc(),
            Self::Offset(minutes) => (naive - Duration::minutes(i64::from(minutes))).and_utc(),
        };
        SystemTime::from(utc)
    }

    /// Break an absolute point in time into naive calendar fields.
    pub fn to_naive(self, time: SystemTime) -> NaiveDateTime {
        let utc: DateTime<Utc> = time.into();
        match self {
            Self::Local => utc.with_timezone(&Local).naive_local(),
            Self::Utc => utc.naive_utc(),
            Self::Offset(minutes) => utc.naive_utc() + Duration::minutes(i64::from(minutes)),
        }
    }
}

/// Convert DOS date/time fields to a chrono value. Returns `None` for fields
/// that do not form a valid calendar date.
pub fn zip_to_naive(dt: zip::DateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
    )?
    .and_hms_opt(
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )
}

/// Convert calendar fields to DOS date/time. Values outside 1980..=2107 clamp
/// to the DOS epoch.
pub fn naive_to_zip(naive: NaiveDateTime) -> zip::DateTime {
    let Ok(year) = u16::try_from(naive.year()) else {
        return zip::DateTime::default();
    };
    zip::DateTime::from_date_and_time(
        year,
        naive.month() as u8,
        naive.day() as u8,
        naive.hour() as u8,
        naive.minute() as u8,
        naive.second() as u8,
    )
    .unwrap_or_default()
}

/// Last modification time of a file.
pub fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Set the modification time of an existing file.
pub fn set_modified(path: &Path, time: SystemTime) -> io::Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_modified(time)
}
