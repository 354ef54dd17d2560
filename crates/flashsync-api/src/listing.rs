// ── command.cgi op=100 listing ──
//
// Body layout:
//
//   WLANSD_FILELIST
//   /DCIM,log_20240101_0800_K01.csv,123456,32,22561,32768
//
// Fields are `directory,filename,size,attribute,date,time`. Date and time
// are FAT bitfields. Names may contain commas, so records split from the
// right.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::trace;

use crate::error::Error;
use crate::log_name::LogName;

/// First line of every listing body.
pub const LISTING_HEADER: &str = "WLANSD_FILELIST";

/// FAT attribute bit for sub-directories.
pub const ATTR_DIRECTORY: u8 = 0x10;

/// One log file from the card's directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    pub directory: String,
    pub name: LogName,
    pub size: u64,
    pub attributes: u8,
    /// Last-modified time from the FAT entry (`None` if the card wrote garbage).
    pub modified: Option<NaiveDateTime>,
}

/// Decode FAT date/time bitfields.
///
/// date: `(year - 1980) << 9 | month << 5 | day`
/// time: `hour << 11 | minute << 5 | seconds / 2`
pub fn decode_fat_timestamp(date: u16, time: u16) -> Option<NaiveDateTime> {
    let year = 1980 + i32::from(date >> 9);
    let month = u32::from((date >> 5) & 0x0f);
    let day = u32::from(date & 0x1f);
    let hour = u32::from(time >> 11);
    let minute = u32::from((time >> 5) & 0x3f);
    let second = u32::from(time & 0x1f) * 2;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Parse a listing body into log entries, sorted by natural order.
///
/// Directories and files outside the log naming scheme are dropped.
/// A missing header or a structurally broken record fails the whole
/// listing: a half-understood listing must not move any watermark.
pub fn parse_listing(body: &str) -> Result<Vec<RemoteFileEntry>, Error> {
    let mut lines = body.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    match lines.next() {
        Some((_, first)) if first.trim() == LISTING_HEADER => {}
        Some((idx, other)) => {
            return Err(Error::ListingParse {
                line: idx + 1,
                reason: format!("expected {LISTING_HEADER} header, got {other:?}"),
            });
        }
        None => {
            return Err(Error::ListingParse {
                line: 0,
                reason: "empty response".into(),
            });
        }
    }

    let mut entries = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let record = parse_record(line.trim_end_matches('\r')).map_err(|reason| {
            Error::ListingParse {
                line: line_no,
                reason,
            }
        })?;

        if record.attributes & ATTR_DIRECTORY != 0 {
            trace!(name = record.filename, "skipping directory");
            continue;
        }
        let Ok(name) = LogName::parse(record.filename) else {
            trace!(name = record.filename, "skipping non-log file");
            continue;
        };

        entries.push(RemoteFileEntry {
            directory: record.directory.to_owned(),
            name,
            size: record.size,
            attributes: record.attributes,
            modified: decode_fat_timestamp(record.date, record.time),
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

struct RawRecord<'a> {
    directory: &'a str,
    filename: &'a str,
    size: u64,
    attributes: u8,
    date: u16,
    time: u16,
}

fn parse_record(line: &str) -> Result<RawRecord<'_>, String> {
    let mut fields = line.rsplitn(5, ',');
    let (Some(time), Some(date), Some(attr), Some(size), Some(rest)) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return Err(format!("expected 6 comma-separated fields: {line:?}"));
    };
    let Some((directory, filename)) = rest.split_once(',') else {
        return Err(format!("missing directory or filename: {line:?}"));
    };

    let number = |field: &str, what: &str| -> Result<u64, String> {
        field
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("{what} is not a number: {field:?}"))
    };
    let narrow = |value: u64, what: &str| -> Result<u16, String> {
        u16::try_from(value).map_err(|_| format!("{what} out of range: {value}"))
    };

    Ok(RawRecord {
        directory,
        filename: filename.trim(),
        size: number(size, "size")?,
        attributes: u8::try_from(number(attr, "attribute")?)
            .map_err(|_| format!("attribute out of range: {attr}"))?,
        date: narrow(number(date, "date")?, "date")?,
        time: narrow(number(time, "time")?, "time")?,
    })
}
