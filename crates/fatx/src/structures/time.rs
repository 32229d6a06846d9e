//! The packed date/time integer used by directory records.

use chrono::{Datelike, Local, Timelike};

/// A device-native packed timestamp.
///
/// Layout, most significant bit first: 7 bits year since 1980, 4 bits month,
/// 5 bits day, 5 bits hour, 6 bits minute, 5 bits second halved.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FatxTimestamp(pub u32);

impl FatxTimestamp {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Packs the current local time.
    pub fn now() -> Self {
        let now = Local::now();
        let year = (now.year().clamp(1980, 2107) - 1980) as u32;
        Self(
            year << 25
                | now.month() << 21
                | now.day() << 16
                | now.hour() << 11
                | now.minute() << 5
                | now.second() / 2,
        )
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn year(self) -> u32 {
        (self.0 >> 25) + 1980
    }

    pub fn month(self) -> u32 {
        (self.0 >> 21) & 0xF
    }

    pub fn day(self) -> u32 {
        (self.0 >> 16) & 0x1F
    }

    pub fn hour(self) -> u32 {
        (self.0 >> 11) & 0x1F
    }

    pub fn minute(self) -> u32 {
        (self.0 >> 5) & 0x3F
    }

    pub fn second(self) -> u32 {
        (self.0 & 0x1F) * 2
    }
}

impl core::fmt::Debug for FatxTimestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "FatxTimestamp({:02}/{:02}/{:04} {:02}:{:02}:{:02})",
            self.month(),
            self.day(),
            self.year(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_fields() {
        // 2011-03-17 21:42:08
        let raw = (31 << 25) | (3 << 21) | (17 << 16) | (21 << 11) | (42 << 5) | 4;
        let ts = FatxTimestamp::new(raw);
        assert_eq!(ts.year(), 2011);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 17);
        assert_eq!(ts.hour(), 21);
        assert_eq!(ts.minute(), 42);
        assert_eq!(ts.second(), 8);
    }

    #[test]
    fn now_is_in_range() {
        let ts = FatxTimestamp::now();
        assert!(ts.year() >= 2020);
        assert!((1..=12).contains(&ts.month()));
        assert!((1..=31).contains(&ts.day()));
    }
}
