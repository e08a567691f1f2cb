use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Gate for the snapshot engine: snapshots exist only for days the reference
/// exchange was open. Every other engine runs regardless.
pub trait TradingCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date - Duration::days(1);
        while !self.is_trading_day(day) {
            day = day - Duration::days(1);
        }
        day
    }
}

/// US equity market calendar: weekends plus the full-closure NYSE holidays,
/// derived by rule so any year works.
#[derive(Debug, Clone, Default)]
pub struct UsEquityCalendar;

impl TradingCalendar for UsEquityCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        !self.is_holiday(date)
    }
}

impl UsEquityCalendar {
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays(date.year()).contains(&date)
    }

    fn holidays(&self, year: i32) -> Vec<NaiveDate> {
        let mut days = vec![
            observed(NaiveDate::from_ymd_opt(year, 1, 1).unwrap()),
            nth_weekday(year, 1, Weekday::Mon, 3),  // Martin Luther King Jr. Day
            nth_weekday(year, 2, Weekday::Mon, 3),  // Washington's Birthday
            easter_sunday(year) - Duration::days(2), // Good Friday
            last_weekday(year, 5, Weekday::Mon),    // Memorial Day
            observed(NaiveDate::from_ymd_opt(year, 6, 19).unwrap()), // Juneteenth
            observed(NaiveDate::from_ymd_opt(year, 7, 4).unwrap()),  // Independence Day
            nth_weekday(year, 9, Weekday::Mon, 1),  // Labor Day
            nth_weekday(year, 11, Weekday::Thu, 4), // Thanksgiving
            observed(NaiveDate::from_ymd_opt(year, 12, 25).unwrap()), // Christmas
        ];
        days.sort();
        days
    }
}

/// Saturday holidays are observed the preceding Friday, Sunday holidays the
/// following Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days((offset + (n - 1) * 7) as i64)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let first_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
    };
    let last = first_next - Duration::days(1);
    let offset = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    last - Duration::days(offset as i64)
}

/// Anonymous Gregorian computus (Meeus/Jones/Butcher).
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap()
}
