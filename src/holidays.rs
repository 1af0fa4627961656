use chrono::{Datelike, Duration, NaiveDate};

/// Fixed-date national holidays as (month, day).
const FIXED: [(u32, u32); 8] = [
    (1, 1),   // New Year
    (4, 21),  // Tiradentes
    (5, 1),   // Labour Day
    (9, 7),   // Independence
    (10, 12), // Our Lady of Aparecida
    (11, 2),  // All Souls
    (11, 15), // Republic
    (12, 25), // Christmas
];

/// Movable holidays as day offsets from Easter Sunday.
const EASTER_OFFSETS: [i64; 4] = [
    -48, // Carnival Monday
    -47, // Carnival Tuesday
    -2,  // Good Friday
    60,  // Corpus Christi
];

/// Easter Sunday for `year`, anonymous Gregorian algorithm.
pub fn easter_sunday(year: i32) -> NaiveDate {
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
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .expect("Easter falls on a valid March or April date")
}

/// All national holidays of `year`, sorted.
pub fn holidays(year: i32) -> Vec<NaiveDate> {
    let easter = easter_sunday(year);
    let mut days: Vec<NaiveDate> = FIXED
        .iter()
        .filter_map(|&(m, d)| NaiveDate::from_ymd_opt(year, m, d))
        .chain(EASTER_OFFSETS.iter().map(|&off| easter + Duration::days(off)))
        .collect();
    days.sort();
    days.dedup();
    days
}

pub fn is_holiday(date: NaiveDate) -> bool {
    if FIXED.contains(&(date.month(), date.day())) {
        return true;
    }
    let easter = easter_sunday(date.year());
    let offset = (date - easter).num_days();
    EASTER_OFFSETS.contains(&offset)
}
