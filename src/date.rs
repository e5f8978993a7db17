//! 日期, 相对时间段与时长的解析

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DATE_TIME: Regex =
        Regex::new(r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})(?:\s+(\d{1,2}):(\d{2}))?$").unwrap();
    static ref PERIOD: Regex = Regex::new(r"^([+-]?)\s*((?:\d+\s*[wdhm]\s*)+)$").unwrap();
    static ref PERIOD_PART: Regex = Regex::new(r"(\d+)\s*([wdhm])").unwrap();
    static ref DURATION_PART: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*([wdhm])").unwrap();
    static ref DURATION: Regex = Regex::new(r"^(?:\d+(?:\.\d+)?\s*[wdhm]\s*)+$").unwrap();
    static ref OFFSET: Regex = Regex::new(r"^([+-]?)(\d+)([yMwdhm])$").unwrap();
}

/// 解析后的日期字面量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue {
    pub instant: DateTime<Utc>,
    /// 字面量是否包含时间部分 (相对时间段视为包含)
    pub has_time: bool,
}

impl DateValue {
    pub fn millis(&self) -> i64 {
        self.instant.timestamp_millis()
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// 解析 `yyyy/MM/dd [HH:mm]`, `yyyy-MM-dd [HH:mm]` 或相对时间段 `-5d`, `4w 2d`
pub fn parse_date(text: &str, now: DateTime<Utc>) -> Option<DateValue> {
    let text = text.trim();
    if let Some(caps) = DATE_TIME.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return match (caps.get(4), caps.get(5)) {
            (Some(hour), Some(minute)) => {
                let time = date.and_hms_opt(hour.as_str().parse().ok()?, minute.as_str().parse().ok()?, 0)?;
                Some(DateValue { instant: Utc.from_utc_datetime(&time), has_time: true })
            }
            _ => Some(DateValue { instant: start_of_day(date), has_time: false }),
        };
    }
    let instant = now.checked_add_signed(parse_period(text)?)?;
    Some(DateValue { instant, has_time: true })
}

/// 相对时间段: w=7 天, d=天, h=小时, m=分钟
pub fn parse_period(text: &str) -> Option<Duration> {
    let caps = PERIOD.captures(text.trim())?;
    let negative = &caps[1] == "-";
    let mut total = Duration::zero();
    for part in PERIOD_PART.captures_iter(&caps[2]) {
        let amount: i64 = part[1].parse().ok()?;
        let unit = match &part[2] {
            "w" => Duration::try_weeks(amount)?,
            "d" => Duration::try_days(amount)?,
            "h" => Duration::try_hours(amount)?,
            _ => Duration::try_minutes(amount)?,
        };
        total = total.checked_add(&unit)?;
    }
    Some(if negative { -total } else { total })
}

/// 时间跟踪的时长, 返回分钟数. 纯数字按分钟计; 1d 与 1w 按工作日换算
pub fn parse_duration(text: &str, minutes_per_day: i64, minutes_per_week: i64) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok();
    }
    if !DURATION.is_match(text) {
        return None;
    }
    let mut minutes = 0f64;
    for part in DURATION_PART.captures_iter(text) {
        let amount: f64 = part[1].parse().ok()?;
        let factor = match &part[2] {
            "w" => minutes_per_week as f64,
            "d" => minutes_per_day as f64,
            "h" => 60.0,
            _ => 1.0,
        };
        minutes += amount * factor;
    }
    let minutes = minutes.round();
    if !minutes.is_finite() || minutes >= i64::MAX as f64 {
        return None;
    }
    Some(minutes as i64)
}

/// 日期函数的偏移参数, 例如 `-1d`, `+2M`, `1y`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub amount: i64,
    pub unit: char,
}

pub fn parse_offset(text: &str) -> Option<Offset> {
    let caps = OFFSET.captures(text.trim())?;
    let amount: i64 = caps[2].parse().ok()?;
    let amount = if &caps[1] == "-" { -amount } else { amount };
    let unit = caps[3].chars().next()?;
    Some(Offset { amount, unit })
}

impl Offset {
    pub fn apply(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.unit {
            'y' | 'M' => {
                let months = if self.unit == 'y' { self.amount.checked_mul(12)? } else { self.amount };
                let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
                if months >= 0 {
                    instant.checked_add_months(magnitude)
                } else {
                    instant.checked_sub_months(magnitude)
                }
            }
            'w' => instant.checked_add_signed(Duration::try_weeks(self.amount)?),
            'd' => instant.checked_add_signed(Duration::try_days(self.amount)?),
            'h' => instant.checked_add_signed(Duration::try_hours(self.amount)?),
            _ => instant.checked_add_signed(Duration::try_minutes(self.amount)?),
        }
    }
}

/// 日期边界函数的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    StartOfDay,
    EndOfDay,
    StartOfWeek,
    EndOfWeek,
    StartOfMonth,
    EndOfMonth,
    StartOfYear,
    EndOfYear,
}

impl Boundary {
    /// 以周一为一周开始. 结束边界为该区间最后一毫秒
    pub fn apply(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let end = |start: DateTime<Utc>| start.checked_sub_signed(Duration::milliseconds(1));
        match self {
            Boundary::StartOfDay => Some(start_of_day(today)),
            Boundary::EndOfDay => end(start_of_day(today.succ_opt()?)),
            Boundary::StartOfWeek => Some(start_of_day(monday(today)?)),
            Boundary::EndOfWeek => end(start_of_day(monday(today)?.checked_add_signed(Duration::days(7))?)),
            Boundary::StartOfMonth => Some(start_of_day(today.with_day(1)?)),
            Boundary::EndOfMonth => {
                end(start_of_day(today.with_day(1)?.checked_add_months(Months::new(1))?))
            }
            Boundary::StartOfYear => Some(start_of_day(NaiveDate::from_ymd_opt(today.year(), 1, 1)?)),
            Boundary::EndOfYear => end(start_of_day(NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?)),
        }
    }
}

fn monday(date: NaiveDate) -> Option<NaiveDate> {
    let back = date.weekday().num_days_from_monday();
    date.checked_sub_signed(Duration::days(i64::from(back)))
        .filter(|d| d.weekday() == Weekday::Mon)
}

/// 把毫秒时间戳格式化为 `yyyy/MM/dd HH:mm`
pub fn format_millis(millis: i64) -> String {
    match from_millis(millis) {
        Some(instant) => instant.format("%Y/%m/%d %H:%M").to_string(),
        None => millis.to_string(),
    }
}

pub fn naive(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.naive_utc()
}
