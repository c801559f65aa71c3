use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde::Serialize;

/// How a consumer wants dates rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// 2024-06-10, used by calendar and tasks prompts
    Dashed,
    /// 2024/06/10, the Gmail search syntax
    Slashed,
}

impl DateStyle {
    fn pattern(self) -> &'static str {
        match self {
            DateStyle::Dashed => "%Y-%m-%d",
            DateStyle::Slashed => "%Y/%m/%d",
        }
    }
}

/// Calendar anchors for grounding relative date phrases.
///
/// Computed once per request from the current instant; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateContext {
    pub now: DateTime<FixedOffset>,
    pub anchor_date: NaiveDate,
    pub tomorrow_date: NaiveDate,
    pub month_start: NaiveDate,
    pub month_end: NaiveDate,
}

impl DateContext {
    /// Resolve anchors for the given instant in its own offset.
    pub fn resolve(now: DateTime<FixedOffset>) -> Self {
        let anchor_date = now.date_naive();
        let tomorrow_date = anchor_date + Duration::days(1);
        let month_start = anchor_date.with_day(1).unwrap_or(anchor_date);
        let month_end = last_day_of_month(anchor_date.year(), anchor_date.month());

        Self {
            now,
            anchor_date,
            tomorrow_date,
            month_start,
            month_end,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        *self.now.offset()
    }

    pub fn format(&self, date: NaiveDate, style: DateStyle) -> String {
        date.format(style.pattern()).to_string()
    }

    pub fn today(&self, style: DateStyle) -> String {
        self.format(self.anchor_date, style)
    }

    pub fn tomorrow(&self, style: DateStyle) -> String {
        self.format(self.tomorrow_date, style)
    }

    pub fn start_of_month(&self, style: DateStyle) -> String {
        self.format(self.month_start, style)
    }

    pub fn end_of_month(&self, style: DateStyle) -> String {
        self.format(self.month_end, style)
    }

    /// Current local time as HH:MM.
    pub fn clock_time(&self) -> String {
        self.now.format("%H:%M").to_string()
    }

    /// Offset rendered as +HH:MM.
    pub fn offset_label(&self) -> String {
        self.now.format("%:z").to_string()
    }
}

pub(crate) fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateContext {
        DateContext::resolve(DateTime::parse_from_rfc3339(rfc3339).unwrap())
    }

    #[test]
    fn anchors_follow_the_local_date() {
        let ctx = at("2024-06-10T08:15:00+05:30");
        assert_eq!(ctx.today(DateStyle::Dashed), "2024-06-10");
        assert_eq!(ctx.tomorrow(DateStyle::Dashed), "2024-06-11");
        assert_eq!(ctx.start_of_month(DateStyle::Slashed), "2024/06/01");
        assert_eq!(ctx.end_of_month(DateStyle::Slashed), "2024/06/30");
        assert_eq!(ctx.clock_time(), "08:15");
        assert_eq!(ctx.offset_label(), "+05:30");
    }

    #[test]
    fn late_evening_in_utc_is_already_tomorrow_locally() {
        let utc = DateTime::parse_from_rfc3339("2024-06-09T20:00:00Z").unwrap();
        let local = utc.with_timezone(&FixedOffset::east_opt(19800).unwrap());
        let ctx = DateContext::resolve(local);
        assert_eq!(ctx.anchor_date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
    }

    #[test]
    fn month_and_year_rollover() {
        let ctx = at("2024-12-31T23:00:00+00:00");
        assert_eq!(ctx.tomorrow(DateStyle::Dashed), "2025-01-01");
        assert_eq!(ctx.end_of_month(DateStyle::Dashed), "2024-12-31");

        let leap = at("2024-02-10T12:00:00+00:00");
        assert_eq!(leap.end_of_month(DateStyle::Dashed), "2024-02-29");
    }
}
