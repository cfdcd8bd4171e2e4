use anyhow::{Context, Result};
use async_graphql::Enum;
use jiff::{civil, tz::TimeZone, ToSpan, Zoned};

/// Symbolic time window selectable from the dashboard.
#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum DateRangeToken {
    Today,
    Yesterday,
    #[graphql(name = "LAST_7_DAYS")]
    Last7Days,
    #[graphql(name = "LAST_30_DAYS")]
    Last30Days,
    #[graphql(name = "LAST_90_DAYS")]
    Last90Days,
    ThisMonth,
    LastMonth,
}

impl DateRangeToken {
    /// Parse a UI token, accepting both the short and long aliases.
    /// Unknown tokens fall back to the 30-day window.
    pub(crate) fn parse(token: &str) -> Self {
        match token {
            "today" => Self::Today,
            "yesterday" => Self::Yesterday,
            "7days" | "last7Days" => Self::Last7Days,
            "90days" | "last90Days" => Self::Last90Days,
            "thisMonth" => Self::ThisMonth,
            "lastMonth" => Self::LastMonth,
            _ => Self::Last30Days,
        }
    }
}

/// A resolved, calendar-aligned window. `start` is the first instant of the
/// first day and `end` the last instant of the last day, in the zone of the
/// clock the range was resolved against.
#[derive(Debug, Clone)]
pub(crate) struct DateRange {
    pub(crate) start: Zoned,
    pub(crate) end: Zoned,
}

impl DateRange {
    pub(crate) fn time_zone(&self) -> &TimeZone {
        self.start.time_zone()
    }

    pub(crate) fn start_day(&self) -> civil::Date {
        self.start.date()
    }

    pub(crate) fn end_day(&self) -> civil::Date {
        self.end.date()
    }
}

/// Resolve a token against the supplied clock reading. Callers pass
/// `Zoned::now()` in production; tests pass a fixed instant.
pub(crate) fn resolve(token: DateRangeToken, now: &Zoned) -> Result<DateRange> {
    let today = now.date();
    let (first, last) = match token {
        DateRangeToken::Today => (today, today),
        DateRangeToken::Yesterday => {
            let y = today.yesterday().context("no day precedes the minimum date")?;
            (y, y)
        }
        DateRangeToken::Last7Days => (sub_days(today, 7)?, today),
        DateRangeToken::Last30Days => (sub_days(today, 30)?, today),
        DateRangeToken::Last90Days => (sub_days(today, 90)?, today),
        DateRangeToken::ThisMonth => (today.first_of_month(), today),
        DateRangeToken::LastMonth => {
            let prev = today
                .first_of_month()
                .yesterday()
                .context("no month precedes the minimum date")?;
            (prev.first_of_month(), prev)
        }
    };

    let tz = now.time_zone();
    Ok(DateRange {
        start: start_of_day(first, tz)?,
        end: end_of_day(last, tz)?,
    })
}

fn sub_days(date: civil::Date, days: i64) -> Result<civil::Date> {
    date.checked_sub(days.days())
        .with_context(|| format!("cannot step {days} days back from {date}"))
}

fn start_of_day(date: civil::Date, tz: &TimeZone) -> Result<Zoned> {
    date.at(0, 0, 0, 0)
        .to_zoned(tz.clone())
        .with_context(|| format!("no start of day for {date}"))
}

pub(crate) fn end_of_day(date: civil::Date, tz: &TimeZone) -> Result<Zoned> {
    date.at(23, 59, 59, 999_999_999)
        .to_zoned(tz.clone())
        .with_context(|| format!("no end of day for {date}"))
}
