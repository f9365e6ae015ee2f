use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashMap;

use crate::api::{ApiError, Backend, unwrap_data};
use crate::models::{Point, Stats};
use crate::text::parse_date;

pub fn fetch_stats(backend: &dyn Backend) -> Result<Stats, ApiError> {
    let body = backend.get("/admin/stats")?;
    Ok(serde_json::from_value(unwrap_data(body))?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub title: &'static str,
    pub value: f64,
    pub percent: f64,
}

pub fn summary(stats: &Stats) -> Vec<Card> {
    let (t, p) = (&stats.totals, &stats.totals_percent);
    vec![
        Card { title: "Users", value: t.users, percent: p.users },
        Card { title: "Companies", value: t.companies, percent: p.companies },
        Card { title: "Jobs (active)", value: t.jobs_active, percent: p.jobs_active },
        Card { title: "Applies", value: t.applies, percent: p.applies },
        Card { title: "Saves", value: t.saves, percent: p.saves },
        Card { title: "Follows", value: t.follows, percent: p.follows },
    ]
}

pub fn job_health(stats: &Stats) -> Vec<Card> {
    let t = &stats.totals;
    vec![
        Card { title: "Jobs active", value: t.jobs_active, percent: 0.0 },
        Card { title: "Jobs expired", value: t.jobs_expired, percent: 0.0 },
        Card { title: "Expiring soon", value: t.jobs_expiring_soon, percent: 0.0 },
    ]
}

/// Month labels arrive as `YYYY-MM` or as a full date.
fn month_of(label: &str) -> Option<NaiveDate> {
    parse_date(&format!("{}-01", label.trim())).or_else(|| parse_date(label))
}

fn value_for(series: &[Point], label: &str) -> i64 {
    series
        .iter()
        .find(|p| p.label == label)
        .map(|p| p.value)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyComparison {
    /// `M/YYYY`, oldest first.
    pub months: Vec<String>,
    pub users: Vec<i64>,
    pub companies: Vec<i64>,
    pub jobs: Vec<i64>,
    pub applies: Vec<i64>,
}

/// The latest `n` months of `jobsMonthly`, with the other monthly series
/// joined on the exact label.
pub fn monthly_comparison(stats: &Stats, n: usize) -> MonthlyComparison {
    let mut months: Vec<&Point> = stats.jobs_monthly.iter().collect();
    months.sort_by(|a, b| month_of(&a.label).cmp(&month_of(&b.label)));
    let window = &months[months.len().saturating_sub(n)..];

    MonthlyComparison {
        months: window
            .iter()
            .map(|m| match month_of(&m.label) {
                Some(d) => format!("{}/{}", d.month(), d.year()),
                None => m.label.clone(),
            })
            .collect(),
        users: window.iter().map(|m| value_for(&stats.users_monthly, &m.label)).collect(),
        companies: window
            .iter()
            .map(|m| value_for(&stats.companies_monthly, &m.label))
            .collect(),
        jobs: window.iter().map(|m| m.value).collect(),
        applies: window
            .iter()
            .map(|m| value_for(&stats.applies_monthly, &m.label))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub name: &'static str,
    pub values: Vec<i64>,
}

impl DailySeries {
    fn from_points(name: &'static str, points: &[Point], days: &[NaiveDate]) -> Self {
        let by_day: HashMap<&str, i64> = points.iter().map(|p| (p.label.as_str(), p.value)).collect();
        let values = days
            .iter()
            .map(|d| {
                let key = d.format("%Y-%m-%d").to_string();
                by_day.get(key.as_str()).copied().unwrap_or(0)
            })
            .collect();
        Self { name, values }
    }

    pub fn total(&self) -> i64 {
        self.values.iter().sum()
    }

    /// Change against the previous day; the first day compares against 0.
    pub fn delta(&self, index: usize) -> i64 {
        let current = self.values.get(index).copied().unwrap_or(0);
        let previous = index
            .checked_sub(1)
            .and_then(|i| self.values.get(i).copied())
            .unwrap_or(0);
        current - previous
    }

    /// Index of the busiest day, if anything happened at all.
    pub fn peak(&self) -> Option<usize> {
        let max = *self.values.iter().max()?;
        if max <= 0 {
            return None;
        }
        self.values.iter().position(|v| *v == max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyWindow {
    pub days: Vec<NaiveDate>,
    /// `DD/MM`
    pub labels: Vec<String>,
    pub jobs: DailySeries,
    pub users: DailySeries,
    pub companies: DailySeries,
}

impl DailyWindow {
    pub fn series(&self) -> [&DailySeries; 3] {
        [&self.jobs, &self.users, &self.companies]
    }

    pub fn grand_total(&self) -> i64 {
        self.series().iter().map(|s| s.total()).sum()
    }
}

/// The `n` calendar days ending at `today`, oldest first.
pub fn daily_window(stats: &Stats, today: NaiveDate, n: usize) -> DailyWindow {
    let days: Vec<NaiveDate> = (0..n as i64)
        .rev()
        .map(|back| today - Duration::days(back))
        .collect();
    DailyWindow {
        labels: days.iter().map(|d| d.format("%d/%m").to_string()).collect(),
        jobs: DailySeries::from_points("Jobs", &stats.jobs_daily, &days),
        users: DailySeries::from_points("Users", &stats.users_daily, &days),
        companies: DailySeries::from_points("Companies", &stats.companies_daily, &days),
        days,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    pub label: String,
    pub value: i64,
    /// Percent of the largest entry in the whole series.
    pub share: f64,
}

/// The first `n` entries, in backend order.
pub fn top_n(points: &[Point], n: usize) -> Vec<Share> {
    let max = points.iter().map(|p| p.value).max().unwrap_or(0);
    points
        .iter()
        .take(n)
        .map(|p| Share {
            label: p.label.clone(),
            value: p.value,
            share: if max > 0 { p.value as f64 * 100.0 / max as f64 } else { 0.0 },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Urgent,
    Warning,
    Normal,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Urgency::Urgent => "urgent",
            Urgency::Warning => "warning",
            Urgency::Normal => "normal",
        }
    }
}

pub fn urgency(days_left: i64) -> Urgency {
    if days_left <= 1 {
        Urgency::Urgent
    } else if days_left <= 3 {
        Urgency::Warning
    } else {
        Urgency::Normal
    }
}
