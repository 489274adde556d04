//! Revenue aggregation over rental agreements
//!
//! Two revenue sources are merged:
//! - **booking revenue**: the agreement price, attributed to the booking instant
//! - **adjustment revenue**: price changes recovered from audit-log
//!   before/after snapshots, attributed to the instant of the change
//!
//! Every agreement is split into its *original* price (current price minus
//! the sum of its recorded changes) plus one delta per change, so the
//! attributions of one agreement always sum to exactly its current price and
//! nothing is counted twice. Cancelled agreements contribute nothing.

use crate::business_time::{BusinessTz, Period};
use crate::db::models::{Agreement, AgreementStatus, AuditAction, AuditLog};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Upper bound on buckets returned by one series request
pub const MAX_BUCKETS: usize = 1000;

/// Largest agreement price accepted, in minor currency units
pub const MAX_PRICE: i64 = 1_000_000_000_000;

/// Table name whose audit rows carry agreement price changes
pub const AGREEMENTS_TABLE: &str = "agreements";

/// The fields of an agreement that revenue depends on
#[derive(Debug, Clone, PartialEq)]
pub struct RevenueAgreement {
    pub id: String,
    pub price: i64,
    pub status: AgreementStatus,
    pub booked_at: DateTime<Utc>,
}

impl From<&Agreement> for RevenueAgreement {
    fn from(agreement: &Agreement) -> Self {
        Self {
            id: agreement.id.clone(),
            price: agreement.price,
            status: agreement.status,
            booked_at: agreement.created_at,
        }
    }
}

/// A recorded change of an agreement's price
#[derive(Debug, Clone, PartialEq)]
pub struct PriceAdjustment {
    pub agreement_id: String,
    pub before: i64,
    pub after: i64,
    pub logged_at: DateTime<Utc>,
}

impl PriceAdjustment {
    pub fn delta(&self) -> i64 {
        self.after.saturating_sub(self.before)
    }
}

/// Extract price changes from agreement audit rows.
///
/// Only `update` rows on the agreements table whose before and after
/// snapshots both hold an integer `price` that differs are kept.
pub fn price_adjustments_from_logs(logs: &[AuditLog]) -> Vec<PriceAdjustment> {
    logs.iter()
        .filter(|log| log.table_name == AGREEMENTS_TABLE && log.action == AuditAction::Update)
        .filter_map(|log| {
            let before = snapshot_price(log.before_json.as_deref()?)?;
            let after = snapshot_price(log.after_json.as_deref()?)?;
            (before != after).then(|| PriceAdjustment {
                agreement_id: log.record_id.clone(),
                before,
                after,
                logged_at: log.created_at,
            })
        })
        .collect()
}

/// Sum of amounts, clamped at the `i64` range instead of wrapping
fn saturating_sum<'a>(amounts: impl IntoIterator<Item = &'a i64>) -> i64 {
    amounts.into_iter().fold(0i64, |acc, d| acc.saturating_add(*d))
}

fn snapshot_price(json: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    value.get("price")?.as_i64()
}

/// Revenue for one calendar-to-date window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowRevenue {
    pub period: Period,
    pub window_start: DateTime<Utc>,
    /// Price as of `now` of agreements booked inside the window
    pub booking_revenue: i64,
    /// Price changes inside the window on agreements booked before it
    pub adjustment_revenue: i64,
    pub total: i64,
    pub agreement_count: i64,
}

/// Dashboard revenue for every period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub generated_at: DateTime<Utc>,
    pub business_utc_offset_hours: i32,
    pub windows: Vec<WindowRevenue>,
}

/// One bucket of a revenue series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Original prices of agreements booked in the bucket
    pub booking_revenue: i64,
    /// Price changes recorded in the bucket
    pub adjustment_revenue: i64,
    pub total: i64,
    pub agreement_count: i64,
}

/// A non-cancelled agreement with its changes resolved
struct Ledger {
    booked_at: DateTime<Utc>,
    original_price: i64,
    /// (effective instant, delta)
    deltas: Vec<(DateTime<Utc>, i64)>,
}

fn build_ledgers(
    agreements: &[RevenueAgreement],
    adjustments: &[PriceAdjustment],
) -> Vec<Ledger> {
    let mut by_id: HashMap<&str, Vec<&PriceAdjustment>> = HashMap::new();
    for adjustment in adjustments {
        by_id
            .entry(adjustment.agreement_id.as_str())
            .or_default()
            .push(adjustment);
    }

    agreements
        .iter()
        .filter(|a| !a.status.is_cancelled())
        .map(|agreement| {
            // A change can never take effect before the booking itself
            let deltas: Vec<(DateTime<Utc>, i64)> = by_id
                .get(agreement.id.as_str())
                .map(|list| {
                    list.iter()
                        .map(|adj| (adj.logged_at.max(agreement.booked_at), adj.delta()))
                        .collect()
                })
                .unwrap_or_default();
            let delta_sum = saturating_sum(deltas.iter().map(|(_, d)| d));

            Ledger {
                booked_at: agreement.booked_at,
                original_price: agreement.price.saturating_sub(delta_sum),
                deltas,
            }
        })
        .collect()
}

/// Revenue for each calendar-to-date window ending at `now`
pub fn summarize(
    agreements: &[RevenueAgreement],
    adjustments: &[PriceAdjustment],
    tz: &BusinessTz,
    now: DateTime<Utc>,
) -> RevenueSummary {
    let ledgers = build_ledgers(agreements, adjustments);

    let windows = Period::ALL
        .iter()
        .map(|&period| {
            let window_start = tz.start_of(period, now);
            let mut booking_revenue: i64 = 0;
            let mut adjustment_revenue: i64 = 0;
            let mut agreement_count = 0;

            for ledger in &ledgers {
                if ledger.booked_at > now {
                    continue;
                }

                if ledger.booked_at >= window_start {
                    let applied = saturating_sum(
                        ledger
                            .deltas
                            .iter()
                            .filter(|(at, _)| *at <= now)
                            .map(|(_, d)| d),
                    );
                    booking_revenue = booking_revenue
                        .saturating_add(ledger.original_price.saturating_add(applied));
                    agreement_count += 1;
                } else {
                    adjustment_revenue = adjustment_revenue.saturating_add(saturating_sum(
                        ledger
                            .deltas
                            .iter()
                            .filter(|(at, _)| *at >= window_start && *at <= now)
                            .map(|(_, d)| d),
                    ));
                }
            }

            WindowRevenue {
                period,
                window_start,
                booking_revenue,
                adjustment_revenue,
                total: booking_revenue.saturating_add(adjustment_revenue),
                agreement_count,
            }
        })
        .collect();

    RevenueSummary {
        generated_at: now,
        business_utc_offset_hours: tz.offset_hours(),
        windows,
    }
}

/// Contiguous `period` buckets from the one containing `from` through the one containing `to`
pub fn bucketize(
    agreements: &[RevenueAgreement],
    adjustments: &[PriceAdjustment],
    tz: &BusinessTz,
    period: Period,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<RevenueBucket>> {
    let mut buckets: Vec<RevenueBucket> = empty_buckets(tz, period, from, to)?
        .into_iter()
        .map(|(start, end)| RevenueBucket {
            start,
            end,
            booking_revenue: 0,
            adjustment_revenue: 0,
            total: 0,
            agreement_count: 0,
        })
        .collect();

    for ledger in build_ledgers(agreements, adjustments) {
        if let Some(i) = bucket_index(&buckets, |b: &RevenueBucket| (b.start, b.end), ledger.booked_at) {
            buckets[i].booking_revenue =
                buckets[i].booking_revenue.saturating_add(ledger.original_price);
            buckets[i].agreement_count += 1;
        }
        for (at, delta) in &ledger.deltas {
            if let Some(i) = bucket_index(&buckets, |b: &RevenueBucket| (b.start, b.end), *at) {
                buckets[i].adjustment_revenue =
                    buckets[i].adjustment_revenue.saturating_add(*delta);
            }
        }
    }

    for bucket in &mut buckets {
        bucket.total = bucket.booking_revenue.saturating_add(bucket.adjustment_revenue);
    }

    Ok(buckets)
}

/// `[start, end)` bounds of the buckets covering `from..=to`.
///
/// Shared with the traffic analytics so both series line up.
pub fn empty_buckets(
    tz: &BusinessTz,
    period: Period,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    if from > to {
        return Err(Error::InvalidInput(format!(
            "Range start {} is after range end {}",
            from.to_rfc3339(),
            to.to_rfc3339()
        )));
    }

    let mut bounds = Vec::new();
    let mut start = tz.start_of(period, from);
    while start <= to {
        if bounds.len() == MAX_BUCKETS {
            return Err(Error::InvalidInput(format!(
                "Range spans more than {} {} buckets",
                MAX_BUCKETS, period
            )));
        }
        let end = tz.next_start(period, start);
        bounds.push((start, end));
        start = end;
    }

    Ok(bounds)
}

/// Index of the bucket whose `[start, end)` contains `at`
pub fn bucket_index<T>(
    buckets: &[T],
    bounds: impl Fn(&T) -> (DateTime<Utc>, DateTime<Utc>),
    at: DateTime<Utc>,
) -> Option<usize> {
    let idx = buckets.partition_point(|b| bounds(b).0 <= at);
    if idx == 0 {
        return None;
    }
    let (_, end) = bounds(&buckets[idx - 1]);
    (at < end).then_some(idx - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn agreement(id: &str, price: i64, status: AgreementStatus, booked: &str) -> RevenueAgreement {
        RevenueAgreement {
            id: id.to_string(),
            price,
            status,
            booked_at: utc(booked),
        }
    }

    fn adjustment(id: &str, before: i64, after: i64, at: &str) -> PriceAdjustment {
        PriceAdjustment {
            agreement_id: id.to_string(),
            before,
            after,
            logged_at: utc(at),
        }
    }

    fn window(summary: &RevenueSummary, period: Period) -> &WindowRevenue {
        summary.windows.iter().find(|w| w.period == period).unwrap()
    }

    // now = 2024-05-15 12:00 local (UTC+8), a Wednesday
    const NOW: &str = "2024-05-15T04:00:00Z";

    #[test]
    fn test_booking_revenue_per_window() {
        let tz = BusinessTz::default();
        let agreements = vec![
            agreement("today", 1000, AgreementStatus::Confirmed, "2024-05-15T01:00:00Z"),
            agreement("monday", 2000, AgreementStatus::Active, "2024-05-13T02:00:00Z"),
            agreement("april", 4000, AgreementStatus::Completed, "2024-04-10T02:00:00Z"),
            agreement("january", 8000, AgreementStatus::Completed, "2024-01-05T02:00:00Z"),
            agreement("last_year", 16000, AgreementStatus::Completed, "2023-12-01T02:00:00Z"),
        ];

        let summary = summarize(&agreements, &[], &tz, utc(NOW));

        assert_eq!(window(&summary, Period::Day).total, 1000);
        assert_eq!(window(&summary, Period::Week).total, 3000);
        assert_eq!(window(&summary, Period::Month).total, 3000);
        assert_eq!(window(&summary, Period::Quarter).total, 7000);
        assert_eq!(window(&summary, Period::Year).total, 15000);
        assert_eq!(window(&summary, Period::Year).agreement_count, 4);
        assert_eq!(summary.business_utc_offset_hours, 8);
    }

    #[test]
    fn test_booking_just_after_local_midnight_counts_today() {
        let tz = BusinessTz::default();
        // 2024-05-14 16:00 UTC is 2024-05-15 00:00 local
        let agreements = vec![
            agreement("edge", 500, AgreementStatus::Pending, "2024-05-14T16:00:00Z"),
            agreement("before", 700, AgreementStatus::Pending, "2024-05-14T15:59:59Z"),
        ];

        let summary = summarize(&agreements, &[], &tz, utc(NOW));
        assert_eq!(window(&summary, Period::Day).booking_revenue, 500);
        assert_eq!(window(&summary, Period::Day).agreement_count, 1);
    }

    #[test]
    fn test_cancelled_agreement_never_counts() {
        let tz = BusinessTz::default();
        let agreements = vec![
            agreement("kept", 1000, AgreementStatus::Confirmed, "2024-05-15T01:00:00Z"),
            agreement("gone", 9000, AgreementStatus::Cancelled, "2024-05-15T01:00:00Z"),
            agreement("old_gone", 5000, AgreementStatus::Cancelled, "2024-03-01T01:00:00Z"),
        ];
        let adjustments = vec![
            adjustment("gone", 8000, 9000, "2024-05-15T02:00:00Z"),
            adjustment("old_gone", 4000, 5000, "2024-05-15T02:00:00Z"),
        ];

        let summary = summarize(&agreements, &adjustments, &tz, utc(NOW));
        for w in &summary.windows {
            assert_eq!(w.total, 1000, "window {}", w.period);
        }
    }

    #[test]
    fn test_adjustment_on_older_booking_counts_in_narrow_window() {
        let tz = BusinessTz::default();
        // Booked in April for 3000, raised to 3500 today
        let agreements = vec![agreement(
            "a",
            3500,
            AgreementStatus::Active,
            "2024-04-20T02:00:00Z",
        )];
        let adjustments = vec![adjustment("a", 3000, 3500, "2024-05-15T02:00:00Z")];

        let summary = summarize(&agreements, &adjustments, &tz, utc(NOW));

        let day = window(&summary, Period::Day);
        assert_eq!(day.booking_revenue, 0);
        assert_eq!(day.adjustment_revenue, 500);
        assert_eq!(day.total, 500);

        // The quarter already holds the booking at its current price
        let quarter = window(&summary, Period::Quarter);
        assert_eq!(quarter.booking_revenue, 3500);
        assert_eq!(quarter.adjustment_revenue, 0);
        assert_eq!(quarter.total, 3500);
    }

    #[test]
    fn test_adjustment_after_now_is_not_applied() {
        let tz = BusinessTz::default();
        let agreements = vec![agreement(
            "a",
            1200,
            AgreementStatus::Confirmed,
            "2024-05-15T01:00:00Z",
        )];
        let adjustments = vec![adjustment("a", 1000, 1200, "2024-05-16T01:00:00Z")];

        let summary = summarize(&agreements, &adjustments, &tz, utc(NOW));
        assert_eq!(window(&summary, Period::Day).booking_revenue, 1000);
    }

    #[test]
    fn test_unknown_agreement_adjustments_ignored() {
        let tz = BusinessTz::default();
        let adjustments = vec![adjustment("ghost", 100, 900, "2024-05-15T02:00:00Z")];
        let summary = summarize(&[], &adjustments, &tz, utc(NOW));
        assert!(summary.windows.iter().all(|w| w.total == 0));
    }

    #[test]
    fn test_buckets_split_original_price_and_deltas() {
        let tz = BusinessTz::default();
        let agreements = vec![agreement(
            "a",
            1500,
            AgreementStatus::Confirmed,
            "2024-05-13T02:00:00Z",
        )];
        let adjustments = vec![
            adjustment("a", 1000, 1300, "2024-05-14T02:00:00Z"),
            adjustment("a", 1300, 1500, "2024-05-15T02:00:00Z"),
        ];

        let buckets = bucketize(
            &agreements,
            &adjustments,
            &tz,
            Period::Day,
            utc("2024-05-12T20:00:00Z"),
            utc(NOW),
        )
        .unwrap();

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].booking_revenue, 1000);
        assert_eq!(buckets[0].agreement_count, 1);
        assert_eq!(buckets[1].adjustment_revenue, 300);
        assert_eq!(buckets[2].adjustment_revenue, 200);
        let sum: i64 = buckets.iter().map(|b| b.total).sum();
        assert_eq!(sum, 1500);
    }

    #[test]
    fn test_bucket_totals_match_summary_windows() {
        let tz = BusinessTz::default();
        let agreements = vec![
            agreement("a", 1500, AgreementStatus::Confirmed, "2024-05-13T02:00:00Z"),
            agreement("b", 2500, AgreementStatus::Completed, "2024-02-02T02:00:00Z"),
            agreement("c", 900, AgreementStatus::Active, "2024-05-15T03:00:00Z"),
            agreement("d", 4000, AgreementStatus::Cancelled, "2024-05-14T03:00:00Z"),
            agreement("e", 3100, AgreementStatus::Completed, "2023-11-02T02:00:00Z"),
        ];
        let adjustments = vec![
            adjustment("a", 1000, 1500, "2024-05-14T02:00:00Z"),
            adjustment("b", 2000, 2500, "2024-05-15T02:00:00Z"),
            adjustment("e", 3000, 3100, "2024-04-02T02:00:00Z"),
            adjustment("d", 3000, 4000, "2024-05-15T02:00:00Z"),
        ];
        let now = utc(NOW);
        let summary = summarize(&agreements, &adjustments, &tz, now);

        for period in Period::ALL {
            let buckets = bucketize(&agreements, &adjustments, &tz, period, now, now).unwrap();
            assert_eq!(buckets.len(), 1);
            assert_eq!(buckets[0].total, window(&summary, period).total, "period {}", period);
        }
    }

    #[test]
    fn test_huge_prices_saturate_instead_of_overflowing() {
        let tz = BusinessTz::default();
        let huge = i64::MAX / 2 + 1;
        let agreements = vec![
            agreement("x", huge, AgreementStatus::Confirmed, "2024-05-15T01:00:00Z"),
            agreement("y", huge, AgreementStatus::Confirmed, "2024-05-15T02:00:00Z"),
        ];
        let adjustments = vec![adjustment("x", i64::MIN, huge, "2024-05-15T03:00:00Z")];
        let now = utc(NOW);

        let summary = summarize(&agreements, &adjustments, &tz, now);
        assert_eq!(window(&summary, Period::Day).total, i64::MAX);
        assert_eq!(window(&summary, Period::Day).agreement_count, 2);

        let buckets = bucketize(&agreements, &adjustments, &tz, Period::Day, now, now).unwrap();
        assert_eq!(buckets[0].total, i64::MAX);
    }

    #[test]
    fn test_max_price_volumes_stay_exact() {
        let tz = BusinessTz::default();
        let agreements: Vec<RevenueAgreement> = (0..1000)
            .map(|i| {
                agreement(
                    &format!("a{}", i),
                    MAX_PRICE,
                    AgreementStatus::Completed,
                    "2024-05-15T01:00:00Z",
                )
            })
            .collect();

        let summary = summarize(&agreements, &[], &tz, utc(NOW));
        assert_eq!(window(&summary, Period::Year).total, MAX_PRICE * 1000);
    }

    #[test]
    fn test_bucketize_rejects_inverted_range() {
        let tz = BusinessTz::default();
        let result = bucketize(
            &[],
            &[],
            &tz,
            Period::Day,
            utc("2024-05-15T00:00:00Z"),
            utc("2024-05-14T00:00:00Z"),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_bucketize_caps_bucket_count() {
        let tz = BusinessTz::default();
        let result = bucketize(
            &[],
            &[],
            &tz,
            Period::Day,
            utc("2020-01-01T00:00:00Z"),
            utc("2024-01-01T00:00:00Z"),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let ok = bucketize(
            &[],
            &[],
            &tz,
            Period::Month,
            utc("2020-01-01T00:00:00Z"),
            utc("2024-01-01T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(ok.len(), 49);
    }

    #[test]
    fn test_price_adjustments_from_logs() {
        let log = |table: &str, action, before: Option<&str>, after: Option<&str>| AuditLog {
            id: "log".to_string(),
            table_name: table.to_string(),
            record_id: "a".to_string(),
            action,
            actor_id: None,
            before_json: before.map(str::to_string),
            after_json: after.map(str::to_string),
            created_at: utc(NOW),
        };

        let logs = vec![
            log("agreements", AuditAction::Update, Some(r#"{"price":100}"#), Some(r#"{"price":150}"#)),
            log("agreements", AuditAction::Update, Some(r#"{"price":150}"#), Some(r#"{"price":150,"status":"active"}"#)),
            log("agreements", AuditAction::Insert, None, Some(r#"{"price":100}"#)),
            log("cars", AuditAction::Update, Some(r#"{"price":1}"#), Some(r#"{"price":2}"#)),
            log("agreements", AuditAction::Update, Some("not json"), Some(r#"{"price":2}"#)),
        ];

        let adjustments = price_adjustments_from_logs(&logs);
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].delta(), 50);
        assert_eq!(adjustments[0].agreement_id, "a");
    }
}
