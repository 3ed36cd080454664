//! Exact-total reconciliation: the constrained correction phase.
//!
//! After the draft phase the realised flag counts drift from the
//! external targets. `reconcile()` closes the gap by flipping exactly
//! |target - realised| rows, drawn uniformly without replacement from
//! the qualifying rows on the side that is over- or under-represented.
//! Rows on the other side are never touched.
//!
//! Order matters: exits are reconciled (and settled) before permanent
//! housing, because permanent housing only qualifies among exited rows.

use crate::{
    engagement::{EngagementRecord, EngagementSampler},
    error::{SynthError, SynthResult},
    rng::StreamRng,
    types::{DATA_NOT_COLLECTED, NO_EXIT_INTERVIEW},
};
use chrono::NaiveDate;
use rand::seq::index;

/// A 0/1 column that can be forced to an exact total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagColumn {
    Exited,
    PermanentHousing,
}

impl FlagColumn {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exited => "exited_flag",
            Self::PermanentHousing => "permanent_housing_flag",
        }
    }

    pub fn get(&self, row: &EngagementRecord) -> bool {
        match self {
            Self::Exited => row.exited_flag,
            Self::PermanentHousing => row.permanent_housing_flag,
        }
    }

    fn set(&self, row: &mut EngagementRecord, value: bool) {
        match self {
            Self::Exited => row.exited_flag = value,
            Self::PermanentHousing => row.permanent_housing_flag = value,
        }
    }

    /// Rows that count toward this column's total.
    pub fn qualifies(&self, row: &EngagementRecord) -> bool {
        match self {
            Self::Exited => true,
            Self::PermanentHousing => row.exited_flag,
        }
    }

    /// Realised total over qualifying rows.
    pub fn count(&self, rows: &[EngagementRecord]) -> usize {
        rows.iter()
            .filter(|r| self.qualifies(r) && self.get(r))
            .count()
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub column: FlagColumn,
    pub target: usize,
    pub realized: usize,
    /// The value every flipped row now holds.
    pub flipped_to: bool,
    /// Row indices that were flipped, ascending.
    pub flipped: Vec<usize>,
}

impl ReconcileReport {
    pub fn flip_count(&self) -> usize {
        self.flipped.len()
    }
}

/// Force `column`'s qualifying total to `target` by flipping a uniform
/// random subset of rows, without replacement.
pub fn reconcile(
    rows: &mut [EngagementRecord],
    target: usize,
    column: FlagColumn,
    rng: &mut StreamRng,
) -> SynthResult<ReconcileReport> {
    let realized = column.count(rows);
    // Under target: raise unset rows. Over target: clear set rows.
    let flipped_to = realized < target;
    let needed = realized.abs_diff(target);

    let pool: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| column.qualifies(r) && column.get(r) != flipped_to)
        .map(|(i, _)| i)
        .collect();

    if needed > pool.len() {
        return Err(SynthError::Reconciliation {
            column: column.name(),
            needed,
            available: pool.len(),
        });
    }

    let mut flipped: Vec<usize> = index::sample(rng, pool.len(), needed)
        .into_iter()
        .map(|k| pool[k])
        .collect();
    flipped.sort_unstable();
    for &i in &flipped {
        column.set(&mut rows[i], flipped_to);
    }

    log::debug!(
        "reconcile: {} realised={realized} target={target} flipped {} rows to {}",
        column.name(),
        flipped.len(),
        u8::from(flipped_to)
    );

    Ok(ReconcileReport {
        column,
        target,
        realized,
        flipped_to,
        flipped,
    })
}

/// Bring rows touched by an exit reconciliation in line with their new
/// exit status.
///
/// Newly exited rows keep their dates (already on or before the horizon)
/// and draw an exit income band. Newly open rows are pinned to the
/// horizon with no permanent-housing outcome and no income data.
/// `exit_interview_completed` is left as drafted in both cases.
pub fn settle_exit_flips(
    rows: &mut [EngagementRecord],
    report: &ReconcileReport,
    horizon_end: NaiveDate,
    sampler: &EngagementSampler<'_>,
    rng: &mut StreamRng,
) {
    debug_assert_eq!(report.column, FlagColumn::Exited);
    for &i in &report.flipped {
        let row = &mut rows[i];
        if report.flipped_to {
            row.income_at_exit_range = sampler.draw_income(rng);
        } else {
            row.exit_date = horizon_end;
            row.permanent_housing_flag = false;
            row.income_at_exit_range = DATA_NOT_COLLECTED.to_string();
        }
    }
}

/// Re-apply the row-level sentinel rules after all flips.
/// Returns the number of rows changed.
pub fn enforce_consistency(rows: &mut [EngagementRecord]) -> usize {
    let mut changed = 0;
    for row in rows.iter_mut() {
        let mut touched = false;
        if !row.exited_flag {
            if row.permanent_housing_flag {
                row.permanent_housing_flag = false;
                touched = true;
            }
            if row.income_at_exit_range != DATA_NOT_COLLECTED {
                row.income_at_exit_range = DATA_NOT_COLLECTED.to_string();
                touched = true;
            }
        }
        if !row.exit_interview_completed && row.exit_destination != NO_EXIT_INTERVIEW {
            row.exit_destination = NO_EXIT_INTERVIEW.to_string();
            touched = true;
        }
        if touched {
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(i: usize, exited: bool, perm: bool) -> EngagementRecord {
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        EngagementRecord {
            client_id: crate::types::client_id(i),
            program_name: "CEA".into(),
            provider: "Provider_01".into(),
            entry_date: day,
            exit_date: day,
            exited_flag: exited,
            exit_interview_completed: true,
            exit_destination: "Other".into(),
            income_at_exit_range: if exited { "No Income".into() } else { DATA_NOT_COLLECTED.into() },
            permanent_housing_flag: perm,
        }
    }

    /// 2495 rows, the first `exited` of them exited.
    fn table(exited: usize) -> Vec<EngagementRecord> {
        (0..2495).map(|i| row(i, i < exited, false)).collect()
    }

    #[test]
    fn raises_exits_from_open_rows_only() {
        let mut rows = table(2100);
        let before = rows.clone();
        let mut rng = StreamRng::new(42, 3);

        let report = reconcile(&mut rows, 2261, FlagColumn::Exited, &mut rng).unwrap();

        assert_eq!(report.realized, 2100);
        assert_eq!(report.flip_count(), 161);
        assert!(report.flipped_to);
        assert_eq!(FlagColumn::Exited.count(&rows), 2261);
        for i in 0..2100 {
            assert_eq!(rows[i], before[i], "already-exited row {i} was altered");
        }
        assert!(report.flipped.iter().all(|i| *i >= 2100));
        let mut dedup = report.flipped.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), 161, "a row was flipped twice");
    }

    #[test]
    fn lowers_exits_from_exited_rows_only() {
        let mut rows = table(2400);
        let mut rng = StreamRng::new(42, 3);

        let report = reconcile(&mut rows, 2261, FlagColumn::Exited, &mut rng).unwrap();

        assert_eq!(report.flip_count(), 139);
        assert!(!report.flipped_to);
        assert!(report.flipped.iter().all(|i| *i < 2400));
        assert_eq!(FlagColumn::Exited.count(&rows), 2261);
        assert!(rows[2400..].iter().all(|r| !r.exited_flag));
    }

    #[test]
    fn on_target_is_a_no_op() {
        let mut rows = table(2261);
        let before = rows.clone();
        let mut rng = StreamRng::new(1, 3);
        let report = reconcile(&mut rows, 2261, FlagColumn::Exited, &mut rng).unwrap();
        assert!(report.flipped.is_empty());
        assert_eq!(rows, before);
    }

    #[test]
    fn permanent_housing_only_touches_exited_rows() {
        let mut rows: Vec<_> = (0..100).map(|i| row(i, i < 60, false)).collect();
        let mut rng = StreamRng::new(9, 3);

        let report =
            reconcile(&mut rows, 25, FlagColumn::PermanentHousing, &mut rng).unwrap();

        assert_eq!(report.flip_count(), 25);
        assert!(report.flipped.iter().all(|i| *i < 60));
        assert!(rows[60..].iter().all(|r| !r.permanent_housing_flag));
        assert_eq!(FlagColumn::PermanentHousing.count(&rows), 25);
    }

    #[test]
    fn open_rows_do_not_count_toward_permanent_housing() {
        // A stray flag on an open row is outside the qualifying set.
        let mut rows: Vec<_> = (0..10).map(|i| row(i, i < 5, i == 7)).collect();
        assert_eq!(FlagColumn::PermanentHousing.count(&rows), 0);
        let mut rng = StreamRng::new(2, 3);
        let report = reconcile(&mut rows, 5, FlagColumn::PermanentHousing, &mut rng).unwrap();
        assert_eq!(report.flip_count(), 5);
        assert!(rows[..5].iter().all(|r| r.permanent_housing_flag));
    }

    #[test]
    fn infeasible_target_is_an_error() {
        let mut rows: Vec<_> = (0..10).map(|i| row(i, i < 4, false)).collect();
        let mut rng = StreamRng::new(2, 3);
        let err = reconcile(&mut rows, 6, FlagColumn::PermanentHousing, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            SynthError::Reconciliation { needed: 6, available: 4, .. }
        ));
    }

    #[test]
    fn consistency_forces_sentinels() {
        let mut rows = vec![row(0, false, true), row(1, true, true), row(2, true, false)];
        rows[0].income_at_exit_range = "$2,001+".into();
        rows[2].exit_interview_completed = false;

        let changed = enforce_consistency(&mut rows);

        assert_eq!(changed, 2);
        assert!(!rows[0].permanent_housing_flag);
        assert_eq!(rows[0].income_at_exit_range, DATA_NOT_COLLECTED);
        assert!(rows[1].permanent_housing_flag);
        assert_eq!(rows[2].exit_destination, NO_EXIT_INTERVIEW);
    }
}
