//! The quota accountant: daily/monthly/yearly counters, each with its
//! own reset boundary on the UTC calendar, plus the `unlocked_balance`
//! derivation. Caps business logic (when a boundary fires, what the next
//! reset timestamp is) lives entirely here — `balancechain-store` just
//! persists whatever record it is handed.

use balancechain_core::constants::{DAILY_CAP, INITIAL_UNLOCKED, MONTHLY_CAP, YEARLY_CAP};
use balancechain_core::{CapsRecord, Hid, TimestampMs, ValidationError};
use balancechain_store::Store;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::Mutex;

/// Counters with their caps, available for whatever the caller wants to do
/// with them (reporting, validator rule 2, etc).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Availability {
    pub daily_available: u32,
    pub monthly_available: u32,
    pub yearly_available: u32,
}

/// The caps accountant for one open chain. Holds a small in-memory cache of
/// the current record per hid, invalidated on every reset or increment. The
/// cache is private to this accountant; nothing outside touches it.
pub struct CapsAccountant<'a> {
    store: &'a Store,
    cache: Mutex<Option<CapsRecord>>,
}

impl<'a> CapsAccountant<'a> {
    pub fn new(store: &'a Store) -> Self {
        CapsAccountant {
            store,
            cache: Mutex::new(None),
        }
    }

    /// Read the current counters for `hid`, rolling forward any reset
    /// boundary that has passed and persisting the result. Returns the
    /// up-to-date record.
    pub fn current(&self, hid: &Hid, now_ms: TimestampMs) -> Result<CapsRecord, balancechain_store::error::StoreError> {
        let mut record = match self.store.get_caps(hid)? {
            Some(r) => r,
            None => fresh_record(hid.clone(), now_ms),
        };

        let mut changed = false;
        if now_ms >= record.daily_reset_at {
            record.daily = 0;
            record.daily_reset_at = next_day_boundary(now_ms);
            changed = true;
        }
        if now_ms >= record.monthly_reset_at {
            record.monthly = 0;
            record.monthly_reset_at = next_month_boundary(now_ms);
            changed = true;
        }
        if now_ms >= record.yearly_reset_at {
            record.yearly = 0;
            record.yearly_reset_at = next_year_boundary(now_ms);
            changed = true;
        }

        if changed {
            self.store.put_caps(&record)?;
            *self.cache.lock().unwrap() = None;
        } else {
            *self.cache.lock().unwrap() = Some(record.clone());
        }

        Ok(record)
    }

    /// Compute the next `CapsRecord` for `hid` after adding `n`, refusing if
    /// any counter would exceed its cap. Does not write to the store or
    /// touch the cache — the caller is responsible for persisting the
    /// returned record (typically as part of a larger atomic write) and
    /// calling [`CapsAccountant::invalidate_cache`] once that write commits.
    pub fn compute_increment(
        &self,
        hid: &Hid,
        n: u32,
        now_ms: TimestampMs,
    ) -> Result<CapsRecord, CapsError> {
        let mut record = self.current(hid, now_ms)?;

        if record.daily + n > DAILY_CAP {
            return Err(CapsError::Validation(ValidationError::DailyCapExceeded));
        }
        if record.monthly + n > MONTHLY_CAP {
            return Err(CapsError::Validation(ValidationError::MonthlyCapExceeded));
        }
        if record.yearly + n > YEARLY_CAP {
            return Err(CapsError::Validation(ValidationError::YearlyCapExceeded));
        }

        record.daily += n;
        record.monthly += n;
        record.yearly += n;
        record.total += n as u64;

        Ok(record)
    }

    /// Drop the cached record for the next [`CapsAccountant::current`] call
    /// to re-read from the store. Call this after a caller-managed write
    /// (e.g. [`CapsAccountant::compute_increment`]'s result persisted inside
    /// another transaction) actually commits.
    pub fn invalidate_cache(&self) {
        *self.cache.lock().unwrap() = None;
    }

    /// Increase all three counters and the running total by `n`, refusing
    /// if any counter would exceed its cap. Persists on success. Convenience
    /// wrapper around [`CapsAccountant::compute_increment`] for callers that
    /// aren't folding the write into a larger transaction.
    pub fn increment(
        &self,
        hid: &Hid,
        n: u32,
        now_ms: TimestampMs,
    ) -> Result<CapsRecord, CapsError> {
        let record = self.compute_increment(hid, n, now_ms)?;
        self.store.put_caps(&record)?;
        self.invalidate_cache();
        Ok(record)
    }

    pub fn available(&self, hid: &Hid, now_ms: TimestampMs) -> Result<Availability, balancechain_store::error::StoreError> {
        let record = self.current(hid, now_ms)?;
        Ok(Availability {
            daily_available: DAILY_CAP.saturating_sub(record.daily),
            monthly_available: MONTHLY_CAP.saturating_sub(record.monthly),
            yearly_available: YEARLY_CAP.saturating_sub(record.yearly),
        })
    }

    pub fn unlocked_balance(&self, hid: &Hid, now_ms: TimestampMs) -> Result<i64, balancechain_store::error::StoreError> {
        let record = self.current(hid, now_ms)?;
        Ok(INITIAL_UNLOCKED + record.total as i64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CapsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] balancechain_store::error::StoreError),
}

/// Adapts [`CapsAccountant`] to the validator's narrow [`balancechain_validator::CapsView`]
/// contract, so the validator never has to know about reset windows or caching.
pub struct CapsViewAdapter<'s, 'a>(pub &'s CapsAccountant<'a>);

impl<'s, 'a> balancechain_validator::CapsView for CapsViewAdapter<'s, 'a> {
    fn would_exceed(&self, hid: &Hid, now_ms: TimestampMs) -> Option<ValidationError> {
        let record = self.0.current(hid, now_ms).ok()?;
        if record.daily + 1 > DAILY_CAP {
            return Some(ValidationError::DailyCapExceeded);
        }
        if record.monthly + 1 > MONTHLY_CAP {
            return Some(ValidationError::MonthlyCapExceeded);
        }
        if record.yearly + 1 > YEARLY_CAP {
            return Some(ValidationError::YearlyCapExceeded);
        }
        None
    }
}

fn fresh_record(hid: Hid, now_ms: TimestampMs) -> CapsRecord {
    CapsRecord::fresh(
        hid,
        next_day_boundary(now_ms),
        next_month_boundary(now_ms),
        next_year_boundary(now_ms),
    )
}

fn to_datetime(now_ms: TimestampMs) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap())
}

fn next_day_boundary(now_ms: TimestampMs) -> TimestampMs {
    let dt = to_datetime(now_ms);
    let next_midnight = (dt.date_naive() + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Utc.from_utc_datetime(&next_midnight).timestamp_millis()
}

fn next_month_boundary(now_ms: TimestampMs) -> TimestampMs {
    let dt = to_datetime(now_ms);
    let (year, month) = if dt.month() == 12 {
        (dt.year() + 1, 1)
    } else {
        (dt.year(), dt.month() + 1)
    };
    let first_of_next = chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Utc.from_utc_datetime(&first_of_next).timestamp_millis()
}

fn next_year_boundary(now_ms: TimestampMs) -> TimestampMs {
    let dt = to_datetime(now_ms);
    let jan_first_next = chrono::NaiveDate::from_ymd_opt(dt.year() + 1, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Utc.from_utc_datetime(&jan_first_next).timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancechain_validator::CapsView;

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path()).unwrap()
    }

    fn mid_day_2026_03_15() -> TimestampMs {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn fresh_identity_has_full_availability() {
        let store = temp_store();
        let accountant = CapsAccountant::new(&store);
        let hid = Hid("HID-AAAAAAAA".to_string());
        let availability = accountant.available(&hid, mid_day_2026_03_15()).unwrap();
        assert_eq!(availability.daily_available, DAILY_CAP);
    }

    #[test]
    fn increment_accumulates_and_updates_total() {
        let store = temp_store();
        let accountant = CapsAccountant::new(&store);
        let hid = Hid("HID-AAAAAAAA".to_string());
        let now = mid_day_2026_03_15();
        accountant.increment(&hid, 1, now).unwrap();
        let record = accountant.increment(&hid, 1, now).unwrap();
        assert_eq!(record.daily, 2);
        assert_eq!(record.total, 2);
    }

    #[test]
    fn increment_refuses_past_daily_cap() {
        let store = temp_store();
        let accountant = CapsAccountant::new(&store);
        let hid = Hid("HID-AAAAAAAA".to_string());
        let now = mid_day_2026_03_15();
        accountant.increment(&hid, DAILY_CAP, now).unwrap();
        let err = accountant.increment(&hid, 1, now).unwrap_err();
        assert!(matches!(err, CapsError::Validation(ValidationError::DailyCapExceeded)));
    }

    #[test]
    fn reset_boundary_zeros_daily_counter_and_advances_it() {
        let store = temp_store();
        let accountant = CapsAccountant::new(&store);
        let hid = Hid("HID-AAAAAAAA".to_string());
        let t0 = mid_day_2026_03_15();
        accountant.increment(&hid, 10, t0).unwrap();

        let next_day = next_day_boundary(t0) + 1_000;
        let record = accountant.current(&hid, next_day).unwrap();
        assert_eq!(record.daily, 0);
        assert_eq!(record.monthly, 10);
        assert!(record.daily_reset_at > next_day);
    }

    #[test]
    fn caps_view_adapter_reports_exceeded_before_the_last_increment() {
        let store = temp_store();
        let accountant = CapsAccountant::new(&store);
        let hid = Hid("HID-AAAAAAAA".to_string());
        let now = mid_day_2026_03_15();
        accountant.increment(&hid, DAILY_CAP, now).unwrap();

        let view = CapsViewAdapter(&accountant);
        assert_eq!(view.would_exceed(&hid, now), Some(ValidationError::DailyCapExceeded));
    }

    #[test]
    fn unlocked_balance_adds_total_to_initial_unlocked() {
        let store = temp_store();
        let accountant = CapsAccountant::new(&store);
        let hid = Hid("HID-AAAAAAAA".to_string());
        let now = mid_day_2026_03_15();
        accountant.increment(&hid, 5, now).unwrap();
        assert_eq!(accountant.unlocked_balance(&hid, now).unwrap(), INITIAL_UNLOCKED + 5);
    }
}
