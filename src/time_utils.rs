//! Calendar helpers for CESM output, which uses a 365-day (`noleap`) calendar.

use crate::error::PhysicsError;
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{concatenate, ArrayD, ArrayViewD, Axis};
use tracing::debug;

/// Days in each month of the noleap calendar
pub const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Model output steps per day
pub const STEPS_PER_DAY: usize = 4;

/// Hours between two output steps
pub const HOURS_PER_STEP: i64 = 6;

/// Number of days in `month` (1-12), ignoring leap days
pub fn days_in_month(month: u32) -> Result<u32, PhysicsError> {
    month
        .checked_sub(1)
        .and_then(|m| DAYS_IN_MONTH.get(m as usize))
        .copied()
        .ok_or_else(|| PhysicsError::invalid(format!("month {} out of range", month)))
}

/// Number of 6-hourly steps in `month`
pub fn six_hourly_steps(month: u32) -> Result<usize, PhysicsError> {
    Ok(days_in_month(month)? as usize * STEPS_PER_DAY)
}

/// Midnight on the first day of the month
pub fn month_start(year: i32, month: u32) -> Result<NaiveDateTime, PhysicsError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| PhysicsError::invalid(format!("invalid year/month {}-{}", year, month)))
}

/// CF units string for the time axis of one monthly file
pub fn time_units(year: i32, month: u32) -> Result<String, PhysicsError> {
    let start = month_start(year, month)?;
    Ok(format!("hours since {}", start.format("%Y-%m-%d %H:%M:%S")))
}

/// Hours since the start of the month for every 6-hourly step
pub fn six_hourly_offsets(month: u32) -> Result<Vec<f64>, PhysicsError> {
    let steps = six_hourly_steps(month)?;
    Ok((0..steps)
        .map(|i| (i as i64 * HOURS_PER_STEP) as f64)
        .collect())
}

/// Record of a monthly file that belongs to `month`.
///
/// Files holding one record are returned whole; files holding a full year
/// (twelve records) are indexed by month.
pub fn monthly_slice(field: ArrayViewD<'_, f32>, month: u32) -> Result<ArrayViewD<'_, f32>, PhysicsError> {
    days_in_month(month)?;
    if field.ndim() == 0 {
        return Err(PhysicsError::shape("monthly field has no time axis"));
    }
    match field.len_of(Axis(0)) {
        1 => Ok(field),
        12 => {
            let index = month as usize - 1;
            let mut field = field;
            field.slice_axis_inplace(Axis(0), (index..=index).into());
            Ok(field)
        }
        n => Err(PhysicsError::shape(format!(
            "monthly field has {} records, expected 1 or 12",
            n
        ))),
    }
}

/// Repeat each record along the leading time axis so the field has `steps`
/// records.
///
/// A single record (monthly mean) fills the whole month; daily records are
/// each repeated `steps / ndays` times. The record count must divide `steps`.
pub fn upsample_to_steps(field: ArrayViewD<'_, f32>, steps: usize) -> Result<ArrayD<f32>, PhysicsError> {
    if field.ndim() == 0 {
        return Err(PhysicsError::shape("field has no time axis"));
    }
    let records = field.len_of(Axis(0));
    if records == 0 || steps == 0 || steps % records != 0 {
        return Err(PhysicsError::shape(format!(
            "cannot upsample {} records to {} steps",
            records, steps
        )));
    }

    let repeat = steps / records;
    debug!("Upsampling {} records x{} -> {} steps", records, repeat, steps);

    let slices: Vec<ArrayViewD<'_, f32>> = field
        .axis_iter(Axis(0))
        .flat_map(|record| std::iter::repeat(record.insert_axis(Axis(0))).take(repeat))
        .collect();
    concatenate(Axis(0), &slices).map_err(|e| PhysicsError::shape(e.to_string()))
}
