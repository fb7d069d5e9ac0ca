//! Wide-table merge of per-symbol price series.
//!
//! Outer join on the calendar date: one row per date present in any input,
//! one column per series (input order), undefined where a symbol has no row.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::domain::{Series, WideTable};

pub fn merge_wide(series: &[Series]) -> WideTable {
    let dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|s| s.observations.iter().map(|o| o.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut table = WideTable::new(dates);
    for s in series {
        let by_date: HashMap<NaiveDate, Option<f64>> =
            s.observations.iter().map(|o| (o.date, o.value)).collect();
        let values = table
            .dates
            .iter()
            .map(|d| by_date.get(d).copied().flatten())
            .collect();
        table.push_column(s.name.clone(), values);
    }
    table
}
