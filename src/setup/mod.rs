// =============================================================================
// Setups — annotated bars with their market context
// =============================================================================
//
// `recorder` turns an indicator frame and a timestamp into a flat record,
// `store` persists the table, `query` selects and summarises it.

pub mod query;
pub mod recorder;
pub mod store;

pub use query::{
    column_summary, distinct_values, value_counts, ColumnSummary, SetupFilter, ALL_TICKERS,
    T0_COLUMNS, T1_COLUMNS,
};
pub use recorder::{
    build_setup_record, nearest_bar_index, FieldValue, SetupContext, SetupRecord, SetupRecorder,
};
pub use store::SetupStore;
