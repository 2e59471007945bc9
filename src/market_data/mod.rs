pub mod bar;
pub mod bar_buffer;
pub mod request_table;

// Re-export the building blocks the reconciler and sources share.
pub use bar::{parse_bar_time, RawBar};
pub use bar_buffer::{BarBuffer, MergeOutcome};
pub use request_table::{RequestId, RequestTrackingTable, SeriesState};
