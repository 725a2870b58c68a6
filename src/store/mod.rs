mod graph_store;
mod metrics;
mod table;

pub use graph_store::GraphStore;
pub use metrics::{InstrumentedConnection, InstrumentedStatement, StoreMetrics, StoreMetricsSnapshot};
pub use table::{Row, Table, TableRow};

pub(crate) use table::ValueKey;
