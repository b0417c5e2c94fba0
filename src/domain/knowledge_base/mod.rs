//! Knowledge Base domain - metadata filters and document ingestion

mod filter;
mod ingestion;

pub use filter::{
    parse_list_value, parse_rows, parse_rows_with, parse_simple_value, to_rows, FilterBuilder,
    FilterCondition, FilterConnector, FilterError, FilterExpression, FilterOperator, FilterRow,
};
pub use ingestion::{any_active, IngestionOperation, IngestionStatus};
