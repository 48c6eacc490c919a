/// CSV export of the report log.
pub mod export;
