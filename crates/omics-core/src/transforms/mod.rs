//! Aggregation and key-alignment transforms

pub mod agg;
pub mod df;

pub use agg::{get_multi_aggregators, groupby_agg, merge_concat, Aggregator};
pub use df::{drop_duplicate_columns, fuzzy_key_map, has_iterables, match_iterable_keys};
