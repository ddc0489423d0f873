//! Aggregation policy for many-to-one relationships

use crate::error::{Error, Result};
use crate::table::{Column, Row, Table};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// How the values of one group collapse to a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    /// Unique non-empty values; a single value stays scalar
    #[default]
    #[serde(alias = "all")]
    Unique,
    /// Every non-empty value, duplicates kept
    Concat,
    /// First non-empty value
    First,
    /// Last non-empty value
    Last,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    /// Number of rows in the group
    Size,
    /// Number of non-empty values
    Count,
    /// Value with the greatest length
    Longest,
    /// Value with the least length
    Shortest,
}

impl FromStr for Aggregator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unique" | "all" => Ok(Aggregator::Unique),
            "concat" => Ok(Aggregator::Concat),
            "first" => Ok(Aggregator::First),
            "last" => Ok(Aggregator::Last),
            "sum" => Ok(Aggregator::Sum),
            "mean" => Ok(Aggregator::Mean),
            "median" => Ok(Aggregator::Median),
            "min" => Ok(Aggregator::Min),
            "max" => Ok(Aggregator::Max),
            "size" => Ok(Aggregator::Size),
            "count" => Ok(Aggregator::Count),
            "longest" => Ok(Aggregator::Longest),
            "shortest" => Ok(Aggregator::Shortest),
            other => Err(Error::UnknownAggregator(other.to_string())),
        }
    }
}

impl std::fmt::Display for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Aggregator::Unique => "unique",
            Aggregator::Concat => "concat",
            Aggregator::First => "first",
            Aggregator::Last => "last",
            Aggregator::Sum => "sum",
            Aggregator::Mean => "mean",
            Aggregator::Median => "median",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::Size => "size",
            Aggregator::Count => "count",
            Aggregator::Longest => "longest",
            Aggregator::Shortest => "shortest",
        };
        write!(f, "{}", name)
    }
}

impl Aggregator {
    /// Collapse the values of one group
    pub fn apply(&self, values: &[Value]) -> Value {
        match self {
            Aggregator::Unique => collapse(unique_scalars(values.iter())),
            Aggregator::Concat => collapse(
                values
                    .iter()
                    .flat_map(|v| v.iter_scalars())
                    .cloned()
                    .collect(),
            ),
            Aggregator::First => values
                .iter()
                .find(|v| !v.is_empty())
                .cloned()
                .unwrap_or(Value::Empty),
            Aggregator::Last => values
                .iter()
                .rev()
                .find(|v| !v.is_empty())
                .cloned()
                .unwrap_or(Value::Empty),
            Aggregator::Sum => sum(values),
            Aggregator::Mean => {
                let nums = numbers(values);
                if nums.is_empty() {
                    Value::Empty
                } else {
                    Value::Float(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            Aggregator::Median => median(numbers(values)),
            Aggregator::Min => extreme(values, |a, b| a < b),
            Aggregator::Max => extreme(values, |a, b| a > b),
            Aggregator::Size => Value::Integer(values.len() as i64),
            Aggregator::Count => {
                Value::Integer(values.iter().filter(|v| !v.is_empty()).count() as i64)
            }
            Aggregator::Longest => by_length(values, |a, b| a > b),
            Aggregator::Shortest => by_length(values, |a, b| a < b),
        }
    }
}

/// Pick an aggregator for every column, honouring per-column overrides
pub fn get_multi_aggregators<S: AsRef<str>>(
    agg: Aggregator,
    agg_for: &HashMap<String, Aggregator>,
    columns: &[S],
) -> HashMap<String, Aggregator> {
    columns
        .iter()
        .map(|c| {
            let c = c.as_ref();
            (c.to_string(), agg_for.get(c).copied().unwrap_or(agg))
        })
        .collect()
}

/// Group rows by the `on` key tuple and aggregate each of `columns`
///
/// `on` may name columns or index levels. Rows with an empty key element are
/// dropped; groups keep first-seen order. The result is indexed by `on`.
pub fn groupby_agg(
    table: &Table,
    on: &[String],
    columns: &[String],
    aggregators: &HashMap<String, Aggregator>,
) -> Result<Table> {
    let keys = table.key_tuples(on)?;
    let values: Vec<Vec<Value>> = columns
        .iter()
        .map(|c| table.column_values(c))
        .collect::<Result<_>>()?;

    let mut group_of: HashMap<&Vec<Value>, usize> = HashMap::new();
    let mut groups: Vec<(&Vec<Value>, Vec<usize>)> = Vec::new();
    for (row_idx, key) in keys.iter().enumerate() {
        if key.iter().any(Value::is_empty) {
            continue;
        }
        let group = *group_of.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[group].1.push(row_idx);
    }

    let rows = groups
        .into_iter()
        .map(|(key, members)| {
            let cells = columns
                .iter()
                .zip(&values)
                .map(|(col, col_values)| {
                    let group_values: Vec<Value> =
                        members.iter().map(|&i| col_values[i].clone()).collect();
                    aggregators
                        .get(col)
                        .copied()
                        .unwrap_or_default()
                        .apply(&group_values)
                })
                .collect();
            Row::new(key.clone(), cells)
        })
        .collect();

    Ok(Table {
        name: table.name.clone(),
        index_names: on.to_vec(),
        columns: columns
            .iter()
            .enumerate()
            .map(|(i, c)| Column::new(c.clone(), i))
            .collect(),
        rows,
    })
}

/// Combine an existing cell with a newly joined one
///
/// Empty on either side yields the other side; equal values yield one copy;
/// anything else becomes the list of unique scalars, old values first, even
/// when only one scalar remains.
pub fn merge_concat(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Empty, _) => b.clone(),
        (_, Value::Empty) => a.clone(),
        _ if a == b => a.clone(),
        _ => Value::List(unique_scalars([a, b].into_iter())),
    }
}

fn unique_scalars<'a, I: Iterator<Item = &'a Value>>(values: I) -> Vec<Value> {
    let mut seen: HashSet<&Value> = HashSet::new();
    let mut out = Vec::new();
    for value in values.flat_map(|v| v.iter_scalars()) {
        if seen.insert(value) {
            out.push(value.clone());
        }
    }
    out
}

fn collapse(mut items: Vec<Value>) -> Value {
    match items.len() {
        0 => Value::Empty,
        1 => items.remove(0),
        _ => Value::List(items),
    }
}

fn numbers(values: &[Value]) -> Vec<f64> {
    values
        .iter()
        .filter_map(Value::as_f64)
        .filter(|n| !n.is_nan())
        .collect()
}

fn sum(values: &[Value]) -> Value {
    let numeric: Vec<&Value> = values
        .iter()
        .filter(|v| v.as_f64().is_some_and(|n| !n.is_nan()))
        .collect();
    if numeric.is_empty() {
        return Value::Empty;
    }
    if numeric.iter().all(|v| matches!(v, Value::Integer(_))) {
        let total = numeric
            .iter()
            .filter_map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })
            .sum();
        Value::Integer(total)
    } else {
        Value::Float(numeric.iter().filter_map(|v| v.as_f64()).sum())
    }
}

fn median(mut nums: Vec<f64>) -> Value {
    if nums.is_empty() {
        return Value::Empty;
    }
    nums.sort_by(|a, b| a.total_cmp(b));
    let mid = nums.len() / 2;
    if nums.len() % 2 == 0 {
        Value::Float((nums[mid - 1] + nums[mid]) / 2.0)
    } else {
        Value::Float(nums[mid])
    }
}

fn extreme(values: &[Value], better: fn(f64, f64) -> bool) -> Value {
    let mut best: Option<(&Value, f64)> = None;
    for value in values {
        if let Some(n) = value.as_f64().filter(|n| !n.is_nan()) {
            if best.map_or(true, |(_, b)| better(n, b)) {
                best = Some((value, n));
            }
        }
    }
    best.map(|(v, _)| v.clone()).unwrap_or(Value::Empty)
}

fn by_length(values: &[Value], better: fn(usize, usize) -> bool) -> Value {
    let mut best: Option<&Value> = None;
    for value in values.iter().filter(|v| !v.is_empty()) {
        if best.map_or(true, |b| better(value.len_hint(), b.len_hint())) {
            best = Some(value);
        }
    }
    best.cloned().unwrap_or(Value::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vals(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::parse(s)).collect()
    }

    #[test]
    fn test_unique_collapses() {
        assert_eq!(Aggregator::Unique.apply(&vals(&["a", "", "a"])), Value::from("a"));
        assert_eq!(
            Aggregator::Unique.apply(&vals(&["a", "b", "a"])),
            Value::from(vec!["a", "b"])
        );
        assert_eq!(Aggregator::Unique.apply(&vals(&["", ""])), Value::Empty);
    }

    #[test]
    fn test_unique_flattens_lists() {
        let values = vec![Value::from(vec!["a", "b"]), Value::from("b"), Value::from("c")];
        assert_eq!(
            Aggregator::Unique.apply(&values),
            Value::from(vec!["a", "b", "c"])
        );
    }

    #[test]
    fn test_concat_keeps_duplicates() {
        assert_eq!(
            Aggregator::Concat.apply(&vals(&["a", "a", ""])),
            Value::from(vec!["a", "a"])
        );
    }

    #[test]
    fn test_numeric_aggregators() {
        let values = vals(&["1", "4", "", "x", "2"]);
        assert_eq!(Aggregator::Sum.apply(&values), Value::Integer(7));
        assert_eq!(Aggregator::Median.apply(&values), Value::Float(2.0));
        assert_eq!(Aggregator::Min.apply(&values), Value::Integer(1));
        assert_eq!(Aggregator::Max.apply(&values), Value::Integer(4));
        assert_eq!(Aggregator::Size.apply(&values), Value::Integer(5));
        assert_eq!(Aggregator::Count.apply(&values), Value::Integer(4));
        assert_eq!(Aggregator::Mean.apply(&vals(&["1", "2"])), Value::Float(1.5));
        assert_eq!(Aggregator::Sum.apply(&vals(&["x"])), Value::Empty);
    }

    #[test]
    fn test_nan_cells_ignored() {
        let values = vec![Value::Float(f64::NAN), Value::Integer(1), Value::Integer(3)];
        assert_eq!(Aggregator::Mean.apply(&values), Value::Float(2.0));
        assert_eq!(Aggregator::Median.apply(&values), Value::Float(2.0));
        assert_eq!(Aggregator::Sum.apply(&values), Value::Integer(4));
        assert_eq!(Aggregator::Max.apply(&values), Value::Integer(3));

        let parsed = vals(&["NaN", "1", "3"]);
        assert_eq!(Aggregator::First.apply(&parsed), Value::Integer(1));
        assert_eq!(Aggregator::Count.apply(&parsed), Value::Integer(2));
        assert_eq!(Aggregator::Mean.apply(&parsed), Value::Float(2.0));
    }

    #[test]
    fn test_first_last_skip_empty() {
        let values = vals(&["", "a", "b", ""]);
        assert_eq!(Aggregator::First.apply(&values), Value::from("a"));
        assert_eq!(Aggregator::Last.apply(&values), Value::from("b"));
    }

    #[test]
    fn test_longest_shortest() {
        let values = vals(&["ACGT", "AC", "ACGTAC", "TG"]);
        assert_eq!(Aggregator::Longest.apply(&values), Value::from("ACGTAC"));
        assert_eq!(Aggregator::Shortest.apply(&values), Value::from("AC"));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("ALL".parse::<Aggregator>().unwrap(), Aggregator::Unique);
        assert_eq!("longest".parse::<Aggregator>().unwrap(), Aggregator::Longest);
        assert!("bogus".parse::<Aggregator>().is_err());
    }

    #[test]
    fn test_multi_aggregators_override() {
        let agg_for = HashMap::from([("seq".to_string(), Aggregator::Longest)]);
        let funcs = get_multi_aggregators(Aggregator::Unique, &agg_for, &["seq", "go"]);
        assert_eq!(funcs["seq"], Aggregator::Longest);
        assert_eq!(funcs["go"], Aggregator::Unique);
    }

    #[test]
    fn test_merge_concat() {
        let a = Value::from("x");
        assert_eq!(merge_concat(&Value::Empty, &a), a);
        assert_eq!(merge_concat(&a, &Value::Empty), a);
        assert_eq!(merge_concat(&a, &a), a);
        assert_eq!(
            merge_concat(&Value::from(vec!["x", "y"]), &Value::from(vec!["y", "z"])),
            Value::from(vec!["x", "y", "z"])
        );
    }

    #[test]
    fn test_merge_concat_keeps_list_type() {
        let list = Value::from(vec!["x"]);
        let scalar = Value::from("x");
        assert_eq!(merge_concat(&list, &scalar), Value::from(vec!["x"]));
        assert_eq!(merge_concat(&scalar, &list), Value::from(vec!["x"]));
    }

    #[test]
    fn test_groupby_agg() {
        let table = crate::parser::parse_csv_str(
            "gene,go,len\nTP53,GO:1,10\nBRCA1,GO:2,5\nTP53,GO:3,20\n,GO:4,1\n",
            "t.csv",
        )
        .unwrap();
        let aggs = HashMap::from([
            ("go".to_string(), Aggregator::Unique),
            ("len".to_string(), Aggregator::Max),
        ]);
        let grouped = groupby_agg(
            &table,
            &["gene".to_string()],
            &["go".to_string(), "len".to_string()],
            &aggs,
        )
        .unwrap();

        assert_eq!(grouped.index_name(), Some("gene"));
        assert_eq!(grouped.row_count(), 2);
        assert_eq!(grouped.rows[0].key, vec![Value::from("TP53")]);
        assert_eq!(grouped.rows[0].cells[0], Value::from(vec!["GO:1", "GO:3"]));
        assert_eq!(grouped.rows[0].cells[1], Value::Integer(20));
        assert_eq!(grouped.rows[1].cells[0], Value::from("GO:2"));
    }
}
