//! Table helpers used when aligning keys of two tables

use crate::table::Table;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Similarity cutoff used for fuzzy key matching
pub const DEFAULT_FUZZY_CUTOFF: f64 = 0.6;

/// True if any of the first `limit` non-empty values is a list
pub fn has_iterables<'a, I>(values: I, limit: usize) -> bool
where
    I: IntoIterator<Item = &'a Value>,
{
    values
        .into_iter()
        .filter(|v| !v.is_empty())
        .take(limit)
        .any(Value::is_list)
}

/// Keep only the first column for every repeated column name
pub fn drop_duplicate_columns(table: &mut Table) {
    let mut seen: HashSet<String> = HashSet::new();
    let keep: Vec<usize> = table
        .columns
        .iter()
        .filter(|c| seen.insert(c.name.clone()))
        .map(|c| c.index)
        .collect();

    if keep.len() < table.columns.len() {
        debug!(
            table = %table.name,
            dropped = table.columns.len() - keep.len(),
            "dropping duplicate columns"
        );
        table.retain_positions(&keep);
    }
}

/// Align list-or-scalar left keys with list-or-scalar right keys
///
/// Returns, for every left key, the position of the first right key sharing
/// an element with it. Left elements are tried in order.
pub fn match_iterable_keys(left: &[Value], right: &[Value]) -> Vec<Option<usize>> {
    let mut lookup: HashMap<&Value, usize> = HashMap::new();
    for (pos, key) in right.iter().enumerate() {
        for element in key.iter_scalars() {
            lookup.entry(element).or_insert(pos);
        }
    }

    left.iter()
        .map(|key| key.iter_scalars().find_map(|e| lookup.get(e).copied()))
        .collect()
}

/// Rekey right rows onto the closest left key
///
/// Returns, for every right key, the position of the left key it lands on. A
/// right key equal to some left key always lands there; otherwise string keys
/// land on the left key with the best normalized Levenshtein score at or
/// above `cutoff`. Ties go to the first left key.
pub fn fuzzy_key_map(left: &[Value], right: &[Value], cutoff: f64) -> Vec<Option<usize>> {
    let mut first_left: HashMap<&Value, usize> = HashMap::new();
    for (pos, key) in left.iter().enumerate() {
        first_left.entry(key).or_insert(pos);
    }

    right
        .iter()
        .map(|key| {
            if let Some(&left_pos) = first_left.get(key) {
                return Some(left_pos);
            }
            let needle = key.as_str()?;

            let mut best: Option<(usize, f64)> = None;
            for (left_pos, candidate) in left.iter().enumerate() {
                let Some(candidate) = candidate.as_str() else {
                    continue;
                };
                let score = strsim::normalized_levenshtein(needle, candidate);
                if score >= cutoff && best.map_or(true, |(_, s)| score > s) {
                    best = Some((left_pos, score));
                }
            }
            if let Some((left_pos, score)) = best {
                debug!(key = needle, matched = %left[left_pos], score, "fuzzy key match");
            }
            best.map(|(left_pos, _)| left_pos)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv_str;

    #[test]
    fn test_has_iterables() {
        let values = vec![Value::Empty, Value::from("a"), Value::from(vec!["b", "c"])];
        assert!(has_iterables(&values, 5));
        assert!(!has_iterables(&values, 1));
        assert!(!has_iterables(&[Value::from("a")], 5));
    }

    #[test]
    fn test_drop_duplicate_columns() {
        let mut table = parse_csv_str("a,b,a\n1,2,3\n", "t.csv").unwrap();
        drop_duplicate_columns(&mut table);
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.rows[0].cells, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_match_iterable_keys() {
        let left = vec![
            Value::from(vec!["P53", "TP53"]),
            Value::from("BRCA1"),
            Value::from("EGFR"),
            Value::Empty,
        ];
        let right = vec![Value::from("TP53"), Value::from(vec!["BRCA1", "RNF53"])];
        assert_eq!(
            match_iterable_keys(&left, &right),
            vec![Some(0), Some(1), None, None]
        );
    }

    #[test]
    fn test_fuzzy_key_map() {
        let left = vec![Value::from("TP53"), Value::from("BRCA1"), Value::from("MYC")];
        let right = vec![
            Value::from("BRCA1"),
            Value::from("TP53A"),
            Value::from("ZZZZZZZZ"),
            Value::Integer(3),
        ];
        assert_eq!(
            fuzzy_key_map(&left, &right, DEFAULT_FUZZY_CUTOFF),
            vec![Some(1), Some(0), None, None]
        );
    }
}
