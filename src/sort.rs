//! Ordering options and fallible sorting helpers.

use std::cmp::Ordering;
use std::convert::Infallible;

use crate::error::{Result, StreamError};
use crate::value::{Value, compare};

/// How `sort_asc` / `sort_desc` compare elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortFlag {
    /// Natural ordering, see [`compare`].
    #[default]
    Regular,
    /// Compare as floating point numbers; non-numeric values count as 0.
    Numeric,
    /// Compare string forms bytewise.
    String,
}

impl SortFlag {
    pub fn compare(self, a: &Value, b: &Value) -> Ordering {
        match self {
            SortFlag::Regular => compare(a, b),
            SortFlag::Numeric => {
                let x = a.number().map_or(0.0, |n| n.as_f64());
                let y = b.number().map_or(0.0, |n| n.as_f64());
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            SortFlag::String => a
                .scalar_string()
                .unwrap_or_default()
                .cmp(&b.scalar_string().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl TryFrom<&str> for Direction {
    type Error = StreamError;

    fn try_from(text: &str) -> Result<Self> {
        match text.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(StreamError::InvalidArgument(format!(
                "unknown sort direction \"{text}\""
            ))),
        }
    }
}

/// Stable merge sort with a fallible comparator. The first comparator error
/// aborts ordering and is returned.
///
/// Loose value ordering is not transitive across kinds (`true` equals both
/// `"a"` and `"b"`), and user comparators may be inconsistent too. A merge
/// sort only ever asks "is the right element strictly smaller", so it
/// terminates with some permutation whatever the comparator answers.
pub(crate) fn try_sort_by<T, F>(items: Vec<T>, mut cmp: F) -> Result<Vec<T>>
where
    F: FnMut(&T, &T) -> Result<Ordering>,
{
    merge_sort(items, &mut cmp)
}

/// Infallible counterpart of [`try_sort_by`].
pub(crate) fn stable_sort_by<T, F>(items: Vec<T>, mut cmp: F) -> Vec<T>
where
    F: FnMut(&T, &T) -> Ordering,
{
    match merge_sort(items, &mut |a: &T, b: &T| Ok::<_, Infallible>(cmp(a, b))) {
        Ok(sorted) => sorted,
        Err(never) => match never {},
    }
}

fn merge_sort<T, E, F>(mut items: Vec<T>, cmp: &mut F) -> std::result::Result<Vec<T>, E>
where
    F: FnMut(&T, &T) -> std::result::Result<Ordering, E>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, cmp)?;
    let right = merge_sort(right, cmp)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter();
    let mut right = right.into_iter();
    let mut next_left = left.next();
    let mut next_right = right.next();
    loop {
        match (next_left.take(), next_right.take()) {
            (Some(a), Some(b)) => {
                // Ties keep the left element first.
                if cmp(&b, &a)? == Ordering::Less {
                    merged.push(b);
                    next_left = Some(a);
                    next_right = right.next();
                } else {
                    merged.push(a);
                    next_left = left.next();
                    next_right = Some(b);
                }
            }
            (Some(a), None) => {
                merged.push(a);
                merged.extend(left);
                break;
            }
            (None, Some(b)) => {
                merged.push(b);
                merged.extend(right);
                break;
            }
            (None, None) => break,
        }
    }
    Ok(merged)
}

/// Comparator ordering elements by the value `f` extracts from them.
pub(crate) fn by_value<F>(f: F, direction: Direction) -> impl Fn(&Value, &Value) -> Result<Ordering>
where
    F: Fn(&Value) -> Result<Value>,
{
    move |a, b| Ok(direction.apply(compare(&f(a)?, &f(b)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_flag_ignores_text() {
        let ord = SortFlag::Numeric.compare(&Value::from("10"), &Value::from("9"));
        assert_eq!(ord, Ordering::Greater);
        let ord = SortFlag::String.compare(&Value::from("10"), &Value::from("9"));
        assert_eq!(ord, Ordering::Less);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::try_from("desc").unwrap(), Direction::Desc);
        assert!(Direction::try_from("sideways").is_err());
    }

    #[test]
    fn test_try_sort_by_reports_first_error() {
        let result = try_sort_by(vec![3, 1, 2], |_, _| Err(StreamError::callback("boom")));
        assert!(matches!(result, Err(StreamError::Callback(msg)) if msg == "boom"));
    }

    #[test]
    fn test_try_sort_by_is_stable() {
        let items = vec![(1, 'a'), (0, 'b'), (1, 'c')];
        let sorted = try_sort_by(items, |x, y| Ok(x.0.cmp(&y.0))).unwrap();
        assert_eq!(sorted, vec![(0, 'b'), (1, 'a'), (1, 'c')]);
    }

    #[test]
    fn test_stable_sort_by_orders_integers() {
        let items: Vec<i64> = (0..257).map(|i| (i * 7919) % 257).collect();
        let sorted = stable_sort_by(items, |a, b| a.cmp(b));
        assert_eq!(sorted, (0..257).collect::<Vec<i64>>());
    }

    #[test]
    fn test_inconsistent_comparator_still_returns_permutation() {
        // Answers depend on the pair sum, not on any consistent order.
        let items: Vec<u32> = (0..300).collect();
        let sorted = stable_sort_by(items, |a, b| {
            if (a + b) % 3 == 0 {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        });
        let mut check = sorted.clone();
        check.sort_unstable();
        assert_eq!(check, (0..300).collect::<Vec<u32>>());
    }

    #[test]
    fn test_regular_flag_on_mixed_scalars_does_not_panic() {
        let items: Vec<Value> = (0..150)
            .map(|i| match i % 5 {
                0 => Value::Null,
                1 => Value::Bool(i % 2 == 0),
                2 => Value::from(format!("s{i}")),
                3 => Value::Int(75 - i),
                _ => Value::from(format!("{i}a")),
            })
            .collect();
        let sorted = stable_sort_by(items, |a, b| SortFlag::Regular.compare(a, b));
        assert_eq!(sorted.len(), 150);
    }
}
