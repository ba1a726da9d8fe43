//! Conversion of spreadsheet value grids into records, plus A1 range parsing.

use serde_json::{Map, Value};

use crate::cache::{Record, Table};

/// A parsed `Sheet!A1:D10` style range. Cell bounds are zero-based and
/// inclusive; `None` means unbounded in that direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
  pub sheet: String,
  pub first_row: Option<usize>,
  pub last_row: Option<usize>,
  pub first_col: Option<usize>,
  pub last_col: Option<usize>,
}

impl A1Range {
  /// Parse `Sheet1`, `Sheet1!A1:D10`, `Sheet1!A:C`, `Sheet1!2:5`, `'My Sheet'!B2`.
  pub fn parse(spec: &str) -> Option<Self> {
    let (sheet, cells) = split_sheet(spec.trim())?;
    if sheet.is_empty() {
      return None;
    }

    let mut range = Self {
      sheet,
      first_row: None,
      last_row: None,
      first_col: None,
      last_col: None,
    };

    let Some(cells) = cells else {
      return Some(range);
    };

    let (start, end) = match cells.split_once(':') {
      Some((a, b)) => (parse_cell(a)?, parse_cell(b)?),
      None => {
        let cell = parse_cell(cells)?;
        (cell, cell)
      }
    };

    range.first_col = start.0;
    range.first_row = start.1;
    range.last_col = end.0;
    range.last_row = end.1;

    if let (Some(a), Some(b)) = (range.first_col, range.last_col) {
      if a > b {
        return None;
      }
    }
    if let (Some(a), Some(b)) = (range.first_row, range.last_row) {
      if a > b {
        return None;
      }
    }

    Some(range)
  }

  /// Cut this range out of a full sheet grid.
  pub fn select(&self, grid: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let first_row = self.first_row.unwrap_or(0);
    let last_row = self.last_row.unwrap_or(usize::MAX);
    let first_col = self.first_col.unwrap_or(0);
    let last_col = self.last_col.unwrap_or(usize::MAX);

    grid
      .iter()
      .enumerate()
      .filter(|(i, _)| *i >= first_row && *i <= last_row)
      .map(|(_, row)| {
        row
          .iter()
          .enumerate()
          .filter(|(j, _)| *j >= first_col && *j <= last_col)
          .map(|(_, v)| v.clone())
          .collect()
      })
      .collect()
  }
}

/// Split off the sheet name, honouring quoted names with `''` escapes.
fn split_sheet(spec: &str) -> Option<(String, Option<&str>)> {
  if let Some(rest) = spec.strip_prefix('\'') {
    let mut name = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
      if c != '\'' {
        name.push(c);
        continue;
      }
      if let Some((_, '\'')) = chars.peek() {
        name.push('\'');
        chars.next();
        continue;
      }
      let after = &rest[i + 1..];
      return match after.strip_prefix('!') {
        Some(cells) => Some((name, Some(cells))),
        None if after.is_empty() => Some((name, None)),
        None => None,
      };
    }
    // Unterminated quote
    return None;
  }

  match spec.rsplit_once('!') {
    Some((sheet, cells)) => Some((sheet.to_string(), Some(cells))),
    None => Some((spec.to_string(), None)),
  }
}

/// Parse `B3`, `B` or `3` into zero-based (column, row).
fn parse_cell(cell: &str) -> Option<(Option<usize>, Option<usize>)> {
  let cell = cell.trim();
  let split = cell
    .find(|c: char| !c.is_ascii_alphabetic())
    .unwrap_or(cell.len());
  let (letters, digits) = cell.split_at(split);

  if letters.is_empty() && digits.is_empty() {
    return None;
  }

  let col = if letters.is_empty() {
    None
  } else {
    let mut n: usize = 0;
    for c in letters.chars() {
      let v = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
      n = n.checked_mul(26)?.checked_add(v)?;
    }
    Some(n - 1)
  };

  let row = if digits.is_empty() {
    None
  } else {
    let n: usize = digits.parse().ok()?;
    if n == 0 {
      return None;
    }
    Some(n - 1)
  };

  Some((col, row))
}

/// Turn a row-major grid into records.
///
/// The first row holds the column names and shorter rows are padded with
/// empty strings. A single row has no header and is keyed by column index.
pub fn values_to_records(values: Vec<Vec<Value>>) -> Table {
  let mut rows = values.into_iter();

  let Some(first) = rows.next() else {
    return Vec::new();
  };

  let data: Vec<Vec<Value>> = rows.collect();
  if data.is_empty() {
    let record: Record = first
      .into_iter()
      .enumerate()
      .map(|(i, v)| (i.to_string(), v))
      .collect();
    return vec![record];
  }

  let headers: Vec<String> = first.iter().map(header_name).collect();

  data
    .into_iter()
    .map(|row| {
      let mut record = Map::with_capacity(headers.len());
      let mut cells = row.into_iter();
      for header in &headers {
        let value = cells.next().unwrap_or_else(|| Value::String(String::new()));
        record.insert(header.clone(), value);
      }
      record
    })
    .collect()
}

fn header_name(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn grid(v: Value) -> Vec<Vec<Value>> {
    serde_json::from_value(v).unwrap()
  }

  #[test]
  fn test_parse_bare_sheet() {
    let r = A1Range::parse("Timesheet").unwrap();
    assert_eq!(r.sheet, "Timesheet");
    assert_eq!((r.first_row, r.last_row, r.first_col, r.last_col), (None, None, None, None));
  }

  #[test]
  fn test_parse_cell_range() {
    let r = A1Range::parse("Sheet1!A1:D10").unwrap();
    assert_eq!(r.sheet, "Sheet1");
    assert_eq!(r.first_col, Some(0));
    assert_eq!(r.last_col, Some(3));
    assert_eq!(r.first_row, Some(0));
    assert_eq!(r.last_row, Some(9));
  }

  #[test]
  fn test_parse_column_and_row_ranges() {
    let cols = A1Range::parse("Rates!B:AA").unwrap();
    assert_eq!((cols.first_col, cols.last_col), (Some(1), Some(26)));
    assert_eq!((cols.first_row, cols.last_row), (None, None));

    let rows = A1Range::parse("Rates!2:5").unwrap();
    assert_eq!((rows.first_row, rows.last_row), (Some(1), Some(4)));
    assert_eq!((rows.first_col, rows.last_col), (None, None));
  }

  #[test]
  fn test_parse_quoted_sheet() {
    let r = A1Range::parse("'Bob''s Hours'!A1:B2").unwrap();
    assert_eq!(r.sheet, "Bob's Hours");
    assert_eq!(r.last_row, Some(1));

    assert_eq!(A1Range::parse("'Plain'").unwrap().sheet, "Plain");
  }

  #[test]
  fn test_parse_rejects_garbage() {
    assert!(A1Range::parse("").is_none());
    assert!(A1Range::parse("Sheet1!").is_none());
    assert!(A1Range::parse("Sheet1!D1:A1").is_none());
    assert!(A1Range::parse("Sheet1!A0").is_none());
    assert!(A1Range::parse("'Open!A1").is_none());
  }

  #[test]
  fn test_select_sub_grid() {
    let g = grid(json!([["a", "b", "c"], [1, 2, 3], [4, 5, 6]]));
    let r = A1Range::parse("S!B1:C2").unwrap();
    assert_eq!(r.select(&g), grid(json!([["b", "c"], [2, 3]])));
  }

  #[test]
  fn test_records_use_header_row_and_pad() {
    let g = grid(json!([
      ["Date", "Project", "Hours"],
      ["2025-01-01", "PROJ-001", 8.0],
      ["2025-01-02"]
    ]));
    let table = values_to_records(g);

    assert_eq!(table.len(), 2);
    assert_eq!(table[0]["Hours"], 8.0);
    assert_eq!(table[1]["Project"], "");
    let columns: Vec<&String> = table[0].keys().collect();
    assert_eq!(columns, vec!["Date", "Project", "Hours"]);
  }

  #[test]
  fn test_single_row_keyed_by_index() {
    let table = values_to_records(grid(json!([["x", 2]])));
    assert_eq!(table.len(), 1);
    assert_eq!(table[0]["0"], "x");
    assert_eq!(table[0]["1"], 2);
  }

  #[test]
  fn test_empty_grid_is_empty_table() {
    assert!(values_to_records(Vec::new()).is_empty());
  }
}
