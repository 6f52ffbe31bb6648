//! Cell coordinates and the row cursor used by the layout pass

use std::fmt;

/// Convert a zero-based column index to its letter form
///
/// Examples:
/// - 0 → A
/// - 25 → Z
/// - 26 → AA
pub fn column_letter(index: u16) -> String {
    let mut result = String::new();
    let mut idx = index as usize;

    loop {
        let remainder = idx % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }

    result
}

/// Convert column letters back to a zero-based index (case-insensitive)
pub fn column_index(letters: &str) -> Option<u16> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut idx: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        idx = idx * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    // XFD is the last column Excel accepts
    if idx > 16_384 {
        return None;
    }
    u16::try_from(idx - 1).ok()
}

/// Quote a sheet name for use in a formula (`'Valuation Model'`)
pub fn quote_sheet_name(name: &str) -> String {
    let needs_quotes = !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if needs_quotes {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

/// Zero-based cell coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Relative A1 notation (`D12`)
    pub fn a1(&self) -> String {
        format!("{}{}", column_letter(self.col), self.row + 1)
    }

    /// Absolute A1 notation (`$C$3`)
    pub fn absolute(&self) -> String {
        format!("${}${}", column_letter(self.col), self.row + 1)
    }

    /// Sheet-qualified reference (`'Valuation Model'!D12`)
    pub fn qualified(&self, sheet: &str) -> String {
        format!("{}!{}", quote_sheet_name(sheet), self.a1())
    }

    /// Parse `D12`, `$C$3` or `ab7`. Returns None for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('$').unwrap_or(text);
        let split = rest.find(|c: char| !c.is_ascii_alphabetic())?;
        let (letters, digits) = rest.split_at(split);
        let digits = digits.strip_prefix('$').unwrap_or(digits);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let col = column_index(letters)?;
        let row: u32 = digits.parse().ok()?;
        if row == 0 || row > 1_048_576 {
            return None;
        }
        Some(Self::new(row - 1, col))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.a1())
    }
}

/// Tracks the next free row while sections and items are emitted
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCursor {
    row: u32,
}

impl RowCursor {
    pub fn starting_at(row: u32) -> Self {
        Self { row }
    }

    pub fn current(&self) -> u32 {
        self.row
    }

    /// Return the current row and move to the next one
    pub fn take(&mut self) -> u32 {
        let row = self.row;
        self.row += 1;
        row
    }

    pub fn skip(&mut self, rows: u32) {
        self.row += rows;
    }
}

/// Column arrangement of the calculation sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearColumns {
    /// Column of year 1 (the base column)
    pub first: u16,
    pub years: u16,
}

impl YearColumns {
    pub fn new(first: u16, years: u16) -> Self {
        Self { first, years }
    }

    /// Column of a 1-based projection year
    pub fn column(&self, year: u16) -> Option<u16> {
        if year == 0 || year > self.years {
            None
        } else {
            self.first.checked_add(year - 1)
        }
    }

    pub fn last(&self) -> u16 {
        self.first + self.years - 1
    }

    /// 1-based year shown in a column
    pub fn year_of(&self, col: u16) -> Option<u16> {
        if col < self.first || col > self.last() {
            None
        } else {
            Some(col - self.first + 1)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> {
        let first = self.first;
        (1..=self.years).map(move |year| (year, first + year - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(3), "D");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
    }

    #[test]
    fn test_column_index_inverse() {
        for idx in [0u16, 3, 25, 26, 27, 701, 702] {
            assert_eq!(column_index(&column_letter(idx)), Some(idx));
        }
        assert_eq!(column_index("d"), Some(3));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("ABCD"), None);
    }

    #[test]
    fn test_cell_ref_notation() {
        let cell = CellRef::new(2, 2);
        assert_eq!(cell.a1(), "C3");
        assert_eq!(cell.absolute(), "$C$3");
        assert_eq!(cell.qualified("Valuation Model"), "'Valuation Model'!C3");
        assert_eq!(cell.qualified("Assumptions"), "Assumptions!C3");
    }

    #[test]
    fn test_cell_ref_parse() {
        assert_eq!(CellRef::parse("D12"), Some(CellRef::new(11, 3)));
        assert_eq!(CellRef::parse("$C$3"), Some(CellRef::new(2, 2)));
        assert_eq!(CellRef::parse("ab7"), Some(CellRef::new(6, 27)));
        assert_eq!(CellRef::parse("tax_rate"), None);
        assert_eq!(CellRef::parse("D0"), None);
        assert_eq!(CellRef::parse("12"), None);
    }

    #[test]
    fn test_row_cursor() {
        let mut cursor = RowCursor::starting_at(1);
        assert_eq!(cursor.take(), 1);
        assert_eq!(cursor.take(), 2);
        cursor.skip(1);
        assert_eq!(cursor.current(), 4);
    }

    #[test]
    fn test_year_columns() {
        let years = YearColumns::new(3, 5);
        assert_eq!(years.column(1), Some(3));
        assert_eq!(years.column(5), Some(7));
        assert_eq!(years.column(6), None);
        assert_eq!(years.column(0), None);
        assert_eq!(YearColumns::new(u16::MAX, 5).column(2), None);
        assert_eq!(years.last(), 7);
        assert_eq!(years.year_of(4), Some(2));
        assert_eq!(years.year_of(2), None);
        assert_eq!(years.iter().count(), 5);
    }
}
