//! Reader for OpenFOAM-style ASCII field files.
//!
//! Only the `internalField` entry is read. Three layouts are understood:
//!
//! ```text
//! internalField   uniform 0.5;                  // one scalar
//! internalField   uniform (1 0 0);              // one vector
//! internalField   nonuniform List<vector>       // block list
//! 3
//! (
//! (1 0 0)
//! (0.5 0 0)
//! (0 0 0)
//! )
//! ;
//! ```
//!
//! plus the compact single-line list `nonuniform List<scalar> 3(1 2 3);`.

use std::fs;
use std::path::Path;

use crate::error::FieldError;

const INTERNAL_FIELD: &str = "internalField";

/// Parsed field values, one row per cell
#[derive(Debug, Clone, PartialEq)]
pub enum FieldArray {
    Scalar(Vec<f64>),
    /// Row-major `(n, components)` values
    Vector { components: usize, values: Vec<f64> },
}

impl FieldArray {
    /// Number of rows (cells)
    pub fn len(&self) -> usize {
        match self {
            FieldArray::Scalar(v) => v.len(),
            FieldArray::Vector { components, values } => values.len() / (*components).max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Components per row; `None` for scalars
    pub fn components(&self) -> Option<usize> {
        match self {
            FieldArray::Scalar(_) => None,
            FieldArray::Vector { components, .. } => Some(*components),
        }
    }

    /// `[n]` or `[n, components]`
    pub fn shape(&self) -> Vec<usize> {
        match self.components() {
            None => vec![self.len()],
            Some(k) => vec![self.len(), k],
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            FieldArray::Scalar(v) => v,
            FieldArray::Vector { values, .. } => values,
        }
    }

    pub fn into_values(self) -> Vec<f64> {
        match self {
            FieldArray::Scalar(v) => v,
            FieldArray::Vector { values, .. } => values,
        }
    }

    /// Repeat a single-row field `n` times; `None` unless `len() == 1`
    pub fn broadcast(&self, n: usize) -> Option<FieldArray> {
        if self.len() != 1 {
            return None;
        }
        let values = self.values().repeat(n);
        Some(match self {
            FieldArray::Scalar(_) => FieldArray::Scalar(values),
            FieldArray::Vector { components, .. } => FieldArray::Vector {
                components: *components,
                values,
            },
        })
    }
}

/// A data line that could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the file
    pub line: usize,
    pub content: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedField {
    pub values: FieldArray,
    pub skipped: Vec<SkippedLine>,
}

/// Read and parse a field file, logging each skipped line
pub fn read_field(path: &Path) -> Result<ParsedField, FieldError> {
    let text = fs::read_to_string(path).map_err(|source| FieldError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parse_field(&text)?;
    for skipped in &parsed.skipped {
        tracing::warn!(
            file = %path.display(),
            line = skipped.line,
            content = %skipped.content,
            "skipping field entry: {}",
            skipped.reason
        );
    }
    Ok(parsed)
}

/// Parse the `internalField` entry of a field file
pub fn parse_field(text: &str) -> Result<ParsedField, FieldError> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.trim_start().starts_with(INTERNAL_FIELD))
        .ok_or(FieldError::MissingInternalField)?;

    let header = entry_text(&lines[start].trim_start()[INTERNAL_FIELD.len()..]);
    let (kind, rest) = header
        .split_once(char::is_whitespace)
        .map_or((header, ""), |(k, r)| (k, r.trim()));

    if kind == "uniform" {
        return Ok(ParsedField {
            values: parse_uniform(rest)?,
            skipped: Vec::new(),
        });
    }

    // `List<type>` followed by nothing, a count, or a compact `N(...)` list
    let declared = list_shape(rest);
    let tail = rest.find('>').map_or(rest, |i| rest[i + 1..].trim());
    if let Some(open) = tail.find('(') {
        return parse_compact(tail, open, start + 1, declared);
    }

    let (count_text, data_start) = if tail.is_empty() {
        (lines.get(start + 1).map_or("", |l| l.trim()), start + 3)
    } else {
        (tail, start + 2)
    };
    let count: usize = count_text
        .parse()
        .map_err(|_| FieldError::InvalidCount(count_text.to_string()))?;

    let available = lines.len().saturating_sub(data_start);
    if available < count {
        return Err(FieldError::Truncated {
            expected: count,
            found: available,
        });
    }

    let mut rows = RowCollector::new(declared, count);
    for (offset, line) in lines[data_start..data_start + count].iter().enumerate() {
        rows.push(data_start + offset + 1, line);
    }
    Ok(rows.finish())
}

/// Entry text up to its terminating `;`, without any `//` comment
fn entry_text(line: &str) -> &str {
    let line = line.split_once("//").map_or(line, |(code, _)| code);
    line.split_once(';').map_or(line, |(entry, _)| entry).trim()
}

/// Row shape implied by a `List<type>` declaration
fn list_shape(declaration: &str) -> Option<RowShape> {
    let open = declaration.find("List<")?;
    let inner = &declaration[open + "List<".len()..];
    let close = inner.find('>')?;
    match inner[..close].trim() {
        "scalar" => Some(RowShape::Scalar),
        "vector" => Some(RowShape::Vector(3)),
        "symmTensor" => Some(RowShape::Vector(6)),
        "tensor" => Some(RowShape::Vector(9)),
        _ => None,
    }
}

/// First value after `uniform`: a number or a parenthesised tuple
fn parse_uniform(value: &str) -> Result<FieldArray, FieldError> {
    let malformed = || FieldError::MalformedUniform(value.to_string());

    if let Some(inner) = value.strip_prefix('(') {
        let (inner, _) = inner.split_once(')').ok_or_else(malformed)?;
        let values = parse_floats(inner).ok_or_else(malformed)?;
        if values.is_empty() {
            return Err(malformed());
        }
        return Ok(FieldArray::Vector {
            components: values.len(),
            values,
        });
    }
    value
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .map(|v| FieldArray::Scalar(vec![v]))
        .ok_or_else(malformed)
}

/// `N(a b c)` or `N((a b c) (d e f))` on a single line
fn parse_compact(
    tail: &str,
    open: usize,
    line: usize,
    declared: Option<RowShape>,
) -> Result<ParsedField, FieldError> {
    let count_text = tail[..open].trim();
    let count: usize = count_text
        .parse()
        .map_err(|_| FieldError::InvalidCount(count_text.to_string()))?;

    let body = &tail[open + 1..];
    let body = body.rfind(')').map_or(body, |close| &body[..close]);

    let entries: Vec<&str> = if body.contains('(') {
        body.split(')')
            .map(|s| s.trim().trim_start_matches('('))
            .filter(|s| !s.trim().is_empty())
            .collect()
    } else {
        body.split_whitespace().collect()
    };
    if entries.len() < count {
        return Err(FieldError::Truncated {
            expected: count,
            found: entries.len(),
        });
    }

    let mut rows = RowCollector::new(declared, count);
    for entry in entries.into_iter().take(count) {
        rows.push(line, entry);
    }
    Ok(rows.finish())
}

fn parse_floats(text: &str) -> Option<Vec<f64>> {
    text.split_whitespace().map(|t| t.parse().ok()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowShape {
    Scalar,
    Vector(usize),
}

/// Accumulates data rows.
///
/// Rows are kept when they match the declared list type. Without a known
/// declaration the most common row shape wins, ties going to the earliest.
struct RowCollector {
    declared: Option<RowShape>,
    rows: Vec<(usize, String, Option<(RowShape, Vec<f64>)>)>,
}

impl RowCollector {
    fn new(declared: Option<RowShape>, rows: usize) -> Self {
        Self {
            declared,
            rows: Vec::with_capacity(rows),
        }
    }

    fn push(&mut self, line: usize, raw: &str) {
        let entry = raw
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .trim();

        let parsed = if entry.contains(char::is_whitespace) {
            parse_floats(entry).map(|v| (RowShape::Vector(v.len()), v))
        } else {
            entry.parse().ok().map(|v| (RowShape::Scalar, vec![v]))
        };
        self.rows.push((line, raw.trim().to_string(), parsed));
    }

    fn majority_shape(&self) -> Option<RowShape> {
        let mut counts: Vec<(RowShape, usize)> = Vec::new();
        for (shape, _) in self.rows.iter().filter_map(|(_, _, parsed)| parsed.as_ref()) {
            match counts.iter_mut().find(|(s, _)| s == shape) {
                Some((_, n)) => *n += 1,
                None => counts.push((*shape, 1)),
            }
        }
        // max_by_key keeps the last maximum, so walk from the end
        counts
            .into_iter()
            .rev()
            .max_by_key(|(_, n)| *n)
            .map(|(shape, _)| shape)
    }

    fn finish(self) -> ParsedField {
        let shape = self.declared.or_else(|| self.majority_shape());
        let mut values = Vec::with_capacity(self.rows.len());
        let mut skipped = Vec::new();

        for (line, content, parsed) in self.rows {
            let reason = match parsed {
                None => "not a number".to_string(),
                Some((found, row)) if shape == Some(found) => {
                    values.extend(row);
                    continue;
                }
                Some((found, _)) => format!(
                    "expected {}, found {}",
                    shape.map_or_else(|| "no rows".to_string(), describe),
                    describe(found)
                ),
            };
            skipped.push(SkippedLine {
                line,
                content,
                reason,
            });
        }

        let values = match shape {
            Some(RowShape::Vector(components)) => FieldArray::Vector { components, values },
            Some(RowShape::Scalar) | None => FieldArray::Scalar(values),
        };
        ParsedField { values, skipped }
    }
}

fn describe(shape: RowShape) -> String {
    match shape {
        RowShape::Scalar => "a scalar".to_string(),
        RowShape::Vector(k) => format!("{k} components"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
FoamFile
{
    version     2.0;
    format      ascii;
    class       volScalarField;
    object      p;
}
dimensions      [0 2 -2 0 0 0 0];
";

    fn field(body: &str) -> String {
        format!("{HEADER}\n{body}\nboundaryField\n{{\n    walls {{ type zeroGradient; }}\n}}\n")
    }

    #[test]
    fn test_uniform_scalar() {
        let parsed = parse_field(&field("internalField   uniform 0;")).unwrap();
        assert_eq!(parsed.values, FieldArray::Scalar(vec![0.0]));
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_uniform_vector() {
        let parsed = parse_field(&field("internalField   uniform (1 0 -2.5);")).unwrap();
        assert_eq!(
            parsed.values,
            FieldArray::Vector {
                components: 3,
                values: vec![1.0, 0.0, -2.5]
            }
        );
        assert_eq!(parsed.values.shape(), vec![1, 3]);
    }

    #[test]
    fn test_malformed_uniform() {
        assert!(matches!(
            parse_field(&field("internalField uniform abc;")),
            Err(FieldError::MalformedUniform(v)) if v == "abc"
        ));
        assert!(matches!(
            parse_field(&field("internalField uniform (1 0 0;")),
            Err(FieldError::MalformedUniform(_))
        ));
    }

    #[test]
    fn test_nonuniform_scalar() {
        let body = "internalField   nonuniform List<scalar> \n3\n(\n0.1\n-2e-3\n7\n)\n;";
        let parsed = parse_field(&field(body)).unwrap();
        assert_eq!(parsed.values, FieldArray::Scalar(vec![0.1, -2e-3, 7.0]));
        assert_eq!(parsed.values.shape(), vec![3]);
    }

    #[test]
    fn test_nonuniform_vector() {
        let body = "internalField nonuniform List<vector>\n2\n(\n(1 2 3)\n(4 5 6)\n)\n;";
        let parsed = parse_field(&field(body)).unwrap();
        assert_eq!(parsed.values.shape(), vec![2, 3]);
        assert_eq!(parsed.values.values(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let text = "internalField nonuniform List<scalar>\n4\n(\n1\nnan-ish\n3\n(1 2)\n)\n;";
        let parsed = parse_field(text).unwrap();
        assert_eq!(parsed.values, FieldArray::Scalar(vec![1.0, 3.0]));
        assert_eq!(parsed.skipped.len(), 2);
        assert_eq!(parsed.skipped[0].line, 5);
        assert_eq!(parsed.skipped[0].content, "nan-ish");
        assert_eq!(parsed.skipped[1].line, 7);
        assert_eq!(parsed.skipped[1].reason, "expected a scalar, found 2 components");
    }

    #[test]
    fn test_uniform_with_trailing_comment() {
        let parsed = parse_field("internalField   uniform 300; // kelvin\n").unwrap();
        assert_eq!(parsed.values, FieldArray::Scalar(vec![300.0]));

        let parsed = parse_field("internalField uniform (1 0 0); // inlet\n").unwrap();
        assert_eq!(parsed.values.shape(), vec![1, 3]);

        let parsed = parse_field("internalField uniform 1e-3 extra;").unwrap();
        assert_eq!(parsed.values, FieldArray::Scalar(vec![1e-3]));
    }

    #[test]
    fn test_declared_type_survives_corrupt_first_row() {
        let body = "internalField nonuniform List<vector>\n4\n(\n(1 2)\n(1 0 0)\n(2 0 0)\n(3 0 0)\n)\n;";
        let parsed = parse_field(&field(body)).unwrap();
        assert_eq!(parsed.values.shape(), vec![3, 3]);
        assert_eq!(parsed.values.values()[..3], [1.0, 0.0, 0.0]);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].content, "(1 2)");
        assert_eq!(parsed.skipped[0].reason, "expected 3 components, found 2 components");
    }

    #[test]
    fn test_majority_shape_without_known_type() {
        let text = "internalField nonuniform List<myVector>\n4\n(\n(1 2)\n(1 0 0)\n(2 0 0)\n(3 0 0)\n)\n;";
        let parsed = parse_field(text).unwrap();
        assert_eq!(parsed.values.shape(), vec![3, 3]);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 4);
    }

    #[test]
    fn test_compact_lists() {
        let parsed = parse_field("internalField nonuniform List<scalar> 3(1 2 3);").unwrap();
        assert_eq!(parsed.values, FieldArray::Scalar(vec![1.0, 2.0, 3.0]));

        let parsed =
            parse_field("internalField nonuniform List<vector> 2((1 0 0) (0 1 0));").unwrap();
        assert_eq!(parsed.values.shape(), vec![2, 3]);
        assert_eq!(parsed.values.values(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

        let parsed = parse_field("internalField nonuniform List<scalar> 0();").unwrap();
        assert!(parsed.values.is_empty());
    }

    #[test]
    fn test_missing_internal_field() {
        assert!(matches!(
            parse_field(HEADER),
            Err(FieldError::MissingInternalField)
        ));
    }

    #[test]
    fn test_invalid_count() {
        let text = "internalField nonuniform List<scalar>\n(\n1\n)\n";
        assert!(matches!(parse_field(text), Err(FieldError::InvalidCount(c)) if c == "("));
    }

    #[test]
    fn test_truncated_block() {
        let text = "internalField nonuniform List<scalar>\n5\n(\n1\n2\n";
        assert!(matches!(
            parse_field(text),
            Err(FieldError::Truncated {
                expected: 5,
                found: 2
            })
        ));
    }

    #[test]
    fn test_broadcast() {
        let uniform = FieldArray::Vector {
            components: 2,
            values: vec![1.0, 2.0],
        };
        let wide = uniform.broadcast(3).unwrap();
        assert_eq!(wide.shape(), vec![3, 2]);
        assert_eq!(wide.values(), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        assert!(FieldArray::Scalar(vec![1.0, 2.0]).broadcast(4).is_none());
    }

    #[test]
    fn test_read_field_missing_file() {
        let err = read_field(Path::new("/nonexistent/0/p")).unwrap_err();
        assert!(matches!(err, FieldError::Io { .. }));
    }
}
