// src/layout.rs
//! Pixel layout: the coordinate table and its bounding box.
//!
//! Layout files hold one bracketed `[x, y, z]` triple per line. The OPC
//! layout format wraps each triple as `{"point": [x, y, z]},` inside a JSON
//! array; the array brackets sit on their own lines and are skipped, so
//! those files parse line by line without a JSON parser.

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::path::Path;

/// Position of one pixel in layout space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Immutable, ordered list of pixel positions. Index `i` is pixel `i`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinateTable {
    points: Vec<Point>,
}

impl CoordinateTable {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Reads and parses a layout file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not open layout file {}", path.display()))?;
        let table = Self::parse(&text)
            .with_context(|| format!("Could not parse layout file {}", path.display()))?;
        info!(
            "Read {} pixel locations from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses layout text. Blank lines, lines made only of array brackets and
    /// `#` or `//` comments are skipped; every other line must hold a triple.
    pub fn parse(text: &str) -> Result<Self> {
        let mut points = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if is_structural(line) || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            let point =
                parse_triple(line).with_context(|| format!("line {}: {:?}", index + 1, line))?;
            points.push(point);
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    /// Size in bytes of one RGB frame for this layout.
    pub fn frame_len(&self) -> usize {
        self.points.len() * 3
    }

    /// Axis-aligned bounding box, or `None` for an empty table.
    pub fn bounds(&self) -> Option<Bounds> {
        let first = *self.points.first()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in &self.points[1..] {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.min.z = bounds.min.z.min(p.z);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
            bounds.max.z = bounds.max.z.max(p.z);
        }
        Some(bounds)
    }
}

/// Blank, or nothing but array brackets and commas.
fn is_structural(line: &str) -> bool {
    line.chars()
        .all(|c| matches!(c, '[' | ']' | ',') || c.is_whitespace())
}

fn parse_triple(line: &str) -> Result<Point> {
    let open = line
        .find('[')
        .ok_or_else(|| anyhow!("expected a bracketed [x, y, z] triple"))?;
    let close = line[open..]
        .find(']')
        .map(|offset| open + offset)
        .ok_or_else(|| anyhow!("unterminated coordinate triple"))?;

    let mut values = [0.0f64; 3];
    let mut count = 0;
    for token in line[open + 1..close].split(',') {
        if count == 3 {
            bail!("more than three coordinates");
        }
        let token = token.trim();
        values[count] = token
            .parse::<f64>()
            .with_context(|| format!("malformed coordinate {:?}", token))?;
        count += 1;
    }
    if count != 3 {
        bail!("expected three coordinates, found {}", count);
    }
    Ok(Point::new(values[0], values[1], values[2]))
}

/// Axis-aligned bounding box of a coordinate table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn size(&self) -> Point {
        Point::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }

    /// Maps `p` into the unit cube spanned by the box. A flat axis maps to 0.5.
    pub fn normalize(&self, p: Point) -> Point {
        fn axis(v: f64, lo: f64, hi: f64) -> f64 {
            if hi > lo {
                (v - lo) / (hi - lo)
            } else {
                0.5
            }
        }
        Point::new(
            axis(p.x, self.min.x, self.max.x),
            axis(p.y, self.min.y, self.max.y),
            axis(p.z, self.min.z, self.max.z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPC_LAYOUT: &str = r#"[
  {"point": [0.00, -1.50, 2.25]},
  {"point": [1.0, 0.5, -2.0]},

  {"point": [-3, 4e0, 0]}
]
"#;

    #[test]
    fn it_should_parse_an_opc_layout_file() {
        let table = CoordinateTable::parse(OPC_LAYOUT).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.frame_len(), 9);
        assert_eq!(table.points()[0], Point::new(0.0, -1.5, 2.25));
        assert_eq!(table.points()[2], Point::new(-3.0, 4.0, 0.0));
    }

    #[test]
    fn it_should_skip_comments_and_structural_lines() {
        let text = "# hand written\n[\n// strand one\n[1, 2, 3]\n]\n";
        let table = CoordinateTable::parse(text).unwrap();
        assert_eq!(table.points(), &[Point::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn it_should_reject_malformed_numbers_with_the_line_number() {
        let text = "[\n  {\"point\": [1, 2, 3]},\n  {\"point\": [1, two, 3]},\n]";
        let err = CoordinateTable::parse(text).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("line 3"), "{}", message);
        assert!(message.contains("malformed coordinate"), "{}", message);
    }

    #[test]
    fn it_should_reject_short_and_unbracketed_lines() {
        assert!(CoordinateTable::parse("{\"point\": [1, 2]}").is_err());
        assert!(CoordinateTable::parse("{\"point\": [1, 2, 3, 4]}").is_err());
        assert!(CoordinateTable::parse("1, 2, 3").is_err());
        assert!(CoordinateTable::parse("{\"point\": [1, 2, 3").is_err());
    }

    #[test]
    fn it_should_compute_the_bounding_box() {
        let table = CoordinateTable::parse(OPC_LAYOUT).unwrap();
        let bounds = table.bounds().unwrap();
        assert_eq!(bounds.min, Point::new(-3.0, -1.5, -2.0));
        assert_eq!(bounds.max, Point::new(1.0, 4.0, 2.25));
        assert_eq!(bounds.size(), Point::new(4.0, 5.5, 4.25));
    }

    #[test]
    fn it_should_have_no_bounds_when_empty() {
        assert!(CoordinateTable::parse("[\n]\n").unwrap().bounds().is_none());
    }

    #[test]
    fn it_should_normalize_into_the_unit_cube() {
        let bounds = Bounds {
            min: Point::new(0.0, -2.0, 1.0),
            max: Point::new(10.0, 2.0, 1.0),
        };
        let n = bounds.normalize(Point::new(5.0, 2.0, 1.0));
        assert_eq!(n, Point::new(0.5, 1.0, 0.5));
    }
}
