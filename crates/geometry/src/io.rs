//! Reading and writing ASCII point-cloud formats.
//!
//! Supported: PLY (ASCII), XYZ, XYZN, XYZRGB and PTS. Colours are held in
//! `[0, 1]` in memory; PLY and PTS store them as 8-bit channels, XYZRGB as
//! floats.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use pointcloud::{PointCloud, PointCloudError, PointCloudResult, PointFormat};

pub(crate) const SUPPORTED_FORMATS: [PointFormat; 5] = [
    PointFormat::Ply,
    PointFormat::Xyz,
    PointFormat::Xyzn,
    PointFormat::Xyzrgb,
    PointFormat::Pts,
];

pub(crate) fn read(path: &Path, format: PointFormat) -> PointCloudResult<PointCloud> {
    let file = File::open(path).map_err(|e| io_error("open", path, e))?;
    let mut lines = BufReader::new(file).lines();
    match format {
        PointFormat::Ply => read_ply(&mut lines, path),
        PointFormat::Xyz => read_columns(&mut lines, path, Columns::Xyz),
        PointFormat::Xyzn => read_columns(&mut lines, path, Columns::Xyzn),
        PointFormat::Xyzrgb => read_columns(&mut lines, path, Columns::Xyzrgb),
        PointFormat::Pts => read_pts(&mut lines, path),
        other => Err(unsupported(other)),
    }
}

pub(crate) fn write(cloud: &PointCloud, path: &Path, format: PointFormat) -> PointCloudResult<()> {
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(unsupported(format));
    }
    let file = File::create(path).map_err(|e| create_error(path, e))?;
    let mut out = BufWriter::new(file);
    let result = match format {
        PointFormat::Ply => write_ply(cloud, &mut out),
        PointFormat::Xyz => write_rows(cloud, &mut out, |_, _| Vec::new()),
        PointFormat::Xyzn => write_rows(cloud, &mut out, |c, i| {
            c.normals().map_or(vec![0.0; 3], |n| n[i].to_vec())
        }),
        PointFormat::Xyzrgb => write_rows(cloud, &mut out, |c, i| {
            c.colors().map_or(vec![0.0; 3], |col| col[i].to_vec())
        }),
        PointFormat::Pts => write_pts(cloud, &mut out),
        other => return Err(unsupported(other)),
    };
    result
        .and_then(|()| out.flush())
        .map_err(|e| io_error("write", path, e))
}

fn unsupported(format: PointFormat) -> PointCloudError {
    PointCloudError::UnsupportedFormat {
        format: format.to_string(),
        suggestions: vec![format!(
            "Convert the file to one of: {}",
            SUPPORTED_FORMATS.map(PointFormat::as_str).join(", ")
        )],
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> PointCloudError {
    PointCloudError::backend(format!("failed to {action} {}: {e}", path.display()))
}

/// Failures the caller can fix by choosing another output path are domain
/// errors; anything else is a backend failure.
fn create_error(path: &Path, e: std::io::Error) -> PointCloudError {
    match e.kind() {
        ErrorKind::NotFound => PointCloudError::NotFound {
            path: path
                .parent()
                .map_or_else(|| path.display().to_string(), |p| p.display().to_string()),
        },
        ErrorKind::PermissionDenied => PointCloudError::validation_with(
            format!("Cannot write {}: permission denied", path.display()),
            vec!["Choose an output_path in a writable directory".to_string()],
        ),
        _ => io_error("create", path, e),
    }
}

fn malformed(path: &Path, line: usize, detail: impl std::fmt::Display) -> PointCloudError {
    PointCloudError::validation(format!(
        "malformed point cloud file {} at line {line}: {detail}",
        path.display()
    ))
}

type Lines = std::io::Lines<BufReader<File>>;

/// Parses a whitespace-separated row. Non-finite values are rejected.
fn parse_floats(text: &str) -> Result<Vec<f64>, String> {
    text.split_whitespace()
        .map(|token| match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(_) => Err(format!("non-finite value '{token}'")),
            Err(e) => Err(format!("'{token}': {e}")),
        })
        .collect()
}

fn triple(values: &[f64], start: usize) -> [f64; 3] {
    [values[start], values[start + 1], values[start + 2]]
}

fn channel_to_unit(values: [f64; 3]) -> [f64; 3] {
    values.map(|c| c / 255.0)
}

fn unit_to_channel(c: f64) -> u8 {
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

// ---------------------------------------------------------------------------
// Column formats
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Columns {
    Xyz,
    Xyzn,
    Xyzrgb,
}

impl Columns {
    fn width(self) -> usize {
        match self {
            Self::Xyz => 3,
            Self::Xyzn | Self::Xyzrgb => 6,
        }
    }
}

fn read_columns(lines: &mut Lines, path: &Path, columns: Columns) -> PointCloudResult<PointCloud> {
    let mut points = Vec::new();
    let mut extra = Vec::new();
    for (number, line) in lines.enumerate() {
        let line = line.map_err(|e| io_error("read", path, e))?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let values = parse_floats(text).map_err(|e| malformed(path, number + 1, e))?;
        if values.len() < columns.width() {
            return Err(malformed(
                path,
                number + 1,
                format!("expected {} values, found {}", columns.width(), values.len()),
            ));
        }
        points.push(triple(&values, 0));
        if columns.width() == 6 {
            extra.push(triple(&values, 3));
        }
    }
    match columns {
        Columns::Xyz => Ok(PointCloud::from_points(points)),
        Columns::Xyzn => PointCloud::new(points, None, Some(extra)),
        Columns::Xyzrgb => PointCloud::new(points, Some(extra), None),
    }
}

fn write_rows<W, F>(cloud: &PointCloud, out: &mut W, extra: F) -> std::io::Result<()>
where
    W: Write,
    F: Fn(&PointCloud, usize) -> Vec<f64>,
{
    for (i, p) in cloud.points().iter().enumerate() {
        write!(out, "{} {} {}", p[0], p[1], p[2])?;
        for v in extra(cloud, i) {
            write!(out, " {v}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PTS
// ---------------------------------------------------------------------------

/// PTS rows are `x y z`, `x y z intensity`, `x y z r g b` or
/// `x y z intensity r g b`, optionally preceded by a point-count line.
fn read_pts(lines: &mut Lines, path: &Path) -> PointCloudResult<PointCloud> {
    let mut points = Vec::new();
    let mut colors = Vec::new();
    for (number, line) in lines.enumerate() {
        let line = line.map_err(|e| io_error("read", path, e))?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if number == 0 && text.split_whitespace().count() == 1 {
            continue;
        }
        let values = parse_floats(text).map_err(|e| malformed(path, number + 1, e))?;
        let color = match values.len() {
            3 | 4 => None,
            6 => Some(channel_to_unit(triple(&values, 3))),
            7 => Some(channel_to_unit(triple(&values, 4))),
            n => return Err(malformed(path, number + 1, format!("unexpected {n} columns"))),
        };
        points.push(triple(&values, 0));
        if let Some(c) = color {
            colors.push(c);
        }
    }
    let colors = (!colors.is_empty()).then_some(colors);
    PointCloud::new(points, colors, None)
}

fn write_pts<W: Write>(cloud: &PointCloud, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "{}", cloud.len())?;
    for (i, p) in cloud.points().iter().enumerate() {
        write!(out, "{} {} {}", p[0], p[1], p[2])?;
        if let Some(colors) = cloud.colors() {
            let [r, g, b] = colors[i].map(unit_to_channel);
            write!(out, " 0 {r} {g} {b}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PLY
// ---------------------------------------------------------------------------

struct PlyLayout {
    vertex_count: usize,
    properties: Vec<String>,
}

impl PlyLayout {
    fn column(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p == name)
    }

    fn columns(&self, names: [&str; 3]) -> Option<[usize; 3]> {
        Some([
            self.column(names[0])?,
            self.column(names[1])?,
            self.column(names[2])?,
        ])
    }
}

fn read_ply_header(lines: &mut Lines, path: &Path) -> PointCloudResult<PlyLayout> {
    let mut layout = PlyLayout {
        vertex_count: 0,
        properties: Vec::new(),
    };
    let mut in_vertex = false;
    for (number, line) in lines.enumerate() {
        let line = line.map_err(|e| io_error("read", path, e))?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["ply"] | ["comment", ..] | ["obj_info", ..] => {}
            ["format", "ascii", ..] => {}
            ["format", encoding, ..] => {
                return Err(PointCloudError::UnsupportedFormat {
                    format: format!("ply ({encoding})"),
                    suggestions: vec!["Re-export the file as ASCII PLY".to_string()],
                });
            }
            ["element", "vertex", count] => {
                layout.vertex_count = count
                    .parse()
                    .map_err(|e| malformed(path, number + 1, e))?;
                in_vertex = true;
            }
            ["element", ..] => in_vertex = false,
            ["property", .., name] if in_vertex => layout.properties.push((*name).to_string()),
            ["property", ..] => {}
            ["end_header"] => return Ok(layout),
            _ => return Err(malformed(path, number + 1, "unexpected header line")),
        }
    }
    Err(malformed(path, 0, "missing end_header"))
}

fn read_ply(lines: &mut Lines, path: &Path) -> PointCloudResult<PointCloud> {
    let layout = read_ply_header(lines, path)?;
    let xyz = layout
        .columns(["x", "y", "z"])
        .ok_or_else(|| malformed(path, 0, "vertex element lacks x/y/z properties"))?;
    let rgb = layout.columns(["red", "green", "blue"]);
    let normal = layout.columns(["nx", "ny", "nz"]);

    let mut points = Vec::with_capacity(layout.vertex_count);
    let mut colors = rgb.map(|_| Vec::with_capacity(layout.vertex_count));
    let mut normals = normal.map(|_| Vec::with_capacity(layout.vertex_count));

    for i in 0..layout.vertex_count {
        let line = lines
            .next()
            .ok_or_else(|| malformed(path, 0, format!("expected {} vertices, found {i}", layout.vertex_count)))?
            .map_err(|e| io_error("read", path, e))?;
        let values = parse_floats(&line).map_err(|e| malformed(path, i + 1, e))?;
        if values.len() < layout.properties.len() {
            return Err(malformed(path, i + 1, "vertex row is shorter than the header"));
        }
        let pick = |cols: [usize; 3]| cols.map(|c| values[c]);
        points.push(pick(xyz));
        if let (Some(out), Some(cols)) = (colors.as_mut(), rgb) {
            out.push(channel_to_unit(pick(cols)));
        }
        if let (Some(out), Some(cols)) = (normals.as_mut(), normal) {
            out.push(pick(cols));
        }
    }

    PointCloud::new(points, colors, normals)
}

fn write_ply<W: Write>(cloud: &PointCloud, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", cloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(out, "property double {axis}")?;
    }
    if cloud.colors().is_some() {
        for channel in ["red", "green", "blue"] {
            writeln!(out, "property uchar {channel}")?;
        }
    }
    if cloud.normals().is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(out, "property double {axis}")?;
        }
    }
    writeln!(out, "end_header")?;

    for (i, p) in cloud.points().iter().enumerate() {
        write!(out, "{} {} {}", p[0], p[1], p[2])?;
        if let Some(colors) = cloud.colors() {
            let [r, g, b] = colors[i].map(unit_to_channel);
            write!(out, " {r} {g} {b}")?;
        }
        if let Some(normals) = cloud.normals() {
            let n = normals[i];
            write!(out, " {} {} {}", n[0], n[1], n[2])?;
        }
        writeln!(out)?;
    }
    Ok(())
}
