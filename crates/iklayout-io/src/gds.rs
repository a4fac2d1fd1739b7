//! GDS-II binary stream format.
//!
//! Each record is `[2-byte length][2-byte record type][payload]`. Record
//! types define the hierarchy: BGNLIB → BGNSTR → BOUNDARY/PATH/SREF/AREF →
//! ENDSTR → ENDLIB. Structure references are stored by name and resolved to
//! [`CellIndex`] values once the whole library has been read, so forward
//! references are allowed.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path as FsPath;

use thiserror::Error;

use iklayout_core::cell::{Cell, CellIndex, CellInstance, Transform};
use iklayout_core::database::LayoutDatabase;
use iklayout_core::geometry::{BBox, GeomPrimitive, Path as LayoutPath, Point, Polygon, Rect};
use iklayout_core::CoreError;

// ── GDS-II Record Types ──────────────────────────────────────────────

#[allow(dead_code)]
mod record_type {
    pub const HEADER: u16     = 0x0002;
    pub const BGNLIB: u16     = 0x0102;
    pub const LIBNAME: u16    = 0x0206;
    pub const UNITS: u16      = 0x0305;
    pub const ENDLIB: u16     = 0x0400;
    pub const BGNSTR: u16     = 0x0502;
    pub const STRNAME: u16    = 0x0606;
    pub const ENDSTR: u16     = 0x0700;
    pub const BOUNDARY: u16   = 0x0800;
    pub const PATH: u16       = 0x0900;
    pub const SREF: u16       = 0x0A00;
    pub const AREF: u16       = 0x0B00;
    pub const TEXT: u16       = 0x0C00;
    pub const LAYER: u16      = 0x0D02;
    pub const DATATYPE: u16   = 0x0E02;
    pub const WIDTH: u16      = 0x0F03;
    pub const XY: u16         = 0x1003;
    pub const ENDEL: u16      = 0x1100;
    pub const SNAME: u16      = 0x1206;
    pub const COLROW: u16     = 0x1302;
    pub const NODE: u16       = 0x1500;
    pub const STRANS: u16     = 0x1A01;
    pub const MAG: u16        = 0x1B05;
    pub const ANGLE: u16      = 0x1C05;
    pub const PATHTYPE: u16   = 0x2102;
    pub const BOX: u16        = 0x2D00;
    pub const BOXTYPE: u16    = 0x2E02;
}

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum GdsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid GDS-II record at offset {offset}: {message}")]
    InvalidRecord { offset: u64, message: String },

    #[error("Unexpected record type 0x{record_type:04X}, expected 0x{expected:04X}")]
    UnexpectedRecord { record_type: u16, expected: u16 },

    #[error("Cell '{0}' referenced but not defined")]
    UndefinedCell(String),

    #[error("Coordinate {0} does not fit a GDS-II integer")]
    CoordinateOverflow(f64),

    #[error(transparent)]
    Layout(#[from] CoreError),
}

// ── GDS-II Record ─────────────────────────────────────────────────────

#[derive(Debug)]
struct GdsRecord {
    record_type: u16,
    data: Vec<u8>,
}

impl GdsRecord {
    fn as_i16_vec(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    fn as_i32_vec(&self) -> Vec<i32> {
        self.data
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn as_string(&self) -> String {
        let s: String = self.data.iter().map(|&b| b as char).collect();
        s.trim_end_matches('\0').to_string()
    }

    fn as_f64_vec(&self) -> Vec<f64> {
        self.data
            .chunks_exact(8)
            .map(|c| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(c);
                gds_real8_to_f64(&bytes)
            })
            .collect()
    }

    fn first_i16(&self) -> Option<i16> {
        self.as_i16_vec().first().copied()
    }

    fn first_f64(&self) -> Option<f64> {
        self.as_f64_vec().first().copied()
    }
}

/// Convert GDS-II excess-64 real format to IEEE 754 f64.
fn gds_real8_to_f64(bytes: &[u8; 8]) -> f64 {
    if bytes.iter().all(|&b| b == 0) {
        return 0.0;
    }

    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (bytes[0] & 0x7F) as i32 - 64;

    let mut mantissa: u64 = 0;
    for &b in &bytes[1..] {
        mantissa = (mantissa << 8) | (b as u64);
    }

    let mantissa_f = mantissa as f64 / (1u64 << 56) as f64;
    sign * mantissa_f * 16.0_f64.powi(exponent)
}

/// Convert IEEE 754 f64 to GDS-II excess-64 real format.
fn f64_to_gds_real8(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0u8; 8];
    }

    let sign_bit: u8 = if value < 0.0 { 0x80 } else { 0x00 };
    let mut val = value.abs();

    // Normalise so that 1/16 <= mantissa < 1
    let mut exponent: i32 = 0;
    while val >= 1.0 && exponent < 63 {
        val /= 16.0;
        exponent += 1;
    }
    while val < 1.0 / 16.0 && exponent > -64 {
        val *= 16.0;
        exponent -= 1;
    }

    let mut mantissa = (val * (1u64 << 56) as f64).round() as u64;
    if mantissa >= 1u64 << 56 {
        mantissa >>= 4;
        exponent += 1;
    }
    let mut result = mantissa.to_be_bytes();
    result[0] = sign_bit | ((exponent + 64) as u8 & 0x7F);
    result
}

// ── GDS-II Reader ─────────────────────────────────────────────────────

/// A structure reference waiting for its target cell to be read.
struct PendingRef {
    parent: CellIndex,
    name: String,
    transform: Transform,
}

pub struct GdsReader<R: Read + Seek> {
    reader: R,
    db_unit_in_um: f64,
}

/// Open and parse a GDS-II file from disk.
pub fn read_gds_file(path: &FsPath) -> Result<LayoutDatabase, GdsError> {
    let file = File::open(path)?;
    GdsReader::new(BufReader::new(file)).read()
}

impl<R: Read + Seek> GdsReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            db_unit_in_um: 0.001, // Default: 1nm database unit
        }
    }

    /// Read the entire GDS-II stream into a LayoutDatabase.
    pub fn read(&mut self) -> Result<LayoutDatabase, GdsError> {
        let mut db = LayoutDatabase::new("imported");

        self.read_header()?;
        let pending = self.read_lib(&mut db)?;
        resolve_references(&mut db, pending)?;
        db.validate_hierarchy()?;
        db.dbu_in_um = self.db_unit_in_um;

        Ok(db)
    }

    fn offset(&mut self) -> u64 {
        self.reader.stream_position().unwrap_or(0)
    }

    fn read_record(&mut self) -> Result<Option<GdsRecord>, GdsError> {
        let mut len_buf = [0u8; 2];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(GdsError::Io(e)),
        }

        let total_len = u16::from_be_bytes(len_buf) as usize;
        if total_len < 4 {
            let offset = self.offset();
            return Err(GdsError::InvalidRecord {
                offset,
                message: format!("Record length {} is too small", total_len),
            });
        }

        let mut type_buf = [0u8; 2];
        self.reader.read_exact(&mut type_buf)?;
        let record_type = u16::from_be_bytes(type_buf);

        let mut data = vec![0u8; total_len - 4];
        self.reader.read_exact(&mut data)?;

        Ok(Some(GdsRecord { record_type, data }))
    }

    /// Like `read_record`, but end of stream inside an element is an error.
    fn expect_record(&mut self) -> Result<GdsRecord, GdsError> {
        match self.read_record()? {
            Some(rec) => Ok(rec),
            None => {
                let offset = self.offset();
                Err(GdsError::InvalidRecord {
                    offset,
                    message: "Unexpected end of stream".into(),
                })
            }
        }
    }

    fn read_header(&mut self) -> Result<(), GdsError> {
        let rec = self.read_record()?.ok_or(GdsError::InvalidRecord {
            offset: 0,
            message: "Empty file".into(),
        })?;

        if rec.record_type != record_type::HEADER {
            return Err(GdsError::UnexpectedRecord {
                record_type: rec.record_type,
                expected: record_type::HEADER,
            });
        }

        if let Some(version) = rec.first_i16() {
            log::debug!("GDS-II version: {}", version);
        }

        Ok(())
    }

    fn read_lib(&mut self, db: &mut LayoutDatabase) -> Result<Vec<PendingRef>, GdsError> {
        let mut pending = Vec::new();
        loop {
            let rec = self.expect_record()?;

            match rec.record_type {
                record_type::LIBNAME => {
                    db.name = rec.as_string();
                    log::debug!("Library name: {}", db.name);
                }
                record_type::UNITS => {
                    let units = rec.as_f64_vec();
                    if units.len() >= 2 && units[1] > 0.0 {
                        self.db_unit_in_um = units[1] * 1e6; // meters to μm
                        log::debug!("Database unit: {} μm", self.db_unit_in_um);
                    }
                }
                record_type::BGNSTR => {
                    let (cell, refs) = self.read_structure()?;
                    let parent = db.add_cell(cell)?;
                    pending.extend(refs.into_iter().map(|(name, transform)| PendingRef {
                        parent,
                        name,
                        transform,
                    }));
                }
                record_type::ENDLIB => {
                    log::info!("Read library '{}': {} cells", db.name, db.cell_count());
                    break;
                }
                _ => {}
            }
        }

        Ok(pending)
    }

    fn read_structure(&mut self) -> Result<(Cell, Vec<(String, Transform)>), GdsError> {
        let mut cell = Cell::new("unnamed");
        let mut refs = Vec::new();

        loop {
            let rec = self.expect_record()?;

            match rec.record_type {
                record_type::STRNAME => {
                    cell.name = rec.as_string();
                }
                record_type::BOUNDARY => {
                    if let Some(geom) = self.read_boundary()? {
                        cell.add_geometry(geom);
                    }
                }
                record_type::PATH => {
                    if let Some(geom) = self.read_path()? {
                        cell.add_geometry(geom);
                    }
                }
                record_type::BOX => {
                    if let Some(geom) = self.read_box()? {
                        cell.add_geometry(geom);
                    }
                }
                record_type::SREF => {
                    if let Some(reference) = self.read_sref()? {
                        refs.push(reference);
                    }
                }
                record_type::AREF => {
                    refs.extend(self.read_aref()?);
                }
                record_type::TEXT | record_type::NODE => {
                    self.skip_to_endel()?;
                }
                record_type::ENDSTR => break,
                _ => {}
            }
        }

        Ok((cell, refs))
    }

    fn read_points(&self, rec: &GdsRecord) -> Vec<Point> {
        rec.as_i32_vec()
            .chunks_exact(2)
            .map(|pair| {
                Point::new(
                    pair[0] as f64 * self.db_unit_in_um,
                    pair[1] as f64 * self.db_unit_in_um,
                )
            })
            .collect()
    }

    /// Reads LAYER and XY up to ENDEL, ignoring datatype-like records.
    fn read_layer_and_points(&mut self) -> Result<(u32, Vec<Point>), GdsError> {
        let mut layer: u32 = 0;
        let mut points = Vec::new();
        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::LAYER => {
                    if let Some(l) = rec.first_i16() {
                        layer = l as u32;
                    }
                }
                record_type::XY => points = self.read_points(&rec),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        // Boundaries and boxes repeat the first point; remove it
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Ok((layer, points))
    }

    fn read_boundary(&mut self) -> Result<Option<GeomPrimitive>, GdsError> {
        let (layer, points) = self.read_layer_and_points()?;

        if points.len() == 4 && is_axis_aligned_rect(&points) {
            if let Some(bbox) = BBox::from_points(&points) {
                return Ok(Some(rect_from_bbox(layer, &bbox)));
            }
        }
        if points.len() < 3 {
            return Ok(None);
        }

        Ok(Some(GeomPrimitive::Polygon(Polygon::new(layer, points))))
    }

    fn read_box(&mut self) -> Result<Option<GeomPrimitive>, GdsError> {
        let (layer, points) = self.read_layer_and_points()?;
        Ok(BBox::from_points(&points).map(|bbox| rect_from_bbox(layer, &bbox)))
    }

    fn read_path(&mut self) -> Result<Option<GeomPrimitive>, GdsError> {
        let mut layer: u32 = 0;
        let mut width: f64 = 0.0;
        let mut points: Vec<Point> = Vec::new();

        loop {
            let rec = self.expect_record()?;

            match rec.record_type {
                record_type::LAYER => {
                    if let Some(l) = rec.first_i16() {
                        layer = l as u32;
                    }
                }
                record_type::WIDTH => {
                    if let Some(&w) = rec.as_i32_vec().first() {
                        // Negative widths are absolute (not scaled); the magnitude is what we draw.
                        width = (w as f64).abs() * self.db_unit_in_um;
                    }
                }
                record_type::XY => points = self.read_points(&rec),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        if points.is_empty() {
            return Ok(None);
        }

        Ok(Some(GeomPrimitive::Path(LayoutPath::new(layer, points, width))))
    }

    /// Shared by SREF and AREF: name, transform flags and raw XY points.
    fn read_reference_body(&mut self) -> Result<(String, Transform, Vec<i16>, Vec<Point>), GdsError> {
        let mut cell_name = String::new();
        let mut transform = Transform::default();
        let mut colrow = Vec::new();
        let mut points = Vec::new();

        loop {
            let rec = self.expect_record()?;

            match rec.record_type {
                record_type::SNAME => cell_name = rec.as_string(),
                record_type::STRANS => {
                    if let Some(flags) = rec.first_i16() {
                        transform.mirror_x = (flags & 0x8000u16 as i16) != 0;
                    }
                }
                record_type::MAG => {
                    if let Some(mag) = rec.first_f64() {
                        transform.scale = mag;
                    }
                }
                record_type::ANGLE => {
                    if let Some(angle) = rec.first_f64() {
                        transform.rotation = angle;
                    }
                }
                record_type::COLROW => colrow = rec.as_i16_vec(),
                record_type::XY => points = self.read_points(&rec),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        Ok((cell_name, transform, colrow, points))
    }

    fn read_sref(&mut self) -> Result<Option<(String, Transform)>, GdsError> {
        let (cell_name, mut transform, _, points) = self.read_reference_body()?;

        if cell_name.is_empty() {
            return Ok(None);
        }
        if let Some(origin) = points.first() {
            transform.offset = *origin;
        }

        Ok(Some((cell_name, transform)))
    }

    /// Expands an array reference into one placement per array element.
    fn read_aref(&mut self) -> Result<Vec<(String, Transform)>, GdsError> {
        let (cell_name, transform, colrow, points) = self.read_reference_body()?;

        if cell_name.is_empty() || colrow.len() < 2 || points.len() < 3 {
            log::warn!("Skipping malformed array reference to '{}'", cell_name);
            return Ok(Vec::new());
        }

        let (cols, rows) = (colrow[0].max(1) as usize, colrow[1].max(1) as usize);
        let origin = points[0];
        let col_step = Point::new(
            (points[1].x - origin.x) / cols as f64,
            (points[1].y - origin.y) / cols as f64,
        );
        let row_step = Point::new(
            (points[2].x - origin.x) / rows as f64,
            (points[2].y - origin.y) / rows as f64,
        );

        let mut placements = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                let mut t = transform;
                t.offset = Point::new(
                    origin.x + col as f64 * col_step.x + row as f64 * row_step.x,
                    origin.y + col as f64 * col_step.y + row as f64 * row_step.y,
                );
                placements.push((cell_name.clone(), t));
            }
        }
        Ok(placements)
    }

    fn skip_to_endel(&mut self) -> Result<(), GdsError> {
        while self.expect_record()?.record_type != record_type::ENDEL {}
        Ok(())
    }
}

fn resolve_references(db: &mut LayoutDatabase, pending: Vec<PendingRef>) -> Result<(), GdsError> {
    for reference in pending {
        let child = db
            .find_cell(&reference.name)
            .ok_or_else(|| GdsError::UndefinedCell(reference.name.clone()))?;
        db.add_instance(reference.parent, CellInstance::new(child, reference.transform))?;
    }
    Ok(())
}

fn rect_from_bbox(layer: u32, bbox: &BBox) -> GeomPrimitive {
    GeomPrimitive::Rect(Rect::new(layer, bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y))
}

/// Check if 4 points form an axis-aligned rectangle.
fn is_axis_aligned_rect(points: &[Point]) -> bool {
    if points.len() != 4 {
        return false;
    }
    (0..4).all(|i| {
        let (a, b) = (points[i], points[(i + 1) % 4]);
        a.x == b.x || a.y == b.y
    }) && BBox::from_points(points).is_some_and(|bb| bb.width() > 0.0 && bb.height() > 0.0)
}

// ── GDS-II Writer ─────────────────────────────────────────────────────

pub struct GdsWriter<W: io::Write> {
    writer: W,
    db_unit_in_um: f64,
}

impl<W: io::Write> GdsWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            db_unit_in_um: 0.001,
        }
    }

    /// Write a LayoutDatabase as a GDS-II stream.
    pub fn write(&mut self, db: &LayoutDatabase) -> Result<(), GdsError> {
        self.db_unit_in_um = db.dbu_in_um;
        self.write_i16_record(record_type::HEADER, &[600])?; // GDS version 6
        self.write_i16_record(record_type::BGNLIB, &TIMESTAMP)?;
        self.write_string_record(record_type::LIBNAME, &db.name)?;
        // db unit in user units (μm), db unit in meters
        self.write_real8_record(
            record_type::UNITS,
            &[self.db_unit_in_um, self.db_unit_in_um * 1e-6],
        )?;

        for (_, cell) in db.all_cells() {
            self.write_cell(db, cell)?;
        }

        self.write_record(record_type::ENDLIB, &[])?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_record(&mut self, record_type: u16, data: &[u8]) -> Result<(), GdsError> {
        let total_len = (data.len() + 4) as u16;
        self.writer.write_all(&total_len.to_be_bytes())?;
        self.writer.write_all(&record_type.to_be_bytes())?;
        self.writer.write_all(data)?;
        Ok(())
    }

    fn write_i16_record(&mut self, record_type: u16, values: &[i16]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_i32_record(&mut self, record_type: u16, values: &[i32]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_string_record(&mut self, record_type: u16, s: &str) -> Result<(), GdsError> {
        let mut data: Vec<u8> = s.bytes().collect();
        // GDS strings must be even length
        if data.len() % 2 != 0 {
            data.push(0);
        }
        self.write_record(record_type, &data)
    }

    fn write_real8_record(&mut self, record_type: u16, values: &[f64]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| f64_to_gds_real8(*v)).collect();
        self.write_record(record_type, &data)
    }

    fn to_dbu(&self, value: f64) -> Result<i32, GdsError> {
        let scaled = (value / self.db_unit_in_um).round();
        if scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
            return Err(GdsError::CoordinateOverflow(value));
        }
        Ok(scaled as i32)
    }

    fn to_xy(&self, points: &[Point]) -> Result<Vec<i32>, GdsError> {
        let mut coords = Vec::with_capacity(points.len() * 2);
        for p in points {
            coords.push(self.to_dbu(p.x)?);
            coords.push(self.to_dbu(p.y)?);
        }
        Ok(coords)
    }

    fn write_cell(&mut self, db: &LayoutDatabase, cell: &Cell) -> Result<(), GdsError> {
        self.write_i16_record(record_type::BGNSTR, &TIMESTAMP)?;
        self.write_string_record(record_type::STRNAME, &cell.name)?;

        for geom in &cell.geometries {
            match geom {
                GeomPrimitive::Path(path) => self.write_path(path)?,
                other => {
                    // Rects, polygons and via cuts all become closed boundaries.
                    for ring in other.outlines() {
                        self.write_boundary(other.layer_id(), &ring)?;
                    }
                }
            }
        }

        for inst in &cell.instances {
            let name = db
                .cell(inst.cell)
                .map(|c| c.name.as_str())
                .ok_or(CoreError::CellOutOfRange(inst.cell))?;
            self.write_sref(name, &inst.transform)?;
        }

        self.write_record(record_type::ENDSTR, &[])
    }

    fn write_boundary(&mut self, layer: u32, ring: &[Point]) -> Result<(), GdsError> {
        let mut coords = self.to_xy(ring)?;
        if let Some(first) = ring.first() {
            coords.push(self.to_dbu(first.x)?);
            coords.push(self.to_dbu(first.y)?);
        }

        self.write_record(record_type::BOUNDARY, &[])?;
        self.write_i16_record(record_type::LAYER, &[layer as i16])?;
        self.write_i16_record(record_type::DATATYPE, &[0])?;
        self.write_i32_record(record_type::XY, &coords)?;
        self.write_record(record_type::ENDEL, &[])
    }

    fn write_path(&mut self, path: &LayoutPath) -> Result<(), GdsError> {
        let width = self.to_dbu(path.width)?;
        let coords = self.to_xy(&path.points)?;

        self.write_record(record_type::PATH, &[])?;
        self.write_i16_record(record_type::LAYER, &[path.layer_id as i16])?;
        self.write_i16_record(record_type::DATATYPE, &[0])?;
        self.write_i32_record(record_type::WIDTH, &[width])?;
        self.write_i32_record(record_type::XY, &coords)?;
        self.write_record(record_type::ENDEL, &[])
    }

    fn write_sref(&mut self, name: &str, transform: &Transform) -> Result<(), GdsError> {
        self.write_record(record_type::SREF, &[])?;
        self.write_string_record(record_type::SNAME, name)?;

        let plain = !transform.mirror_x && transform.rotation == 0.0 && transform.scale == 1.0;
        if !plain {
            let flags: i16 = if transform.mirror_x { i16::MIN } else { 0 }; // 0x8000
            self.write_i16_record(record_type::STRANS, &[flags])?;
            if transform.scale != 1.0 {
                self.write_real8_record(record_type::MAG, &[transform.scale])?;
            }
            if transform.rotation != 0.0 {
                self.write_real8_record(record_type::ANGLE, &[transform.rotation])?;
            }
        }

        let xy = self.to_xy(&[transform.offset])?;
        self.write_i32_record(record_type::XY, &xy)?;
        self.write_record(record_type::ENDEL, &[])
    }
}

const TIMESTAMP: [i16; 12] = [2024, 1, 1, 0, 0, 0, 2024, 1, 1, 0, 0, 0];
