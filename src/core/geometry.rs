//! Geometry parsing and encoding for spatial filters and feature values.
//!
//! Geometries reach the status command in two textual forms: Well-Known Text as
//! typed by users into repository config, and hex-encoded Well-Known Binary as
//! written by tools. [`Geometry::from_string`] accepts either. The canonical
//! exchange encoding used in JSON output is upper-case hex WKB
//! ([`Geometry::to_hex_wkb`]), always little-endian and two-dimensional.
//!
//! Only X/Y are kept. Z and M ordinates are accepted on input and dropped.

use crate::core::error::GeometryError;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

// EWKB (PostGIS) flag bits
const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn from_coord(coord: Coord) -> Self {
        Self {
            min_x: coord.x,
            min_y: coord.y,
            max_x: coord.x,
            max_y: coord.y,
        }
    }

    pub fn expand_to_include(&mut self, coord: Coord) {
        self.min_x = self.min_x.min(coord.x);
        self.min_y = self.min_y.min(coord.y);
        self.max_x = self.max_x.max(coord.x);
        self.max_y = self.max_y.max(coord.y);
    }

    /// True if the two boxes share at least one point (touching counts)
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

impl fmt::Display for Envelope {
    /// Formats as `[w, s, e, n]` with three decimals
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3}, {:.3}, {:.3}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Parses hex WKB or WKT, whichever `input` looks like.
    ///
    /// `context` names where the string came from and ends up in error messages.
    pub fn from_string(input: &str, context: &str) -> Result<Geometry, GeometryError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(GeometryError::empty(context));
        }
        if looks_like_hex(trimmed) {
            let bytes = decode_hex(trimmed)
                .ok_or_else(|| GeometryError::invalid(context, "malformed hex string"))?;
            Self::from_wkb(&bytes, context)
        } else {
            Self::from_wkt(trimmed, context)
        }
    }

    pub fn from_wkt(input: &str, context: &str) -> Result<Geometry, GeometryError> {
        let mut parser = WktParser::new(input, context);
        let geometry = parser.parse_geometry()?;
        parser.expect_end()?;
        Ok(geometry)
    }

    pub fn from_wkb(bytes: &[u8], context: &str) -> Result<Geometry, GeometryError> {
        let mut cursor = Cursor::new(bytes);
        let geometry = read_wkb_geometry(&mut cursor, context)?;
        if (cursor.position() as usize) != bytes.len() {
            return Err(GeometryError::invalid(context, "trailing bytes after WKB"));
        }
        Ok(geometry)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "POINT",
            Geometry::LineString(_) => "LINESTRING",
            Geometry::Polygon(_) => "POLYGON",
            Geometry::MultiPoint(_) => "MULTIPOINT",
            Geometry::MultiLineString(_) => "MULTILINESTRING",
            Geometry::MultiPolygon(_) => "MULTIPOLYGON",
            Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        }
    }

    fn wkb_type(&self) -> u32 {
        match self {
            Geometry::Point(_) => WKB_POINT,
            Geometry::LineString(_) => WKB_LINESTRING,
            Geometry::Polygon(_) => WKB_POLYGON,
            Geometry::MultiPoint(_) => WKB_MULTIPOINT,
            Geometry::MultiLineString(_) => WKB_MULTILINESTRING,
            Geometry::MultiPolygon(_) => WKB_MULTIPOLYGON,
            Geometry::GeometryCollection(_) => WKB_GEOMETRYCOLLECTION,
        }
    }

    /// Calls `f` on every coordinate in drawing order
    pub fn for_each_coord<F: FnMut(Coord)>(&self, f: &mut F) {
        match self {
            Geometry::Point(coord) => {
                if let Some(c) = coord {
                    f(*c);
                }
            }
            Geometry::LineString(coords) | Geometry::MultiPoint(coords) => {
                for c in coords {
                    f(*c);
                }
            }
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                for c in rings.iter().flatten() {
                    f(*c);
                }
            }
            Geometry::MultiPolygon(polygons) => {
                for c in polygons.iter().flatten().flatten() {
                    f(*c);
                }
            }
            Geometry::GeometryCollection(members) => {
                for member in members {
                    member.for_each_coord(f);
                }
            }
        }
    }

    /// Returns a copy with every coordinate passed through `f`
    pub fn try_map_coords<E, F>(&self, f: &mut F) -> Result<Geometry, E>
    where
        F: FnMut(Coord) -> Result<Coord, E>,
    {
        fn map_seq<E, F: FnMut(Coord) -> Result<Coord, E>>(
            coords: &[Coord],
            f: &mut F,
        ) -> Result<Vec<Coord>, E> {
            coords.iter().map(|c| f(*c)).collect()
        }

        Ok(match self {
            Geometry::Point(coord) => Geometry::Point(coord.map(|c| f(c)).transpose()?),
            Geometry::LineString(coords) => Geometry::LineString(map_seq(coords, f)?),
            Geometry::MultiPoint(coords) => Geometry::MultiPoint(map_seq(coords, f)?),
            Geometry::Polygon(rings) => Geometry::Polygon(
                rings
                    .iter()
                    .map(|r| map_seq(r, f))
                    .collect::<Result<_, _>>()?,
            ),
            Geometry::MultiLineString(lines) => Geometry::MultiLineString(
                lines
                    .iter()
                    .map(|l| map_seq(l, f))
                    .collect::<Result<_, _>>()?,
            ),
            Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|p| p.iter().map(|r| map_seq(r, f)).collect::<Result<_, _>>())
                    .collect::<Result<_, _>>()?,
            ),
            Geometry::GeometryCollection(members) => Geometry::GeometryCollection(
                members
                    .iter()
                    .map(|g| g.try_map_coords(f))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Bounding box, or `None` for an empty geometry
    pub fn envelope(&self) -> Option<Envelope> {
        let mut envelope: Option<Envelope> = None;
        self.for_each_coord(&mut |c| match envelope.as_mut() {
            Some(env) => env.expand_to_include(c),
            None => envelope = Some(Envelope::from_coord(c)),
        });
        envelope
    }

    pub fn is_empty(&self) -> bool {
        self.envelope().is_none()
    }

    /// Little-endian, 2D, ISO WKB
    pub fn to_wkb(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_wkb_geometry(self, &mut out);
        out
    }

    pub fn to_hex_wkb(&self) -> String {
        self.to_wkb().iter().map(|b| format!("{b:02X}")).collect()
    }
}

fn looks_like_hex(s: &str) -> bool {
    s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

// ---------------------------------------------------------------------------
// WKB

struct WkbHeader {
    big_endian: bool,
    base_type: u32,
    extra_dims: usize,
}

fn read_u32(cursor: &mut Cursor<&[u8]>, big_endian: bool) -> std::io::Result<u32> {
    if big_endian {
        cursor.read_u32::<BigEndian>()
    } else {
        cursor.read_u32::<LittleEndian>()
    }
}

fn read_f64(cursor: &mut Cursor<&[u8]>, big_endian: bool) -> std::io::Result<f64> {
    if big_endian {
        cursor.read_f64::<BigEndian>()
    } else {
        cursor.read_f64::<LittleEndian>()
    }
}

fn read_wkb_header(
    cursor: &mut Cursor<&[u8]>,
    context: &str,
) -> Result<WkbHeader, GeometryError> {
    let truncated = |_| GeometryError::invalid(context, "truncated WKB");
    let big_endian = match cursor.read_u8().map_err(truncated)? {
        0 => true,
        1 => false,
        other => {
            return Err(GeometryError::invalid(
                context,
                format!("bad WKB byte order marker {other}"),
            ))
        }
    };
    let raw_type = read_u32(cursor, big_endian).map_err(truncated)?;

    let mut extra_dims = 0;
    if raw_type & EWKB_Z != 0 {
        extra_dims += 1;
    }
    if raw_type & EWKB_M != 0 {
        extra_dims += 1;
    }
    if raw_type & EWKB_SRID != 0 {
        read_u32(cursor, big_endian).map_err(truncated)?;
    }
    let iso_type = raw_type & 0x0FFF_FFFF;
    extra_dims += match iso_type / 1000 {
        0 => 0,
        1 | 2 => 1,
        3 => 2,
        _ => return Err(GeometryError::unsupported_type(context, raw_type)),
    };

    Ok(WkbHeader {
        big_endian,
        base_type: iso_type % 1000,
        extra_dims,
    })
}

fn read_wkb_coord(
    cursor: &mut Cursor<&[u8]>,
    header: &WkbHeader,
    context: &str,
) -> Result<Coord, GeometryError> {
    let truncated = |_| GeometryError::invalid(context, "truncated WKB");
    let x = read_f64(cursor, header.big_endian).map_err(truncated)?;
    let y = read_f64(cursor, header.big_endian).map_err(truncated)?;
    for _ in 0..header.extra_dims {
        read_f64(cursor, header.big_endian).map_err(truncated)?;
    }
    Ok(Coord::new(x, y))
}

fn read_wkb_count(
    cursor: &mut Cursor<&[u8]>,
    header: &WkbHeader,
    context: &str,
) -> Result<usize, GeometryError> {
    let count = read_u32(cursor, header.big_endian)
        .map_err(|_| GeometryError::invalid(context, "truncated WKB"))? as usize;
    // Each element takes at least 16 bytes, so a count larger than that is corrupt
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if count > remaining {
        return Err(GeometryError::invalid(context, "WKB element count too large"));
    }
    Ok(count)
}

fn read_wkb_sequence(
    cursor: &mut Cursor<&[u8]>,
    header: &WkbHeader,
    context: &str,
) -> Result<Vec<Coord>, GeometryError> {
    let count = read_wkb_count(cursor, header, context)?;
    (0..count)
        .map(|_| read_wkb_coord(cursor, header, context))
        .collect()
}

fn read_wkb_rings(
    cursor: &mut Cursor<&[u8]>,
    header: &WkbHeader,
    context: &str,
) -> Result<Vec<Vec<Coord>>, GeometryError> {
    let count = read_wkb_count(cursor, header, context)?;
    (0..count)
        .map(|_| read_wkb_sequence(cursor, header, context))
        .collect()
}

fn read_wkb_members(
    cursor: &mut Cursor<&[u8]>,
    header: &WkbHeader,
    context: &str,
) -> Result<Vec<Geometry>, GeometryError> {
    let count = read_wkb_count(cursor, header, context)?;
    (0..count)
        .map(|_| read_wkb_geometry(cursor, context))
        .collect()
}

fn read_wkb_geometry(
    cursor: &mut Cursor<&[u8]>,
    context: &str,
) -> Result<Geometry, GeometryError> {
    let header = read_wkb_header(cursor, context)?;
    let wrong_member = || GeometryError::invalid(context, "unexpected member type in multi-geometry");

    match header.base_type {
        WKB_POINT => {
            let coord = read_wkb_coord(cursor, &header, context)?;
            // POINT EMPTY is encoded as NaN coordinates
            if coord.x.is_nan() && coord.y.is_nan() {
                Ok(Geometry::Point(None))
            } else {
                Ok(Geometry::Point(Some(coord)))
            }
        }
        WKB_LINESTRING => Ok(Geometry::LineString(read_wkb_sequence(
            cursor, &header, context,
        )?)),
        WKB_POLYGON => Ok(Geometry::Polygon(read_wkb_rings(cursor, &header, context)?)),
        WKB_MULTIPOINT => read_wkb_members(cursor, &header, context)?
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Point(Some(c)) => Some(Ok(c)),
                Geometry::Point(None) => None,
                _ => Some(Err(wrong_member())),
            })
            .collect::<Result<_, _>>()
            .map(Geometry::MultiPoint),
        WKB_MULTILINESTRING => read_wkb_members(cursor, &header, context)?
            .into_iter()
            .map(|g| match g {
                Geometry::LineString(line) => Ok(line),
                _ => Err(wrong_member()),
            })
            .collect::<Result<_, _>>()
            .map(Geometry::MultiLineString),
        WKB_MULTIPOLYGON => read_wkb_members(cursor, &header, context)?
            .into_iter()
            .map(|g| match g {
                Geometry::Polygon(rings) => Ok(rings),
                _ => Err(wrong_member()),
            })
            .collect::<Result<_, _>>()
            .map(Geometry::MultiPolygon),
        WKB_GEOMETRYCOLLECTION => Ok(Geometry::GeometryCollection(read_wkb_members(
            cursor, &header, context,
        )?)),
        other => Err(GeometryError::unsupported_type(context, other)),
    }
}

fn write_header(out: &mut Vec<u8>, wkb_type: u32) {
    out.push(1);
    // Writing into a Vec cannot fail
    let _ = out.write_u32::<LittleEndian>(wkb_type);
}

fn write_coord(out: &mut Vec<u8>, coord: Coord) {
    let _ = out.write_f64::<LittleEndian>(coord.x);
    let _ = out.write_f64::<LittleEndian>(coord.y);
}

fn write_count(out: &mut Vec<u8>, count: usize) {
    let _ = out.write_u32::<LittleEndian>(count as u32);
}

fn write_sequence(out: &mut Vec<u8>, coords: &[Coord]) {
    write_count(out, coords.len());
    coords.iter().for_each(|c| write_coord(out, *c));
}

fn write_rings(out: &mut Vec<u8>, rings: &[Vec<Coord>]) {
    write_count(out, rings.len());
    rings.iter().for_each(|r| write_sequence(out, r));
}

fn write_wkb_geometry(geometry: &Geometry, out: &mut Vec<u8>) {
    write_header(out, geometry.wkb_type());
    match geometry {
        Geometry::Point(coord) => {
            write_coord(out, coord.unwrap_or(Coord::new(f64::NAN, f64::NAN)))
        }
        Geometry::LineString(coords) => write_sequence(out, coords),
        Geometry::Polygon(rings) => write_rings(out, rings),
        Geometry::MultiPoint(coords) => {
            write_count(out, coords.len());
            for coord in coords {
                write_header(out, WKB_POINT);
                write_coord(out, *coord);
            }
        }
        Geometry::MultiLineString(lines) => {
            write_count(out, lines.len());
            for line in lines {
                write_header(out, WKB_LINESTRING);
                write_sequence(out, line);
            }
        }
        Geometry::MultiPolygon(polygons) => {
            write_count(out, polygons.len());
            for rings in polygons {
                write_header(out, WKB_POLYGON);
                write_rings(out, rings);
            }
        }
        Geometry::GeometryCollection(members) => {
            write_count(out, members.len());
            members.iter().for_each(|m| write_wkb_geometry(m, out));
        }
    }
}

// ---------------------------------------------------------------------------
// WKT

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(f64),
    Open,
    Close,
    Comma,
}

struct WktParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    context: &'a str,
    error: Option<GeometryError>,
}

impl<'a> WktParser<'a> {
    fn new(input: &str, context: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut error = None;
        let mut chars = input.char_indices().peekable();

        while let Some(&(start, ch)) = chars.peek() {
            match ch {
                c if c.is_whitespace() => {
                    chars.next();
                }
                '(' => {
                    chars.next();
                    tokens.push(Token::Open);
                }
                ')' => {
                    chars.next();
                    tokens.push(Token::Close);
                }
                ',' => {
                    chars.next();
                    tokens.push(Token::Comma);
                }
                c if c.is_ascii_alphabetic() => {
                    let mut end = start;
                    while let Some(&(i, c)) = chars.peek() {
                        if !c.is_ascii_alphabetic() {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    tokens.push(Token::Word(input[start..end].to_ascii_uppercase()));
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                    let mut end = start;
                    while let Some(&(i, c)) = chars.peek() {
                        let exponent_sign = (c == '-' || c == '+')
                            && matches!(input[..i].chars().last(), Some('e' | 'E'));
                        if !(c.is_ascii_digit()
                            || c == '.'
                            || c == 'e'
                            || c == 'E'
                            || exponent_sign
                            || i == start)
                        {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    match input[start..end].parse::<f64>() {
                        Ok(n) => tokens.push(Token::Number(n)),
                        Err(_) => {
                            error = Some(GeometryError::invalid(
                                context,
                                format!("bad number '{}'", &input[start..end]),
                            ));
                            break;
                        }
                    }
                }
                other => {
                    error = Some(GeometryError::invalid(
                        context,
                        format!("unexpected character '{other}'"),
                    ));
                    break;
                }
            }
        }

        Self {
            tokens,
            pos: 0,
            context,
            error,
        }
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T, GeometryError> {
        Err(GeometryError::invalid(self.context, message))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), GeometryError> {
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            other => self.fail(format!("expected {expected:?}, found {other:?}")),
        }
    }

    fn expect_end(&mut self) -> Result<(), GeometryError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => self.fail(format!("unexpected trailing {t:?}")),
        }
    }

    fn parse_geometry(&mut self) -> Result<Geometry, GeometryError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let keyword = match self.next() {
            Some(Token::Word(w)) => w,
            other => return self.fail(format!("expected geometry type, found {other:?}")),
        };

        // Optional dimension marker: Z, M or ZM
        if let Some(Token::Word(w)) = self.peek() {
            if matches!(w.as_str(), "Z" | "M" | "ZM") {
                self.next();
            }
        }

        if let Some(Token::Word(w)) = self.peek() {
            if w == "EMPTY" {
                self.next();
                return Ok(match keyword.as_str() {
                    "POINT" => Geometry::Point(None),
                    "LINESTRING" => Geometry::LineString(Vec::new()),
                    "POLYGON" => Geometry::Polygon(Vec::new()),
                    "MULTIPOINT" => Geometry::MultiPoint(Vec::new()),
                    "MULTILINESTRING" => Geometry::MultiLineString(Vec::new()),
                    "MULTIPOLYGON" => Geometry::MultiPolygon(Vec::new()),
                    "GEOMETRYCOLLECTION" => Geometry::GeometryCollection(Vec::new()),
                    other => return self.fail(format!("unknown geometry type {other}")),
                });
            }
        }

        match keyword.as_str() {
            "POINT" => {
                self.expect(Token::Open)?;
                let coord = self.parse_coord()?;
                self.expect(Token::Close)?;
                Ok(Geometry::Point(Some(coord)))
            }
            "LINESTRING" => Ok(Geometry::LineString(self.parse_sequence()?)),
            "POLYGON" => Ok(Geometry::Polygon(self.parse_rings()?)),
            "MULTIPOINT" => Ok(Geometry::MultiPoint(self.parse_multipoint()?)),
            "MULTILINESTRING" => Ok(Geometry::MultiLineString(self.parse_rings()?)),
            "MULTIPOLYGON" => {
                let polygons = self.parse_list(|p| p.parse_rings())?;
                Ok(Geometry::MultiPolygon(polygons))
            }
            "GEOMETRYCOLLECTION" => {
                let members = self.parse_list(|p| p.parse_geometry())?;
                Ok(Geometry::GeometryCollection(members))
            }
            other => self.fail(format!("unknown geometry type {other}")),
        }
    }

    fn parse_coord(&mut self) -> Result<Coord, GeometryError> {
        let mut ordinates = Vec::with_capacity(4);
        while let Some(Token::Number(n)) = self.peek() {
            ordinates.push(*n);
            self.next();
        }
        match ordinates.as_slice() {
            [x, y, ..] if ordinates.len() <= 4 => Ok(Coord::new(*x, *y)),
            _ => self.fail(format!(
                "expected 2 to 4 ordinates, found {}",
                ordinates.len()
            )),
        }
    }

    /// `( item, item, ... )`
    fn parse_list<T, F>(&mut self, mut item: F) -> Result<Vec<T>, GeometryError>
    where
        F: FnMut(&mut Self) -> Result<T, GeometryError>,
    {
        self.expect(Token::Open)?;
        let mut items = vec![item(self)?];
        loop {
            match self.next() {
                Some(Token::Comma) => items.push(item(self)?),
                Some(Token::Close) => return Ok(items),
                other => return self.fail(format!("expected ',' or ')', found {other:?}")),
            }
        }
    }

    fn parse_sequence(&mut self) -> Result<Vec<Coord>, GeometryError> {
        self.parse_list(|p| p.parse_coord())
    }

    fn parse_rings(&mut self) -> Result<Vec<Vec<Coord>>, GeometryError> {
        self.parse_list(|p| p.parse_sequence())
    }

    /// Accepts both `MULTIPOINT (1 2, 3 4)` and `MULTIPOINT ((1 2), (3 4))`
    fn parse_multipoint(&mut self) -> Result<Vec<Coord>, GeometryError> {
        self.parse_list(|p| {
            if p.peek() == Some(&Token::Open) {
                p.next();
                let coord = p.parse_coord()?;
                p.expect(Token::Close)?;
                Ok(coord)
            } else {
                p.parse_coord()
            }
        })
    }
}
