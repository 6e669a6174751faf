//! Single-pass GPX reader.
//!
//! Walks the XML event stream once and builds the track segments of a GPX 1.0
//! or 1.1 document. Elements are matched by local name so namespaced documents
//! (`<gpx:trkpt>`) read the same as plain ones. Waypoints, routes and
//! extension blocks are skipped.
//!
//! Structural problems (unclosed or mismatched elements, a root other than
//! `<gpx>`, a track point without usable `lat`/`lon` attributes) reject the
//! whole document. Optional per-point data that cannot be read is treated as
//! absent.

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::{
    errors::{OrderingAnomaly, ParseError},
    point::{Point, Segment},
};

/// Result of reading one GPX document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// `<name>` of the first `<trk>`, if any.
    pub name: Option<String>,
    /// Non-empty segments in document order.
    pub segments: Vec<Segment>,
    /// Timestamp regressions between consecutive points, in document order.
    pub anomalies: Vec<OrderingAnomaly>,
}

impl ParsedDocument {
    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }
}

/// Parse a GPX document into its track segments.
pub fn parse_gpx(bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;
    let mut builder = DocumentBuilder::default();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ParseError::MalformedDocument(format!(
                "XML error at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if open.is_empty() {
                    check_root(&name, &mut seen_root)?;
                }
                builder.open(&open, &name, &e)?;
                open.push(name);
            }
            Event::Empty(e) => {
                let name = e.local_name().as_ref().to_vec();
                if open.is_empty() {
                    check_root(&name, &mut seen_root)?;
                }
                builder.open(&open, &name, &e)?;
                builder.close(&open, &name);
            }
            Event::Text(t) => {
                if !open.is_empty() {
                    let text = t.unescape().map_err(|e| {
                        ParseError::MalformedDocument(format!("invalid text content: {e}"))
                    })?;
                    builder.text(&open, &text);
                }
            }
            Event::CData(c) => {
                if !open.is_empty() {
                    let text = std::str::from_utf8(&c).map_err(|e| {
                        ParseError::MalformedDocument(format!("invalid CDATA content: {e}"))
                    })?;
                    builder.text(&open, text);
                }
            }
            Event::End(e) => {
                let name = e.local_name().as_ref().to_vec();
                match open.pop() {
                    Some(expected) if expected == name => builder.close(&open, &name),
                    Some(expected) => {
                        return Err(ParseError::MalformedDocument(format!(
                            "expected </{}>, found </{}>",
                            String::from_utf8_lossy(&expected),
                            String::from_utf8_lossy(&name)
                        )));
                    }
                    None => {
                        return Err(ParseError::MalformedDocument(format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(&name)
                        )));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = open.last() {
        return Err(ParseError::MalformedDocument(format!(
            "document ended inside <{}>",
            String::from_utf8_lossy(unclosed)
        )));
    }
    if !seen_root {
        return Err(ParseError::MalformedDocument(
            "document has no root element".to_string(),
        ));
    }

    builder.finish()
}

fn check_root(name: &[u8], seen_root: &mut bool) -> Result<(), ParseError> {
    if *seen_root {
        return Err(ParseError::MalformedDocument(
            "multiple root elements".to_string(),
        ));
    }
    if name != b"gpx" {
        return Err(ParseError::MalformedDocument(format!(
            "root element is <{}>, expected <gpx>",
            String::from_utf8_lossy(name)
        )));
    }
    *seen_root = true;
    Ok(())
}

/// A `<trkpt>` whose children have not all been read yet.
#[derive(Debug)]
struct PendingPoint {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    timestamp: Option<OffsetDateTime>,
}

#[derive(Debug, Default)]
struct DocumentBuilder {
    name: Option<String>,
    segments: Vec<Segment>,
    anomalies: Vec<OrderingAnomaly>,
    segment: Option<Vec<Point>>,
    point: Option<PendingPoint>,
    dropped_segments: usize,
}

impl DocumentBuilder {
    /// `parents` is the stack of open elements, not including `name`.
    fn open(&mut self, parents: &[Vec<u8>], name: &[u8], e: &BytesStart) -> Result<(), ParseError> {
        match (parent(parents), name) {
            (Some(b"trk"), b"trkseg") => self.segment = Some(Vec::new()),
            (Some(b"trkseg"), b"trkpt") => {
                let (lat, lon) = read_lat_lon(e)?;
                // Validate now; elevation and time cannot make a bad position good.
                Point::new(lat, lon, None, None)?;
                self.point = Some(PendingPoint {
                    lat,
                    lon,
                    elevation: None,
                    timestamp: None,
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// `open` is the stack of open elements, innermost last.
    fn text(&mut self, open: &[Vec<u8>], text: &str) {
        let Some((current, parents)) = open.split_last() else {
            return;
        };

        match (parent(parents), current.as_slice()) {
            (Some(b"trkpt"), b"ele") => {
                if let Some(point) = self.point.as_mut() {
                    point.elevation = text.trim().parse::<f64>().ok().filter(|e| e.is_finite());
                }
            }
            (Some(b"trkpt"), b"time") => {
                if let Some(point) = self.point.as_mut() {
                    point.timestamp = OffsetDateTime::parse(text.trim(), &Rfc3339)
                        .ok()
                        .map(to_microseconds);
                    if point.timestamp.is_none() {
                        debug!("Ignoring unparsable track point time {text:?}");
                    }
                }
            }
            (Some(b"trk"), b"name") if self.name.is_none() && self.segments.is_empty() => {
                let name = text.trim();
                if !name.is_empty() {
                    self.name = Some(name.to_string());
                }
            }
            _ => {}
        }
    }

    /// `parents` is the stack of open elements after `name` has been closed.
    fn close(&mut self, parents: &[Vec<u8>], name: &[u8]) {
        match (parent(parents), name) {
            (Some(b"trkseg"), b"trkpt") => self.finish_point(),
            (Some(b"trk"), b"trkseg") => self.finish_segment(),
            _ => {}
        }
    }

    fn finish_point(&mut self) {
        let (Some(pending), Some(points)) = (self.point.take(), self.segment.as_mut()) else {
            return;
        };

        let Ok(point) = Point::new(pending.lat, pending.lon, pending.elevation, pending.timestamp)
        else {
            // Coordinates were checked when the element opened.
            return;
        };

        if let (Some(prev), Some(current)) = (
            points.last().and_then(Point::timestamp),
            point.timestamp(),
        ) && current < prev
        {
            let anomaly = OrderingAnomaly {
                segment: self.segments.len(),
                point: points.len(),
                previous: prev,
                current,
            };
            debug!("Ordering anomaly: {anomaly}");
            self.anomalies.push(anomaly);
        }

        points.push(point);
    }

    fn finish_segment(&mut self) {
        let points = self.segment.take().unwrap_or_default();
        match Segment::new(points) {
            Some(segment) => self.segments.push(segment),
            None => {
                self.dropped_segments += 1;
                debug!("Dropping empty track segment");
            }
        }
    }

    fn finish(self) -> Result<ParsedDocument, ParseError> {
        if self.segments.is_empty() {
            return Err(ParseError::EmptyTrack);
        }

        debug!(
            "Parsed {} segments ({} dropped as empty), {} ordering anomalies",
            self.segments.len(),
            self.dropped_segments,
            self.anomalies.len()
        );

        Ok(ParsedDocument {
            name: self.name,
            segments: self.segments,
            anomalies: self.anomalies,
        })
    }
}

/// Stored timestamps keep microseconds, so parsed ones do too.
fn to_microseconds(time: OffsetDateTime) -> OffsetDateTime {
    time - Duration::nanoseconds(i64::from(time.nanosecond() % 1_000))
}

fn parent(parents: &[Vec<u8>]) -> Option<&[u8]> {
    parents.last().map(Vec::as_slice)
}

fn read_lat_lon(e: &BytesStart) -> Result<(f64, f64), ParseError> {
    let mut lat = None;
    let mut lon = None;

    for attr in e.attributes() {
        let attr = attr
            .map_err(|e| ParseError::MalformedDocument(format!("invalid trkpt attribute: {e}")))?;
        let target = match attr.key.local_name().as_ref() {
            b"lat" => &mut lat,
            b"lon" => &mut lon,
            _ => continue,
        };
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::MalformedDocument(format!("invalid trkpt attribute: {e}")))?;
        let parsed = value.trim().parse::<f64>().map_err(|_| {
            ParseError::MalformedDocument(format!("trkpt coordinate {value:?} is not a number"))
        })?;
        *target = Some(parsed);
    }

    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok((lat, lon)),
        (None, _) => Err(ParseError::MalformedDocument(
            "trkpt is missing the lat attribute".to_string(),
        )),
        (_, None) => Err(ParseError::MalformedDocument(
            "trkpt is missing the lon attribute".to_string(),
        )),
    }
}
