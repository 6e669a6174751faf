//! GPX document generation.
//!
//! [`GpxBuilder`] writes GPX 1.1 text with any number of segments, optional
//! per-point fields and a few deliberate defects for failure-path tests.

use time::format_description::well_known::Rfc3339;

use crate::SamplePoint;

const HEADER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    "\n",
    r#"<gpx version="1.1" creator="tracklog-test-data""#,
    r#" xmlns="http://www.topografix.com/GPX/1/1""#,
    r#" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#,
    r#" xsi:schemaLocation="http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd">"#,
    "\n",
);

#[derive(Debug, Clone)]
enum Item {
    Point(SamplePoint),
    /// Written verbatim inside the segment.
    Raw(String),
}

#[derive(Debug, Clone, Default)]
pub struct GpxBuilder {
    name: Option<String>,
    segments: Vec<Vec<Item>>,
    extensions: bool,
    truncate: bool,
}

impl GpxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a segment holding `points`.
    pub fn segment(mut self, points: impl IntoIterator<Item = SamplePoint>) -> Self {
        self.segments
            .push(points.into_iter().map(Item::Point).collect());
        self
    }

    /// Appends a `<trkseg>` with no points.
    pub fn empty_segment(mut self) -> Self {
        self.segments.push(Vec::new());
        self
    }

    /// Appends a raw `<trkpt>` element to the last segment, opening one if
    /// needed. Use it for bad coordinates or unparseable fields.
    pub fn raw_point(mut self, xml: impl Into<String>) -> Self {
        if self.segments.is_empty() {
            self.segments.push(Vec::new());
        }
        if let Some(last) = self.segments.last_mut() {
            last.push(Item::Raw(xml.into()));
        }
        self
    }

    /// Adds a vendor `<extensions>` block to every point.
    pub fn with_extensions(mut self) -> Self {
        self.extensions = true;
        self
    }

    /// Cuts the document off halfway through.
    pub fn truncated(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub fn build_string(&self) -> String {
        let mut gpx = String::from(HEADER);

        if let Some(name) = &self.name {
            gpx.push_str("  <metadata>\n");
            gpx.push_str(&format!("    <name>{}</name>\n", escape_xml(name)));
            gpx.push_str("  </metadata>\n");
        }

        gpx.push_str("  <trk>\n");
        if let Some(name) = &self.name {
            gpx.push_str(&format!("    <name>{}</name>\n", escape_xml(name)));
        }

        for segment in &self.segments {
            gpx.push_str("    <trkseg>\n");
            for item in segment {
                match item {
                    Item::Point(point) => self.write_point(&mut gpx, point),
                    Item::Raw(xml) => {
                        gpx.push_str("      ");
                        gpx.push_str(xml);
                        gpx.push('\n');
                    }
                }
            }
            gpx.push_str("    </trkseg>\n");
        }

        gpx.push_str("  </trk>\n");
        gpx.push_str("</gpx>\n");

        if self.truncate {
            let mut cut = gpx.len() / 2;
            while !gpx.is_char_boundary(cut) {
                cut -= 1;
            }
            gpx.truncate(cut);
        }
        gpx
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_string().into_bytes()
    }

    fn write_point(&self, gpx: &mut String, point: &SamplePoint) {
        gpx.push_str(&format!(
            r#"      <trkpt lat="{:.7}" lon="{:.7}">"#,
            point.lat, point.lon
        ));
        gpx.push('\n');

        if let Some(ele) = point.elevation {
            gpx.push_str(&format!("        <ele>{:.2}</ele>\n", ele));
        }

        if let Some(ts) = point.timestamp {
            let formatted = ts.format(&Rfc3339).unwrap_or_default();
            gpx.push_str(&format!("        <time>{}</time>\n", formatted));
        }

        if self.extensions {
            gpx.push_str("        <extensions><hr>142</hr><cad>88</cad></extensions>\n");
        }

        gpx.push_str("      </trkpt>\n");
    }
}

/// Single-segment document, the common case.
pub fn generate_gpx(points: &[SamplePoint], track_name: &str) -> Vec<u8> {
    GpxBuilder::new()
        .name(track_name)
        .segment(points.iter().copied())
        .build()
}

/// Escapes XML special characters in a string.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration, OffsetDateTime};

    #[test]
    fn test_generate_gpx_basic() {
        let now = OffsetDateTime::now_utc();
        let points = vec![
            SamplePoint::new(40.0150, -105.2705)
                .with_elevation(1650.0)
                .with_timestamp(now),
            SamplePoint::new(40.0160, -105.2695)
                .with_elevation(1660.0)
                .with_timestamp(now + Duration::seconds(60)),
        ];

        let gpx = String::from_utf8(generate_gpx(&points, "Test Track")).unwrap();

        assert!(gpx.contains(r#"version="1.1""#));
        assert!(gpx.contains("<name>Test Track</name>"));
        assert!(gpx.contains(r#"lat="40.0150000""#));
        assert!(gpx.contains(r#"lon="-105.2705000""#));
        assert!(gpx.contains("<ele>1650.00</ele>"));
        assert!(gpx.contains("<time>"));
        assert_eq!(gpx.matches("<trkseg>").count(), 1);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let gpx = GpxBuilder::new()
            .segment([SamplePoint::new(40.0, -105.0)])
            .build_string();

        assert!(!gpx.contains("<ele>"));
        assert!(!gpx.contains("<time>"));
        assert!(!gpx.contains("<name>"));
    }

    #[test]
    fn test_multiple_and_empty_segments() {
        let gpx = GpxBuilder::new()
            .segment([SamplePoint::new(40.0, -105.0)])
            .empty_segment()
            .segment([SamplePoint::new(40.1, -105.1)])
            .build_string();

        assert_eq!(gpx.matches("<trkseg>").count(), 3);
        assert_eq!(gpx.matches("<trkpt").count(), 2);
    }

    #[test]
    fn test_raw_point_and_truncation() {
        let gpx = GpxBuilder::new()
            .raw_point(r#"<trkpt lat="95.0" lon="0.0"></trkpt>"#)
            .build_string();
        assert!(gpx.contains(r#"lat="95.0""#));

        let truncated = GpxBuilder::new()
            .segment([SamplePoint::new(40.0, -105.0), SamplePoint::new(40.1, -105.1)])
            .truncated()
            .build_string();
        assert!(!truncated.contains("</gpx>"));
    }

    #[test]
    fn test_generate_gpx_escapes_special_chars() {
        let points = vec![SamplePoint::new(40.0, -105.0)];

        let gpx = generate_gpx(&points, "Test & <Track> \"Name\"");
        let gpx = String::from_utf8(gpx).unwrap();

        assert!(gpx.contains("Test &amp; &lt;Track&gt; &quot;Name&quot;"));
    }
}
