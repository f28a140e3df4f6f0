//! DFXML-style scan reports.
//!
//! One report is written per scan session and read back by `recover` and
//! `mount`. The writer emits the exact subset of DFXML the reader parses:
//! a `<dfxml>` root with metadata, creator and source elements, then one
//! `<fileobject>` per carved file with a single `<byte_run>`.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use strata_core::FileInfo;

pub const XML_OUTPUT_VERSION: &str = "1.0";

const XMLNS: &str = "http://www.forensicswiki.org/wiki/Category:Digital_Forensics_XML";
const XMLNS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XMLNS_DC: &str = "http://purl.org/dc/elements/1.1/";

/// Describes the scanned source in the report header.
pub struct SourceInfo {
    pub image_filename: String,
    pub sector_size: u32,
    pub image_size: u64,
}

pub struct DfxmlWriter<W: Write> {
    w: W,
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

impl<W: Write> DfxmlWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn write_header(&mut self, source: &SourceInfo) -> Result<()> {
        writeln!(self.w, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        writeln!(self.w, r#"<dfxml xmloutputversion="{XML_OUTPUT_VERSION}">"#)?;
        writeln!(
            self.w,
            r#"  <metadata xmlns="{XMLNS}" xmlns:xsi="{XMLNS_XSI}" xmlns:dc="{XMLNS_DC}">"#
        )?;
        writeln!(self.w, "    <dc:type>Carve Report</dc:type>")?;
        writeln!(self.w, "  </metadata>")?;
        writeln!(self.w, "  <creator>")?;
        writeln!(self.w, "    <package>{}</package>", env!("CARGO_PKG_NAME"))?;
        writeln!(self.w, "    <version>{}</version>", env!("CARGO_PKG_VERSION"))?;
        writeln!(self.w, "  </creator>")?;
        writeln!(self.w, "  <source>")?;
        writeln!(
            self.w,
            "    <image_filename>{}</image_filename>",
            escape_xml(&source.image_filename)
        )?;
        writeln!(self.w, "    <sectorsize>{}</sectorsize>", source.sector_size)?;
        writeln!(self.w, "    <image_size>{}</image_size>", source.image_size)?;
        writeln!(self.w, "  </source>")?;
        Ok(())
    }

    pub fn write_file_object(&mut self, info: &FileInfo) -> Result<()> {
        writeln!(self.w, "  <fileobject>")?;
        writeln!(
            self.w,
            "    <filename>{}</filename>",
            escape_xml(&info.name)
        )?;
        writeln!(self.w, "    <filesize>{}</filesize>", info.size)?;
        writeln!(self.w, "    <byte_runs>")?;
        writeln!(
            self.w,
            r#"      <byte_run offset="{}" img_offset="{}" len="{}"/>"#,
            info.offset, info.offset, info.size
        )?;
        writeln!(self.w, "    </byte_runs>")?;
        writeln!(self.w, "  </fileobject>")?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        writeln!(self.w, "</dfxml>")?;
        self.w.flush()?;
        Ok(())
    }
}

fn text_between<'a>(line: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = line.find(open)? + open.len();
    let end = line[start..].find(close)? + start;
    Some(&line[start..end])
}

fn attr_value(line: &str, name: &str) -> Option<u64> {
    let marker = format!("{name}=\"");
    let start = line.find(&marker)? + marker.len();
    let end = line[start..].find('"')? + start;
    line[start..end].parse().ok()
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parse the `<fileobject>` records out of a report produced by
/// [`DfxmlWriter`].
pub fn read_file_objects<R: BufRead>(r: R) -> Result<Vec<FileInfo>> {
    let mut out = Vec::new();
    let mut name: Option<String> = None;
    let mut size: Option<u64> = None;
    let mut run: Option<(u64, u64)> = None;
    let mut in_object = false;
    let mut saw_root = false;

    for line in r.lines() {
        let line = line.context("reading report")?;
        let trimmed = line.trim();

        if trimmed.starts_with("<dfxml") {
            saw_root = true;
        } else if trimmed.starts_with("<fileobject") {
            in_object = true;
            name = None;
            size = None;
            run = None;
        } else if trimmed.starts_with("</fileobject") {
            if !in_object {
                bail!("malformed report: stray </fileobject>");
            }
            let (Some(name), Some(_), Some((offset, len))) =
                (name.take(), size.take(), run.take())
            else {
                bail!("malformed report: incomplete fileobject");
            };
            let ext = name.rsplit('.').next().unwrap_or("").to_string();
            out.push(FileInfo {
                name,
                ext,
                offset,
                size: len,
            });
            in_object = false;
        } else if in_object {
            if let Some(text) = text_between(trimmed, "<filename>", "</filename>") {
                name = Some(unescape_xml(text));
            } else if let Some(text) = text_between(trimmed, "<filesize>", "</filesize>") {
                size = Some(text.parse().context("malformed report: filesize")?);
            } else if trimmed.starts_with("<byte_run") {
                let offset = attr_value(trimmed, "img_offset")
                    .or_else(|| attr_value(trimmed, "offset"))
                    .context("malformed report: byte_run offset")?;
                let len =
                    attr_value(trimmed, "len").context("malformed report: byte_run length")?;
                if run.is_none() {
                    run = Some((offset, len));
                }
            }
        }
    }

    if !saw_root {
        bail!("malformed report: missing <dfxml> root");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn sample_infos() -> Vec<FileInfo> {
        vec![
            FileInfo {
                name: "f0.png".into(),
                ext: "png".into(),
                offset: 0,
                size: 321,
            },
            FileInfo {
                name: "f16.jpeg".into(),
                ext: "jpeg".into(),
                offset: 8192,
                size: 1044,
            },
        ]
    }

    fn write_report(infos: &[FileInfo]) -> String {
        let mut buf = Vec::new();
        let mut w = DfxmlWriter::new(&mut buf);
        w.write_header(&SourceInfo {
            image_filename: "disk.img".into(),
            sector_size: 512,
            image_size: 1 << 20,
        })
        .unwrap();
        for info in infos {
            w.write_file_object(info).unwrap();
        }
        w.close().unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_report_structure() {
        let xml = write_report(&sample_infos());
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<dfxml xmloutputversion="1.0">"#));
        assert!(xml.contains("<dc:type>Carve Report</dc:type>"));
        assert!(xml.contains("<image_filename>disk.img</image_filename>"));
        assert!(xml.contains("<sectorsize>512</sectorsize>"));
        assert!(xml.contains(r#"<byte_run offset="8192" img_offset="8192" len="1044"/>"#));
        assert!(xml.trim_end().ends_with("</dfxml>"));
    }

    #[test]
    fn test_write_read_round_trip() {
        let infos = sample_infos();
        let xml = write_report(&infos);
        let parsed = read_file_objects(BufReader::new(xml.as_bytes())).unwrap();

        assert_eq!(parsed.len(), infos.len());
        for (got, want) in parsed.iter().zip(&infos) {
            assert_eq!(got.name, want.name);
            assert_eq!(got.offset, want.offset);
            assert_eq!(got.size, want.size);
            assert_eq!(got.ext, want.ext);
        }
    }

    #[test]
    fn test_filename_escaping_round_trip() {
        let infos = vec![FileInfo {
            name: "weird <&> name.png".into(),
            ext: "png".into(),
            offset: 512,
            size: 100,
        }];
        let xml = write_report(&infos);
        let parsed = read_file_objects(BufReader::new(xml.as_bytes())).unwrap();
        assert_eq!(parsed[0].name, "weird <&> name.png");
    }

    #[test]
    fn test_missing_root_rejected() {
        let err = read_file_objects(BufReader::new("not xml at all".as_bytes()));
        assert!(err.is_err());
    }

    #[test]
    fn test_incomplete_fileobject_rejected() {
        let xml = "<dfxml>\n<fileobject>\n<filename>f.png</filename>\n</fileobject>\n</dfxml>";
        assert!(read_file_objects(BufReader::new(xml.as_bytes())).is_err());
    }
}
