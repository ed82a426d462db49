//! Print the cells and conditional-formatting rules of a report workbook.
//!
//! `dump_report docket0001_results.xlsx`

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use clap::Parser;
use docket_scanner_lib::ConfidenceBand;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use thiserror::Error;
use zip::ZipArchive;

#[derive(Parser, Debug)]
#[command(name = "dump_report", about = "Show what a generated report contains")]
struct Args {
    #[arg(value_name = "XLSX")]
    path: PathBuf,

    #[arg(long, default_value = "Sheet1")]
    sheet: String,
}

#[derive(Debug, Error)]
enum DumpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("Archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML: {0}")]
    Xml(String),

    #[error("No sheet named '{0}'")]
    MissingSheet(String),
}

#[derive(Debug, Default)]
struct CfRule {
    range: String,
    kind: String,
    operator: String,
    dxf_id: Option<usize>,
    formulas: Vec<String>,
}

#[derive(Debug, Default, Clone)]
struct Dxf {
    font: Option<String>,
    fill: Option<String>,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), DumpError> {
    let bytes = std::fs::read(&args.path)?;

    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.clone()))?;
    let sheet_index = workbook
        .sheet_names()
        .iter()
        .position(|n| n == &args.sheet)
        .ok_or_else(|| DumpError::MissingSheet(args.sheet.clone()))?;
    let range = workbook.worksheet_range(&args.sheet)?;

    let mut confidence_col = None;
    for (r, row) in range.rows().enumerate() {
        if r == 0 {
            confidence_col = row
                .iter()
                .position(|c| matches!(c, Data::String(s) if s == "Confidence"));
        }
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        let band = confidence_col
            .and_then(|c| row.get(c))
            .and_then(|c| match c {
                Data::Float(f) if r > 0 => Some(ConfidenceBand::classify(*f).as_str()),
                _ => None,
            });
        match band {
            Some(band) => println!("{:>3}  {}  [{}]", r + 1, cells.join(" | "), band),
            None => println!("{:>3}  {}", r + 1, cells.join(" | ")),
        }
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let sheet_xml = read_entry(
        &mut archive,
        &format!("xl/worksheets/sheet{}.xml", sheet_index + 1),
    )?;
    let styles_xml = read_entry(&mut archive, "xl/styles.xml")?;
    let dxfs = parse_dxfs(&styles_xml)?;

    println!();
    for rule in parse_cf_rules(&sheet_xml)? {
        let style = rule
            .dxf_id
            .and_then(|i| dxfs.get(i))
            .cloned()
            .unwrap_or_default();
        println!(
            "{}  {} {}  {}  fill={} font={}",
            rule.range,
            rule.kind,
            rule.operator,
            rule.formulas.join(", "),
            style.fill.as_deref().unwrap_or("-"),
            style.font.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, DumpError> {
    let mut entry = archive.by_name(name)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_cf_rules(xml: &str) -> Result<Vec<CfRule>, DumpError> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rules = Vec::new();
    let mut range = String::new();
    let mut current: Option<CfRule> = None;
    let mut in_formula = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"conditionalFormatting" => range = attr(&e, b"sqref").unwrap_or_default(),
                b"cfRule" => {
                    if let Some(done) = current.take() {
                        rules.push(done);
                    }
                    current = Some(CfRule {
                        range: range.clone(),
                        kind: attr(&e, b"type").unwrap_or_default(),
                        operator: attr(&e, b"operator").unwrap_or_default(),
                        dxf_id: attr(&e, b"dxfId").and_then(|v| v.parse().ok()),
                        formulas: Vec::new(),
                    });
                }
                b"formula" => in_formula = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_formula => {
                let text = t.unescape().map_err(|e| DumpError::Xml(e.to_string()))?;
                if let Some(rule) = current.as_mut() {
                    rule.formulas.push(text.into_owned());
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"formula" => in_formula = false,
                b"cfRule" => {
                    if let Some(done) = current.take() {
                        rules.push(done);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DumpError::Xml(e.to_string())),
            _ => {}
        }
    }
    if let Some(done) = current.take() {
        rules.push(done);
    }
    Ok(rules)
}

/// Differential formats in `dxfId` order.
fn parse_dxfs(xml: &str) -> Result<Vec<Dxf>, DumpError> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut dxfs = Vec::new();
    let mut current: Option<Dxf> = None;
    let mut in_font = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"dxf" => current = Some(Dxf::default()),
                b"font" => in_font = true,
                b"color" if in_font => {
                    if let Some(dxf) = current.as_mut() {
                        dxf.font = attr(&e, b"rgb");
                    }
                }
                b"bgColor" => {
                    if let Some(dxf) = current.as_mut() {
                        dxf.fill = attr(&e, b"rgb");
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"font" => in_font = false,
                b"dxf" => {
                    if let Some(done) = current.take() {
                        dxfs.push(done);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DumpError::Xml(e.to_string())),
            _ => {}
        }
    }
    Ok(dxfs)
}
