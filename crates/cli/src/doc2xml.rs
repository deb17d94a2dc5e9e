//! doc2xml - Reconstruct an XML document model from a drawing trace
//!
//! A command line tool that replays a recorded drawing-primitive
//! trace (JSON) through the converter, producing an XML layout file
//! in the current directory plus side-car picture files.

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use marquez_core::engine::convert_events;
use marquez_core::event::{DestResolver, DocEvent, ExplicitDest};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Reconstructs an XML layout document from a recorded drawing trace.
#[derive(Parser, Debug)]
#[command(name = "doc2xml")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the recorded drawing trace (JSON)
    file: PathBuf,

    /// Remove control characters from XML output
    #[arg(short = 'S', long = "strip-control", action = ArgAction::SetTrue)]
    strip_control: bool,
}

/// A recorded drawing trace: the event stream plus the two
/// document-level lookup tables the upstream engine would answer live.
#[derive(Debug, Deserialize)]
struct Trace {
    /// Name table for named destinations.
    #[serde(default)]
    named_destinations: HashMap<String, ExplicitDest>,
    /// Page-tree mapping from indirect object number to 1-based page
    /// number.
    #[serde(default)]
    page_objects: HashMap<u32, u32>,
    events: Vec<DocEvent>,
}

/// Destination lookups backed by the trace's recorded tables.
struct TraceDests {
    named: HashMap<String, ExplicitDest>,
    pages: HashMap<u32, u32>,
}

impl DestResolver for TraceDests {
    fn named_destination(&self, name: &str) -> Option<ExplicitDest> {
        self.named.get(name).copied()
    }

    fn resolve_page_object(&self, object_id: u32) -> Option<u32> {
        self.pages.get(&object_id).copied()
    }
}

/// Derives the output file name and the picture base name from the
/// input path. The directory is stripped; a 3-character extension
/// (a `.` four bytes from the end) is replaced by `xml` and dropped
/// from the picture base, any other name gets `.xml` appended and
/// keeps its full form as the picture base.
fn derive_names(input: &Path) -> Option<(String, String)> {
    let name = input.file_name()?.to_string_lossy();
    let bytes = name.as_bytes();
    if bytes.len() >= 4 && bytes[bytes.len() - 4] == b'.' {
        let stem = &name[..name.len() - 4];
        Some((format!("{stem}.xml"), stem.to_string()))
    } else {
        Some((format!("{name}.xml"), name.into_owned()))
    }
}

fn process_file(path: &Path, strip_control: bool) -> Result<(), Box<dyn std::error::Error>> {
    let Some((xml_name, picture_base)) = derive_names(path) else {
        return Err(format!("not a file path: {}", path.display()).into());
    };

    let data = std::fs::read(path)?;
    let trace: Trace = serde_json::from_slice(&data)?;
    let dests = TraceDests {
        named: trace.named_destinations,
        pages: trace.page_objects,
    };

    convert_events(
        trace.events,
        &dests,
        Path::new(&xml_name),
        &picture_base,
        strip_control,
    )?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let help = matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = e.print();
            if help {
                return Ok(());
            }
            std::process::exit(1);
        }
    };

    if !args.file.exists() {
        eprintln!("Error: File not found: {}", args.file.display());
        std::process::exit(1);
    }

    if let Err(e) = process_file(&args.file, args.strip_control) {
        eprintln!("Error processing {}: {}", args.file.display(), e);
        std::process::exit(1);
    }

    Ok(())
}
