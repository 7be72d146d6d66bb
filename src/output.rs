use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::markdown::write_markdown;
use crate::model::Document;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Markdown,
}

impl FromStr for Format {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "markdown" | "md" => Ok(Format::Markdown),
            other => Err(AppError::InvalidFormat(other.to_string())),
        }
    }
}

pub fn write_json<W: Write>(document: &Document, writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, document)
        .map_err(|e| AppError::JsonSerialize(e.to_string()))?;
    writeln!(writer)?;
    Ok(())
}

fn write_to<W: Write>(document: &Document, format: Format, writer: &mut W) -> Result<()> {
    match format {
        Format::Json => write_json(document, writer),
        Format::Markdown => write_markdown(document, writer).map_err(AppError::from),
    }
}

/// Write `document` to `path`, or to stdout when no path is given.
pub fn write_document(document: &Document, format: Format, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        write_to(document, format, &mut writer)?;
        return writer.flush().map_err(AppError::from);
    };

    let write_error = |source| AppError::WriteFile {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    write_to(document, format, &mut writer).map_err(|e| match e {
        AppError::Io(source) => write_error(source),
        other => other,
    })?;
    writer.flush().map_err(write_error)
}
