use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::record::Record;

pub const HEADER: [&str; 10] = [
    "title",
    "speaker",
    "num_views",
    "summary",
    "date",
    "tags",
    "num_translations",
    "transcript",
    "num_comments",
    "video_url",
];

/// Separator between tags inside the single `tags` cell.
pub const TAG_SEPARATOR: &str = "|";

pub trait RecordSink {
    fn write(&mut self, record: &Record) -> Result<()>;
}

/// Comma-separated output; the header goes out on construction, each record
/// is flushed as soon as it is written. Rows end in `\n`, not `\r\n`.
pub struct CsvSink<W: Write> {
    out: W,
}

impl CsvSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        CsvSink::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut out: W) -> Result<Self> {
        write_row(&mut out, &HEADER[..]).context("Failed to write CSV header")?;
        out.flush()?;
        Ok(CsvSink { out })
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write(&mut self, record: &Record) -> Result<()> {
        let cells = to_cells(record);
        write_row(&mut self.out, &cells[..]).context("Failed to write CSV row")?;
        self.out.flush().context("Failed to flush CSV row")?;
        Ok(())
    }
}

/// Cells in `HEADER` order; absent values are empty.
pub fn to_cells(r: &Record) -> [String; 10] {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        r.title.clone(),
        r.speaker.clone(),
        opt(&r.num_views),
        opt(&r.summary),
        r.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        r.tags.as_ref().map(|t| t.join(TAG_SEPARATOR)).unwrap_or_default(),
        opt(&r.num_translations),
        opt(&r.transcript),
        opt(&r.num_comments),
        r.video_url.clone(),
    ]
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write, S: AsRef<str>>(w: &mut W, row: &[S]) -> std::io::Result<()> {
    let mut first = true;
    for cell in row {
        let cell = cell.as_ref();
        if !first { write!(w, ",")?; } else { first = false; }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}
