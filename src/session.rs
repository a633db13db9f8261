//! Compile a batch of format lines in one isolated session.
//!
//! A [`Session`] collects format lines (added directly or loaded from a
//! file), then resolves them all at once: the block-size pass sizes
//! every spec, the largest aggregate becomes the session's block size,
//! and every unit is rewritten against it. The result is a read-only
//! [`FormatList`] for a renderer to execute; nothing is handed out if
//! any line fails to compile.
//!
//! ```
//! # use dumpformat::session::Session;
//! let mut session = Session::new();
//! session.add("\"%08_ax  \" 8/2 \"%04x \" \"\\n\"").unwrap();
//! let formats = session.compile().unwrap();
//! assert_eq!(formats.block_size(), 16);
//! ```
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::dump_error::DResult;
use crate::format_specs::{is_format_space, FormatSpec, FormatUnit};
use crate::rewrite;

/// An in-progress compilation run.
///
/// Sessions are independent: nothing is shared between runs, so
/// compiling the same lines in two sessions yields equal results.
#[derive(Debug, Default)]
pub struct Session {
    specs: Vec<FormatSpec>,
}

impl Session {
    pub fn new() -> Self {
        Session { specs: Vec::new() }
    }

    /// Parse one format line and append it to the session.
    pub fn add(&mut self, line: &str) -> DResult<()> {
        self.specs.push(FormatSpec::parse(line)?);
        Ok(())
    }

    /// Read format lines from `reader`, skipping lines that are blank
    /// or start with `#` after leading whitespace.
    pub fn add_lines(&mut self, reader: impl BufRead) -> DResult<()> {
        for line in reader.lines() {
            let line = line?;
            let rest = line.trim_start_matches(is_format_space);
            if rest.is_empty() || rest.starts_with('#') {
                continue;
            }
            self.add(&line)?;
        }
        Ok(())
    }

    /// Load format lines from the file at `path`.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> DResult<()> {
        let file = File::open(path)?;
        self.add_lines(BufReader::new(file))
    }

    /// The specs added so far, still uncompiled.
    pub fn specs(&self) -> &[FormatSpec] {
        &self.specs
    }

    /// Resolve every spec and hand back the compiled list.
    ///
    /// The target block size is the largest per-iteration byte total
    /// across all specs; the last unit of any smaller spec is repeated
    /// to tile it. Errors abort the whole run.
    pub fn compile(mut self) -> DResult<FormatList> {
        let mut block_size = 0;
        for spec in &mut self.specs {
            spec.bcount = rewrite::block_size(spec);
            block_size = block_size.max(spec.bcount);
        }

        let mut end_unit = None;
        for (si, spec) in self.specs.iter_mut().enumerate() {
            if let Some(ui) = rewrite::rewrite_spec(spec, block_size)? {
                // last marking wins across the whole run
                end_unit = Some((si, ui));
            }
        }

        Ok(FormatList {
            specs: self.specs,
            block_size,
            end_unit,
        })
    }
}

/// The output of a successful compilation: every spec with its print
/// units resolved, the session block size, and the recorded end-of-data
/// unit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FormatList {
    specs: Vec<FormatSpec>,
    block_size: usize,
    end_unit: Option<(usize, usize)>,
}

impl FormatList {
    /// The compiled specs, in the order their lines were added.
    pub fn specs(&self) -> &[FormatSpec] {
        &self.specs
    }

    /// Bytes one full display cycle consumes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The unit designated by `%_A` to run once input is exhausted.
    /// When several units were marked, this is the last one.
    pub fn end_unit(&self) -> Option<&FormatUnit> {
        let (si, ui) = self.end_unit?;
        self.specs.get(si)?.units().get(ui)
    }
}
