//! Represent hexdump-style format strings as Rust types.
//!
//! One input line such as `16/1 "%02x " "\n"` is a sequence of format
//! units, each with an optional repetition count, an optional byte
//! count, and a double-quoted sub-format. Parsing a line with
//! [`FormatSpec::parse`] yields the unit structure; turning a batch of
//! parsed lines into something a renderer can execute is the job of
//! [`Session::compile`](crate::session::Session::compile), which
//! resolves byte counts and conversions into [`PrintUnit`]s.
//!
//! ```
//! # use dumpformat::format_specs::FormatSpec;
//! let spec = FormatSpec::parse("16/1 \"%02x \" \"\\n\"").unwrap();
//! assert_eq!(spec.units().len(), 2);
//! assert_eq!(spec.units()[0].reps(), 16);
//! ```
use std::fmt::Display;

use itertools::Itertools;
use pest::iterators::Pair;
use pest::Parser;

use crate::dump_error::{DResult, DumpError};
use crate::escapes;

#[derive(Parser)]
#[grammar = "dump.pest"]
pub(crate) struct DumpParser;

/// Whitespace as the format language understands it (C `isspace`).
pub(crate) fn is_format_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r')
}

/// Semantic category of one print unit.
///
/// `Text` spans carry no conversion at all. The three single-byte
/// extension kinds cover the `%_c`, `%_p`, and `%_u` conversions, which
/// all consume one input byte but render it differently: C-style
/// escapes, printable-or-dot, and US ASCII control-character names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PrintClass {
    /// Literal text with no conversion.
    Text,
    /// `%c`: one byte as a character.
    Char,
    /// `%d` / `%i`: signed integer.
    Int,
    /// `%o` / `%u` / `%x` / `%X`: unsigned integer.
    Uint,
    /// `%e` / `%E` / `%f` / `%g` / `%G`: floating point.
    Double,
    /// `%s`: a string of exactly the resolved byte count.
    Str,
    /// `%_a` / `%_A`: the current input offset; consumes no input.
    Address,
    /// `%_c`: one byte, nonprinting characters as C escapes or octal.
    EscapedChar,
    /// `%_p`: one byte, nonprinting characters as `.`.
    VisibleChar,
    /// `%_u`: one byte, control characters by their US ASCII names.
    NamedChar,
}

impl PrintClass {
    /// `true` for conversions that consume input bytes; literal text
    /// and address conversions do not.
    pub fn is_data(&self) -> bool {
        !matches!(self, PrintClass::Text | PrintClass::Address)
    }
}

impl Display for PrintClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrintClass::Text => "text",
            PrintClass::Char => "char",
            PrintClass::Int => "int",
            PrintClass::Uint => "uint",
            PrintClass::Double => "double",
            PrintClass::Str => "str",
            PrintClass::Address => "address",
            PrintClass::EscapedChar => "escaped-char",
            PrintClass::VisibleChar => "visible-char",
            PrintClass::NamedChar => "named-char",
        };

        write!(f, "{s}")
    }
}

/// One literal-text span or one resolved `%`-conversion.
///
/// The canonical text holds any literal prefix followed by the
/// rewritten conversion: integer, unsigned, and address conversions get
/// the internal wide-read prefix `q` ahead of their letter (`%d`
/// becomes `%qd`), the single-byte extensions collapse to `c`. The
/// renderer locates the conversion through [`conversion_offset`]
/// instead of re-scanning.
///
/// [`conversion_offset`]: PrintUnit::conversion_offset
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PrintUnit {
    pub(crate) class: PrintClass,
    pub(crate) bcount: usize,
    pub(crate) text: String,
    pub(crate) cchar: Option<usize>,
    pub(crate) nospace: Option<usize>,
}

impl PrintUnit {
    pub(crate) fn text_only(text: &str) -> Self {
        PrintUnit {
            class: PrintClass::Text,
            bcount: 0,
            text: text.to_string(),
            cchar: None,
            nospace: None,
        }
    }

    /// The conversion class.
    pub fn class(&self) -> PrintClass {
        self.class
    }

    /// Input bytes consumed by one application of this print unit.
    pub fn byte_count(&self) -> usize {
        self.bcount
    }

    /// The canonical text: literal prefix plus rewritten conversion.
    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// Byte offset of the canonical conversion within [`text`], or
    /// `None` for a pure text span.
    ///
    /// [`text`]: PrintUnit::text
    pub fn conversion_offset(&self) -> Option<usize> {
        self.cchar
    }

    /// Byte offset of the trailing whitespace character to suppress on
    /// the owning unit's final repetition, if any.
    pub fn trailing_space(&self) -> Option<usize> {
        self.nospace
    }
}

impl Display for PrintUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", escapes::encode(&self.text))
    }
}

/// One quoted sub-format with its optional counts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FormatUnit {
    pub(crate) reps: usize,
    pub(crate) explicit_reps: bool,
    pub(crate) ignore: bool,
    pub(crate) text: String,
    pub(crate) bcount: Option<usize>,
    pub(crate) prs: Vec<PrintUnit>,
}

impl FormatUnit {
    fn from_pair(pair: Pair<Rule>, line: &str) -> DResult<Self> {
        let mut reps = 1;
        let mut explicit_reps = false;
        let mut bcount = None;
        let mut text = String::new();

        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::reps => {
                    reps = parse_count(p.as_str(), line)?;
                    if reps == 0 {
                        // an explicit zero would break the renderer's
                        // repetition loop
                        return Err(DumpError::BadFormat(line.to_string()));
                    }
                    explicit_reps = true;
                }
                Rule::bcount => {
                    // an explicit zero byte count behaves exactly like
                    // an absent one
                    bcount = match parse_count(p.as_str(), line)? {
                        0 => None,
                        n => Some(n),
                    };
                }
                Rule::quoted => {
                    let inner = p.into_inner().next().unwrap();
                    text = escapes::resolve(inner.as_str());
                }
                _ => unreachable!(),
            }
        }

        Ok(FormatUnit {
            reps,
            explicit_reps,
            ignore: false,
            text,
            bcount,
            prs: Vec::new(),
        })
    }

    /// How many times the unit is applied per iteration of its spec.
    pub fn reps(&self) -> usize {
        self.reps
    }

    /// `true` if the repetition count was written in the format string
    /// rather than defaulted or derived.
    pub fn explicit_reps(&self) -> bool {
        self.explicit_reps
    }

    /// `true` if the unit was marked by `%_A` to run only once the
    /// input is exhausted.
    pub fn ignored(&self) -> bool {
        self.ignore
    }

    /// The unit's resolved (post-escape) text.
    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// Bytes consumed by one application of the unit: the explicit
    /// count, or after compilation the sum over its print units.
    pub fn byte_count(&self) -> Option<usize> {
        self.bcount
    }

    /// The unit's print units, in order. Empty before compilation.
    pub fn print_units(&self) -> &[PrintUnit] {
        &self.prs
    }
}

impl Display for FormatUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.explicit_reps, self.bcount) {
            (true, Some(b)) => write!(f, "{}/{b} ", self.reps)?,
            (true, None) => write!(f, "{} ", self.reps)?,
            (false, Some(b)) => write!(f, "/{b} ")?,
            (false, None) => {}
        }
        write!(f, "\"{}\"", escapes::encode(&self.text))
    }
}

/// One compiled format line: an ordered sequence of format units.
///
/// The aggregate byte count is zero until the owning session runs its
/// block-size pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FormatSpec {
    pub(crate) units: Vec<FormatUnit>,
    pub(crate) bcount: usize,
}

impl FormatSpec {
    /// Parse one format line into its units.
    ///
    /// Returns [`DumpError::BadFormat`] carrying the whole line when
    /// the line does not scan: a repetition count not followed by
    /// whitespace or `/`, a byte count not followed by whitespace, an
    /// unterminated quote, or a count too large to represent.
    pub fn parse(line: &str) -> DResult<Self> {
        let tree = DumpParser::parse(Rule::line, line)
            .map_err(|_| DumpError::BadFormat(line.to_string()))?
            .next()
            .unwrap();

        let mut units = Vec::new();
        for pair in tree.into_inner() {
            match pair.as_rule() {
                Rule::EOI => break,
                Rule::unit => units.push(FormatUnit::from_pair(pair, line)?),
                _ => unreachable!(),
            }
        }

        Ok(FormatSpec { units, bcount: 0 })
    }

    /// The spec's format units, in the order they were written.
    pub fn units(&self) -> &[FormatUnit] {
        &self.units
    }

    /// Total input bytes one iteration of this spec consumes. Zero
    /// before compilation.
    pub fn byte_count(&self) -> usize {
        self.bcount
    }
}

impl Display for FormatSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.units.iter().join(" "))
    }
}

fn parse_count(digits: &str, line: &str) -> DResult<usize> {
    digits
        .parse()
        .map_err(|_| DumpError::BadFormat(line.to_string()))
}
