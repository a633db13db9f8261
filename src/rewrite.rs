//! Resolve parsed format units into executable print units.
//!
//! This is the back half of compilation: each unit's text is split into
//! [`PrintUnit`]s (one per `%`-conversion, keeping any literal prefix),
//! conversion syntax is canonicalized, byte widths are validated per
//! conversion class, and the last unit of a spec is re-repeated to tile
//! the session's block size.

use crate::dump_error::{DResult, DumpError};
use crate::format_specs::{is_format_space, FormatSpec, FormatUnit, PrintClass, PrintUnit};

/// Printf specifier characters: the precision dot, flags, and width
/// digits.
const SPEC_CHARS: &[u8] = b".#-+ 0123456789";

/// The same set without the precision dot.
const FLAG_CHARS: &[u8] = b"#-+ 0123456789";

/// Bytes consumed by one iteration of the spec.
///
/// Units with an explicit byte count contribute `count * reps`; the
/// rest are scanned for conversions: `c` and the `_c`/`_p`/`_u`
/// extensions read one byte, integer conversions four, floating-point
/// eight, `%s` its own precision (zero when absent). Address
/// conversions and anything unrecognized contribute nothing; bad
/// conversions are reported later, by [`rewrite_spec`].
pub(crate) fn block_size(spec: &FormatSpec) -> usize {
    let mut cursize = 0;

    for fu in &spec.units {
        if let Some(b) = fu.bcount {
            cursize += b * fu.reps;
            continue;
        }

        let bytes = fu.text.as_bytes();
        let mut bcnt = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'%' {
                i += 1;
                continue;
            }
            i += 1;
            while i < bytes.len() && FLAG_CHARS.contains(&bytes[i]) {
                i += 1;
            }
            let mut prec = 0;
            if i < bytes.len() && bytes[i] == b'.' {
                i += 1;
                if i < bytes.len() && bytes[i].is_ascii_digit() {
                    let ds = i;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    prec = fu.text[ds..i].parse().unwrap_or(0);
                }
            }
            if i >= bytes.len() {
                break;
            }
            match bytes[i] {
                b'c' => bcnt += 1,
                b'd' | b'i' | b'o' | b'u' | b'x' | b'X' => bcnt += 4,
                b'e' | b'E' | b'f' | b'g' | b'G' => bcnt += 8,
                b's' => bcnt += prec,
                b'_' => {
                    i += 1;
                    if i < bytes.len() && matches!(bytes[i], b'c' | b'p' | b'u') {
                        bcnt += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        cursize += bcnt * fu.reps;
    }

    cursize
}

/// Rewrite every unit of `spec` into print units, then tile the last
/// unit against `block_size`.
///
/// Returns the index of the last unit marked as the end-of-data format
/// by a `%_A` conversion, if any; the caller keeps the last one seen
/// across the whole run.
pub(crate) fn rewrite_spec(spec: &mut FormatSpec, block_size: usize) -> DResult<Option<usize>> {
    let mut end_unit = None;
    for (i, fu) in spec.units.iter_mut().enumerate() {
        if rewrite_unit(fu)? {
            end_unit = Some(i);
        }
    }

    // If the spec interprets fewer bytes than the block holds and its
    // last unit has an implicit repetition count, repeat that unit as
    // often as needed to consume the rest of the block. A final count
    // above one also marks the unit's trailing separator so the last
    // repetition does not end the row with it.
    let spec_bytes = spec.bcount;
    if let Some(fu) = spec.units.last_mut() {
        let unit_bytes = fu.bcount.unwrap_or(0);
        if spec_bytes < block_size && !fu.explicit_reps && unit_bytes != 0 {
            fu.reps += (block_size - spec_bytes) / unit_bytes;
        }
        if fu.reps > 1 {
            if let Some(pr) = fu.prs.last_mut() {
                pr.nospace = final_space(&pr.text);
            }
        }
    }

    Ok(end_unit)
}

/// Split one unit's text into print units; returns `true` if the unit
/// carried a `%_A` conversion.
fn rewrite_unit(fu: &mut FormatUnit) -> DResult<bool> {
    let explicit = fu.bcount;
    let src = fu.text.as_str();
    let bytes = src.as_bytes();

    let mut prs: Vec<PrintUnit> = Vec::new();
    let mut saw_end = false;
    let mut mark_ignore = false;
    let mut nconv = 0;
    let mut start = 0;

    while start < src.len() {
        let pct = match src[start..].find('%') {
            Some(off) => start + off,
            None => {
                // only literal text left
                prs.push(PrintUnit::text_only(&src[start..]));
                break;
            }
        };

        // Scan the specifier characters between the percent sign and
        // the conversion character. With an explicit byte count the
        // precision is irrelevant and the whole set is skipped;
        // otherwise a `.digits` run is captured for %s. The field
        // width, when present, is kept for the single-byte classes.
        let mut p1 = pct + 1;
        let mut prec: Option<usize> = None;
        let width;

        if explicit.is_some() {
            let span = p1;
            while p1 < bytes.len() && SPEC_CHARS.contains(&bytes[p1]) {
                p1 += 1;
            }
            let wend = match bytes[span..p1].iter().position(|b| *b == b'.') {
                Some(d) => span + d,
                None => p1,
            };
            width = trailing_digit_run(src, span, wend);
        } else {
            let span = p1;
            while p1 < bytes.len() && FLAG_CHARS.contains(&bytes[p1]) {
                p1 += 1;
            }
            width = trailing_digit_run(src, span, p1);
            if p1 < bytes.len() && bytes[p1] == b'.' {
                // the dot is consumed even when no digits follow it
                p1 += 1;
                if p1 < bytes.len() && bytes[p1].is_ascii_digit() {
                    let ds = p1;
                    while p1 < bytes.len() && bytes[p1].is_ascii_digit() {
                        p1 += 1;
                    }
                    prec = Some(src[ds..p1].parse().unwrap_or(usize::MAX));
                }
            }
        }

        let conv = match src[p1..].chars().next() {
            Some(c) => c,
            None => return Err(DumpError::BadConversion(src[pct + 1..].to_string())),
        };

        let (class, cs, bcnt, p2) = match conv {
            'c' => (
                PrintClass::Char,
                "c".to_string(),
                single_byte_width(explicit, width, &src[p1..p1 + 1])?,
                p1 + 1,
            ),
            'd' | 'i' => (
                PrintClass::Int,
                format!("q{conv}"),
                int_width(explicit, &src[p1..p1 + 1])?,
                p1 + 1,
            ),
            'o' | 'u' | 'x' | 'X' => (
                PrintClass::Uint,
                format!("q{conv}"),
                int_width(explicit, &src[p1..p1 + 1])?,
                p1 + 1,
            ),
            'e' | 'E' | 'f' | 'g' | 'G' => (
                PrintClass::Double,
                conv.to_string(),
                double_width(explicit, &src[p1..p1 + 1])?,
                p1 + 1,
            ),
            's' => (
                PrintClass::Str,
                "s".to_string(),
                match explicit.or(prec) {
                    Some(n) => n,
                    None => return Err(DumpError::BadSFormat),
                },
                p1 + 1,
            ),
            '_' => {
                let ext = src[p1 + 1..].chars().next();
                match ext {
                    Some('a') | Some('A') => {
                        if ext == Some('A') {
                            mark_ignore = true;
                            saw_end = true;
                        }
                        match src[p1 + 2..].chars().next() {
                            Some(b) if b == 'd' || b == 'o' || b == 'x' => {
                                (PrintClass::Address, format!("q{b}"), 0, p1 + 3)
                            }
                            _ => {
                                let frag: String = src[p1..].chars().take(3).collect();
                                return Err(DumpError::BadConversion(frag));
                            }
                        }
                    }
                    Some('c') => (
                        PrintClass::EscapedChar,
                        "c".to_string(),
                        single_byte_width(explicit, width, &src[p1..p1 + 2])?,
                        p1 + 2,
                    ),
                    Some('p') => (
                        PrintClass::VisibleChar,
                        "c".to_string(),
                        single_byte_width(explicit, width, &src[p1..p1 + 2])?,
                        p1 + 2,
                    ),
                    Some('u') => (
                        PrintClass::NamedChar,
                        "c".to_string(),
                        single_byte_width(explicit, width, &src[p1..p1 + 2])?,
                        p1 + 2,
                    ),
                    _ => {
                        let frag: String = src[p1..].chars().take(2).collect();
                        return Err(DumpError::BadConversion(frag));
                    }
                }
            }
            other => return Err(DumpError::BadConversion(other.to_string())),
        };

        // The print unit's text carries any literal prefix, the
        // untouched flags and width, and the canonical conversion.
        let mut pr_text = String::with_capacity(p1 - start + cs.len());
        pr_text.push_str(&src[start..p1]);
        let cchar = pr_text.len();
        pr_text.push_str(&cs);
        prs.push(PrintUnit {
            class,
            bcount: bcnt,
            text: pr_text,
            cchar: Some(cchar),
            nospace: None,
        });

        if class.is_data() && explicit.is_some() {
            nconv += 1;
            if nconv > 1 {
                return Err(DumpError::MultipleConversions);
            }
        }
        start = p2;
    }

    if fu.bcount.is_none() {
        fu.bcount = Some(prs.iter().map(|pr| pr.bcount).sum());
    }
    fu.prs = prs;
    if mark_ignore {
        fu.ignore = true;
    }

    Ok(saw_end)
}

/// The digit run immediately before `end`, parsed; `None` when there
/// is no run or it is all zeros (a bare `0` is the zero-padding flag,
/// not a width).
fn trailing_digit_run(src: &str, start: usize, end: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut s = end;
    while s > start && bytes[s - 1].is_ascii_digit() {
        s -= 1;
    }
    if s == end {
        return None;
    }
    match src[s..end].parse().unwrap_or(usize::MAX) {
        0 => None,
        w => Some(w),
    }
}

// The single-byte conversions read exactly one input byte, so both the
// unit's byte count and a field width must be 1 when given.
fn single_byte_width(
    explicit: Option<usize>,
    width: Option<usize>,
    frag: &str,
) -> DResult<usize> {
    match (explicit, width) {
        (None, None) | (None, Some(1)) | (Some(1), None) | (Some(1), Some(1)) => Ok(1),
        _ => Err(DumpError::BadByteCount(frag.to_string())),
    }
}

fn int_width(explicit: Option<usize>, frag: &str) -> DResult<usize> {
    match explicit {
        None => Ok(4),
        Some(n) if n == 1 || n == 2 || n == 4 || n == 8 => Ok(n),
        Some(_) => Err(DumpError::BadByteCount(frag.to_string())),
    }
}

fn double_width(explicit: Option<usize>, frag: &str) -> DResult<usize> {
    match explicit {
        None => Ok(8),
        Some(n) if n == 4 || n == 8 => Ok(n),
        Some(_) => Err(DumpError::BadByteCount(frag.to_string())),
    }
}

/// Index of the text's final character when it is whitespace; the
/// renderer truncates there on the unit's last repetition.
fn final_space(text: &str) -> Option<usize> {
    let mut last = None;
    for (i, c) in text.char_indices() {
        last = if is_format_space(c) { Some(i) } else { None };
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(line: &str) -> DResult<FormatSpec> {
        let mut spec = FormatSpec::parse(line)?;
        spec.bcount = block_size(&spec);
        let bs = spec.bcount;
        rewrite_spec(&mut spec, bs)?;
        Ok(spec)
    }

    fn one_unit(line: &str) -> DResult<FormatUnit> {
        let spec = compiled(line)?;
        assert_eq!(spec.units().len(), 1, "Parsing {line:?} did not return exactly 1 unit");
        Ok(spec.units()[0].clone())
    }

    #[test]
    fn int_gets_wide_prefix_and_default_width() -> DResult<()> {
        let fu = one_unit("\"%d \"")?;
        assert_eq!(fu.print_units().len(), 2);

        let pr = &fu.print_units()[0];
        assert_eq!(pr.class(), PrintClass::Int);
        assert_eq!(pr.byte_count(), 4);
        assert_eq!(pr.text(), "%qd");
        assert_eq!(pr.conversion_offset(), Some(1));

        let tail = &fu.print_units()[1];
        assert_eq!(tail.class(), PrintClass::Text);
        assert_eq!(tail.text(), " ");
        assert_eq!(tail.byte_count(), 0);

        assert_eq!(fu.byte_count(), Some(4));
        Ok(())
    }

    #[test]
    fn explicit_reps_survive_compilation() -> DResult<()> {
        let fu = one_unit("3 \"%d \"")?;
        assert_eq!(fu.reps(), 3);
        assert!(fu.explicit_reps());
        assert_eq!(fu.byte_count(), Some(4), "inferred, not explicit");

        let pr = &fu.print_units()[0];
        assert_eq!(pr.class(), PrintClass::Int);
        assert_eq!(pr.byte_count(), 4);
        Ok(())
    }

    #[test]
    fn flags_and_width_are_kept_in_front_of_the_rewrite() -> DResult<()> {
        let fu = one_unit("\"%08x\"")?;
        let pr = &fu.print_units()[0];
        assert_eq!(pr.class(), PrintClass::Uint);
        assert_eq!(pr.text(), "%08qx");
        assert_eq!(pr.conversion_offset(), Some(3));
        assert_eq!(pr.byte_count(), 4, "a field width must not change the read width");
        Ok(())
    }

    #[test]
    fn explicit_integer_widths() -> DResult<()> {
        for (line, want) in [
            ("/1 \"%x\"", 1),
            ("/2 \"%o\"", 2),
            ("/4 \"%u\"", 4),
            ("/8 \"%X\"", 8),
            ("/8 \"%i\"", 8),
        ] {
            let fu = one_unit(line)?;
            assert_eq!(fu.print_units()[0].byte_count(), want, "Parsing {line:?} failed");
        }
        Ok(())
    }

    #[test]
    fn bad_integer_width() {
        let e = one_unit("/3 \"%d\"");
        assert!(matches!(e, Err(DumpError::BadByteCount(frag)) if frag == "d"));
    }

    #[test]
    fn double_widths() -> DResult<()> {
        assert_eq!(one_unit("\"%f\"")?.print_units()[0].byte_count(), 8);
        assert_eq!(one_unit("/4 \"%e\"")?.print_units()[0].byte_count(), 4);
        assert_eq!(one_unit("\"%G\"")?.print_units()[0].class(), PrintClass::Double);

        let e = one_unit("/2 \"%g\"");
        assert!(matches!(e, Err(DumpError::BadByteCount(_))));
        Ok(())
    }

    #[test]
    fn char_reads_one_byte() -> DResult<()> {
        assert_eq!(one_unit("\"%c\"")?.print_units()[0].byte_count(), 1);
        assert_eq!(one_unit("/1 \"%c\"")?.print_units()[0].byte_count(), 1);

        let e = one_unit("/2 \"%c\"");
        assert!(matches!(e, Err(DumpError::BadByteCount(frag)) if frag == "c"));
        Ok(())
    }

    #[test]
    fn single_byte_extensions() -> DResult<()> {
        for (line, class) in [
            ("\"%_c\"", PrintClass::EscapedChar),
            ("\"%_p\"", PrintClass::VisibleChar),
            ("\"%_u\"", PrintClass::NamedChar),
        ] {
            let fu = one_unit(line)?;
            let pr = &fu.print_units()[0];
            assert_eq!(pr.class(), class, "Parsing {line:?} failed");
            assert_eq!(pr.byte_count(), 1);
            assert_eq!(pr.text(), "%c", "extensions canonicalize to a char conversion");
        }
        Ok(())
    }

    #[test]
    fn extension_width_must_be_one() {
        let e = one_unit("\"%3_u\"");
        assert!(matches!(e, Err(DumpError::BadByteCount(frag)) if frag == "_u"));

        let e = one_unit("/2 \"%_p\"");
        assert!(matches!(e, Err(DumpError::BadByteCount(frag)) if frag == "_p"));

        assert!(one_unit("\"%1_u\"").is_ok());
    }

    #[test]
    fn string_needs_precision_or_byte_count() -> DResult<()> {
        let e = one_unit("\"%s\"");
        assert!(matches!(e, Err(DumpError::BadSFormat)));

        assert_eq!(one_unit("\"%.5s\"")?.print_units()[0].byte_count(), 5);
        assert_eq!(one_unit("/12 \"%s\"")?.print_units()[0].byte_count(), 12);
        // an explicit count wins over the precision
        assert_eq!(one_unit("/12 \"%.5s\"")?.print_units()[0].byte_count(), 12);
        Ok(())
    }

    #[test]
    fn dot_without_digits_is_consumed() {
        // `%.s` scans as a precision-less %s, which still fails
        let e = one_unit("\"%.s\"");
        assert!(matches!(e, Err(DumpError::BadSFormat)));
    }

    #[test]
    fn address_conversions() -> DResult<()> {
        let fu = one_unit("\"%08_ax\"")?;
        let pr = &fu.print_units()[0];
        assert_eq!(pr.class(), PrintClass::Address);
        assert_eq!(pr.text(), "%08qx");
        assert_eq!(pr.conversion_offset(), Some(3));
        assert_eq!(pr.byte_count(), 0, "address conversions consume no input");
        assert!(!fu.ignored());
        assert_eq!(fu.byte_count(), Some(0));
        Ok(())
    }

    #[test]
    fn end_of_data_marking() -> DResult<()> {
        let mut spec = FormatSpec::parse("\"%_Ad \" \"%d\"")?;
        spec.bcount = block_size(&spec);
        let bs = spec.bcount;
        let end = rewrite_spec(&mut spec, bs)?;
        assert_eq!(end, Some(0));
        assert!(spec.units()[0].ignored());
        assert!(!spec.units()[1].ignored());
        Ok(())
    }

    #[test]
    fn address_needs_a_base_letter() {
        let e = one_unit("\"%_aq\"");
        assert!(matches!(e, Err(DumpError::BadConversion(frag)) if frag == "_aq"));

        let e = one_unit("\"%_a\"");
        assert!(matches!(e, Err(DumpError::BadConversion(frag)) if frag == "_a"));
    }

    #[test]
    fn unknown_conversions() {
        let e = one_unit("\"%y\"");
        assert!(matches!(e, Err(DumpError::BadConversion(frag)) if frag == "y"));

        let e = one_unit("\"%_q\"");
        assert!(matches!(e, Err(DumpError::BadConversion(frag)) if frag == "_q"));

        let e = one_unit("\"%%\"");
        assert!(matches!(e, Err(DumpError::BadConversion(frag)) if frag == "%"));

        let e = one_unit("\"abc%\"");
        assert!(matches!(e, Err(DumpError::BadConversion(_))));
    }

    #[test]
    fn one_data_conversion_per_counted_unit() -> DResult<()> {
        let e = compiled("/4 \"%d%d\"");
        assert!(matches!(e, Err(DumpError::MultipleConversions)));

        // address conversions are not data-bearing
        let fu = one_unit("/4 \"%_ax %d\"")?;
        assert_eq!(fu.print_units().len(), 2);

        // without a byte count two conversions are fine
        let fu = one_unit("\"%d%d\"")?;
        assert_eq!(fu.byte_count(), Some(8));
        Ok(())
    }

    #[test]
    fn literal_prefixes_stay_with_their_conversion() -> DResult<()> {
        let fu = one_unit("\"A: %d, %x!\"")?;
        let texts: Vec<&str> = fu.print_units().iter().map(|pr| pr.text()).collect();
        assert_eq!(texts, vec!["A: %qd", ", %qx", "!"]);
        assert_eq!(fu.print_units()[0].conversion_offset(), Some(4));
        assert_eq!(fu.print_units()[1].conversion_offset(), Some(3));
        assert_eq!(fu.print_units()[2].conversion_offset(), None);
        Ok(())
    }

    #[test]
    fn text_only_unit() -> DResult<()> {
        let fu = one_unit("\"hello\"")?;
        assert_eq!(fu.print_units().len(), 1);
        assert_eq!(fu.print_units()[0].class(), PrintClass::Text);
        assert_eq!(fu.byte_count(), Some(0));

        let fu = one_unit("\"\"")?;
        assert!(fu.print_units().is_empty());
        assert_eq!(fu.byte_count(), Some(0));
        Ok(())
    }

    #[test]
    fn block_size_tables() -> DResult<()> {
        for (line, want) in [
            ("16/1 \"%02x \"", 16),
            ("\"%d\"", 4),
            ("4 \"%d\"", 16),
            ("\"%c%c%c\"", 3),
            ("\"%.5s\"", 5),
            ("\"%s\"", 0),
            ("\"%_ad\"", 0),
            ("\"%_c%_p%_u\"", 3),
            ("\"%e%G\"", 16),
            ("2 \"%d%c\"", 10),
            ("\"no conversions\"", 0),
            ("\"%08_ax  \" 8/2 \"%04x \" \"\\n\"", 16),
        ] {
            let spec = FormatSpec::parse(line)?;
            assert_eq!(block_size(&spec), want, "Sizing {line:?} failed");
        }
        Ok(())
    }

    #[test]
    fn last_unit_tiles_the_block() -> DResult<()> {
        let mut spec = FormatSpec::parse("\"%c%c%c\"")?;
        spec.bcount = block_size(&spec);
        assert_eq!(spec.bcount, 3);

        rewrite_spec(&mut spec, 16)?;
        let fu = &spec.units()[0];
        assert_eq!(fu.reps(), 1 + (16 - 3) / 3);
        assert_eq!(fu.reps(), 5);
        Ok(())
    }

    #[test]
    fn tiling_skips_explicit_reps_and_empty_units() -> DResult<()> {
        let mut spec = FormatSpec::parse("2 \"%c \"")?;
        spec.bcount = block_size(&spec);
        rewrite_spec(&mut spec, 16)?;
        assert_eq!(spec.units()[0].reps(), 2, "explicit repetition counts are kept");

        let mut spec = FormatSpec::parse("\"abc\"")?;
        spec.bcount = block_size(&spec);
        rewrite_spec(&mut spec, 16)?;
        assert_eq!(spec.units()[0].reps(), 1, "a unit reading no bytes cannot tile");
        Ok(())
    }

    #[test]
    fn only_the_last_unit_tiles() -> DResult<()> {
        let mut spec = FormatSpec::parse("\"%c \" \"%c \"")?;
        spec.bcount = block_size(&spec);
        assert_eq!(spec.bcount, 2);

        rewrite_spec(&mut spec, 16)?;
        assert_eq!(spec.units()[0].reps(), 1);
        assert_eq!(spec.units()[1].reps(), 15);
        Ok(())
    }

    #[test]
    fn repeated_unit_drops_its_final_separator() -> DResult<()> {
        let mut spec = FormatSpec::parse("\"%c \"")?;
        spec.bcount = block_size(&spec);
        rewrite_spec(&mut spec, 16)?;

        let fu = &spec.units()[0];
        assert_eq!(fu.reps(), 16);
        let tail = fu.print_units().last().unwrap();
        assert_eq!(tail.text(), " ");
        assert_eq!(tail.trailing_space(), Some(0));
        Ok(())
    }

    #[test]
    fn unrepeated_unit_keeps_its_separator() -> DResult<()> {
        let mut spec = FormatSpec::parse("\"%c \"")?;
        spec.bcount = block_size(&spec);
        rewrite_spec(&mut spec, 1)?;

        let fu = &spec.units()[0];
        assert_eq!(fu.reps(), 1);
        assert_eq!(fu.print_units().last().unwrap().trailing_space(), None);
        Ok(())
    }

    #[test]
    fn suppression_points_at_the_final_space_only() -> DResult<()> {
        // two trailing blanks: the truncation point is the second one
        let mut spec = FormatSpec::parse("\"%02x  \"")?;
        spec.bcount = block_size(&spec);
        rewrite_spec(&mut spec, 16)?;

        let tail = spec.units()[0].print_units().last().unwrap();
        assert_eq!(tail.text(), "  ");
        assert_eq!(tail.trailing_space(), Some(1));
        Ok(())
    }

    #[test]
    fn inferred_byte_count_sums_print_units() -> DResult<()> {
        let fu = one_unit("\"%_ax %d %c \"")?;
        assert_eq!(fu.byte_count(), Some(5));
        Ok(())
    }
}
