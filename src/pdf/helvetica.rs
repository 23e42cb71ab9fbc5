//! Metrics for the standard-14 Helvetica-Bold face under WinAnsiEncoding.
//!
//! Widths are the AFM advances in 1/1000 em. The face is never embedded, so
//! these numbers are exactly what a viewer uses to lay out the drawn run.

use thiserror::Error;

use crate::placement::TextMeasure;

pub const BASE_FONT: &str = "Helvetica-Bold";

const ASCENDER: f64 = 718.0;
const DESCENDER: f64 = -207.0;

#[derive(Debug, Error, PartialEq)]
#[error("character {ch:?} (U+{code:04X}) has no glyph in {font} with WinAnsiEncoding")]
pub struct Unencodable {
    pub ch: char,
    pub code: u32,
    pub font: &'static str,
}

/// Advances for codes 0x20..=0x7E.
const ASCII_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0x30
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 0x50
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // 0x60
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 0x70
];

/// Advances for codes 0xA0..=0xFF (Latin-1 block of WinAnsi).
const LATIN1_WIDTHS: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 0xA0
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 0xB0
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 0xC0
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 0xD0
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278, // 0xE0
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556, // 0xF0
];

/// WinAnsi code points 0x80..=0x9F that differ from Latin-1, with advances.
const WIN_ANSI_EXTRAS: [(char, u8, u16); 27] = [
    ('€', 0x80, 556),
    ('‚', 0x82, 278),
    ('ƒ', 0x83, 556),
    ('„', 0x84, 500),
    ('…', 0x85, 1000),
    ('†', 0x86, 556),
    ('‡', 0x87, 556),
    ('ˆ', 0x88, 333),
    ('‰', 0x89, 1000),
    ('Š', 0x8A, 667),
    ('‹', 0x8B, 333),
    ('Œ', 0x8C, 1000),
    ('Ž', 0x8E, 611),
    ('‘', 0x91, 278),
    ('’', 0x92, 278),
    ('“', 0x93, 500),
    ('”', 0x94, 500),
    ('•', 0x95, 350),
    ('–', 0x96, 556),
    ('—', 0x97, 1000),
    ('˜', 0x98, 333),
    ('™', 0x99, 1000),
    ('š', 0x9A, 556),
    ('›', 0x9B, 333),
    ('œ', 0x9C, 944),
    ('ž', 0x9E, 500),
    ('Ÿ', 0x9F, 667),
];

/// WinAnsi byte and advance for `ch`.
fn glyph(ch: char) -> Result<(u8, u16), Unencodable> {
    let code = u32::from(ch);
    match code {
        0x20..=0x7E => Ok((code as u8, ASCII_WIDTHS[(code - 0x20) as usize])),
        0xA0..=0xFF => Ok((code as u8, LATIN1_WIDTHS[(code - 0xA0) as usize])),
        _ => WIN_ANSI_EXTRAS
            .iter()
            .find(|(c, _, _)| *c == ch)
            .map(|(_, byte, width)| (*byte, *width))
            .ok_or(Unencodable {
                ch,
                code,
                font: BASE_FONT,
            }),
    }
}

/// Encodes `text` for a `Tj` operand. Tabs and newlines become spaces since a
/// name is always drawn as one line.
pub fn encode(text: &str) -> Result<Vec<u8>, Unencodable> {
    text.chars()
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
        .map(|ch| glyph(ch).map(|(byte, _)| byte))
        .collect()
}

/// The face used both to measure and to draw names.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelveticaBold;

impl TextMeasure for HelveticaBold {
    type Error = Unencodable;

    fn text_width(&self, text: &str, font_size: f64) -> Result<f64, Unencodable> {
        let mut units = 0u32;
        for ch in text.chars() {
            let ch = if ch.is_whitespace() { ' ' } else { ch };
            units += u32::from(glyph(ch)?.1);
        }
        Ok(f64::from(units) * font_size / 1000.0)
    }

    fn line_height(&self, font_size: f64) -> f64 {
        (ASCENDER - DESCENDER) / 1000.0 * font_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_the_afm() {
        let font = HelveticaBold;
        // H=722 e=556 l=278 l=278 o=611
        assert_eq!(font.text_width("Hello", 1000.0), Ok(2445.0));
        assert!((font.text_width("Hello", 24.0).unwrap() - 58.68).abs() < 1e-9);
        assert_eq!(font.text_width("", 36.0), Ok(0.0));
        assert_eq!(font.text_width("é", 1000.0), Ok(556.0));
        assert_eq!(font.text_width("Ž", 1000.0), Ok(611.0));
    }

    #[test]
    fn line_height_spans_ascender_to_descender() {
        assert!((HelveticaBold.line_height(36.0) - 33.3).abs() < 1e-9);
    }

    #[test]
    fn encoding_uses_win_ansi_bytes() {
        assert_eq!(encode("Zoë"), Ok(vec![b'Z', b'o', 0xEB]));
        assert_eq!(encode("A\tB"), Ok(vec![b'A', b' ', b'B']));
        assert_eq!(encode("“Q”"), Ok(vec![0x93, b'Q', 0x94]));
    }

    #[test]
    fn characters_outside_win_ansi_fail() {
        let err = encode("王").unwrap_err();
        assert_eq!(err.ch, '王');
        assert!(HelveticaBold.text_width("Ana 王", 12.0).is_err());
    }
}
