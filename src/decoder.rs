//! Concrete counterexamples from the cube serialization of a state set.
//!
//! Each cube `<i:v, ...>` fixes some bits of the current half and leaves the
//! rest free. Free bits are enumerated by binary counting, rightmost bit
//! fastest, and every resulting bit string is rendered as `name=value`
//! pairs for the declared variables. The program counter is not shown.

use std::iter::Peekable;
use std::str::Chars;

use log::debug;

use crate::encoding::{Field, StateEncoding};
use crate::error::VerifyError;

/// A partial assignment of one half: `None` is a free bit.
pub type Cube = Vec<Option<bool>>;

/// Decode at most `limit` examples from `serialization`.
pub fn decode(encoding: &StateEncoding, serialization: &str, limit: usize) -> Result<Vec<String>, VerifyError> {
    let cubes = parse_cubes(serialization, encoding.half_width())?;
    let mut examples = Vec::new();
    for cube in &cubes {
        if examples.len() >= limit {
            break;
        }
        if cube.iter().all(Option::is_none) {
            examples.push(render_unconstrained(encoding));
            continue;
        }
        expand(encoding, cube, limit - examples.len(), &mut examples);
    }
    debug!("Decoded {} examples from {} cubes", examples.len(), cubes.len());
    Ok(examples)
}

/// Parse a concatenation of cubes over a half of `width` bits.
pub fn parse_cubes(serialization: &str, width: usize) -> Result<Vec<Cube>, VerifyError> {
    let mut cursor = Cursor {
        chars: serialization.chars().peekable(),
    };
    let mut cubes = Vec::new();
    while cursor.skip_spaces() {
        cursor.expect('<')?;
        let mut cube = vec![None; width];
        let mut last: Option<usize> = None;
        loop {
            cursor.skip_spaces();
            if cursor.eat('>') {
                break;
            }
            if last.is_some() {
                cursor.expect(',')?;
                cursor.skip_spaces();
            }
            let index = cursor.number()?;
            if index >= width {
                return Err(VerifyError::Decode(format!("bit index {} outside of {} bits", index, width)));
            }
            if last.is_some_and(|last| index <= last) {
                return Err(VerifyError::Decode(format!("bit index {} is not increasing", index)));
            }
            cursor.expect(':')?;
            cube[index] = Some(cursor.bit()?);
            last = Some(index);
        }
        cubes.push(cube);
    }
    Ok(cubes)
}

struct Cursor<'s> {
    chars: Peekable<Chars<'s>>,
}

impl Cursor<'_> {
    /// Skip spaces; return whether any input is left.
    fn skip_spaces(&mut self) -> bool {
        while self.chars.next_if_eq(&' ').is_some() {}
        self.chars.peek().is_some()
    }

    fn eat(&mut self, c: char) -> bool {
        self.chars.next_if_eq(&c).is_some()
    }

    fn expect(&mut self, c: char) -> Result<(), VerifyError> {
        match self.chars.next() {
            Some(found) if found == c => Ok(()),
            Some(found) => Err(VerifyError::Decode(format!("expected '{}', found '{}'", c, found))),
            None => Err(VerifyError::Decode(format!("expected '{}', found end of input", c))),
        }
    }

    fn number(&mut self) -> Result<usize, VerifyError> {
        let mut digits = String::new();
        while let Some(d) = self.chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        if digits.is_empty() {
            return Err(match self.chars.peek() {
                Some(c) => VerifyError::Decode(format!("expected bit index, found '{}'", c)),
                None => VerifyError::Decode("expected bit index, found end of input".to_string()),
            });
        }
        digits
            .parse()
            .map_err(|_| VerifyError::Decode(format!("bit index {} is too large", digits)))
    }

    fn bit(&mut self) -> Result<bool, VerifyError> {
        match self.chars.next() {
            Some('0') => Ok(false),
            Some('1') => Ok(true),
            Some(c) => Err(VerifyError::Decode(format!("bit value must be 0 or 1, found '{}'", c))),
            None => Err(VerifyError::Decode("expected bit value, found end of input".to_string())),
        }
    }
}

/// Enumerate up to `budget` assignments of the free bits of `cube`.
fn expand(encoding: &StateEncoding, cube: &[Option<bool>], budget: usize, out: &mut Vec<String>) {
    let free: Vec<usize> = (0..cube.len()).filter(|&i| cube[i].is_none()).collect();
    let mut bits: Vec<bool> = cube.iter().map(|b| b.unwrap_or(false)).collect();

    // Free positions are counted from the right, so `free.len()` can exceed 64
    // but only the low bits of a counter below `budget` are ever set.
    let total = if free.len() < 64 { 1u64 << free.len() } else { u64::MAX };
    let mut counter = 0u64;
    while counter < total && (counter as usize) < budget {
        for (j, &pos) in free.iter().rev().enumerate() {
            bits[pos] = j < 64 && (counter >> j) & 1 == 1;
        }
        out.push(render(encoding, &bits));
        counter += 1;
    }
}

fn field_value(field: &Field, bits: &[bool]) -> i16 {
    let raw = bits[field.offset..field.offset + field.width()]
        .iter()
        .fold(0u16, |acc, &b| (acc << 1) | u16::from(b));
    raw as i16
}

/// `name=value` for every declared variable.
pub fn render(encoding: &StateEncoding, bits: &[bool]) -> String {
    encoding
        .variable_fields()
        .iter()
        .map(|field| format!("{}={}", field.variable.name(), field_value(field, bits)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_unconstrained(encoding: &StateEncoding) -> String {
    encoding
        .variable_fields()
        .iter()
        .map(|field| format!("{}=*", field.variable.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::Variable;

    fn encoding(names: &[&str]) -> StateEncoding {
        let variables: Vec<_> = names.iter().map(|&n| Variable::integer(n)).collect();
        StateEncoding::new(&variables)
    }

    /// Literals of a full cube fixing the program counter to 0 and `values`.
    fn full_cube(values: &[i16]) -> String {
        let mut bits = vec![false; 8];
        for v in values {
            bits.extend((0..16).rev().map(|i| (*v as u16 >> i) & 1 == 1));
        }
        let literals: Vec<_> = bits
            .iter()
            .enumerate()
            .map(|(i, &b)| format!("{}:{}", i, u8::from(b)))
            .collect();
        format!("<{}>", literals.join(", "))
    }

    #[test]
    fn test_parse_cubes() {
        let cubes = parse_cubes("<0:1, 3:0><>", 4).unwrap();
        assert_eq!(cubes, [vec![Some(true), None, None, Some(false)], vec![None; 4]]);
        assert!(parse_cubes("", 4).unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_cubes("<0:1; 1:0>", 4), Err(VerifyError::Decode(_))));
        assert!(matches!(parse_cubes("<1:1, 1:0>", 4), Err(VerifyError::Decode(_))));
        assert!(matches!(parse_cubes("<2:1, 1:0>", 4), Err(VerifyError::Decode(_))));
        assert!(matches!(parse_cubes("<4:1>", 4), Err(VerifyError::Decode(_))));
        assert!(matches!(parse_cubes("<0:2>", 4), Err(VerifyError::Decode(_))));
        assert!(matches!(parse_cubes("<0:1", 4), Err(VerifyError::Decode(_))));
        assert!(matches!(parse_cubes("x", 4), Err(VerifyError::Decode(_))));
    }

    #[test]
    fn test_full_cube_renders_values() {
        let enc = encoding(&["a", "b"]);
        let text = full_cube(&[-19, 1019]);
        assert_eq!(decode(&enc, &text, 1000).unwrap(), ["a=-19, b=1019"]);
        let text = full_cube(&[i16::MIN, i16::MAX]);
        assert_eq!(decode(&enc, &text, 1000).unwrap(), ["a=-32768, b=32767"]);
    }

    #[test]
    fn test_free_bits_count_from_the_right() {
        let enc = encoding(&["a"]);
        // Fix the program counter and all but the two lowest bits of `a`.
        let fixed: Vec<_> = (0..22).map(|i| format!("{}:0", i)).collect();
        let text = format!("<{}>", fixed.join(", "));
        assert_eq!(decode(&enc, &text, 1000).unwrap(), ["a=0", "a=1", "a=2", "a=3"]);
        assert_eq!(decode(&enc, &text, 3).unwrap(), ["a=0", "a=1", "a=2"]);
    }

    #[test]
    fn test_limit_spans_cubes() {
        let enc = encoding(&["a"]);
        let text = format!("{}{}{}", full_cube(&[1]), full_cube(&[2]), full_cube(&[3]));
        assert_eq!(decode(&enc, &text, 2).unwrap(), ["a=1", "a=2"]);
    }

    #[test]
    fn test_wide_free_range_is_bounded() {
        let enc = encoding(&["a", "b", "c", "d", "e"]);
        let examples = decode(&enc, "<0:0>", 1000).unwrap();
        assert_eq!(examples.len(), 1000);
        assert_eq!(examples[0], "a=0, b=0, c=0, d=0, e=0");
        assert_eq!(examples[5], "a=0, b=0, c=0, d=0, e=5");
    }

    #[test]
    fn test_unconstrained_cube() {
        let enc = encoding(&["a", "b"]);
        assert_eq!(decode(&enc, "<>", 1000).unwrap(), ["a=*, b=*"]);
        assert!(decode(&enc, "", 1000).unwrap().is_empty());
    }
}
