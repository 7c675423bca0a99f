//! Parser for gas designations as written on cylinder labels and in settings.
//!
//! # Supported Grammar
//!
//! - `Air`, `O2`, `Oxygen`
//! - Nitrox: `EAN32`, `Nx 36`, `Nitrox32`, or a bare `32` / `32%`
//! - Trimix: `Tx18/45`, `Trimix 21/35`
//! - Heliox: `Heliox 10/90`, `Hx12/88`
//!
//! Keywords are case-insensitive; figures are whole percentages.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, multispace0, u32 as whole_percent},
    combinator::{all_consuming, map, opt, value},
    sequence::{delimited, preceded, separated_pair, terminated},
    IResult, Parser,
};

use crate::error::MixError;
use crate::gas::GasMix;

/// Parse a designation such as `"EAN32"` or `"Tx18/45"` into a validated mix.
pub fn parse_designation(input: &str) -> Result<GasMix, MixError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MixError::Parse {
            input: input.to_string(),
            message: "empty designation".to_string(),
        });
    }

    match all_consuming(designation).parse(trimmed) {
        Ok((_, (o2, he))) => GasMix::from_percent(o2, he),
        Err(e) => Err(MixError::Parse {
            input: input.to_string(),
            message: format!("{:?}", e),
        }),
    }
}

fn designation(input: &str) -> IResult<&str, (u32, u32)> {
    alt((trimix, heliox, nitrox, oxygen, air, bare_percent)).parse(input)
}

fn air(input: &str) -> IResult<&str, (u32, u32)> {
    value((21, 0), tag_no_case("air")).parse(input)
}

fn oxygen(input: &str) -> IResult<&str, (u32, u32)> {
    value((100, 0), alt((tag_no_case("oxygen"), tag_no_case("o2")))).parse(input)
}

fn nitrox(input: &str) -> IResult<&str, (u32, u32)> {
    let prefix = alt((tag_no_case("nitrox"), tag_no_case("ean"), tag_no_case("nx")));
    map(
        preceded(prefix, preceded(multispace0, whole_percent)),
        |o2| (o2, 0),
    )
    .parse(input)
}

fn trimix(input: &str) -> IResult<&str, (u32, u32)> {
    let prefix = alt((tag_no_case("trimix"), tag_no_case("tx")));
    preceded(prefix, preceded(multispace0, fraction_pair)).parse(input)
}

fn heliox(input: &str) -> IResult<&str, (u32, u32)> {
    let prefix = alt((tag_no_case("heliox"), tag_no_case("hx")));
    preceded(prefix, preceded(multispace0, fraction_pair)).parse(input)
}

fn fraction_pair(input: &str) -> IResult<&str, (u32, u32)> {
    separated_pair(
        whole_percent,
        delimited(multispace0, char('/'), multispace0),
        whole_percent,
    )
    .parse(input)
}

fn bare_percent(input: &str) -> IResult<&str, (u32, u32)> {
    map(terminated(whole_percent, opt(char('%'))), |o2| (o2, 0)).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fractions(input: &str) -> (f64, f64) {
        let mix = parse_designation(input).unwrap();
        (mix.o2(), mix.he())
    }

    #[test]
    fn test_keywords() {
        assert_eq!(fractions("Air"), (0.21, 0.0));
        assert_eq!(fractions("  air "), (0.21, 0.0));
        assert_eq!(fractions("O2"), (1.0, 0.0));
        assert_eq!(fractions("oxygen"), (1.0, 0.0));
    }

    #[test]
    fn test_nitrox_forms() {
        assert_eq!(fractions("EAN32"), (0.32, 0.0));
        assert_eq!(fractions("ean 36"), (0.36, 0.0));
        assert_eq!(fractions("Nx50"), (0.5, 0.0));
        assert_eq!(fractions("Nitrox 40"), (0.4, 0.0));
        assert_eq!(fractions("28%"), (0.28, 0.0));
        assert_eq!(fractions("80"), (0.8, 0.0));
    }

    #[test]
    fn test_helium_forms() {
        assert_eq!(fractions("Tx18/45"), (0.18, 0.45));
        assert_eq!(fractions("trimix 21 / 35"), (0.21, 0.35));
        assert_eq!(fractions("Heliox 10/90"), (0.1, 0.9));
        assert_eq!(fractions("hx12/88"), (0.12, 0.88));
    }

    #[test]
    fn test_names_round_trip() {
        for name in ["Air", "O2", "EAN32", "Tx18/45", "Heliox 10/90"] {
            assert_eq!(parse_designation(name).unwrap().name(), name);
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse_designation(""),
            Err(MixError::Parse { .. })
        ));
        assert!(parse_designation("EAN").is_err());
        assert!(parse_designation("Tx18").is_err());
        assert!(parse_designation("air please").is_err());
        assert!(parse_designation("nitrogen").is_err());
    }

    #[test]
    fn test_rejects_invalid_fractions() {
        assert!(matches!(
            parse_designation("Tx60/50"),
            Err(MixError::Invalid { .. })
        ));
        assert!(matches!(
            parse_designation("EAN0"),
            Err(MixError::Invalid { .. })
        ));
    }
}
