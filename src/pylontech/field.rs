use nom::{
    bytes::complete::tag_no_case,
    character::complete::i64 as integer,
    combinator::{all_consuming, opt},
    sequence::terminated,
    IResult,
};

/// Signed integer, optionally followed by a unit suffix: `-1500mA`, `95%`.
pub fn number(input: &str, suffix: &str) -> Option<i64> {
    let result: IResult<&str, i64> =
        all_consuming(terminated(integer, opt(tag_no_case(suffix))))(input.trim());

    result.ok().map(|(_, value)| value)
}

/// Console labels vary in spacing and case between firmware versions
/// ("Soft  version", "Dischg Curr"), compare them in a normalised form.
pub fn normalise_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

pub fn flag(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "on" | "1" | "true" => Some(true),
        "n" | "no" | "off" | "0" | "false" => Some(false),
        _ => None,
    }
}
