// src/matching/gender.rs - Gender marker normalization and the compatibility gate

use crate::models::matching::Gender;

/// Values that mean "not recorded".
const NULL_MARKERS: [&str; 6] = ["", "null", "none", "nan", "n/a", "-"];

// Devanagari markers match anywhere in the value. Female runs first: "म"
// never occurs in the male markers, while "female" contains "male".
const FEMALE_DEVANAGARI: [&str; 4] = ["महिला", "स्त्री", "मह", "म"];
const FEMALE_LATIN: [&str; 2] = ["female", "woman"];
const FEMALE_LETTERS: [&str; 2] = ["f", "w"];

const MALE_DEVANAGARI: [&str; 2] = ["पुरुष", "पु"];
const MALE_LATIN: [&str; 1] = ["male"];
const MALE_LETTERS: [&str; 1] = ["m"];

const OTHER_MARKERS: [&str; 5] = ["तृतीय", "किन्नर", "third", "transgender", "other"];
const OTHER_LETTERS: [&str; 1] = ["tg"];

/// Raw values seen on real rolls, used by the `gender-check` diagnostics.
pub const GENDER_SAMPLE_VALUES: [Option<&str>; 13] = [
    Some("पु"),
    Some("म"),
    None,
    Some("५"),
    Some("0"),
    Some("पुरुष"),
    Some("महिला"),
    Some("तृतीय लिंग"),
    Some("42 लिंग:पु"),
    Some("75 लिंग:पु"),
    Some("69 लिंग:मह"),
    Some("MALE"),
    Some("FEMALE"),
];

/// Maps a free-text gender column onto the four canonical values.
pub fn normalize_gender(raw: Option<&str>) -> Gender {
    let value = match raw {
        Some(v) => v.trim().to_lowercase(),
        None => return Gender::Unknown,
    };
    if NULL_MARKERS.contains(&value.as_str()) {
        return Gender::Unknown;
    }

    let tokens: Vec<&str> = value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has_substring = |markers: &[&str]| markers.iter().any(|m| value.contains(m));
    let has_token = |letters: &[&str]| letters.iter().any(|l| tokens.contains(l));

    if has_substring(&FEMALE_DEVANAGARI) || has_substring(&FEMALE_LATIN) || has_token(&FEMALE_LETTERS) {
        Gender::Female
    } else if has_substring(&MALE_DEVANAGARI) || has_substring(&MALE_LATIN) || has_token(&MALE_LETTERS) {
        Gender::Male
    } else if has_substring(&OTHER_MARKERS) || has_token(&OTHER_LETTERS) {
        Gender::Other
    } else {
        Gender::Unknown
    }
}

/// Two records may merge unless both genders are known and differ.
pub fn genders_compatible(g1: Gender, g2: Gender) -> bool {
    g1 == Gender::Unknown || g2 == Gender::Unknown || g1 == g2
}
