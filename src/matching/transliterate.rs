// src/matching/transliterate.rs - ITRANS-style Devanagari romanization
//
// Output is lowercase with three placeholders left for the caller to clean:
// `M` (anusvara), `~` (chandrabindu) and `H` (visarga). Retroflex and dental
// series share one Latin spelling, long and short vowels share one letter, and
// the inherent vowel is always written.

use std::fmt;

const VIRAMA: char = '\u{094D}';
const NUKTA: char = '\u{093C}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmappedCharacter(pub char);

impl fmt::Display for UnmappedCharacter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no romanization for Devanagari code point U+{:04X}", self.0 as u32)
    }
}

impl std::error::Error for UnmappedCharacter {}

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

fn consonant(c: char) -> Option<&'static str> {
    let latin = match c {
        'क' => "k",
        'ख' => "kh",
        'ग' => "g",
        'घ' => "gh",
        'ङ' => "n",
        'च' => "ch",
        'छ' => "ch",
        'ज' => "j",
        'झ' => "jh",
        'ञ' => "n",
        'ट' => "t",
        'ठ' => "th",
        'ड' => "d",
        'ढ' => "dh",
        'ण' => "n",
        'त' => "t",
        'थ' => "th",
        'द' => "d",
        'ध' => "dh",
        'न' => "n",
        '\u{0929}' => "n",
        'प' => "p",
        'फ' => "ph",
        'ब' => "b",
        'भ' => "bh",
        'म' => "m",
        'य' => "y",
        'र' => "r",
        '\u{0931}' => "r",
        'ल' => "l",
        'ळ' => "l",
        '\u{0934}' => "l",
        'व' => "v",
        'श' => "sh",
        'ष' => "sh",
        'स' => "s",
        'ह' => "h",
        // Precomposed nukta letters
        '\u{0958}' => "k",
        '\u{0959}' => "kh",
        '\u{095A}' => "g",
        '\u{095B}' => "z",
        '\u{095C}' => "d",
        '\u{095D}' => "dh",
        '\u{095E}' => "f",
        '\u{095F}' => "y",
        _ => return None,
    };
    Some(latin)
}

fn independent_vowel(c: char) -> Option<&'static str> {
    let latin = match c {
        '\u{0904}' | 'अ' | 'आ' => "a",
        'इ' | 'ई' => "i",
        'उ' | 'ऊ' => "u",
        'ऋ' | 'ॠ' => "ri",
        'ऌ' | 'ॡ' => "li",
        'ऍ' | 'ऎ' | 'ए' => "e",
        'ऐ' => "ai",
        'ऑ' | 'ऒ' | 'ओ' => "o",
        'औ' => "au",
        _ => return None,
    };
    Some(latin)
}

fn vowel_sign(c: char) -> Option<&'static str> {
    let latin = match c {
        'ा' => "a",
        'ि' | 'ी' => "i",
        'ु' | 'ू' => "u",
        'ृ' | 'ॄ' => "ri",
        'ॢ' | 'ॣ' => "li",
        'ॅ' | 'ॆ' | 'े' => "e",
        'ै' => "ai",
        'ॉ' | 'ॊ' | 'ो' => "o",
        'ौ' => "au",
        _ => return None,
    };
    Some(latin)
}

fn other_sign(c: char) -> Option<&'static str> {
    let latin = match c {
        'ँ' => "~",
        'ं' => "M",
        'ः' => "H",
        'ऽ' => ".",
        'ॐ' => "om",
        '।' => "|",
        '॥' => "||",
        '॰' => ".",
        // Stray marks with no base consonant carry no sound of their own.
        NUKTA | VIRAMA => "",
        _ => return None,
    };
    Some(latin)
}

fn devanagari_digit(c: char) -> Option<char> {
    if ('०'..='९').contains(&c) {
        char::from_digit(c as u32 - '०' as u32, 10)
    } else {
        None
    }
}

/// Romanizes every Devanagari code point in `text`; anything outside the
/// Devanagari block is copied through unchanged.
pub fn transliterate_devanagari(text: &str) -> Result<String, UnmappedCharacter> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(base) = consonant(c) {
            out.push_str(base);
            let mut next = i + 1;
            while chars.get(next) == Some(&NUKTA) {
                next += 1;
            }
            match chars.get(next).copied() {
                Some(VIRAMA) => next += 1,
                Some(sign) => match vowel_sign(sign) {
                    Some(vowel) => {
                        out.push_str(vowel);
                        next += 1;
                    }
                    None => out.push('a'),
                },
                None => out.push('a'),
            }
            i = next;
            continue;
        }

        if let Some(vowel) = independent_vowel(c).or_else(|| vowel_sign(c)) {
            out.push_str(vowel);
        } else if let Some(sign) = other_sign(c) {
            out.push_str(sign);
        } else if let Some(digit) = devanagari_digit(c) {
            out.push(digit);
        } else if is_devanagari(c) {
            return Err(UnmappedCharacter(c));
        } else {
            out.push(c);
        }
        i += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherent_and_dependent_vowels() {
        assert_eq!(transliterate_devanagari("राम").unwrap(), "rama");
        assert_eq!(transliterate_devanagari("बिजय").unwrap(), "bijaya");
        assert_eq!(transliterate_devanagari("कुमार").unwrap(), "kumara");
        assert_eq!(transliterate_devanagari("सीता देवी").unwrap(), "sita devi");
    }

    #[test]
    fn test_virama_suppresses_inherent_vowel() {
        assert_eq!(transliterate_devanagari("कृष्ण").unwrap(), "krishna");
        assert_eq!(transliterate_devanagari("प्रसाद").unwrap(), "prasada");
    }

    #[test]
    fn test_placeholders_and_signs() {
        assert_eq!(transliterate_devanagari("गंगा").unwrap(), "gaMga");
        assert_eq!(transliterate_devanagari("दुःख").unwrap(), "duHkha");
        assert_eq!(transliterate_devanagari("चाँद").unwrap(), "cha~da");
        assert_eq!(transliterate_devanagari("राम।").unwrap(), "rama|");
    }

    #[test]
    fn test_nukta_forms() {
        // Combining nukta is skipped, precomposed forms map to their base sound.
        assert_eq!(
            transliterate_devanagari("\u{091C}\u{093C}\u{092B}\u{093C}र").unwrap(),
            "japhara"
        );
        assert_eq!(transliterate_devanagari("\u{095B}\u{095E}र").unwrap(), "zafara");
    }

    #[test]
    fn test_latin_and_digits_pass_through() {
        assert_eq!(transliterate_devanagari("vijay kumar").unwrap(), "vijay kumar");
        assert_eq!(transliterate_devanagari("वार्ड ४२").unwrap(), "varda 42");
        assert_eq!(transliterate_devanagari("").unwrap(), "");
    }

    #[test]
    fn test_unmapped_code_point_is_an_error() {
        let err = transliterate_devanagari("राम\u{0951}").unwrap_err();
        assert_eq!(err, UnmappedCharacter('\u{0951}'));
        assert!(err.to_string().contains("U+0951"));
    }
}
