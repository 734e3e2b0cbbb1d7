//! Spanish syllable counting
//!
//! A character automaton over one lower-case word. A syllable closes when a
//! second strong vowel arrives, when a weak vowel follows a vowel with no
//! strong vowel on either side, or when a consonant follows a vowel.

use super::readability::ReadabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Strong,
    Weak,
    Consonant,
}

fn classify(c: char) -> Option<Class> {
    match c {
        // accented i/u break a diphthong, so they behave as strong vowels
        'a' | 'e' | 'o' | 'á' | 'é' | 'ó' | 'í' | 'ú' => Some(Class::Strong),
        'i' | 'u' | 'ü' => Some(Class::Weak),
        'ñ' => Some(Class::Consonant),
        c if c.is_ascii_lowercase() => Some(Class::Consonant),
        _ => None,
    }
}

/// Count the syllables of a single word
pub fn count_syllables(word: &str) -> Result<u32, ReadabilityError> {
    let classes = word
        .chars()
        .map(|c| {
            classify(c).ok_or_else(|| ReadabilityError::UnsupportedCharacter {
                character: c,
                word: word.to_string(),
            })
        })
        .collect::<Result<Vec<Class>, _>>()?;

    let mut count = 0u32;
    let mut syllable: Vec<Class> = Vec::new();
    let has_vowel = |s: &[Class]| s.iter().any(|c| *c != Class::Consonant);

    for (idx, class) in classes.iter().copied().enumerate() {
        match class {
            Class::Strong => {
                if syllable.contains(&Class::Strong) {
                    count += 1;
                    syllable.clear();
                }
                syllable.push(class);
            }
            Class::Weak => {
                let previous_strong = syllable.last() == Some(&Class::Strong);
                let next_strong = classes.get(idx + 1) == Some(&Class::Strong);
                if !previous_strong && !next_strong && has_vowel(&syllable) {
                    count += 1;
                    syllable.clear();
                    syllable.push(class);
                } else if !previous_strong {
                    syllable.push(class);
                }
            }
            Class::Consonant => {
                if has_vowel(&syllable) {
                    count += 1;
                    syllable.clear();
                }
                syllable.push(class);
            }
        }
    }
    if has_vowel(&syllable) {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_words() {
        let cases = [
            ("casa", 2),
            ("perro", 2),
            ("ambos", 2),
            ("hola", 2),
            ("árbol", 2),
            ("bueno", 2),
            ("aire", 2),
            ("poeta", 3),
            ("sol", 1),
            ("y", 0),
            ("a", 1),
        ];
        for (word, expected) in cases {
            assert_eq!(count_syllables(word).unwrap(), expected, "syllables of {}", word);
        }
    }

    #[test]
    fn accented_weak_vowel_breaks_diphthong() {
        // dí-a
        assert_eq!(count_syllables("día").unwrap(), 2);
        // rí-o
        assert_eq!(count_syllables("río").unwrap(), 2);
        // ve-hí-cu-lo
        assert_eq!(count_syllables("vehículo").unwrap(), 4);
    }

    #[test]
    fn enye_is_a_consonant() {
        assert_eq!(count_syllables("niño").unwrap(), 2);
        assert_eq!(count_syllables("año").unwrap(), 2);
    }

    #[test]
    fn empty_word_has_no_syllables() {
        assert_eq!(count_syllables("").unwrap(), 0);
    }

    #[test]
    fn unsupported_characters_fail() {
        for word in ["Casa", "casa1", "naïve", "façade", "dos-tres"] {
            let err = count_syllables(word).unwrap_err();
            assert!(
                matches!(err, ReadabilityError::UnsupportedCharacter { .. }),
                "{} should be rejected",
                word
            );
        }
    }
}
