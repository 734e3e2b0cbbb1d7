//! Text normalization
//!
//! Output is lower-case, one sentence per line, words separated by single
//! spaces, containing only characters of the Spanish alphabet.

/// Characters that end a sentence
const SENTENCE_BREAKS: &[char] = &['.', '!', '?'];

/// Letters outside a-z that belong to the alphabet
const ACCENTED: &[char] = &['á', 'é', 'í', 'ó', 'ú', 'ü', 'ñ'];

pub fn is_alphabet(c: char) -> bool {
    c.is_ascii_lowercase() || ACCENTED.contains(&c)
}

/// Normalize raw text into sentences of words
pub fn normalize(raw: &str) -> String {
    let mut sentences: Vec<String> = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();

    let flush_word = |word: &mut String, words: &mut Vec<String>| {
        if !word.is_empty() {
            words.push(std::mem::take(word));
        }
    };

    for c in raw.chars().flat_map(char::to_lowercase) {
        if is_alphabet(c) {
            word.push(c);
        } else if SENTENCE_BREAKS.contains(&c) {
            flush_word(&mut word, &mut words);
            if !words.is_empty() {
                sentences.push(words.join(" "));
                words.clear();
            }
        } else if c.is_whitespace() || c.is_ascii_punctuation() || is_unicode_punctuation(c) {
            flush_word(&mut word, &mut words);
        }
        // digits and symbols are dropped in place
    }
    flush_word(&mut word, &mut words);
    if !words.is_empty() {
        sentences.push(words.join(" "));
    }
    sentences.join("\n")
}

/// Punctuation common in Spanish text that `is_ascii_punctuation` misses
fn is_unicode_punctuation(c: char) -> bool {
    matches!(
        c,
        '¿' | '¡' | '«' | '»' | '“' | '”' | '‘' | '’' | '—' | '–' | '…' | '·'
    )
}

/// Sentences of a normalized text
pub fn sentences(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.lines().filter(|l| !l.trim().is_empty())
}

/// Words of a normalized text, across sentence boundaries
pub fn words(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_splits_sentences() {
        assert_eq!(
            normalize("Hola Mundo. ¿Cómo ESTÁS?  Bien!"),
            "hola mundo\ncómo estás\nbien"
        );
    }

    #[test]
    fn punctuation_separates_words() {
        assert_eq!(normalize("casa,perro;gato"), "casa perro gato");
        assert_eq!(normalize("«sí» —dijo— (ayer)"), "sí dijo ayer");
    }

    #[test]
    fn digits_and_symbols_are_dropped() {
        assert_eq!(normalize("año 2024 cuesta 5€"), "año cuesta");
        assert_eq!(normalize("abc123def"), "abcdef");
    }

    #[test]
    fn empty_sentences_are_dropped() {
        assert_eq!(normalize("...Uno.. . dos!?"), "uno\ndos");
        assert_eq!(normalize("   \n\t "), "");
        assert_eq!(normalize("123 !!"), "");
    }

    #[test]
    fn whitespace_collapses_within_sentence() {
        assert_eq!(normalize("el\n\n  niño \t come"), "el niño come");
    }

    #[test]
    fn accented_capitals_are_kept() {
        assert_eq!(normalize("ÁRBOL ÑANDÚ Pingüino"), "árbol ñandú pingüino");
    }

    #[test]
    fn word_and_sentence_iterators() {
        let text = normalize("Uno dos. Tres.");
        assert_eq!(sentences(&text).count(), 2);
        assert_eq!(words(&text).collect::<Vec<_>>(), vec!["uno", "dos", "tres"]);
    }
}
