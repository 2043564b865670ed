//! 分词器：CJK 片段走 jieba（搜索模式），拉丁片段按字母数字连续段切分，
//! 统一小写并去变音符。查询分词与索引分词必须保持一致，否则倒排索引命不中。
//!
//! 注意不能把拉丁文本整体交给 jieba：它的非中文切分只认 ASCII 字母，
//! é/È 这类带变音符的字符会被逐字拆开。

use jieba_rs::Jieba;
use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;

static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

/// Tokenize mixed Latin/CJK text into lowercase, diacritic-folded tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfc().collect();
    let mut tokens = Vec::new();
    let mut latin = String::new();
    let mut cjk = String::new();

    for c in normalized.chars() {
        if is_cjk_char(c) {
            flush_latin(&mut latin, &mut tokens);
            cjk.push(c);
        } else {
            flush_cjk(&mut cjk, &mut tokens);
            if c.is_alphanumeric() {
                latin.push(c);
            } else {
                flush_latin(&mut latin, &mut tokens);
            }
        }
    }
    flush_latin(&mut latin, &mut tokens);
    flush_cjk(&mut cjk, &mut tokens);

    tokens
}

fn flush_latin(buffer: &mut String, tokens: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let token = fold_diacritics(&buffer.to_lowercase());
    if !token.is_empty() {
        tokens.push(token);
    }
    buffer.clear();
}

fn flush_cjk(buffer: &mut String, tokens: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    for word in JIEBA.cut_for_search(buffer, true) {
        let word = word.trim();
        if !word.is_empty() {
            tokens.push(word.to_string());
        }
    }
    buffer.clear();
}

/// Canonical form of a lemma for prefix matching and phrase queries:
/// NFC, lowercase, diacritics folded, whitespace collapsed.
pub fn fold_lemma(lemma: &str) -> String {
    let normalized: String = lemma.nfc().collect();
    let folded = fold_diacritics(&normalized.to_lowercase());
    folded
        .split(|c: char| c.is_whitespace() || c == ':')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 法语常用变音符映射；œ/æ 展开为双字母。
pub fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => out.push('a'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ò' | 'ó' | 'ô' | 'ö' | 'õ' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ç' => out.push('c'),
            'ñ' => out.push('n'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            'À' | 'Á' | 'Â' | 'Ä' | 'Ã' | 'Å' => out.push('A'),
            'È' | 'É' | 'Ê' | 'Ë' => out.push('E'),
            'Ì' | 'Í' | 'Î' | 'Ï' => out.push('I'),
            'Ò' | 'Ó' | 'Ô' | 'Ö' | 'Õ' => out.push('O'),
            'Ù' | 'Ú' | 'Û' | 'Ü' => out.push('U'),
            'Ç' => out.push('C'),
            'Ñ' => out.push('N'),
            'Œ' => out.push_str("OE"),
            'Æ' => out.push_str("AE"),
            _ => out.push(c),
        }
    }
    out
}

pub fn is_cjk_char(c: char) -> bool {
    matches!(c,
        '\u{4e00}'..='\u{9fff}' |  // CJK Unified Ideographs
        '\u{3400}'..='\u{4dbf}' |  // CJK Extension A
        '\u{3040}'..='\u{309f}' |  // Hiragana
        '\u{30a0}'..='\u{30ff}' |  // Katakana
        '\u{ac00}'..='\u{d7af}'    // Hangul Syllables
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_french_folds_diacritics() {
        let tokens = tokenize("École élémentaire");
        assert_eq!(tokens, vec!["ecole", "elementaire"]);
    }

    #[test]
    fn tokenize_chinese_segments_words() {
        let tokens = tokenize("衬衫很好看");
        assert!(tokens.contains(&"衬衫".to_string()));
    }

    #[test]
    fn tokenize_mixed_text() {
        let tokens = tokenize("chemise 衬衫");
        assert!(tokens.contains(&"chemise".to_string()));
        assert!(tokens.contains(&"衬衫".to_string()));
    }

    #[test]
    fn apostrophes_split_latin_tokens() {
        let tokens = tokenize("l'école");
        assert_eq!(tokens, vec!["l", "ecole"]);
    }

    #[test]
    fn punctuation_only_tokens_are_dropped() {
        assert!(tokenize("... !!! --").is_empty());
    }

    #[test]
    fn fold_lemma_collapses_whitespace() {
        assert_eq!(fold_lemma("  Être   humain "), "etre humain");
    }

    #[test]
    fn fold_expands_ligatures() {
        assert_eq!(fold_lemma("œuf"), "oeuf");
        assert_eq!(fold_lemma("soixante-dix"), "soixante-dix");
    }

    #[test]
    fn cjk_detection() {
        assert!(contains_cjk("衬衫"));
        assert!(!contains_cjk("chemise"));
    }
}
