use std::borrow::Cow;
use std::process;

pub fn print_usage() {
    println!("Usage: bshell [-hvp] [--print-commands]");
    println!("   -h                Print this help message");
    println!("   -v                Enable verbose (debug) logging");
    println!("   -p                Do not print a command prompt (disables line editing)");
    println!("   --print-commands  Dump every parsed command before running it");
    process::exit(1);
}

/// Removes one pair of surrounding double quotes, e.g. `"hello"` becomes
/// `hello`. Tokens without a matching closing quote are left alone.
pub fn unquote(s: &mut String) {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s.pop();
        s.remove(0);
    }
}

/// Quotes `word` for a command line so it reads back as the same single
/// word. Words that already do are returned as is, and so are words holding
/// a `'`, which single quotes cannot carry.
pub fn quote_word(word: &str) -> Cow<'_, str> {
    if word.is_empty() {
        return Cow::Borrowed("''");
    }
    if reads_back_unchanged(word) || word.contains('\'') {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word))
    }
}

/// Double-quoted sections are kept verbatim by the tokenizer; outside them
/// whitespace, operators and single quotes split or change the word.
fn reads_back_unchanged(word: &str) -> bool {
    let mut in_double = false;
    for c in word.chars() {
        match c {
            '"' => in_double = !in_double,
            _ if in_double => {}
            '\'' | '<' | '>' | '|' | '&' | ';' => return false,
            c if c.is_whitespace() => return false,
            _ => {}
        }
    }
    !in_double
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unquoted(s: &str) -> String {
        let mut s = s.to_string();
        unquote(&mut s);
        s
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquoted("\"hello world\""), "hello world");
        assert_eq!(unquoted("hello"), "hello");
        assert_eq!(unquoted("\"hello"), "\"hello");
        assert_eq!(unquoted("\""), "\"");
        assert_eq!(unquoted("\"\""), "");
        assert_eq!(unquoted("\"\"a\"\""), "\"a\"");
    }

    #[test]
    fn test_quote_word() {
        assert_eq!(quote_word("ls"), "ls");
        assert_eq!(quote_word(""), "''");
        assert_eq!(quote_word("a b"), "'a b'");
        assert_eq!(quote_word("x | y"), "'x | y'");
        assert_eq!(quote_word("a;b"), "'a;b'");
        assert_eq!(quote_word("\"hello world\""), "\"hello world\"");
        assert_eq!(quote_word("\"it's\""), "\"it's\"");
        assert_eq!(quote_word("\"open"), "'\"open'");
    }
}
