//! Shell-style glob patterns for job names.
//!
//! Supports `*` (any run of characters), `?` (exactly one character) and
//! `[...]` sets with ranges and `!`/`^` negation. Matching is against the
//! whole name and is case-sensitive.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Any,
    Star,
    Set { negated: bool, items: Vec<(char, char)> },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::Any => true,
            Token::Star => true,
            Token::Set { negated, items } => {
                let hit = items.iter().any(|&(lo, hi)| lo <= c && c <= hi);
                hit != *negated
            }
        }
    }
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let tokens = tokenize(&source);
        Self { source, tokens }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The pattern with its `*` and `?` wildcards removed.
    ///
    /// `"*.pdf"` gives `".pdf"`; `"scan-?.tif"` gives `"scan-.tif"`.
    pub fn literal(&self) -> String {
        self.source.chars().filter(|c| *c != '*' && *c != '?').collect()
    }

    pub fn matches(&self, input: &str) -> bool {
        let input: Vec<char> = input.chars().collect();
        let tokens = &self.tokens;

        // Greedy two-pointer walk, backtracking to the most recent star.
        let (mut ti, mut ii) = (0usize, 0usize);
        let mut star: Option<(usize, usize)> = None;

        while ii < input.len() {
            match tokens.get(ti) {
                Some(Token::Star) => {
                    star = Some((ti, ii));
                    ti += 1;
                }
                Some(token) if token.matches(input[ii]) => {
                    ti += 1;
                    ii += 1;
                }
                _ => match star {
                    Some((sti, sii)) => {
                        ti = sti + 1;
                        ii = sii + 1;
                        star = Some((sti, sii + 1));
                    }
                    None => return false,
                },
            }
        }

        tokens[ti..].iter().all(|t| *t == Token::Star)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Pattern::new(source)
    }
}

fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Collapse runs of stars.
                if tokens.last() != Some(&Token::Star) {
                    tokens.push(Token::Star);
                }
                i += 1;
            }
            '?' => {
                tokens.push(Token::Any);
                i += 1;
            }
            '[' => match parse_set(&chars[i..]) {
                Some((token, used)) => {
                    tokens.push(token);
                    i += used;
                }
                // Unterminated set: treat the bracket literally.
                None => {
                    tokens.push(Token::Literal('['));
                    i += 1;
                }
            },
            '\\' if i + 1 < chars.len() => {
                tokens.push(Token::Literal(chars[i + 1]));
                i += 2;
            }
            c => {
                tokens.push(Token::Literal(c));
                i += 1;
            }
        }
    }

    tokens
}

/// Parses `[...]` starting at `chars[0] == '['`. Returns the token and the
/// number of chars consumed.
fn parse_set(chars: &[char]) -> Option<(Token, usize)> {
    let mut i = 1;
    let negated = matches!(chars.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }

    let mut items = Vec::new();
    let mut first = true;
    while i < chars.len() {
        let c = chars[i];
        if c == ']' && !first {
            return Some((Token::Set { negated, items }, i + 1));
        }
        first = false;
        if i + 2 < chars.len() && chars[i + 1] == '-' && chars[i + 2] != ']' {
            items.push((c, chars[i + 2]));
            i += 3;
        } else {
            items.push((c, c));
            i += 1;
        }
    }
    None
}
