//! RFC 1459 case mapping and name validation.
//!
//! Under `rfc1459` casemapping, `[]\~` are the upper-case forms of `{}|^`,
//! so `Foo[1]` and `foo{1}` are the same nickname. Every map keyed by a
//! nickname or channel name uses [`irc_lower`] on the key.

/// Longest nickname accepted by `NICK`.
pub const NICK_MAX_LEN: usize = 30;

const CHANNEL_MAX_LEN: usize = 50;

/// Lower-cases a name under RFC 1459 rules.
pub fn irc_lower(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            other => other,
        })
        .collect()
}

/// Case-insensitive name comparison under RFC 1459 rules.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && irc_lower(a) == irc_lower(b)
}

fn is_nick_special(c: char) -> bool {
    matches!(c, '{' | '}' | '[' | ']' | '_' | '\\' | '^' | '|' | '`')
}

/// Whether `nick` is a legal nickname: a letter or special character
/// followed by letters, digits, specials or `-`.
pub fn is_valid_nick(nick: &str) -> bool {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if nick.len() > NICK_MAX_LEN {
        return false;
    }
    if !(first.is_ascii_alphabetic() || is_nick_special(first)) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || is_nick_special(c) || c == '-')
}

/// Whether `name` is a legal channel name (`#` followed by anything except
/// space, comma or BEL).
pub fn is_valid_channel(name: &str) -> bool {
    name.starts_with('#')
        && name.len() > 1
        && name.len() <= CHANNEL_MAX_LEN
        && !name.chars().any(|c| matches!(c, ' ' | ',' | '\x07'))
}

/// Whether `s` is a server identifier: a digit followed by two
/// upper-case alphanumerics.
pub fn is_sid(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 3
        && b[0].is_ascii_digit()
        && b[1..].iter().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

/// Whether `s` is a full user identifier: a SID followed by a six
/// character UID whose first character is a letter.
pub fn is_uuid(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 9
        && s.is_ascii()
        && is_sid(&s[..3])
        && b[3].is_ascii_uppercase()
        && b[4..].iter().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

/// Glob match with `*` (any run) and `?` (any one character), compared
/// case-insensitively. Used for ban masks.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = irc_lower(pattern).chars().collect();
    let t: Vec<char> = irc_lower(text).chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
