//! Prompt patterns.
//!
//! A prompt is recognised by its terminating character(s) alone: the last
//! line of output, ending in one of the configured endings, with nothing
//! after it but blanks.

use std::sync::LazyLock;

use regex::bytes::Regex;

/// Prompt endings used when the caller supplies none.
pub const DEFAULT_PROMPT_ENDINGS: [&str; 2] = ["#", ">"];

/// Login name request from a Telnet server or `telnet` client.
pub static USERNAME_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:user ?name|login)[^\r\n:]*:[ \t]*\z").unwrap()
});

/// Password request, from a login or from `enable`.
pub static PASSWORD_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)pass(?:word|code)[^\r\n:]*:[ \t]*\z").unwrap());

/// OpenSSH asking to accept an unknown host key.
pub static HOST_KEY_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(yes/no[^)\r\n]*\)\?[ \t]*\z").unwrap());

fn endings_alternation<S: AsRef<str>>(endings: &[S]) -> String {
    let alternatives: Vec<String> = if endings.is_empty() {
        DEFAULT_PROMPT_ENDINGS
            .iter()
            .map(|e| regex::escape(e))
            .collect()
    } else {
        endings
            .iter()
            .map(|e| regex::escape(e.as_ref().trim()))
            .collect()
    };
    alternatives.join("|")
}

/// Match any last line ending in one of `endings`.
pub fn prompt_pattern<S: AsRef<str>>(endings: &[S]) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"[^\r\n]*(?:{})[ \t]*\z",
        endings_alternation(endings)
    ))
}

/// Match a prompt that starts with `hostname`, in any mode.
///
/// Covers `router>`, `router#` and `router(config-if)#` alike.
pub fn host_prompt_pattern<S: AsRef<str>>(
    hostname: &str,
    endings: &[S],
) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"{}[^\r\n]*(?:{})[ \t]*\z",
        regex::escape(hostname),
        endings_alternation(endings)
    ))
}

/// Match exactly this prompt at the end of output.
pub fn exact_prompt_pattern(prompt: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"{}[ \t]*\z", regex::escape(prompt.trim())))
}

/// Derive the device hostname from its prompt: `core-sw1#` -> `core-sw1`.
pub fn hostname_from_prompt<S: AsRef<str>>(prompt: &str, endings: &[S]) -> String {
    let mut name = prompt.trim();
    let candidates: Vec<&str> = if endings.is_empty() {
        DEFAULT_PROMPT_ENDINGS.to_vec()
    } else {
        endings.iter().map(|e| e.as_ref().trim()).collect()
    };
    for ending in candidates {
        if let Some(stripped) = name.strip_suffix(ending) {
            name = stripped;
            break;
        }
    }
    // Drop a mode suffix such as "(config)"
    if let Some(pos) = name.find('(') {
        name = &name[..pos];
    }
    name.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ENDINGS: [&str; 0] = [];

    #[test]
    fn test_prompt_pattern_matches_last_line_only() {
        let pattern = prompt_pattern(&NO_ENDINGS).unwrap();
        let m = pattern.find(b"show clock\r\n*10:00 UTC\r\nrouter# ").unwrap();
        assert_eq!(m.as_bytes(), b"router# ");

        assert!(!pattern.is_match(b"router#\r\nmore output"));
        assert!(pattern.is_match(b"switch>"));
    }

    #[test]
    fn test_custom_endings_are_escaped() {
        let pattern = prompt_pattern(&["$"]).unwrap();
        assert!(pattern.is_match(b"user@jump:~$ "));
        assert!(!pattern.is_match(b"router#"));
    }

    #[test]
    fn test_host_prompt_pattern_covers_modes() {
        let pattern = host_prompt_pattern("core-sw1", &NO_ENDINGS).unwrap();
        assert!(pattern.is_match(b"core-sw1>"));
        assert!(pattern.is_match(b"\r\ncore-sw1#"));
        assert!(pattern.is_match(b"core-sw1(config-if)#"));
        assert!(!pattern.is_match(b"other#"));
    }

    #[test]
    fn test_exact_prompt_pattern() {
        let pattern = exact_prompt_pattern("admin@jump:~$ ").unwrap();
        assert!(pattern.is_match(b"logout\r\nadmin@jump:~$ "));
        assert!(!pattern.is_match(b"admin@jump:~$ ssh -l u host"));
    }

    #[test]
    fn test_login_prompts() {
        assert!(USERNAME_PROMPT.is_match(b"\r\nUser Access Verification\r\n\r\nUsername: "));
        assert!(USERNAME_PROMPT.is_match(b"login:"));
        assert!(PASSWORD_PROMPT.is_match(b"Password: "));
        assert!(PASSWORD_PROMPT.is_match(b"admin@10.1.1.1's password: "));
        assert!(HOST_KEY_PROMPT.is_match(
            b"Are you sure you want to continue connecting (yes/no/[fingerprint])? "
        ));
    }

    #[test]
    fn test_hostname_from_prompt() {
        assert_eq!(hostname_from_prompt("core-sw1#", &NO_ENDINGS), "core-sw1");
        assert_eq!(hostname_from_prompt("edge> ", &NO_ENDINGS), "edge");
        assert_eq!(hostname_from_prompt("r1(config)#", &NO_ENDINGS), "r1");
        assert_eq!(hostname_from_prompt("jump$", &["$"]), "jump");
    }
}
