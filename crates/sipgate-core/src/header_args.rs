//! The `key=value` mini-syntax embedded in many SIP header values
//! (Via parameters, URI parameters, Digest challenge/response arguments, ...).

use std::collections::HashMap;

/// A parsed set of `key=value` (or bare `key`) arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderArgs(HashMap<String, String>);

impl HeaderArgs {
    pub fn new() -> Self {
        HeaderArgs(HashMap::new())
    }

    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn del(&mut self, key: &str) {
        self.0.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders as a comma-and-space separated string with every value quoted,
    /// e.g. `realm="x", nonce="y"`. Used for `WWW-Authenticate`.
    pub fn comma_string(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        self.0
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_quoted(v)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders as a leading-semicolon separated string with unquoted values,
    /// omitting `=value` entirely when the value is empty, e.g. `;tag=abc;lr`.
    pub fn semicolon_string(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.0 {
            out.push(';');
            out.push_str(k);
            if !v.is_empty() {
                out.push('=');
                out.push_str(v);
            }
        }
        out
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Splits `value` on top-level `,`, `;`, or `\n`. Double-quoted runs are kept
/// verbatim (with `\` escaping the following character inside them) and are
/// not split on. Each element is trimmed of surrounding whitespace.
pub fn parse_list(value: &str) -> Vec<String> {
    let mut list = Vec::new();
    let mut buf = String::new();
    let mut escape = false;
    let mut quote = false;

    for c in value.chars() {
        if escape {
            buf.push(c);
            escape = false;
        } else if quote {
            if c == '\\' {
                buf.push(c);
                escape = true;
            } else {
                if c == '"' {
                    quote = false;
                }
                buf.push(c);
            }
        } else if c == ',' || c == ';' || c == '\n' {
            list.push(buf.trim().to_string());
            buf.clear();
        } else if c == '"' {
            quote = true;
            buf.push(c);
        } else {
            buf.push(c);
        }
    }

    if !buf.trim().is_empty() {
        list.push(buf.trim().to_string());
    }

    list
}

/// Extracts `key=value` pairs from a comma/semicolon/newline separated value.
/// A bare `key` with no `=` maps to the empty string. A value wrapped in
/// double quotes has its quotes stripped (no inner unescaping).
pub fn parse_pairs(value: &str) -> HeaderArgs {
    let mut args = HeaderArgs::new();
    for pair in parse_list(value.trim()) {
        match pair.find('=') {
            None => args.set(pair, ""),
            Some(idx) => {
                let key = &pair[..idx];
                let mut val = &pair[idx + 1..];
                if val.len() >= 2 && val.starts_with('"') && val.ends_with('"') {
                    val = &val[1..val.len() - 1];
                }
                args.set(key, val);
            }
        }
    }
    args
}

/// Parses header arguments out of a value that may carry a leading
/// delimiter before the argument list (e.g. the `;tag=abc` tail of a URI, or
/// the full Via parameter tail). Returns an empty set if no `;`/`,`/`\n`
/// delimiter is present.
pub fn parse_header_args(value: &str) -> HeaderArgs {
    match value.find([';', ',', '\n']) {
        None => HeaderArgs::new(),
        Some(idx) => parse_pairs(&value[idx + 1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_comma_semicolon_newline() {
        assert_eq!(parse_list("a,b;c\nd"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn keeps_quoted_runs_intact() {
        let list = parse_list(r#"realm="a;b,c", nonce="x\"y""#);
        assert_eq!(list, vec![r#"realm="a;b,c""#, r#"nonce="x\"y""#]);
    }

    #[test]
    fn pairs_strip_quotes_without_unescaping() {
        let args = parse_pairs(r#"realm="x\"y",stale=FALSE,lr"#);
        assert_eq!(args.get("realm"), r#"x\"y"#);
        assert_eq!(args.get("stale"), "FALSE");
        assert_eq!(args.get("lr"), "");
    }

    #[test]
    fn header_args_round_trips_key_set() {
        let mut args = HeaderArgs::new();
        args.set("branch", "z9hG4bK1");
        args.set("rport", "");
        let rendered = args.semicolon_string();
        let reparsed = parse_header_args(&rendered);
        assert_eq!(reparsed.get("branch"), "z9hG4bK1");
        assert!(reparsed.contains("rport"));
    }

    #[test]
    fn comma_string_quotes_values() {
        let mut args = HeaderArgs::new();
        args.set("realm", "example.com");
        assert_eq!(args.comma_string(), r#"realm="example.com""#);
    }
}
