//! Tolerant repair of model-emitted JSON.
//!
//! Models reliably leave a trailing comma before `}` or `]`. This pass
//! removes those commas while tracking string literals, so a `,]` or `,}`
//! inside a string value is left alone. Nothing else is repaired.

/// Remove commas that are followed (after optional whitespace) by `}` or `]`,
/// ignoring anything inside string literals.
pub fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_before_closers() {
        assert_eq!(strip_trailing_commas("[1, 2,]"), "[1, 2]");
        assert_eq!(strip_trailing_commas("{\"a\": 1,\n}"), "{\"a\": 1\n}");
        assert_eq!(
            strip_trailing_commas("{\"files\": [{\"a\": 1,},\n  ],\n}"),
            "{\"files\": [{\"a\": 1}\n  ]\n}"
        );
    }

    #[test]
    fn test_leaves_strings_alone() {
        let input = r#"{"content": "a,] b,}", "x": [1,],}"#;
        assert_eq!(strip_trailing_commas(input), r#"{"content": "a,] b,}", "x": [1]}"#);
    }

    #[test]
    fn test_handles_escaped_quotes() {
        let input = r#"{"content": "say \"hi,]\"",}"#;
        assert_eq!(strip_trailing_commas(input), r#"{"content": "say \"hi,]\""}"#);
    }

    #[test]
    fn test_valid_json_untouched() {
        let input = r#"{"files": [{"action": "delete", "path": "/a"}]}"#;
        assert_eq!(strip_trailing_commas(input), input);
    }
}
