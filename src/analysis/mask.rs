//! Single-pass source masking.
//!
//! Splits each line into its code part (string literal contents blanked with
//! spaces, comments removed) and its comment text, so that code checks never
//! fire inside strings or comments and comment checks only see comments.
//! Both lexers are linear in the input and carry state across lines for
//! block comments, triple-quoted strings and template literals.

/// One source line after masking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskedLine {
    pub code: String,
    pub comment: String,
    /// The line starts inside a multi-line string or block comment.
    pub continued: bool,
}

impl MaskedLine {
    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Comment/string syntax family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `#` comments, `'`/`"` strings with triple-quoted variants.
    Hash,
    /// `//` and `/* */` comments, `'`/`"`/`` ` `` strings.
    CLike,
}

/// Mask every line of `text`.
pub fn mask(text: &str, syntax: Syntax) -> Vec<MaskedLine> {
    match syntax {
        Syntax::Hash => mask_hash(text),
        Syntax::CLike => mask_c_like(text),
    }
}

#[derive(Clone, Copy)]
enum HashState {
    Code,
    Str { quote: char, triple: bool },
}

fn mask_hash(text: &str) -> Vec<MaskedLine> {
    let mut state = HashState::Code;
    let mut lines = Vec::new();

    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        let len = chars.len();
        let mut out = MaskedLine {
            continued: matches!(state, HashState::Str { .. }),
            ..Default::default()
        };
        let mut i = 0;

        while i < len {
            let c = chars[i];
            match state {
                HashState::Code => {
                    if c == '#' {
                        out.comment = chars[i + 1..].iter().collect();
                        break;
                    }
                    if c == '"' || c == '\'' {
                        let triple = i + 2 < len && chars[i + 1] == c && chars[i + 2] == c;
                        if triple {
                            out.code.extend([c, c, c]);
                            i += 3;
                        } else {
                            out.code.push(c);
                            i += 1;
                        }
                        state = HashState::Str { quote: c, triple };
                        continue;
                    }
                    out.code.push(c);
                    i += 1;
                }
                HashState::Str { quote, triple } => {
                    if c == '\\' {
                        out.code.push(' ');
                        if i + 1 < len {
                            out.code.push(' ');
                        }
                        i += 2;
                        continue;
                    }
                    if c == quote {
                        if !triple {
                            out.code.push(c);
                            i += 1;
                            state = HashState::Code;
                            continue;
                        }
                        if i + 2 < len && chars[i + 1] == quote && chars[i + 2] == quote {
                            out.code.extend([c, c, c]);
                            i += 3;
                            state = HashState::Code;
                            continue;
                        }
                    }
                    out.code.push(' ');
                    i += 1;
                }
            }
        }

        // Single-quoted strings cannot span lines.
        if let HashState::Str { triple: false, .. } = state {
            state = HashState::Code;
        }
        lines.push(out);
    }

    lines
}

#[derive(Clone, Copy)]
enum CState {
    Code,
    Block,
    Str { quote: char },
}

fn mask_c_like(text: &str) -> Vec<MaskedLine> {
    let mut state = CState::Code;
    let mut lines = Vec::new();

    for line in text.lines() {
        let chars: Vec<char> = line.chars().collect();
        let len = chars.len();
        let mut out = MaskedLine {
            continued: !matches!(state, CState::Code),
            ..Default::default()
        };
        let mut i = 0;

        while i < len {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match state {
                CState::Code => {
                    if c == '/' && next == Some('/') {
                        out.comment.extend(chars[i + 2..].iter());
                        break;
                    }
                    if c == '/' && next == Some('*') {
                        out.code.push(' ');
                        state = CState::Block;
                        i += 2;
                        continue;
                    }
                    if c == '"' || c == '\'' || c == '`' {
                        state = CState::Str { quote: c };
                    }
                    out.code.push(c);
                    i += 1;
                }
                CState::Block => {
                    if c == '*' && next == Some('/') {
                        state = CState::Code;
                        i += 2;
                        continue;
                    }
                    out.comment.push(c);
                    i += 1;
                }
                CState::Str { quote } => {
                    if c == '\\' {
                        out.code.push(' ');
                        if next.is_some() {
                            out.code.push(' ');
                        }
                        i += 2;
                        continue;
                    }
                    if c == quote {
                        out.code.push(c);
                        state = CState::Code;
                    } else {
                        out.code.push(' ');
                    }
                    i += 1;
                }
            }
        }

        // Only template literals span lines.
        if let CState::Str { quote } = state {
            if quote != '`' {
                state = CState::Code;
            }
        }
        lines.push(out);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_comments_and_strings() {
        let lines = mask("x = \"a # b\"  # real comment\n", Syntax::Hash);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].code.contains('#'));
        assert!(lines[0].code.starts_with("x = \""));
        assert_eq!(lines[0].comment.trim(), "real comment");
    }

    #[test]
    fn test_hash_triple_quoted_spans_lines() {
        let src = "s = \"\"\"\nexcept:\n\"\"\"\nexcept:\n";
        let lines = mask(src, Syntax::Hash);
        assert_eq!(lines.len(), 4);
        assert!(!lines[1].code.contains("except"));
        assert!(lines[3].code.contains("except"));
        assert!(!lines[0].continued);
        assert!(lines[1].continued);
        assert!(lines[2].continued);
        assert!(!lines[3].continued);
    }

    #[test]
    fn test_hash_escaped_quote() {
        let lines = mask("s = 'it\\'s' # done\n", Syntax::Hash);
        assert_eq!(lines[0].comment.trim(), "done");
    }

    #[test]
    fn test_c_like_line_and_block_comments() {
        let src = "let a = 1; // TODO: later\n/* start\nstill comment */ let b = a == 2;\n";
        let lines = mask(src, Syntax::CLike);
        assert_eq!(lines[0].comment.trim(), "TODO: later");
        assert!(lines[0].code.contains("let a = 1;"));
        assert!(lines[1].code.trim().is_empty());
        assert!(lines[1].comment.contains("start"));
        assert!(lines[2].code.contains("let b = a == 2;"));
        assert!(!lines[2].code.contains("still"));
    }

    #[test]
    fn test_c_like_strings_blanked() {
        let lines = mask("console.log(\"a == b // not a comment\");\n", Syntax::CLike);
        assert!(!lines[0].code.contains("=="));
        assert!(lines[0].comment.is_empty());
    }

    #[test]
    fn test_template_literal_spans_lines() {
        let src = "const s = `\nif (a == b)\n`;\nif (a == b) {}\n";
        let lines = mask(src, Syntax::CLike);
        assert!(!lines[1].code.contains("=="));
        assert!(lines[3].code.contains("=="));
    }
}
