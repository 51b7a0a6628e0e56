//! Minifiers for linked resources.
//!
//! The defaults are deliberately conservative: they only remove text that
//! cannot change meaning (comments, redundant whitespace) and leave
//! everything inside string literals untouched.

/// Text-to-text minification of a single file.
pub trait Minifier: Send + Sync {
    /// Short identifier, used to namespace derived cache entries.
    fn name(&self) -> &'static str;

    fn minify(&self, source: &str) -> anyhow::Result<String>;
}

/// Strips comments and collapses whitespace in stylesheets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssMinifier;

impl CssMinifier {
    fn is_punct(c: char) -> bool {
        matches!(c, '{' | '}' | ';' | ',' | '>')
    }
}

impl Minifier for CssMinifier {
    fn name(&self) -> &'static str {
        "minify-css"
    }

    fn minify(&self, source: &str) -> anyhow::Result<String> {
        let mut out = String::with_capacity(source.len());
        let mut chars = source.chars().peekable();
        let mut pending_space = false;

        while let Some(c) = chars.next() {
            if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                pending_space = true;
                continue;
            }
            if c.is_whitespace() {
                pending_space = true;
                continue;
            }

            if pending_space
                && out
                    .chars()
                    .last()
                    .is_some_and(|last| !Self::is_punct(last) && !Self::is_punct(c))
            {
                out.push(' ');
            }
            pending_space = false;

            if c == '}' && out.ends_with(';') {
                out.pop();
            }
            out.push(c);

            if c == '"' || c == '\'' {
                while let Some(next) = chars.next() {
                    out.push(next);
                    if next == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if next == c {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Strips comments and redundant whitespace from scripts.
///
/// String, template and regex literals are copied verbatim. Line breaks are
/// kept unless the preceding token already ends a statement or opens a
/// group, so automatic semicolon insertion sees the same input.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsMinifier;

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

impl JsMinifier {
    /// Tokens around these never need a separating space.
    fn is_tight(c: char) -> bool {
        "{}()[];,:=<>?!&|*%^~".contains(c)
    }

    /// A `/` starts a regex unless it follows an operand.
    fn starts_regex(out: &str) -> bool {
        match out.trim_end().chars().last() {
            None => true,
            Some(c) => !(c.is_alphanumeric()
                || matches!(c, '_' | '$' | ')' | ']' | '}' | '"' | '\'' | '`')),
        }
    }

    fn copy_string(quote: char, chars: &mut Chars<'_>, out: &mut String) {
        while let Some(c) = chars.next() {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == quote {
                return;
            }
        }
    }

    fn copy_template(chars: &mut Chars<'_>, out: &mut String) {
        while let Some(c) = chars.next() {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '`' => return,
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                    Self::copy_substitution(chars, out);
                }
                _ => {}
            }
        }
    }

    fn copy_substitution(chars: &mut Chars<'_>, out: &mut String) {
        let mut depth = 1_usize;
        while let Some(c) = chars.next() {
            out.push(c);
            match c {
                '"' | '\'' => Self::copy_string(c, chars, out),
                '`' => Self::copy_template(chars, out),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn copy_regex(chars: &mut Chars<'_>, out: &mut String) {
        let mut in_class = false;
        while let Some(c) = chars.next() {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => return,
                '\n' => return,
                _ => {}
            }
        }
    }
}

impl Minifier for JsMinifier {
    fn name(&self) -> &'static str {
        "minify-js"
    }

    fn minify(&self, source: &str) -> anyhow::Result<String> {
        let mut out = String::with_capacity(source.len());
        let mut chars = source.chars().peekable();
        // Whitespace or comments seen since the last token; `true` once the gap spans a line.
        let mut gap: Option<bool> = None;

        while let Some(c) = chars.next() {
            if c == '/' && chars.peek() == Some(&'/') {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
                gap = Some(true);
                continue;
            }
            if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                let mut prev = '\0';
                let mut newline = false;
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    newline |= c == '\n';
                    prev = c;
                }
                gap = Some(gap.unwrap_or(false) || newline);
                continue;
            }
            if c.is_whitespace() {
                gap = Some(gap.unwrap_or(false) || c == '\n');
                continue;
            }

            if let (Some(newline), Some(last)) = (gap.take(), out.chars().last()) {
                if newline && !matches!(last, ';' | '{' | ',' | '(' | '[') {
                    out.push('\n');
                } else if !Self::is_tight(last) && !Self::is_tight(c) {
                    out.push(' ');
                }
            }

            let regex = c == '/' && Self::starts_regex(&out);
            out.push(c);
            match c {
                '"' | '\'' => Self::copy_string(c, &mut chars, &mut out),
                '`' => Self::copy_template(&mut chars, &mut out),
                '/' if regex => Self::copy_regex(&mut chars, &mut out),
                _ => {}
            }
        }
        Ok(out)
    }
}
