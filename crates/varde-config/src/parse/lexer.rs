//! Lexical analysis for the line-oriented configuration grammar.
//!
//! Each non-empty line is one declaration: a keyword followed by
//! whitespace-separated arguments. `--` starts a comment, double quotes
//! group an argument containing whitespace, and `job(<KEY>=value, ...)`
//! is a single invocation token whose parenthesized body is captured
//! verbatim for later argument parsing.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"--[^\n]*")]
pub enum Token {
    /// Quoted argument; quotes stripped, interior whitespace kept.
    #[regex(r#""[^"\n]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Quoted(String),

    /// `name(raw args)` invocation, captured whole. The head must not
    /// start with `-`: that prefix belongs to comments.
    #[regex(r"[^ \t\r\n(-][^ \t\r\n(]*\([^)\n]*\)", |lex| lex.slice().to_string(), priority = 4)]
    Invocation(String),

    /// Bare word.
    #[regex(r"[^ \t\r\n]+", |lex| lex.slice().to_string(), priority = 2)]
    Word(String),
}

/// One argument token after lexing.
#[derive(Debug, Clone, PartialEq)]
pub enum LineToken {
    /// Plain or quoted word.
    Word(String),
    /// `job(args)` invocation; `args` is the raw parenthesized body.
    Invocation { job: String, args: String },
}

/// A lexed declaration line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub tokens: Vec<LineToken>,
    /// Original source text, kept as diagnostic context.
    pub text: String,
    /// 1-based line number.
    pub line_no: usize,
}

/// Lex a configuration source into declaration lines.
///
/// Blank and comment-only lines are dropped. Lexing itself cannot fail:
/// every non-whitespace byte sequence is some token.
pub fn lex_lines(source: &str) -> Vec<RawLine> {
    let mut lines = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let mut tokens = Vec::new();
        for token in Token::lexer(line).flatten() {
            match token {
                Token::Word(w) | Token::Quoted(w) => tokens.push(LineToken::Word(w)),
                Token::Invocation(raw) => {
                    // Split guaranteed by the token regex.
                    let open = raw.find('(').unwrap_or(raw.len());
                    let job = raw[..open].to_string();
                    let args = raw[open + 1..raw.len() - 1].to_string();
                    tokens.push(LineToken::Invocation { job, args });
                }
            }
        }
        if tokens.is_empty() {
            continue;
        }
        lines.push(RawLine {
            tokens,
            text: line.trim().to_string(),
            line_no: idx + 1,
        });
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &RawLine) -> Vec<&str> {
        line.tokens
            .iter()
            .map(|t| match t {
                LineToken::Word(w) => w.as_str(),
                LineToken::Invocation { job, .. } => job.as_str(),
            })
            .collect()
    }

    #[test]
    fn test_basic_line() {
        let lines = lex_lines("INSTALL_JOB echo jobs/echo.job\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(words(&lines[0]), vec!["INSTALL_JOB", "echo", "jobs/echo.job"]);
        assert_eq!(lines[0].line_no, 1);
    }

    #[test]
    fn test_comments_and_blank_lines_dropped() {
        let source = "-- header comment\n\nENSPATH storage -- trailing\n";
        let lines = lex_lines(source);
        assert_eq!(lines.len(), 1);
        assert_eq!(words(&lines[0]), vec!["ENSPATH", "storage"]);
        assert_eq!(lines[0].line_no, 3);
    }

    #[test]
    fn test_comment_with_parentheses_dropped() {
        let lines = lex_lines("ENSPATH storage -- note(x) more(y)\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(words(&lines[0]), vec!["ENSPATH", "storage"]);
    }

    #[test]
    fn test_quoted_argument_keeps_spaces() {
        let lines = lex_lines("DEFINE <MSG> \"hello there\"\n");
        assert_eq!(
            lines[0].tokens[2],
            LineToken::Word("hello there".to_string())
        );
    }

    #[test]
    fn test_invocation_token() {
        let lines = lex_lines("FORWARD_MODEL echo(<MSG>=hello world, <N>=2)\n");
        assert_eq!(lines[0].tokens.len(), 2);
        assert_eq!(
            lines[0].tokens[1],
            LineToken::Invocation {
                job: "echo".to_string(),
                args: "<MSG>=hello world, <N>=2".to_string(),
            }
        );
    }

    #[test]
    fn test_invocation_without_args() {
        let lines = lex_lines("FORWARD_MODEL snapshot()\n");
        assert_eq!(
            lines[0].tokens[1],
            LineToken::Invocation {
                job: "snapshot".to_string(),
                args: String::new(),
            }
        );
    }

    #[test]
    fn test_line_numbers() {
        let lines = lex_lines("A 1\n-- comment\nB 2\n");
        assert_eq!(lines[0].line_no, 1);
        assert_eq!(lines[1].line_no, 3);
    }
}
