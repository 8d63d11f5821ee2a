//! Line-oriented parser for Rung source.
//!
//! Each line is one declaration (`IN`/`OUT`/`AIN`/`AOUT`) or one gate call
//! (`KIND name(args) -> outs`). Inline `NOT`/`PS`/`NS` in argument position
//! desugar into auxiliary nodes inserted ahead of the enclosing gate, so the
//! scan engine never sees expression trees. Token spans are taken straight
//! from the lexer, which keeps editor highlighting byte-exact.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::ast::{is_synthetic_name, Node, NodeKind, Program, SignalId, TokenSpan};
use crate::lexer::{lex, Spanned, Token};
use crate::timefmt::parse_duration;

/// Parse error, carrying the 1-based source line
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Line {line}: unknown gate kind: {kind}")]
    UnknownKind { line: usize, kind: String },

    #[error("Line {line}: missing '(' in gate definition")]
    MissingOpenParen { line: usize },

    #[error("Line {line}: missing ')' in gate definition")]
    MissingCloseParen { line: usize },

    #[error("Line {line}: unmatched {op}( in argument list")]
    UnmatchedInline { line: usize, op: String },

    #[error("Line {line}: missing '->' in gate definition")]
    MissingArrow { line: usize },

    #[error("Line {line}: missing name after gate kind")]
    MissingName { line: usize },

    #[error("Line {line}: unexpected characters '{slice}'")]
    Lex { line: usize, slice: String },

    #[error("could not open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parse a source file into a [`Program`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<Program, ParseError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_source(&source)
}

/// Parse source text into a [`Program`].
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let mut prog = Program::default();

    for (line_idx, raw) in source.lines().enumerate() {
        prog.source_lines.push(raw.to_string());
        let lineno = line_idx + 1;

        let tokens = lex(raw).map_err(|e| ParseError::Lex {
            line: lineno,
            slice: e.slice,
        })?;
        let Some(first) = tokens.first() else {
            continue;
        };

        match &first.token {
            Token::Ident(kw) if matches!(*kw, "IN" | "OUT" | "AIN" | "AOUT") => {
                parse_decl(&mut prog, line_idx, kw, &tokens[1..]);
            }
            Token::Ident(word) => parse_gate(&mut prog, line_idx, word, &tokens[1..])?,
            _ => return Err(ParseError::MissingName { line: lineno }),
        }
    }

    Ok(prog)
}

fn intern(prog: &mut Program, name: &str) -> SignalId {
    if let Some(&id) = prog.symbols.get(name) {
        return id;
    }
    let id = SignalId(prog.signal_count);
    prog.signal_count += 1;
    prog.symbols.insert(name.to_string(), id);
    id
}

/// Constant signals are shared across identical literal values.
fn intern_constant(prog: &mut Program, value: u8) -> SignalId {
    let name = format!("_const_{value}");
    if let Some(&id) = prog.symbols.get(&name) {
        return id;
    }
    let id = intern(prog, &name);
    prog.analog.insert(id);
    prog.constants.insert(id, value);
    id
}

fn push_span(prog: &mut Program, line: usize, col_start: usize, col_end: usize, symbol: &str) {
    if is_synthetic_name(symbol) {
        return;
    }
    prog.tokens.push(TokenSpan {
        line,
        col_start,
        col_end,
        symbol: symbol.to_string(),
    });
}

/// `IN a, b(alias), c` and friends. Declarations are tolerant of stray
/// punctuation; only identifiers produce entries.
fn parse_decl(prog: &mut Program, line_idx: usize, keyword: &str, rest: &[Spanned<Token<'_>>]) {
    let mut i = 0;
    while i < rest.len() {
        let (name, span) = match &rest[i] {
            Spanned {
                token: Token::Ident(name),
                span,
            } => (*name, span.clone()),
            _ => {
                i += 1;
                continue;
            }
        };
        push_span(prog, line_idx, span.start, span.end, name);
        let id = intern(prog, name);
        i += 1;

        // alias form: name(alias); both symbols map to the same signal,
        // the alias becomes the public name
        let mut public = name;
        if let (Some(open), Some(alias_tok), Some(close)) =
            (rest.get(i), rest.get(i + 1), rest.get(i + 2))
        {
            if let (Token::ParenOpen, Token::Ident(alias), Token::ParenClose) =
                (&open.token, &alias_tok.token, &close.token)
            {
                prog.symbols.insert((*alias).to_string(), id);
                push_span(prog, line_idx, alias_tok.span.start, alias_tok.span.end, alias);
                public = alias;
                i += 3;
            }
        }

        match keyword {
            "IN" => prog.inputs.push(public.to_string()),
            "OUT" => prog.outputs.push(public.to_string()),
            "AIN" => {
                prog.analog.insert(id);
                prog.analog_inputs.push(public.to_string());
            }
            _ => {
                prog.analog.insert(id);
                prog.analog_outputs.push(public.to_string());
            }
        }
    }
}

/// `KIND name(args) -> outs`, with `rest` starting after the kind keyword.
///
/// The line's shape is validated before the keyword is classified, so a
/// malformed line reports its structural problem even under an unknown kind.
fn parse_gate(
    prog: &mut Program,
    line_idx: usize,
    keyword: &str,
    rest: &[Spanned<Token<'_>>],
) -> Result<(), ParseError> {
    let lineno = line_idx + 1;

    let name = match rest.first() {
        Some(Spanned {
            token: Token::Ident(n),
            ..
        }) => (*n).to_string(),
        _ => return Err(ParseError::MissingName { line: lineno }),
    };
    if !matches!(rest.get(1).map(|t| &t.token), Some(Token::ParenOpen)) {
        return Err(ParseError::MissingOpenParen { line: lineno });
    }

    let close = matching_close(rest, 2).ok_or(ParseError::MissingCloseParen { line: lineno })?;
    let args = &rest[2..close];

    if !matches!(rest.get(close + 1).map(|t| &t.token), Some(Token::Arrow)) {
        return Err(ParseError::MissingArrow { line: lineno });
    }
    let outs = &rest[close + 2..];

    let Some(kind) = NodeKind::from_keyword(keyword) else {
        return Err(ParseError::UnknownKind {
            line: lineno,
            kind: keyword.to_string(),
        });
    };

    let mut node = Node::new(kind, name, line_idx);

    for (argi, group) in split_args(args).into_iter().enumerate() {
        if group.is_empty() {
            continue;
        }

        // a literal first argument is a hard-coded preset, not an input
        if argi == 0 && kind.is_timer() {
            if let Some(text) = literal_text(group) {
                node.preset_time = Some(parse_duration(text));
                continue;
            }
        }
        if argi == 0 && kind.is_counter() {
            if let Some(v) = literal_text(group).and_then(parse_int) {
                node.preset_count = Some(v as i32);
                continue;
            }
        }

        // comparator literals 0..=255 become shared constant signals
        if kind.is_comparator() {
            if let Some(v) = literal_text(group).and_then(parse_int) {
                if (0..=255).contains(&v) {
                    node.inputs.push(intern_constant(prog, v as u8));
                    continue;
                }
            }
        }

        let sig = resolve_arg(prog, line_idx, group)?;
        node.inputs.push(sig);
    }

    let mut out_index = 0usize;
    for group in split_args(outs) {
        let Some(Spanned {
            token: Token::Ident(out_name),
            span,
        }) = group.first()
        else {
            continue;
        };
        push_span(prog, line_idx, span.start, span.end, out_name);
        let id = intern(prog, out_name);
        if kind.is_counter() && out_index == 1 {
            // second counter output carries the current value
            node.cv_output = Some(id);
            prog.analog.insert(id);
        } else {
            node.outputs.push(id);
        }
        out_index += 1;
    }

    prog.nodes.push(node);
    Ok(())
}

/// Resolve one argument group to a signal id, desugaring inline operators.
///
/// Nesting resolves innermost-first: the recursion bottoms out at a name,
/// then each level creates its auxiliary node before returning, so auxiliary
/// nodes land in the node list ahead of the gate that uses them.
fn resolve_arg(
    prog: &mut Program,
    line_idx: usize,
    group: &[Spanned<Token<'_>>],
) -> Result<SignalId, ParseError> {
    let lineno = line_idx + 1;

    if group.len() >= 2 {
        let inline_op = match (&group[0].token, &group[1].token) {
            (Token::Ident(op), Token::ParenOpen) if matches!(*op, "NOT" | "PS" | "NS") => {
                Some(*op)
            }
            _ => None,
        };
        if let Some(op) = inline_op {
            let close = matching_close(group, 2);
            let inner = match close {
                Some(close) if close > 2 => &group[2..close],
                _ => {
                    return Err(ParseError::UnmatchedInline {
                        line: lineno,
                        op: op.to_string(),
                    });
                }
            };
            let input = resolve_arg(prog, line_idx, inner)?;

            let (aux_kind, prefix) = match op {
                "NOT" => (NodeKind::Not, "_not_"),
                "PS" => (NodeKind::Ps, "_ps_"),
                _ => (NodeKind::Ns, "_ns_"),
            };
            let k = prog.nodes.len();
            let out_id = intern(prog, &format!("{prefix}{k}_out"));
            let mut aux = Node::new(aux_kind, format!("{prefix}{k}"), line_idx);
            aux.inputs.push(input);
            aux.outputs.push(out_id);
            aux.synthetic = true;
            prog.nodes.push(aux);
            return Ok(out_id);
        }
    }

    match &group[0] {
        Spanned {
            token: Token::Ident(name),
            span,
        } => {
            push_span(prog, line_idx, span.start, span.end, name);
            Ok(intern(prog, name))
        }
        Spanned {
            token: Token::Number(text),
            span,
        } => {
            push_span(prog, line_idx, span.start, span.end, text);
            Ok(intern(prog, text))
        }
        Spanned {
            token: Token::Quoted(text),
            span,
        } => {
            // quotes are not part of the symbol
            push_span(prog, line_idx, span.start + 1, span.end - 1, text);
            Ok(intern(prog, text))
        }
        _ => Err(ParseError::MissingName { line: lineno }),
    }
}

/// Index of the `)` matching an already-consumed `(`, scanning from `start`.
fn matching_close(tokens: &[Spanned<Token<'_>>], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (j, t) in tokens.iter().enumerate().skip(start) {
        match t.token {
            Token::ParenOpen => depth += 1,
            Token::ParenClose => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a token run at top-level commas.
fn split_args<'a, 'src>(tokens: &'a [Spanned<Token<'src>>]) -> Vec<&'a [Spanned<Token<'src>>]> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, t) in tokens.iter().enumerate() {
        match t.token {
            Token::ParenOpen => depth += 1,
            Token::ParenClose => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                groups.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() {
        groups.push(&tokens[start..]);
    }
    groups
}

fn literal_text<'src>(group: &[Spanned<Token<'src>>]) -> Option<&'src str> {
    match group {
        [single] => match &single.token {
            Token::Quoted(text) | Token::Number(text) => Some(text),
            _ => None,
        },
        _ => None,
    }
}

/// Decimal or `0x` hex integer, quotes already stripped by the lexer.
fn parse_int(text: &str) -> Option<i64> {
    let t = text.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        t.parse::<i64>().ok()
    }
}
