use winnow::ascii::{digit1, hex_digit1, till_line_ending};
use winnow::combinator::{alt, cut_err, delimited, eof, opt, preceded, repeat, separated};
use winnow::error::{ContextError, ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_until, take_while};

use super::ast::{RawArgs, RawExpr, RawKind, RawPipeline, RawRule, RawStage, RawStatement};
use crate::types::{ArithOp, CompareOp, StageMatch};

const RESERVED: &[&str] = &[
    "rule", "when", "then", "end", "let", "pipeline", "stage", "match", "and", "or", "not",
    "true", "false",
];

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

// -- Whitespace & comments --------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_whitespace()).void(),
            ("//", till_line_ending).void(),
            (
                "/*",
                cut_err((take_until(0.., "*/"), "*/")).context(expected("end of comment")),
            )
                .void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Identifiers & keywords -------------------------------------------------

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

/// A case-insensitive keyword that is not the prefix of a longer word.
fn keyword<'i>(kw: &'static str) -> impl Parser<&'i str, (), ErrMode<ContextError>> {
    move |input: &mut &'i str| {
        let checkpoint = input.checkpoint();
        match word.parse_next(input) {
            Ok(w) if w.eq_ignore_ascii_case(kw) => Ok(()),
            _ => {
                input.reset(&checkpoint);
                Err(ErrMode::from_input(input))
            }
        }
    }
}

fn plain_identifier(input: &mut &str) -> ModalResult<String> {
    let checkpoint = input.checkpoint();
    let name = word.parse_next(input)?;
    if is_reserved(name) {
        input.reset(&checkpoint);
        return Err(ErrMode::from_input(input));
    }
    Ok(name.to_owned())
}

fn quoted_identifier(input: &mut &str) -> ModalResult<String> {
    delimited('`', take_while(1.., |c: char| c != '`'), cut_err('`'))
        .map(str::to_owned)
        .parse_next(input)
}

fn identifier(input: &mut &str) -> ModalResult<String> {
    alt((quoted_identifier, plain_identifier))
        .context(expected("identifier"))
        .parse_next(input)
}

/// Parameter names, map keys and field names, where keywords are allowed.
fn field_name(input: &mut &str) -> ModalResult<String> {
    alt((quoted_identifier, word.map(str::to_owned)))
        .context(expected("name"))
        .parse_next(input)
}

// -- Literals ---------------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = cut_err(any).context(expected("closing quote")).parse_next(input)?;
        match ch {
            c if c == quote => return Ok(s),
            '\\' => {
                let esc = cut_err(any).parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    'u' => {
                        let hex = cut_err(take_while(4, |c: char| c.is_ascii_hexdigit()))
                            .context(expected("four hex digits"))
                            .parse_next(input)?;
                        let c = u32::from_str_radix(hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| ErrMode::from_input(input).cut())?;
                        s.push(c);
                    }
                    '"' | '\'' | '\\' => s.push(esc),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn exponent(input: &mut &str) -> ModalResult<()> {
    (one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)
        .void()
        .parse_next(input)
}

fn double_literal(input: &mut &str) -> ModalResult<f64> {
    alt((
        (digit1, '.', digit1, opt(exponent)).take(),
        (digit1, exponent).take(),
    ))
    .try_map(|s: &str| s.parse::<f64>())
    .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<RawKind> {
    alt((
        preceded(
            alt(("0x", "0X")),
            cut_err(hex_digit1.try_map(|h: &str| i64::from_str_radix(h, 16)))
                .context(expected("hexadecimal long")),
        )
        .map(RawKind::Long),
        double_literal.map(RawKind::Double),
        digit1.try_map(|s: &str| s.parse::<i64>()).map(RawKind::Long),
    ))
    .parse_next(input)
}

fn array_literal(input: &mut &str) -> ModalResult<RawKind> {
    '['.parse_next(input)?;
    let items: Vec<RawExpr> = separated(0.., expr, (ws, ',')).parse_next(input)?;
    (ws, cut_err(']'))
        .context(expected("']' to close the array"))
        .parse_next(input)?;
    Ok(RawKind::Array(items))
}

fn map_entry(input: &mut &str) -> ModalResult<(String, RawExpr)> {
    ws.parse_next(input)?;
    let key = alt((string_literal, field_name)).parse_next(input)?;
    (ws, cut_err(':')).context(expected("':'")).parse_next(input)?;
    let value = cut_err(expr).parse_next(input)?;
    Ok((key, value))
}

fn map_literal(input: &mut &str) -> ModalResult<RawKind> {
    '{'.parse_next(input)?;
    let entries: Vec<(String, RawExpr)> = separated(0.., map_entry, (ws, ',')).parse_next(input)?;
    (ws, cut_err('}'))
        .context(expected("'}' to close the map"))
        .parse_next(input)?;
    Ok(RawKind::Map(entries))
}

// -- Primaries --------------------------------------------------------------

fn message_ref(input: &mut &str) -> ModalResult<RawKind> {
    "$message".parse_next(input)?;
    (ws, cut_err('.'), ws)
        .context(expected("'.' after $message"))
        .parse_next(input)?;
    let field = cut_err(field_name).parse_next(input)?;
    Ok(RawKind::MessageRef(field))
}

fn named_arg_ahead(input: &mut &str) -> bool {
    let checkpoint = input.checkpoint();
    let ahead = (ws, field_name, ws, ':').parse_next(input).is_ok();
    input.reset(&checkpoint);
    ahead
}

fn named_arg(input: &mut &str) -> ModalResult<(String, RawExpr)> {
    ws.parse_next(input)?;
    let param = field_name.parse_next(input)?;
    (ws, ':').parse_next(input)?;
    let value = cut_err(expr).parse_next(input)?;
    Ok((param, value))
}

/// Arguments after the opening parenthesis, up to and including the closing one.
fn call_args(input: &mut &str) -> ModalResult<RawArgs> {
    ws.parse_next(input)?;
    if opt(')').parse_next(input)?.is_some() {
        return Ok(RawArgs::Positional(Vec::new()));
    }
    let args = if named_arg_ahead(input) {
        RawArgs::Named(separated(1.., named_arg, (ws, ',')).parse_next(input)?)
    } else {
        RawArgs::Positional(separated(1.., expr, (ws, ',')).parse_next(input)?)
    };
    (ws, cut_err(')'))
        .context(expected("')' after arguments"))
        .parse_next(input)?;
    Ok(args)
}

fn call_or_ident(input: &mut &str) -> ModalResult<RawKind> {
    let name = identifier.parse_next(input)?;
    let checkpoint = input.checkpoint();
    ws.parse_next(input)?;
    if opt('(').parse_next(input)?.is_some() {
        let args = cut_err(call_args).parse_next(input)?;
        return Ok(RawKind::Call { name, args });
    }
    input.reset(&checkpoint);
    Ok(RawKind::Ident(name))
}

fn primary(input: &mut &str) -> ModalResult<RawExpr> {
    ws.parse_next(input)?;
    if opt('(').parse_next(input)?.is_some() {
        let inner = cut_err(expr).parse_next(input)?;
        (ws, cut_err(')'))
            .context(expected("')'"))
            .parse_next(input)?;
        return Ok(inner);
    }
    let at = input.len();
    let kind = alt((
        string_literal.map(RawKind::String),
        number,
        keyword("true").value(RawKind::Bool(true)),
        keyword("false").value(RawKind::Bool(false)),
        array_literal,
        map_literal,
        message_ref,
        call_or_ident,
    ))
    .context(expected("expression"))
    .parse_next(input)?;
    Ok(RawExpr { at, kind })
}

fn postfix(input: &mut &str) -> ModalResult<RawExpr> {
    let mut target = primary(input)?;
    loop {
        let checkpoint = input.checkpoint();
        ws.parse_next(input)?;
        let at = target.at;
        if opt('.').parse_next(input)?.is_some() {
            ws.parse_next(input)?;
            let field = cut_err(field_name).parse_next(input)?;
            target = RawExpr {
                at,
                kind: RawKind::FieldAccess {
                    target: Box::new(target),
                    field,
                },
            };
        } else if opt('[').parse_next(input)?.is_some() {
            let index = cut_err(expr).parse_next(input)?;
            (ws, cut_err(']'))
                .context(expected("']'"))
                .parse_next(input)?;
            target = RawExpr {
                at,
                kind: RawKind::Index {
                    target: Box::new(target),
                    index: Box::new(index),
                },
            };
        } else {
            input.reset(&checkpoint);
            return Ok(target);
        }
    }
}

// -- Operators (precedence: or < and < not < equality < comparison
//    < additive < multiplicative < sign < postfix) -------------------------

fn unary(input: &mut &str) -> ModalResult<RawExpr> {
    ws.parse_next(input)?;
    let at = input.len();
    if let Some(sign) = opt(one_of(['+', '-'])).parse_next(input)? {
        let inner = cut_err(unary).parse_next(input)?;
        return Ok(RawExpr {
            at,
            kind: RawKind::Signed {
                negative: sign == '-',
                expr: Box::new(inner),
            },
        });
    }
    postfix(input)
}

fn fold<Op>(
    first: RawExpr,
    rest: Vec<(Op, RawExpr)>,
    make: impl Fn(Op, Box<RawExpr>, Box<RawExpr>) -> RawKind,
) -> RawExpr {
    rest.into_iter().fold(first, |left, (op, right)| RawExpr {
        at: left.at,
        kind: make(op, Box::new(left), Box::new(right)),
    })
}

fn arith(op: ArithOp, left: Box<RawExpr>, right: Box<RawExpr>) -> RawKind {
    RawKind::Arith { op, left, right }
}

fn compare(op: CompareOp, left: Box<RawExpr>, right: Box<RawExpr>) -> RawKind {
    RawKind::Compare { op, left, right }
}

fn multiplicative(input: &mut &str) -> ModalResult<RawExpr> {
    let first = unary(input)?;
    let rest: Vec<(ArithOp, RawExpr)> = repeat(
        0..,
        (
            preceded(
                ws,
                alt((
                    '*'.value(ArithOp::Mul),
                    '/'.value(ArithOp::Div),
                    '%'.value(ArithOp::Mod),
                )),
            ),
            cut_err(unary),
        ),
    )
    .parse_next(input)?;
    Ok(fold(first, rest, arith))
}

fn additive(input: &mut &str) -> ModalResult<RawExpr> {
    let first = multiplicative(input)?;
    let rest: Vec<(ArithOp, RawExpr)> = repeat(
        0..,
        (
            preceded(ws, alt(('+'.value(ArithOp::Add), '-'.value(ArithOp::Sub)))),
            cut_err(multiplicative),
        ),
    )
    .parse_next(input)?;
    Ok(fold(first, rest, arith))
}

fn comparison(input: &mut &str) -> ModalResult<RawExpr> {
    let first = additive(input)?;
    let rest: Vec<(CompareOp, RawExpr)> = repeat(
        0..,
        (
            preceded(
                ws,
                alt((
                    "<=".value(CompareOp::Lte),
                    ">=".value(CompareOp::Gte),
                    "<".value(CompareOp::Lt),
                    ">".value(CompareOp::Gt),
                )),
            ),
            cut_err(additive),
        ),
    )
    .parse_next(input)?;
    Ok(fold(first, rest, compare))
}

fn equality(input: &mut &str) -> ModalResult<RawExpr> {
    let first = comparison(input)?;
    let rest: Vec<(CompareOp, RawExpr)> = repeat(
        0..,
        (
            preceded(ws, alt(("==".value(CompareOp::Eq), "!=".value(CompareOp::Neq)))),
            cut_err(comparison),
        ),
    )
    .parse_next(input)?;
    Ok(fold(first, rest, compare))
}

fn not_expr(input: &mut &str) -> ModalResult<RawExpr> {
    ws.parse_next(input)?;
    let at = input.len();
    if opt(alt(('!'.void(), keyword("not"))))
        .parse_next(input)?
        .is_some()
    {
        let inner = cut_err(not_expr).parse_next(input)?;
        return Ok(RawExpr {
            at,
            kind: RawKind::Not(Box::new(inner)),
        });
    }
    equality(input)
}

fn and_expr(input: &mut &str) -> ModalResult<RawExpr> {
    let first = not_expr(input)?;
    let rest: Vec<((), RawExpr)> = repeat(
        0..,
        (
            preceded(ws, alt(("&&".void(), keyword("and")))),
            cut_err(not_expr),
        ),
    )
    .parse_next(input)?;
    Ok(fold(first, rest, |(), l, r| RawKind::And(l, r)))
}

fn or_expr(input: &mut &str) -> ModalResult<RawExpr> {
    let first = and_expr(input)?;
    let rest: Vec<((), RawExpr)> = repeat(
        0..,
        (
            preceded(ws, alt(("||".void(), keyword("or")))),
            cut_err(and_expr),
        ),
    )
    .parse_next(input)?;
    Ok(fold(first, rest, |(), l, r| RawKind::Or(l, r)))
}

pub(crate) fn expr(input: &mut &str) -> ModalResult<RawExpr> {
    ws.parse_next(input)?;
    or_expr(input)
}

// -- Statements -------------------------------------------------------------

fn statement(input: &mut &str) -> ModalResult<RawStatement> {
    ws.parse_next(input)?;
    let at = input.len();
    let stmt = if opt(keyword("let")).parse_next(input)?.is_some() {
        ws.parse_next(input)?;
        let name = cut_err(identifier).parse_next(input)?;
        (ws, cut_err('=')).context(expected("'='")).parse_next(input)?;
        let value = cut_err(expr).parse_next(input)?;
        RawStatement::Let { name, value }
    } else {
        let name = identifier.parse_next(input)?;
        (ws, cut_err('('))
            .context(expected("function call"))
            .parse_next(input)?;
        let args = cut_err(call_args).parse_next(input)?;
        RawStatement::Call { at, name, args }
    };
    opt((ws, ';')).parse_next(input)?;
    Ok(stmt)
}

// -- Rule definitions -------------------------------------------------------

fn rule_def(input: &mut &str) -> ModalResult<RawRule> {
    ws.parse_next(input)?;
    let at = input.len();
    keyword("rule").parse_next(input)?;
    ws.parse_next(input)?;
    let name = cut_err(string_literal)
        .context(expected("rule name"))
        .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(keyword("when"))
        .context(expected("'when'"))
        .parse_next(input)?;
    let when = cut_err(expr)
        .context(expected("rule condition"))
        .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(keyword("then"))
        .context(expected("'then'"))
        .parse_next(input)?;
    let then: Vec<RawStatement> = repeat(0.., statement).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(keyword("end"))
        .context(expected("statement or 'end'"))
        .parse_next(input)?;
    Ok(RawRule {
        at,
        name,
        when,
        then,
    })
}

// -- Pipeline definitions ---------------------------------------------------

fn stage_number(input: &mut &str) -> ModalResult<i32> {
    (opt('-'), digit1)
        .take()
        .try_map(|s: &str| s.parse::<i32>())
        .parse_next(input)
}

fn stage_rule(input: &mut &str) -> ModalResult<String> {
    ws.parse_next(input)?;
    keyword("rule").parse_next(input)?;
    ws.parse_next(input)?;
    let name = cut_err(string_literal)
        .context(expected("rule name"))
        .parse_next(input)?;
    opt((ws, ';')).parse_next(input)?;
    Ok(name)
}

fn stage_def(input: &mut &str) -> ModalResult<RawStage> {
    ws.parse_next(input)?;
    let at = input.len();
    keyword("stage").parse_next(input)?;
    ws.parse_next(input)?;
    let stage = cut_err(stage_number)
        .context(expected("stage number"))
        .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(keyword("match"))
        .context(expected("'match'"))
        .parse_next(input)?;
    ws.parse_next(input)?;
    let policy = cut_err(alt((
        keyword("all").value(StageMatch::All),
        keyword("either").value(StageMatch::Either),
        keyword("pass").value(StageMatch::Pass),
    )))
    .context(expected("all, either or pass"))
    .parse_next(input)?;
    let rules: Vec<String> = repeat(0.., stage_rule).parse_next(input)?;
    Ok(RawStage {
        at,
        stage,
        policy,
        rules,
    })
}

fn pipeline_def(input: &mut &str) -> ModalResult<RawPipeline> {
    ws.parse_next(input)?;
    let at = input.len();
    keyword("pipeline").parse_next(input)?;
    ws.parse_next(input)?;
    let name = cut_err(string_literal)
        .context(expected("pipeline name"))
        .parse_next(input)?;
    let stages: Vec<RawStage> = repeat(0.., stage_def).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(keyword("end"))
        .context(expected("stage or 'end'"))
        .parse_next(input)?;
    Ok(RawPipeline { at, name, stages })
}

// -- Top-level parsers ------------------------------------------------------

pub(crate) fn rules(input: &mut &str) -> ModalResult<Vec<RawRule>> {
    let rules: Vec<RawRule> = repeat(0.., rule_def).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(eof)
        .context(expected("rule definition"))
        .parse_next(input)?;
    Ok(rules)
}

pub(crate) fn pipelines(input: &mut &str) -> ModalResult<Vec<RawPipeline>> {
    let pipelines: Vec<RawPipeline> = repeat(0.., pipeline_def).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(eof)
        .context(expected("pipeline definition"))
        .parse_next(input)?;
    Ok(pipelines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(src: &str) -> RawKind {
        expr.parse(src).unwrap().kind
    }

    fn ident(name: &str) -> RawKind {
        RawKind::Ident(name.to_owned())
    }

    #[test]
    fn literals() {
        assert_eq!(parse_expr("42"), RawKind::Long(42));
        assert_eq!(parse_expr("0x1F"), RawKind::Long(31));
        assert_eq!(parse_expr("3.25"), RawKind::Double(3.25));
        assert_eq!(parse_expr("1e3"), RawKind::Double(1000.0));
        assert_eq!(parse_expr("TRUE"), RawKind::Bool(true));
        assert_eq!(parse_expr(r#""a\"b\\c\n""#), RawKind::String("a\"b\\c\n".into()));
        assert_eq!(parse_expr(r"'it\'s é'"), RawKind::String("it's é".into()));
    }

    #[test]
    fn precedence_and_before_or() {
        match parse_expr("a || b && c") {
            RawKind::Or(left, right) => {
                assert_eq!(left.kind, ident("a"));
                assert!(matches!(right.kind, RawKind::And(..)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn not_binds_looser_than_equality() {
        match parse_expr("not a == b") {
            RawKind::Not(inner) => assert!(matches!(inner.kind, RawKind::Compare { op: CompareOp::Eq, .. })),
            other => panic!("expected Not, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_before_addition() {
        match parse_expr("1 + 2 * 3") {
            RawKind::Arith { op: ArithOp::Add, right, .. } => {
                assert!(matches!(right.kind, RawKind::Arith { op: ArithOp::Mul, .. }));
            }
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_is_left_associative() {
        match parse_expr("10 - 4 - 3") {
            RawKind::Arith { op: ArithOp::Sub, left, right } => {
                assert!(matches!(left.kind, RawKind::Arith { op: ArithOp::Sub, .. }));
                assert_eq!(right.kind, RawKind::Long(3));
            }
            other => panic!("expected Sub, got {other:?}"),
        }
    }

    #[test]
    fn comparison_operators() {
        for (src, expected) in [
            ("a < 1", CompareOp::Lt),
            ("a <= 1", CompareOp::Lte),
            ("a > 1", CompareOp::Gt),
            ("a >= 1", CompareOp::Gte),
            ("a == 1", CompareOp::Eq),
            ("a != 1", CompareOp::Neq),
        ] {
            match parse_expr(src) {
                RawKind::Compare { op, .. } => assert_eq!(op, expected, "failed for {src}"),
                other => panic!("expected Compare for {src}, got {other:?}"),
            }
        }
    }

    #[test]
    fn message_ref_and_postfix() {
        match parse_expr("$message.headers.host[0]") {
            RawKind::Index { target, index } => {
                assert_eq!(index.kind, RawKind::Long(0));
                match target.kind {
                    RawKind::FieldAccess { target, field } => {
                        assert_eq!(field, "host");
                        assert_eq!(target.kind, RawKind::MessageRef("headers".into()));
                    }
                    other => panic!("expected FieldAccess, got {other:?}"),
                }
            }
            other => panic!("expected Index, got {other:?}"),
        }
    }

    #[test]
    fn calls_with_positional_and_named_args() {
        match parse_expr("f(1, \"x\")") {
            RawKind::Call { name, args: RawArgs::Positional(args) } => {
                assert_eq!(name, "f");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected positional call, got {other:?}"),
        }
        match parse_expr("f(value: 1, `odd name`: 2)") {
            RawKind::Call { args: RawArgs::Named(args), .. } => {
                assert_eq!(args[0].0, "value");
                assert_eq!(args[1].0, "odd name");
            }
            other => panic!("expected named call, got {other:?}"),
        }
        assert!(matches!(
            parse_expr("f()"),
            RawKind::Call { args: RawArgs::Positional(ref a), .. } if a.is_empty()
        ));
    }

    #[test]
    fn array_and_map_literals() {
        match parse_expr("[1, 2.5, \"s\"]") {
            RawKind::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("expected Array, got {other:?}"),
        }
        match parse_expr("{a: 1, \"b c\": [] }") {
            RawKind::Map(entries) => {
                assert_eq!(entries[0].0, "a");
                assert_eq!(entries[1].0, "b c");
            }
            other => panic!("expected Map, got {other:?}"),
        }
        assert_eq!(parse_expr("{}"), RawKind::Map(Vec::new()));
    }

    #[test]
    fn signs_and_negation() {
        assert!(matches!(parse_expr("-x"), RawKind::Signed { negative: true, .. }));
        assert!(matches!(parse_expr("!x"), RawKind::Not(_)));
    }

    #[test]
    fn comments_are_whitespace() {
        assert_eq!(parse_expr("/* lead */ 1 // trail"), RawKind::Long(1));
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert!(expr.parse("end").is_err());
        assert_eq!(parse_expr("ending"), ident("ending"));
    }

    #[test]
    fn rule_definition() {
        let src = r#"
            rule "tag" // comment
            when has_field("src")
            then
              let x = 1;
              set_field("seen", x)
              set_field("done", true);
            end"#;
        let parsed = rules.parse(src).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "tag");
        assert_eq!(parsed[0].then.len(), 3);
        assert!(matches!(parsed[0].then[0], RawStatement::Let { ref name, .. } if name == "x"));
    }

    #[test]
    fn pipeline_definition() {
        let src = r#"pipeline "main"
            stage 0 match all
              rule "a";
              rule "b";
            stage -1 match either rule "c";
            stage 5 match pass
            end"#;
        let parsed = pipelines.parse(src).unwrap();
        let stages = &parsed[0].stages;
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].rules, ["a", "b"]);
        assert_eq!(stages[1].stage, -1);
        assert_eq!(stages[1].policy, StageMatch::Either);
        assert_eq!(stages[2].policy, StageMatch::Pass);
        assert!(stages[2].rules.is_empty());
    }

    #[test]
    fn missing_end_is_an_error() {
        assert!(rules.parse(r#"rule "r" when true then"#).is_err());
        assert!(pipelines.parse(r#"pipeline "p" stage 0 match all"#).is_err());
    }

    #[test]
    fn keywords_allowed_as_names() {
        let RawKind::Call { args: RawArgs::Named(args), .. } =
            parse_expr("substring(value: $message.end, start: 0, end: 2)")
        else {
            panic!("expected a call with named arguments");
        };
        let names: Vec<&str> = args.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["value", "start", "end"]);
        assert_eq!(args[0].1.kind, RawKind::MessageRef("end".into()));
        assert!(matches!(parse_expr("{match: 1}"), RawKind::Map(_)));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(expr.parse("\"abc").is_err());
    }
}
