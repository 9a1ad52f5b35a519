//! The minimal statement compiler: lowers the recognized SQL shapes to
//! the plan IR. The full parser/optimizer lives outside the engine; this
//! recognizer covers exactly the statement forms the embedded server
//! executes, and everything else fails with a compile error.

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::field_type::{DecimalOption, FieldType, FieldTypeKind, LengthOption};
use cascade_lib::value::{Decimal, Value};

use crate::plan::{
    ColumnDef, CompareOp, Condition, CreateIndex, CreateTable, Insert, OrderKey, Projection,
    Query, ScalarExpr, Statement,
};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Placeholder(String),
    Punct(char),
}

fn compile_error(message: impl Into<String>) -> EngineError {
    let message = message.into();
    EngineError::new(ErrorKind::CompileError(message.clone()), message)
}

fn tokenize(sql: &str) -> EngineResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => text.push(c),
                        None => return Err(compile_error("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            ':' => {
                chars.next();
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(compile_error("empty placeholder name"));
                }
                tokens.push(Token::Placeholder(name));
            }
            '<' | '>' | '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Punct(match c {
                        '<' => '≤',
                        '>' => '≥',
                        _ => '≠',
                    }));
                } else if c == '<' && chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::Punct('≠'));
                } else if c == '!' {
                    return Err(compile_error("unexpected '!'"));
                } else {
                    tokens.push(Token::Punct(c));
                }
            }
            '(' | ')' | ',' | '=' | '*' | '-' | ';' | '.' => {
                chars.next();
                tokens.push(Token::Punct(c));
            }
            other => return Err(compile_error(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn expect_keyword(&mut self, kw: &str) -> EngineResult<()> {
        if self.keyword(kw) {
            Ok(())
        } else {
            Err(compile_error(format!("expected keyword {kw}")))
        }
    }

    fn expect_punct(&mut self, p: char) -> EngineResult<()> {
        match self.next() {
            Some(Token::Punct(c)) if c == p => Ok(()),
            other => Err(compile_error(format!("expected '{p}', found {other:?}"))),
        }
    }

    fn punct(&mut self, p: char) -> bool {
        if matches!(self.peek(), Some(Token::Punct(c)) if *c == p) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn ident(&mut self) -> EngineResult<String> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            other => Err(compile_error(format!("expected identifier, found {other:?}"))),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
            || matches!(self.peek(), Some(Token::Punct(';')))
    }

    fn finish(&mut self) -> EngineResult<()> {
        self.punct(';');
        if self.pos < self.tokens.len() {
            return Err(compile_error(format!(
                "unexpected trailing input: {:?}",
                self.peek()
            )));
        }
        Ok(())
    }
}

/// Compiles one SQL statement into the plan IR.
pub fn compile(sql: &str) -> EngineResult<Statement> {
    let tokens = tokenize(sql)?;
    let mut p = Parser { tokens, pos: 0 };
    let statement = if p.keyword("create") {
        if p.keyword("table") {
            parse_create_table(&mut p)?
        } else if p.keyword("index") {
            parse_create_index(&mut p)?
        } else {
            return Err(compile_error("expected TABLE or INDEX after CREATE"));
        }
    } else if p.keyword("drop") {
        p.expect_keyword("table")?;
        Statement::DropTable { name: p.ident()? }
    } else if p.keyword("insert") {
        let upsert = if p.keyword("or") {
            p.expect_keyword("replace")?;
            true
        } else {
            false
        };
        parse_insert(&mut p, upsert)?
    } else if p.keyword("upsert") {
        parse_insert(&mut p, true)?
    } else if p.keyword("select") {
        parse_select(&mut p)?
    } else {
        return Err(compile_error("unrecognized statement"));
    };
    p.finish()?;
    Ok(statement)
}

fn parse_field_type(p: &mut Parser) -> EngineResult<FieldType> {
    let name = p.ident()?.to_ascii_lowercase();
    let mut args = Vec::new();
    if p.punct('(') {
        loop {
            match p.next() {
                Some(Token::Number(n)) => {
                    let parsed: usize = n
                        .parse()
                        .map_err(|_| compile_error(format!("bad type argument {n}")))?;
                    args.push(parsed);
                }
                Some(Token::Punct('*')) => args.push(usize::MAX),
                other => {
                    return Err(compile_error(format!("bad type argument {other:?}")))
                }
            }
            if !p.punct(',') {
                break;
            }
        }
        p.expect_punct(')')?;
    }
    let field_type = match name.as_str() {
        "boolean" => FieldType::new(FieldTypeKind::Boolean),
        "tinyint" => FieldType::new(FieldTypeKind::Int1),
        "smallint" => FieldType::new(FieldTypeKind::Int2),
        "int" | "integer" => FieldType::new(FieldTypeKind::Int4),
        "bigint" => FieldType::new(FieldTypeKind::Int8),
        "real" | "float" => FieldType::new(FieldTypeKind::Float4),
        "double" => {
            // DOUBLE PRECISION
            p.keyword("precision");
            FieldType::new(FieldTypeKind::Float8)
        }
        "decimal" | "numeric" => FieldType::decimal(DecimalOption {
            precision: args.first().map(|&v| v as u8),
            scale: args.get(1).map(|&v| v as u8),
        }),
        "char" | "character" => FieldType::character(LengthOption {
            varying: false,
            length: args.first().copied(),
        }),
        "varchar" => FieldType::character(LengthOption {
            varying: true,
            length: args.first().copied(),
        }),
        "binary" => FieldType::octet(LengthOption {
            varying: false,
            length: args.first().copied(),
        }),
        "varbinary" => FieldType::octet(LengthOption {
            varying: true,
            length: args.first().copied(),
        }),
        "date" => FieldType::new(FieldTypeKind::Date),
        "time" => FieldType::new(FieldTypeKind::TimeOfDay),
        "timestamp" => FieldType::new(FieldTypeKind::TimePoint),
        "blob" => FieldType::new(FieldTypeKind::Blob),
        "clob" => FieldType::new(FieldTypeKind::Clob),
        other => return Err(compile_error(format!("unknown type '{other}'"))),
    };
    Ok(field_type)
}

fn parse_create_table(p: &mut Parser) -> EngineResult<Statement> {
    let name = p.ident()?;
    p.expect_punct('(')?;
    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    loop {
        if p.keyword("primary") {
            p.expect_keyword("key")?;
            p.expect_punct('(')?;
            loop {
                primary_key.push(p.ident()?);
                if !p.punct(',') {
                    break;
                }
            }
            p.expect_punct(')')?;
        } else {
            let column_name = p.ident()?;
            let field_type = parse_field_type(p)?;
            let mut not_null = false;
            let mut is_pk = false;
            loop {
                if p.keyword("not") {
                    p.expect_keyword("null")?;
                    not_null = true;
                } else if p.keyword("primary") {
                    p.expect_keyword("key")?;
                    is_pk = true;
                } else {
                    break;
                }
            }
            columns.push(ColumnDef {
                name: column_name,
                field_type,
                not_null,
                primary_key: is_pk,
            });
        }
        if !p.punct(',') {
            break;
        }
    }
    p.expect_punct(')')?;
    Ok(Statement::CreateTable(CreateTable {
        name,
        columns,
        primary_key,
    }))
}

fn parse_create_index(p: &mut Parser) -> EngineResult<Statement> {
    let name = p.ident()?;
    p.expect_keyword("on")?;
    let table = p.ident()?;
    p.expect_punct('(')?;
    let mut columns = Vec::new();
    loop {
        columns.push(p.ident()?);
        if !p.punct(',') {
            break;
        }
    }
    p.expect_punct(')')?;
    Ok(Statement::CreateIndex(CreateIndex {
        name,
        table,
        columns,
    }))
}

fn parse_scalar(p: &mut Parser) -> EngineResult<ScalarExpr> {
    match p.next() {
        Some(Token::Number(n)) => Ok(ScalarExpr::Literal(parse_number(&n, false)?)),
        Some(Token::Punct('-')) => match p.next() {
            Some(Token::Number(n)) => Ok(ScalarExpr::Literal(parse_number(&n, true)?)),
            other => Err(compile_error(format!("expected number, found {other:?}"))),
        },
        Some(Token::Str(s)) => Ok(ScalarExpr::Literal(Value::Character(s))),
        Some(Token::Placeholder(name)) => Ok(ScalarExpr::Placeholder(name)),
        Some(Token::Ident(word)) if word.eq_ignore_ascii_case("null") => {
            Ok(ScalarExpr::Literal(Value::Null))
        }
        Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => {
            Ok(ScalarExpr::Literal(Value::Boolean(true)))
        }
        Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => {
            Ok(ScalarExpr::Literal(Value::Boolean(false)))
        }
        Some(Token::Ident(word)) => {
            if p.punct('(') {
                let argument = parse_scalar(p)?;
                p.expect_punct(')')?;
                Ok(ScalarExpr::FunctionCall {
                    function: word.to_ascii_lowercase(),
                    argument: Box::new(argument),
                })
            } else {
                Ok(ScalarExpr::Column(word))
            }
        }
        other => Err(compile_error(format!("expected value, found {other:?}"))),
    }
}

fn parse_number(text: &str, negative: bool) -> EngineResult<Value> {
    if text.contains('.') {
        let parsed: f64 = text
            .parse()
            .map_err(|_| compile_error(format!("bad numeric literal {text}")))?;
        Ok(Value::Float8(if negative { -parsed } else { parsed }))
    } else {
        let parsed: i64 = text
            .parse()
            .map_err(|_| compile_error(format!("bad integer literal {text}")))?;
        Ok(Value::Int8(if negative { -parsed } else { parsed }))
    }
}

fn parse_insert(p: &mut Parser, upsert: bool) -> EngineResult<Statement> {
    p.expect_keyword("into")?;
    let table = p.ident()?;
    let mut columns = Vec::new();
    if p.punct('(') {
        loop {
            columns.push(p.ident()?);
            if !p.punct(',') {
                break;
            }
        }
        p.expect_punct(')')?;
    }
    p.expect_keyword("values")?;
    let mut rows = Vec::new();
    loop {
        p.expect_punct('(')?;
        let mut row = Vec::new();
        loop {
            row.push(parse_scalar(p)?);
            if !p.punct(',') {
                break;
            }
        }
        p.expect_punct(')')?;
        rows.push(row);
        if !p.punct(',') {
            break;
        }
    }
    Ok(Statement::Insert(Insert {
        table,
        columns,
        rows,
        upsert,
    }))
}

const AGGREGATE_NAMES: [&str; 5] = ["count", "sum", "min", "max", "avg"];

fn parse_projection(p: &mut Parser) -> EngineResult<Projection> {
    if p.punct('*') {
        return Ok(Projection::Star);
    }
    let name = p.ident()?;
    if p.punct('(') {
        let lowered = name.to_ascii_lowercase();
        if AGGREGATE_NAMES.contains(&lowered.as_str()) {
            let argument = if p.punct('*') {
                if !lowered.eq("count") {
                    return Err(compile_error(format!("{lowered}(*) is not supported")));
                }
                None
            } else {
                Some(p.ident()?)
            };
            p.expect_punct(')')?;
            return Ok(Projection::Aggregate {
                function: lowered,
                argument,
            });
        }
        let column = p.ident()?;
        p.expect_punct(')')?;
        return Ok(Projection::Scalar {
            function: name.to_ascii_lowercase(),
            column,
        });
    }
    Ok(Projection::Column(name))
}

fn parse_condition(p: &mut Parser) -> EngineResult<Condition> {
    let column = p.ident()?;
    let op = match p.next() {
        Some(Token::Punct('=')) => CompareOp::Eq,
        Some(Token::Punct('≠')) => CompareOp::Ne,
        Some(Token::Punct('<')) => CompareOp::Lt,
        Some(Token::Punct('≤')) => CompareOp::Le,
        Some(Token::Punct('>')) => CompareOp::Gt,
        Some(Token::Punct('≥')) => CompareOp::Ge,
        other => return Err(compile_error(format!("expected comparison, found {other:?}"))),
    };
    let value = parse_scalar(p)?;
    Ok(Condition { column, op, value })
}

fn parse_select(p: &mut Parser) -> EngineResult<Statement> {
    let mut projections = Vec::new();
    loop {
        projections.push(parse_projection(p)?);
        if !p.punct(',') {
            break;
        }
    }
    p.expect_keyword("from")?;
    let table = p.ident()?;
    let mut filter = Vec::new();
    if p.keyword("where") {
        loop {
            filter.push(parse_condition(p)?);
            if !p.keyword("and") {
                break;
            }
        }
    }
    let mut group_by = Vec::new();
    if p.keyword("group") {
        p.expect_keyword("by")?;
        loop {
            group_by.push(p.ident()?);
            if !p.punct(',') {
                break;
            }
        }
    }
    let mut order_by = Vec::new();
    if p.keyword("order") {
        p.expect_keyword("by")?;
        loop {
            let column = p.ident()?;
            let descending = if p.keyword("desc") {
                true
            } else {
                p.keyword("asc");
                false
            };
            order_by.push(OrderKey { column, descending });
            if !p.punct(',') {
                break;
            }
        }
    }
    if !p.at_end() {
        return Err(compile_error(format!(
            "unsupported clause at {:?}",
            p.peek()
        )));
    }
    Ok(Statement::Query(Query {
        table,
        projections,
        filter,
        group_by,
        order_by,
    }))
}

/// Parses a decimal literal (used by tests and clients preparing decimal
/// parameters from text).
pub fn parse_decimal_literal(text: &str) -> EngineResult<Decimal> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    let combined = format!("{int_part}{frac_part}");
    let unscaled: i128 = combined
        .parse()
        .map_err(|_| compile_error(format!("bad decimal literal {text}")))?;
    let unscaled = if negative { -unscaled } else { unscaled };
    Ok(Decimal::new(unscaled, -(frac_part.len() as i32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_with_inline_pk() {
        let s = compile("CREATE TABLE T (C0 INT PRIMARY KEY, C1 DOUBLE)").unwrap();
        let Statement::CreateTable(ct) = s else {
            panic!("wrong statement kind");
        };
        assert_eq!(ct.name, "T");
        assert_eq!(ct.columns.len(), 2);
        assert!(ct.columns[0].primary_key);
        assert_eq!(ct.columns[1].field_type.kind(), FieldTypeKind::Float8);
    }

    #[test]
    fn test_create_table_with_table_level_pk() {
        let s = compile("CREATE TABLE T (C0 INT, C1 INT, PRIMARY KEY (C0, C1))").unwrap();
        let Statement::CreateTable(ct) = s else {
            panic!("wrong statement kind");
        };
        assert_eq!(ct.primary_key, vec!["C0", "C1"]);
    }

    #[test]
    fn test_insert_multiple_rows() {
        let s = compile("INSERT INTO T (C0, C1) VALUES (1, 10), (2, -20)").unwrap();
        let Statement::Insert(insert) = s else {
            panic!("wrong statement kind");
        };
        assert_eq!(insert.rows.len(), 2);
        assert!(!insert.upsert);
        assert!(matches!(
            insert.rows[1][1],
            ScalarExpr::Literal(Value::Int8(-20))
        ));
    }

    #[test]
    fn test_upsert_forms() {
        for sql in [
            "INSERT OR REPLACE INTO T VALUES (1, 1)",
            "UPSERT INTO T VALUES (1, 1)",
        ] {
            let Statement::Insert(insert) = compile(sql).unwrap() else {
                panic!("wrong statement kind");
            };
            assert!(insert.upsert);
        }
    }

    #[test]
    fn test_select_with_filter_and_order() {
        let s = compile("SELECT C0, C1 FROM T WHERE C0 >= :low AND C1 = 5 ORDER BY C1 DESC")
            .unwrap();
        let Statement::Query(q) = s else {
            panic!("wrong statement kind");
        };
        assert_eq!(q.projections.len(), 2);
        assert_eq!(q.filter.len(), 2);
        assert_eq!(q.filter[0].op, CompareOp::Ge);
        assert!(matches!(
            q.filter[0].value,
            ScalarExpr::Placeholder(ref n) if n == "low"
        ));
        assert!(q.order_by[0].descending);
    }

    #[test]
    fn test_select_aggregates() {
        let s = compile("SELECT C0, COUNT(*), SUM(C1) FROM T GROUP BY C0").unwrap();
        let Statement::Query(q) = s else {
            panic!("wrong statement kind");
        };
        assert!(q.has_aggregates());
        assert_eq!(q.group_by, vec!["C0"]);
        assert!(matches!(
            q.projections[1],
            Projection::Aggregate { ref function, argument: None } if function == "count"
        ));
    }

    #[test]
    fn test_scalar_function_projection() {
        let s = compile("SELECT UPPER(C1) FROM T").unwrap();
        let Statement::Query(q) = s else {
            panic!("wrong statement kind");
        };
        assert!(matches!(
            q.projections[0],
            Projection::Scalar { ref function, .. } if function == "upper"
        ));
    }

    #[test]
    fn test_unknown_statement_is_compile_error() {
        let err = compile("VACUUM FULL").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::CompileError(_)));
        let err = compile("SELECT * FROM T LIMIT 1").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::CompileError(_)));
    }

    #[test]
    fn test_decimal_literal() {
        let d = parse_decimal_literal("-12.340").unwrap();
        assert_eq!(d, Decimal::new(-1234, -2));
    }
}
