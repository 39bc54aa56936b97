//! A minimal hand-rolled tokenizer for building test fixtures.
//!
//! Lexing is explicitly out of this crate's scope (§1); these tests need
//! *some* way to turn a C-like snippet into a `TokenStream`, so this module
//! implements just enough of one - identifiers/keywords, integer literals,
//! string literals, and the punctuators the integration tests below use.
//! It is test-only tooling, not a stand-in for a real lexer.

use cfront::source::Coordinates;
use cfront::token::{Code, Token, TokenStream, TokenValue};

fn keyword(word: &str) -> Option<Code> {
    Some(match word {
        "auto" => Code::KwAuto,
        "break" => Code::KwBreak,
        "case" => Code::KwCase,
        "char" => Code::KwChar,
        "const" => Code::KwConst,
        "continue" => Code::KwContinue,
        "default" => Code::KwDefault,
        "do" => Code::KwDo,
        "double" => Code::KwDouble,
        "else" => Code::KwElse,
        "enum" => Code::KwEnum,
        "extern" => Code::KwExtern,
        "float" => Code::KwFloat,
        "for" => Code::KwFor,
        "goto" => Code::KwGoto,
        "if" => Code::KwIf,
        "inline" => Code::KwInline,
        "int" => Code::KwInt,
        "long" => Code::KwLong,
        "register" => Code::KwRegister,
        "restrict" => Code::KwRestrict,
        "return" => Code::KwReturn,
        "short" => Code::KwShort,
        "signed" => Code::KwSigned,
        "sizeof" => Code::KwSizeof,
        "static" => Code::KwStatic,
        "struct" => Code::KwStruct,
        "switch" => Code::KwSwitch,
        "typedef" => Code::KwTypedef,
        "union" => Code::KwUnion,
        "unsigned" => Code::KwUnsigned,
        "void" => Code::KwVoid,
        "volatile" => Code::KwVolatile,
        "while" => Code::KwWhile,
        "_Bool" => Code::KwBool,
        "__builtin_va_arg" => Code::KwVaArg,
        "__attribute__" => Code::KwAttribute,
        _ => return None,
    })
}

/// Tokenize `src`, producing a [`TokenStream`] ready for
/// `cfront::parser::parse_translation_unit`/`cfront::compile`.
#[must_use]
pub fn lex(src: &str) -> TokenStream {
    let bytes = src.as_bytes();
    let mut i = 0usize;
    let mut tokens = Vec::new();

    macro_rules! push {
        ($code:expr, $text:expr) => {{
            let idx = tokens.len() as u32;
            tokens.push(Token::new(idx, $code, $text));
        }};
    }

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i += 2;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i] as char).is_ascii_alphanumeric() {
                i += 1;
            }
            let text = &src[start..i];
            let value: i64 = text.trim_end_matches(['u', 'U', 'l', 'L']).parse().unwrap_or(0);
            let idx = tokens.len() as u32;
            tokens.push(Token::new(idx, Code::IntConstant, text).with_value(TokenValue::Int(value)));
            continue;
        }
        if c == '"' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
            let text = &src[start..i];
            let inner = &text[1..text.len() - 1];
            let idx = tokens.len() as u32;
            tokens.push(Token::new(idx, Code::StringLiteral, text).with_value(TokenValue::Str(inner.to_string())));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && ((bytes[i] as char).is_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let text = &src[start..i];
            match keyword(text) {
                Some(code) => push!(code, text),
                None => push!(Code::Identifier, text),
            }
            continue;
        }

        // Punctuators, longest match first.
        let rest = &src[i..];
        let three = rest.get(..3);
        let two = rest.get(..2);
        if three == Some("...") {
            push!(Code::Ellipsis, "...");
            i += 3;
            continue;
        }
        if two == Some("<<=") || two == Some(">>=") {
            // handled below as three-char ops
        }
        if rest.starts_with("<<=") {
            push!(Code::ShlAssign, "<<=");
            i += 3;
            continue;
        }
        if rest.starts_with(">>=") {
            push!(Code::ShrAssign, ">>=");
            i += 3;
            continue;
        }
        if let Some(two) = two {
            let code = match two {
                "->" => Some(Code::Arrow),
                "++" => Some(Code::PlusPlus),
                "--" => Some(Code::MinusMinus),
                "+=" => Some(Code::PlusAssign),
                "-=" => Some(Code::MinusAssign),
                "*=" => Some(Code::StarAssign),
                "/=" => Some(Code::SlashAssign),
                "%=" => Some(Code::PercentAssign),
                "&=" => Some(Code::AndAssign),
                "|=" => Some(Code::OrAssign),
                "^=" => Some(Code::XorAssign),
                "&&" => Some(Code::AmpAmp),
                "||" => Some(Code::PipePipe),
                "==" => Some(Code::Eq),
                "!=" => Some(Code::Ne),
                "<=" => Some(Code::Le),
                ">=" => Some(Code::Ge),
                "<<" => Some(Code::Shl),
                ">>" => Some(Code::Shr),
                _ => None,
            };
            if let Some(code) = code {
                push!(code, two.to_string());
                i += 2;
                continue;
            }
        }
        let code = match c {
            '(' => Code::LParen,
            ')' => Code::RParen,
            '{' => Code::LBrace,
            '}' => Code::RBrace,
            '[' => Code::LBracket,
            ']' => Code::RBracket,
            ';' => Code::Semicolon,
            ',' => Code::Comma,
            ':' => Code::Colon,
            '?' => Code::Question,
            '.' => Code::Dot,
            '=' => Code::Assign,
            '+' => Code::Plus,
            '-' => Code::Minus,
            '*' => Code::Star,
            '/' => Code::Slash,
            '%' => Code::Percent,
            '&' => Code::Amp,
            '|' => Code::Pipe,
            '^' => Code::Caret,
            '~' => Code::Tilde,
            '!' => Code::Bang,
            '<' => Code::Lt,
            '>' => Code::Gt,
            other => panic!("unrecognized character {other:?} in test source"),
        };
        push!(code, c.to_string());
        i += 1;
    }

    let idx = tokens.len() as u32;
    tokens.push(Token { coordinates: Coordinates::single(idx), code: Code::Eof, raw_code: Code::Eof, text: String::new(), value: TokenValue::None });
    TokenStream::new(tokens)
}
