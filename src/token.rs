//! The token stream interface the core consumes (§6 "Input").
//!
//! Lexing and preprocessing are out of scope (§1); this module only defines
//! the shape of a token as the parser requires it.

use crate::source::Coordinates;

/// Token classification. `IDENTIFIER` vs `TYPE_NAME` is the typedef-sensitive
/// distinction from §4.5: the lexer (out of scope) always assigns
/// `raw_code`; the parser re-derives `code` as tokens are consumed, since
/// whether an identifier denotes a type name depends on what's in scope at
/// the point it's seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Identifier,
    TypeName,
    IntConstant,
    FloatConstant,
    StringLiteral,
    CharConstant,

    // Keywords
    KwAuto,
    KwBreak,
    KwCase,
    KwChar,
    KwConst,
    KwContinue,
    KwDefault,
    KwDo,
    KwDouble,
    KwElse,
    KwEnum,
    KwExtern,
    KwFloat,
    KwFor,
    KwGoto,
    KwIf,
    KwInline,
    KwInt,
    KwLong,
    KwRegister,
    KwRestrict,
    KwReturn,
    KwShort,
    KwSigned,
    KwSizeof,
    KwStatic,
    KwStruct,
    KwSwitch,
    KwTypedef,
    KwUnion,
    KwUnsigned,
    KwVoid,
    KwVolatile,
    KwWhile,
    KwBool,
    KwVaArg,

    // Punctuators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Colon,
    Question,
    Dot,
    Ellipsis,
    Arrow,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Star,
    Slash,
    Percent,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Tilde,
    Bang,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,

    // Attribute keyword, recognised and otherwise skipped (§4.5)
    KwAttribute,

    Eof,
    /// Sentinel for a malformed token that the lexer already diagnosed.
    Error,
}

impl Code {
    #[must_use]
    pub fn is_keyword_type_specifier(self) -> bool {
        use Code::*;
        matches!(
            self,
            KwVoid
                | KwChar
                | KwShort
                | KwInt
                | KwLong
                | KwFloat
                | KwDouble
                | KwSigned
                | KwUnsigned
                | KwBool
                | KwStruct
                | KwUnion
                | KwEnum
        )
    }

    #[must_use]
    pub fn is_declaration_specifier_start(self) -> bool {
        use Code::*;
        self.is_keyword_type_specifier()
            || matches!(
                self,
                KwTypedef
                    | KwExtern
                    | KwStatic
                    | KwAuto
                    | KwRegister
                    | KwConst
                    | KwVolatile
                    | KwRestrict
                    | KwInline
                    | TypeName
            )
    }
}

/// The tagged payload of a token (§3 "Token").
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Int(i64),
    Float(f64),
    Str(String),
}

/// `(coordinates, code, raw_code, text, value)` exactly as §3 specifies.
#[derive(Debug, Clone)]
pub struct Token {
    pub coordinates: Coordinates,
    pub code: Code,
    pub raw_code: Code,
    pub text: String,
    pub value: TokenValue,
}

impl Token {
    #[must_use]
    pub fn new(index: u32, code: Code, text: impl Into<String>) -> Self {
        Token {
            coordinates: Coordinates::single(index),
            code,
            raw_code: code,
            text: text.into(),
            value: TokenValue::None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: TokenValue) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn int_value(&self) -> Option<i64> {
        match self.value {
            TokenValue::Int(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn float_value(&self) -> Option<f64> {
        match self.value {
            TokenValue::Float(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn str_value(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// An in-memory token stream, as produced by the out-of-scope lexer.
///
/// A real driver would adapt its lexer's output into this shape; tests
/// and this crate's own fixtures build one directly with [`TokenStream::new`].
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    #[must_use]
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.code) != Some(Code::Eof) {
            let idx = tokens.len() as u32;
            tokens.push(Token::new(idx, Code::Eof, ""));
        }
        TokenStream { tokens }
    }

    #[must_use]
    pub fn get(&self, index: u32) -> &Token {
        &self.tokens[index as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
