//! GLSL tokenizer.
//!
//! Source strings are comment-stripped and lexed line by line so that
//! preprocessor-style directives (`#version`, `#pragma`, `#extension`,
//! `#line`) can be peeled off before the token grammar sees them.

use logos::Logos;

use glaze_hir::Loc;

/// A numeric literal value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i32),
    Uint(u32),
    Float(f64),
}

fn lex_dec(lex: &mut logos::Lexer<Token>) -> Option<Number> {
    let slice = lex.slice();
    let unsigned = slice.ends_with(['u', 'U']);
    let digits = slice.trim_end_matches(['u', 'U']);
    // a leading zero makes an octal literal
    let (digits, radix) = if digits.len() > 1
        && digits.starts_with('0')
        && digits.bytes().all(|b| (b'0'..=b'7').contains(&b))
    {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };
    if unsigned {
        u32::from_str_radix(digits, radix).ok().map(Number::Uint)
    } else {
        // wrap rather than reject out-of-range literals
        u32::from_str_radix(digits, radix)
            .ok()
            .map(|v| Number::Int(v as i32))
    }
}

fn lex_hex(lex: &mut logos::Lexer<Token>) -> Option<Number> {
    let slice = lex.slice();
    let unsigned = slice.ends_with(['u', 'U']);
    let digits = slice.trim_end_matches(['u', 'U']);
    let value = u32::from_str_radix(&digits[2..], 16).ok()?;
    Some(if unsigned {
        Number::Uint(value)
    } else {
        Number::Int(value as i32)
    })
}

fn lex_float(lex: &mut logos::Lexer<Token>) -> Option<Number> {
    let digits = lex.slice().trim_end_matches(['f', 'F']);
    digits.parse::<f64>().ok().map(Number::Float)
}

#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
pub enum Token {
    // ---- type keywords ----
    #[token("void")]
    Void,
    #[token("float")]
    Float,
    #[token("double")]
    Double,
    #[token("int")]
    Int,
    #[token("uint")]
    Uint,
    #[token("bool")]
    Bool,
    #[token("vec2")]
    Vec2,
    #[token("vec3")]
    Vec3,
    #[token("vec4")]
    Vec4,
    #[token("dvec2")]
    DVec2,
    #[token("dvec3")]
    DVec3,
    #[token("dvec4")]
    DVec4,
    #[token("ivec2")]
    IVec2,
    #[token("ivec3")]
    IVec3,
    #[token("ivec4")]
    IVec4,
    #[token("uvec2")]
    UVec2,
    #[token("uvec3")]
    UVec3,
    #[token("uvec4")]
    UVec4,
    #[token("bvec2")]
    BVec2,
    #[token("bvec3")]
    BVec3,
    #[token("bvec4")]
    BVec4,
    #[token("mat2")]
    Mat2,
    #[token("mat3")]
    Mat3,
    #[token("mat4")]
    Mat4,
    #[token("mat2x2")]
    Mat2x2,
    #[token("mat2x3")]
    Mat2x3,
    #[token("mat2x4")]
    Mat2x4,
    #[token("mat3x2")]
    Mat3x2,
    #[token("mat3x3")]
    Mat3x3,
    #[token("mat3x4")]
    Mat3x4,
    #[token("mat4x2")]
    Mat4x2,
    #[token("mat4x3")]
    Mat4x3,
    #[token("mat4x4")]
    Mat4x4,
    #[token("dmat2")]
    DMat2,
    #[token("dmat3")]
    DMat3,
    #[token("dmat4")]
    DMat4,
    #[token("sampler1D")]
    Sampler1D,
    #[token("sampler2D")]
    Sampler2D,
    #[token("sampler3D")]
    Sampler3D,
    #[token("samplerCube")]
    SamplerCube,
    #[token("sampler2DShadow")]
    Sampler2DShadow,
    #[token("samplerCubeShadow")]
    SamplerCubeShadow,
    #[token("sampler2DArray")]
    Sampler2DArray,
    #[token("sampler2DArrayShadow")]
    Sampler2DArrayShadow,
    #[token("isampler2D")]
    ISampler2D,
    #[token("isampler3D")]
    ISampler3D,
    #[token("usampler2D")]
    USampler2D,
    #[token("sampler2DMS")]
    Sampler2DMs,
    #[token("samplerBuffer")]
    SamplerBuffer,
    #[token("sampler2DRect")]
    Sampler2DRect,

    // ---- storage and qualifier keywords ----
    #[token("const")]
    Const,
    #[token("in")]
    In,
    #[token("out")]
    Out,
    #[token("inout")]
    InOut,
    #[token("attribute")]
    Attribute,
    #[token("varying")]
    Varying,
    #[token("uniform")]
    Uniform,
    #[token("buffer")]
    Buffer,
    #[token("shared")]
    Shared,
    #[token("centroid")]
    Centroid,
    #[token("patch")]
    Patch,
    #[token("sample")]
    Sample,
    #[token("flat")]
    Flat,
    #[token("smooth")]
    Smooth,
    #[token("noperspective")]
    NoPerspective,
    #[token("invariant")]
    Invariant,
    #[token("coherent")]
    Coherent,
    #[token("volatile")]
    Volatile,
    #[token("restrict")]
    Restrict,
    #[token("readonly")]
    ReadOnly,
    #[token("writeonly")]
    WriteOnly,
    #[token("layout")]
    Layout,
    #[token("precision")]
    Precision,
    #[token("highp")]
    HighP,
    #[token("mediump")]
    MediumP,
    #[token("lowp")]
    LowP,
    #[token("struct")]
    Struct,

    // ---- control keywords ----
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("discard")]
    Discard,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ---- operators ----
    #[token("+=")]
    AddAssign,
    #[token("-=")]
    SubAssign,
    #[token("*=")]
    MulAssign,
    #[token("/=")]
    DivAssign,
    #[token("%=")]
    ModAssign,
    #[token("&=")]
    AndAssign,
    #[token("|=")]
    OrAssign,
    #[token("^=")]
    XorAssign,
    #[token("<<=")]
    LeftShiftAssign,
    #[token(">>=")]
    RightShiftAssign,
    #[token("<<")]
    LeftShift,
    #[token(">>")]
    RightShift,
    #[token("++")]
    Increment,
    #[token("--")]
    Decrement,
    #[token("&&")]
    AndOp,
    #[token("||")]
    OrOp,
    #[token("^^")]
    XorOp,
    #[token("==")]
    EqualOp,
    #[token("!=")]
    NotEqualOp,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Assign,
    #[token("!")]
    Bang,
    #[token("&")]
    Ampersand,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,

    // ---- literals and identifiers ----
    #[regex(r"0[xX][0-9a-fA-F]+[uU]?", lex_hex)]
    #[regex(r"[0-9]+[uU]?", lex_dec)]
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fF]?", lex_float)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fF]?", lex_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fF]?", lex_float)]
    #[regex(r"[0-9]+[fF]", lex_float)]
    Literal(Number),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_owned())]
    Identifier(String),
}

/// The lexed form of a shader: the token stream plus everything the
/// directive layer peeled off.
#[derive(Debug, Default)]
pub struct LexedShader {
    pub tokens: Vec<(Token, Loc)>,
    /// `#version` number, optional profile word, and its location.
    pub version: Option<(u32, Option<String>, Loc)>,
    /// `#pragma` token lists in source order.
    pub pragmas: Vec<(Loc, Vec<String>)>,
    /// `#extension` (name, behavior) pairs.
    pub extensions: Vec<(Loc, String, String)>,
    /// Malformed directives and unlexable characters.
    pub errors: Vec<(Loc, String)>,
}

/// Replaces comments with spaces, preserving newlines so line numbers
/// survive.
pub fn strip_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                if chars[i] == '\n' {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
                i += 1;
            }
            i = (i + 2).min(chars.len());
            out.push(' ');
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Splits a directive body into pragma-style tokens: identifier and
/// number runs, and single punctuation characters.
fn pragma_tokens(body: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_alphanumeric() || c == '_' {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    word.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(word);
        } else {
            tokens.push(c.to_string());
            chars.next();
        }
    }
    tokens
}

/// Tokenizes all source strings of a compilation unit.
pub fn tokenize(strings: &[&str]) -> LexedShader {
    let mut out = LexedShader::default();

    for (string_index, source) in strings.iter().enumerate() {
        let stripped = strip_comments(source);
        let mut line_number: u32 = 1;
        for line in stripped.lines() {
            let loc = Loc::new(string_index, line_number);
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                handle_directive(directive.trim_start(), loc, &mut line_number, &mut out);
            } else {
                let mut lexer = Token::lexer(line);
                while let Some(result) = lexer.next() {
                    match result {
                        Ok(token) => out.tokens.push((token, loc)),
                        Err(()) => out
                            .errors
                            .push((loc, format!("unexpected character '{}'", lexer.slice()))),
                    }
                }
            }
            line_number += 1;
        }
    }

    out
}

fn handle_directive(directive: &str, loc: Loc, line_number: &mut u32, out: &mut LexedShader) {
    let mut words = directive.split_whitespace();
    match words.next() {
        Some("version") => {
            match words.next().and_then(|w| w.parse::<u32>().ok()) {
                Some(version) => {
                    let profile = words.next().map(str::to_owned);
                    out.version = Some((version, profile, loc));
                }
                None => out
                    .errors
                    .push((loc, "#version directive requires a number".to_owned())),
            }
        }
        Some("pragma") => {
            let body = directive.strip_prefix("pragma").unwrap_or("");
            out.pragmas.push((loc, pragma_tokens(body)));
        }
        Some("extension") => {
            let body = directive.strip_prefix("extension").unwrap_or("");
            let tokens = pragma_tokens(body);
            // expected shape: name : behavior
            if tokens.len() == 3 && tokens[1] == ":" {
                out.extensions.push((loc, tokens[0].clone(), tokens[2].clone()));
            } else {
                out.errors
                    .push((loc, "malformed #extension directive".to_owned()));
            }
        }
        Some("line") => {
            if let Some(n) = words.next().and_then(|w| w.parse::<u32>().ok()) {
                // the next physical line takes this number
                *line_number = n.saturating_sub(1);
            }
        }
        // remaining preprocessor directives were handled upstream
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(source: &str) -> Vec<Token> {
        tokenize(&[source]).tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        let tokens = tokens_of("void main() { float x; }");
        assert_eq!(
            tokens,
            vec![
                Token::Void,
                Token::Identifier("main".to_owned()),
                Token::LeftParen,
                Token::RightParen,
                Token::LeftBrace,
                Token::Float,
                Token::Identifier("x".to_owned()),
                Token::Semicolon,
                Token::RightBrace,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        let tokens = tokens_of("1 2u 0x1F 010 3.5 .5 2e3 7f");
        assert_eq!(
            tokens,
            vec![
                Token::Literal(Number::Int(1)),
                Token::Literal(Number::Uint(2)),
                Token::Literal(Number::Int(31)),
                Token::Literal(Number::Int(8)),
                Token::Literal(Number::Float(3.5)),
                Token::Literal(Number::Float(0.5)),
                Token::Literal(Number::Float(2000.0)),
                Token::Literal(Number::Float(7.0)),
            ]
        );
    }

    #[test]
    fn comments_are_stripped() {
        let tokens = tokens_of("int a; // trailing\n/* block\n spanning */ int b;");
        assert_eq!(tokens.len(), 6);
        // the block comment preserved the newline: 'int b' is on line 3
        let lexed = tokenize(&["int a; // trailing\n/* block\n spanning */ int b;"]);
        assert_eq!(lexed.tokens.last().unwrap().1.line, 3);
    }

    #[test]
    fn version_directive() {
        let lexed = tokenize(&["#version 300 es\nvoid main() {}"]);
        let (version, profile, loc) = lexed.version.unwrap();
        assert_eq!(version, 300);
        assert_eq!(profile.as_deref(), Some("es"));
        assert_eq!(loc.line, 1);
        assert!(!lexed.tokens.is_empty());
    }

    #[test]
    fn pragma_tokenization() {
        let lexed = tokenize(&["#pragma optimize(on)\n#pragma STDGL something"]);
        assert_eq!(lexed.pragmas.len(), 2);
        assert_eq!(lexed.pragmas[0].1, vec!["optimize", "(", "on", ")"]);
        assert_eq!(lexed.pragmas[1].1, vec!["STDGL", "something"]);
    }

    #[test]
    fn extension_directive() {
        let lexed = tokenize(&["#extension GL_ARB_texture_gather : enable"]);
        assert_eq!(lexed.extensions.len(), 1);
        assert_eq!(lexed.extensions[0].1, "GL_ARB_texture_gather");
        assert_eq!(lexed.extensions[0].2, "enable");
    }

    #[test]
    fn operators_lex_longest_first() {
        let tokens = tokens_of("a <<= b << c <= d < e");
        assert!(tokens.contains(&Token::LeftShiftAssign));
        assert!(tokens.contains(&Token::LeftShift));
        assert!(tokens.contains(&Token::LessEqual));
        assert!(tokens.contains(&Token::Less));
    }

    #[test]
    fn unexpected_character_reported() {
        let lexed = tokenize(&["int a @ b;"]);
        assert_eq!(lexed.errors.len(), 1);
        assert!(lexed.errors[0].1.contains('@'));
    }
}
