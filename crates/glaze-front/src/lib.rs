//! Glaze GLSL front-end.
//!
//! Tokenizes, parses, and semantically checks one shader compilation
//! unit, producing a typed HIR ([`glaze_hir::Unit`]) and an info log.

mod builtins;
mod call;
mod context;
mod decl;
mod diag;
mod expr;
mod grammar;
pub mod lexer;
mod options;
mod stmt;
mod symbol;

use glaze_hir::Unit;
use log::debug;

pub use call::FunctionDecl;
pub use context::{ContextPragma, ParseContext, PublicType};
pub use diag::{InfoSink, Severity};
pub use options::{
    FrontError, Messages, Options, Profile, ProfileMask, ResourceLimits, Stage, StageMask,
};
pub use symbol::{Param, Symbol, SymbolKind, SymbolTable};

/// The result of compiling one shader unit.
#[derive(Debug)]
pub struct Compilation {
    /// The populated HIR: root, linkage objects, call graph, and the
    /// `main` count.
    pub unit: Unit,
    /// The info log: errors and warnings in source order.
    pub log: String,
    pub error_count: u32,
    pub warning_count: u32,
    /// True iff no errors were emitted.
    pub success: bool,
    /// `#pragma` state gathered during the compile.
    pub pragma: ContextPragma,
    /// The version/profile actually compiled against (after any
    /// `#version` directive).
    pub version: u32,
    pub profile: Profile,
    /// The final symbol table (user scopes popped back to global).
    pub symbols: SymbolTable,
}

/// Compiles the concatenated source strings of one shader.
///
/// Empty and whitespace-only inputs are accepted and produce an empty
/// unit.
pub fn parse_shader_strings(strings: &[&str], options: &Options) -> Compilation {
    let mut options = options.clone();

    // empty shaders are okay
    if strings.is_empty() || strings.iter().all(|s| s.trim().is_empty()) {
        let ctx = ParseContext::new(options.clone());
        return finish(ctx, options);
    }

    let lexed = lexer::tokenize(strings);

    // #version overrides the configured version/profile
    let mut version_error = None;
    if let Some((version, profile_word, loc)) = &lexed.version {
        options.version = *version;
        match profile_word.as_deref() {
            None => {
                if matches!(*version, 100 | 300) {
                    options.profile = Profile::Es;
                } else if *version >= 150 && options.profile == Profile::None {
                    options.profile = Profile::Core;
                }
            }
            Some("es") => {
                options.profile = Profile::Es;
                if !matches!(*version, 100 | 300 | 310 | 320) {
                    version_error = Some((*loc, "es profile requires version 300 or 100"));
                }
            }
            Some("core") => options.profile = Profile::Core,
            Some("compatibility") => options.profile = Profile::Compatibility,
            Some(_) => {
                version_error =
                    Some((*loc, "expected 'es', 'core', or 'compatibility' profile"));
            }
        }
    }

    let mut ctx = ParseContext::new(options.clone());
    if let Some((loc, message)) = version_error {
        ctx.error(loc, message, "#version", "");
    }
    for (loc, message) in &lexed.errors {
        ctx.error(*loc, message, "", "");
    }
    for (loc, name, behavior) in &lexed.extensions {
        ctx.handle_extension(*loc, name, behavior);
    }
    for (loc, tokens) in &lexed.pragmas {
        ctx.handle_pragma(*loc, tokens);
    }

    builtins::seed(&mut ctx);
    ctx.table.seal_builtins();

    debug!(
        "parsing {} tokens as {} {} version {}",
        lexed.tokens.len(),
        ctx.profile.as_str(),
        ctx.stage.as_str(),
        ctx.version
    );
    grammar::Parser::new(&mut ctx, lexed.tokens).parse();

    ctx.finalize();
    finish(ctx, options)
}

fn finish(ctx: ParseContext, options: Options) -> Compilation {
    let error_count = ctx.sink.error_count();
    Compilation {
        unit: ctx.unit,
        log: ctx.sink.text().to_owned(),
        error_count,
        warning_count: ctx.sink.warning_count(),
        success: error_count == 0,
        pragma: ctx.pragma,
        version: options.version,
        profile: options.profile,
        symbols: ctx.table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_success() {
        let result = parse_shader_strings(&[], &Options::default());
        assert!(result.success);
        let result = parse_shader_strings(&["   \n\t  \n"], &Options::default());
        assert!(result.success);
        assert_eq!(result.error_count, 0);
    }

    #[test]
    fn version_directive_overrides_options() {
        let options = Options::new(110, Profile::None, Stage::Fragment);
        let result = parse_shader_strings(
            &["#version 300 es\nprecision mediump float;\nvoid main() {}\n"],
            &options,
        );
        assert!(result.success, "log: {}", result.log);
        assert_eq!(result.version, 300);
        assert_eq!(result.profile, Profile::Es);
    }

    #[test]
    fn bad_profile_word_reported() {
        let result = parse_shader_strings(
            &["#version 330 banana\nvoid main() {}\n"],
            &Options::default(),
        );
        assert!(!result.success);
        assert!(result.log.contains("profile"));
    }
}
