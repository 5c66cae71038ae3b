//! Recursive-descent grammar driver.
//!
//! Walks the token stream and fires the parse-context handlers in
//! reduction order; all semantic decisions live in the context, not
//! here. Syntax errors go through `parser_error` and recovery skips to
//! a synchronizing token.

use std::rc::Rc;

use glaze_hir::{
    ArraySizes, BasicType, Field, Handle, Loc, Node, Op, Qualifier, Sampler, SamplerDim,
    SamplerScalar, Storage, Type,
};

use crate::call::FunctionDecl;
use crate::context::{ParseContext, PublicType};
use crate::lexer::{Number, Token};
use crate::options::Stage;
use crate::symbol::{Param, SymbolKind};

pub struct Parser<'ctx> {
    ctx: &'ctx mut ParseContext,
    tokens: Vec<(Token, Loc)>,
    pos: usize,
    panicking: bool,
}

impl<'ctx> Parser<'ctx> {
    pub fn new(ctx: &'ctx mut ParseContext, tokens: Vec<(Token, Loc)>) -> Self {
        ctx.tokens_before_eof = !tokens.is_empty();
        Self {
            ctx,
            tokens,
            pos: 0,
            panicking: false,
        }
    }

    // -----------------------------------------------------------------
    // Cursor
    // -----------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn loc(&self) -> Loc {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or_default()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<Token> {
        let (token, loc) = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        self.ctx.current_loc = loc;
        Some(token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, message: &str) -> bool {
        if self.accept(token) {
            true
        } else {
            self.syntax_error(message);
            false
        }
    }

    fn syntax_error(&mut self, message: &str) {
        if self.panicking {
            return;
        }
        self.panicking = true;
        if self.at_end() {
            self.ctx.after_eof = true;
        } else {
            self.ctx.current_loc = self.loc();
        }
        let message = format!("syntax error, {message}");
        self.ctx.parser_error(&message);
    }

    /// Skip forward to just past the next `;` or to a `}`.
    fn synchronize(&mut self) {
        self.panicking = false;
        while let Some(token) = self.peek() {
            match token {
                Token::Semicolon => {
                    self.advance();
                    return;
                }
                Token::RightBrace | Token::LeftBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Top level
    // -----------------------------------------------------------------

    pub fn parse(&mut self) {
        while !self.at_end() {
            let before = self.pos;
            self.parse_external_declaration();
            if self.panicking {
                self.synchronize();
            }
            if self.pos == before {
                // make forward progress no matter what
                self.advance();
                self.panicking = false;
            }
        }
        self.ctx.after_eof = true;
    }

    fn parse_external_declaration(&mut self) {
        match self.peek() {
            Some(Token::Semicolon) => {
                self.advance();
            }
            Some(Token::Precision) => self.parse_precision_statement(),
            Some(_) => self.parse_declaration_or_function(),
            None => {}
        }
    }

    fn parse_precision_statement(&mut self) {
        let loc = self.loc();
        self.advance(); // precision
        let precision = match self.peek() {
            Some(Token::HighP) => glaze_hir::Precision::High,
            Some(Token::MediumP) => glaze_hir::Precision::Medium,
            Some(Token::LowP) => glaze_hir::Precision::Low,
            _ => {
                self.syntax_error("expected precision qualifier");
                return;
            }
        };
        self.advance();
        let Some(public_type) = self.parse_type_specifier() else {
            self.syntax_error("expected type in precision statement");
            return;
        };
        self.ctx.set_default_precision(loc, &public_type, precision);
        self.expect(&Token::Semicolon, "expected ';'");
    }

    /// Anything that starts with qualifiers: variable declarations,
    /// functions, blocks, qualifier defaults, requalification.
    fn parse_declaration_or_function(&mut self) {
        let start_loc = self.loc();
        let qualifier = self.parse_type_qualifier();

        match self.peek() {
            // `layout(...) uniform;` and friends
            Some(Token::Semicolon) => {
                self.advance();
                self.ctx.update_qualifier_defaults(start_loc, qualifier);
            }
            Some(Token::Identifier(name)) if !self.is_type_name(name) => {
                let name = name.clone();
                if self.peek_ahead(1) == Some(&Token::LeftBrace) {
                    self.advance(); // block name
                    self.parse_block(qualifier, name, start_loc);
                } else {
                    // requalification of existing identifiers
                    self.advance();
                    self.ctx.add_qualifier_to_existing(start_loc, qualifier, &name);
                    while self.accept(&Token::Comma) {
                        match self.advance() {
                            Some(Token::Identifier(next)) => {
                                self.ctx.add_qualifier_to_existing(start_loc, qualifier, &next);
                            }
                            _ => {
                                self.syntax_error("expected identifier");
                                return;
                            }
                        }
                    }
                    self.expect(&Token::Semicolon, "expected ';'");
                }
            }
            _ => {
                let Some(mut public_type) = self.parse_type_specifier() else {
                    self.syntax_error("expected declaration");
                    return;
                };
                merge_into_specifier(&mut public_type, &qualifier);
                self.ctx.precision_qualifier_check(start_loc, &mut public_type);

                match self.peek().cloned() {
                    Some(Token::Semicolon) => {
                        self.advance();
                        self.ctx
                            .update_typed_defaults(start_loc, public_type.qualifier, None);
                    }
                    Some(Token::Identifier(name)) => {
                        let id_loc = self.loc();
                        self.advance();
                        if self.check(&Token::LeftParen) {
                            self.advance();
                            self.parse_function(public_type, name, id_loc);
                        } else {
                            if self.ctx.table.at_global_level() {
                                let mut q = public_type.qualifier;
                                self.ctx.pipe_in_out_fix(id_loc, &mut q);
                                public_type.qualifier = q;
                                let q = public_type.qualifier;
                                self.ctx.global_qualifier_check(id_loc, &q, &public_type);
                            }
                            self.parse_declarator_list(public_type, name, id_loc);
                        }
                    }
                    _ => self.syntax_error("expected declaration"),
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Qualifiers
    // -----------------------------------------------------------------

    fn parse_type_qualifier(&mut self) -> Qualifier {
        let mut qualifier = Qualifier::default();
        loop {
            let loc = self.loc();
            let mut single = Qualifier::default();
            match self.peek() {
                Some(Token::Const) => single.storage = Storage::Const,
                Some(Token::In) => single.storage = Storage::In,
                Some(Token::Out) => single.storage = Storage::Out,
                Some(Token::InOut) => single.storage = Storage::InOut,
                Some(Token::Uniform) => single.storage = Storage::Uniform,
                Some(Token::Buffer) => single.storage = Storage::Buffer,
                Some(Token::Shared) => single.storage = Storage::Shared,
                Some(Token::Attribute) => {
                    single.storage = Storage::VaryingIn;
                }
                Some(Token::Varying) => {
                    single.storage = if self.ctx.stage == Stage::Vertex {
                        Storage::VaryingOut
                    } else {
                        Storage::VaryingIn
                    };
                }
                Some(Token::Centroid) => single.centroid = true,
                Some(Token::Patch) => single.patch = true,
                Some(Token::Sample) => single.sample = true,
                Some(Token::Flat) => single.flat = true,
                Some(Token::Smooth) => single.smooth = true,
                Some(Token::NoPerspective) => single.nopersp = true,
                Some(Token::Invariant) => single.invariant = true,
                Some(Token::Coherent) => single.coherent = true,
                Some(Token::Volatile) => single.volatil = true,
                Some(Token::Restrict) => single.restrict = true,
                Some(Token::ReadOnly) => single.readonly = true,
                Some(Token::WriteOnly) => single.writeonly = true,
                Some(Token::HighP) => single.precision = glaze_hir::Precision::High,
                Some(Token::MediumP) => single.precision = glaze_hir::Precision::Medium,
                Some(Token::LowP) => single.precision = glaze_hir::Precision::Low,
                Some(Token::Layout) => {
                    self.advance();
                    self.parse_layout_qualifier(&mut single);
                    self.ctx.merge_qualifiers(loc, &mut qualifier, &single, false);
                    continue;
                }
                _ => break,
            }
            self.advance();
            self.ctx.merge_qualifiers(loc, &mut qualifier, &single, false);
        }
        qualifier
    }

    fn parse_layout_qualifier(&mut self, qualifier: &mut Qualifier) {
        if !self.expect(&Token::LeftParen, "expected '(' after 'layout'") {
            return;
        }
        loop {
            let loc = self.loc();
            let id = match self.advance() {
                Some(Token::Identifier(id)) => id,
                // `shared` lexes as a keyword but is also a packing name
                Some(Token::Shared) => "shared".to_owned(),
                _ => {
                    self.syntax_error("expected layout identifier");
                    return;
                }
            };
            if self.accept(&Token::Assign) {
                let value = match self.advance() {
                    Some(Token::Literal(Number::Int(v))) => i64::from(v),
                    Some(Token::Literal(Number::Uint(v))) => i64::from(v),
                    _ => {
                        self.syntax_error("expected integer layout value");
                        return;
                    }
                };
                self.ctx.set_layout_qualifier_value(loc, qualifier, &id, value);
            } else {
                self.ctx.set_layout_qualifier(loc, qualifier, &id);
            }
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RightParen, "expected ')' to close layout qualifier");
    }

    // -----------------------------------------------------------------
    // Type specifiers
    // -----------------------------------------------------------------

    fn is_type_name(&self, name: &str) -> bool {
        self.ctx
            .table
            .find(name)
            .is_some_and(|found| matches!(self.ctx.table.get(found.handle).kind, SymbolKind::UserType))
    }

    fn is_qualifier_token(token: &Token) -> bool {
        matches!(
            token,
            Token::Const
                | Token::In
                | Token::Out
                | Token::InOut
                | Token::Uniform
                | Token::Buffer
                | Token::Shared
                | Token::Attribute
                | Token::Varying
                | Token::Centroid
                | Token::Patch
                | Token::Sample
                | Token::Flat
                | Token::Smooth
                | Token::NoPerspective
                | Token::Invariant
                | Token::Coherent
                | Token::Volatile
                | Token::Restrict
                | Token::ReadOnly
                | Token::WriteOnly
                | Token::HighP
                | Token::MediumP
                | Token::LowP
                | Token::Layout
        )
    }

    fn parse_type_specifier(&mut self) -> Option<PublicType> {
        let loc = self.loc();
        let mut public_type = PublicType::new(loc);

        match self.peek()? {
            Token::Struct => {
                self.parse_struct_specifier(&mut public_type);
            }
            Token::Identifier(name) if self.is_type_name(name) => {
                let name = name.clone();
                self.advance();
                let found = self.ctx.table.find(&name)?;
                let ty = self.ctx.table.get(found.handle).ty.clone();
                public_type.basic = ty.basic;
                public_type.fields = ty.fields.clone();
                public_type.type_name = ty.type_name.clone();
            }
            token => {
                let (basic, vector_size, cols, rows, sampler) = type_from_token(token)?;
                self.advance();
                public_type.basic = basic;
                public_type.vector_size = vector_size;
                public_type.matrix_cols = cols;
                public_type.matrix_rows = rows;
                public_type.sampler = sampler;
            }
        }

        // arrayed type specifier: float[4]
        if self.accept(&Token::LeftBracket) {
            if self.accept(&Token::RightBracket) {
                public_type.array = Some(ArraySizes::unspecified());
            } else {
                let size_expr = self.parse_conditional_expression();
                let size = self.ctx.array_size_check(size_expr);
                self.expect(&Token::RightBracket, "expected ']'");
                public_type.array = Some(ArraySizes::sized(size));
            }
        }

        Some(public_type)
    }

    fn parse_struct_specifier(&mut self, public_type: &mut PublicType) {
        let loc = self.loc();
        self.advance(); // struct
        let name = match self.peek() {
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };

        self.ctx.nested_struct_check(loc);
        if !self.expect(&Token::LeftBrace, "expected '{' in struct definition") {
            self.ctx.nesting_done();
            return;
        }
        let members = self.parse_member_list();
        self.expect(&Token::RightBrace, "expected '}' to close struct");
        self.ctx.nesting_done();

        let fields = Rc::new(members);
        let type_name = name.clone().unwrap_or_else(|| "anon".to_owned());
        public_type.basic = BasicType::Struct;
        public_type.fields = Some(fields.clone());
        public_type.type_name = Some(type_name.as_str().into());

        if let Some(name) = name {
            if !self.ctx.reserved_error_check(loc, &name) {
                let ty = Type::structure(fields, &name);
                let symbol = crate::symbol::Symbol::user_type(&name, ty);
                self.ctx.insert_or_redefinition_error(loc, symbol);
            }
        }
    }

    /// Struct or block members, up to (not including) the closing
    /// brace.
    fn parse_member_list(&mut self) -> Vec<Field> {
        let mut members = Vec::new();
        while !self.check(&Token::RightBrace) && !self.at_end() {
            let member_loc = self.loc();
            let qualifier = self.parse_type_qualifier();
            let Some(mut member_type) = self.parse_type_specifier() else {
                self.syntax_error("expected member type");
                return members;
            };
            merge_into_specifier(&mut member_type, &qualifier);
            self.ctx.precision_qualifier_check(member_loc, &mut member_type);

            loop {
                let Some(Token::Identifier(field_name)) = self.advance() else {
                    self.syntax_error("expected member name");
                    return members;
                };
                let mut ty = member_type.to_type();
                if self.accept(&Token::LeftBracket) {
                    let already_array = ty.is_array();
                    self.ctx.array_dim_check(member_loc, already_array);
                    if self.accept(&Token::RightBracket) {
                        ty.set_array_sizes(ArraySizes::unspecified());
                    } else {
                        let size_expr = self.parse_conditional_expression();
                        let size = self.ctx.array_size_check(size_expr);
                        self.expect(&Token::RightBracket, "expected ']'");
                        ty.set_array_sizes(ArraySizes::sized(size));
                    }
                }
                ty.field_name = Some(field_name.as_str().into());
                members.push(Field {
                    ty,
                    loc: member_loc,
                });
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Semicolon, "expected ';' after member");
            if self.panicking {
                self.synchronize();
            }
        }
        members
    }

    // -----------------------------------------------------------------
    // Interface blocks
    // -----------------------------------------------------------------

    fn parse_block(&mut self, qualifier: Qualifier, name: String, loc: Loc) {
        self.ctx.nested_block_check(loc);
        self.ctx.current_block_defaults = qualifier;
        self.ctx.block_name = Some(name);

        self.expect(&Token::LeftBrace, "expected '{' to start block");
        let members = self.parse_member_list();
        self.expect(&Token::RightBrace, "expected '}' to close block");
        self.ctx.nesting_done();

        let instance = match self.peek() {
            Some(Token::Identifier(instance)) => {
                let instance = instance.clone();
                self.advance();
                Some(instance)
            }
            _ => None,
        };
        let array_sizes = if self.accept(&Token::LeftBracket) {
            if self.accept(&Token::RightBracket) {
                Some(ArraySizes::unspecified())
            } else {
                let size_expr = self.parse_conditional_expression();
                let size = self.ctx.array_size_check(size_expr);
                self.expect(&Token::RightBracket, "expected ']'");
                Some(ArraySizes::sized(size))
            }
        } else {
            None
        };
        self.expect(&Token::Semicolon, "expected ';' after block");

        self.ctx.add_block(loc, members, instance.as_deref(), array_sizes);
    }

    // -----------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------

    /// Parses from just after `name(` through either a prototype `;`
    /// or a full definition.
    fn parse_function(&mut self, return_type: PublicType, name: String, loc: Loc) {
        let mut function = FunctionDecl::new(&name, return_type.to_type());

        if self.check(&Token::Void) && self.peek_ahead(1) == Some(&Token::RightParen) {
            self.advance();
        }
        if !self.check(&Token::RightParen) {
            loop {
                let param_loc = self.loc();
                let qualifier = self.parse_type_qualifier();
                let Some(mut param_type) = self.parse_type_specifier() else {
                    self.syntax_error("expected parameter type");
                    return;
                };
                merge_into_specifier(&mut param_type, &qualifier);
                self.ctx.precision_qualifier_check(param_loc, &mut param_type);

                let param_name = match self.peek() {
                    Some(Token::Identifier(param_name)) => {
                        let param_name = param_name.clone();
                        self.advance();
                        Some(param_name)
                    }
                    _ => None,
                };
                let mut ty = param_type.to_type();
                if self.accept(&Token::LeftBracket) {
                    let size_expr = self.parse_conditional_expression();
                    let size = self.ctx.array_size_check(size_expr);
                    self.expect(&Token::RightBracket, "expected ']'");
                    ty.set_array_sizes(ArraySizes::sized(size));
                }

                let declared_storage = ty.qualifier.storage;
                self.ctx.param_check(param_loc, declared_storage, &mut ty);
                let storage = ty.qualifier.storage;
                self.ctx.parameter_sampler_check(param_loc, storage, &ty);
                function.params.push(Param {
                    name: param_name,
                    ty,
                });

                if !self.accept(&Token::Comma) {
                    break;
                }
            }
        }
        if !self.expect(&Token::RightParen, "expected ')' after parameters") {
            return;
        }

        self.ctx.handle_function_declarator(loc, &function);

        if self.accept(&Token::Semicolon) {
            return; // prototype only
        }
        if !self.check(&Token::LeftBrace) {
            self.syntax_error("expected ';' or function body");
            return;
        }

        let parameters = self.ctx.handle_function_prototype(loc, &function);
        let body = self.parse_compound_statement(false);
        self.ctx
            .handle_function_definition_end(loc, &function, parameters, body);
    }

    // -----------------------------------------------------------------
    // Declarations as statements
    // -----------------------------------------------------------------

    fn starts_declaration(&self) -> bool {
        match self.peek() {
            Some(token) if Self::is_qualifier_token(token) => true,
            Some(Token::Struct) => true,
            Some(token) if type_from_token(token).is_some() => true,
            Some(Token::Identifier(name)) => {
                self.is_type_name(name)
                    && matches!(self.peek_ahead(1), Some(Token::Identifier(_)))
            }
            _ => false,
        }
    }

    /// A declaration inside a function; returns the initializer code.
    fn parse_declaration_statement(&mut self) -> Option<Handle<Node>> {
        let loc = self.loc();
        let qualifier = self.parse_type_qualifier();
        let Some(mut public_type) = self.parse_type_specifier() else {
            self.syntax_error("expected type");
            return None;
        };
        merge_into_specifier(&mut public_type, &qualifier);
        self.ctx.precision_qualifier_check(loc, &mut public_type);

        match self.peek().cloned() {
            Some(Token::Semicolon) => {
                self.advance();
                self.ctx
                    .update_typed_defaults(loc, public_type.qualifier, None);
                None
            }
            Some(Token::Identifier(name)) => {
                let id_loc = self.loc();
                self.advance();
                if self.check(&Token::LeftParen) {
                    // local prototypes reach the declarator handler so
                    // the es restriction can fire
                    self.advance();
                    self.parse_function(public_type, name, id_loc);
                    return None;
                }
                self.parse_declarator_list(public_type, name, id_loc)
            }
            _ => {
                self.syntax_error("expected declarator");
                None
            }
        }
    }

    /// One or more declarators sharing a type; consumes the closing
    /// `;`.
    fn parse_declarator_list(
        &mut self,
        public_type: PublicType,
        first: String,
        first_loc: Loc,
    ) -> Option<Handle<Node>> {
        let mut initializers: Option<Handle<Node>> = None;
        let mut identifier = first;
        let mut id_loc = first_loc;

        loop {
            let array_sizes = if self.accept(&Token::LeftBracket) {
                if self.accept(&Token::RightBracket) {
                    Some(ArraySizes::unspecified())
                } else {
                    let size_expr = self.parse_conditional_expression();
                    let size = self.ctx.array_size_check(size_expr);
                    self.expect(&Token::RightBracket, "expected ']'");
                    Some(ArraySizes::sized(size))
                }
            } else {
                None
            };

            let initializer = if self.accept(&Token::Assign) {
                self.parse_initializer()
            } else {
                None
            };

            self.ctx
                .update_typed_defaults(id_loc, public_type.qualifier, Some(&identifier));
            let init_node =
                self.ctx
                    .declare_variable(id_loc, &identifier, &public_type, array_sizes, initializer);
            if init_node.is_some() {
                initializers = Some(self.ctx.unit.grow_aggregate(initializers, init_node, id_loc));
            }

            if !self.accept(&Token::Comma) {
                break;
            }
            id_loc = self.loc();
            match self.advance() {
                Some(Token::Identifier(next)) => identifier = next,
                _ => {
                    self.syntax_error("expected identifier after ','");
                    return initializers;
                }
            }
        }
        self.expect(&Token::Semicolon, "expected ';' after declaration");
        initializers
    }

    /// An initializer: an assignment expression or a brace list.
    fn parse_initializer(&mut self) -> Option<Handle<Node>> {
        if !self.check(&Token::LeftBrace) {
            return Some(self.parse_assignment_expression());
        }
        let loc = self.loc();
        self.advance(); // {
        let mut list = None;
        if !self.check(&Token::RightBrace) {
            loop {
                let item = self.parse_initializer()?;
                list = Some(self.ctx.unit.grow_aggregate(list, Some(item), loc));
                if !self.accept(&Token::Comma) {
                    break;
                }
                // allow a trailing comma
                if self.check(&Token::RightBrace) {
                    break;
                }
            }
        }
        self.expect(&Token::RightBrace, "expected '}' to close initializer list");
        Some(match list {
            Some(list) => list,
            None => self.ctx.unit.grow_aggregate(None, None, loc),
        })
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_statement(&mut self) -> Option<Handle<Node>> {
        match self.peek() {
            Some(Token::LeftBrace) => self.parse_compound_statement(true),
            Some(Token::If) => self.parse_if_statement(),
            Some(Token::Switch) => self.parse_switch_statement(),
            Some(Token::While) => self.parse_while_statement(),
            Some(Token::Do) => self.parse_do_statement(),
            Some(Token::For) => self.parse_for_statement(),
            Some(Token::Return) => {
                let loc = self.loc();
                self.advance();
                let expression = if self.check(&Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression())
                };
                self.expect(&Token::Semicolon, "expected ';' after return");
                Some(self.ctx.handle_return(loc, expression))
            }
            Some(Token::Break) => {
                let loc = self.loc();
                self.advance();
                self.expect(&Token::Semicolon, "expected ';' after break");
                Some(self.ctx.handle_break(loc))
            }
            Some(Token::Continue) => {
                let loc = self.loc();
                self.advance();
                self.expect(&Token::Semicolon, "expected ';' after continue");
                Some(self.ctx.handle_continue(loc))
            }
            Some(Token::Discard) => {
                let loc = self.loc();
                self.advance();
                self.expect(&Token::Semicolon, "expected ';' after discard");
                Some(self.ctx.handle_discard(loc))
            }
            Some(Token::Semicolon) => {
                self.advance();
                None
            }
            Some(Token::Precision) => {
                self.parse_precision_statement();
                None
            }
            Some(_) if self.starts_declaration() => self.parse_declaration_statement(),
            Some(_) => {
                let expression = self.parse_expression();
                self.expect(&Token::Semicolon, "expected ';' after expression");
                Some(expression)
            }
            None => None,
        }
    }

    fn parse_compound_statement(&mut self, new_scope: bool) -> Option<Handle<Node>> {
        let loc = self.loc();
        if !self.expect(&Token::LeftBrace, "expected '{'") {
            return None;
        }
        if new_scope {
            self.ctx.table.push();
        }
        let mut sequence = None;
        while !self.check(&Token::RightBrace) && !self.at_end() {
            let before = self.pos;
            if let Some(statement) = self.parse_statement() {
                sequence = Some(self.ctx.unit.grow_aggregate(sequence, Some(statement), loc));
            }
            if self.panicking {
                self.synchronize();
            }
            if self.pos == before {
                self.advance();
            }
        }
        self.expect(&Token::RightBrace, "expected '}'");
        if new_scope {
            self.ctx.table.pop();
        }
        Some(self.ctx.unit.set_aggregate_op(
            sequence,
            Op::Sequence,
            Type::new(BasicType::Void),
            loc,
        ))
    }

    fn parse_if_statement(&mut self) -> Option<Handle<Node>> {
        let loc = self.loc();
        self.advance(); // if
        self.expect(&Token::LeftParen, "expected '(' after 'if'");
        let condition = self.parse_expression();
        self.ctx.bool_check(loc, condition);
        self.expect(&Token::RightParen, "expected ')'");
        let accept = self.parse_statement();
        let reject = if self.accept(&Token::Else) {
            self.parse_statement()
        } else {
            None
        };
        Some(self.ctx.unit.add_if(condition, accept, reject, loc))
    }

    fn parse_while_statement(&mut self) -> Option<Handle<Node>> {
        let loc = self.loc();
        self.advance(); // while
        self.expect(&Token::LeftParen, "expected '(' after 'while'");
        self.ctx.table.push();
        let condition = self.parse_expression();
        self.ctx.bool_check(loc, condition);
        self.expect(&Token::RightParen, "expected ')'");
        self.ctx.loop_nesting += 1;
        let body = self.parse_statement();
        self.ctx.loop_nesting -= 1;
        self.ctx.table.pop();
        Some(self.ctx.unit.add_loop(body, Some(condition), None, true, loc))
    }

    fn parse_do_statement(&mut self) -> Option<Handle<Node>> {
        let loc = self.loc();
        self.advance(); // do
        self.ctx.loop_nesting += 1;
        let body = self.parse_statement();
        self.ctx.loop_nesting -= 1;
        self.expect(&Token::While, "expected 'while' after do body");
        self.expect(&Token::LeftParen, "expected '('");
        let condition = self.parse_expression();
        self.ctx.bool_check(loc, condition);
        self.expect(&Token::RightParen, "expected ')'");
        self.expect(&Token::Semicolon, "expected ';'");
        Some(self.ctx.unit.add_loop(body, Some(condition), None, false, loc))
    }

    fn parse_for_statement(&mut self) -> Option<Handle<Node>> {
        let loc = self.loc();
        self.advance(); // for
        self.expect(&Token::LeftParen, "expected '(' after 'for'");
        self.ctx.table.push();

        let init = if self.accept(&Token::Semicolon) {
            None
        } else if self.starts_declaration() {
            self.parse_declaration_statement()
        } else {
            let expression = self.parse_expression();
            self.expect(&Token::Semicolon, "expected ';'");
            Some(expression)
        };

        let condition = if self.check(&Token::Semicolon) {
            None
        } else {
            let condition = self.parse_expression();
            self.ctx.bool_check(loc, condition);
            Some(condition)
        };
        self.expect(&Token::Semicolon, "expected ';'");

        let terminal = if self.check(&Token::RightParen) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(&Token::RightParen, "expected ')'");

        self.ctx.loop_nesting += 1;
        let body = self.parse_statement();
        self.ctx.loop_nesting -= 1;

        let loop_node = self.ctx.unit.add_loop(body, condition, terminal, true, loc);
        if self.ctx.profile == crate::options::Profile::Es && self.ctx.version == 100 {
            match init {
                Some(init) => self.ctx.inductive_loop_check(loc, init, loop_node),
                None => self.ctx.error(
                    loc,
                    "inductive-loop init-declaration requires the form \"type-specifier loop-index = constant-expression\"",
                    "limitations",
                    "",
                ),
            }
        }
        self.ctx.table.pop();

        Some(match init {
            Some(init) => {
                let sequence = self.ctx.unit.grow_aggregate(None, Some(init), loc);
                let sequence = self.ctx.unit.grow_aggregate(Some(sequence), Some(loop_node), loc);
                self.ctx
                    .unit
                    .set_aggregate_op(Some(sequence), Op::Sequence, Type::new(BasicType::Void), loc)
            }
            None => loop_node,
        })
    }

    fn parse_switch_statement(&mut self) -> Option<Handle<Node>> {
        let loc = self.loc();
        self.advance(); // switch
        self.expect(&Token::LeftParen, "expected '(' after 'switch'");
        let expression = self.parse_expression();
        self.expect(&Token::RightParen, "expected ')'");
        if !self.expect(&Token::LeftBrace, "expected '{' to start switch body") {
            return Some(expression);
        }

        self.ctx.push_switch_sequence();
        self.ctx.table.push();
        let mut current: Option<Handle<Node>> = None;

        while !self.check(&Token::RightBrace) && !self.at_end() {
            let label_loc = self.loc();
            if self.accept(&Token::Case) {
                let value = self.parse_expression();
                self.ctx.constant_value_check(value, "case");
                self.ctx.integer_check(value, "case");
                self.expect(&Token::Colon, "expected ':' after case label");
                let branch = self.ctx.unit.add_branch(Op::Case, Some(value), label_loc);
                self.ctx.wrapup_switch_subsequence(current.take(), Some(branch));
            } else if self.accept(&Token::Default) {
                self.expect(&Token::Colon, "expected ':' after default label");
                let branch = self.ctx.unit.add_branch(Op::Default, None, label_loc);
                self.ctx.wrapup_switch_subsequence(current.take(), Some(branch));
            } else {
                let before = self.pos;
                if let Some(statement) = self.parse_statement() {
                    current = Some(self.ctx.unit.grow_aggregate(current, Some(statement), label_loc));
                }
                if self.panicking {
                    self.synchronize();
                }
                if self.pos == before {
                    self.advance();
                }
            }
        }
        self.expect(&Token::RightBrace, "expected '}' to close switch");

        let switch_node = self.ctx.add_switch(loc, expression, current.take());
        self.ctx.table.pop();
        self.ctx.pop_switch_sequence();
        Some(switch_node)
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn parse_expression(&mut self) -> Handle<Node> {
        let mut left = self.parse_assignment_expression();
        while self.check(&Token::Comma) {
            let loc = self.loc();
            self.advance();
            let right = self.parse_assignment_expression();
            left = self.ctx.unit.add_comma(left, right, loc);
        }
        left
    }

    fn parse_assignment_expression(&mut self) -> Handle<Node> {
        let left = self.parse_conditional_expression();
        let (op, op_str) = match self.peek() {
            Some(Token::Assign) => (Op::Assign, "assign"),
            Some(Token::AddAssign) => (Op::AddAssign, "+="),
            Some(Token::SubAssign) => (Op::SubAssign, "-="),
            Some(Token::MulAssign) => (Op::MulAssign, "*="),
            Some(Token::DivAssign) => (Op::DivAssign, "/="),
            Some(Token::ModAssign) => (Op::ModAssign, "%="),
            Some(Token::AndAssign) => (Op::AndAssign, "&="),
            Some(Token::OrAssign) => (Op::OrAssign, "|="),
            Some(Token::XorAssign) => (Op::XorAssign, "^="),
            Some(Token::LeftShiftAssign) => (Op::ShiftLeftAssign, "<<="),
            Some(Token::RightShiftAssign) => (Op::ShiftRightAssign, ">>="),
            _ => return left,
        };
        let loc = self.loc();
        self.advance();
        let right = self.parse_assignment_expression();
        self.ctx.handle_assign(loc, op, op_str, left, right)
    }

    fn parse_conditional_expression(&mut self) -> Handle<Node> {
        let condition = self.parse_binary_expression(0);
        if !self.check(&Token::Question) {
            return condition;
        }
        let loc = self.loc();
        self.advance();
        let accept = self.parse_expression();
        self.expect(&Token::Colon, "expected ':' in conditional expression");
        let reject = self.parse_assignment_expression();
        self.ctx.handle_ternary(loc, condition, accept, reject)
    }

    /// Precedence-climbing over the binary operator tiers.
    fn parse_binary_expression(&mut self, min_precedence: u8) -> Handle<Node> {
        let mut left = self.parse_unary_expression();
        loop {
            let Some((op, op_str, precedence)) = self.peek().and_then(binary_op) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            let loc = self.loc();
            self.advance();
            let right = self.parse_binary_expression(precedence + 1);
            left = self.ctx.handle_binary_math(loc, op, op_str, left, right);
        }
        left
    }

    fn parse_unary_expression(&mut self) -> Handle<Node> {
        let loc = self.loc();
        match self.peek() {
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary_expression()
            }
            Some(Token::Minus) => {
                self.advance();
                let operand = self.parse_unary_expression();
                self.ctx.handle_unary_math(loc, Op::Negate, "-", operand)
            }
            Some(Token::Bang) => {
                self.advance();
                let operand = self.parse_unary_expression();
                self.ctx.handle_unary_math(loc, Op::LogicalNot, "!", operand)
            }
            Some(Token::Tilde) => {
                self.advance();
                let operand = self.parse_unary_expression();
                self.ctx.handle_unary_math(loc, Op::BitwiseNot, "~", operand)
            }
            Some(Token::Increment) => {
                self.advance();
                let operand = self.parse_unary_expression();
                self.ctx.l_value_error_check(loc, "++", operand);
                self.ctx.handle_unary_math(loc, Op::PreIncrement, "++", operand)
            }
            Some(Token::Decrement) => {
                self.advance();
                let operand = self.parse_unary_expression();
                self.ctx.l_value_error_check(loc, "--", operand);
                self.ctx.handle_unary_math(loc, Op::PreDecrement, "--", operand)
            }
            _ => self.parse_postfix_expression(),
        }
    }

    fn parse_postfix_expression(&mut self) -> Handle<Node> {
        let mut base = self.parse_primary_expression();
        loop {
            let loc = self.loc();
            match self.peek() {
                Some(Token::LeftBracket) => {
                    self.advance();
                    let index = self.parse_expression();
                    self.expect(&Token::RightBracket, "expected ']'");
                    base = self.ctx.handle_bracket_dereference(loc, base, index);
                }
                Some(Token::Dot) => {
                    self.advance();
                    let Some(Token::Identifier(field)) = self.advance() else {
                        self.syntax_error("expected field name after '.'");
                        return base;
                    };
                    base = self.ctx.handle_dot_dereference(loc, base, &field);
                    if self.check(&Token::LeftParen) {
                        // method-call syntax; only array.length() exists
                        self.advance();
                        let mut has_arguments = false;
                        if !self.check(&Token::RightParen) {
                            has_arguments = true;
                            self.parse_expression();
                        }
                        self.expect(&Token::RightParen, "expected ')'");
                        base = self.ctx.handle_length_method(loc, base, has_arguments);
                    }
                }
                Some(Token::Increment) => {
                    self.advance();
                    self.ctx.l_value_error_check(loc, "++", base);
                    base = self.ctx.handle_unary_math(loc, Op::PostIncrement, "++", base);
                }
                Some(Token::Decrement) => {
                    self.advance();
                    self.ctx.l_value_error_check(loc, "--", base);
                    base = self.ctx.handle_unary_math(loc, Op::PostDecrement, "--", base);
                }
                _ => break,
            }
        }
        base
    }

    fn parse_primary_expression(&mut self) -> Handle<Node> {
        let loc = self.loc();
        match self.peek().cloned() {
            Some(Token::Literal(Number::Int(value))) => {
                self.advance();
                self.ctx.unit.make_int_const(value, loc)
            }
            Some(Token::Literal(Number::Uint(value))) => {
                self.advance();
                self.ctx.unit.make_uint_const(value, loc)
            }
            Some(Token::Literal(Number::Float(value))) => {
                self.advance();
                self.ctx.unit.make_float_const(value, loc)
            }
            Some(Token::True) => {
                self.advance();
                self.ctx.unit.make_bool_const(true, loc)
            }
            Some(Token::False) => {
                self.advance();
                self.ctx.unit.make_bool_const(false, loc)
            }
            Some(Token::LeftParen) => {
                self.advance();
                let expression = self.parse_expression();
                self.expect(&Token::RightParen, "expected ')'");
                expression
            }
            Some(Token::Identifier(name)) => {
                if self.peek_ahead(1) == Some(&Token::LeftParen) {
                    if self.is_type_name(&name) {
                        return self.parse_constructor_call(loc);
                    }
                    self.advance(); // name
                    self.advance(); // (
                    let mut call = FunctionDecl::new(&name, Type::new(BasicType::Void));
                    let arguments = self.parse_call_arguments(&mut call);
                    return self.ctx.handle_function_call(loc, &call, arguments);
                }
                self.advance();
                self.ctx.handle_variable(loc, &name)
            }
            Some(token) if type_from_token(&token).is_some() => self.parse_constructor_call(loc),
            Some(_) => {
                self.syntax_error("unexpected token in expression");
                self.advance();
                self.ctx.unit.recovery_float_zero(loc)
            }
            None => {
                self.syntax_error("unexpected end of input in expression");
                self.ctx.unit.recovery_float_zero(loc)
            }
        }
    }

    /// `vec4(...)`, `float[3](...)`, `MyStruct(...)`.
    fn parse_constructor_call(&mut self, loc: Loc) -> Handle<Node> {
        let Some(public_type) = self.parse_type_specifier() else {
            self.syntax_error("expected constructor type");
            return self.ctx.unit.recovery_float_zero(loc);
        };
        if !self.expect(&Token::LeftParen, "expected '(' in constructor") {
            return self.ctx.unit.recovery_float_zero(loc);
        }
        let mut call = self.ctx.handle_constructor_call(loc, &public_type);
        let arguments = self.parse_call_arguments(&mut call);
        self.ctx.handle_function_call(loc, &call, arguments)
    }

    /// Parses `argument {, argument} )`, filling the call's parameter
    /// list with the argument types for overload lookup.
    fn parse_call_arguments(&mut self, call: &mut FunctionDecl) -> Option<Handle<Node>> {
        let mut arguments = Vec::new();
        if self.accept(&Token::RightParen) {
            return None;
        }
        if self.check(&Token::Void) && self.peek_ahead(1) == Some(&Token::RightParen) {
            self.advance();
            self.advance();
            return None;
        }
        loop {
            let argument = self.parse_assignment_expression();
            call.params.push(Param {
                name: None,
                ty: self.ctx.unit.ty(argument).clone(),
            });
            arguments.push(argument);
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RightParen, "expected ')' after arguments");

        match arguments.len() {
            0 => None,
            1 => Some(arguments[0]),
            _ => {
                let loc = self.loc();
                let mut aggregate = None;
                for argument in arguments {
                    aggregate = Some(self.ctx.unit.grow_aggregate(aggregate, Some(argument), loc));
                }
                aggregate
            }
        }
    }
}

/// Merge a parsed qualifier into a parsed specifier, keeping the
/// specifier's shape fields.
fn merge_into_specifier(public_type: &mut PublicType, qualifier: &Qualifier) {
    public_type.qualifier = *qualifier;
}

/// Binary operators by precedence tier (higher binds tighter).
fn binary_op(token: &Token) -> Option<(Op, &'static str, u8)> {
    Some(match token {
        Token::OrOp => (Op::LogicalOr, "||", 1),
        Token::XorOp => (Op::LogicalXor, "^^", 2),
        Token::AndOp => (Op::LogicalAnd, "&&", 3),
        Token::Pipe => (Op::BitwiseOr, "|", 4),
        Token::Caret => (Op::BitwiseXor, "^", 5),
        Token::Ampersand => (Op::BitwiseAnd, "&", 6),
        Token::EqualOp => (Op::Equal, "==", 7),
        Token::NotEqualOp => (Op::NotEqual, "!=", 7),
        Token::Less => (Op::Less, "<", 8),
        Token::Greater => (Op::Greater, ">", 8),
        Token::LessEqual => (Op::LessEqual, "<=", 8),
        Token::GreaterEqual => (Op::GreaterEqual, ">=", 8),
        Token::LeftShift => (Op::ShiftLeft, "<<", 9),
        Token::RightShift => (Op::ShiftRight, ">>", 9),
        Token::Plus => (Op::Add, "+", 10),
        Token::Minus => (Op::Sub, "-", 10),
        Token::Star => (Op::Mul, "*", 11),
        Token::Slash => (Op::Div, "/", 11),
        Token::Percent => (Op::Mod, "%", 11),
        _ => return None,
    })
}

/// Shape information for the built-in type keywords.
#[allow(clippy::type_complexity)]
fn type_from_token(token: &Token) -> Option<(BasicType, u32, u32, u32, Option<Sampler>)> {
    use BasicType::*;
    let scalar = |basic| Some((basic, 1, 0, 0, None));
    let vector = |basic, n| Some((basic, n, 0, 0, None));
    let matrix = |c, r| Some((Float, 1, c, r, None));
    let dmatrix = |c, r| Some((Double, 1, c, r, None));
    let sampler = |s: glaze_hir::Sampler| Some((Sampler, 1, 0, 0, Some(s)));

    match token {
        Token::Void => scalar(Void),
        Token::Float => scalar(Float),
        Token::Double => scalar(Double),
        Token::Int => scalar(Int),
        Token::Uint => scalar(Uint),
        Token::Bool => scalar(Bool),
        Token::Vec2 => vector(Float, 2),
        Token::Vec3 => vector(Float, 3),
        Token::Vec4 => vector(Float, 4),
        Token::DVec2 => vector(Double, 2),
        Token::DVec3 => vector(Double, 3),
        Token::DVec4 => vector(Double, 4),
        Token::IVec2 => vector(Int, 2),
        Token::IVec3 => vector(Int, 3),
        Token::IVec4 => vector(Int, 4),
        Token::UVec2 => vector(Uint, 2),
        Token::UVec3 => vector(Uint, 3),
        Token::UVec4 => vector(Uint, 4),
        Token::BVec2 => vector(Bool, 2),
        Token::BVec3 => vector(Bool, 3),
        Token::BVec4 => vector(Bool, 4),
        Token::Mat2 | Token::Mat2x2 => matrix(2, 2),
        Token::Mat2x3 => matrix(2, 3),
        Token::Mat2x4 => matrix(2, 4),
        Token::Mat3x2 => matrix(3, 2),
        Token::Mat3 | Token::Mat3x3 => matrix(3, 3),
        Token::Mat3x4 => matrix(3, 4),
        Token::Mat4x2 => matrix(4, 2),
        Token::Mat4x3 => matrix(4, 3),
        Token::Mat4 | Token::Mat4x4 => matrix(4, 4),
        Token::DMat2 => dmatrix(2, 2),
        Token::DMat3 => dmatrix(3, 3),
        Token::DMat4 => dmatrix(4, 4),
        Token::Sampler1D => sampler(glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Dim1D)),
        Token::Sampler2D => sampler(glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Dim2D)),
        Token::Sampler3D => sampler(glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Dim3D)),
        Token::SamplerCube => sampler(glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Cube)),
        Token::Sampler2DRect => sampler(glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Rect)),
        Token::SamplerBuffer => sampler(glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Buffer)),
        Token::Sampler2DMs => {
            let s = glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Ms2D);
            sampler(s)
        }
        Token::Sampler2DShadow => {
            let mut s = glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Dim2D);
            s.shadow = true;
            sampler(s)
        }
        Token::SamplerCubeShadow => {
            let mut s = glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Cube);
            s.shadow = true;
            sampler(s)
        }
        Token::Sampler2DArray => {
            let mut s = glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Dim2D);
            s.arrayed = true;
            sampler(s)
        }
        Token::Sampler2DArrayShadow => {
            let mut s = glaze_hir::Sampler::new(SamplerScalar::Float, SamplerDim::Dim2D);
            s.arrayed = true;
            s.shadow = true;
            sampler(s)
        }
        Token::ISampler2D => sampler(glaze_hir::Sampler::new(SamplerScalar::Int, SamplerDim::Dim2D)),
        Token::ISampler3D => sampler(glaze_hir::Sampler::new(SamplerScalar::Int, SamplerDim::Dim3D)),
        Token::USampler2D => sampler(glaze_hir::Sampler::new(SamplerScalar::Uint, SamplerDim::Dim2D)),
        _ => None,
    }
}
