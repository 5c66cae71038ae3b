//! Statement-level semantics: switch assembly, inductive-loop
//! restrictions (version 100 es), and branch legality.

use glaze_hir::{BasicType, Handle, Loc, Node, NodeKind, Op, Type};

use crate::context::ParseContext;
use crate::options::{ProfileMask, StageMask};

impl ParseContext {
    // -----------------------------------------------------------------
    // Switch
    // -----------------------------------------------------------------

    pub fn push_switch_sequence(&mut self) {
        self.switch_sequence_stack.push(Vec::new());
        self.switch_nesting += 1;
    }

    pub fn pop_switch_sequence(&mut self) {
        self.switch_sequence_stack.pop();
        self.switch_nesting = self.switch_nesting.saturating_sub(1);
    }

    /// Moves the statements gathered since the last label onto the
    /// current switch sequence, then appends the new label, checking it
    /// against every earlier one.
    pub fn wrapup_switch_subsequence(
        &mut self,
        statements: Option<Handle<Node>>,
        branch: Option<Handle<Node>>,
    ) {
        let previous: Vec<Handle<Node>> = self
            .switch_sequence_stack
            .last()
            .cloned()
            .unwrap_or_default();

        if let Some(statements) = statements {
            if previous.is_empty() {
                let loc = self.unit.node(statements).loc;
                self.error(
                    loc,
                    "cannot have statements before first case/default label",
                    "switch",
                    "",
                );
            }
            let loc = self.unit.node(statements).loc;
            let sequence = self.unit.set_aggregate_op(
                Some(statements),
                Op::Sequence,
                Type::new(BasicType::Void),
                loc,
            );
            if let Some(top) = self.switch_sequence_stack.last_mut() {
                top.push(sequence);
            }
        }

        if let Some(branch) = branch {
            let (new_expression, branch_loc) = match &self.unit.node(branch).kind {
                NodeKind::Branch { expression, .. } => (*expression, self.unit.node(branch).loc),
                _ => (None, self.unit.node(branch).loc),
            };
            let new_value = new_expression
                .and_then(|e| self.unit.node(e).as_const().map(|v| v.get(0).as_int()));

            for prev in previous {
                let prev_expression = match &self.unit.node(prev).kind {
                    NodeKind::Branch { expression, .. } => *expression,
                    _ => continue,
                };
                let prev_value = prev_expression
                    .and_then(|e| self.unit.node(e).as_const().map(|v| v.get(0).as_int()));
                match (prev_expression, new_expression) {
                    (None, None) => {
                        self.error(branch_loc, "duplicate label", "default", "");
                    }
                    (Some(_), Some(_)) => {
                        if let (Some(a), Some(b)) = (prev_value, new_value) {
                            if a == b {
                                self.error(branch_loc, "duplicated value", "case", "");
                            }
                        }
                    }
                    _ => {}
                }
            }
            if let Some(top) = self.switch_sequence_stack.last_mut() {
                top.push(branch);
            }
        }
    }

    /// Assembles the switch body collected by
    /// `wrapup_switch_subsequence` into a switch node. An empty body
    /// drops the switch but keeps the controlling expression.
    pub fn add_switch(
        &mut self,
        loc: Loc,
        expression: Handle<Node>,
        last_statements: Option<Handle<Node>>,
    ) -> Handle<Node> {
        self.profile_requires(loc, ProfileMask::ES, 300, None, "switch statements");
        self.profile_requires(loc, ProfileMask::NONE, 130, None, "switch statements");

        self.wrapup_switch_subsequence(last_statements, None);

        let ty = self.unit.ty(expression);
        if !matches!(ty.basic, BasicType::Int | BasicType::Uint) || !ty.is_scalar() {
            self.error(loc, "condition must be a scalar integer expression", "switch", "");
        }

        let sequence: Vec<Handle<Node>> = self
            .switch_sequence_stack
            .last()
            .cloned()
            .unwrap_or_default();
        if sequence.is_empty() {
            return expression;
        }
        if last_statements.is_none() {
            self.error(
                loc,
                "last case/default label must be followed by statements",
                "switch",
                "",
            );
            return expression;
        }

        let mut body = None;
        for node in sequence {
            body = Some(self.unit.grow_aggregate(body, Some(node), loc));
        }
        let body = self
            .unit
            .set_aggregate_op(body, Op::Sequence, Type::new(BasicType::Void), loc);
        self.unit.add_switch_node(expression, body, loc)
    }

    // -----------------------------------------------------------------
    // Inductive loops (version 100 es, Appendix A)
    // -----------------------------------------------------------------

    /// Checks that a `for` loop fits the version-100 inductive form and
    /// records its loop index for the deferred indexing checks.
    pub fn inductive_loop_check(&mut self, loc: Loc, init: Handle<Node>, loop_node: Handle<Node>) {
        const INIT_FORM: &str = "inductive-loop init-declaration requires the form \"type-specifier loop-index = constant-expression\"";

        // the init declaration arrives as an aggregate holding exactly
        // one assignment
        let init_assign = match self.unit.node(init).as_aggregate() {
            Some(data) if data.sequence.len() == 1 => Some(data.sequence[0]),
            _ => None,
        };
        let Some(assign) = init_assign else {
            self.error(loc, INIT_FORM, "limitations", "");
            return;
        };
        let Some((assign_op, left, right)) = self.unit.node(assign).as_binary() else {
            self.error(loc, INIT_FORM, "limitations", "");
            return;
        };

        let assign_ty = self.unit.ty(assign);
        if !assign_ty.is_scalar()
            || !matches!(assign_ty.basic, BasicType::Int | BasicType::Float)
        {
            self.error(
                loc,
                "inductive loop requires a scalar 'int' or 'float' loop index",
                "limitations",
                "",
            );
            return;
        }

        let left_symbol = self.unit.node(left).as_symbol().map(|(id, _)| id);
        if assign_op != Op::Assign
            || left_symbol.is_none()
            || !self.unit.node(right).is_const()
        {
            self.error(loc, INIT_FORM, "limitations", "");
            return;
        }
        let loop_index = left_symbol.unwrap();
        self.inductive_loop_ids.insert(loop_index);

        // condition: loop-index <relational-op> constant-expression
        let (test, terminal, body) = match &self.unit.node(loop_node).kind {
            NodeKind::Loop {
                test,
                terminal,
                body,
                ..
            } => (*test, *terminal, *body),
            _ => (None, None, None),
        };

        let mut bad_condition = true;
        if let Some(test) = test {
            if let Some((op, cond_left, cond_right)) = self.unit.node(test).as_binary() {
                let relational = matches!(
                    op,
                    Op::Less
                        | Op::LessEqual
                        | Op::Greater
                        | Op::GreaterEqual
                        | Op::Equal
                        | Op::NotEqual
                );
                let left_is_index = self
                    .unit
                    .node(cond_left)
                    .as_symbol()
                    .is_some_and(|(id, _)| id == loop_index);
                bad_condition =
                    !relational || !left_is_index || !self.unit.node(cond_right).is_const();
            }
        }
        if bad_condition {
            self.error(
                loc,
                "inductive-loop condition requires the form \"loop-index <comparison-op> constant-expression\"",
                "limitations",
                "",
            );
            return;
        }

        // terminal: loop-index++/--, loop-index +=/-= constant
        let mut bad_terminal = true;
        if let Some(terminal) = terminal {
            match &self.unit.node(terminal).kind {
                NodeKind::Unary { op, operand } => {
                    if matches!(
                        op,
                        Op::PreIncrement | Op::PreDecrement | Op::PostIncrement | Op::PostDecrement
                    ) {
                        bad_terminal = !self
                            .unit
                            .node(*operand)
                            .as_symbol()
                            .is_some_and(|(id, _)| id == loop_index);
                    }
                }
                NodeKind::Binary { op, left, right } => {
                    if matches!(op, Op::AddAssign | Op::SubAssign) {
                        let left_is_index = self
                            .unit
                            .node(*left)
                            .as_symbol()
                            .is_some_and(|(id, _)| id == loop_index);
                        bad_terminal = !left_is_index || !self.unit.node(*right).is_const();
                    }
                }
                _ => {}
            }
        }
        if bad_terminal {
            self.error(
                loc,
                "inductive-loop termination requires the form \"loop-index++, loop-index--, loop-index += constant-expression, or loop-index -= constant-expression\"",
                "limitations",
                "",
            );
            return;
        }

        self.inductive_loop_body_check(body, loop_index);
    }

    /// The loop body may read the loop index but never write it.
    fn inductive_loop_body_check(&mut self, body: Option<Handle<Node>>, loop_index: u32) {
        let mut stack: Vec<Handle<Node>> = body.into_iter().collect();
        while let Some(node) = stack.pop() {
            let mut modified_target = None;
            match &self.unit.node(node).kind {
                NodeKind::Binary { op, left, right } => {
                    if op.is_assignment() {
                        modified_target = Some(*left);
                    }
                    stack.push(*left);
                    stack.push(*right);
                }
                NodeKind::Unary { op, operand } => {
                    if matches!(
                        op,
                        Op::PreIncrement | Op::PreDecrement | Op::PostIncrement | Op::PostDecrement
                    ) {
                        modified_target = Some(*operand);
                    }
                    stack.push(*operand);
                }
                NodeKind::Aggregate(data) => stack.extend(data.sequence.iter().copied()),
                NodeKind::Selection {
                    condition,
                    accept,
                    reject,
                } => {
                    stack.push(*condition);
                    stack.extend(accept.iter().copied());
                    stack.extend(reject.iter().copied());
                }
                NodeKind::Switch { expression, body } => {
                    stack.push(*expression);
                    stack.push(*body);
                }
                NodeKind::Loop {
                    body,
                    test,
                    terminal,
                    ..
                } => {
                    stack.extend(body.iter().copied());
                    stack.extend(test.iter().copied());
                    stack.extend(terminal.iter().copied());
                }
                NodeKind::Branch { expression, .. } => {
                    stack.extend(expression.iter().copied());
                }
                NodeKind::Method { base, .. } => stack.push(*base),
                NodeKind::Symbol { .. } | NodeKind::Const(_) => {}
            }

            if let Some(target) = modified_target {
                let is_index = self
                    .unit
                    .node(target)
                    .as_symbol()
                    .is_some_and(|(id, _)| id == loop_index);
                if is_index {
                    let loc = self.unit.node(target).loc;
                    self.error(
                        loc,
                        "Loop index cannot be statically assigned to within the body of the loop",
                        "limitations",
                        "",
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------

    pub fn handle_return(&mut self, loc: Loc, expression: Option<Handle<Node>>) -> Handle<Node> {
        let return_ty = self.current_function_ret.clone();
        let expression = match (expression, return_ty) {
            (None, Some(ret)) => {
                if ret.basic != BasicType::Void {
                    self.error(loc, "non-void function must return a value", "return", "");
                }
                None
            }
            (Some(value), Some(ret)) => {
                self.function_returns_value = true;
                if ret.basic == BasicType::Void {
                    self.error(loc, "void function cannot return a value", "return", "");
                    Some(value)
                } else {
                    match self.unit.add_conversion(Op::Assign, &ret, value) {
                        Some(converted) => Some(converted),
                        None => {
                            self.error(
                                loc,
                                "type does not match, or is not convertible to, the function's return type",
                                "return",
                                "",
                            );
                            Some(value)
                        }
                    }
                }
            }
            (expression, None) => expression,
        };
        self.unit.add_branch(Op::Return, expression, loc)
    }

    pub fn handle_continue(&mut self, loc: Loc) -> Handle<Node> {
        if self.loop_nesting == 0 {
            self.error(loc, "continue statement only allowed in loops", "", "");
        }
        self.unit.add_branch(Op::Continue, None, loc)
    }

    pub fn handle_break(&mut self, loc: Loc) -> Handle<Node> {
        if self.loop_nesting == 0 && self.switch_nesting == 0 {
            self.error(loc, "break statement only allowed in switches and loops", "", "");
        }
        self.unit.add_branch(Op::Break, None, loc)
    }

    pub fn handle_discard(&mut self, loc: Loc) -> Handle<Node> {
        self.require_stage(loc, StageMask::FRAGMENT, "discard");
        self.unit.add_branch(Op::Discard, None, loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Options, Profile, Stage};
    use glaze_hir::Storage;

    fn es100() -> ParseContext {
        let mut ctx = ParseContext::new(Options::new(100, Profile::Es, Stage::Vertex));
        ctx.table.seal_builtins();
        ctx
    }

    /// Builds `for (int i = 0; i < 4; ++i) { }` shaped HIR by hand.
    fn build_loop(
        ctx: &mut ParseContext,
        relational: Op,
        terminal_op: Op,
    ) -> (Handle<Node>, Handle<Node>) {
        let loc = Loc::default();
        let int_ty = Type::scalar(BasicType::Int, Storage::Temporary);
        let index = ctx.unit.make_symbol_ref(42, "i", int_ty.clone(), loc);
        let zero = ctx.unit.make_int_const(0, loc);
        let assign = ctx.unit.add_assign(Op::Assign, index, zero, loc).unwrap();
        let init = ctx.unit.grow_aggregate(None, Some(assign), loc);

        let index_use = ctx.unit.make_symbol_ref(42, "i", int_ty.clone(), loc);
        let four = ctx.unit.make_int_const(4, loc);
        let test = ctx
            .unit
            .add_binary_math(relational, index_use, four, loc)
            .unwrap();

        let index_term = ctx.unit.make_symbol_ref(42, "i", int_ty, loc);
        let terminal = ctx
            .unit
            .add_unary_math(terminal_op, index_term, loc)
            .unwrap();

        let loop_node = ctx
            .unit
            .add_loop(None, Some(test), Some(terminal), true, loc);
        (init, loop_node)
    }

    #[test]
    fn inductive_loop_accepted() {
        let mut ctx = es100();
        let (init, loop_node) = build_loop(&mut ctx, Op::Less, Op::PreIncrement);
        ctx.inductive_loop_check(Loc::default(), init, loop_node);
        assert_eq!(ctx.error_count(), 0);
        assert!(ctx.inductive_loop_ids.contains(&42));
    }

    #[test]
    fn post_increment_terminal_accepted() {
        let mut ctx = es100();
        let (init, loop_node) = build_loop(&mut ctx, Op::LessEqual, Op::PostDecrement);
        ctx.inductive_loop_check(Loc::default(), init, loop_node);
        assert_eq!(ctx.error_count(), 0);
    }

    #[test]
    fn non_constant_condition_rejected() {
        let mut ctx = es100();
        let loc = Loc::default();
        let int_ty = Type::scalar(BasicType::Int, Storage::Temporary);
        let index = ctx.unit.make_symbol_ref(42, "i", int_ty.clone(), loc);
        let zero = ctx.unit.make_int_const(0, loc);
        let assign = ctx.unit.add_assign(Op::Assign, index, zero, loc).unwrap();
        let init = ctx.unit.grow_aggregate(None, Some(assign), loc);

        // condition compares against another variable
        let index_use = ctx.unit.make_symbol_ref(42, "i", int_ty.clone(), loc);
        let other = ctx.unit.make_symbol_ref(43, "n", int_ty.clone(), loc);
        let test = ctx
            .unit
            .add_binary_math(Op::Less, index_use, other, loc)
            .unwrap();
        let index_term = ctx.unit.make_symbol_ref(42, "i", int_ty, loc);
        let terminal = ctx
            .unit
            .add_unary_math(Op::PostIncrement, index_term, loc)
            .unwrap();
        let loop_node = ctx
            .unit
            .add_loop(None, Some(test), Some(terminal), true, loc);

        ctx.inductive_loop_check(loc, init, loop_node);
        assert!(ctx
            .sink
            .text()
            .contains("inductive-loop condition requires the form"));
    }

    #[test]
    fn modifying_loop_index_in_body_rejected() {
        let mut ctx = es100();
        let loc = Loc::default();
        let int_ty = Type::scalar(BasicType::Int, Storage::Temporary);
        let index = ctx.unit.make_symbol_ref(42, "i", int_ty.clone(), loc);
        let zero = ctx.unit.make_int_const(0, loc);
        let assign = ctx.unit.add_assign(Op::Assign, index, zero, loc).unwrap();
        let init = ctx.unit.grow_aggregate(None, Some(assign), loc);

        let index_use = ctx.unit.make_symbol_ref(42, "i", int_ty.clone(), loc);
        let four = ctx.unit.make_int_const(4, loc);
        let test = ctx
            .unit
            .add_binary_math(Op::Less, index_use, four, loc)
            .unwrap();
        let index_term = ctx.unit.make_symbol_ref(42, "i", int_ty.clone(), loc);
        let terminal = ctx
            .unit
            .add_unary_math(Op::PostIncrement, index_term, loc)
            .unwrap();

        // body: i = 7;
        let body_index = ctx.unit.make_symbol_ref(42, "i", int_ty, loc);
        let seven = ctx.unit.make_int_const(7, loc);
        let body_assign = ctx
            .unit
            .add_assign(Op::Assign, body_index, seven, loc)
            .unwrap();
        let body = ctx.unit.grow_aggregate(None, Some(body_assign), loc);

        let loop_node = ctx
            .unit
            .add_loop(Some(body), Some(test), Some(terminal), true, loc);
        ctx.inductive_loop_check(loc, init, loop_node);
        assert!(ctx
            .sink
            .text()
            .contains("Loop index cannot be statically assigned"));
    }

    #[test]
    fn switch_duplicate_labels() {
        let mut ctx = es100();
        let loc = Loc::default();
        ctx.push_switch_sequence();

        let one = ctx.unit.make_int_const(1, loc);
        let case_one = ctx.unit.add_branch(Op::Case, Some(one), loc);
        ctx.wrapup_switch_subsequence(None, Some(case_one));
        assert_eq!(ctx.error_count(), 0);

        let one_again = ctx.unit.make_int_const(1, loc);
        let case_dup = ctx.unit.add_branch(Op::Case, Some(one_again), loc);
        ctx.wrapup_switch_subsequence(None, Some(case_dup));
        assert!(ctx.sink.text().contains("duplicated value"));

        let default_a = ctx.unit.add_branch(Op::Default, None, loc);
        ctx.wrapup_switch_subsequence(None, Some(default_a));
        let default_b = ctx.unit.add_branch(Op::Default, None, loc);
        ctx.wrapup_switch_subsequence(None, Some(default_b));
        assert!(ctx.sink.text().contains("duplicate label"));
        ctx.pop_switch_sequence();
    }

    #[test]
    fn branch_nesting_checks() {
        let mut ctx = es100();
        let loc = Loc::default();
        ctx.handle_continue(loc);
        assert!(ctx.sink.text().contains("continue statement only allowed in loops"));
        ctx.handle_break(loc);
        assert!(ctx.sink.text().contains("break statement only allowed"));

        ctx.loop_nesting = 1;
        let before = ctx.error_count();
        ctx.handle_continue(loc);
        ctx.handle_break(loc);
        assert_eq!(ctx.error_count(), before);
    }
}
