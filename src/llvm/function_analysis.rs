// This module implements the two reachability predicates that decide, before any code is
// generated for a function, what shape its epilogue takes. has_defer reports whether the body
// registers any deferred call; has_direct_call reports whether the body performs a call that
// runs synchronously in this frame and could therefore unwind through it. Both are pre-order
// walks over the closed statement/expression enums that stop as soon as a match is found and
// never descend into nested function literals, which are analysed on their own when lowered.
// The deferred or spawned call of a defer/go statement runs in another control context and is
// not counted, but its callee operand and arguments are evaluated here and their calls are.

//! Defer and unwind reachability analysis.

use crate::frontend::ast::{Block, CallExpr, Expr, Stmt};

/// Node visited by [`inspect`].
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

/// Pre-order walk of a function body. The visitor returns `false` to skip a
/// node's children.
pub fn inspect<'a, F>(body: &'a Block, visit: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    for stmt in &body.stmts {
        inspect_stmt(stmt, visit);
    }
}

fn inspect_stmt<'a, F>(stmt: &'a Stmt, visit: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    if !visit(Node::Stmt(stmt)) {
        return;
    }
    match stmt {
        Stmt::Let { init, .. } => {
            if let Some(init) = init {
                inspect_expr(init, visit);
            }
        }
        Stmt::Assign { value, .. } => inspect_expr(value, visit),
        Stmt::Expr(expr) => inspect_expr(expr, visit),
        Stmt::Return(values) => {
            for value in values {
                inspect_expr(value, visit);
            }
        }
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => {
            inspect_expr(cond, visit);
            inspect(then_block, visit);
            if let Some(else_block) = else_block {
                inspect(else_block, visit);
            }
        }
        Stmt::Block(block) => inspect(block, visit),
        // The registered call itself is not a child; its operands are.
        Stmt::Defer(call) | Stmt::Go(call) => inspect_call_operands(call, visit),
    }
}

fn inspect_expr<'a, F>(expr: &'a Expr, visit: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    if !visit(Node::Expr(expr)) {
        return;
    }
    match expr {
        Expr::Int(_) | Expr::Bool(_) | Expr::Local(_) | Expr::Func(_) => {}
        Expr::Call(call) => inspect_call_operands(call, visit),
        Expr::Binary { lhs, rhs, .. } => {
            inspect_expr(lhs, visit);
            inspect_expr(rhs, visit);
        }
        Expr::FuncLit(lit) => inspect(&lit.body, visit),
    }
}

fn inspect_call_operands<'a, F>(call: &'a CallExpr, visit: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    inspect_expr(&call.callee, visit);
    for arg in &call.args {
        inspect_expr(arg, visit);
    }
}

/// Whether the body contains a `defer` statement outside nested literals.
pub fn has_defer(body: &Block) -> bool {
    let mut found = false;
    inspect(body, &mut |node| {
        if found {
            return false;
        }
        match node {
            Node::Stmt(Stmt::Defer(_)) => {
                found = true;
                false
            }
            Node::Expr(Expr::FuncLit(_)) => false,
            _ => true,
        }
    });
    found
}

/// Whether the body makes a call that runs in this frame: not the call of a
/// `defer` or `go` statement and not inside a nested literal.
///
/// The callee operand and arguments of a `defer` or `go` are evaluated at the
/// statement, in this frame, so calls inside them count. `defer f(g())` gets
/// a landing pad for `g`. Front ends that skip the whole statement would not
/// add one there.
pub fn has_direct_call(body: &Block) -> bool {
    let mut found = false;
    inspect(body, &mut |node| {
        if found {
            return false;
        }
        match node {
            Node::Expr(Expr::Call(_)) => {
                found = true;
                false
            }
            Node::Expr(Expr::FuncLit(_)) => false,
            _ => true,
        }
    });
    found
}

/// Epilogue shape for one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpilogueShape {
    /// Build the defer-running exit block.
    pub defer_block: bool,
    /// Build the landing pad that feeds it.
    pub unwind_block: bool,
}

impl EpilogueShape {
    pub fn analyze(body: &Block) -> Self {
        let defer_block = has_defer(body);
        Self {
            defer_block,
            unwind_block: defer_block && has_direct_call(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{BinaryOp, FuncLit};

    fn defer(name: &str, args: Vec<Expr>) -> Stmt {
        Stmt::Defer(CallExpr::named(name, args))
    }

    fn literal(stmts: Vec<Stmt>) -> Expr {
        Expr::FuncLit(Box::new(FuncLit::new(vec![], vec![], Block::new(stmts))))
    }

    #[test]
    fn test_empty_body() {
        let body = Block::default();
        assert!(!has_defer(&body));
        assert!(!has_direct_call(&body));
        assert_eq!(
            EpilogueShape::analyze(&body),
            EpilogueShape {
                defer_block: false,
                unwind_block: false
            }
        );
    }

    #[test]
    fn test_single_defer_without_calls() {
        let body = Block::new(vec![defer("cleanup", vec![Expr::Int(1)])]);
        assert!(has_defer(&body));
        assert!(!has_direct_call(&body));
        assert_eq!(
            EpilogueShape::analyze(&body),
            EpilogueShape {
                defer_block: true,
                unwind_block: false
            }
        );
    }

    #[test]
    fn test_defer_and_direct_call() {
        let body = Block::new(vec![
            defer("cleanup", vec![]),
            Stmt::Expr(Expr::call("work", vec![])),
        ]);
        assert!(has_direct_call(&body));
        assert_eq!(
            EpilogueShape::analyze(&body),
            EpilogueShape {
                defer_block: true,
                unwind_block: true
            }
        );
    }

    #[test]
    fn test_nested_defer_found() {
        let body = Block::new(vec![Stmt::If {
            cond: Expr::Bool(true),
            then_block: Block::new(vec![Stmt::Block(Block::new(vec![defer("a", vec![])]))]),
            else_block: None,
        }]);
        assert!(has_defer(&body));
    }

    #[test]
    fn test_function_literals_are_skipped() {
        let body = Block::new(vec![Stmt::Let {
            name: "f".to_string(),
            ty: crate::frontend::ast::Type::Func(Box::default()),
            init: Some(literal(vec![
                defer("a", vec![]),
                Stmt::Expr(Expr::call("b", vec![])),
            ])),
        }]);
        assert!(!has_defer(&body));
        assert!(!has_direct_call(&body));
    }

    #[test]
    fn test_spawned_call_is_not_direct() {
        let body = Block::new(vec![Stmt::Go(CallExpr::named("worker", vec![Expr::Int(3)]))]);
        assert!(!has_direct_call(&body));
    }

    #[test]
    fn test_calls_in_deferred_arguments_are_direct() {
        let body = Block::new(vec![defer(
            "report",
            vec![Expr::binary(
                BinaryOp::Add,
                Expr::call("measure", vec![]),
                Expr::Int(1),
            )],
        )]);
        assert!(has_direct_call(&body));

        let body = Block::new(vec![Stmt::Go(CallExpr::new(
            Expr::call("pick_worker", vec![]),
            vec![],
        ))]);
        assert!(has_direct_call(&body));
    }

    #[test]
    fn test_walk_stops_after_first_match() {
        let body = Block::new(vec![
            defer("a", vec![]),
            defer("b", vec![]),
            defer("c", vec![]),
        ]);
        let mut visited = 0;
        let mut found = false;
        inspect(&body, &mut |node| {
            if found {
                return false;
            }
            visited += 1;
            if let Node::Stmt(Stmt::Defer(_)) = node {
                found = true;
            }
            !found
        });
        assert_eq!(visited, 1);
    }
}
