//! The analysis pass.
//!
//! Scope resolution, column checking, restriction enforcement, and
//! anti-pattern detection run as a single traversal over the parsed query:
//! one `ScopeFrame` per `SELECT`, `WITH`, or subquery boundary, with the
//! checks applied per frame. Violations accumulate; analysis never stops
//! early, so the caller sees the complete violation set even for queries
//! that cannot be repaired.

use std::collections::HashSet;

use sqlparser::ast::{
    Distinct, Expr, GroupByExpr, JoinConstraint, JoinOperator, ObjectName, Offset, OrderBy, Query,
    Select, SelectItem, SetExpr, TableFactor, TableWithJoins,
};

use sqlward_core::CompiledPolicy;

use crate::scope::{ColumnCheck, ScopeFrame};
use crate::visit::{walk_expr, ColumnRef, ExprVisitor};
use crate::{always_true, projection, restriction};

/// Tunable analyzer behavior beyond the policy itself.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOptions {
    pub(crate) deny_functions: HashSet<String>,
}

impl AnalyzerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid a function by name (case-insensitive). Function calls are
    /// allowed by default.
    pub fn deny_function(mut self, name: impl Into<String>) -> Self {
        self.deny_functions.insert(name.into().to_lowercase());
        self
    }
}

/// Mutable state of one verification call.
pub(crate) struct AnalysisContext<'p> {
    policy: &'p CompiledPolicy,
    options: &'p AnalyzerOptions,
    pub(crate) errors: Vec<String>,
    pub(crate) unfixable: bool,
}

impl<'p> AnalysisContext<'p> {
    pub fn new(policy: &'p CompiledPolicy, options: &'p AnalyzerOptions) -> Self {
        Self {
            policy,
            options,
            errors: Vec::new(),
            unfixable: false,
        }
    }

    /// Record a violation. Errors keep insertion order; repeats are folded.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
    }

    /// Mark the query as beyond repair; `fixed` will be withheld.
    pub fn mark_unfixable(&mut self) {
        self.unfixable = true;
    }

    /// Analyze one query node: CTE bindings first, then the body, then the
    /// query-level tail clauses.
    pub fn analyze_query(&mut self, query: &mut Query, parent: Option<&ScopeFrame<'p, '_>>) {
        let Query {
            with,
            body,
            order_by,
            limit,
            offset,
            ..
        } = query;

        let mut scope = ScopeFrame::child(parent);
        if let Some(with) = with {
            if with.recursive {
                // A recursive CTE body may name itself before the binding
                // below exists; pre-register the names as opaque.
                for cte in &with.cte_tables {
                    scope.push_cte(&cte.alias.name.value, Vec::new(), true);
                }
            }
            for cte in &mut with.cte_tables {
                self.analyze_query(&mut cte.query, Some(&scope));
                let (columns, mut opaque) = projection_names(&cte.query.body);
                if !cte.alias.columns.is_empty() {
                    opaque = true;
                }
                scope.push_cte(&cte.alias.name.value, columns, opaque);
            }
        }

        match body.as_mut() {
            SetExpr::Select(select) => {
                let tail = TailClauses {
                    order_by: order_by.as_mut(),
                    limit: limit.as_mut(),
                    offset: offset.as_mut(),
                };
                self.analyze_select(select, &scope, tail);
            }
            other => self.analyze_set_expr(other, &scope),
        }
    }

    /// Set operations analyze each arm independently in the same scope.
    fn analyze_set_expr(&mut self, body: &mut SetExpr, scope: &ScopeFrame<'p, '_>) {
        match body {
            SetExpr::Select(select) => self.analyze_select(select, scope, TailClauses::none()),
            SetExpr::Query(query) => self.analyze_query(query, Some(scope)),
            SetExpr::SetOperation { left, right, .. } => {
                self.analyze_set_expr(left, scope);
                self.analyze_set_expr(right, scope);
            }
            // VALUES and friends carry no table references to police.
            _ => {}
        }
    }

    fn analyze_select(
        &mut self,
        select: &mut Select,
        outer: &ScopeFrame<'p, '_>,
        tail: TailClauses<'_>,
    ) {
        // Bind every FROM relation into this scope.
        let mut frame = ScopeFrame::child(Some(outer));
        for table_with_joins in select.from.iter_mut() {
            self.add_relation(&mut frame, &mut table_with_joins.relation, outer);
            for join in table_with_joins.joins.iter_mut() {
                self.add_relation(&mut frame, &mut join.relation, outer);
            }
        }

        // Join conditions see the full frame.
        for table_with_joins in select.from.iter_mut() {
            self.check_join_constraints(table_with_joins, &frame);
        }

        // Projections: star expansion and illegal-column stripping.
        projection::check_projections(self, select, &frame);

        // WHERE: drop always-true clauses, then check column legality on
        // what remains.
        always_true::prune_where(self, &mut select.selection);
        if let Some(selection) = select.selection.as_mut() {
            let refs = scan_expr(self, selection, &frame);
            self.check_refs_strict(refs, &frame);
        }

        // Row-level restrictions, in this scope.
        restriction::enforce(self, select, &frame);

        // Remaining clause legality.
        if let Some(Distinct::On(exprs)) = select.distinct.as_mut() {
            for expr in exprs.iter_mut() {
                let refs = scan_expr(self, expr, &frame);
                self.check_refs_strict(refs, &frame);
            }
        }
        if let GroupByExpr::Expressions(exprs, _) = &mut select.group_by {
            for expr in exprs.iter_mut() {
                let refs = scan_expr(self, expr, &frame);
                self.check_refs_strict(refs, &frame);
            }
        }
        if let Some(having) = select.having.as_mut() {
            let refs = scan_expr(self, having, &frame);
            self.check_refs_strict(refs, &frame);
        }

        self.check_tail(tail, &frame);
    }

    fn check_tail(&mut self, tail: TailClauses<'_>, frame: &ScopeFrame<'p, '_>) {
        if let Some(order_by) = tail.order_by {
            for order_expr in order_by.exprs.iter_mut() {
                let refs = scan_expr(self, &mut order_expr.expr, frame);
                self.check_refs_strict(refs, frame);
            }
        }
        if let Some(limit) = tail.limit {
            let refs = scan_expr(self, limit, frame);
            self.check_refs_strict(refs, frame);
        }
        if let Some(offset) = tail.offset {
            let refs = scan_expr(self, &mut offset.value, frame);
            self.check_refs_strict(refs, frame);
        }
    }

    /// Bind one FROM relation. Table names resolve against enclosing CTE
    /// bindings first, then the policy; misses are reported and bound as
    /// denied so later column references do not cascade.
    fn add_relation<'a>(
        &mut self,
        frame: &mut ScopeFrame<'p, 'a>,
        relation: &mut TableFactor,
        outer: &'a ScopeFrame<'p, 'a>,
    ) {
        match relation {
            TableFactor::Table { name, alias, .. } => {
                let alias_name = alias.as_ref().map(|a| a.name.value.clone());
                let parts: Vec<String> = name.0.iter().map(|i| i.value.to_lowercase()).collect();
                let table_display = name
                    .0
                    .last()
                    .map(|i| i.value.clone())
                    .unwrap_or_default();

                if parts.len() == 1 {
                    if let Some((columns, opaque)) = outer.resolve_cte(&parts[0]) {
                        frame.push_derived(
                            Some(alias_name.unwrap_or_else(|| table_display.clone())),
                            columns,
                            opaque,
                        );
                        return;
                    }
                }

                let table_name = parts.last().map(String::as_str).unwrap_or_default();
                let database = if parts.len() >= 2 {
                    Some(parts[parts.len() - 2].as_str())
                } else {
                    None
                };
                match self.policy.resolve(database, table_name) {
                    Some(table) => frame.push_table(table, alias_name),
                    None => {
                        tracing::debug!(table = %table_display, "table reference failed policy lookup");
                        self.error(format!("Table {} is not allowed", table_display));
                        self.mark_unfixable();
                        frame.push_denied(alias_name.unwrap_or(table_display));
                    }
                }
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                self.analyze_query(subquery, Some(outer));
                let (columns, opaque) = projection_names(&subquery.body);
                frame.push_derived(
                    alias.as_ref().map(|a| a.name.value.clone()),
                    columns,
                    opaque,
                );
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.add_relation(frame, &mut table_with_joins.relation, outer);
                for join in table_with_joins.joins.iter_mut() {
                    self.add_relation(frame, &mut join.relation, outer);
                }
            }
            other => {
                tracing::debug!(relation = %other, "unsupported relation kind in FROM; not bound");
            }
        }
    }

    fn check_join_constraints(
        &mut self,
        table_with_joins: &mut TableWithJoins,
        frame: &ScopeFrame<'p, '_>,
    ) {
        if let TableFactor::NestedJoin {
            table_with_joins: nested,
            ..
        } = &mut table_with_joins.relation
        {
            self.check_join_constraints(nested, frame);
        }
        for join in table_with_joins.joins.iter_mut() {
            if let TableFactor::NestedJoin {
                table_with_joins: nested,
                ..
            } = &mut join.relation
            {
                self.check_join_constraints(nested, frame);
            }
            let constraint = match &mut join.join_operator {
                JoinOperator::Inner(constraint)
                | JoinOperator::LeftOuter(constraint)
                | JoinOperator::RightOuter(constraint)
                | JoinOperator::FullOuter(constraint) => constraint,
                _ => continue,
            };
            match constraint {
                JoinConstraint::On(expr) => {
                    let refs = scan_expr(self, expr, frame);
                    self.check_refs_strict(refs, frame);
                }
                JoinConstraint::Using(columns) => {
                    // USING names a column shared by both sides; resolve
                    // leniently so the shared name is not ambiguous.
                    for ident in columns.iter() {
                        if frame.check_column(&[], &ident.value, true) == ColumnCheck::NotAllowed {
                            self.error(format!("Column {} is not allowed", ident.value));
                            self.mark_unfixable();
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Column legality outside the projection list. Predicates are never
    /// rewritten, so a violation here leaves the query unfixable.
    pub(crate) fn check_refs_strict(&mut self, refs: Vec<ColumnRef>, frame: &ScopeFrame<'p, '_>) {
        for r in refs {
            if frame.check_column(&r.qualifier, &r.name, false) == ColumnCheck::NotAllowed {
                self.error(format!("Column {} is not allowed", r.name));
                self.mark_unfixable();
            }
        }
    }

    pub(crate) fn check_function(&mut self, name: &ObjectName) {
        if let Some(last) = name.0.last() {
            if self.options.deny_functions.contains(&last.value.to_lowercase()) {
                self.error(format!("Function {} is not allowed", last.value));
                self.mark_unfixable();
            }
        }
    }
}

/// Query-level clauses checked in the scope of a simple SELECT body.
pub(crate) struct TailClauses<'q> {
    order_by: Option<&'q mut OrderBy>,
    limit: Option<&'q mut Expr>,
    offset: Option<&'q mut Offset>,
}

impl TailClauses<'_> {
    fn none() -> Self {
        Self {
            order_by: None,
            limit: None,
            offset: None,
        }
    }
}

/// Collect column references from an expression, analyzing any embedded
/// subqueries in their own scope and applying the function deny-list.
pub(crate) fn scan_expr<'p>(
    ctx: &mut AnalysisContext<'p>,
    expr: &mut Expr,
    frame: &ScopeFrame<'p, '_>,
) -> Vec<ColumnRef> {
    struct Scan<'c, 'p, 'f, 'g> {
        ctx: &'c mut AnalysisContext<'p>,
        frame: &'f ScopeFrame<'p, 'g>,
        refs: Vec<ColumnRef>,
    }

    impl ExprVisitor for Scan<'_, '_, '_, '_> {
        fn column(&mut self, column: ColumnRef) {
            self.refs.push(column);
        }
        fn function(&mut self, name: &ObjectName) {
            self.ctx.check_function(name);
        }
        fn subquery(&mut self, query: &mut Query) {
            self.ctx.analyze_query(query, Some(self.frame));
        }
    }

    let mut scan = Scan {
        ctx,
        frame,
        refs: Vec::new(),
    };
    walk_expr(expr, &mut scan);
    scan.refs
}

/// Visible column names a derived table or CTE exposes: identifiers pass
/// through, aliases win, anything unnamed makes the relation opaque.
fn projection_names(body: &SetExpr) -> (Vec<String>, bool) {
    match body {
        SetExpr::Select(select) => {
            let mut names = Vec::new();
            let mut opaque = false;
            for item in &select.projection {
                match item {
                    SelectItem::UnnamedExpr(Expr::Identifier(ident)) => {
                        names.push(ident.value.clone())
                    }
                    SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                        if let Some(last) = parts.last() {
                            names.push(last.value.clone());
                        }
                    }
                    SelectItem::ExprWithAlias { alias, .. } => names.push(alias.value.clone()),
                    _ => opaque = true,
                }
            }
            (names, opaque)
        }
        SetExpr::SetOperation { left, .. } => projection_names(left),
        SetExpr::Query(query) => projection_names(&query.body),
        _ => (Vec::new(), true),
    }
}
