//! Projection checking: `SELECT *` expansion and illegal-column stripping.

use sqlparser::ast::{Expr, Ident, ObjectName, Select, SelectItem};

use crate::analyzer::{scan_expr, AnalysisContext};
use crate::scope::{Binding, ColumnCheck, ScopeFrame};

const SELECT_STAR: &str = "SELECT * is not allowed";

/// Check every projection of a SELECT: expand stars, strip projections
/// referencing disallowed columns, and flag an emptied projection list.
pub(crate) fn check_projections<'p>(
    ctx: &mut AnalysisContext<'p>,
    select: &mut Select,
    frame: &ScopeFrame<'p, '_>,
) {
    let items = std::mem::take(&mut select.projection);
    let mut kept: Vec<SelectItem> = Vec::with_capacity(items.len());

    for item in items {
        match item {
            SelectItem::Wildcard(_) => {
                ctx.error(SELECT_STAR);
                expand_star(frame, &mut kept);
            }
            SelectItem::QualifiedWildcard(name, _) => {
                ctx.error(SELECT_STAR);
                expand_qualified_star(frame, &name, &mut kept);
            }
            SelectItem::UnnamedExpr(mut expr) => {
                if keep_expr(ctx, &mut expr, frame) {
                    kept.push(SelectItem::UnnamedExpr(expr));
                }
            }
            SelectItem::ExprWithAlias { mut expr, alias } => {
                if keep_expr(ctx, &mut expr, frame) {
                    kept.push(SelectItem::ExprWithAlias { expr, alias });
                }
            }
        }
    }

    if kept.is_empty() {
        ctx.error("No legal elements in SELECT clause");
        ctx.mark_unfixable();
    }
    select.projection = kept;
}

/// Expand a bare `*` to the allowed columns of every bound policy table,
/// in source order. With more than one table the expansion is qualified so
/// shared column names stay unambiguous.
fn expand_star(frame: &ScopeFrame<'_, '_>, kept: &mut Vec<SelectItem>) {
    let bindings: Vec<_> = frame.table_bindings().collect();
    let qualify = bindings.len() > 1;
    for (table, alias) in bindings {
        for column in table.columns() {
            let expr = if qualify {
                let qualifier = alias.unwrap_or_else(|| table.name());
                Expr::CompoundIdentifier(vec![Ident::new(qualifier), Ident::new(column.clone())])
            } else {
                Expr::Identifier(Ident::new(column.clone()))
            };
            kept.push(SelectItem::UnnamedExpr(expr));
        }
    }
}

/// Expand `t.*` to that table's allowed columns, keeping the qualifier as
/// written.
fn expand_qualified_star(
    frame: &ScopeFrame<'_, '_>,
    name: &ObjectName,
    kept: &mut Vec<SelectItem>,
) {
    let qualifier: Vec<String> = name.0.iter().map(|i| i.value.clone()).collect();
    match frame.find_relation(&qualifier) {
        Some(Binding::Table { table, .. }) => {
            for column in table.columns() {
                let mut parts: Vec<Ident> = name.0.clone();
                parts.push(Ident::new(column.clone()));
                kept.push(SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)));
            }
        }
        Some(Binding::Derived {
            columns,
            opaque: false,
        }) => {
            for column in columns {
                let mut parts: Vec<Ident> = name.0.clone();
                parts.push(Ident::new(column.clone()));
                kept.push(SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)));
            }
        }
        // Denied tables are already reported; opaque or unknown relations
        // have no column list to expand into.
        _ => {}
    }
}

/// Whether a projection expression may stay. Any reference to a disallowed
/// column strips the whole projection.
fn keep_expr<'p>(
    ctx: &mut AnalysisContext<'p>,
    expr: &mut Expr,
    frame: &ScopeFrame<'p, '_>,
) -> bool {
    let refs = scan_expr(ctx, expr, frame);
    let mut keep = true;
    for r in refs {
        match frame.check_column(&r.qualifier, &r.name, false) {
            ColumnCheck::Allowed | ColumnCheck::Skipped => {}
            ColumnCheck::NotAllowed => {
                ctx.error(format!(
                    "Column {} is not allowed. Column removed from SELECT clause",
                    r.name
                ));
                keep = false;
            }
        }
    }
    keep
}
