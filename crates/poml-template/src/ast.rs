//! Expression syntax tree.
//!
//! The parser produces an [`Expr`] once per expression; evaluation walks the
//! tree against a variable environment. Precedence lives in the shape of the
//! tree: `||` binds loosest, then the ternary, then a single comparison, then
//! unary `!`, then primaries.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

/// A parsed template expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value: string, number, boolean, null, or a JSON/list literal.
    Literal(Value),
    /// A dotted variable path such as `user.name` or `items.0`.
    Path(VarPath),
    /// `path + integer`, e.g. `loop.index0 + 1`.
    Increment { path: VarPath, by: i64 },
    /// Unary negation: `!expr`.
    Not(Box<Expr>),
    /// Binary comparison: `left op right`.
    Compare {
        left: Box<Expr>,
        op: CmpOp,
        right: Box<Expr>,
    },
    /// `cond ? then : otherwise`.
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Short-circuit `left || right`.
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Returns the root identifiers of every variable path in the expression.
    ///
    /// ```rust
    /// use poml_template::parse_expression;
    ///
    /// let expr = parse_expression("user.name || fallback").unwrap();
    /// assert_eq!(expr.references(), vec!["user", "fallback"]);
    /// ```
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path(path) | Expr::Increment { path, .. } => out.push(path.root()),
            Expr::Not(inner) => inner.collect_references(out),
            Expr::Compare { left, right, .. } | Expr::Or(left, right) => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_references(out);
                then.collect_references(out);
                otherwise.collect_references(out);
            }
        }
    }
}

/// A dotted variable path. Always has at least one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPath {
    segments: Vec<String>,
}

impl VarPath {
    pub(crate) fn new(root: String) -> Self {
        Self {
            segments: vec![root],
        }
    }

    pub(crate) fn push(&mut self, segment: String) {
        self.segments.push(segment);
    }

    /// The first segment (the bound variable name).
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    /// All segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    /// Evaluates the operator given the ordering of its operands.
    pub fn eval_ordering(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Gte => ordering != Ordering::Less,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Lte => ordering != Ordering::Greater,
        }
    }

    /// The operator's source spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_ordering() {
        assert!(CmpOp::Gt.eval_ordering(Ordering::Greater));
        assert!(!CmpOp::Gt.eval_ordering(Ordering::Equal));
        assert!(CmpOp::Gte.eval_ordering(Ordering::Equal));
        assert!(CmpOp::Lte.eval_ordering(Ordering::Less));
        assert!(CmpOp::Ne.eval_ordering(Ordering::Less));
        assert!(!CmpOp::Eq.eval_ordering(Ordering::Less));
    }

    #[test]
    fn test_var_path_display() {
        let mut path = VarPath::new("user".into());
        path.push("name".into());
        assert_eq!(path.to_string(), "user.name");
        assert_eq!(path.root(), "user");
    }
}
