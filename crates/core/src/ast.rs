//! Syntax tree produced by the parser.
//! Every node carries the line of its first token.
//! Names are not resolved here -- that is the analyzer's job.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Role(RoleDecl),
    User(UserDecl),
    Resource(ResourceDecl),
    Group(GroupDecl),
    Rule(RuleDecl),
}

impl Statement {
    pub fn line(&self) -> u32 {
        match self {
            Statement::Role(d) => d.line,
            Statement::User(d) => d.line,
            Statement::Resource(d) => d.line,
            Statement::Group(d) => d.line,
            Statement::Rule(d) => d.line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleDecl {
    pub name: String,
    pub parent: Option<String>,
    pub body: Vec<RolePermissions>,
    pub line: u32,
}

/// One `permissions: [...]` or `can: [...] resources: [...]` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum RolePermissions {
    Blocks {
        blocks: Vec<PermissionBlockNode>,
        line: u32,
    },
    Legacy {
        actions: Vec<String>,
        resources: Vec<ResourceRef>,
        line: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PermissionBlockNode {
    /// Action words as written (`Read`, `*`); normalized by the analyzer.
    pub actions: Vec<String>,
    pub resources: Vec<ResourceRef>,
    pub condition: Option<Condition>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDecl {
    pub name: String,
    pub roles: Vec<String>,
    pub valid: Option<ValidPeriod>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidPeriod {
    pub from: String,
    pub until: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDecl {
    pub name: String,
    pub properties: Vec<ResourceProperty>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceProperty {
    Path { value: String, line: u32 },
    Type { value: ResourceType, line: u32 },
    Metadata { entries: Vec<MetadataEntry>, line: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    Api,
    Folder,
    Database,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Api => write!(f, "API"),
            ResourceType::Folder => write!(f, "FOLDER"),
            ResourceType::Database => write!(f, "DATABASE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Value,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDecl {
    pub name: String,
    pub members: Vec<String>,
    pub roles: Vec<String>,
    pub line: u32,
}

/// Standalone `ALLOW`/`DENY` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecl {
    pub rule_type: RuleType,
    pub actions: Vec<String>,
    pub resources: Vec<ResourceRef>,
    pub condition: Option<Condition>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleType {
    Allow,
    Deny,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Allow => write!(f, "ALLOW"),
            RuleType::Deny => write!(f, "DENY"),
        }
    }
}

/// `db.orders`, `api.*`, or a quoted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// Dotted segments; a segment may be `*`.
    Dotted(Vec<String>),
    Quoted(String),
}

impl ResourceRef {
    /// The pattern string used by the symbol table and the engine.
    pub fn pattern(&self) -> String {
        match self {
            ResourceRef::Dotted(segments) => segments.join("."),
            ResourceRef::Quoted(s) => s.clone(),
        }
    }
}

// ──────────────────────────────────────────────
// Conditions and expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Or {
        left: Box<Condition>,
        right: Box<Condition>,
    },
    And {
        left: Box<Condition>,
        right: Box<Condition>,
    },
    Not {
        operand: Box<Condition>,
    },
    Compare {
        left: Expr,
        op: CompareOp,
        right: Expr,
    },
    In {
        expr: Expr,
        values: Vec<Value>,
    },
    Contains {
        expr: Expr,
        value: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            ArithOp::Add | ArithOp::Sub => 1,
            ArithOp::Mul | ArithOp::Div => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Binary {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary `-` (`negate = true`) or `+`.
    Unary { negate: bool, operand: Box<Expr> },
    Literal { value: Value },
    /// Qualified name such as `user.department`.
    Name { path: Vec<String> },
}

/// Literal value. Numbers keep their source text so no precision is lost
/// before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Char(char),
    Int(String),
    Real(String),
    Ident(String),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    /// Plain JSON form used in metadata and attribute maps.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) | Value::Ident(s) => serde_json::Value::String(s.clone()),
            Value::Char(c) => serde_json::Value::String(c.to_string()),
            Value::Int(text) => text
                .parse::<i64>()
                .map(serde_json::Value::from)
                .unwrap_or_else(|_| serde_json::Value::String(text.clone())),
            Value::Real(text) => text
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(text.clone())),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Char(c) => write!(f, "{:?}", c),
            Value::Int(t) | Value::Real(t) | Value::Ident(t) => write!(f, "{}", t),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Condition {
    fn precedence(&self) -> u8 {
        match self {
            Condition::Or { .. } => 1,
            Condition::And { .. } => 2,
            Condition::Not { .. } => 3,
            _ => 4,
        }
    }

    fn fmt_child(&self, child: &Condition, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < self.precedence() {
            write!(f, "({})", child)
        } else {
            write!(f, "{}", child)
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Or { left, right } => {
                self.fmt_child(left, f)?;
                write!(f, " OR ")?;
                self.fmt_child(right, f)
            }
            Condition::And { left, right } => {
                self.fmt_child(left, f)?;
                write!(f, " AND ")?;
                self.fmt_child(right, f)
            }
            Condition::Not { operand } => {
                write!(f, "NOT ")?;
                self.fmt_child(operand, f)
            }
            Condition::Compare { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Condition::In { expr, values } => {
                write!(f, "{} IN {}", expr, Value::List(values.clone()))
            }
            Condition::Contains { expr, value } => write!(f, "{} CONTAINS {}", expr, value),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, left, right } => {
                let wrap = |e: &Expr, strict: bool| match e {
                    Expr::Binary { op: inner, .. } => {
                        inner.precedence() < op.precedence()
                            || (strict && inner.precedence() == op.precedence())
                    }
                    _ => false,
                };
                if wrap(left, false) {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, " {} ", op.symbol())?;
                if wrap(right, true) {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
            Expr::Unary { negate, operand } => {
                let sign = if *negate { "-" } else { "+" };
                match operand.as_ref() {
                    Expr::Binary { .. } => write!(f, "{}({})", sign, operand),
                    _ => write!(f, "{}{}", sign, operand),
                }
            }
            Expr::Literal { value } => write!(f, "{}", value),
            Expr::Name { path } => write!(f, "{}", path.join(".")),
        }
    }
}

// ──────────────────────────────────────────────
// Tree rendering
// ──────────────────────────────────────────────

/// Render the program as a parenthesized tree, one node per production.
pub fn render_tree(program: &Program) -> String {
    let mut out = String::from("(program");
    for stmt in &program.statements {
        out.push(' ');
        out.push_str(&render_statement(stmt));
    }
    out.push(')');
    out
}

fn render_list(label: &str, items: &[String]) -> String {
    if items.is_empty() {
        format!("({})", label)
    } else {
        format!("({} {})", label, items.join(" "))
    }
}

fn render_refs(refs: &[ResourceRef]) -> String {
    let items: Vec<String> = refs
        .iter()
        .map(|r| match r {
            ResourceRef::Dotted(_) => r.pattern(),
            ResourceRef::Quoted(s) => format!("{:?}", s),
        })
        .collect();
    render_list("resources", &items)
}

fn render_statement(stmt: &Statement) -> String {
    match stmt {
        Statement::Role(role) => {
            let mut parts = vec![format!("role {}", role.name)];
            if let Some(parent) = &role.parent {
                parts.push(format!("(extends {})", parent));
            }
            for clause in &role.body {
                parts.push(match clause {
                    RolePermissions::Blocks { blocks, .. } => {
                        let rendered: Vec<String> = blocks.iter().map(render_block).collect();
                        format!("(permissions {})", rendered.join(" "))
                    }
                    RolePermissions::Legacy {
                        actions, resources, ..
                    } => format!(
                        "(can {} {})",
                        render_list("actions", actions),
                        render_refs(resources)
                    ),
                });
            }
            format!("({})", parts.join(" "))
        }
        Statement::User(user) => {
            let mut parts = vec![format!("user {}", user.name), render_list("roles", &user.roles)];
            if let Some(valid) = &user.valid {
                parts.push(format!("(valid {:?} {:?})", valid.from, valid.until));
            }
            format!("({})", parts.join(" "))
        }
        Statement::Resource(res) => {
            let mut parts = vec![format!("resource {}", res.name)];
            for prop in &res.properties {
                parts.push(match prop {
                    ResourceProperty::Path { value, .. } => format!("(path {:?})", value),
                    ResourceProperty::Type { value, .. } => format!("(type {})", value),
                    ResourceProperty::Metadata { entries, .. } => {
                        let rendered: Vec<String> = entries
                            .iter()
                            .map(|e| format!("({} {})", e.key, e.value))
                            .collect();
                        render_list("metadata", &rendered)
                    }
                });
            }
            format!("({})", parts.join(" "))
        }
        Statement::Group(group) => format!(
            "(group {} {} {})",
            group.name,
            render_list("members", &group.members),
            render_list("roles", &group.roles)
        ),
        Statement::Rule(rule) => {
            let mut out = format!(
                "({} {} {}",
                rule.rule_type.to_string().to_lowercase(),
                render_list("actions", &rule.actions),
                render_refs(&rule.resources)
            );
            if let Some(cond) = &rule.condition {
                out.push_str(&format!(" (if {})", cond));
            }
            out.push(')');
            out
        }
    }
}

fn render_block(block: &PermissionBlockNode) -> String {
    let mut out = format!(
        "(block {} {}",
        render_list("actions", &block.actions),
        render_refs(&block.resources)
    );
    if let Some(cond) = &block.condition {
        out.push_str(&format!(" (conditions {})", cond));
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(path: &str) -> Expr {
        Expr::Name {
            path: path.split('.').map(str::to_owned).collect(),
        }
    }

    fn int(n: &str) -> Expr {
        Expr::Literal {
            value: Value::Int(n.to_owned()),
        }
    }

    #[test]
    fn condition_display_adds_parentheses_only_where_needed() {
        let cmp = |l: &str, n: &str| Condition::Compare {
            left: name(l),
            op: CompareOp::Gt,
            right: int(n),
        };
        let cond = Condition::And {
            left: Box::new(Condition::Or {
                left: Box::new(cmp("a", "1")),
                right: Box::new(cmp("b", "2")),
            }),
            right: Box::new(Condition::Not {
                operand: Box::new(cmp("c", "3")),
            }),
        };
        assert_eq!(cond.to_string(), "(a > 1 OR b > 2) AND NOT c > 3");
    }

    #[test]
    fn expression_display_respects_precedence() {
        let sum = Expr::Binary {
            op: ArithOp::Add,
            left: Box::new(name("x")),
            right: Box::new(int("1")),
        };
        let product = Expr::Binary {
            op: ArithOp::Mul,
            left: Box::new(sum),
            right: Box::new(int("2")),
        };
        assert_eq!(product.to_string(), "(x + 1) * 2");
    }

    #[test]
    fn values_convert_to_json() {
        assert_eq!(Value::Int("42".into()).to_json(), serde_json::json!(42));
        assert_eq!(Value::Real("2.5".into()).to_json(), serde_json::json!(2.5));
        assert_eq!(Value::Ident("prod".into()).to_json(), serde_json::json!("prod"));
        assert_eq!(
            Value::List(vec![Value::Bool(true), Value::Char('x')]).to_json(),
            serde_json::json!([true, "x"])
        );
    }

    #[test]
    fn resource_ref_pattern_joins_segments() {
        let r = ResourceRef::Dotted(vec!["api".into(), "users".into(), "*".into()]);
        assert_eq!(r.pattern(), "api.users.*");
        assert_eq!(ResourceRef::Quoted("/data".into()).pattern(), "/data");
    }
}
