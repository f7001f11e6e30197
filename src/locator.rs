//! Locator expressions: a small XPath subset evaluated over [`XmlDocument`]s.
//!
//! Institutions describe where their record identifier lives with a path
//! expression such as `controlfield[@tag='001']` (MARC) or
//! `//TEI[.//msIdentifier/idno[@type='call-number'] = 'ID_PLACEHOLDER']` (TEI).
//! This module parses those expressions with `nom` and evaluates them.
//!
//! # Supported syntax
//!
//! - absolute (`/a/b`, `//a`) and relative (`a/b`, `a//b`) location paths
//! - name tests (qualified names allowed), `*`, `@name`, `@*`, `text()`,
//!   `node()`, `.` and `..`
//! - predicates: `[expr]`, any number per step
//! - string literals, `=`, `!=`, `and`, `or`, parentheses
//! - functions `contains`, `starts-with`, `normalize-space`, `not`
//!
//! # Id binding
//!
//! The token [`ID_PLACEHOLDER`], bare or inside a string literal, stands for the
//! institutional id. The id is supplied at evaluation time and compared as a
//! value; it is never spliced into the expression text, so ids containing
//! quotes or brackets cannot alter the query.
//!
//! # Examples
//!
//! ```
//! use ds_import::locator::Query;
//! use ds_import::xml_document::{NamespaceMode, XmlDocument};
//!
//! let doc = XmlDocument::parse_str(
//!     r#"<collection>
//!          <record><controlfield tag="001">a1</controlfield></record>
//!          <record><controlfield tag="001">b2</controlfield></record>
//!        </collection>"#,
//!     NamespaceMode::Strip,
//! )
//! .unwrap();
//!
//! let query = Query::parse("//record[controlfield[@tag='001'] = 'ID_PLACEHOLDER']").unwrap();
//! let hits = query.select(&doc, XmlDocument::DOCUMENT, Some("b2")).unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::error::{ImportError, Result};
use crate::xml_document::{NodeId, XmlDocument};

/// Token replaced by the institutional id when a locator is evaluated.
pub const ID_PLACEHOLDER: &str = "ID_PLACEHOLDER";

// ============================================================================
// AST
// ============================================================================

/// Parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A location path selecting nodes
    Path(LocationPath),
    /// A string literal, possibly containing [`ID_PLACEHOLDER`]
    Literal(String),
    /// The bare [`ID_PLACEHOLDER`] token
    Placeholder,
    /// Logical disjunction
    Or(Box<Expr>, Box<Expr>),
    /// Logical conjunction
    And(Box<Expr>, Box<Expr>),
    /// Equality or inequality comparison
    Compare {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: CompareOp,
        /// Right operand
        right: Box<Expr>,
    },
    /// Function call
    Call {
        /// Called function
        function: Function,
        /// Arguments in order
        args: Vec<Expr>,
    },
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
}

/// Built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `contains(haystack, needle)`
    Contains,
    /// `starts-with(value, prefix)`
    StartsWith,
    /// `normalize-space(value)`
    NormalizeSpace,
    /// `not(value)`
    Not,
}

impl Function {
    fn from_name(name: &str) -> std::result::Result<Self, String> {
        match name {
            "contains" => Ok(Self::Contains),
            "starts-with" => Ok(Self::StartsWith),
            "normalize-space" => Ok(Self::NormalizeSpace),
            "not" => Ok(Self::Not),
            other => Err(format!("unknown function {other}")),
        }
    }

    const fn arity(self) -> usize {
        match self {
            Self::Contains | Self::StartsWith => 2,
            Self::NormalizeSpace | Self::Not => 1,
        }
    }
}

/// A sequence of steps, optionally anchored at the document node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationPath {
    /// Whether evaluation starts at the document node
    pub absolute: bool,
    /// Steps in order
    pub steps: Vec<Step>,
}

/// One step of a location path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Direction of travel
    pub axis: Axis,
    /// Which nodes on the axis are kept
    pub test: NodeTest,
    /// Filters applied to each kept node
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }
}

/// Step axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Children of the context node
    Child,
    /// The context node and all its descendants (the `//` abbreviation)
    DescendantOrSelf,
    /// Attributes of the context element
    Attribute,
    /// The context node itself (`.`)
    SelfNode,
    /// The parent of the context node (`..`)
    Parent,
}

/// Step node test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// Element or attribute with this exact name
    Name(String),
    /// Any element, or any attribute on the attribute axis (`*`)
    Wildcard,
    /// Text nodes (`text()`)
    Text,
    /// Any node (`node()`, `.`, `..`)
    AnyNode,
}

// ============================================================================
// PARSER
// ============================================================================

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Parse an element or attribute name such as `controlfield` or `mods:title`
fn name_token(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char)))(input)
}

/// Parse a keyword that is not the prefix of a longer name
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    delimited(multispace0, terminated(tag(word), not(satisfy(is_name_char))), multispace0)
}

/// Parse a quoted string: "some text" or 'some text'
fn string_literal(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
        delimited(char('\''), take_till(|c| c == '\''), char('\'')),
    ))(input)
}

fn predicate(input: &str) -> IResult<&str, Expr> {
    delimited(
        pair(char('['), multispace0),
        or_expr,
        pair(multispace0, char(']')),
    )(input)
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        value(NodeTest::Text, tag("text()")),
        value(NodeTest::AnyNode, tag("node()")),
        value(NodeTest::Wildcard, char('*')),
        map(name_token, |name| NodeTest::Name(name.to_string())),
    ))(input)
}

fn step(input: &str) -> IResult<&str, Step> {
    let abbreviated = alt((
        value((Axis::Parent, NodeTest::AnyNode), tag("..")),
        value((Axis::SelfNode, NodeTest::AnyNode), char('.')),
    ));
    let attribute = map(
        preceded(
            char('@'),
            alt((
                value(NodeTest::Wildcard, char('*')),
                map(name_token, |name| NodeTest::Name(name.to_string())),
            )),
        ),
        |test| (Axis::Attribute, test),
    );
    let child = map(node_test, |test| (Axis::Child, test));

    let (input, (axis, test)) = alt((abbreviated, attribute, child))(input)?;
    let (input, predicates) = many0(predicate)(input)?;
    Ok((
        input,
        Step {
            axis,
            test,
            predicates,
        },
    ))
}

/// Parse `step ('/' step | '//' step)*`
fn relative_steps(input: &str) -> IResult<&str, Vec<Step>> {
    let (mut input, first) = step(input)?;
    let mut steps = vec![first];

    loop {
        if let Ok((rest, next)) = preceded(tag("//"), step)(input) {
            steps.push(Step::descendant_or_self());
            steps.push(next);
            input = rest;
        } else if let Ok((rest, next)) = preceded(char('/'), step)(input) {
            steps.push(next);
            input = rest;
        } else {
            return Ok((input, steps));
        }
    }
}

fn location_path(input: &str) -> IResult<&str, LocationPath> {
    alt((
        map(preceded(tag("//"), relative_steps), |steps| {
            let mut all = vec![Step::descendant_or_self()];
            all.extend(steps);
            LocationPath {
                absolute: true,
                steps: all,
            }
        }),
        map(preceded(char('/'), opt(relative_steps)), |steps| LocationPath {
            absolute: true,
            steps: steps.unwrap_or_default(),
        }),
        map(relative_steps, |steps| LocationPath {
            absolute: false,
            steps,
        }),
    ))(input)
}

fn function_call(input: &str) -> IResult<&str, Expr> {
    let start = input;
    let (input, function) = map_res(name_token, Function::from_name)(input)?;
    let (input, _) = pair(multispace0, char('('))(input)?;
    let (input, args) = separated_list0(char(','), or_expr)(input)?;
    let (input, _) = pair(multispace0, char(')'))(input)?;

    if args.len() != function.arity() {
        return Err(nom::Err::Failure(nom::error::Error::new(
            start,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((input, Expr::Call { function, args }))
}

fn primary(input: &str) -> IResult<&str, Expr> {
    delimited(
        multispace0,
        alt((
            delimited(pair(char('('), multispace0), or_expr, pair(multispace0, char(')'))),
            map(string_literal, |s| Expr::Literal(s.to_string())),
            value(
                Expr::Placeholder,
                terminated(tag(ID_PLACEHOLDER), not(satisfy(is_name_char))),
            ),
            function_call,
            map(location_path, Expr::Path),
        )),
        multispace0,
    )(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, left) = primary(input)?;
    let (input, rest) = opt(pair(
        alt((value(CompareOp::Ne, tag("!=")), value(CompareOp::Eq, char('=')))),
        primary,
    ))(input)?;

    Ok(match rest {
        Some((op, right)) => (
            input,
            Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        ),
        None => (input, left),
    })
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = comparison(input)?;
    let (input, rest) = many0(preceded(keyword("and"), comparison))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, next| Expr::And(Box::new(acc), Box::new(next)));
    Ok((input, expr))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(keyword("or"), and_expr))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, next| Expr::Or(Box::new(acc), Box::new(next)));
    Ok((input, expr))
}

// ============================================================================
// QUERY
// ============================================================================

/// Something a location path can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    /// An element, text or document node
    Node(NodeId),
    /// The attribute at `index` on the element `NodeId`
    Attribute(NodeId, usize),
}

impl Item {
    /// Position in document order: attributes sort directly after their element.
    fn order_key(self) -> (NodeId, usize) {
        match self {
            Item::Node(id) => (id, 0),
            Item::Attribute(id, index) => (id, index + 1),
        }
    }

    /// The element node of this item, if it is one.
    #[must_use]
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            Item::Node(id) => Some(id),
            Item::Attribute(..) => None,
        }
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Items(Vec<Item>),
    Str(String),
    Bool(bool),
}

/// A compiled locator expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    source: String,
    expr: Expr,
}

impl Query {
    /// Parse a locator expression.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Locator`] if the expression is not valid.
    pub fn parse(locator: &str) -> Result<Self> {
        let parsed = all_consuming(delimited(multispace0, or_expr, multispace0))(locator);
        match parsed {
            Ok((_, expr)) => Ok(Query {
                source: locator.to_string(),
                expr,
            }),
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                let offset = locator.len() - e.input.len();
                let message = if e.input.is_empty() {
                    "unexpected end of expression".to_string()
                } else {
                    format!("unexpected input at offset {offset}: '{}'", e.input)
                };
                Err(ImportError::Locator {
                    locator: locator.to_string(),
                    message,
                })
            },
            Err(nom::Err::Incomplete(_)) => Err(ImportError::Locator {
                locator: locator.to_string(),
                message: "incomplete expression".to_string(),
            }),
        }
    }

    /// The expression text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The parsed expression tree.
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Whether the expression refers to [`ID_PLACEHOLDER`].
    #[must_use]
    pub fn has_placeholder(&self) -> bool {
        self.source.contains(ID_PLACEHOLDER)
    }

    /// Select the nodes matched by this expression.
    ///
    /// `context` is the node relative paths start from; `id` is bound to
    /// [`ID_PLACEHOLDER`]. Results are in document order without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Locator`] if the expression yields a string or
    /// boolean instead of nodes.
    pub fn select(&self, doc: &XmlDocument, context: NodeId, id: Option<&str>) -> Result<Vec<Item>> {
        let evaluator = Evaluator { doc, id };
        match evaluator.eval(&self.expr, Item::Node(context)) {
            Value::Items(items) => Ok(items),
            Value::Str(_) | Value::Bool(_) => Err(ImportError::Locator {
                locator: self.source.clone(),
                message: "expression does not select nodes".to_string(),
            }),
        }
    }

    /// Evaluate the expression to a string, XPath `string()` style.
    ///
    /// Node selections yield the text of the first node, or `None` when
    /// nothing is selected.
    #[must_use]
    pub fn string(&self, doc: &XmlDocument, context: NodeId, id: Option<&str>) -> Option<String> {
        let evaluator = Evaluator { doc, id };
        match evaluator.eval(&self.expr, Item::Node(context)) {
            Value::Items(items) => items.first().map(|&item| evaluator.item_string(item)),
            other => Some(evaluator.to_string_value(&other)),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Query {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        Query::parse(s)
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

struct Evaluator<'a> {
    doc: &'a XmlDocument,
    id: Option<&'a str>,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr, context: Item) -> Value {
        match expr {
            Expr::Path(path) => Value::Items(self.eval_path(path, context)),
            Expr::Literal(text) => match self.id {
                Some(id) if text.contains(ID_PLACEHOLDER) => {
                    Value::Str(text.replace(ID_PLACEHOLDER, id))
                },
                _ => Value::Str(text.clone()),
            },
            Expr::Placeholder => Value::Str(self.id.unwrap_or(ID_PLACEHOLDER).to_string()),
            Expr::Or(left, right) => Value::Bool(
                self.to_bool(&self.eval(left, context)) || self.to_bool(&self.eval(right, context)),
            ),
            Expr::And(left, right) => Value::Bool(
                self.to_bool(&self.eval(left, context)) && self.to_bool(&self.eval(right, context)),
            ),
            Expr::Compare { left, op, right } => {
                let left = self.eval(left, context);
                let right = self.eval(right, context);
                Value::Bool(self.compare(&left, *op, &right))
            },
            Expr::Call { function, args } => self.call(*function, args, context),
        }
    }

    fn call(&self, function: Function, args: &[Expr], context: Item) -> Value {
        let arg_string = |index: usize| {
            args.get(index)
                .map(|arg| self.to_string_value(&self.eval(arg, context)))
                .unwrap_or_default()
        };
        match function {
            Function::Contains => Value::Bool(arg_string(0).contains(&arg_string(1))),
            Function::StartsWith => Value::Bool(arg_string(0).starts_with(&arg_string(1))),
            Function::NormalizeSpace => {
                Value::Str(arg_string(0).split_whitespace().collect::<Vec<_>>().join(" "))
            },
            Function::Not => Value::Bool(
                !args
                    .first()
                    .is_some_and(|arg| self.to_bool(&self.eval(arg, context))),
            ),
        }
    }

    fn eval_path(&self, path: &LocationPath, context: Item) -> Vec<Item> {
        let mut current = if path.absolute {
            vec![Item::Node(XmlDocument::DOCUMENT)]
        } else {
            vec![context]
        };
        for step in &path.steps {
            current = self.apply_step(step, &current);
            if current.is_empty() {
                break;
            }
        }
        current
    }

    fn apply_step(&self, step: &Step, input: &[Item]) -> Vec<Item> {
        let mut out = Vec::new();
        for &item in input {
            for candidate in self.axis(step.axis, item) {
                if !self.matches_test(&step.test, step.axis, candidate) {
                    continue;
                }
                let keep = step
                    .predicates
                    .iter()
                    .all(|predicate| self.to_bool(&self.eval(predicate, candidate)));
                if keep {
                    out.push(candidate);
                }
            }
        }
        out.sort_unstable_by_key(|item| item.order_key());
        out.dedup();
        out
    }

    fn axis(&self, axis: Axis, item: Item) -> Vec<Item> {
        match (axis, item) {
            (Axis::SelfNode, _) => vec![item],
            (Axis::Parent, Item::Attribute(owner, _)) => vec![Item::Node(owner)],
            (Axis::Parent, Item::Node(id)) => self.doc.parent(id).map(Item::Node).into_iter().collect(),
            (Axis::Child, Item::Node(id)) => self.doc.children(id).iter().copied().map(Item::Node).collect(),
            (Axis::DescendantOrSelf, Item::Node(id)) => std::iter::once(id)
                .chain(self.doc.descendants(id))
                .map(Item::Node)
                .collect(),
            (Axis::Attribute, Item::Node(id)) => (0..self.doc.attributes(id).len())
                .map(|index| Item::Attribute(id, index))
                .collect(),
            (Axis::DescendantOrSelf, Item::Attribute(..)) => vec![item],
            (Axis::Child | Axis::Attribute, Item::Attribute(..)) => Vec::new(),
        }
    }

    fn matches_test(&self, test: &NodeTest, axis: Axis, item: Item) -> bool {
        match (test, item) {
            (NodeTest::AnyNode, _) => true,
            (NodeTest::Text, Item::Node(id)) => self.doc.text_value(id).is_some(),
            (NodeTest::Text, Item::Attribute(..)) => false,
            (NodeTest::Wildcard, Item::Node(id)) => axis != Axis::Attribute && self.doc.is_element(id),
            (NodeTest::Wildcard, Item::Attribute(..)) => axis == Axis::Attribute,
            (NodeTest::Name(name), Item::Node(id)) => {
                axis != Axis::Attribute && self.doc.name(id) == Some(name.as_str())
            },
            (NodeTest::Name(name), Item::Attribute(owner, index)) => {
                axis == Axis::Attribute
                    && self
                        .doc
                        .attributes(owner)
                        .get(index)
                        .is_some_and(|(key, _)| key == name)
            },
        }
    }

    fn item_string(&self, item: Item) -> String {
        match item {
            Item::Node(id) => self.doc.string_value(id),
            Item::Attribute(owner, index) => self
                .doc
                .attributes(owner)
                .get(index)
                .map(|(_, value)| value.clone())
                .unwrap_or_default(),
        }
    }

    fn to_bool(&self, value: &Value) -> bool {
        match value {
            Value::Items(items) => !items.is_empty(),
            Value::Str(text) => !text.is_empty(),
            Value::Bool(flag) => *flag,
        }
    }

    fn to_string_value(&self, value: &Value) -> String {
        match value {
            Value::Items(items) => items
                .first()
                .map(|&item| self.item_string(item))
                .unwrap_or_default(),
            Value::Str(text) => text.clone(),
            Value::Bool(flag) => flag.to_string(),
        }
    }

    fn strings(&self, value: &Value) -> Vec<String> {
        match value {
            Value::Items(items) => items.iter().map(|&item| self.item_string(item)).collect(),
            other => vec![self.to_string_value(other)],
        }
    }

    /// Node sets compare existentially: true if any pair of values satisfies `op`.
    fn compare(&self, left: &Value, op: CompareOp, right: &Value) -> bool {
        if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
            let equal = self.to_bool(left) == self.to_bool(right);
            return match op {
                CompareOp::Eq => equal,
                CompareOp::Ne => !equal,
            };
        }

        let right = self.strings(right);
        self.strings(left).iter().any(|l| {
            right.iter().any(|r| match op {
                CompareOp::Eq => l == r,
                CompareOp::Ne => l != r,
            })
        })
    }
}
