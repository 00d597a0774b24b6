//! A small navigation language for derived attributes.
//!
//! ```text
//! expr  := path | func "(" path ")"
//! func  := count | sum | exists | size
//! path  := root ("." name)*
//! root  := self | instances "(" <metamodel-uri>#<type> ")"
//! ```
//!
//! Each step reads the named attribute of every node reached so far, or
//! follows the references of that name when no attribute is set. Nodes in a
//! result are reported by identifier.

use modelsync_api::{EvaluationError, ExpressionEngine, ModelAccess, NodeId, PropertyValue, TypeRef};
use smol_str::SmolStr;

pub const PATH_LANGUAGE: &str = "path";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Count,
    Sum,
    Exists,
    Size,
}

impl Func {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "count" => Some(Func::Count),
            "sum" => Some(Func::Sum),
            "exists" => Some(Func::Exists),
            "size" => Some(Func::Size),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Root {
    SelfNode,
    Instances(TypeRef),
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
    root: Root,
    steps: Vec<SmolStr>,
}

#[derive(Debug, Clone, PartialEq)]
struct Expr {
    func: Option<Func>,
    path: Path,
}

enum Item {
    Node(NodeId),
    Value(PropertyValue),
}

fn syntax(logic: &str, message: impl Into<String>) -> EvaluationError {
    EvaluationError::Syntax {
        logic: logic.to_string(),
        message: message.into(),
    }
}

fn parse(logic: &str) -> Result<Expr, EvaluationError> {
    let text = logic.trim();
    if let Some(open) = text.find('(') {
        if let Some(func) = Func::parse(&text[..open]) {
            let inner = text[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| syntax(logic, "missing `)`"))?;
            return Ok(Expr {
                func: Some(func),
                path: parse_path(logic, inner.trim())?,
            });
        }
    }
    Ok(Expr {
        func: None,
        path: parse_path(logic, text)?,
    })
}

fn parse_path(logic: &str, text: &str) -> Result<Path, EvaluationError> {
    let (root, rest) = if let Some(rest) = text.strip_prefix("self") {
        (Root::SelfNode, rest)
    } else if let Some(rest) = text.strip_prefix("instances(") {
        let close = rest
            .find(')')
            .ok_or_else(|| syntax(logic, "missing `)` after instances"))?;
        let type_ref = TypeRef::parse(rest[..close].trim())
            .ok_or_else(|| syntax(logic, "expected <uri>#<type> in instances(...)"))?;
        (Root::Instances(type_ref), &rest[close + 1..])
    } else {
        return Err(syntax(logic, "a path starts with `self` or `instances(...)`"));
    };

    let mut steps = Vec::new();
    if !rest.is_empty() {
        let Some(rest) = rest.strip_prefix('.') else {
            return Err(syntax(logic, format!("unexpected `{}`", rest)));
        };
        for step in rest.split('.') {
            let valid = !step.is_empty()
                && step.chars().all(|c| c.is_alphanumeric() || c == '_');
            if !valid {
                return Err(syntax(logic, format!("invalid step `{}`", step)));
            }
            steps.push(SmolStr::new(step));
        }
    }
    Ok(Path { root, steps })
}

fn walk(path: &Path, access: &mut dyn ModelAccess) -> Result<Vec<Item>, EvaluationError> {
    let mut items: Vec<Item> = match &path.root {
        Root::SelfNode => vec![Item::Node(access.self_node())],
        Root::Instances(type_ref) => access
            .instances_of(type_ref)?
            .into_iter()
            .map(Item::Node)
            .collect(),
    };
    for step in &path.steps {
        let mut next = Vec::new();
        for item in items {
            let Item::Node(node) = item else {
                return Err(EvaluationError::Type(format!(
                    "cannot navigate `{}` from a value",
                    step
                )));
            };
            match access.attribute(node, step)? {
                Some(PropertyValue::List(values)) => {
                    next.extend(values.into_iter().map(Item::Value))
                }
                Some(value) => next.push(Item::Value(value)),
                None => next.extend(access.references(node, step)?.into_iter().map(Item::Node)),
            }
        }
        items = next;
    }
    Ok(items)
}

fn to_value(item: Item, access: &mut dyn ModelAccess) -> Result<PropertyValue, EvaluationError> {
    match item {
        Item::Node(node) => Ok(access.identifier(node)?.into()),
        Item::Value(value) => Ok(value),
    }
}

fn sum(items: Vec<Item>) -> Result<PropertyValue, EvaluationError> {
    let mut int: i64 = 0;
    let mut float: Option<f64> = None;
    for item in items {
        match item {
            Item::Value(PropertyValue::Int(i)) => int += i,
            Item::Value(PropertyValue::Float(f)) => *float.get_or_insert(0.0) += f,
            _ => return Err(EvaluationError::Type("sum() over non-numeric values".into())),
        }
    }
    Ok(match float {
        Some(f) => PropertyValue::Float(f + int as f64),
        None => PropertyValue::Int(int),
    })
}

/// Expression engine for the `path` language.
#[derive(Debug, Default)]
pub struct PathEngine;

impl ExpressionEngine for PathEngine {
    fn language(&self) -> &str {
        PATH_LANGUAGE
    }

    fn evaluate(
        &self,
        logic: &str,
        access: &mut dyn ModelAccess,
    ) -> Result<PropertyValue, EvaluationError> {
        let expr = parse(logic)?;
        let items = walk(&expr.path, access)?;
        match expr.func {
            Some(Func::Count) => Ok(PropertyValue::Int(items.len() as i64)),
            Some(Func::Exists) => Ok(PropertyValue::Bool(!items.is_empty())),
            Some(Func::Sum) => sum(items),
            Some(Func::Size) => match items.as_slice() {
                [Item::Value(PropertyValue::Str(s))] => {
                    Ok(PropertyValue::Int(s.chars().count() as i64))
                }
                _ => Ok(PropertyValue::Int(items.len() as i64)),
            },
            None => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(to_value(item, access)?);
                }
                if values.len() == 1 {
                    Ok(values.remove(0))
                } else {
                    Ok(PropertyValue::List(values))
                }
            }
        }
    }
}
