//! Datalog query construction for the Roam `/q` endpoint.
//!
//! Clause text only ever references variables. Every caller-supplied value
//! (page titles, block strings) is declared as an `:in` variable and sent in
//! `args`, so titles containing quotes or brackets cannot alter the query.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatalogQuery {
    pub query: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct QueryBuilder {
    find: String,
    inputs: Vec<&'static str>,
    args: Vec<Value>,
    clauses: Vec<&'static str>,
}

impl QueryBuilder {
    pub fn find(spec: impl Into<String>) -> Self {
        Self {
            find: spec.into(),
            ..Self::default()
        }
    }

    /// Binds `value` to the logic variable `var` (e.g. `?title`).
    pub fn input(mut self, var: &'static str, value: impl Into<Value>) -> Self {
        debug_assert!(var.starts_with('?'), "datalog input must be a variable");
        self.inputs.push(var);
        self.args.push(value.into());
        self
    }

    pub fn clause(mut self, clause: &'static str) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn build(self) -> DatalogQuery {
        let mut query = format!("[:find {}", self.find);
        if !self.inputs.is_empty() {
            query.push_str(" :in $");
            for var in &self.inputs {
                query.push(' ');
                query.push_str(var);
            }
        }
        query.push_str(" :where");
        for clause in &self.clauses {
            query.push(' ');
            query.push_str(clause);
        }
        query.push(']');
        DatalogQuery {
            query,
            args: self.args,
        }
    }
}

/// A pull pattern, optionally repeating itself under `:block/children`.
#[derive(Debug, Clone)]
pub struct Pull {
    attrs: &'static [&'static str],
    children: Option<Box<Pull>>,
}

impl Pull {
    pub fn attrs(attrs: &'static [&'static str]) -> Self {
        Self {
            attrs,
            children: None,
        }
    }

    /// Nests the same attributes `depth` levels down `:block/children`.
    pub fn with_children(mut self, depth: usize) -> Self {
        if depth > 0 {
            self.children = Some(Box::new(Pull::attrs(self.attrs).with_children(depth - 1)));
        }
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("[{}", self.attrs.join(" "));
        if let Some(children) = &self.children {
            out.push_str(" {:block/children ");
            out.push_str(&children.render());
            out.push('}');
        }
        out.push(']');
        out
    }

    pub fn of(&self, var: &str) -> String {
        format!("(pull {var} {})", self.render())
    }
}

const BLOCK_ATTRS: &[&str] = &[":block/uid", ":block/string", ":block/order"];
const PAGE_ATTRS: &[&str] = &[":block/uid", ":node/title", ":block/string"];

/// Every block on the categories page, each with its nested children.
pub fn categories_query(page_title: &str, depth: usize) -> DatalogQuery {
    QueryBuilder::find(Pull::attrs(BLOCK_ATTRS).with_children(depth).of("?block"))
        .input("?page-title", page_title)
        .clause("[?page :node/title ?page-title]")
        .clause("[?block :block/page ?page]")
        .build()
}

pub fn pages_query() -> DatalogQuery {
    QueryBuilder::find(Pull::attrs(PAGE_ATTRS).of("?page"))
        .clause("[?page :node/title]")
        .build()
}

/// Children of the block whose string is `container` on the page `page_title`.
pub fn timeline_query(page_title: &str, container: &str) -> DatalogQuery {
    QueryBuilder::find(Pull::attrs(BLOCK_ATTRS).of("?child"))
        .input("?title", page_title)
        .input("?container", container)
        .clause("[?p :node/title ?title]")
        .clause("[?b :block/page ?p]")
        .clause("[?b :block/string ?container]")
        .clause("[?b :block/children ?child]")
        .build()
}
