use std::fmt;
use std::str::FromStr;

use super::{DbError, PageType};

/// Comparison operator of a search condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `contains`, substring match on strings
    Contains,
    /// `=`, case-insensitive equality on strings
    EqIgnoreCase,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
            Operator::EqIgnoreCase => "=",
        }
    }

    /// Whether attribute pages of `page_type` can be scanned with this
    /// operator.
    pub fn supported_on(&self, page_type: PageType) -> bool {
        match page_type {
            PageType::String => matches!(
                self,
                Operator::Eq | Operator::Ne | Operator::Contains | Operator::EqIgnoreCase
            ),
            PageType::Integer => matches!(
                self,
                Operator::Eq
                    | Operator::Ne
                    | Operator::Lt
                    | Operator::Le
                    | Operator::Gt
                    | Operator::Ge
            ),
            PageType::Boolean => matches!(self, Operator::Eq | Operator::Ne),
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "contains" => Ok(Operator::Contains),
            "=" => Ok(Operator::EqIgnoreCase),
            other => Err(DbError::UnknownOperator(other.to_string())),
        }
    }
}
