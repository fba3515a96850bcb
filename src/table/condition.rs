use std::fmt;

use crate::catalog::AttributeType;
use crate::common::{DbError, Operator, Result};
use crate::storage::page::AttributeValue;

use super::Value;

/// `attribute <operator> value` filter used by search, update and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub attribute: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(attribute: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        }
    }

    /// Builds a condition from an operator symbol such as `"<="` or
    /// `"contains"`.
    pub fn parse(
        attribute: impl Into<String>,
        operator: &str,
        value: impl Into<Value>,
    ) -> Result<Self> {
        Ok(Self::new(attribute, operator.parse()?, value))
    }

    /// Checks the operator and operand against the attribute's type.
    pub fn check(&self, table: &str, attribute_type: AttributeType) -> Result<()> {
        if !self.value.fits(attribute_type) || self.value.is_null() {
            return Err(DbError::TypeMismatch {
                table: table.to_string(),
                attribute: self.attribute.clone(),
                expected: attribute_type.page_type(),
                found: self.value.type_name().to_string(),
            });
        }
        if !self.operator.supported_on(attribute_type.page_type()) {
            return Err(DbError::UnsupportedOperator {
                attribute: self.attribute.clone(),
                operator: self.operator.to_string(),
                page_type: attribute_type.page_type(),
            });
        }
        Ok(())
    }

    /// Evaluates `candidate <operator> value`. Null never matches.
    pub fn matches(&self, candidate: &Value) -> bool {
        match (candidate, &self.value) {
            (Value::String(a), Value::String(b)) => AttributeValue::matches(a, self.operator, b),
            (Value::Integer(a), Value::Integer(b)) => AttributeValue::matches(a, self.operator, b),
            (Value::Boolean(a), Value::Boolean(b)) => AttributeValue::matches(a, self.operator, b),
            _ => false,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.operator, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_conditions() {
        let contains = Condition::parse("city", "contains", "on").unwrap();
        assert!(contains.matches(&Value::from("London")));
        assert!(contains.matches(&Value::from("Dijon")));
        assert!(!contains.matches(&Value::from("Paris")));
        assert!(!contains.matches(&Value::Null));

        let loose = Condition::parse("city", "=", "paris").unwrap();
        assert!(loose.matches(&Value::from("Paris")));
    }

    #[test]
    fn test_integer_conditions() {
        let below = Condition::new("salary", Operator::Lt, 50000);
        assert!(below.matches(&Value::from(49999)));
        assert!(!below.matches(&Value::from(50000)));
        assert!(!below.matches(&Value::from("49999")));
    }

    #[test]
    fn test_check_rejects_bad_conditions() {
        let ordering_on_string = Condition::new("name", Operator::Lt, "Ada");
        assert!(matches!(
            ordering_on_string.check("people", AttributeType::String),
            Err(DbError::UnsupportedOperator { .. })
        ));

        let wrong_operand = Condition::new("age", Operator::Eq, "36");
        assert!(matches!(
            wrong_operand.check("people", AttributeType::Integer),
            Err(DbError::TypeMismatch { .. })
        ));

        assert!(Condition::parse("age", "~", 1).is_err());
        assert!(Condition::new("age", Operator::Ge, 18)
            .check("people", AttributeType::Integer)
            .is_ok());
    }
}
