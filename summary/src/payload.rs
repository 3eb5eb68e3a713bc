//! Validation of the inbound request body into a [`CustomerQuery`].
//!
//! The accepted body is an object with exactly one property, `customer_id`,
//! holding an integer no smaller than 1. Every violation found is reported.

use serde::Serialize;
use serde_json::{Map, Value, json};

const CUSTOMER_ID: &str = "customer_id";
const MINIMUM_CUSTOMER_ID: i64 = 1;

/// A customer lookup that passed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CustomerQuery {
    customer_id: i64,
}

impl CustomerQuery {
    pub fn customer_id(&self) -> i64 {
        self.customer_id
    }

    /// Parses and validates a raw request body. An empty body is treated as `{}`.
    pub fn from_slice(body: &[u8]) -> Result<Self, Vec<Violation>> {
        if body.iter().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
            return Self::from_value(&Value::Object(Map::new()));
        }

        let value: Value = serde_json::from_slice(body).map_err(|e| {
            vec![Violation::new(
                "",
                "parse",
                json!({ "reason": e.to_string() }),
                "must be valid JSON",
            )]
        })?;

        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, Vec<Violation>> {
        let Some(object) = value.as_object() else {
            return Err(vec![Violation::new(
                "",
                "type",
                json!({ "type": "object" }),
                "must be object",
            )]);
        };

        let mut violations = Vec::new();

        for key in object.keys().filter(|key| key.as_str() != CUSTOMER_ID) {
            violations.push(Violation::new(
                "",
                "additionalProperties",
                json!({ "additionalProperty": key }),
                "must NOT have additional properties",
            ));
        }

        let customer_id = match object.get(CUSTOMER_ID) {
            None => {
                violations.push(Violation::new(
                    "",
                    "required",
                    json!({ "missingProperty": CUSTOMER_ID }),
                    format!("must have required property '{CUSTOMER_ID}'"),
                ));
                None
            }
            Some(field) => match validate_customer_id(field) {
                Ok(id) => Some(id),
                Err(violation) => {
                    violations.push(violation);
                    None
                }
            },
        };

        match customer_id {
            Some(customer_id) if violations.is_empty() => Ok(CustomerQuery { customer_id }),
            _ => Err(violations),
        }
    }
}

fn validate_customer_id(field: &Value) -> Result<i64, Violation> {
    let path = format!("/{CUSTOMER_ID}");
    let not_integer = || {
        Violation::new(&path, "type", json!({ "type": "integer" }), "must be integer")
    };

    let Value::Number(number) = field else {
        return Err(not_integer());
    };

    // Bound as INT64 downstream.
    let too_large = || {
        Violation::new(
            &path,
            "maximum",
            json!({ "comparison": "<=", "limit": i64::MAX }),
            format!("must be <= {}", i64::MAX),
        )
    };

    // Integral floats such as `42.0` are integers as far as JSON is concerned.
    let id = if let Some(id) = number.as_i64() {
        id
    } else if number.is_u64() {
        return Err(too_large());
    } else {
        match number.as_f64() {
            Some(f) if f.fract() != 0.0 => return Err(not_integer()),
            Some(f) if f >= i64::MAX as f64 => return Err(too_large()),
            // Rejected by the minimum check below.
            Some(f) if f < MINIMUM_CUSTOMER_ID as f64 => MINIMUM_CUSTOMER_ID - 1,
            Some(f) => f as i64,
            None => return Err(not_integer()),
        }
    };

    if id < MINIMUM_CUSTOMER_ID {
        return Err(Violation::new(
            &path,
            "minimum",
            json!({ "comparison": ">=", "limit": MINIMUM_CUSTOMER_ID }),
            format!("must be >= {MINIMUM_CUSTOMER_ID}"),
        ));
    }

    Ok(id)
}

/// One reason a request body was rejected.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub instance_path: String,
    pub keyword: &'static str,
    pub params: Value,
    pub message: String,
}

impl Violation {
    fn new(
        instance_path: &str,
        keyword: &'static str,
        params: Value,
        message: impl Into<String>,
    ) -> Self {
        Violation {
            instance_path: instance_path.to_string(),
            keyword,
            params,
            message: message.into(),
        }
    }
}
