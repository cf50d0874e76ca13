//! JSON-schema-like tool declarations
//!
//! Published to the language model as function declarations. Every enumerated
//! parameter lists its allowed values so the model can pick instead of guess.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ToolKind;
use crate::taxonomy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    String,
    Integer,
    Number,
    Boolean,
}

impl SchemaType {
    /// Upper-case name used by the Gemini `Schema.type` enum
    pub fn as_upper(self) -> &'static str {
        match self {
            SchemaType::Object => "OBJECT",
            SchemaType::String => "STRING",
            SchemaType::Integer => "INTEGER",
            SchemaType::Number => "NUMBER",
            SchemaType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ParameterSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ParameterSchema {
    fn of(kind: SchemaType, description: Option<&str>) -> Self {
        Self {
            kind,
            description: description.map(str::to_string),
            enum_values: Vec::new(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn object() -> Self {
        Self::of(SchemaType::Object, None)
    }

    pub fn string(description: &str) -> Self {
        Self::of(SchemaType::String, Some(description))
    }

    pub fn integer(description: &str) -> Self {
        Self::of(SchemaType::Integer, Some(description))
    }

    pub fn boolean(description: &str) -> Self {
        Self::of(SchemaType::Boolean, Some(description))
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn property(mut self, name: &str, schema: ParameterSchema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    pub fn require(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

/// One callable tool as seen by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

//
// ================= Catalog =================
//

fn date(description: &str) -> ParameterSchema {
    ParameterSchema::string(&format!("{} (YYYY-MM-DD)", description))
}

fn category() -> ParameterSchema {
    ParameterSchema::string("Primary spending category").one_of(taxonomy::primary_values())
}

fn bank_id() -> ParameterSchema {
    ParameterSchema::string("Restrict to one linked bank")
}

fn merchant() -> ParameterSchema {
    ParameterSchema::string("Merchant name, case-insensitive substring match")
}

fn pending() -> ParameterSchema {
    ParameterSchema::boolean("Include only pending (true) or posted (false) transactions. Defaults to false.")
}

/// Filters shared by total, breakdown and listing.
fn filtered() -> ParameterSchema {
    ParameterSchema::object()
        .property("dateFrom", date("Start date, inclusive. Defaults to the first of this month"))
        .property("dateTo", date("End date, inclusive. Defaults to today"))
        .property("pending", pending())
        .property("category", category())
        .property("bankId", bank_id())
        .property("merchant", merchant())
}

fn ranged() -> ParameterSchema {
    ParameterSchema::object()
        .property("dateFrom", date("Start date, inclusive"))
        .property("dateTo", date("End date, inclusive"))
}

pub(crate) fn schema_for(kind: ToolKind) -> ToolSchema {
    let (description, parameters) = match kind {
        ToolKind::SpendTotal => (
            "Total amount spent, optionally filtered by dates, category, bank or merchant.",
            filtered(),
        ),
        ToolKind::SpendBreakdown => (
            "Spending totals grouped by category, merchant or day.",
            filtered()
                .property(
                    "groupBy",
                    ParameterSchema::string("Bucket to group by").one_of(["category", "merchant", "day"]),
                )
                .require(&["groupBy"]),
        ),
        ToolKind::Transactions => (
            "List individual transactions matching the filters.",
            filtered()
                .property(
                    "orderBy",
                    ParameterSchema::string("Sort field").one_of(["date", "amount", "name"]),
                )
                .property("desc", ParameterSchema::boolean("Sort descending"))
                .property("limit", ParameterSchema::integer("Maximum number of transactions. Defaults to 25.")),
        ),
        ToolKind::PeriodComparison => (
            "Compare spending between a current and a previous period, optionally per group.",
            ParameterSchema::object()
                .property("currentFrom", date("Current period start"))
                .property("currentTo", date("Current period end"))
                .property("previousFrom", date("Previous period start"))
                .property("previousTo", date("Previous period end"))
                .property(
                    "groupBy",
                    ParameterSchema::string("Optional per-group comparison").one_of(["category", "merchant", "day"]),
                )
                .property("pending", pending())
                .property("category", category())
                .property("bankId", bank_id())
                .property("merchant", merchant())
                .require(&["currentFrom", "currentTo", "previousFrom", "previousTo"]),
        ),
        ToolKind::Recurring => (
            "Detect subscriptions and other recurring charges with their monthly cost.",
            ranged().property("bankId", bank_id()).require(&["dateFrom", "dateTo"]),
        ),
        ToolKind::MovingAverage => (
            "Average spending per day, week or month with a time series.",
            ranged()
                .property(
                    "granularity",
                    ParameterSchema::string("Averaging unit. Defaults to day.").one_of(["day", "week", "month"]),
                )
                .property(
                    "scope",
                    ParameterSchema::string("Split the average per category or merchant. Defaults to overall.")
                        .one_of(["overall", "category", "merchant"]),
                )
                .property("pending", pending())
                .property("category", category())
                .property("merchant", merchant())
                .property("bankId", bank_id())
                .require(&["dateFrom", "dateTo"]),
        ),
        ToolKind::TopN => (
            "Rank merchants or categories by total spend.",
            ranged()
                .property(
                    "dimension",
                    ParameterSchema::string("What to rank").one_of(["merchant", "category"]),
                )
                .property(
                    "direction",
                    ParameterSchema::string("Highest or lowest spend first. Defaults to top.").one_of(["top", "bottom"]),
                )
                .property("limit", ParameterSchema::integer("Number of entries. Defaults to 5."))
                .property(
                    "minCount",
                    ParameterSchema::integer("Ignore keys with fewer transactions. Defaults to 1."),
                )
                .property("pending", pending())
                .property("category", category())
                .property("bankId", bank_id())
                .require(&["dimension", "dateFrom", "dateTo"]),
        ),
    };

    ToolSchema {
        name: kind.name().to_string(),
        description: description.to_string(),
        parameters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_shape() {
        let schema = schema_for(ToolKind::SpendBreakdown);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["name"], "get_spend_breakdown");
        assert_eq!(value["parameters"]["type"], "object");
        assert_eq!(value["parameters"]["required"][0], "groupBy");
        assert_eq!(
            value["parameters"]["properties"]["groupBy"]["enum"],
            serde_json::json!(["category", "merchant", "day"])
        );
        assert!(value["parameters"]["properties"]["dateFrom"].get("enum").is_none());
    }

    #[test]
    fn test_category_enum_comes_from_taxonomy() {
        let schema = schema_for(ToolKind::TopN);
        let category = &schema.parameters.properties["category"];
        assert_eq!(category.enum_values, taxonomy::primary_values());
        assert_eq!(schema.parameters.required, vec!["dimension", "dateFrom", "dateTo"]);
    }

    #[test]
    fn test_moving_average_and_top_n_declare_pending() {
        for kind in [ToolKind::MovingAverage, ToolKind::TopN] {
            let schema = schema_for(kind);
            let value = serde_json::to_value(&schema).unwrap();
            assert_eq!(value["parameters"]["properties"]["pending"]["type"], "boolean");
        }
    }
}
