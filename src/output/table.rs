use serde::Serialize;
use tabled::{Table, Tabled};

use crate::alerts::RuleCheck;

/// Trait for items that can be displayed as tables or JSON
pub trait OutputFormat {
    fn to_table(&self) -> String;
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

/// Row for the rule check table
#[derive(Tabled, Serialize, Debug)]
pub struct RuleCheckRow {
    #[tabled(rename = "Service")]
    pub label: String,
    #[tabled(rename = "Rule")]
    pub rule: String,
    #[tabled(rename = "Alerts When")]
    pub condition: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl RuleCheckRow {
    pub fn from_check(check: &RuleCheck) -> Self {
        let status = if check.problems.is_empty() {
            "ok".to_string()
        } else {
            check.problems.join("; ")
        };

        Self {
            label: check.label.clone(),
            rule: check.rule.clone(),
            condition: format!("{} {}", check.direction, check.threshold),
            status,
        }
    }
}

impl OutputFormat for Vec<RuleCheck> {
    fn to_table(&self) -> String {
        if self.is_empty() {
            return "No rules found.".to_string();
        }

        let rows: Vec<RuleCheckRow> = self.iter().map(RuleCheckRow::from_check).collect();

        Table::new(rows).to_string()
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Direction;

    fn check(problems: Vec<&str>) -> RuleCheck {
        RuleCheck {
            label: "postgres".to_string(),
            rule: "cpu".to_string(),
            direction: Direction::Above,
            threshold: "80".to_string(),
            problems: problems.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn test_row_creation() {
        let row = RuleCheckRow::from_check(&check(vec![]));
        assert_eq!(row.label, "postgres");
        assert_eq!(row.condition, "above 80");
        assert_eq!(row.status, "ok");

        let row = RuleCheckRow::from_check(&check(vec!["bad subject", "bad body"]));
        assert_eq!(row.status, "bad subject; bad body");
    }

    #[test]
    fn test_empty_table() {
        let empty: Vec<RuleCheck> = vec![];
        assert_eq!(empty.to_table(), "No rules found.");
    }

    #[test]
    fn test_table_and_json_output() {
        let checks = vec![check(vec![])];
        let table = checks.to_table();
        assert!(table.contains("Service"));
        assert!(table.contains("postgres"));
        assert!(table.contains("above 80"));

        let json = checks.to_json().unwrap();
        assert!(json.contains("\"rule\": \"cpu\""));
        assert!(json.contains("\"direction\": true"));
    }
}
