use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::name::{NodeLocation, QualifiedName};

/// Interval used by `PRINT` when the client does not supply one.
pub const DEFAULT_PRINT_INTERVAL: u32 = 1;

/// One parsed command.
///
/// The source location is diagnostic metadata only: two statements with the
/// same kind compare equal (and hash equally) regardless of where they were
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    kind: StatementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<NodeLocation>,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn located(kind: StatementKind, location: NodeLocation) -> Self {
        Self {
            kind,
            location: Some(location),
        }
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn into_kind(self) -> StatementKind {
        self.kind
    }

    pub fn location(&self) -> Option<NodeLocation> {
        self.location
    }

    pub fn is_distributed(&self) -> bool {
        self.kind.is_distributed()
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Statement {}

impl Hash for Statement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl From<StatementKind> for Statement {
    fn from(kind: StatementKind) -> Self {
        Statement::new(kind)
    }
}

/// Closed set of commands understood by the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementKind {
    PrintTopic(PrintTopic),
    RegisterTopic(RegisterTopic),
    DropTopic(DropTopic),
    SetProperty(SetProperty),
    UnsetProperty(UnsetProperty),
    ListTopics,
    ListFunctions,
    ListProperties,
}

impl StatementKind {
    /// Distributed statements change cluster state and must go through the
    /// command log; everything else is answered by the receiving node.
    pub fn is_distributed(&self) -> bool {
        match self {
            StatementKind::RegisterTopic(_)
            | StatementKind::DropTopic(_)
            | StatementKind::SetProperty(_)
            | StatementKind::UnsetProperty(_) => true,
            StatementKind::PrintTopic(_)
            | StatementKind::ListTopics
            | StatementKind::ListFunctions
            | StatementKind::ListProperties => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::PrintTopic(_) => "print_topic",
            StatementKind::RegisterTopic(_) => "register_topic",
            StatementKind::DropTopic(_) => "drop_topic",
            StatementKind::SetProperty(_) => "set_property",
            StatementKind::UnsetProperty(_) => "unset_property",
            StatementKind::ListTopics => "list_topics",
            StatementKind::ListFunctions => "list_functions",
            StatementKind::ListProperties => "list_properties",
        }
    }
}

/// `PRINT <topic> [FROM BEGINNING] [INTERVAL n] [LIMIT n]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrintTopic {
    topic: QualifiedName,
    from_beginning: bool,
    interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

impl PrintTopic {
    /// An omitted `interval` becomes [`DEFAULT_PRINT_INTERVAL`]. Range checks
    /// belong to whoever builds the statement.
    pub fn new(
        topic: QualifiedName,
        from_beginning: bool,
        interval: Option<u32>,
        limit: Option<u32>,
    ) -> Self {
        Self {
            topic,
            from_beginning,
            interval: interval.unwrap_or(DEFAULT_PRINT_INTERVAL),
            limit,
        }
    }

    pub fn topic(&self) -> &QualifiedName {
        &self.topic
    }

    pub fn from_beginning(&self) -> bool {
        self.from_beginning
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterTopic {
    pub topic: QualifiedName,
    #[serde(default)]
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropTopic {
    pub topic: QualifiedName,
    #[serde(default)]
    pub if_exists: bool,
}

/// `SET '<name>' = '<value>'`. The value stays raw text until it is coerced
/// against the property schema on apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetProperty {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnsetProperty {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn orders() -> QualifiedName {
        QualifiedName::simple("orders").unwrap()
    }

    #[test]
    fn print_topic_defaults_interval() {
        let print = PrintTopic::new(orders(), false, None, None);
        assert_eq!(print.interval(), DEFAULT_PRINT_INTERVAL);
        assert_eq!(print, PrintTopic::new(orders(), false, Some(1), None));
    }

    #[test]
    fn absent_limit_differs_from_zero_limit() {
        let absent = PrintTopic::new(orders(), false, None, None);
        let zero = PrintTopic::new(orders(), false, None, Some(0));
        assert_ne!(absent, zero);
    }

    #[test]
    fn every_field_participates_in_equality() {
        let base = PrintTopic::new(orders(), true, Some(2), Some(10));
        let variants = [
            PrintTopic::new(
                QualifiedName::simple("payments").unwrap(),
                true,
                Some(2),
                Some(10),
            ),
            PrintTopic::new(orders(), false, Some(2), Some(10)),
            PrintTopic::new(orders(), true, Some(3), Some(10)),
            PrintTopic::new(orders(), true, Some(2), None),
        ];
        for other in variants {
            assert_ne!(base, other);
        }
        assert_eq!(base, PrintTopic::new(orders(), true, Some(2), Some(10)));
    }

    #[test]
    fn location_is_ignored_by_equality_and_hash() {
        let kind = StatementKind::PrintTopic(PrintTopic::new(orders(), false, None, None));
        let a = Statement::located(kind.clone(), NodeLocation::new(1, 1));
        let b = Statement::located(kind.clone(), NodeLocation::new(7, 12));
        let c = Statement::new(kind);
        assert_eq!(a, b);
        assert_eq!(a, c);

        let set: HashSet<Statement> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn classifies_distributed_statements() {
        assert!(StatementKind::SetProperty(SetProperty {
            name: "a".into(),
            value: "b".into(),
        })
        .is_distributed());
        assert!(!StatementKind::ListTopics.is_distributed());
        assert!(
            !StatementKind::PrintTopic(PrintTopic::new(orders(), false, None, None))
                .is_distributed()
        );
    }

    #[test]
    fn statement_json_is_tagged_by_kind() {
        let stmt = Statement::new(StatementKind::RegisterTopic(RegisterTopic {
            topic: orders(),
            if_not_exists: true,
        }));
        let json = serde_json::to_value(&stmt).unwrap();
        assert_eq!(json["kind"]["type"], "register_topic");
        assert_eq!(json["kind"]["topic"], serde_json::json!(["orders"]));
        assert!(json.get("location").is_none());

        let back: Statement = serde_json::from_value(json).unwrap();
        assert_eq!(back, stmt);
    }
}
