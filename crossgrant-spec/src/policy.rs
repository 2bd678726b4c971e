//! Typed access-policy documents.
//!
//! Only the fields this system reads or writes are typed. Everything else is
//! carried through untouched in the `extra` maps so that documents owned by
//! somebody else survive a read-modify-write unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Policy language version written by this system.
pub const POLICY_VERSION: &str = "2012-10-17";

/// A JSON value that may be given either as a single item or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Statement principal: either the `"*"` wildcard or a map such as
/// `{"AWS": "arn:aws:iam::123456789012:role/x"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    Wildcard(String),
    Mapped(BTreeMap<String, OneOrMany<String>>),
}

impl Principal {
    pub fn aws(arn: impl Into<String>) -> Self {
        let mut mapped = BTreeMap::new();
        mapped.insert("AWS".to_string(), OneOrMany::One(arn.into()));
        Principal::Mapped(mapped)
    }
}

/// One authorization rule of a [`PolicyDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Principal", default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<OneOrMany<String>>,
    #[serde(rename = "Resource", default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany<String>>,
    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Statement {
    pub fn new(effect: Effect) -> Self {
        Self {
            sid: None,
            effect,
            principal: None,
            action: None,
            resource: None,
            condition: None,
            extra: Map::new(),
        }
    }

    pub fn allow() -> Self {
        Self::new(Effect::Allow)
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(OneOrMany::One(action.into()));
        self
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.action = Some(OneOrMany::Many(
            actions.iter().map(|action| action.to_string()).collect(),
        ));
        self
    }

    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resource = Some(OneOrMany::Many(resources));
        self
    }

    pub fn has_sid(&self, sid: &str) -> bool {
        self.sid.as_deref() == Some(sid)
    }
}

/// An access policy: version, optional id and an ordered statement list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "Statement",
        default,
        deserialize_with = "statements_from_one_or_many"
    )]
    pub statements: Vec<Statement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: Some(POLICY_VERSION.to_string()),
            id: None,
            statements,
            extra: Map::new(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn statement(&self, sid: &str) -> Option<&Statement> {
        self.statements.iter().find(|statement| statement.has_sid(sid))
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

fn statements_from_one_or_many<'de, D>(deserializer: D) -> Result<Vec<Statement>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::<Statement>::deserialize(deserializer).map(OneOrMany::into_vec)
}
