use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Dispatcher,
    Operator,
    Courier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Dispatcher => "dispatcher",
            Role::Operator => "operator",
            Role::Courier => "courier",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "administrator" => Ok(Role::Administrator),
            "dispatcher" => Ok(Role::Dispatcher),
            "operator" => Ok(Role::Operator),
            "courier" => Ok(Role::Courier),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Explicit caller identity threaded through every operation. There is
/// no ambient "current user"; whoever calls the service says who they
/// are acting as, and access control decides what that allows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActorContext {
    pub id: Uuid,
    pub role: Role,
}

impl ActorContext {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}
