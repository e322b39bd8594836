use uuid::Uuid;

use crate::models::actor::{ActorContext, Role};
use crate::models::request::{DeliveryRequest, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Request,
    Courier,
    Branch,
    Document,
    Report,
    Settings,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Request => "request",
            Resource::Courier => "courier",
            Resource::Branch => "branch",
            Resource::Document => "document",
            Resource::Report => "report",
            Resource::Settings => "settings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Assign,
    Export,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Assign => "assign",
            Action::Export => "export",
        }
    }
}

/// Static capability table. Fixed at compile time, never mutated at
/// runtime; roles are a closed set.
pub fn check_permission(role: Role, resource: Resource, action: Action) -> bool {
    use Action::*;
    use Resource::*;

    match role {
        Role::Administrator => true,
        Role::Dispatcher => match resource {
            Request => matches!(action, Create | Read | Update | Assign | Export),
            Courier => matches!(action, Read | Update | Assign),
            Branch | Document | Report => matches!(action, Read | Export),
            Settings => false,
        },
        Role::Operator => match resource {
            Request => matches!(action, Create | Read | Update),
            Courier => matches!(action, Read),
            Document | Report => matches!(action, Read),
            Branch | Settings => false,
        },
        Role::Courier => match resource {
            Request => matches!(action, Read | Update),
            Courier => matches!(action, Read | Update),
            Branch | Document | Report | Settings => false,
        },
    }
}

/// What slice of the request table an actor may see. Applied by every
/// read path before any other filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    CreatedBy(Uuid),
    AssignedTo(Uuid),
}

impl Visibility {
    pub fn allows(&self, request: &DeliveryRequest) -> bool {
        match self {
            Visibility::All => true,
            Visibility::CreatedBy(operator_id) => request.operator_id == *operator_id,
            Visibility::AssignedTo(courier_id) => request.assigned_courier == Some(*courier_id),
        }
    }
}

pub fn visibility(actor: &ActorContext) -> Visibility {
    match actor.role {
        Role::Administrator | Role::Dispatcher => Visibility::All,
        Role::Operator => Visibility::CreatedBy(actor.id),
        Role::Courier => Visibility::AssignedTo(actor.id),
    }
}

/// Per-role restriction on which statuses may be targeted, on top of
/// the transition table. A courier reports delivery outcomes from the
/// road; intake and cancellation stay with the office roles.
pub fn can_transition(role: Role, target: RequestStatus) -> bool {
    match role {
        Role::Administrator | Role::Dispatcher => true,
        Role::Operator => matches!(
            target,
            RequestStatus::Processing | RequestStatus::Rejected | RequestStatus::Cancelled
        ),
        Role::Courier => matches!(
            target,
            RequestStatus::InDelivery | RequestStatus::Delivered | RequestStatus::Rejected
        ),
    }
}
