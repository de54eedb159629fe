use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Helper,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Helper, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Helper => "helper",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
    Delete,
    Admin,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Write, Action::Delete, Action::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Admin => "admin",
        }
    }

    // actions that modify somebody's resource and therefore need ownership
    pub fn is_mutation(&self) -> bool {
        matches!(self, Action::Write | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Users,
    Helpers,
    RecipeRequests,
    Tasks,
    Feedback,
    Relationships,
    #[serde(rename = "qrcodes")]
    QrCodes,
    Logs,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Users => "users",
            ResourceType::Helpers => "helpers",
            ResourceType::RecipeRequests => "recipe_requests",
            ResourceType::Tasks => "tasks",
            ResourceType::Feedback => "feedback",
            ResourceType::Relationships => "relationships",
            ResourceType::QrCodes => "qrcodes",
            ResourceType::Logs => "logs",
        }
    }

    /// Resources a helper may modify on behalf of a user they are assigned to.
    pub fn is_delegable(&self) -> bool {
        matches!(self, ResourceType::RecipeRequests | ResourceType::Tasks)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// resource -> role -> allowed actions.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct PermissionMatrix {
    entries: HashMap<ResourceType, HashMap<Role, HashSet<Action>>>,
}

impl PermissionMatrix {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The matrix the service runs with.
    ///
    /// Relationships, QR codes and logs are deliberately absent, which leaves
    /// them to admins only.
    pub fn standard() -> Self {
        use Action::*;
        use ResourceType::*;

        let everything = [Read, Write, Delete, Admin];

        Self::empty()
            .grant(Users, Role::Admin, &everything)
            .grant(Users, Role::Helper, &[Read])
            .grant(Users, Role::User, &[Read])
            .grant(Helpers, Role::Admin, &everything)
            .grant(Helpers, Role::Helper, &[Read, Write])
            .grant(Helpers, Role::User, &[Read])
            .grant(RecipeRequests, Role::Admin, &everything)
            .grant(RecipeRequests, Role::Helper, &[Read, Write])
            .grant(RecipeRequests, Role::User, &[Read, Write])
            .grant(Tasks, Role::Admin, &everything)
            .grant(Tasks, Role::Helper, &[Read, Write])
            .grant(Tasks, Role::User, &[Read, Write])
            .grant(Feedback, Role::Admin, &everything)
            .grant(Feedback, Role::Helper, &[Read])
            .grant(Feedback, Role::User, &[Read, Write])
    }

    pub fn grant(mut self, resource: ResourceType, role: Role, actions: &[Action]) -> Self {
        self.entries
            .entry(resource)
            .or_default()
            .entry(role)
            .or_default()
            .extend(actions.iter().copied());
        self
    }

    pub fn defines(&self, resource: ResourceType) -> bool {
        self.entries.contains_key(&resource)
    }

    pub fn roles_for(&self, resource: ResourceType) -> Option<&HashMap<Role, HashSet<Action>>> {
        self.entries.get(&resource)
    }

    pub fn allowed(&self, resource: ResourceType, role: Role) -> Option<&HashSet<Action>> {
        self.entries.get(&resource).and_then(|roles| roles.get(&role))
    }

    // every resource with the actions `role` holds on it, sorted for stable output
    pub fn rows_for_role(&self, role: Role) -> Vec<(ResourceType, Vec<Action>)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(resource, roles)| {
                roles.get(&role).map(|actions| {
                    let mut actions: Vec<Action> = actions.iter().copied().collect();
                    actions.sort_by_key(|a| Action::ALL.iter().position(|x| x == a));
                    (*resource, actions)
                })
            })
            .collect();
        rows.sort_by_key(|(resource, _)| resource.as_str());
        rows
    }
}
