use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notes::NotesLedger;

/// Identifier wrapper for submitted quote requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for dependents; only meaningful within the owning application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependentId(pub String);

impl DependentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DependentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a portal user as issued by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which sets of applicant fields a quote request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationType {
    #[serde(rename = "self")]
    SelfOnly,
    #[serde(rename = "dependents")]
    Dependents,
    #[serde(rename = "self_dependents")]
    SelfAndDependents,
}

impl ApplicationType {
    pub const fn includes_principal(self) -> bool {
        matches!(self, Self::SelfOnly | Self::SelfAndDependents)
    }

    pub const fn includes_dependents(self) -> bool {
        matches!(self, Self::Dependents | Self::SelfAndDependents)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SelfOnly => "self",
            Self::Dependents => "dependents",
            Self::SelfAndDependents => "self_dependents",
        }
    }
}

/// Workflow status of a quote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    QuoteSent,
    Completed,
    Rejected,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 4] = [
        QuoteStatus::Pending,
        QuoteStatus::QuoteSent,
        QuoteStatus::Completed,
        QuoteStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::QuoteSent => "quote_sent",
            QuoteStatus::Completed => "completed",
            QuoteStatus::Rejected => "rejected",
        }
    }

    /// Human-facing form used in audit notes, e.g. `Quote Sent`.
    pub const fn title(self) -> &'static str {
        match self {
            QuoteStatus::Pending => "Pending",
            QuoteStatus::QuoteSent => "Quote Sent",
            QuoteStatus::Completed => "Completed",
            QuoteStatus::Rejected => "Rejected",
        }
    }
}

impl Default for QuoteStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emirate {
    AbuDhabi,
    Dubai,
    Sharjah,
    Ajman,
    UmmAlQuwain,
    RasAlKhaimah,
    Fujairah,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaritalStatus {
    Single,
    Married,
}

/// Relationship of a dependent to the principal applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Spouse,
    Child,
    Parent,
    Sibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Documents already on file for a user, used as copy sources when a principal omits an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultDocuments {
    pub profile_picture: Option<String>,
    pub eid_file: Option<String>,
}

/// Authenticated caller, resolved by the identity provider for each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    #[serde(default)]
    pub defaults: DefaultDocuments,
}

impl Actor {
    pub fn client(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role: Role::Client,
            defaults: DefaultDocuments::default(),
        }
    }

    pub fn staff(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            role,
            defaults: DefaultDocuments::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: DefaultDocuments) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Principal applicant fields. Either the whole group is present or none of it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub phone: String,
    pub eid_number: String,
    pub date_of_birth: NaiveDate,
    pub residency: Emirate,
    pub profile_picture: String,
    pub eid_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependent {
    pub id: DependentId,
    pub application_id: ApplicationId,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub uid_number: Option<String>,
    pub eid_number: Option<String>,
    pub marital_status: MaritalStatus,
    pub date_of_birth: NaiveDate,
    pub relationship: Relationship,
    pub residency: Option<Emirate>,
    pub profile_picture: String,
    pub eid_file: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Dependent {
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref() {
            Some(middle) if !middle.is_empty() => {
                format!("{} {} {}", self.first_name, middle, self.last_name)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }

    pub fn attachment_paths(&self) -> [&str; 2] {
        [self.profile_picture.as_str(), self.eid_file.as_str()]
    }
}

/// Admin-supplied documents and payment details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub quote_files: Vec<String>,
    pub payment_link: Option<String>,
    pub policy_files: Vec<String>,
}

/// Aggregate root for a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub owner_id: UserId,
    pub application_type: ApplicationType,
    pub principal: Option<Principal>,
    pub status: QuoteStatus,
    pub fulfillment: Fulfillment,
    pub notes: NotesLedger,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn summary(&self) -> String {
        match &self.principal {
            Some(principal) => format!(
                "{} quote request for {}",
                self.application_type.label(),
                principal.name
            ),
            None => format!("{} quote request", self.application_type.label()),
        }
    }
}
