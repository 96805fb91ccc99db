//! The closed set of database collections that make up a Catalyst system.
//!
//! Every backup archives each of these collections and restore rejects any
//! archived collection outside the set. Adding a collection means adding a
//! variant here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A known database collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Automations,
    Jobs,
    Logs,
    Migrations,
    Playbooks,
    /// Edge collection linking tickets to each other
    Related,
    Templates,
    Tickets,
    TicketTypes,
    UserData,
    Users,
}

/// Whether a collection holds plain documents or graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Document,
    Edge,
}

impl CollectionKind {
    /// Numeric collection type used by ArangoDB (2 = document, 3 = edge).
    pub fn type_id(&self) -> u32 {
        match self {
            CollectionKind::Document => 2,
            CollectionKind::Edge => 3,
        }
    }
}

impl Collection {
    /// All known collections in backup order.
    pub const ALL: [Collection; 11] = [
        Collection::Automations,
        Collection::Jobs,
        Collection::Logs,
        Collection::Migrations,
        Collection::Playbooks,
        Collection::Related,
        Collection::Templates,
        Collection::Tickets,
        Collection::TicketTypes,
        Collection::UserData,
        Collection::Users,
    ];

    /// Collection name as stored in the database and in archive entry names.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Automations => "automations",
            Collection::Jobs => "jobs",
            Collection::Logs => "logs",
            Collection::Migrations => "migrations",
            Collection::Playbooks => "playbooks",
            Collection::Related => "related",
            Collection::Templates => "templates",
            Collection::Tickets => "tickets",
            Collection::TicketTypes => "tickettypes",
            Collection::UserData => "userdata",
            Collection::Users => "users",
        }
    }

    pub fn kind(&self) -> CollectionKind {
        match self {
            Collection::Related => CollectionKind::Edge,
            _ => CollectionKind::Document,
        }
    }

    /// Looks up a collection by its exact database name.
    pub fn from_name(name: &str) -> Option<Collection> {
        Collection::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::from_name(s).ok_or_else(|| Error::unknown_collection(s))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
