//! Role model
//!
//! Accounts are stored with an internal role (`ADMIN`, `SISWA`, ...), while
//! clients and session tokens use the external label (`admin`, `siswa`, ...).
//! Both vocabularies and the permission set hang off one table keyed by the
//! internal role; `InternalRole::profile` is an exhaustive match, so a new
//! variant does not compile until its label and permissions are filled in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role as stored in the accounts table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalRole {
    Admin,
    Kesiswaan,
    Siswa,
    Osis,
    PpdbStaff,
}

/// Per-role row of the lookup table
#[derive(Debug)]
pub struct RoleProfile {
    /// Value stored in `users.role`
    pub db_value: &'static str,
    /// Label used by clients and embedded in session tokens
    pub external_label: &'static str,
    pub permissions: &'static [&'static str],
}

impl InternalRole {
    pub const ALL: [InternalRole; 5] = [
        InternalRole::Admin,
        InternalRole::Kesiswaan,
        InternalRole::Siswa,
        InternalRole::Osis,
        InternalRole::PpdbStaff,
    ];

    pub const fn profile(self) -> &'static RoleProfile {
        match self {
            InternalRole::Admin => &RoleProfile {
                db_value: "ADMIN",
                external_label: "admin",
                permissions: &["read", "write", "delete", "manage_users", "view_reports"],
            },
            InternalRole::Kesiswaan => &RoleProfile {
                db_value: "KESISWAAN",
                external_label: "kesiswaan",
                permissions: &["read", "write", "manage_students", "view_reports"],
            },
            InternalRole::Siswa => &RoleProfile {
                db_value: "SISWA",
                external_label: "siswa",
                permissions: &["read", "view_profile", "submit_assignments"],
            },
            InternalRole::Osis => &RoleProfile {
                db_value: "OSIS",
                external_label: "osis",
                permissions: &["read", "write", "manage_events", "view_reports"],
            },
            InternalRole::PpdbStaff => &RoleProfile {
                db_value: "PPDB_STAFF",
                external_label: "ppdb-officer",
                permissions: &["read", "write", "manage_ppdb", "view_applications"],
            },
        }
    }

    pub fn db_value(self) -> &'static str {
        self.profile().db_value
    }

    pub fn external_label(self) -> &'static str {
        self.profile().external_label
    }

    pub fn permissions(self) -> Vec<String> {
        self.profile()
            .permissions
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    /// Map an external label (`"ppdb-officer"`) to the internal role.
    ///
    /// Labels are matched exactly; anything else is an unmappable role.
    pub fn from_external_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.external_label() == label)
    }

    /// Map a stored value (`"PPDB_STAFF"`) to the internal role.
    pub fn from_db_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.db_value() == value)
    }

    /// Internal roles whose accounts may sign in under this role.
    ///
    /// OSIS sign-in is also open to students granted OSIS access on their
    /// profile; that flag is checked by the account lookup.
    pub fn lookup_roles(self) -> &'static [InternalRole] {
        match self {
            InternalRole::Osis => &[InternalRole::Osis, InternalRole::Siswa],
            InternalRole::Admin => &[InternalRole::Admin],
            InternalRole::Kesiswaan => &[InternalRole::Kesiswaan],
            InternalRole::Siswa => &[InternalRole::Siswa],
            InternalRole::PpdbStaff => &[InternalRole::PpdbStaff],
        }
    }
}

impl fmt::Display for InternalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.db_value())
    }
}

impl FromStr for InternalRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_value(s).ok_or_else(|| anyhow::anyhow!("Invalid internal role: {}", s))
    }
}
