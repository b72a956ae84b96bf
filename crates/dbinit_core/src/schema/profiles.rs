//! Named schema profiles.
//!
//! Two deployments share the `users`/`problems` tables; the judge deployment
//! adds `submissions` and lives in a differently named database.

use super::spec::{CollectionSpec, Direction, IndexField, IndexSpec, Schema};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const ASC: Direction = Direction::Ascending;

const USERNAME: IndexField = IndexField {
    name: "username",
    direction: ASC,
};
const EMAIL: IndexField = IndexField {
    name: "email",
    direction: ASC,
};
const DIFFICULTY: IndexField = IndexField {
    name: "difficulty",
    direction: ASC,
};
const TAGS: IndexField = IndexField {
    name: "tags",
    direction: ASC,
};
const PROBLEM_ID: IndexField = IndexField {
    name: "problem_id",
    direction: ASC,
};
const VERDICT: IndexField = IndexField {
    name: "verdict",
    direction: ASC,
};

pub const USERS: CollectionSpec = CollectionSpec {
    name: "users",
    indexes: &[
        IndexSpec {
            name: "idx_username_unique",
            fields: &[USERNAME],
            unique: true,
        },
        IndexSpec {
            name: "idx_email_unique",
            fields: &[EMAIL],
            unique: true,
        },
    ],
};

pub const PROBLEMS: CollectionSpec = CollectionSpec {
    name: "problems",
    indexes: &[
        IndexSpec {
            name: "idx_difficulty",
            fields: &[DIFFICULTY],
            unique: false,
        },
        IndexSpec {
            name: "idx_tags",
            fields: &[TAGS],
            unique: false,
        },
    ],
};

pub const SUBMISSIONS: CollectionSpec = CollectionSpec {
    name: "submissions",
    indexes: &[
        IndexSpec {
            name: "idx_username",
            fields: &[USERNAME],
            unique: false,
        },
        IndexSpec {
            name: "idx_problem_id",
            fields: &[PROBLEM_ID],
            unique: false,
        },
        IndexSpec {
            name: "idx_verdict",
            fields: &[VERDICT],
            unique: false,
        },
        IndexSpec {
            name: "idx_username_problem_id",
            fields: &[USERNAME, PROBLEM_ID],
            unique: false,
        },
        IndexSpec {
            name: "idx_username_verdict",
            fields: &[USERNAME, VERDICT],
            unique: false,
        },
        IndexSpec {
            name: "idx_problem_id_verdict",
            fields: &[PROBLEM_ID, VERDICT],
            unique: false,
        },
    ],
};

const ANNAFORCES_COLLECTIONS: &[CollectionSpec] = &[USERS, PROBLEMS];
const JUDGE_COLLECTIONS: &[CollectionSpec] = &[USERS, PROBLEMS, SUBMISSIONS];

/// Selects which of the known schema sets to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// `annaforces_db` with `users` and `problems`.
    #[default]
    Annaforces,
    /// `data` with `users`, `problems` and `submissions`.
    Judge,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::Annaforces, Profile::Judge];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Annaforces => "annaforces",
            Self::Judge => "judge",
        }
    }

    pub fn database(self) -> &'static str {
        match self {
            Self::Annaforces => "annaforces_db",
            Self::Judge => "data",
        }
    }

    pub fn collections(self) -> &'static [CollectionSpec] {
        match self {
            Self::Annaforces => ANNAFORCES_COLLECTIONS,
            Self::Judge => JUDGE_COLLECTIONS,
        }
    }

    pub fn schema(self) -> Schema {
        Schema::new(self.database(), self.collections())
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "annaforces" => Ok(Self::Annaforces),
            "judge" => Ok(Self::Judge),
            other => Err(format!(
                "unknown profile `{other}`; expected annaforces|judge"
            )),
        }
    }
}
