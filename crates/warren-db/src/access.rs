use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Areas an account may be granted rights on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Global,
    Accounts,
    Bunnies,
    Ztamps,
    Plugins,
    Server,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Global,
        Category::Accounts,
        Category::Bunnies,
        Category::Ztamps,
        Category::Plugins,
        Category::Server,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Global => "Global",
            Category::Accounts => "Accounts",
            Category::Bunnies => "Bunnies",
            Category::Ztamps => "Ztamps",
            Category::Plugins => "Plugins",
            Category::Server => "Server",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Access level, ordered `None < Read < Write`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Access {
    #[default]
    None,
    Read,
    Write,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::None => "None",
            Access::Read => "Read",
            Access::Write => "Write",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Access {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Access::None),
            "read" | "r" => Ok(Access::Read),
            "write" | "w" => Ok(Access::Write),
            _ => Err(format!("unknown access level: {s}")),
        }
    }
}
