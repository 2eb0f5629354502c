//! Wire naming policies.

use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use serde::{Deserialize, Serialize};

/// Transform applied to member names (and nested object keys) on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// Emit names exactly as registered.
    AsDeclared,
    #[default]
    CamelCase,
    PascalCase,
    SnakeCase,
    KebabCase,
}

impl NamingPolicy {
    #[must_use]
    pub fn apply(self, name: &str) -> String {
        match self {
            NamingPolicy::AsDeclared => name.to_owned(),
            NamingPolicy::CamelCase => name.to_lower_camel_case(),
            NamingPolicy::PascalCase => name.to_upper_camel_case(),
            NamingPolicy::SnakeCase => name.to_snake_case(),
            NamingPolicy::KebabCase => name.to_kebab_case(),
        }
    }
}

/// Case- and separator-insensitive name comparison.
///
/// `created_at`, `createdAt`, `CreatedAt` and `created-at` all match, so a
/// clause written against the wire names resolves to the declared member.
#[must_use]
pub fn names_match(declared: &str, candidate: &str) -> bool {
    let strip = |s: &str| {
        s.chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>()
    };
    declared == candidate || strip(declared) == strip(candidate)
}
