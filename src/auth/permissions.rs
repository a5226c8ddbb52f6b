//! Permission names and their one-level inheritance.

use std::collections::HashMap;

pub const SUPER: &str = "super";
pub const ALL: &str = "all";
pub const ALL_READ: &str = "all/read";
pub const STATEMENTS_WRITE: &str = "statements/write";
pub const STATEMENTS_READ: &str = "statements/read";
pub const STATEMENTS_READ_MINE: &str = "statements/read/mine";
pub const STATE: &str = "state";
pub const DEFINE: &str = "define";
pub const PROFILE: &str = "profile";
pub const ATTACHMENTS: &str = "attachments";

/// Immutable `name -> inherits` table, built once at startup.
#[derive(Debug, Clone)]
pub struct PermissionTable {
    inherits: HashMap<String, Vec<String>>,
}

impl PermissionTable {
    pub fn new(inherits: HashMap<String, Vec<String>>) -> Self {
        Self { inherits }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inherits.contains_key(name)
    }

    /// Keeps the known names, adds the known direct children of each, and
    /// deduplicates in order of first appearance. Grandchildren are not added.
    pub fn expand<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let mut expanded: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if self.contains(name) && !expanded.iter().any(|existing| existing == name) {
                expanded.push(name.to_string());
            }
        };
        for name in names {
            let name = name.as_ref();
            if !self.contains(name) {
                continue;
            }
            push(name);
            for child in &self.inherits[name] {
                push(child);
            }
        }
        expanded
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        let everything = [
            ALL,
            ALL_READ,
            STATEMENTS_WRITE,
            STATEMENTS_READ,
            STATEMENTS_READ_MINE,
            STATE,
            DEFINE,
            PROFILE,
            ATTACHMENTS,
        ];
        let table: [(&str, &[&str]); 10] = [
            (SUPER, &everything),
            (ALL, &everything[1..]),
            (ALL_READ, &[STATEMENTS_READ, STATEMENTS_READ_MINE]),
            (STATEMENTS_WRITE, &[]),
            (STATEMENTS_READ, &[STATEMENTS_READ_MINE]),
            (STATEMENTS_READ_MINE, &[]),
            (STATE, &[]),
            (DEFINE, &[]),
            (PROFILE, &[]),
            (ATTACHMENTS, &[]),
        ];
        Self::new(
            table
                .into_iter()
                .map(|(name, children)| {
                    (
                        name.to_string(),
                        children.iter().map(|child| child.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PermissionTable {
        let mut inherits = HashMap::new();
        inherits.insert("parent".to_string(), vec!["child".into(), "nonExisting".into()]);
        inherits.insert("notUniqueChilds".to_string(), vec!["child".into(), "child".into()]);
        inherits.insert("child".to_string(), vec!["subChild".into()]);
        inherits.insert("subChild".to_string(), vec!["parent".into()]);
        inherits.insert("noChild".to_string(), vec![]);
        PermissionTable::new(inherits)
    }

    #[test]
    fn expands_one_level_and_strips_unknown_names() {
        let table = table();
        assert_eq!(table.expand(&["parent", "notInConfiguration"]), vec!["parent", "child"]);
        assert_eq!(
            table.expand(&["parent", "child", "parent"]),
            vec!["parent", "child", "subChild"]
        );
        assert_eq!(table.expand(&["notUniqueChilds"]), vec!["notUniqueChilds", "child"]);
        assert_eq!(table.expand(&["noChild", ""]), vec!["noChild"]);
    }

    #[test]
    fn inheritance_is_not_hierarchy() {
        assert!(table().expand(&["subChild"]).contains(&"parent".to_string()));
    }

    #[test]
    fn super_grants_everything_by_default() {
        let expanded = PermissionTable::default().expand(&[SUPER]);
        for name in [STATEMENTS_READ, STATEMENTS_WRITE, STATE, PROFILE, DEFINE, ATTACHMENTS] {
            assert!(expanded.iter().any(|granted| granted == name), "{name}");
        }
    }
}
