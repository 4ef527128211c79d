//! Short display names for user ids.
//!
//! Ids look like `nick:domain`. When a nick is unique across the listing the
//! domain is noise, so it is elided; when two ids share a nick both keep
//! their full form.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayName {
    pub id: String,
    pub display: String,
}

/// Everything before the last `:`, or the whole id.
#[must_use]
pub fn group_key(id: &str) -> &str {
    id.rsplit_once(':').map_or(id, |(key, _)| key)
}

/// Display names for `users`, in input order.
#[must_use]
pub fn display_names(users: &[String]) -> Vec<DisplayName> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for user in users {
        *counts.entry(group_key(user)).or_default() += 1;
    }

    users
        .iter()
        .map(|user| {
            let key = group_key(user);
            let display = if counts.get(key).copied().unwrap_or_default() == 1 {
                key.to_string()
            } else {
                user.clone()
            };
            DisplayName {
                id: user.clone(),
                display,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shown(raw: &[&str]) -> Vec<String> {
        let users: Vec<String> = raw.iter().map(|s| (*s).to_string()).collect();
        display_names(&users).into_iter().map(|d| d.display).collect()
    }

    #[test]
    fn unique_nicks_drop_their_domain() {
        assert_eq!(shown(&["a:dom", "b:dom"]), vec!["a", "b"]);
    }

    #[test]
    fn shared_nicks_keep_full_id() {
        assert_eq!(shown(&["a:dom1", "a:dom2"]), vec!["a:dom1", "a:dom2"]);
    }

    #[test]
    fn plain_ids_are_their_own_key() {
        assert_eq!(shown(&["sfink", "jonco:moz"]), vec!["sfink", "jonco"]);
    }

    #[test]
    fn only_last_colon_splits() {
        assert_eq!(group_key("a:b:c"), "a:b");
        assert_eq!(shown(&["a:b:c"]), vec!["a:b"]);
    }

    #[test]
    fn plain_id_collides_with_prefixed_one() {
        assert_eq!(shown(&["a", "a:dom"]), vec!["a", "a:dom"]);
    }

    #[test]
    fn ids_are_preserved() {
        let users = vec!["x:y".to_string()];
        let names = display_names(&users);
        assert_eq!(names[0].id, "x:y");
    }
}
