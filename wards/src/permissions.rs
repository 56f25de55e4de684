use std::collections::BTreeSet;

/// Room token granting every room.
pub const ALL_ROOMS: &str = "*";

/// A user's expanded room grants.
///
/// Stored tokens may pack several rooms into one comma-joined string
/// (`"101,102,103"`); expansion splits them, trims whitespace and drops
/// empty pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPermissions {
    wildcard: bool,
    rooms: BTreeSet<String>,
}

impl RoomPermissions {
    pub fn expand<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut permissions = Self::default();
        for token in tokens {
            for room in split_token(token.as_ref()) {
                if room == ALL_ROOMS {
                    permissions.wildcard = true;
                } else {
                    permissions.rooms.insert(room.to_string());
                }
            }
        }
        permissions
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Exact match against the expanded set, or any room under the wildcard.
    pub fn permits(&self, room_id: &str) -> bool {
        self.wildcard || self.rooms.contains(room_id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }
}

fn split_token(token: &str) -> impl Iterator<Item = &str> {
    token.split(',').map(str::trim).filter(|room| !room.is_empty())
}

/// Add the wildcard grant; returns `true` if it was not already present.
pub fn grant_all_rooms(tokens: &mut Vec<String>) -> bool {
    if RoomPermissions::expand(tokens.iter()).is_wildcard() {
        return false;
    }
    tokens.push(ALL_ROOMS.to_string());
    true
}

/// Strip the wildcard from every token; returns `true` if anything changed.
pub fn revoke_all_rooms(tokens: &mut Vec<String>) -> bool {
    if !RoomPermissions::expand(tokens.iter()).is_wildcard() {
        return false;
    }
    let remaining: Vec<String> = tokens
        .iter()
        .map(|token| {
            split_token(token)
                .filter(|room| *room != ALL_ROOMS)
                .collect::<Vec<_>>()
                .join(",")
        })
        .filter(|token| !token.is_empty())
        .collect();
    *tokens = remaining;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_packed_token_grants_each_room() {
        let perms = RoomPermissions::expand(["101,102,103"]);
        assert!(perms.permits("101"));
        assert!(perms.permits("102"));
        assert!(perms.permits("103"));
        assert!(!perms.permits("104"));
        assert!(!perms.permits("101,102"));
        assert!(!perms.permits("10"));
    }

    #[test]
    fn whitespace_and_empty_pieces_are_ignored() {
        let perms = RoomPermissions::expand(["101, 102,", " 205 "]);
        assert_eq!(perms.rooms().collect::<Vec<_>>(), vec!["101", "102", "205"]);
        assert!(!perms.permits(""));
    }

    #[test]
    fn wildcard_inside_packed_token() {
        let perms = RoomPermissions::expand(["101,*"]);
        assert!(perms.is_wildcard());
        assert!(perms.permits("any-room"));
    }

    #[test]
    fn empty_grants_permit_nothing() {
        let perms = RoomPermissions::expand(Vec::<String>::new());
        assert!(!perms.permits("101"));
    }

    #[test]
    fn grant_and_revoke_wildcard() {
        let mut tokens = vec!["101,102".to_string()];
        assert!(grant_all_rooms(&mut tokens));
        assert!(!grant_all_rooms(&mut tokens));
        assert_eq!(tokens, vec!["101,102".to_string(), "*".to_string()]);

        let mut packed = vec!["101,*".to_string(), "*".to_string()];
        assert!(revoke_all_rooms(&mut packed));
        assert_eq!(packed, vec!["101".to_string()]);
        assert!(!revoke_all_rooms(&mut packed));
    }
}
